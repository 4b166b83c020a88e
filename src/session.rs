//! Session token held in memory and persisted in a small SQLite store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Fixed key the auth token is stored under.
pub const TOKEN_KEY: &str = "auth_token";

/// Schema for the key/value table.
const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Key/value persistence for session state.
pub struct SessionStore {
  conn: Mutex<Connection>,
}

impl SessionStore {
  /// Open or create the store at the default location
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open session database at {}: {}", path.display(), e))?;
    Self::with_connection(conn)
  }

  /// Store that lives only as long as the process.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory session database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| eyre!("Failed to run session migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("utilidesk").join("session.db"))
  }

  pub fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM session_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read session key {}: {}", key, e))
  }

  pub fn put(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO session_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store session key {}: {}", key, e))?;
    Ok(())
  }

  pub fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM session_store WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete session key {}: {}", key, e))?;
    Ok(())
  }
}

/// The current session token.
///
/// Persistence is best effort: a failing store is logged, never surfaced to
/// the caller of login/logout.
pub struct Session {
  token: Mutex<Option<String>>,
  store: Option<SessionStore>,
}

impl Session {
  /// Session backed by `store`, starting from whatever token it holds.
  pub fn new(store: SessionStore) -> Self {
    let token = match store.get(TOKEN_KEY) {
      Ok(token) => token,
      Err(e) => {
        warn!(error = %e, "Could not read persisted session token");
        None
      }
    };
    Self {
      token: Mutex::new(token),
      store: Some(store),
    }
  }

  /// Session that is never persisted.
  pub fn ephemeral() -> Self {
    Self {
      token: Mutex::new(None),
      store: None,
    }
  }

  pub fn token(&self) -> Option<String> {
    self
      .token
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn is_authenticated(&self) -> bool {
    self.token().is_some()
  }

  pub fn set_token(&self, token: &str) {
    *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    if let Some(ref store) = self.store {
      if let Err(e) = store.put(TOKEN_KEY, token) {
        warn!(error = %e, "Could not persist session token");
      }
    }
    debug!("Session token set");
  }

  pub fn clear(&self) {
    *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    if let Some(ref store) = self.store {
      if let Err(e) = store.remove(TOKEN_KEY) {
        warn!(error = %e, "Could not remove persisted session token");
      }
    }
    debug!("Session cleared");
  }
}
