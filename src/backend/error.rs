use thiserror::Error;

/// Errors produced by a backend call.
///
/// `Clone` so that a single settled result can be handed to every
/// de-duplicated caller waiting on the same key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
  #[error("Network error: {0}")]
  Network(String),

  #[error("Request timed out after {0} ms")]
  Timeout(u64),

  #[error("Server error: {0}")]
  Server(String),

  #[error("Unauthorized: {0}")]
  Unauthorized(String),

  #[error("{0}")]
  Rejected(String),

  #[error("Invalid response: {0}")]
  InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Fragments that mark an error string as auth-class. The script backend
/// reports these inside a 200 response, so the text is all we have.
const AUTH_ERROR_MARKERS: &[&str] = &[
  "unauthorized",
  "unauthenticated",
  "not authenticated",
  "invalid token",
  "invalid session",
  "session expired",
  "token expired",
  "jwt expired",
];

impl ApiError {
  /// Transient errors are retried, counted by the background synchronizer,
  /// and may be answered by the demo dataset.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      ApiError::Network(_) | ApiError::Timeout(_) | ApiError::Server(_)
    )
  }

  pub fn is_auth(&self) -> bool {
    matches!(self, ApiError::Unauthorized(_))
  }

  /// Classify a non-2xx status. 403 is a permission answer, not an expired
  /// session, so it only counts as auth when the body says so.
  pub fn from_status(status: u16, body: &str) -> Self {
    let truncated = truncate_body(body);
    match status {
      401 => ApiError::Unauthorized(truncated),
      408 | 429 | 500..=599 => ApiError::Server(format!("Status {}: {}", status, truncated)),
      _ if is_auth_message(body) => ApiError::Unauthorized(truncated),
      _ => ApiError::Rejected(truncated),
    }
  }

  pub fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> Self {
    if err.is_timeout() {
      ApiError::Timeout(timeout_ms)
    } else if err.is_decode() {
      ApiError::InvalidResponse(err.to_string())
    } else {
      ApiError::Network(err.to_string())
    }
  }
}

pub fn is_auth_message(message: &str) -> bool {
  let lower = message.to_lowercase();
  AUTH_ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
    || lower.split(|c: char| !c.is_ascii_alphanumeric()).any(|word| word == "401")
}

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
  if body.len() <= MAX_ERROR_BODY_LENGTH {
    return body.to_string();
  }
  let mut end = MAX_ERROR_BODY_LENGTH;
  while !body.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}
