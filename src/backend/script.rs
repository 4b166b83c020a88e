//! Transport for the spreadsheet-backed script endpoint.
//!
//! Reads are script-callback (JSONP-style) calls: the URL names a callback,
//! the endpoint answers with `callbackName({...})`, and the body is dispatched
//! through a [`CallbackRegistry`] to whoever registered that name. Writes are
//! plain JSON bodies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use super::normalize::{normalize, normalize_error_status};
use super::{query_pairs, ApiError, Backend, Method, Request, ResponseEnvelope};

const CALLBACK_PREFIX: &str = "utilidesk_cb";

// ============================================================================
// Callback registry
// ============================================================================

/// Pending script callbacks, keyed by globally unique name.
#[derive(Default)]
pub struct CallbackRegistry {
  pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
  counter: AtomicU64,
}

/// Keeps a callback registered; removes it when dropped, whatever the outcome.
pub struct CallbackGuard {
  name: String,
  registry: Arc<CallbackRegistry>,
}

impl CallbackGuard {
  pub fn name(&self) -> &str {
    &self.name
  }
}

impl Drop for CallbackGuard {
  fn drop(&mut self) {
    self.registry.remove(&self.name);
  }
}

impl CallbackRegistry {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Register a fresh callback name.
  pub fn register(self: &Arc<Self>) -> (CallbackGuard, oneshot::Receiver<Value>) {
    let seq = self.counter.fetch_add(1, Ordering::Relaxed);
    let name = format!(
      "{}_{}_{}",
      CALLBACK_PREFIX,
      chrono::Utc::now().timestamp_millis(),
      seq
    );
    let (tx, rx) = oneshot::channel();
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(name.clone(), tx);

    let guard = CallbackGuard {
      name,
      registry: Arc::clone(self),
    };
    (guard, rx)
  }

  /// Run a loaded script body: invoke the callback it names.
  pub fn dispatch(&self, body: &str) -> Result<(), ApiError> {
    let (name, payload) = parse_jsonp(body)?;
    let sender = self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&name);

    match sender {
      Some(tx) => {
        // The receiver may already be gone after a timeout.
        let _ = tx.send(payload);
        Ok(())
      }
      None => Err(ApiError::InvalidResponse(format!(
        "Script invoked unknown callback {}",
        name
      ))),
    }
  }

  fn remove(&self, name: &str) {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(name);
  }

  /// Number of callbacks still registered.
  pub fn len(&self) -> usize {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Split `name({...});` into the callback name and its JSON argument.
pub fn parse_jsonp(body: &str) -> Result<(String, Value), ApiError> {
  let trimmed = body.trim().trim_start_matches("/**/").trim();
  let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

  let open = trimmed
    .find('(')
    .ok_or_else(|| ApiError::InvalidResponse("Script body is not a callback call".into()))?;
  let inner = trimmed[open + 1..]
    .strip_suffix(')')
    .ok_or_else(|| ApiError::InvalidResponse("Unterminated callback call".into()))?;

  let name = trimmed[..open].trim();
  let valid_name = !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.');
  if !valid_name {
    return Err(ApiError::InvalidResponse(format!(
      "Invalid callback name {:?}",
      name
    )));
  }

  let payload = serde_json::from_str(inner)
    .map_err(|e| ApiError::InvalidResponse(format!("Callback payload is not JSON: {}", e)))?;
  Ok((name.to_string(), payload))
}

// ============================================================================
// Script loading
// ============================================================================

/// Fetches the body of a callback script within `timeout`.
#[async_trait]
pub trait ScriptLoader: Send + Sync {
  async fn load(&self, url: &Url, timeout: Duration) -> Result<String, ApiError>;
}

/// Loads scripts over HTTP.
pub struct HttpScriptLoader {
  client: Client,
}

impl HttpScriptLoader {
  pub fn new(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl ScriptLoader for HttpScriptLoader {
  async fn load(&self, url: &Url, timeout: Duration) -> Result<String, ApiError> {
    let timeout_ms = timeout.as_millis() as u64;
    let response = self
      .client
      .get(url.clone())
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| ApiError::from_reqwest(e, timeout_ms))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| ApiError::from_reqwest(e, timeout_ms))?;
    if !status.is_success() {
      return Err(ApiError::from_status(status.as_u16(), &body));
    }
    Ok(body)
  }
}

// ============================================================================
// Transport
// ============================================================================

/// Client for the spreadsheet script endpoint.
pub struct ScriptTransport {
  endpoint: Url,
  client: Client,
  loader: Arc<dyn ScriptLoader>,
  callbacks: Arc<CallbackRegistry>,
}

impl ScriptTransport {
  pub fn new(endpoint: Url, client: Client) -> Self {
    let loader = Arc::new(HttpScriptLoader::new(client.clone()));
    Self::with_loader(endpoint, client, loader)
  }

  pub fn with_loader(endpoint: Url, client: Client, loader: Arc<dyn ScriptLoader>) -> Self {
    Self {
      endpoint,
      client,
      loader,
      callbacks: CallbackRegistry::new(),
    }
  }

  pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
    &self.callbacks
  }

  fn callback_url(&self, request: &Request, callback: &str) -> Url {
    let mut url = self.endpoint.clone();
    {
      let mut query = url.query_pairs_mut();
      query.append_pair("action", request.action.name());
      for (key, value) in query_pairs(&request.params) {
        query.append_pair(&key, &value);
      }
      if let Some(ref token) = request.token {
        query.append_pair("token", token);
      }
      query.append_pair("callback", callback);
    }
    url
  }

  async fn read(&self, request: Request) -> Result<ResponseEnvelope, ApiError> {
    let (guard, rx) = self.callbacks.register();
    let url = self.callback_url(&request, guard.name());
    let timeout_ms = request.timeout.as_millis() as u64;
    debug!(action = request.action.name(), callback = guard.name(), "Loading callback script");

    let outcome = tokio::time::timeout(request.timeout, async {
      let body = self.loader.load(&url, request.timeout).await?;
      self.callbacks.dispatch(&body)?;
      rx.await.map_err(|_| {
        ApiError::InvalidResponse("Script loaded but never invoked its callback".into())
      })
    })
    .await;
    drop(guard);

    match outcome {
      Ok(payload) => normalize(request.action, payload?),
      Err(_) => {
        warn!(action = request.action.name(), timeout_ms, "Callback script timed out");
        Err(ApiError::Timeout(timeout_ms))
      }
    }
  }

  async fn write(&self, request: Request) -> Result<ResponseEnvelope, ApiError> {
    let timeout_ms = request.timeout.as_millis() as u64;
    let mut body = Map::new();
    body.insert("action".into(), Value::String(request.action.name().into()));
    if let Some(token) = request.token {
      body.insert("token".into(), Value::String(token));
    }
    body.extend(request.params);

    // The script endpoint only answers simple (non-preflighted) requests.
    let response = self
      .client
      .post(self.endpoint.clone())
      .header(header::CONTENT_TYPE, "text/plain;charset=utf-8")
      .body(Value::Object(body).to_string())
      .timeout(request.timeout)
      .send()
      .await
      .map_err(|e| ApiError::from_reqwest(e, timeout_ms))?;

    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| ApiError::from_reqwest(e, timeout_ms))?;
    if !status.is_success() {
      return normalize_error_status(status.as_u16(), &text);
    }

    let payload: Value = serde_json::from_str(&text)
      .map_err(|e| ApiError::InvalidResponse(format!("Script reply is not JSON: {}", e)))?;
    normalize(request.action, payload)
  }
}

#[async_trait]
impl Backend for ScriptTransport {
  async fn request(&self, request: Request) -> Result<ResponseEnvelope, ApiError> {
    // The script runtime only has GET and POST entry points.
    match request.action.method() {
      Method::Get => self.read(request).await,
      Method::Post | Method::Put | Method::Delete => self.write(request).await,
    }
  }

  fn name(&self) -> &'static str {
    "script"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{ApiAction, Params};
  use serde_json::json;

  /// Answers every script load by calling back the name found in the URL.
  struct EchoLoader {
    reply: Value,
  }

  #[async_trait]
  impl ScriptLoader for EchoLoader {
    async fn load(&self, url: &Url, _timeout: Duration) -> Result<String, ApiError> {
      let callback = url
        .query_pairs()
        .find(|(k, _)| k == "callback")
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();
      Ok(format!("{}({});", callback, self.reply))
    }
  }

  struct FailingLoader;

  #[async_trait]
  impl ScriptLoader for FailingLoader {
    async fn load(&self, _url: &Url, _timeout: Duration) -> Result<String, ApiError> {
      Err(ApiError::Network("script element failed to load".into()))
    }
  }

  struct SilentLoader;

  #[async_trait]
  impl ScriptLoader for SilentLoader {
    async fn load(&self, _url: &Url, _timeout: Duration) -> Result<String, ApiError> {
      // Never loads.
      std::future::pending::<()>().await;
      Ok(String::new())
    }
  }

  /// Loads a script that never calls anything.
  struct InertLoader;

  #[async_trait]
  impl ScriptLoader for InertLoader {
    async fn load(&self, _url: &Url, _timeout: Duration) -> Result<String, ApiError> {
      Ok("console.log(1)".into())
    }
  }

  fn transport(loader: Arc<dyn ScriptLoader>) -> ScriptTransport {
    let endpoint = Url::parse("https://script.example.com/macros/s/abc/exec").unwrap();
    ScriptTransport::with_loader(endpoint, Client::new(), loader)
  }

  fn read_request(timeout: Duration) -> Request {
    let mut params = Params::new();
    params.insert("status".into(), json!("open"));
    Request {
      action: ApiAction::GetComplaints,
      params,
      token: Some("tok".into()),
      timeout,
    }
  }

  #[test]
  fn test_parse_jsonp() {
    let (name, payload) = parse_jsonp("/**/ cb_1({\"success\":true});").unwrap();
    assert_eq!(name, "cb_1");
    assert_eq!(payload, json!({"success": true}));
  }

  #[test]
  fn test_parse_jsonp_rejects_garbage() {
    assert!(parse_jsonp("<html>Sign in</html>").is_err());
    assert!(parse_jsonp("cb_1({\"a\":1}").is_err());
    assert!(parse_jsonp("alert(1); cb({})").is_err());
  }

  #[test]
  fn test_callback_names_are_unique() {
    let registry = CallbackRegistry::new();
    let (a, _rx_a) = registry.register();
    let (b, _rx_b) = registry.register();
    assert_ne!(a.name(), b.name());
    assert_eq!(registry.len(), 2);
    drop(a);
    drop(b);
    assert!(registry.is_empty());
  }

  #[test]
  fn test_callback_url_carries_action_token_and_callback() {
    let transport = transport(Arc::new(InertLoader));
    let url = transport.callback_url(&read_request(Duration::from_secs(1)), "cb_9");
    let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(pairs["action"], "getComplaints");
    assert_eq!(pairs["status"], "open");
    assert_eq!(pairs["token"], "tok");
    assert_eq!(pairs["callback"], "cb_9");
  }

  #[tokio::test]
  async fn test_read_success_cleans_up() {
    let reply = json!({"success": true, "data": {"complaints": [{"id": "C-1"}]}});
    let transport = transport(Arc::new(EchoLoader { reply }));

    let env = transport
      .request(read_request(Duration::from_secs(5)))
      .await
      .unwrap();
    assert_eq!(env.data, Some(json!([{"id": "C-1"}])));
    assert!(transport.callbacks().is_empty());
  }

  #[tokio::test]
  async fn test_read_load_error_cleans_up() {
    let transport = transport(Arc::new(FailingLoader));
    let err = transport
      .request(read_request(Duration::from_secs(5)))
      .await
      .unwrap_err();
    assert!(err.is_transient());
    assert!(transport.callbacks().is_empty());
  }

  #[tokio::test]
  async fn test_script_without_callback_is_an_error() {
    let transport = transport(Arc::new(InertLoader));
    let err = transport
      .request(read_request(Duration::from_secs(5)))
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
    assert!(transport.callbacks().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_read_timeout_cleans_up() {
    let transport = transport(Arc::new(SilentLoader));
    let err = transport
      .request(read_request(Duration::from_millis(250)))
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::Timeout(250));
    assert!(transport.callbacks().is_empty());
  }

  #[tokio::test]
  async fn test_tunneled_auth_error_surfaces_distinctly() {
    let reply = json!({"success": false, "error": "Invalid token"});
    let transport = transport(Arc::new(EchoLoader { reply }));
    let err = transport
      .request(read_request(Duration::from_secs(5)))
      .await
      .unwrap_err();
    assert!(err.is_auth());
  }

  #[tokio::test]
  async fn test_http_loader_reports_its_timeout() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}/exec", listener.local_addr().unwrap())).unwrap();
    // Accept and never answer.
    let _server = tokio::spawn(async move {
      let (_socket, _) = listener.accept().await.unwrap();
      tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let loader = HttpScriptLoader::new(Client::new());
    let err = loader.load(&url, Duration::from_millis(200)).await.unwrap_err();
    assert_eq!(err, ApiError::Timeout(200));
  }
}
