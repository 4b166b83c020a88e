//! Transport for the relational (Postgres-backed) REST API.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::normalize::{normalize, normalize_error_status};
use super::{query_pairs, ApiError, Backend, Method, Request, ResponseEnvelope};

/// REST client for the relational API.
/// Clone is cheap - reqwest::Client shares its connection pool.
#[derive(Clone)]
pub struct RestTransport {
  client: Client,
  base_url: String,
  api_key: Option<String>,
}

impl RestTransport {
  pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
    Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key,
    }
  }

  fn auth_headers(&self, token: Option<&str>) -> Result<header::HeaderMap, ApiError> {
    let mut headers = header::HeaderMap::new();
    if let Some(ref key) = self.api_key {
      headers.insert(
        "apikey",
        header::HeaderValue::from_str(key)
          .map_err(|e| ApiError::InvalidResponse(format!("Invalid API key header: {}", e)))?,
      );
    }
    if let Some(bearer) = token.or(self.api_key.as_deref()) {
      headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", bearer))
          .map_err(|e| ApiError::InvalidResponse(format!("Invalid token header: {}", e)))?,
      );
    }
    Ok(headers)
  }

  /// Collection URL, with the record id appended as one encoded segment.
  fn endpoint(&self, path: &str, id: Option<&str>) -> Result<Url, ApiError> {
    let mut url = Url::parse(&format!("{}{}", self.base_url, path))
      .map_err(|e| ApiError::InvalidResponse(format!("Invalid backend url: {}", e)))?;
    if let Some(id) = id {
      url
        .path_segments_mut()
        .map_err(|_| ApiError::InvalidResponse("Backend url cannot take a path".into()))?
        .push(id);
    }
    Ok(url)
  }
}

#[async_trait]
impl Backend for RestTransport {
  async fn request(&self, request: Request) -> Result<ResponseEnvelope, ApiError> {
    let timeout_ms = request.timeout.as_millis() as u64;
    let (method, path, id) = request.action.rest_route(&request.params);
    let url = self.endpoint(path, id.as_deref())?;
    debug!(action = request.action.name(), url = %url, "REST request");

    let mut builder = self
      .client
      .request(method.into(), url)
      .headers(self.auth_headers(request.token.as_deref())?)
      .timeout(request.timeout);

    builder = match method {
      Method::Get => builder.query(&query_pairs(&request.params)),
      Method::Post | Method::Put => {
        let mut body = request.params.clone();
        if method == Method::Put {
          body.remove("id");
        }
        builder.json(&Value::Object(body))
      }
      Method::Delete => builder,
    };

    let response = builder
      .send()
      .await
      .map_err(|e| ApiError::from_reqwest(e, timeout_ms))?;

    let status = response.status();
    let text = response
      .text()
      .await
      .map_err(|e| ApiError::from_reqwest(e, timeout_ms))?;

    if !status.is_success() {
      debug!(action = request.action.name(), status = status.as_u16(), "REST error status");
      return normalize_error_status(status.as_u16(), &text);
    }

    let payload = if text.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&text)
        .map_err(|e| ApiError::InvalidResponse(format!("Reply is not JSON: {}", e)))?
    };
    normalize(request.action, payload)
  }

  fn name(&self) -> &'static str {
    "relational"
  }
}
