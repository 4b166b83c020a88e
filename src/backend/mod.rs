//! Backend clients for the complaint-management API.
//!
//! Two interchangeable transports sit behind the [`Backend`] trait:
//! - [`ScriptTransport`]: the spreadsheet-backed script endpoint (JSONP-style
//!   callback reads, JSON text writes)
//! - [`RestTransport`]: the relational REST API with bearer-token auth
//!
//! Both normalize their payloads to a [`ResponseEnvelope`].

pub mod action;
pub mod envelope;
pub mod error;
pub mod normalize;
pub mod rest;
pub mod script;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use action::{ApiAction, Method};
pub use envelope::{Pagination, ResponseEnvelope, DEMO_MODE_SUFFIX};
pub use error::ApiError;
pub use rest::RestTransport;
pub use script::{HttpScriptLoader, ScriptTransport};

/// Request parameters. `serde_json::Map` keeps keys ordered.
pub type Params = serde_json::Map<String, Value>;

/// One logical call, independent of transport.
#[derive(Debug, Clone)]
pub struct Request {
  pub action: ApiAction,
  pub params: Params,
  pub token: Option<String>,
  pub timeout: Duration,
}

/// A transport that performs the actual network call.
#[async_trait]
pub trait Backend: Send + Sync {
  async fn request(&self, request: Request) -> Result<ResponseEnvelope, ApiError>;

  /// Short name for logs and status output.
  fn name(&self) -> &'static str;
}

/// Render params as query-string pairs. Strings go bare, everything else as JSON.
pub(crate) fn query_pairs(params: &Params) -> Vec<(String, String)> {
  params
    .iter()
    .filter(|(_, v)| !v.is_null())
    .map(|(k, v)| {
      let rendered = match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      (k.clone(), rendered)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_query_pairs_skip_nulls() {
    let mut params = Params::new();
    params.insert("status".into(), json!("open"));
    params.insert("limit".into(), json!(100));
    params.insert("assignedTo".into(), Value::Null);
    let pairs = query_pairs(&params);
    assert_eq!(
      pairs,
      vec![
        ("limit".to_string(), "100".to_string()),
        ("status".to_string(), "open".to_string()),
      ]
    );
  }
}
