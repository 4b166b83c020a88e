//! The uniform response shape every backend call and cache read returns.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Appended to `message` on every envelope answered by the demo dataset.
pub const DEMO_MODE_SUFFIX: &str = " (demo mode)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub page: u64,
  pub limit: u64,
  pub total: u64,
  pub total_pages: u64,
  pub has_next: bool,
  pub has_prev: bool,
}

impl Pagination {
  pub fn new(page: u64, limit: u64, total: u64) -> Self {
    let page = page.max(1);
    let limit = limit.max(1);
    let total_pages = total.div_ceil(limit);
    Self {
      page,
      limit,
      total,
      total_pages,
      has_next: page < total_pages,
      has_prev: page > 1,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pagination: Option<Pagination>,
}

impl ResponseEnvelope {
  pub fn ok(data: Value) -> Self {
    Self {
      success: true,
      data: Some(data),
      error: None,
      message: None,
      pagination: None,
    }
  }

  pub fn failure(error: impl Into<String>) -> Self {
    Self {
      success: false,
      data: None,
      error: Some(error.into()),
      message: None,
      pagination: None,
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn with_pagination(mut self, pagination: Pagination) -> Self {
    self.pagination = Some(pagination);
    self
  }

  /// Mark this envelope as answered by the demo dataset.
  pub fn into_demo(mut self) -> Self {
    let base = self
      .message
      .take()
      .unwrap_or_else(|| if self.success { "OK" } else { "Failed" }.to_string());
    self.message = Some(format!("{}{}", base, DEMO_MODE_SUFFIX));
    self
  }

  pub fn is_demo(&self) -> bool {
    self
      .message
      .as_deref()
      .is_some_and(|m| m.ends_with(DEMO_MODE_SUFFIX))
  }

  /// Deserialize the payload into a typed record.
  pub fn data_as<T: DeserializeOwned>(&self) -> serde_json::Result<Option<T>> {
    self.data.clone().map(serde_json::from_value).transpose()
  }
}
