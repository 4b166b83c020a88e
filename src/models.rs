//! Domain records and request inputs.
//!
//! The cache layer treats payloads as opaque JSON; these types are what the
//! operations accept and what callers usually decode envelopes into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Params;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
  pub role: String,
  #[serde(default)]
  pub department: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default = "default_true")]
  pub is_active: bool,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub category: String,
  pub priority: String,
  pub status: String,
  #[serde(default)]
  pub customer_name: Option<String>,
  #[serde(default)]
  pub customer_email: Option<String>,
  #[serde(default)]
  pub customer_phone: Option<String>,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub assigned_to: Option<String>,
  #[serde(default)]
  pub created_by: Option<String>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Outage {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  pub affected_area: String,
  pub status: String,
  #[serde(default)]
  pub severity: Option<String>,
  #[serde(default)]
  pub start_time: Option<String>,
  #[serde(default)]
  pub estimated_end: Option<String>,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id: String,
  #[serde(default)]
  pub user_id: Option<String>,
  pub title: String,
  pub message: String,
  #[serde(rename = "type", default)]
  pub kind: Option<String>,
  #[serde(default)]
  pub is_read: bool,
  #[serde(default)]
  pub created_at: Option<String>,
}

fn default_true() -> bool {
  true
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
  pub name: String,
  pub email: String,
  pub password: String,
  pub role: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub department: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewComplaint {
  pub title: String,
  pub description: String,
  pub category: String,
  pub priority: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub customer_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub customer_email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub customer_phone: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assigned_to: Option<String>,
}

impl NewComplaint {
  /// Placeholder record shown while the create call is in flight.
  pub fn provisional(&self, now: DateTime<Utc>) -> Value {
    let stamp = now.to_rfc3339();
    let mut record = to_params(self);
    record.insert("id".into(), Value::String(format!("temp-{}", now.timestamp_millis())));
    record.insert("status".into(), Value::String("open".into()));
    record.insert("createdAt".into(), Value::String(stamp.clone()));
    record.insert("updatedAt".into(), Value::String(stamp));
    record.insert("pending".into(), Value::Bool(true));
    Value::Object(record)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewOutage {
  pub title: String,
  pub description: String,
  pub affected_area: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub severity: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub start_time: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub estimated_end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub title: String,
  pub message: String,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
}

/// First-run administrator account.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdminSetup {
  pub name: String,
  pub email: String,
  pub password: String,
}

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub role: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub page: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintFilter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assigned_to: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub page: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutageFilter {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub severity: Option<String>,
}

/// Flatten a serializable struct into request params, dropping nulls.
pub fn to_params<T: Serialize>(value: &T) -> Params {
  match serde_json::to_value(value) {
    Ok(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
    _ => Params::new(),
  }
}
