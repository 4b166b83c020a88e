//! Unwraps transport-specific payload shapes into a `ResponseEnvelope`.
//!
//! Shapes seen in the wild:
//! - `{success, data, error?, message?, pagination?}` from the script backend
//! - `{success: true, user, token}` (payload beside the flag, no `data`)
//! - a bare array or object from the relational API
//! - `{complaints: [...], pagination}` wrappers around list payloads

use serde_json::{Map, Value};

use super::action::ApiAction;
use super::envelope::{Pagination, ResponseEnvelope};
use super::error::{is_auth_message, ApiError};

const ENVELOPE_FIELDS: &[&str] = &["success", "data", "error", "message", "pagination"];

/// Normalize a decoded JSON body for `action`.
///
/// Auth-class failures become `Err(Unauthorized)`; other `success:false`
/// bodies stay `Ok` because they are authoritative business answers.
pub fn normalize(action: ApiAction, raw: Value) -> Result<ResponseEnvelope, ApiError> {
  let mut map = match raw {
    Value::Object(map) => map,
    other => return Ok(ResponseEnvelope::ok(other)),
  };

  let success = match map.get("success") {
    Some(Value::Bool(flag)) => *flag,
    _ => {
      let (data, pagination) = unwrap_collection(action, Value::Object(map));
      return Ok(with_pagination(ResponseEnvelope::ok(data), pagination));
    }
  };

  let error = take_string(&mut map, "error");
  let message = take_string(&mut map, "message");

  if !success {
    let text = error
      .or_else(|| message.clone())
      .unwrap_or_else(|| format!("{} failed", action.name()));
    if is_auth_message(&text) {
      return Err(ApiError::Unauthorized(text));
    }
    let mut envelope = ResponseEnvelope::failure(text);
    envelope.message = message;
    return Ok(envelope);
  }

  let top_pagination = map.remove("pagination").and_then(parse_pagination);
  let data = match map.remove("data") {
    Some(data) => data,
    None => leftover_payload(map),
  };
  let (data, inner_pagination) = unwrap_collection(action, data);

  let mut envelope = ResponseEnvelope::ok(data);
  envelope.message = message;
  Ok(with_pagination(envelope, top_pagination.or(inner_pagination)))
}

/// Normalize a non-2xx reply. Auth and server failures stay errors; any other
/// status is the backend's answer and becomes a `success:false` envelope.
pub fn normalize_error_status(status: u16, body: &str) -> Result<ResponseEnvelope, ApiError> {
  match ApiError::from_status(status, &error_text(body)) {
    ApiError::Rejected(text) => Ok(ResponseEnvelope::failure(text)),
    err => Err(err),
  }
}

/// Pull a readable message out of an error body.
fn error_text(body: &str) -> String {
  match serde_json::from_str::<Value>(body) {
    Ok(Value::Object(map)) => ["error", "message", "msg"]
      .iter()
      .find_map(|field| map.get(*field).and_then(Value::as_str))
      .map(String::from)
      .unwrap_or_else(|| body.to_string()),
    _ => body.to_string(),
  }
}

/// Fields the backend put beside `success` when it omitted `data`.
fn leftover_payload(map: Map<String, Value>) -> Value {
  let rest: Map<String, Value> = map
    .into_iter()
    .filter(|(k, _)| !ENVELOPE_FIELDS.contains(&k.as_str()))
    .collect();
  if rest.is_empty() {
    Value::Null
  } else {
    Value::Object(rest)
  }
}

fn unwrap_collection(action: ApiAction, data: Value) -> (Value, Option<Pagination>) {
  let Some(key) = action.collection_key() else {
    return (data, None);
  };
  match data {
    Value::Object(mut map) if matches!(map.get(key), Some(Value::Array(_))) => {
      let pagination = map.remove("pagination").and_then(parse_pagination);
      let items = map.remove(key).unwrap_or(Value::Null);
      (items, pagination)
    }
    other => (other, None),
  }
}

fn parse_pagination(value: Value) -> Option<Pagination> {
  serde_json::from_value(value).ok()
}

fn take_string(map: &mut Map<String, Value>, field: &str) -> Option<String> {
  match map.remove(field) {
    Some(Value::String(s)) => Some(s),
    Some(Value::Null) | None => None,
    Some(other) => Some(other.to_string()),
  }
}

fn with_pagination(envelope: ResponseEnvelope, pagination: Option<Pagination>) -> ResponseEnvelope {
  match pagination {
    Some(p) => envelope.with_pagination(p),
    None => envelope,
  }
}
