//! Demo fallback dataset.
//!
//! A static, in-memory seed set that answers every action when the real
//! backend is unreachable. Mutations append to the seed arrays for the life
//! of the process only and are never reconciled with a backend.
//!
//! Envelopes come back unmarked; the service tags them with
//! [`ResponseEnvelope::into_demo`] before handing them out.

pub mod seed;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::backend::{ApiAction, Pagination, Params, ResponseEnvelope};

const DEMO_TOKEN_PREFIX: &str = "demo-token-";

/// Fields matched by the free-text `search` parameter.
const SEARCH_FIELDS: &[&str] = &["title", "name", "description", "customerName", "email", "address"];

/// Params that shape the result instead of filtering records.
const PAGING_PARAMS: &[&str] = &["page", "limit", "search"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
  Users,
  Complaints,
  Notifications,
  Outages,
}

impl Collection {
  fn id_prefix(&self) -> &'static str {
    match self {
      Self::Users => "USR",
      Self::Complaints => "CMP",
      Self::Notifications => "NTF",
      Self::Outages => "OUT",
    }
  }

  fn label(&self) -> &'static str {
    match self {
      Self::Users => "User",
      Self::Complaints => "Complaint",
      Self::Notifications => "Notification",
      Self::Outages => "Outage",
    }
  }
}

#[derive(Debug, Clone, Copy)]
enum Op {
  List,
  Create,
  Update,
  Delete,
}

fn route(action: ApiAction) -> Option<(Collection, Op)> {
  use ApiAction::*;
  let routed = match action {
    GetUsers => (Collection::Users, Op::List),
    CreateUser => (Collection::Users, Op::Create),
    UpdateUser => (Collection::Users, Op::Update),
    DeleteUser => (Collection::Users, Op::Delete),
    GetComplaints => (Collection::Complaints, Op::List),
    CreateComplaint => (Collection::Complaints, Op::Create),
    UpdateComplaint => (Collection::Complaints, Op::Update),
    DeleteComplaint => (Collection::Complaints, Op::Delete),
    GetNotifications => (Collection::Notifications, Op::List),
    CreateNotification => (Collection::Notifications, Op::Create),
    UpdateNotification => (Collection::Notifications, Op::Update),
    DeleteNotification => (Collection::Notifications, Op::Delete),
    GetOutages => (Collection::Outages, Op::List),
    CreateOutage => (Collection::Outages, Op::Create),
    UpdateOutage => (Collection::Outages, Op::Update),
    DeleteOutage => (Collection::Outages, Op::Delete),
    _ => return None,
  };
  Some(routed)
}

struct DemoState {
  users: Vec<Value>,
  complaints: Vec<Value>,
  notifications: Vec<Value>,
  outages: Vec<Value>,
}

impl DemoState {
  fn records(&self, collection: Collection) -> &Vec<Value> {
    match collection {
      Collection::Users => &self.users,
      Collection::Complaints => &self.complaints,
      Collection::Notifications => &self.notifications,
      Collection::Outages => &self.outages,
    }
  }

  fn records_mut(&mut self, collection: Collection) -> &mut Vec<Value> {
    match collection {
      Collection::Users => &mut self.users,
      Collection::Complaints => &mut self.complaints,
      Collection::Notifications => &mut self.notifications,
      Collection::Outages => &mut self.outages,
    }
  }
}

/// In-memory stand-in for the backend.
pub struct DemoDataset {
  state: Mutex<DemoState>,
  next_id: AtomicU64,
}

impl Default for DemoDataset {
  fn default() -> Self {
    Self::new()
  }
}

impl DemoDataset {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(DemoState {
        users: seed::users(),
        complaints: seed::complaints(),
        notifications: seed::notifications(),
        outages: seed::outages(),
      }),
      next_id: AtomicU64::new(2001),
    }
  }

  /// Answer `action` from the dataset.
  pub fn answer(&self, action: ApiAction, params: &Params, token: Option<&str>) -> ResponseEnvelope {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some((collection, op)) = route(action) {
      return match op {
        Op::List => list(state.records(collection), collection, params),
        Op::Create => self.create(&mut state, collection, params),
        Op::Update => update(&mut state, collection, params),
        Op::Delete => delete(&mut state, collection, params),
      };
    }

    match action {
      ApiAction::Login => login(&state, params),
      ApiAction::ValidateSession => validate_session(&state, token),
      ApiAction::Logout => ResponseEnvelope::ok(Value::Null).with_message("Logged out"),
      ApiAction::GetDashboardData => dashboard(&state),
      ApiAction::CheckUsersExist => ResponseEnvelope::ok(json!({
        "usersExist": !state.users.is_empty()
      })),
      ApiAction::SetupAdmin => {
        let admin_exists = state
          .users
          .iter()
          .any(|u| u.get("role").and_then(Value::as_str) == Some("admin"));
        if admin_exists {
          return ResponseEnvelope::failure("Admin already exists");
        }
        let mut params = params.clone();
        params.insert("role".into(), json!("admin"));
        self.create(&mut state, Collection::Users, &params)
      }
      _ => ResponseEnvelope::failure(format!("{} is not available in demo mode", action.name())),
    }
  }

  fn create(&self, state: &mut DemoState, collection: Collection, params: &Params) -> ResponseEnvelope {
    if collection == Collection::Users {
      let email = params.get("email").and_then(Value::as_str).unwrap_or_default();
      if email.is_empty() {
        return ResponseEnvelope::failure("Email is required");
      }
      if find_user_by_email(state, email).is_some() {
        return ResponseEnvelope::failure("A user with this email already exists");
      }
    }

    let now = Utc::now().to_rfc3339();
    let id = format!(
      "{}-{}",
      collection.id_prefix(),
      self.next_id.fetch_add(1, Ordering::Relaxed)
    );

    let mut record = Map::new();
    match collection {
      Collection::Users => {
        record.insert("role".into(), json!("agent"));
        record.insert("isActive".into(), json!(true));
      }
      Collection::Complaints => {
        record.insert("status".into(), json!("open"));
        record.insert("priority".into(), json!("medium"));
        record.insert("assignedTo".into(), Value::Null);
      }
      Collection::Notifications => {
        record.insert("isRead".into(), json!(false));
      }
      Collection::Outages => {
        record.insert("status".into(), json!("active"));
      }
    }
    merge_fields(&mut record, params);
    record.insert("id".into(), json!(id));
    record.insert("createdAt".into(), json!(now));
    record.insert("updatedAt".into(), json!(now));

    let record = Value::Object(record);
    let public = public_view(collection, &record);
    state.records_mut(collection).push(record);

    ResponseEnvelope::ok(public).with_message(format!("{} created", collection.label()))
  }
}

fn list(records: &[Value], collection: Collection, params: &Params) -> ResponseEnvelope {
  let search = params
    .get("search")
    .and_then(Value::as_str)
    .map(str::to_lowercase)
    .filter(|s| !s.is_empty());

  let mut matched: Vec<&Value> = records
    .iter()
    .filter(|record| {
      params
        .iter()
        .filter(|(k, _)| !PAGING_PARAMS.contains(&k.as_str()))
        .all(|(k, wanted)| field_matches(record.get(k), wanted))
    })
    .filter(|record| match &search {
      Some(needle) => SEARCH_FIELDS.iter().any(|field| {
        record
          .get(*field)
          .and_then(Value::as_str)
          .is_some_and(|v| v.to_lowercase().contains(needle.as_str()))
      }),
      None => true,
    })
    .collect();

  // Newest first; RFC 3339 strings order lexicographically.
  matched.sort_by(|a, b| created_at(b).cmp(created_at(a)));

  let total = matched.len() as u64;
  let limit = params.get("limit").and_then(as_u64);
  let page = params.get("page").and_then(as_u64).unwrap_or(1).max(1);

  let (items, pagination) = match limit {
    Some(limit) if limit > 0 => {
      // Pages past the end, however far, are empty.
      let start = (page - 1)
        .checked_mul(limit)
        .and_then(|start| usize::try_from(start).ok())
        .unwrap_or(usize::MAX);
      let take = usize::try_from(limit).unwrap_or(usize::MAX);
      let items: Vec<&Value> = matched.into_iter().skip(start).take(take).collect();
      (items, Some(Pagination::new(page, limit, total)))
    }
    _ => (matched, None),
  };

  let data: Vec<Value> = items.into_iter().map(|r| public_view(collection, r)).collect();
  let envelope = ResponseEnvelope::ok(Value::Array(data))
    .with_message(format!("{} {} record(s)", total, collection.label().to_lowercase()));
  match pagination {
    Some(p) => envelope.with_pagination(p),
    None => envelope,
  }
}

fn update(state: &mut DemoState, collection: Collection, params: &Params) -> ResponseEnvelope {
  let Some(id) = params.get("id").map(id_string) else {
    return ResponseEnvelope::failure(format!("{} id is required", collection.label()));
  };

  let records = state.records_mut(collection);
  let Some(record) = records.iter_mut().find(|r| r.get("id").map(id_string).as_ref() == Some(&id)) else {
    return ResponseEnvelope::failure(format!("{} not found", collection.label()));
  };

  if let Value::Object(fields) = &mut *record {
    merge_fields(fields, params);
    fields.insert("updatedAt".into(), json!(Utc::now().to_rfc3339()));
  }
  let public = public_view(collection, record);
  ResponseEnvelope::ok(public).with_message(format!("{} updated", collection.label()))
}

fn delete(state: &mut DemoState, collection: Collection, params: &Params) -> ResponseEnvelope {
  let Some(id) = params.get("id").map(id_string) else {
    return ResponseEnvelope::failure(format!("{} id is required", collection.label()));
  };

  let records = state.records_mut(collection);
  let before = records.len();
  records.retain(|r| r.get("id").map(id_string).as_ref() != Some(&id));
  if records.len() == before {
    return ResponseEnvelope::failure(format!("{} not found", collection.label()));
  }
  ResponseEnvelope::ok(json!({ "id": id })).with_message(format!("{} deleted", collection.label()))
}

fn login(state: &DemoState, params: &Params) -> ResponseEnvelope {
  let email = params.get("email").and_then(Value::as_str).unwrap_or_default();
  let password = params.get("password").and_then(Value::as_str).unwrap_or_default();

  let Some(user) = find_user_by_email(state, email) else {
    return ResponseEnvelope::failure("Invalid email or password");
  };
  let digest = user.get("passwordHash").and_then(Value::as_str);
  if digest != Some(hash_password(password).as_str()) {
    return ResponseEnvelope::failure("Invalid email or password");
  }
  if user.get("isActive").and_then(Value::as_bool) == Some(false) {
    return ResponseEnvelope::failure("Account is disabled");
  }

  let id = user.get("id").map(id_string).unwrap_or_default();
  ResponseEnvelope::ok(json!({
    "user": public_view(Collection::Users, user),
    "token": format!("{}{}", DEMO_TOKEN_PREFIX, id),
  }))
  .with_message("Login successful")
}

fn validate_session(state: &DemoState, token: Option<&str>) -> ResponseEnvelope {
  let user = token
    .and_then(|t| t.strip_prefix(DEMO_TOKEN_PREFIX))
    .and_then(|id| {
      state
        .users
        .iter()
        .find(|u| u.get("id").and_then(Value::as_str) == Some(id))
    });
  match user {
    Some(user) => ResponseEnvelope::ok(json!({ "user": public_view(Collection::Users, user) })),
    None => ResponseEnvelope::failure("Invalid session"),
  }
}

fn dashboard(state: &DemoState) -> ResponseEnvelope {
  let count_status = |status: &str| {
    state
      .complaints
      .iter()
      .filter(|c| c.get("status").and_then(Value::as_str) == Some(status))
      .count()
  };

  let mut by_priority = Map::new();
  let mut by_category = Map::new();
  for complaint in &state.complaints {
    for (field, bucket) in [("priority", &mut by_priority), ("category", &mut by_category)] {
      if let Some(value) = complaint.get(field).and_then(Value::as_str) {
        let entry = bucket.entry(value.to_string()).or_insert(json!(0));
        let count = entry.as_u64().unwrap_or(0) + 1;
        *entry = Value::from(count);
      }
    }
  }

  let mut recent: Vec<&Value> = state.complaints.iter().collect();
  recent.sort_by(|a, b| created_at(b).cmp(created_at(a)));
  let recent: Vec<Value> = recent.into_iter().take(5).cloned().collect();

  let active_outages = state
    .outages
    .iter()
    .filter(|o| o.get("status").and_then(Value::as_str) == Some("active"))
    .count();
  let unread = state
    .notifications
    .iter()
    .filter(|n| n.get("isRead").and_then(Value::as_bool) == Some(false))
    .count();

  ResponseEnvelope::ok(json!({
    "totalComplaints": state.complaints.len(),
    "openComplaints": count_status("open"),
    "inProgressComplaints": count_status("in_progress"),
    "resolvedComplaints": count_status("resolved"),
    "closedComplaints": count_status("closed"),
    "byPriority": by_priority,
    "byCategory": by_category,
    "activeOutages": active_outages,
    "unreadNotifications": unread,
    "totalUsers": state.users.len(),
    "recentComplaints": recent,
  }))
}

fn find_user_by_email<'a>(state: &'a DemoState, email: &str) -> Option<&'a Value> {
  state.users.iter().find(|u| {
    u.get("email")
      .and_then(Value::as_str)
      .is_some_and(|e| e.eq_ignore_ascii_case(email.trim()))
  })
}

/// Copy request fields onto a record. Passwords are stored as digests.
fn merge_fields(record: &mut Map<String, Value>, params: &Params) {
  for (key, value) in params {
    match key.as_str() {
      "id" | "createdAt" | "token" => {}
      "password" => {
        if let Some(password) = value.as_str() {
          record.insert("passwordHash".into(), json!(hash_password(password)));
        }
      }
      _ => {
        record.insert(key.clone(), value.clone());
      }
    }
  }
}

fn public_view(collection: Collection, record: &Value) -> Value {
  let mut record = record.clone();
  if collection == Collection::Users {
    if let Value::Object(ref mut fields) = record {
      fields.remove("passwordHash");
    }
  }
  record
}

fn field_matches(actual: Option<&Value>, wanted: &Value) -> bool {
  match (actual, wanted) {
    (_, Value::Null) => true,
    (Some(Value::String(a)), Value::String(w)) => a.eq_ignore_ascii_case(w),
    (Some(a), Value::String(w)) => id_string(a) == *w,
    (Some(a), w) => a == w,
    (None, _) => false,
  }
}

fn created_at(record: &Value) -> &str {
  record.get("createdAt").and_then(Value::as_str).unwrap_or_default()
}

fn as_u64(value: &Value) -> Option<u64> {
  value
    .as_u64()
    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn id_string(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

pub fn hash_password(password: &str) -> String {
  hex::encode(Sha256::digest(password.as_bytes()))
}
