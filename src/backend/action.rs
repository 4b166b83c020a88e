//! Catalogue of every logical operation the backend exposes.

use serde_json::Value;

use super::Params;

/// HTTP verb of a logical operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
}

impl From<Method> for reqwest::Method {
  fn from(method: Method) -> Self {
    match method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

/// A logical backend operation, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiAction {
  Login,
  ValidateSession,
  Logout,
  GetUsers,
  CreateUser,
  UpdateUser,
  DeleteUser,
  GetComplaints,
  CreateComplaint,
  UpdateComplaint,
  DeleteComplaint,
  GetDashboardData,
  GetNotifications,
  CreateNotification,
  UpdateNotification,
  DeleteNotification,
  GetOutages,
  CreateOutage,
  UpdateOutage,
  DeleteOutage,
  CheckUsersExist,
  SetupAdmin,
}

impl ApiAction {
  /// Wire name used by the script backend and as the cache-key prefix.
  pub fn name(&self) -> &'static str {
    match self {
      Self::Login => "login",
      Self::ValidateSession => "validateSession",
      Self::Logout => "logout",
      Self::GetUsers => "getUsers",
      Self::CreateUser => "createUser",
      Self::UpdateUser => "updateUser",
      Self::DeleteUser => "deleteUser",
      Self::GetComplaints => "getComplaints",
      Self::CreateComplaint => "createComplaint",
      Self::UpdateComplaint => "updateComplaint",
      Self::DeleteComplaint => "deleteComplaint",
      Self::GetDashboardData => "getDashboardData",
      Self::GetNotifications => "getNotifications",
      Self::CreateNotification => "createNotification",
      Self::UpdateNotification => "updateNotification",
      Self::DeleteNotification => "deleteNotification",
      Self::GetOutages => "getOutages",
      Self::CreateOutage => "createOutage",
      Self::UpdateOutage => "updateOutage",
      Self::DeleteOutage => "deleteOutage",
      Self::CheckUsersExist => "checkUsersExist",
      Self::SetupAdmin => "setupAdmin",
    }
  }

  pub fn method(&self) -> Method {
    match self {
      Self::ValidateSession
      | Self::GetUsers
      | Self::GetComplaints
      | Self::GetDashboardData
      | Self::GetNotifications
      | Self::GetOutages
      | Self::CheckUsersExist => Method::Get,
      Self::UpdateUser | Self::UpdateComplaint | Self::UpdateNotification | Self::UpdateOutage => {
        Method::Put
      }
      Self::DeleteUser | Self::DeleteComplaint | Self::DeleteNotification | Self::DeleteOutage => {
        Method::Delete
      }
      Self::Login | Self::Logout | Self::CreateUser | Self::CreateComplaint
      | Self::CreateNotification | Self::CreateOutage | Self::SetupAdmin => Method::Post,
    }
  }

  pub fn is_read(&self) -> bool {
    self.method() == Method::Get
  }

  /// Reads whose results go through the cache store.
  pub fn is_cacheable(&self) -> bool {
    matches!(
      self,
      Self::GetUsers
        | Self::GetComplaints
        | Self::GetDashboardData
        | Self::GetNotifications
        | Self::GetOutages
    )
  }

  /// Does the action need a session token?
  pub fn requires_auth(&self) -> bool {
    !matches!(self, Self::Login | Self::CheckUsersExist | Self::SetupAdmin)
  }

  /// Cache-key prefixes a successful (or attempted) mutation makes stale.
  pub fn invalidates(&self) -> &'static [ApiAction] {
    match self {
      Self::CreateUser | Self::UpdateUser | Self::DeleteUser | Self::SetupAdmin => {
        &[Self::GetUsers, Self::GetDashboardData]
      }
      Self::CreateComplaint | Self::UpdateComplaint | Self::DeleteComplaint => {
        &[Self::GetComplaints, Self::GetDashboardData]
      }
      Self::CreateNotification | Self::UpdateNotification | Self::DeleteNotification => {
        &[Self::GetNotifications, Self::GetDashboardData]
      }
      Self::CreateOutage | Self::UpdateOutage | Self::DeleteOutage => {
        &[Self::GetOutages, Self::GetDashboardData]
      }
      _ => &[],
    }
  }

  /// Route on the relational API: method, collection path, and the record
  /// id (taken from the `id` parameter) for update and delete. The id is a
  /// single path segment and still needs encoding.
  pub fn rest_route(&self, params: &Params) -> (Method, &'static str, Option<String>) {
    let path = match self {
      Self::Login => "/auth/login",
      Self::ValidateSession => "/auth/session",
      Self::Logout => "/auth/logout",
      Self::GetDashboardData => "/dashboard",
      Self::CheckUsersExist => "/setup/status",
      Self::SetupAdmin => "/setup/admin",
      Self::GetUsers | Self::CreateUser | Self::UpdateUser | Self::DeleteUser => "/users",
      Self::GetComplaints
      | Self::CreateComplaint
      | Self::UpdateComplaint
      | Self::DeleteComplaint => "/complaints",
      Self::GetNotifications
      | Self::CreateNotification
      | Self::UpdateNotification
      | Self::DeleteNotification => "/notifications",
      Self::GetOutages | Self::CreateOutage | Self::UpdateOutage | Self::DeleteOutage => "/outages",
    };
    let id = match self.method() {
      Method::Put | Method::Delete => params.get("id").map(id_segment),
      Method::Get | Method::Post => None,
    };
    (self.method(), path, id)
  }

  /// Key under which list payloads are wrapped by backends that wrap them.
  pub fn collection_key(&self) -> Option<&'static str> {
    match self {
      Self::GetUsers => Some("users"),
      Self::GetComplaints => Some("complaints"),
      Self::GetNotifications => Some("notifications"),
      Self::GetOutages => Some("outages"),
      _ => None,
    }
  }
}

fn id_segment(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
