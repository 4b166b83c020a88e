//! The API service: every operation the UI consumes, routed through the
//! optimistic overlay, the response cache, request de-duplication, retries,
//! and the demo fallback.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{
  ApiAction, ApiError, Backend, Params, Request, ResponseEnvelope, RestTransport, ScriptTransport,
};
use crate::cache::{cache_key, CacheStore, OptimisticOverlay, RequestDeduplicator};
use crate::config::{BackendKind, ClientSettings, Config};
use crate::demo::DemoDataset;
use crate::models::{
  to_params, AdminSetup, ComplaintFilter, NewComplaint, NewNotification, NewOutage, NewUser,
  OutageFilter, UserFilter,
};
use crate::resilience::{BackendAvailability, ConnectionStatus, RetryPolicy};
use crate::session::{Session, SessionStore};

/// Settled outcome of one logical call.
pub type ApiResult = Result<ResponseEnvelope, ApiError>;

struct ServiceInner {
  settings: ClientSettings,
  backend: Arc<dyn Backend>,
  cache: CacheStore,
  overlay: Arc<OptimisticOverlay>,
  pending: RequestDeduplicator<ApiResult>,
  availability: BackendAvailability,
  retry: RetryPolicy,
  demo: DemoDataset,
  session: Session,
}

/// Client for the complaint-management backend.
///
/// Cheap to clone; clones share cache, session, and availability state.
#[derive(Clone)]
pub struct ApiService {
  inner: Arc<ServiceInner>,
}

impl ApiService {
  pub fn new(settings: ClientSettings, backend: Arc<dyn Backend>, session: Session) -> Self {
    let cache = CacheStore::new(settings.cache_ttl(), settings.max_cache_entries);
    let retry = RetryPolicy::new(settings.retry_attempts, settings.retry_delay());
    Self {
      inner: Arc::new(ServiceInner {
        settings,
        backend,
        cache,
        overlay: OptimisticOverlay::new(),
        pending: RequestDeduplicator::new(),
        availability: BackendAvailability::new(),
        retry,
        demo: DemoDataset::new(),
        session,
      }),
    }
  }

  /// Build the configured transport and open the persisted session.
  pub fn from_config(config: &Config) -> Result<Self> {
    let settings = config.client.clone();
    let client = reqwest::Client::builder()
      .timeout(settings.request_timeout())
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    let backend: Arc<dyn Backend> = match config.backend.kind {
      BackendKind::Script => {
        let endpoint = Url::parse(&config.backend.url)
          .map_err(|e| eyre!("Invalid backend url {:?}: {}", config.backend.url, e))?;
        Arc::new(ScriptTransport::new(endpoint, client))
      }
      BackendKind::Relational => Arc::new(RestTransport::new(
        client,
        &config.backend.url,
        config.backend.api_key(),
      )),
    };
    info!(backend = backend.name(), url = %config.backend.url, "Backend selected");

    let session = Session::new(SessionStore::open()?);
    Ok(Self::new(settings, backend, session))
  }

  pub fn settings(&self) -> &ClientSettings {
    &self.inner.settings
  }

  pub fn availability(&self) -> &BackendAvailability {
    &self.inner.availability
  }

  pub fn status(&self) -> ConnectionStatus {
    self.inner.availability.status()
  }

  pub fn is_authenticated(&self) -> bool {
    self.inner.session.is_authenticated()
  }

  pub fn backend_name(&self) -> &'static str {
    self.inner.backend.name()
  }

  /// Speculative entry for a cache key, if a mutation is in flight.
  pub fn optimistic(&self, key: &str) -> Option<ResponseEnvelope> {
    self.inner.overlay.get(key)
  }

  #[cfg(test)]
  pub(crate) fn cache(&self) -> &CacheStore {
    &self.inner.cache
  }

  // ==========================================================================
  // Request plumbing
  // ==========================================================================

  /// Read path: overlay, then cache, then one shared network call per key.
  async fn read(&self, action: ApiAction, params: Params) -> ApiResult {
    if !action.is_cacheable() {
      return self.call(action, params).await;
    }

    let key = cache_key(action.name(), &params);
    if let Some(envelope) = self.inner.overlay.get(&key) {
      debug!(key, "Optimistic hit");
      return Ok(envelope);
    }
    if let Some(envelope) = self.inner.cache.get(&key) {
      debug!(key, "Cache hit");
      return Ok(envelope);
    }
    debug!(key, "Cache miss");

    let service = self.clone();
    let owned_key = key.clone();
    let fallback_params = params.clone();
    let result = self
      .inner
      .pending
      .run(&key, move || async move {
        service.fetch_and_store(action, params, owned_key).await
      })
      .await;

    // A joined background refresh settles without retries or fallback.
    match result {
      Err(err) if err.is_transient() && self.inner.settings.fallback_enabled => {
        warn!(action = action.name(), error = %err, "Shared refresh failed, falling back to demo data");
        Ok(self.demo_answer(action, &fallback_params))
      }
      other => other,
    }
  }

  async fn fetch_and_store(&self, action: ApiAction, params: Params, key: String) -> ApiResult {
    // Invalidations after this point make the answer stale.
    let epoch = self.inner.cache.epoch();
    let result = self.call(action, params).await;

    if let Ok(envelope) = &result {
      if envelope.success && !envelope.is_demo() {
        if !self.inner.cache.set_if_current(&key, envelope.clone(), epoch) {
          debug!(key, "Discarding read that raced an invalidation");
        }
      }
    }
    result
  }

  /// One logical call with retries and demo fallback.
  async fn call(&self, action: ApiAction, params: Params) -> ApiResult {
    let inner = &self.inner;

    if inner.settings.fallback_enabled
      && !inner.availability.is_available()
      && inner.availability.is_paused()
    {
      debug!(action = action.name(), "Backend paused, answering from demo data");
      return Ok(self.demo_answer(action, &params));
    }

    let token = if action.requires_auth() {
      inner.session.token()
    } else {
      None
    };
    let request = Request {
      action,
      params,
      token,
      timeout: inner.settings.request_timeout(),
    };

    let result = inner
      .retry
      .run(&inner.availability, |attempt| {
        let backend = Arc::clone(&inner.backend);
        let request = request.clone();
        async move {
          debug!(action = request.action.name(), attempt, "Calling backend");
          backend.request(request).await
        }
      })
      .await;

    match result {
      Ok(envelope) => {
        if action.is_read() {
          inner.availability.mark_success();
        }
        Ok(envelope)
      }
      Err(err) if err.is_transient() && inner.settings.fallback_enabled => {
        warn!(action = action.name(), error = %err, "Backend unreachable, falling back to demo data");
        Ok(self.demo_answer(action, &request.params))
      }
      Err(err) => Err(err),
    }
  }

  fn demo_answer(&self, action: ApiAction, params: &Params) -> ResponseEnvelope {
    self.inner.availability.mark_serving_demo();
    let token = self.inner.session.token();
    self
      .inner
      .demo
      .answer(action, params, token.as_deref())
      .into_demo()
  }

  /// Write path. The optimistic entry lives exactly as long as the call, and
  /// affected reads are invalidated before the result is handed back.
  async fn mutate(
    &self,
    action: ApiAction,
    params: Params,
    optimistic: Option<(String, ResponseEnvelope)>,
  ) -> ApiResult {
    let _guard = optimistic.map(|(key, envelope)| self.inner.overlay.set_scoped(&key, envelope));
    let result = self.call(action, params).await;
    self.invalidate_for(action);
    result
  }

  fn invalidate_for(&self, action: ApiAction) {
    for target in action.invalidates() {
      self.invalidate(target.name());
    }
  }

  /// Drop cached reads, optimistic entries and in-flight requests for one
  /// key or every key built from an action name.
  pub fn invalidate(&self, prefix_or_key: &str) -> usize {
    let removed = self.inner.cache.invalidate(prefix_or_key);
    self.inner.overlay.clear_matching(prefix_or_key);
    self.inner.pending.forget_matching(prefix_or_key);
    debug!(prefix = prefix_or_key, removed, "Invalidated cached reads");
    removed
  }

  /// Drop every cached read and in-flight request.
  fn drop_reads(&self) {
    self.inner.cache.clear();
    self.inner.overlay.clear_all();
    self.inner.pending.forget_all();
  }

  /// Single-attempt refresh used by the background synchronizer.
  ///
  /// Skips retries and fallback; a success is written to the cache under the
  /// same key a foreground read would use. Cacheable refreshes share the
  /// in-flight table with foreground reads, so a read already running for the
  /// key is joined instead of repeated.
  pub async fn refresh(&self, action: ApiAction, params: Params, timeout: Duration) -> ApiResult {
    if !action.is_cacheable() {
      return self.refresh_once(action, params, timeout, None).await;
    }

    let key = cache_key(action.name(), &params);
    let service = self.clone();
    let owned_key = key.clone();
    let result = self
      .inner
      .pending
      .run(&key, move || async move {
        service
          .refresh_once(action, params, timeout, Some(owned_key))
          .await
      })
      .await;

    // A joined foreground read may have settled from demo data.
    match result {
      Ok(envelope) if envelope.is_demo() => Err(ApiError::Network(format!(
        "{} answered from demo data",
        action.name()
      ))),
      other => other,
    }
  }

  async fn refresh_once(
    &self,
    action: ApiAction,
    params: Params,
    timeout: Duration,
    key: Option<String>,
  ) -> ApiResult {
    let epoch = self.inner.cache.epoch();
    let token = if action.requires_auth() {
      self.inner.session.token()
    } else {
      None
    };
    let request = Request {
      action,
      params,
      token,
      timeout,
    };

    let envelope = tokio::time::timeout(timeout, self.inner.backend.request(request))
      .await
      .map_err(|_| ApiError::Timeout(timeout.as_millis() as u64))??;

    if let Some(key) = key {
      if envelope.success {
        self.inner.cache.set_if_current(&key, envelope.clone(), epoch);
      }
    }
    Ok(envelope)
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  pub async fn login(&self, email: &str, password: &str) -> ApiResult {
    let params = object(json!({ "email": email, "password": password }));
    let envelope = self.call(ApiAction::Login, params).await?;

    if envelope.success {
      let token = envelope
        .data
        .as_ref()
        .and_then(|d| d.get("token"))
        .and_then(Value::as_str);
      match token {
        Some(token) => {
          self.drop_reads();
          self.inner.session.set_token(token);
          info!(email, demo = envelope.is_demo(), "Logged in");
        }
        None => warn!("Login succeeded without a session token"),
      }
    }
    Ok(envelope)
  }

  /// Check the current token with the backend. A session the backend rejects
  /// is cleared locally; demo answers never clear it.
  pub async fn validate_session(&self) -> ApiResult {
    if !self.inner.session.is_authenticated() {
      return Ok(ResponseEnvelope::failure("No active session"));
    }

    match self.call(ApiAction::ValidateSession, Params::new()).await {
      // The demo dataset does not know real tokens; keep the session.
      Ok(envelope) if envelope.is_demo() => {
        debug!("Session check answered from demo data, keeping token");
        Ok(envelope)
      }
      Ok(envelope) if !envelope.success => {
        info!(error = ?envelope.error, "Session rejected, clearing");
        self.clear_session();
        Ok(envelope)
      }
      Err(err) if err.is_auth() => {
        info!(error = %err, "Session expired, clearing");
        self.clear_session();
        Err(err)
      }
      other => other,
    }
  }

  /// Validate a token persisted by an earlier run. `None` when there is none.
  pub async fn restore_session(&self) -> Result<Option<ResponseEnvelope>, ApiError> {
    if !self.inner.session.is_authenticated() {
      debug!("No persisted session");
      return Ok(None);
    }
    self.validate_session().await.map(Some)
  }

  pub async fn logout(&self) -> ApiResult {
    let result = if self.inner.session.is_authenticated() {
      self.call(ApiAction::Logout, Params::new()).await
    } else {
      Ok(ResponseEnvelope::ok(Value::Null).with_message("Logged out"))
    };
    if let Err(err) = &result {
      warn!(error = %err, "Logout call failed, clearing local session anyway");
    }
    self.clear_session();
    result
  }

  /// Forget the token and everything read with it.
  pub fn clear_session(&self) {
    self.inner.session.clear();
    self.drop_reads();
  }

  // ==========================================================================
  // Users
  // ==========================================================================

  pub async fn get_users(&self, filter: &UserFilter) -> ApiResult {
    self.read(ApiAction::GetUsers, to_params(filter)).await
  }

  pub async fn create_user(&self, user: &NewUser) -> ApiResult {
    self.mutate(ApiAction::CreateUser, to_params(user), None).await
  }

  pub async fn update_user(&self, id: &str, updates: Params) -> ApiResult {
    self.mutate(ApiAction::UpdateUser, with_id(id, updates), None).await
  }

  pub async fn delete_user(&self, id: &str) -> ApiResult {
    self.mutate(ApiAction::DeleteUser, with_id(id, Params::new()), None).await
  }

  // ==========================================================================
  // Complaints
  // ==========================================================================

  pub async fn get_complaints(&self, filter: &ComplaintFilter) -> ApiResult {
    self.read(ApiAction::GetComplaints, to_params(filter)).await
  }

  /// File a complaint. The unfiltered list shows a provisional record until
  /// the backend answers.
  pub async fn create_complaint(&self, complaint: &NewComplaint) -> ApiResult {
    let key = complaints_key();
    let provisional = complaint.provisional(Utc::now());
    let optimistic = self.prepend_to_list(&key, provisional);
    self
      .mutate(ApiAction::CreateComplaint, to_params(complaint), Some((key, optimistic)))
      .await
  }

  pub async fn update_complaint(&self, id: &str, updates: Params) -> ApiResult {
    let key = complaints_key();
    let optimistic = self
      .patch_list_item(&key, id, &updates)
      .map(|envelope| (key, envelope));
    self
      .mutate(ApiAction::UpdateComplaint, with_id(id, updates), optimistic)
      .await
  }

  pub async fn delete_complaint(&self, id: &str) -> ApiResult {
    self.mutate(ApiAction::DeleteComplaint, with_id(id, Params::new()), None).await
  }

  fn current_list(&self, key: &str) -> Option<ResponseEnvelope> {
    self
      .inner
      .overlay
      .get(key)
      .or_else(|| self.inner.cache.get(key))
  }

  fn prepend_to_list(&self, key: &str, record: Value) -> ResponseEnvelope {
    let mut items = match self.current_list(key).and_then(|e| e.data) {
      Some(Value::Array(items)) => items,
      _ => Vec::new(),
    };
    items.insert(0, record);
    ResponseEnvelope::ok(Value::Array(items))
  }

  fn patch_list_item(&self, key: &str, id: &str, updates: &Params) -> Option<ResponseEnvelope> {
    let mut envelope = self.current_list(key)?;
    {
      let items = envelope.data.as_mut()?.as_array_mut()?;
      let record = items
        .iter_mut()
        .find(|r| r.get("id").and_then(Value::as_str) == Some(id))?;
      let fields = record.as_object_mut()?;
      for (k, v) in updates {
        fields.insert(k.clone(), v.clone());
      }
    }
    Some(envelope)
  }

  // ==========================================================================
  // Dashboard, notifications, outages
  // ==========================================================================

  pub async fn get_dashboard_data(&self) -> ApiResult {
    self.read(ApiAction::GetDashboardData, Params::new()).await
  }

  pub async fn get_notifications(&self) -> ApiResult {
    self.read(ApiAction::GetNotifications, Params::new()).await
  }

  pub async fn create_notification(&self, notification: &NewNotification) -> ApiResult {
    self
      .mutate(ApiAction::CreateNotification, to_params(notification), None)
      .await
  }

  pub async fn update_notification(&self, id: &str, updates: Params) -> ApiResult {
    self
      .mutate(ApiAction::UpdateNotification, with_id(id, updates), None)
      .await
  }

  pub async fn delete_notification(&self, id: &str) -> ApiResult {
    self
      .mutate(ApiAction::DeleteNotification, with_id(id, Params::new()), None)
      .await
  }

  pub async fn get_outages(&self, filter: &OutageFilter) -> ApiResult {
    self.read(ApiAction::GetOutages, to_params(filter)).await
  }

  pub async fn create_outage(&self, outage: &NewOutage) -> ApiResult {
    self.mutate(ApiAction::CreateOutage, to_params(outage), None).await
  }

  pub async fn update_outage(&self, id: &str, updates: Params) -> ApiResult {
    self.mutate(ApiAction::UpdateOutage, with_id(id, updates), None).await
  }

  pub async fn delete_outage(&self, id: &str) -> ApiResult {
    self.mutate(ApiAction::DeleteOutage, with_id(id, Params::new()), None).await
  }

  // ==========================================================================
  // First-run setup
  // ==========================================================================

  pub async fn check_users_exist(&self) -> ApiResult {
    self.call(ApiAction::CheckUsersExist, Params::new()).await
  }

  pub async fn setup_admin(&self, admin: &AdminSetup) -> ApiResult {
    self.mutate(ApiAction::SetupAdmin, to_params(admin), None).await
  }
}

/// Key of the unfiltered complaints list, the one optimistic updates target.
fn complaints_key() -> String {
  cache_key(ApiAction::GetComplaints.name(), &Params::new())
}

fn with_id(id: &str, mut params: Params) -> Params {
  params.insert("id".into(), Value::String(id.to_string()));
  params
}

fn object(value: Value) -> Params {
  match value {
    Value::Object(map) => map,
    _ => Params::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::fake::FakeBackend;
  use crate::backend::DEMO_MODE_SUFFIX;
  use crate::demo::seed::{DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD};

  fn fast_settings() -> ClientSettings {
    ClientSettings {
      retry_delay_ms: 10,
      ..Default::default()
    }
  }

  fn service(backend: &Arc<FakeBackend>, settings: ClientSettings) -> ApiService {
    ApiService::new(settings, backend.clone(), Session::ephemeral())
  }

  fn list_len(envelope: &ResponseEnvelope) -> usize {
    envelope
      .data
      .as_ref()
      .and_then(Value::as_array)
      .map(Vec::len)
      .unwrap_or(0)
  }

  fn new_complaint(title: &str) -> NewComplaint {
    NewComplaint {
      title: title.into(),
      description: "Transformer hum".into(),
      category: "electric".into(),
      priority: "high".into(),
      ..Default::default()
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_identical_reads_share_one_call() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_latency(Duration::from_millis(50));
    let api = service(&backend, fast_settings());
    let filter = UserFilter {
      limit: Some(100),
      ..Default::default()
    };

    let (a, b) = tokio::join!(api.get_users(&filter), api.get_users(&filter));

    assert_eq!(backend.calls_for(ApiAction::GetUsers), 1);
    assert!(a.as_ref().unwrap().success);
    assert_eq!(a, b);
  }

  #[tokio::test]
  async fn test_second_read_is_served_from_cache() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());

    let first = api.get_complaints(&ComplaintFilter::default()).await.unwrap();
    let second = api.get_complaints(&ComplaintFilter::default()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.calls_for(ApiAction::GetComplaints), 1);
  }

  #[tokio::test]
  async fn test_cache_then_mutate_then_read() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());

    let before = api.get_complaints(&ComplaintFilter::default()).await.unwrap();
    let created = api.create_complaint(&new_complaint("Sparking pole")).await.unwrap();
    assert!(created.success);
    let after = api.get_complaints(&ComplaintFilter::default()).await.unwrap();

    assert_eq!(backend.calls_for(ApiAction::GetComplaints), 2);
    assert_eq!(list_len(&after), list_len(&before) + 1);
    let items = after.data.unwrap();
    let titles: Vec<&str> = items
      .as_array()
      .unwrap()
      .iter()
      .filter_map(|c| c["title"].as_str())
      .collect();
    assert!(titles.contains(&"Sparking pole"));
    assert!(api.optimistic(&complaints_key()).is_none());
  }

  #[tokio::test]
  async fn test_mutation_invalidates_dashboard() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());

    api.get_dashboard_data().await.unwrap();
    api.get_dashboard_data().await.unwrap();
    assert_eq!(backend.calls_for(ApiAction::GetDashboardData), 1);

    api.create_complaint(&new_complaint("Gas smell")).await.unwrap();
    api.get_dashboard_data().await.unwrap();
    assert_eq!(backend.calls_for(ApiAction::GetDashboardData), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_optimistic_entry_visible_while_mutation_in_flight() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    let before = api.get_complaints(&ComplaintFilter::default()).await.unwrap();

    backend.set_latency(Duration::from_millis(50));
    let writer = api.clone();
    let handle = tokio::spawn(async move { writer.create_complaint(&new_complaint("Flooded meter")).await });
    tokio::time::sleep(Duration::from_millis(1)).await;

    let speculative = api.get_complaints(&ComplaintFilter::default()).await.unwrap();
    assert_eq!(list_len(&speculative), list_len(&before) + 1);
    let first = &speculative.data.as_ref().unwrap()[0];
    assert!(first["id"].as_str().unwrap().starts_with("temp-"));
    assert_eq!(first["title"], json!("Flooded meter"));

    handle.await.unwrap().unwrap();
    assert!(api.optimistic(&complaints_key()).is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidation_clears_optimistic_entry() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    api.get_complaints(&ComplaintFilter::default()).await.unwrap();

    backend.set_latency(Duration::from_millis(50));
    let writer = api.clone();
    let handle = tokio::spawn(async move {
      let mut updates = Params::new();
      updates.insert("status".into(), json!("resolved"));
      writer.update_complaint("CMP-1001", updates).await
    });
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(api.optimistic(&complaints_key()).is_some());

    api.invalidate(ApiAction::GetComplaints.name());
    assert!(api.optimistic(&complaints_key()).is_none());
    assert!(api.cache().is_empty());

    assert!(handle.await.unwrap().unwrap().success);
  }

  #[tokio::test]
  async fn test_optimistic_entry_cleared_after_failed_mutation() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    api.get_complaints(&ComplaintFilter::default()).await.unwrap();
    backend.script(
      ApiAction::UpdateComplaint,
      Err(ApiError::Rejected("Insufficient permissions".into())),
    );

    let mut updates = Params::new();
    updates.insert("status".into(), json!("resolved"));
    let result = api.update_complaint("CMP-1002", updates).await;

    assert_eq!(result, Err(ApiError::Rejected("Insufficient permissions".into())));
    assert!(api.optimistic(&complaints_key()).is_none());
    assert_eq!(backend.calls_for(ApiAction::UpdateComplaint), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_exhausted_retries_without_fallback() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_offline(true);
    let settings = ClientSettings {
      fallback_enabled: false,
      ..fast_settings()
    };
    let api = service(&backend, settings);

    let result = api.get_dashboard_data().await;

    assert!(matches!(result, Err(ApiError::Network(_))));
    assert_eq!(backend.calls_for(ApiAction::GetDashboardData), 3);
    assert!(!api.availability().is_available());
    assert_eq!(api.status(), ConnectionStatus::Offline);
  }

  #[tokio::test(start_paused = true)]
  async fn test_demo_login_when_backend_is_down() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_offline(true);
    let api = service(&backend, fast_settings());

    let envelope = api.login(DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD).await.unwrap();

    assert!(envelope.success);
    assert!(envelope.message.as_deref().unwrap().ends_with(DEMO_MODE_SUFFIX));
    assert!(envelope.is_demo());
    assert!(api.is_authenticated());
    assert_eq!(api.status(), ConnectionStatus::Demo);
    assert_eq!(backend.calls_for(ApiAction::Login), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_demo_answers_are_not_cached() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_offline(true);
    let api = service(&backend, fast_settings());

    let envelope = api.get_complaints(&ComplaintFilter::default()).await.unwrap();
    assert!(envelope.is_demo());
    assert!(api.cache().is_empty());

    backend.set_offline(false);
    let live = api.get_complaints(&ComplaintFilter::default()).await.unwrap();
    assert!(!live.is_demo());
    assert_eq!(api.status(), ConnectionStatus::Online);
  }

  #[tokio::test(start_paused = true)]
  async fn test_paused_and_unavailable_skips_network() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    api.availability().mark_unavailable();
    api.availability().pause_for(Duration::from_secs(600));

    let envelope = api.get_outages(&OutageFilter::default()).await.unwrap();

    assert!(envelope.is_demo());
    assert_eq!(backend.call_count(), 0);
  }

  #[tokio::test]
  async fn test_business_failure_is_authoritative() {
    let backend = Arc::new(FakeBackend::new());
    backend.script(
      ApiAction::SetupAdmin,
      Ok(ResponseEnvelope::failure("Admin already exists")),
    );
    let api = service(&backend, fast_settings());

    let envelope = api
      .setup_admin(&AdminSetup {
        name: "Root".into(),
        email: "root@utility.example".into(),
        password: "secret".into(),
      })
      .await
      .unwrap();

    assert!(!envelope.success);
    assert_eq!(envelope.error.as_deref(), Some("Admin already exists"));
    assert!(!envelope.is_demo());
    assert_eq!(backend.calls_for(ApiAction::SetupAdmin), 1);
    assert_eq!(api.status(), ConnectionStatus::Online);
  }

  #[tokio::test]
  async fn test_failed_reads_are_not_cached() {
    let backend = Arc::new(FakeBackend::new());
    backend.script(ApiAction::GetUsers, Ok(ResponseEnvelope::failure("Insufficient permissions")));
    let api = service(&backend, fast_settings());

    api.get_users(&UserFilter::default()).await.unwrap();
    api.get_users(&UserFilter::default()).await.unwrap();
    assert_eq!(backend.calls_for(ApiAction::GetUsers), 2);
  }

  #[tokio::test]
  async fn test_token_attached_after_login() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());

    let envelope = api.login(DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD).await.unwrap();
    assert!(envelope.success);
    assert!(!envelope.is_demo());
    assert!(backend.last_call().unwrap().token.is_none());

    api.get_notifications().await.unwrap();
    let call = backend.last_call().unwrap();
    assert_eq!(call.action, ApiAction::GetNotifications);
    assert!(call.token.is_some());
  }

  #[tokio::test]
  async fn test_created_complaint_decodes() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    let new = NewComplaint {
      title: "Flickering streetlight".into(),
      priority: "low".into(),
      ..Default::default()
    };

    let envelope = api.create_complaint(&new).await.unwrap();
    let complaint: crate::models::Complaint = envelope.data_as().unwrap().unwrap();
    assert_eq!(complaint.title, "Flickering streetlight");
    assert_eq!(complaint.status, "open");
    assert!(!complaint.id.starts_with("temp-"));
  }

  #[tokio::test]
  async fn test_login_drops_cached_reads() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    api.get_complaints(&ComplaintFilter::default()).await.unwrap();
    assert!(!api.cache().is_empty());

    api.login(DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD).await.unwrap();
    assert!(api.cache().is_empty());
  }

  #[tokio::test]
  async fn test_wrong_password_keeps_session_empty() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());

    let envelope = api.login(DEMO_ADMIN_EMAIL, "nope").await.unwrap();
    assert!(!envelope.success);
    assert!(!api.is_authenticated());
  }

  #[tokio::test]
  async fn test_auth_error_clears_session() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    api.login(DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD).await.unwrap();
    backend.script(
      ApiAction::ValidateSession,
      Err(ApiError::Unauthorized("Session expired".into())),
    );

    let result = api.validate_session().await;

    assert!(result.unwrap_err().is_auth());
    assert!(!api.is_authenticated());
    assert_eq!(backend.calls_for(ApiAction::ValidateSession), 1);
  }

  #[tokio::test]
  async fn test_restore_session() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    assert_eq!(api.restore_session().await, Ok(None));
    assert_eq!(backend.call_count(), 0);

    api.login(DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD).await.unwrap();
    let restored = api.restore_session().await.unwrap().unwrap();
    assert!(restored.success);
    assert!(api.is_authenticated());
  }

  #[tokio::test(start_paused = true)]
  async fn test_outage_keeps_persisted_session() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    api.inner.session.set_token("real-jwt-from-backend");
    backend.set_offline(true);

    let restored = api.restore_session().await.unwrap().unwrap();
    assert!(restored.is_demo());
    assert!(api.is_authenticated());

    // Once reachable, the backend's own rejection still clears it.
    backend.set_offline(false);
    let rejected = api.validate_session().await.unwrap();
    assert!(!rejected.success);
    assert!(!rejected.is_demo());
    assert!(!api.is_authenticated());
  }

  #[tokio::test]
  async fn test_logout_clears_local_state() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());
    api.login(DEMO_ADMIN_EMAIL, DEMO_ADMIN_PASSWORD).await.unwrap();
    api.get_complaints(&ComplaintFilter::default()).await.unwrap();

    let envelope = api.logout().await.unwrap();

    assert!(envelope.success);
    assert!(!api.is_authenticated());
    assert!(api.cache().is_empty());
    assert_eq!(backend.calls_for(ApiAction::Logout), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_refresh_is_single_attempt_and_fills_cache() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());

    api
      .refresh(ApiAction::GetDashboardData, Params::new(), Duration::from_secs(10))
      .await
      .unwrap();
    api.get_dashboard_data().await.unwrap();
    assert_eq!(backend.calls_for(ApiAction::GetDashboardData), 1);

    backend.set_offline(true);
    let err = api
      .refresh(ApiAction::GetComplaints, Params::new(), Duration::from_secs(10))
      .await
      .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(backend.calls_for(ApiAction::GetComplaints), 1);
    assert!(api.availability().is_available());
  }

  #[tokio::test(start_paused = true)]
  async fn test_refresh_joins_in_flight_read() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_latency(Duration::from_millis(50));
    let api = service(&backend, fast_settings());

    let filter = ComplaintFilter::default();
    let (read, refreshed) = tokio::join!(
      api.get_complaints(&filter),
      api.refresh(ApiAction::GetComplaints, Params::new(), Duration::from_secs(10)),
    );

    assert_eq!(backend.calls_for(ApiAction::GetComplaints), 1);
    assert_eq!(read.unwrap(), refreshed.unwrap());
  }

  #[tokio::test(start_paused = true)]
  async fn test_refresh_joining_a_demo_answer_is_a_failure() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_latency(Duration::from_millis(50));
    backend.set_offline(true);
    let api = service(&backend, fast_settings());

    let filter = ComplaintFilter::default();
    let (read, refreshed) = tokio::join!(
      api.get_complaints(&filter),
      api.refresh(ApiAction::GetComplaints, Params::new(), Duration::from_secs(10)),
    );

    assert!(read.unwrap().is_demo());
    assert!(refreshed.unwrap_err().is_transient());
  }

  #[tokio::test(start_paused = true)]
  async fn test_refresh_times_out() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_latency(Duration::from_secs(30));
    let api = service(&backend, fast_settings());

    let err = api
      .refresh(ApiAction::GetComplaints, Params::new(), Duration::from_secs(10))
      .await
      .unwrap_err();
    assert_eq!(err, ApiError::Timeout(10_000));
  }

  #[tokio::test]
  async fn test_update_and_delete_route_ids() {
    let backend = Arc::new(FakeBackend::new());
    let api = service(&backend, fast_settings());

    let mut updates = Params::new();
    updates.insert("status".into(), json!("resolved"));
    let updated = api.update_outage("OUT-1", updates).await.unwrap();
    assert!(updated.success);
    let call = backend.last_call().unwrap();
    assert_eq!(call.params["id"], json!("OUT-1"));

    let deleted = api.delete_user("USR-4").await.unwrap();
    assert!(deleted.success);
    let missing = api.delete_user("USR-4").await.unwrap();
    assert!(!missing.success);
  }
}
