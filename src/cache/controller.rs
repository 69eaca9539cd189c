//! Cache controller that mediates outbound requests at the transport
//! boundary.
//!
//! Every eligible GET is routed through one of three strategies:
//! - API calls: stale-while-revalidate
//! - navigations: network-first with shell fallback
//! - static assets: cache-first
//!
//! Stores are versioned by name; activation deletes every store that does
//! not belong to the current version.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::StoreBackend;
use super::types::{
  CachedResponse, FetchRequest, FetchResponse, OfflineError, RequestClass, Served,
};

/// Version tag for the cache stores. Bump on every deploy; activation then
/// discards all stores carrying an older tag.
pub const CACHE_VERSION: &str = "v3";

/// Static configuration for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
  /// Prefix shared by all store names.
  pub store_prefix: String,
  /// Version tag embedded in store names.
  pub version: String,
  /// Only requests to this origin are eligible for interception.
  pub origin: Url,
  /// Path prefix of the API namespace.
  pub api_prefix: String,
  /// Critical resources pre-cached during install.
  pub shell_paths: Vec<String>,
}

impl ControllerConfig {
  pub fn new(origin: Url) -> Self {
    Self {
      store_prefix: "mihrab".to_string(),
      version: CACHE_VERSION.to_string(),
      origin,
      api_prefix: "/api/".to_string(),
      shell_paths: ["/", "/login", "/dashboard", "/manifest.json", "/icons/icon-192.png"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
  }

  pub fn with_version(mut self, version: &str) -> Self {
    self.version = version.to_string();
    self
  }

  pub fn with_api_prefix(mut self, prefix: &str) -> Self {
    self.api_prefix = prefix.to_string();
    self
  }

  pub fn with_shell_paths(mut self, paths: &[&str]) -> Self {
    self.shell_paths = paths.iter().map(|s| s.to_string()).collect();
    self
  }

  /// Name of the pre-cached app-shell store for this version.
  pub fn shell_store(&self) -> String {
    format!("{}-shell-{}", self.store_prefix, self.version)
  }

  /// Name of the runtime store (API + asset entries) for this version.
  pub fn runtime_store(&self) -> String {
    format!("{}-runtime-{}", self.store_prefix, self.version)
  }
}

/// The offline cache controller.
///
/// Handles each intercepted request independently; the only shared state is
/// the underlying store, whose writes are last-write-wins per key.
pub struct CacheController<S: StoreBackend> {
  storage: Arc<S>,
  config: ControllerConfig,
  /// Bound on awaited network calls before falling back to cache/offline.
  network_timeout: Duration,
}

impl<S: StoreBackend> CacheController<S> {
  pub fn new(storage: S, config: ControllerConfig) -> Self {
    Self {
      storage: Arc::new(storage),
      config,
      network_timeout: Duration::from_secs(10),
    }
  }

  pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
    self.network_timeout = timeout;
    self
  }

  pub fn config(&self) -> &ControllerConfig {
    &self.config
  }

  /// Pre-populate the shell store with the enumerated critical resources.
  ///
  /// All-or-nothing: every shell path is fetched before anything is written,
  /// so a failed install never leaves the store partially populated. The
  /// caller should retry installation later on failure.
  pub async fn install<F, Fut>(&self, fetch: F) -> Result<()>
  where
    F: Fn(FetchRequest) -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    let mut requests = Vec::with_capacity(self.config.shell_paths.len());
    for path in &self.config.shell_paths {
      let url = self
        .config
        .origin
        .join(path)
        .map_err(|e| eyre!("Invalid shell path {}: {}", path, e))?;
      requests.push(FetchRequest::get(url.as_str())?);
    }

    // Fetch everything first; any failure aborts before the first write.
    let fetches = requests.iter().map(|r| fetch(r.clone()));
    let responses = futures::future::try_join_all(fetches).await?;

    for (request, response) in requests.iter().zip(&responses) {
      if !response.ok() {
        return Err(eyre!(
          "Shell precache failed: {} returned status {}",
          request.url,
          response.status
        ));
      }
    }

    let store = self.config.shell_store();
    for (request, response) in requests.iter().zip(&responses) {
      self
        .storage
        .put(&store, &request.cache_key(), &CachedResponse::now(response))?;
    }

    info!(store = %store, resources = requests.len(), "shell store populated");
    Ok(())
  }

  /// Take over: delete every store that does not belong to this version.
  ///
  /// Keeps repeated deploys from accumulating stale versioned stores.
  pub fn activate(&self) -> Result<()> {
    let expected = [self.config.shell_store(), self.config.runtime_store()];

    for store in self.storage.list_stores()? {
      if !expected.contains(&store) {
        info!(store = %store, "deleting stale cache store");
        self.storage.delete_store(&store)?;
      }
    }

    Ok(())
  }

  /// Classify a request, in order of specificity.
  pub fn classify(&self, request: &FetchRequest) -> RequestClass {
    // Mutations and cross-origin calls pass through untouched.
    if !request.is_get() || request.url.origin() != self.config.origin.origin() {
      return RequestClass::Passthrough;
    }

    let path = request.url.path();
    if path.starts_with(&self.config.api_prefix) {
      return RequestClass::Api;
    }

    if self.is_navigation(path) {
      return RequestClass::Navigation;
    }

    RequestClass::Asset
  }

  /// A path is a navigation if it is a known shell route or has no file
  /// extension in its final segment.
  fn is_navigation(&self, path: &str) -> bool {
    if self.config.shell_paths.iter().any(|p| p == path) {
      return true;
    }
    let last = path.rsplit('/').next().unwrap_or("");
    !last.contains('.')
  }

  /// Route an intercepted request through the strategy for its class.
  pub async fn handle_request<F, Fut>(&self, request: FetchRequest, fetch: F) -> Result<Served>
  where
    F: FnOnce(FetchRequest) -> Fut + Send + 'static,
    Fut: Future<Output = Result<FetchResponse>> + Send + 'static,
  {
    match self.classify(&request) {
      RequestClass::Passthrough => {
        let response = fetch(request).await?;
        Ok(Served::from_network(response))
      }
      RequestClass::Api => self.stale_while_revalidate(request, fetch).await,
      RequestClass::Navigation => self.network_first(request, fetch).await,
      RequestClass::Asset => self.cache_first(request, fetch).await,
    }
  }

  /// Serve the cached entry immediately and refresh it in the background.
  ///
  /// The awaited network result is never used for the current response; a
  /// failed revalidation leaves the previous entry untouched.
  async fn stale_while_revalidate<F, Fut>(&self, request: FetchRequest, fetch: F) -> Result<Served>
  where
    F: FnOnce(FetchRequest) -> Fut + Send + 'static,
    Fut: Future<Output = Result<FetchResponse>> + Send + 'static,
  {
    let store = self.config.runtime_store();
    let key = request.cache_key();

    if let Some(cached) = self.storage.get(&store, &key)? {
      // Fire-and-forget revalidation; the caller is not blocked on it.
      let storage = Arc::clone(&self.storage);
      let background = request.clone();
      tokio::spawn(async move {
        match fetch(background.clone()).await {
          Ok(response) if response.ok() => {
            if let Err(err) = storage.put(&store, &key, &CachedResponse::now(&response)) {
              warn!(url = %background.url, error = %err, "revalidation write failed");
            }
          }
          Ok(response) => {
            debug!(url = %background.url, status = response.status, "revalidation skipped on error status");
          }
          Err(err) => {
            debug!(url = %background.url, error = %err, "revalidation fetch failed");
          }
        }
      });

      return Ok(Served::from_cache(cached.response));
    }

    // Cache miss: this call must wait for the network.
    match self.fetch_with_timeout(request.clone(), fetch).await {
      Ok(response) => {
        if response.ok() {
          self
            .storage
            .put(&store, &key, &CachedResponse::now(&response))?;
        }
        Ok(Served::from_network(response))
      }
      Err(err) => {
        debug!(url = %request.url, error = %err, "api fetch failed with empty cache");
        Err(OfflineError::new(&request.url).into())
      }
    }
  }

  /// Try the network first; fall back to the pre-cached shell entry.
  async fn network_first<F, Fut>(&self, request: FetchRequest, fetch: F) -> Result<Served>
  where
    F: FnOnce(FetchRequest) -> Fut + Send + 'static,
    Fut: Future<Output = Result<FetchResponse>> + Send + 'static,
  {
    let key = request.cache_key();

    match self.fetch_with_timeout(request.clone(), fetch).await {
      Ok(response) => {
        if response.ok() {
          self
            .storage
            .put(&self.config.shell_store(), &key, &CachedResponse::now(&response))?;
        }
        Ok(Served::from_network(response))
      }
      Err(err) => {
        debug!(url = %request.url, error = %err, "navigation fetch failed, trying shell");
        match self.storage.get(&self.config.shell_store(), &key)? {
          Some(cached) => Ok(Served::shell_fallback(cached.response)),
          None => Err(OfflineError::new(&request.url).into()),
        }
      }
    }
  }

  /// Serve from cache when possible; otherwise fetch and store.
  async fn cache_first<F, Fut>(&self, request: FetchRequest, fetch: F) -> Result<Served>
  where
    F: FnOnce(FetchRequest) -> Fut + Send + 'static,
    Fut: Future<Output = Result<FetchResponse>> + Send + 'static,
  {
    let store = self.config.runtime_store();
    let key = request.cache_key();

    if let Some(cached) = self.storage.get(&store, &key)? {
      return Ok(Served::from_cache(cached.response));
    }

    match self.fetch_with_timeout(request.clone(), fetch).await {
      Ok(response) => {
        if response.ok() {
          self
            .storage
            .put(&store, &key, &CachedResponse::now(&response))?;
        }
        Ok(Served::from_network(response))
      }
      Err(err) => {
        debug!(url = %request.url, error = %err, "asset fetch failed with empty cache");
        Err(OfflineError::new(&request.url).into())
      }
    }
  }

  async fn fetch_with_timeout<F, Fut>(&self, request: FetchRequest, fetch: F) -> Result<FetchResponse>
  where
    F: FnOnce(FetchRequest) -> Fut,
    Fut: Future<Output = Result<FetchResponse>>,
  {
    let url = request.url.clone();
    match tokio::time::timeout(self.network_timeout, fetch(request)).await {
      Ok(result) => result,
      Err(_) => Err(eyre!("Network request to {} timed out", url)),
    }
  }
}

impl<S: StoreBackend> Clone for CacheController<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      config: self.config.clone(),
      network_timeout: self.network_timeout,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::cache::types::{is_offline, ResponseSource};
  use std::sync::atomic::{AtomicU32, Ordering};

  const ORIGIN: &str = "https://app.example";

  fn controller() -> CacheController<MemoryStorage> {
    let config = ControllerConfig::new(Url::parse(ORIGIN).unwrap()).with_version("v1");
    CacheController::new(MemoryStorage::new(), config)
  }

  fn ok_response(body: &str) -> FetchResponse {
    FetchResponse::new(200, body.as_bytes().to_vec())
  }

  fn req(path: &str) -> FetchRequest {
    FetchRequest::get(&format!("{}{}", ORIGIN, path)).unwrap()
  }

  #[test]
  fn test_classification_order_of_specificity() {
    let ctl = controller();

    let post = FetchRequest::new("POST", &format!("{}{}", ORIGIN, "/api/logs")).unwrap();
    assert_eq!(ctl.classify(&post), RequestClass::Passthrough);

    let cross = FetchRequest::get("https://other.example/api/logs").unwrap();
    assert_eq!(ctl.classify(&cross), RequestClass::Passthrough);

    assert_eq!(ctl.classify(&req("/api/logs?date=2026-08-28")), RequestClass::Api);
    assert_eq!(ctl.classify(&req("/dashboard")), RequestClass::Navigation);
    assert_eq!(ctl.classify(&req("/")), RequestClass::Navigation);
    assert_eq!(ctl.classify(&req("/diary/reflections")), RequestClass::Navigation);
    assert_eq!(ctl.classify(&req("/static/app.js")), RequestClass::Asset);
    assert_eq!(ctl.classify(&req("/icons/icon-192.png")), RequestClass::Asset);
  }

  #[tokio::test]
  async fn test_install_populates_every_shell_entry() {
    let ctl = controller();
    ctl
      .install(|request| async move { Ok(ok_response(request.url.path())) })
      .await
      .unwrap();

    let shell = ctl.config().shell_store();
    let keys = ctl.storage.keys(&shell).unwrap();
    assert_eq!(keys.len(), ctl.config().shell_paths.len());
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let ctl = controller();
    let result = ctl
      .install(|request| async move {
        if request.url.path() == "/login" {
          Err(eyre!("connection refused"))
        } else {
          Ok(ok_response("ok"))
        }
      })
      .await;

    assert!(result.is_err());
    // No partial population: the shell store must be empty.
    let shell = ctl.config().shell_store();
    assert!(ctl.storage.keys(&shell).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_rejects_error_status() {
    let ctl = controller();
    let result = ctl
      .install(|request| async move {
        if request.url.path() == "/manifest.json" {
          Ok(FetchResponse::new(404, Vec::new()))
        } else {
          Ok(ok_response("ok"))
        }
      })
      .await;

    assert!(result.is_err());
    let shell = ctl.config().shell_store();
    assert!(ctl.storage.keys(&shell).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_activate_deletes_stale_version_stores() {
    let ctl = controller();
    let entry = CachedResponse::now(&ok_response("x"));

    ctl.storage.put("mihrab-shell-v0", "a", &entry).unwrap();
    ctl.storage.put("mihrab-runtime-v0", "b", &entry).unwrap();
    ctl.storage.put(&ctl.config().shell_store(), "c", &entry).unwrap();
    ctl.storage.put(&ctl.config().runtime_store(), "d", &entry).unwrap();

    ctl.activate().unwrap();

    let mut stores = ctl.storage.list_stores().unwrap();
    stores.sort();
    assert_eq!(stores, vec!["mihrab-runtime-v1", "mihrab-shell-v1"]);
    assert!(ctl.storage.get("mihrab-shell-v0", "a").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_swr_serves_cache_immediately_and_revalidates() {
    let ctl = controller();
    let request = req("/api/logs");
    let store = ctl.config().runtime_store();
    let key = request.cache_key();

    ctl
      .storage
      .put(&store, &key, &CachedResponse::now(&ok_response("stale")))
      .unwrap();

    let served = ctl
      .handle_request(request.clone(), |_| async { Ok(ok_response("fresh")) })
      .await
      .unwrap();

    // The current call gets the stale entry, latency over freshness.
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body, b"stale");

    // Background revalidation overwrites the entry for the next call.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let updated = ctl.storage.get(&store, &key).unwrap().unwrap();
    assert_eq!(updated.response.body, b"fresh");
  }

  #[tokio::test]
  async fn test_swr_failed_revalidation_keeps_previous_entry() {
    let ctl = controller();
    let request = req("/api/logs");
    let store = ctl.config().runtime_store();
    let key = request.cache_key();

    ctl
      .storage
      .put(&store, &key, &CachedResponse::now(&ok_response("stale")))
      .unwrap();

    let served = ctl
      .handle_request(request.clone(), |_| async { Err(eyre!("network down")) })
      .await
      .unwrap();
    assert_eq!(served.response.body, b"stale");

    tokio::time::sleep(Duration::from_millis(20)).await;
    let kept = ctl.storage.get(&store, &key).unwrap().unwrap();
    assert_eq!(kept.response.body, b"stale");
  }

  #[tokio::test]
  async fn test_swr_miss_waits_for_network_and_stores() {
    let ctl = controller();
    let request = req("/api/logs");

    let served = ctl
      .handle_request(request.clone(), |_| async { Ok(ok_response("first")) })
      .await
      .unwrap();
    assert_eq!(served.source, ResponseSource::Network);

    let cached = ctl
      .storage
      .get(&ctl.config().runtime_store(), &request.cache_key())
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"first");
  }

  #[tokio::test]
  async fn test_swr_miss_with_network_down_is_offline() {
    let ctl = controller();
    let err = ctl
      .handle_request(req("/api/logs"), |_| async { Err(eyre!("unreachable")) })
      .await
      .unwrap_err();
    assert!(is_offline(&err));
  }

  #[tokio::test]
  async fn test_network_first_stores_then_falls_back_to_shell() {
    let ctl = controller();
    let request = req("/dashboard");

    let served = ctl
      .handle_request(request.clone(), |_| async { Ok(ok_response("<html>dash</html>")) })
      .await
      .unwrap();
    assert_eq!(served.source, ResponseSource::Network);

    // Network gone: the stored shell entry answers instead.
    let fallback = ctl
      .handle_request(request.clone(), |_| async { Err(eyre!("offline")) })
      .await
      .unwrap();
    assert_eq!(fallback.source, ResponseSource::ShellFallback);
    assert_eq!(fallback.response.body, b"<html>dash</html>");
  }

  #[tokio::test]
  async fn test_network_first_without_any_cache_is_offline() {
    let ctl = controller();
    let err = ctl
      .handle_request(req("/dashboard"), |_| async { Err(eyre!("offline")) })
      .await
      .unwrap_err();
    assert!(is_offline(&err));
  }

  #[tokio::test]
  async fn test_cache_first_fetches_once() {
    let ctl = controller();
    let request = req("/static/app.js");
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
      let calls = Arc::clone(&calls);
      let served = ctl
        .handle_request(request.clone(), move |_| async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(ok_response("console.log(1)"))
        })
        .await
        .unwrap();
      assert_eq!(served.response.body, b"console.log(1)");
    }

    // First call fetched and stored; the rest were cache hits.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_error_status_is_not_cached() {
    let ctl = controller();
    let request = req("/static/app.js");

    let served = ctl
      .handle_request(request.clone(), |_| async {
        Ok(FetchResponse::new(500, b"boom".to_vec()))
      })
      .await
      .unwrap();
    assert_eq!(served.response.status, 500);

    let cached = ctl
      .storage
      .get(&ctl.config().runtime_store(), &request.cache_key())
      .unwrap();
    assert!(cached.is_none());
  }

  #[tokio::test]
  async fn test_passthrough_never_touches_the_store() {
    let ctl = controller();
    let request = FetchRequest::new("POST", &format!("{}{}", ORIGIN, "/api/logs")).unwrap();

    let served = ctl
      .handle_request(request, |_| async { Ok(ok_response("created")) })
      .await
      .unwrap();
    assert_eq!(served.source, ResponseSource::Network);

    assert!(ctl.storage.list_stores().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_hung_network_call_is_bounded() {
    let ctl = controller().with_network_timeout(Duration::from_millis(10));

    let err = ctl
      .handle_request(req("/static/app.js"), |_| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ok_response("late"))
      })
      .await
      .unwrap_err();
    assert!(is_offline(&err));
  }
}
