//! Request, response, and entry types for the offline cache.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// An outbound request as seen at the transport boundary.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: String,
  pub url: Url,
}

impl FetchRequest {
  /// Create a request, parsing and validating the URL.
  pub fn new(method: &str, url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid request URL {}: {}", url, e))?;
    Ok(Self {
      method: method.to_uppercase(),
      url,
    })
  }

  /// Shorthand for a GET request.
  pub fn get(url: &str) -> Result<Self> {
    Self::new("GET", url)
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// Stable cache key for this request (method + URL, hashed).
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response as returned from the network or the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl FetchResponse {
  pub fn new(status: u16, body: Vec<u8>) -> Self {
    Self {
      status,
      content_type: None,
      body,
    }
  }

  pub fn with_content_type(mut self, content_type: &str) -> Self {
    self.content_type = Some(content_type.to_string());
    self
  }

  /// Whether the status is in the 2xx range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// A stored response snapshot inside a named store.
///
/// Entries carry only an insertion timestamp; there is no per-entry expiry.
/// Invalidation happens wholesale when the store version changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
  pub response: FetchResponse,
  pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
  pub fn now(response: &FetchResponse) -> Self {
    Self {
      response: response.clone(),
      cached_at: Utc::now(),
    }
  }
}

/// Routing class for an intercepted request, in order of specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Mutations and cross-origin calls; never touched by the cache.
  Passthrough,
  /// API namespace; stale-while-revalidate.
  Api,
  /// Full-page navigation; network-first with shell fallback.
  Navigation,
  /// Static asset; cache-first.
  Asset,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network.
  Network,
  /// Served from a cache store.
  Cache,
  /// Navigation fell back to the pre-cached shell entry.
  ShellFallback,
}

/// A response together with its provenance.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: FetchResponse,
  pub source: ResponseSource,
}

impl Served {
  pub fn from_network(response: FetchResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  pub fn from_cache(response: FetchResponse) -> Self {
    Self {
      response,
      source: ResponseSource::Cache,
    }
  }

  pub fn shell_fallback(response: FetchResponse) -> Self {
    Self {
      response,
      source: ResponseSource::ShellFallback,
    }
  }
}

/// Structured offline condition: cache miss with the network unreachable.
///
/// Surfaced as a concrete error type so callers can distinguish "offline"
/// from other failures by downcasting the report.
#[derive(Debug, Clone)]
pub struct OfflineError {
  pub url: String,
}

impl OfflineError {
  pub fn new(url: &Url) -> Self {
    Self {
      url: url.to_string(),
    }
  }
}

impl std::fmt::Display for OfflineError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "offline: no cached response for {}", self.url)
  }
}

impl std::error::Error for OfflineError {}

/// Check whether an error report is the structured offline condition.
pub fn is_offline(report: &color_eyre::Report) -> bool {
  report.downcast_ref::<OfflineError>().is_some()
}
