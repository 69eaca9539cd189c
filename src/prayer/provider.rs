//! HTTP client for the external prayer-time-table provider.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use url::Url;

use crate::cache::{FetchRequest, FetchResponse};
use crate::config::Config;

use super::api_types::ApiTimesResponse;
use super::types::PrayerTimeTable;

/// Client for the day-scoped time-table endpoint.
///
/// Queried at most once per calendar day per location; callers go through
/// `CachedTimetableClient` which enforces that.
#[derive(Clone)]
pub struct TimetableClient {
  http: reqwest::Client,
  base_url: Url,
  location: String,
  api_key: Option<String>,
}

impl TimetableClient {
  pub fn new(config: &Config) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let base_url = Url::parse(&config.provider.url)
      .map_err(|e| eyre!("Invalid provider URL {}: {}", config.provider.url, e))?;

    Ok(Self {
      http,
      base_url,
      location: config.provider.location.clone(),
      api_key: Config::get_api_key(),
    })
  }

  /// Origin of the provider, used to scope the cache controller.
  pub fn origin(&self) -> &Url {
    &self.base_url
  }

  /// Clone of the underlying HTTP client for transport closures.
  pub fn http_handle(&self) -> reqwest::Client {
    self.http.clone()
  }

  /// Build the GET request for one calendar day's table.
  pub fn request_for(&self, date: NaiveDate) -> Result<FetchRequest> {
    let mut url = self
      .base_url
      .join(&format!(
        "{}/{}.json",
        self.location,
        date.format("%Y-%m-%d")
      ))
      .map_err(|e| eyre!("Failed to build provider URL: {}", e))?;

    if let Some(key) = &self.api_key {
      url.query_pairs_mut().append_pair("key", key);
    }

    FetchRequest::get(url.as_str())
  }

  /// Raw transport: perform a request and capture the response snapshot.
  pub async fn transport(http: reqwest::Client, request: FetchRequest) -> Result<FetchResponse> {
    let response = http
      .get(request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Provider request failed: {}", e))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read provider response: {}", e))?
      .to_vec();

    Ok(FetchResponse {
      status,
      content_type,
      body,
    })
  }

  /// Decode a provider response body into a day table.
  pub fn decode(response: &FetchResponse) -> Result<PrayerTimeTable> {
    if !response.ok() {
      return Err(eyre!(
        "Provider returned status {}",
        response.status
      ));
    }

    let payload: ApiTimesResponse = serde_json::from_slice(&response.body)
      .map_err(|e| eyre!("Failed to parse provider response: {}", e))?;

    payload.into_table()
  }

  /// Fetch one day's table directly, bypassing the cache layer.
  pub async fn times_for(&self, date: NaiveDate) -> Result<PrayerTimeTable> {
    let request = self.request_for(date)?;
    let response = Self::transport(self.http.clone(), request).await?;
    Self::decode(&response)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> TimetableClient {
    TimetableClient {
      http: reqwest::Client::new(),
      base_url: Url::parse("https://times.example/").unwrap(),
      location: "london".to_string(),
      api_key: None,
    }
  }

  #[test]
  fn test_request_url_shape() {
    let date = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
    let request = client().request_for(date).unwrap();

    assert!(request.is_get());
    assert_eq!(
      request.url.as_str(),
      "https://times.example/london/2026-08-28.json"
    );
  }

  #[test]
  fn test_request_url_includes_api_key_when_set() {
    let mut with_key = client();
    with_key.api_key = Some("secret".to_string());
    let date = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
    let request = with_key.request_for(date).unwrap();
    assert_eq!(
      request.url.as_str(),
      "https://times.example/london/2026-08-28.json?key=secret"
    );
  }

  #[test]
  fn test_decode_rejects_error_status() {
    let response = FetchResponse::new(503, Vec::new());
    assert!(TimetableClient::decode(&response).is_err());
  }

  #[test]
  fn test_decode_happy_path() {
    let body = br#"{"items": [{"date_for": "2026-8-28", "fajr": "5:02 am"}]}"#.to_vec();
    let response = FetchResponse::new(200, body);
    let table = TimetableClient::decode(&response).unwrap();
    assert_eq!(table.fajr, "5:02 am");
  }
}
