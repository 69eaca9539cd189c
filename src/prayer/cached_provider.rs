//! Provider client with transparent caching and once-per-day fetch gating.

use chrono::{Local, NaiveDate};
use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheController, ControllerConfig, FetchRequest, FetchResponse, StoreBackend};
use crate::config::Config;

use super::provider::TimetableClient;
use super::store::TimetableStore;
use super::types::PrayerTimeTable;

/// Time-table client with layered offline support.
///
/// Two layers back it: the day-keyed `TimetableStore` (canonical table per
/// calendar date) and the transport-level `CacheController`, which applies
/// stale-while-revalidate to the provider's API responses.
pub struct CachedTimetableClient<S: StoreBackend> {
  inner: TimetableClient,
  controller: CacheController<S>,
  store: Arc<TimetableStore>,
}

impl<S: StoreBackend> CachedTimetableClient<S> {
  pub fn new(config: &Config, storage: S, store: TimetableStore) -> Result<Self> {
    let inner = TimetableClient::new(config)?;

    // The controller is scoped to the provider origin; every provider GET
    // is in the API class.
    let controller_config = ControllerConfig::new(inner.origin().clone()).with_api_prefix("/");
    let controller = CacheController::new(storage, controller_config);

    // Takeover: drop stores left behind by older versions.
    controller.activate()?;

    Ok(Self {
      inner,
      controller,
      store: Arc::new(store),
    })
  }

  /// Get the table for a calendar date, fetching at most once per date.
  pub async fn table_for(&self, date: NaiveDate) -> Result<PrayerTimeTable> {
    let http = self.inner.http_handle();
    self
      .table_for_with(date, move |request| {
        TimetableClient::transport(http, request)
      })
      .await
  }

  /// Same as `table_for` with an injected transport (used in tests).
  pub async fn table_for_with<F, Fut>(&self, date: NaiveDate, fetch: F) -> Result<PrayerTimeTable>
  where
    F: FnOnce(FetchRequest) -> Fut + Send + 'static,
    Fut: Future<Output = Result<FetchResponse>> + Send + 'static,
  {
    // The stored day table is canonical; no network involved on a hit.
    if let Some(table) = self.store.get(date)? {
      return Ok(table);
    }

    let request = self.inner.request_for(date)?;
    let served = self.controller.handle_request(request, fetch).await?;
    let table = TimetableClient::decode(&served.response)?;

    self.store.put(&table)?;
    Ok(table)
  }

  /// Today's table, recording the once-per-day fetch marker.
  pub async fn today(&self) -> Result<PrayerTimeTable> {
    let date = Local::now().date_naive();
    let table = self.table_for(date).await?;

    if self.store.last_fetch_date()? != Some(date) {
      self.store.set_last_fetch_date(date)?;
    }

    Ok(table)
  }

  /// Tomorrow's table, needed for the post-Isha rollover.
  pub async fn tomorrow(&self) -> Result<PrayerTimeTable> {
    let date = Local::now()
      .date_naive()
      .succ_opt()
      .ok_or_else(|| eyre!("Date overflow computing tomorrow"))?;
    self.table_for(date).await
  }

  /// Whether the once-per-day fetch already happened for the current date.
  pub fn has_fetched_today(&self) -> Result<bool> {
    Ok(self.store.last_fetch_date()? == Some(Local::now().date_naive()))
  }

  pub fn store(&self) -> &TimetableStore {
    &self.store
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{is_offline, MemoryStorage};
  use crate::config::{Config, ProviderConfig};

  fn client() -> CachedTimetableClient<MemoryStorage> {
    let config = Config {
      provider: ProviderConfig {
        url: "https://times.example/".to_string(),
        location: "london".to_string(),
      },
      tick_rate_secs: None,
    };
    CachedTimetableClient::new(
      &config,
      MemoryStorage::new(),
      TimetableStore::open_in_memory().unwrap(),
    )
    .unwrap()
  }

  fn day_payload(date: &str, fajr: &str) -> FetchResponse {
    let body = format!(
      r#"{{"items": [{{"date_for": "{}", "fajr": "{}", "shurooq": "6:20 am",
           "dhuhr": "12:15 pm", "asr": "4:30 pm", "maghrib": "6:45 pm",
           "isha": "8:00 pm"}}]}}"#,
      date, fajr
    );
    FetchResponse::new(200, body.into_bytes())
  }

  #[tokio::test]
  async fn test_miss_fetches_and_persists() {
    let client = client();
    let date = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();

    let table = client
      .table_for_with(date, |_| async { Ok(day_payload("2026-8-28", "5:02 am")) })
      .await
      .unwrap();
    assert_eq!(table.fajr, "5:02 am");

    // Second call is served from the store even with the network down.
    let table = client
      .table_for_with(date, |_| async { Err(eyre!("network down")) })
      .await
      .unwrap();
    assert_eq!(table.fajr, "5:02 am");
  }

  #[tokio::test]
  async fn test_stored_table_preempts_network() {
    let client = client();
    let date = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();

    client
      .table_for_with(date, |_| async { Ok(day_payload("2026-8-28", "5:02 am")) })
      .await
      .unwrap();

    // A different payload would be returned if the network were consulted.
    let table = client
      .table_for_with(date, |_| async { Ok(day_payload("2026-8-28", "9:99 am")) })
      .await
      .unwrap();
    assert_eq!(table.fajr, "5:02 am");
  }

  #[tokio::test]
  async fn test_unreachable_provider_with_empty_store_is_offline() {
    let client = client();
    let date = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();

    let err = client
      .table_for_with(date, |_| async { Err(eyre!("unreachable")) })
      .await
      .unwrap_err();
    assert!(is_offline(&err));
  }

  #[tokio::test]
  async fn test_tables_are_keyed_per_date() {
    let client = client();
    let today = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
    let tomorrow = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();

    client
      .table_for_with(today, |_| async { Ok(day_payload("2026-8-28", "5:02 am")) })
      .await
      .unwrap();
    let next = client
      .table_for_with(tomorrow, |_| async { Ok(day_payload("2026-8-29", "5:03 am")) })
      .await
      .unwrap();

    assert_eq!(next.fajr, "5:03 am");
    assert_eq!(
      client.store().get(today).unwrap().unwrap().fajr,
      "5:02 am"
    );
  }
}
