//! Serde-deserializable types matching the time-table provider's responses.
//!
//! The provider's payloads are loosely structured; fields are declared
//! optional here and validated exactly once, at this boundary, when
//! converting into the domain `PrayerTimeTable`.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;

use super::types::PrayerTimeTable;

/// Top-level provider response for a single-day query.
#[derive(Debug, Deserialize)]
pub struct ApiTimesResponse {
  #[serde(default)]
  pub items: Vec<ApiDayTimes>,
  pub status_code: Option<u32>,
  pub status_description: Option<String>,
}

impl ApiTimesResponse {
  /// Extract the first (and for a day query, only) entry.
  pub fn into_table(mut self) -> Result<PrayerTimeTable> {
    if self.items.is_empty() {
      return Err(eyre!(
        "Provider returned no time table entries ({})",
        self
          .status_description
          .as_deref()
          .unwrap_or("no status description")
      ));
    }
    self.items.remove(0).into_table()
  }
}

/// One calendar day's times as the provider reports them.
///
/// Time fields are plain 12-hour strings; a missing field becomes an empty
/// string, which the resolver later skips per-field.
#[derive(Debug, Deserialize)]
pub struct ApiDayTimes {
  pub date_for: String,
  pub fajr: Option<String>,
  pub shurooq: Option<String>,
  pub dhuhr: Option<String>,
  pub asr: Option<String>,
  pub maghrib: Option<String>,
  pub isha: Option<String>,
}

impl ApiDayTimes {
  pub fn into_table(self) -> Result<PrayerTimeTable> {
    // The provider uses unpadded dates like "2026-8-3".
    let date_for = NaiveDate::parse_from_str(&self.date_for, "%Y-%m-%d")
      .map_err(|e| eyre!("Provider returned unparsable date '{}': {}", self.date_for, e))?;

    Ok(PrayerTimeTable {
      date_for,
      fajr: self.fajr.unwrap_or_default(),
      shurooq: self.shurooq.unwrap_or_default(),
      dhuhr: self.dhuhr.unwrap_or_default(),
      asr: self.asr.unwrap_or_default(),
      maghrib: self.maghrib.unwrap_or_default(),
      isha: self.isha.unwrap_or_default(),
    })
  }
}
