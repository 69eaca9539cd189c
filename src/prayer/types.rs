//! Domain types for prayer times and derived temporal state.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::resolver::parse_clock;

/// The five canonical daily prayers, in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prayer {
  Fajr,
  Dhuhr,
  Asr,
  Maghrib,
  Isha,
}

impl Prayer {
  /// Chronological walk order used by the resolver.
  pub const ORDER: [Prayer; 5] = [
    Prayer::Fajr,
    Prayer::Dhuhr,
    Prayer::Asr,
    Prayer::Maghrib,
    Prayer::Isha,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      Prayer::Fajr => "Fajr",
      Prayer::Dhuhr => "Dhuhr",
      Prayer::Asr => "Asr",
      Prayer::Maghrib => "Maghrib",
      Prayer::Isha => "Isha",
    }
  }
}

impl std::fmt::Display for Prayer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// One calendar day's worth of canonical prayer clock-times.
///
/// Times are kept as the provider's raw 12-hour wall-clock strings
/// (e.g. "05:02 am"); parsing happens lazily in the resolver so a single
/// malformed field degrades that field only, never the whole table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrayerTimeTable {
  pub date_for: NaiveDate,
  pub fajr: String,
  pub shurooq: String,
  pub dhuhr: String,
  pub asr: String,
  pub maghrib: String,
  pub isha: String,
}

impl PrayerTimeTable {
  pub fn raw_time(&self, prayer: Prayer) -> &str {
    match prayer {
      Prayer::Fajr => &self.fajr,
      Prayer::Dhuhr => &self.dhuhr,
      Prayer::Asr => &self.asr,
      Prayer::Maghrib => &self.maghrib,
      Prayer::Isha => &self.isha,
    }
  }

  /// Parsed time-of-day for a prayer, or None when the field is malformed.
  pub fn time_of(&self, prayer: Prayer) -> Option<NaiveTime> {
    parse_clock(self.raw_time(prayer))
  }

  /// Parsed sunrise (shurooq) time.
  pub fn sunrise(&self) -> Option<NaiveTime> {
    parse_clock(&self.shurooq)
  }
}

/// Which discouraged-prayer window is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakruhWindow {
  /// The 15 minutes immediately after sunrise.
  AfterSunrise,
  /// The 15 minutes immediately before Dhuhr.
  BeforeDhuhr,
  /// The 15 minutes immediately before Maghrib.
  BeforeMaghrib,
}

impl MakruhWindow {
  pub fn label(&self) -> &'static str {
    match self {
      MakruhWindow::AfterSunrise => "after Sunrise",
      MakruhWindow::BeforeDhuhr => "before Dhuhr",
      MakruhWindow::BeforeMaghrib => "before Maghrib",
    }
  }
}

impl std::fmt::Display for MakruhWindow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.label())
  }
}

/// Countdown to the end of an active Makruh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakruhCountdown {
  Active(Duration),
  /// The window end already passed relative to now (stale table); reported
  /// instead of a negative countdown.
  Expired,
}

/// An active Makruh window with its remaining time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakruhState {
  pub window: MakruhWindow,
  pub remaining: MakruhCountdown,
}

/// The resolver's output snapshot; rebuilt from scratch on every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalState {
  /// The prayer window we are currently inside.
  pub current: Prayer,
  /// The next prayer to arrive.
  pub next: Prayer,
  /// Time until `next`, non-negative by construction.
  pub countdown: Duration,
  /// Active discouraged-prayer window, if any.
  pub makruh: Option<MakruhState>,
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  Resolved(TemporalState),
  /// Past the last prayer of the day and tomorrow's table is missing; the
  /// caller should fetch it rather than have the resolver guess.
  NeedTomorrow { current: Prayer },
  /// No usable time in today's table at all.
  Unavailable,
}
