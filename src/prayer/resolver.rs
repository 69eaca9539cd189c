//! Pure temporal state resolver.
//!
//! A stateless projection `(today's table, tomorrow's table?, now) ->
//! TemporalState`, safe to call on every tick. All the day-boundary logic
//! lives here so presentation surfaces never reimplement it.

use chrono::{Duration, NaiveDateTime, NaiveTime};

use super::types::{
  MakruhCountdown, MakruhState, MakruhWindow, Prayer, PrayerTimeTable, Resolution, TemporalState,
};

/// Length of each discouraged-prayer window.
const MAKRUH_WINDOW_MINUTES: i64 = 15;

/// Parse a 12-hour wall-clock string with meridiem marker ("05:02 am").
///
/// Case-insensitive; normalizes the 12:00 am -> 00:00 and 12:00 pm -> 12:00
/// edge cases. Returns None on malformed input so callers can skip the field
/// instead of failing the whole computation.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
  let normalized = raw.trim().to_uppercase();
  NaiveTime::parse_from_str(&normalized, "%I:%M %p")
    .or_else(|_| NaiveTime::parse_from_str(&normalized, "%I:%M:%S %p"))
    .ok()
}

/// Seconds since local midnight.
fn secs(t: NaiveTime) -> i64 {
  t.signed_duration_since(NaiveTime::MIN).num_seconds()
}

/// Compute the temporal state for `now`.
///
/// Walks the ordered prayer sequence; the first parseable time strictly after
/// `now` is `next` and its predecessor is `current`. Before Fajr, `current`
/// is yesterday's Isha. Past the last prayer of the day, `next` rolls over to
/// tomorrow's Fajr; without tomorrow's table that is reported as
/// `NeedTomorrow` rather than guessed.
pub fn resolve(
  today: &PrayerTimeTable,
  tomorrow: Option<&PrayerTimeTable>,
  now: NaiveDateTime,
) -> Resolution {
  // Malformed fields are skipped: treated as "never reached".
  let times: Vec<(Prayer, NaiveTime)> = Prayer::ORDER
    .iter()
    .filter_map(|p| today.time_of(*p).map(|t| (*p, t)))
    .collect();

  let (last_prayer, _) = match times.last() {
    Some(entry) => *entry,
    None => return Resolution::Unavailable,
  };

  let now_time = now.time();
  let makruh = detect_makruh(today, now_time);

  if let Some(idx) = times.iter().position(|(_, t)| *t > now_time) {
    let (next, next_time) = times[idx];
    let current = if idx == 0 {
      // Before Fajr: still inside yesterday's Isha window.
      Prayer::Isha
    } else {
      times[idx - 1].0
    };
    return Resolution::Resolved(TemporalState {
      current,
      next,
      countdown: next_time.signed_duration_since(now_time),
      makruh,
    });
  }

  // Past the last prayer today: next is tomorrow's Fajr.
  match tomorrow.and_then(|t| t.time_of(Prayer::Fajr)) {
    Some(fajr_time) => {
      let until_midnight = Duration::days(1) - now_time.signed_duration_since(NaiveTime::MIN);
      let countdown = until_midnight + fajr_time.signed_duration_since(NaiveTime::MIN);
      Resolution::Resolved(TemporalState {
        current: last_prayer,
        next: Prayer::Fajr,
        countdown,
        makruh,
      })
    }
    None => Resolution::NeedTomorrow {
      current: last_prayer,
    },
  }
}

/// Detect whether `now` falls inside a discouraged-prayer window.
///
/// Windows are checked in priority order (sunrise, Dhuhr, Maghrib); only the
/// first match is reported. Membership is evaluated at minute granularity,
/// inclusive of the end minute, matching the table's minute-precision times;
/// the countdown is computed in seconds against the window's end, and an end
/// already in the past is reported as expired instead of a negative value.
fn detect_makruh(table: &PrayerTimeTable, now: NaiveTime) -> Option<MakruhState> {
  let window_secs = MAKRUH_WINDOW_MINUTES * 60;

  let candidates = [
    (
      MakruhWindowBounds::after(table.sunrise(), window_secs),
      MakruhWindow::AfterSunrise,
    ),
    (
      MakruhWindowBounds::before(table.time_of(Prayer::Dhuhr), window_secs),
      MakruhWindow::BeforeDhuhr,
    ),
    (
      MakruhWindowBounds::before(table.time_of(Prayer::Maghrib), window_secs),
      MakruhWindow::BeforeMaghrib,
    ),
  ];

  let now_secs = secs(now);
  let now_min = now_secs / 60;

  for (bounds, window) in candidates {
    let (start, end) = match bounds.0 {
      Some(b) => b,
      None => continue,
    };

    if now_min >= start / 60 && now_min <= end / 60 {
      let remaining = end - now_secs;
      let remaining = if remaining > 0 {
        MakruhCountdown::Active(Duration::seconds(remaining))
      } else {
        MakruhCountdown::Expired
      };
      return Some(MakruhState { window, remaining });
    }
  }

  None
}

/// Start/end of a Makruh window in seconds since midnight.
struct MakruhWindowBounds(Option<(i64, i64)>);

impl MakruhWindowBounds {
  /// Window covering the span immediately after an anchor time.
  fn after(anchor: Option<NaiveTime>, span: i64) -> Self {
    Self(anchor.map(|t| (secs(t), secs(t) + span)))
  }

  /// Window covering the span immediately before an anchor time.
  fn before(anchor: Option<NaiveTime>, span: i64) -> Self {
    Self(anchor.map(|t| (secs(t) - span, secs(t))))
  }
}

/// Split a countdown duration into (hours, minutes, seconds).
pub fn countdown_parts(d: Duration) -> (i64, i64, i64) {
  let total = d.num_seconds().max(0);
  (total / 3600, (total % 3600) / 60, total % 60)
}
