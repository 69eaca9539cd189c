use chrono::Local;
use color_eyre::Result;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{is_offline, SqliteStorage};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::prayer::resolver::{self, countdown_parts};
use crate::prayer::types::{MakruhCountdown, PrayerTimeTable, Resolution};
use crate::prayer::{CachedTimetableClient, TimetableStore};

/// Main application state.
///
/// Owns the cached provider and re-derives the temporal state on every
/// tick; the state itself is never persisted.
pub struct App {
  provider: CachedTimetableClient<SqliteStorage>,
  tick_rate: Duration,

  /// Today's table; superseded when the date rolls over.
  today: Option<PrayerTimeTable>,
  /// Tomorrow's table, fetched lazily for the post-Isha rollover.
  tomorrow: Option<PrayerTimeTable>,

  /// Last printed status line, to emit only on change.
  last_line: Option<String>,
  /// Whether the offline condition was already reported.
  reported_offline: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let storage = SqliteStorage::open()?;
    let store = TimetableStore::open()?;
    let tick_rate = config.tick_rate();
    let provider = CachedTimetableClient::new(&config, storage, store)?;

    Ok(Self {
      provider,
      tick_rate,
      today: None,
      tomorrow: None,
      last_line: None,
      reported_offline: false,
    })
  }

  /// Run the tick loop until interrupted.
  pub async fn run(&mut self) -> Result<()> {
    let mut events = EventHandler::new(self.tick_rate);

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        event = events.next() => match event {
          Some(Event::Tick) => self.on_tick().await,
          None => break,
        },
      }
    }

    Ok(())
  }

  /// Compute a single status line and return it (for one-shot mode).
  pub async fn resolve_once(&mut self) -> Result<String> {
    Ok(self.current_line().await)
  }

  async fn on_tick(&mut self) {
    let line = self.current_line().await;
    if self.last_line.as_deref() != Some(line.as_str()) {
      println!("{}", line);
      self.last_line = Some(line);
    }
  }

  async fn current_line(&mut self) -> String {
    self.refresh_today().await;

    let today = match &self.today {
      Some(table) => table,
      None => return "offline - no prayer times available".to_string(),
    };

    let now = Local::now().naive_local();
    let mut resolution = resolver::resolve(today, self.tomorrow.as_ref(), now);

    // Past Isha the resolver needs tomorrow's Fajr; fetch it on demand.
    if matches!(resolution, Resolution::NeedTomorrow { .. }) {
      self.refresh_tomorrow().await;
      if let Some(today) = &self.today {
        resolution = resolver::resolve(today, self.tomorrow.as_ref(), now);
      }
    }

    status_line(&resolution)
  }

  /// Fetch today's table when missing or superseded by a date rollover.
  async fn refresh_today(&mut self) {
    let date = Local::now().date_naive();
    if self.today.as_ref().map(|t| t.date_for) == Some(date) {
      return;
    }

    match self.provider.today().await {
      Ok(table) => {
        self.today = Some(table);
        self.reported_offline = false;
      }
      Err(err) => {
        if is_offline(&err) {
          if !self.reported_offline {
            warn!("provider unreachable and no cached table");
            self.reported_offline = true;
          } else {
            debug!("still offline without a cached table");
          }
        } else {
          warn!(error = %err, "failed to load today's time table");
        }
        self.today = None;
      }
    }
  }

  async fn refresh_tomorrow(&mut self) {
    let date = Local::now().date_naive();
    if self
      .tomorrow
      .as_ref()
      .and_then(|t| t.date_for.pred_opt())
      == Some(date)
    {
      return;
    }

    match self.provider.tomorrow().await {
      Ok(table) => self.tomorrow = Some(table),
      Err(err) => debug!(error = %err, "tomorrow's table not available yet"),
    }
  }
}

/// Render a resolution as a one-line status.
fn status_line(resolution: &Resolution) -> String {
  match resolution {
    Resolution::Resolved(state) => {
      let (h, m, s) = countdown_parts(state.countdown);
      let mut line = format!(
        "{} now - {} in {:02}:{:02}:{:02}",
        state.current, state.next, h, m, s
      );

      if let Some(makruh) = &state.makruh {
        match makruh.remaining {
          MakruhCountdown::Active(d) => {
            let (_, mm, ss) = countdown_parts(d);
            line.push_str(&format!(
              " [Makruh {} ends in {:02}:{:02}]",
              makruh.window, mm, ss
            ));
          }
          MakruhCountdown::Expired => {
            line.push_str(&format!(" [Makruh {} just ended]", makruh.window));
          }
        }
      }

      line
    }
    Resolution::NeedTomorrow { current } => {
      format!("{} now - awaiting tomorrow's times", current)
    }
    Resolution::Unavailable => "prayer times unavailable".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::prayer::types::{MakruhState, MakruhWindow, Prayer, TemporalState};
  use chrono::Duration as ChronoDuration;

  #[test]
  fn test_status_line_plain() {
    let resolution = Resolution::Resolved(TemporalState {
      current: Prayer::Dhuhr,
      next: Prayer::Asr,
      countdown: ChronoDuration::hours(3) + ChronoDuration::minutes(30),
      makruh: None,
    });

    assert_eq!(status_line(&resolution), "Dhuhr now - Asr in 03:30:00");
  }

  #[test]
  fn test_status_line_with_makruh() {
    let resolution = Resolution::Resolved(TemporalState {
      current: Prayer::Fajr,
      next: Prayer::Dhuhr,
      countdown: ChronoDuration::hours(5) + ChronoDuration::minutes(50),
      makruh: Some(MakruhState {
        window: MakruhWindow::AfterSunrise,
        remaining: MakruhCountdown::Active(ChronoDuration::minutes(10)),
      }),
    });

    assert_eq!(
      status_line(&resolution),
      "Fajr now - Dhuhr in 05:50:00 [Makruh after Sunrise ends in 10:00]"
    );
  }

  #[test]
  fn test_status_line_expired_makruh() {
    let resolution = Resolution::Resolved(TemporalState {
      current: Prayer::Fajr,
      next: Prayer::Dhuhr,
      countdown: ChronoDuration::minutes(1),
      makruh: Some(MakruhState {
        window: MakruhWindow::BeforeDhuhr,
        remaining: MakruhCountdown::Expired,
      }),
    });

    assert_eq!(
      status_line(&resolution),
      "Fajr now - Dhuhr in 00:01:00 [Makruh before Dhuhr just ended]"
    );
  }

  #[test]
  fn test_status_line_degraded_states() {
    assert_eq!(
      status_line(&Resolution::NeedTomorrow {
        current: Prayer::Isha
      }),
      "Isha now - awaiting tomorrow's times"
    );
    assert_eq!(
      status_line(&Resolution::Unavailable),
      "prayer times unavailable"
    );
  }
}
