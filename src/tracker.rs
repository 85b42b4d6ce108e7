use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::time::MissedTickBehavior;

use crate::{
    log_entry::LogKey,
    store::{LogSink, ReadingSource},
};

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Jakarta;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TrackingDisabled,
    NoReading,
    /// One of temperature, humidity, latitude or longitude is absent.
    IncompleteReading,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Logged(LogKey),
}

/// Copies the current reading into the log store once per tick while
/// tracking is enabled.
#[derive(Debug)]
pub struct Tracker<R, L> {
    readings: R,
    logs: L,
    timezone: Tz,
}

impl<R: ReadingSource, L: LogSink> Tracker<R, L> {
    pub fn new(readings: R, logs: L, timezone: Tz) -> Self {
        Self {
            readings,
            logs,
            timezone,
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<TickOutcome> {
        let (reading, tracking) =
            tokio::try_join!(self.readings.reading(), self.readings.tracking_enabled())?;

        if !tracking {
            return Ok(TickOutcome::Skipped(SkipReason::TrackingDisabled));
        }

        let Some(reading) = reading else {
            return Ok(TickOutcome::Skipped(SkipReason::NoReading));
        };

        let Some(reading) = reading.complete() else {
            return Ok(TickOutcome::Skipped(SkipReason::IncompleteReading));
        };

        let key = LogKey::bucket(now, self.timezone);
        self.logs.write(&key, &reading).await?;

        Ok(TickOutcome::Logged(key))
    }

    /// Ticks every `interval` until the task is dropped. A failed tick does
    /// not affect the next one; missed ticks are not replayed.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match self.tick(Utc::now()).await {
                Ok(TickOutcome::Logged(key)) => log::info!("Logged {}", key.path()),
                Ok(TickOutcome::Skipped(SkipReason::IncompleteReading)) => {
                    log::warn!("Skipped logging: reading is incomplete")
                }
                Ok(TickOutcome::Skipped(reason)) => log::debug!("Skipped logging: {reason:?}"),
                Err(e) => log::error!("Failed to log reading: {e:#}"),
            }
        }
    }
}
