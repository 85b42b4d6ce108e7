use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::reading::Location;

pub const COLLECTION: &str = "tracking_logs";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// One log slot: a calendar date and an hour:minute bucket in the tracker's
/// time zone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogKey {
    pub date: String,
    pub time: String,
}

impl LogKey {
    pub fn bucket(now: DateTime<Utc>, timezone: Tz) -> LogKey {
        let local = now.with_timezone(&timezone);

        LogKey {
            date: local.format(DATE_FORMAT).to_string(),
            time: local.format(TIME_FORMAT).to_string(),
        }
    }

    pub fn path(&self) -> String {
        format!("{COLLECTION}/{}/logs/{}", self.date, self.time)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub temperature: f64,
    pub humidity: f64,
    pub location: Location,
    /// Assigned by the log store when the entry was written.
    pub timestamp: DateTime<Utc>,
}
