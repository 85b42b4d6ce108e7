use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OpenFlags};

use crate::{
    log_entry::{DATE_FORMAT, LogEntry, LogKey},
    reading::{CompleteReading, Location},
    store::LogSink,
};

pub const DB_FILE: &str = "./coolship-log.db";

#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
}

impl DB {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let conn = Connection::open(path).context("Failed to open database file")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an existing log file for reading. Fails instead of creating it.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .context("Failed to open database file")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, anyhow::Error> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, anyhow::Error> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    pub fn init(&self) -> Result<(), anyhow::Error> {
        self.conn()?
            .execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS tracking_logs (
                    date TEXT NOT NULL,
                    time TEXT NOT NULL,
                    temperature REAL NOT NULL,
                    humidity REAL NOT NULL,
                    lat REAL NOT NULL,
                    lng REAL NOT NULL,
                    timestamp TEXT NOT NULL,
                    PRIMARY KEY (date, time)
                );
                ",
            )
            .context("Failed to create table")?;
        Ok(())
    }

    /// Writes the entry for `key`, replacing any entry already in that bucket.
    /// The timestamp is assigned by SQLite.
    pub fn upsert(&self, key: &LogKey, reading: &CompleteReading) -> Result<(), anyhow::Error> {
        self.conn()?
            .execute(
                r"
                INSERT INTO tracking_logs (date, time, temperature, humidity, lat, lng, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                ON CONFLICT (date, time) DO UPDATE SET
                    temperature = excluded.temperature,
                    humidity = excluded.humidity,
                    lat = excluded.lat,
                    lng = excluded.lng,
                    timestamp = excluded.timestamp",
                rusqlite::params![
                    key.date,
                    key.time,
                    reading.temperature,
                    reading.humidity,
                    reading.location.lat,
                    reading.location.lng,
                ],
            )
            .with_context(|| format!("Failed to write log entry {}", key.path()))?;
        Ok(())
    }

    /// Logged dates, newest first, limited to `from..=to` when given.
    pub fn dates(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<String>, anyhow::Error> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r"
                SELECT DISTINCT date FROM tracking_logs
                WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2)
                ORDER BY date DESC",
            )
            .context("Failed to prepare date query")?;

        let from = from.map(|d| d.format(DATE_FORMAT).to_string());
        let to = to.map(|d| d.format(DATE_FORMAT).to_string());

        let dates = stmt
            .query_map(rusqlite::params![from, to], |row| row.get::<_, String>(0))
            .context("Failed to query dates")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read dates")?;

        Ok(dates)
    }

    /// Entries logged on `date`, in time order.
    pub fn entries(&self, date: &str) -> Result<Vec<(LogKey, LogEntry)>, anyhow::Error> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r"
                SELECT time, temperature, humidity, lat, lng, timestamp FROM tracking_logs
                WHERE date = ?1
                ORDER BY time ASC",
            )
            .context("Failed to prepare entry query")?;

        let rows = stmt
            .query_map([date], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .context("Failed to query entries")?;

        let mut entries = Vec::new();
        for row in rows {
            let (time, temperature, humidity, lat, lng, timestamp) =
                row.context("Failed to read log entry")?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .with_context(|| format!("Invalid timestamp in log entry {date} {time}"))?
                .with_timezone(&Utc);

            entries.push((
                LogKey {
                    date: date.to_string(),
                    time,
                },
                LogEntry {
                    temperature,
                    humidity,
                    location: Location { lat, lng },
                    timestamp,
                },
            ));
        }

        Ok(entries)
    }
}

impl LogSink for DB {
    async fn write(&self, key: &LogKey, reading: &CompleteReading) -> anyhow::Result<()> {
        self.upsert(key, reading)
    }
}
