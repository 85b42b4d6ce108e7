use anyhow::Result;

use crate::{
    log_entry::LogKey,
    reading::{CompleteReading, Reading},
};

/// Source of the latest reading and of the tracking switch.
pub trait ReadingSource {
    /// `None` when no reading has been published yet.
    fn reading(&self) -> impl Future<Output = Result<Option<Reading>>> + Send;

    fn tracking_enabled(&self) -> impl Future<Output = Result<bool>> + Send;
}

/// Registered push delivery tokens.
pub trait TokenSource {
    fn tokens(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Destination of periodic log entries. Writing an existing key replaces it.
pub trait LogSink {
    fn write(
        &self,
        key: &LogKey,
        reading: &CompleteReading,
    ) -> impl Future<Output = Result<()>> + Send;
}
