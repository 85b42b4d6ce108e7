//! In-memory stand-ins for the realtime database, the log store and the push
//! transport.

use std::sync::{Arc, Mutex};

use anyhow::bail;

use crate::{
    log_entry::LogKey,
    push::{BatchResponse, MulticastMessage, Pusher},
    reading::{CompleteReading, Reading},
    store::{LogSink, ReadingSource, TokenSource},
};

#[derive(Debug, Default)]
pub struct FakeRealtimeDb {
    pub reading: Option<Reading>,
    pub tracking: bool,
    pub tokens: Vec<String>,
    pub fail: bool,
}

impl ReadingSource for FakeRealtimeDb {
    async fn reading(&self) -> anyhow::Result<Option<Reading>> {
        if self.fail {
            bail!("realtime database unavailable");
        }
        Ok(self.reading)
    }

    async fn tracking_enabled(&self) -> anyhow::Result<bool> {
        if self.fail {
            bail!("realtime database unavailable");
        }
        Ok(self.tracking)
    }
}

impl TokenSource for FakeRealtimeDb {
    async fn tokens(&self) -> anyhow::Result<Vec<String>> {
        if self.fail {
            bail!("realtime database unavailable");
        }
        Ok(self.tokens.clone())
    }
}

/// Records every batch. Clones share the record. Tokens listed in `rejected`
/// count as failed deliveries.
#[derive(Debug, Clone, Default)]
pub struct RecordingPusher {
    pub rejected: Vec<String>,
    pub(crate) sent: Arc<Mutex<Vec<MulticastMessage>>>,
}

impl RecordingPusher {
    pub fn sent(&self) -> Vec<MulticastMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Pusher for RecordingPusher {
    async fn send_multicast(&self, message: &MulticastMessage) -> anyhow::Result<BatchResponse> {
        self.sent.lock().unwrap().push(message.clone());

        let failure_count = message
            .tokens
            .iter()
            .filter(|&token| self.rejected.contains(token))
            .count();
        Ok(BatchResponse {
            success_count: message.tokens.len() - failure_count,
            failure_count,
        })
    }
}

#[derive(Debug, Default)]
pub struct FailingLogSink;

impl LogSink for FailingLogSink {
    async fn write(&self, key: &LogKey, _reading: &CompleteReading) -> anyhow::Result<()> {
        bail!("log store unavailable: {}", key.path())
    }
}
