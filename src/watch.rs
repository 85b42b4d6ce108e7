//! Mutation trigger for the notifier.
//!
//! The realtime database streams changes to a node as server-sent events:
//! a `put` replaces the value at a path, a `patch` merges children into it.
//! The watcher mirrors the node locally so every event can be turned into a
//! before/after pair of readings. The first `put` after connecting carries the
//! current value and is not treated as a write.

use std::{pin::pin, sync::Arc, time::Duration};

use anyhow::{Context as _, bail};
use backon::{ConstantBuilder, Retryable as _};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_stream::{Stream, StreamExt as _};

use crate::{
    notifier::{Notifier, ReadingChange},
    push::Pusher,
    reading::Reading,
    rtdb::{RealtimeDb, SENSOR_DATA_PATH},
    store::TokenSource,
};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Splits a byte stream into server-sent event frames. Chunk boundaries may
/// fall anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer
            .extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&raw[..end])) {
                frames.push(frame);
            }
        }

        frames
    }
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => event = Some(value),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }

    Some(SseFrame {
        event: event.unwrap_or("message").to_string(),
        data: data.join("\n"),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    Cancel(String),
    AuthRevoked,
    Other(String),
}

#[derive(Debug, Deserialize)]
struct Payload {
    path: String,
    data: Value,
}

impl StreamEvent {
    pub fn parse(frame: &SseFrame) -> anyhow::Result<StreamEvent> {
        let payload = || {
            serde_json::from_str::<Payload>(&frame.data)
                .with_context(|| format!("invalid {} event payload: {}", frame.event, frame.data))
        };

        Ok(match frame.event.as_str() {
            "put" => {
                let Payload { path, data } = payload()?;
                StreamEvent::Put { path, data }
            }
            "patch" => {
                let Payload { path, data } = payload()?;
                StreamEvent::Patch { path, data }
            }
            "keep-alive" => StreamEvent::KeepAlive,
            "cancel" => StreamEvent::Cancel(frame.data.clone()),
            "auth_revoked" => StreamEvent::AuthRevoked,
            other => StreamEvent::Other(other.to_string()),
        })
    }
}

/// Replaces the value at `path` below `root`. Writing `null` removes it.
pub fn apply_put(root: &mut Value, path: &str, data: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = data;
        return;
    };

    if data.is_null() {
        remove(root, &segments);
        return;
    }

    let mut node = root;
    for segment in parents {
        node = child(node, segment);
    }
    *child(node, last) = data;
}

/// Removes the value at `segments`. Objects left empty become `null`, as the
/// database does not keep empty nodes.
fn remove(node: &mut Value, segments: &[&str]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let Value::Object(map) = node else {
        return;
    };

    if rest.is_empty() {
        map.remove(*first);
    } else if let Some(child) = map.get_mut(*first) {
        remove(child, rest);
        if child.is_null() {
            map.remove(*first);
        }
    }

    if map.is_empty() {
        *node = Value::Null;
    }
}

/// Merges every child of `data` into the value at `path`.
pub fn apply_patch(root: &mut Value, path: &str, data: Value) {
    let Value::Object(children) = data else {
        return;
    };

    let base = path.trim_end_matches('/');
    for (key, value) in children {
        apply_put(root, &format!("{base}/{key}"), value);
    }
}

fn child<'a>(node: &'a mut Value, key: &str) -> &'a mut Value {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }

    match node {
        Value::Object(map) => map.entry(key).or_insert(Value::Null),
        other => other,
    }
}

/// Local copy of the watched node.
#[derive(Debug, Default)]
pub struct Mirror {
    snapshot: Value,
    synced: bool,
}

impl Mirror {
    pub fn reading(&self) -> Option<Reading> {
        Reading::from_snapshot(&self.snapshot)
    }

    /// Applies one event. Returns the change when the event is a write.
    pub fn apply(&mut self, event: StreamEvent) -> anyhow::Result<Option<ReadingChange>> {
        let before = self.reading();

        match event {
            StreamEvent::Put { path, data } => apply_put(&mut self.snapshot, &path, data),
            StreamEvent::Patch { path, data } => apply_patch(&mut self.snapshot, &path, data),
            StreamEvent::KeepAlive => return Ok(None),
            StreamEvent::Cancel(reason) => bail!("event stream cancelled: {reason}"),
            StreamEvent::AuthRevoked => bail!("event stream credential revoked"),
            StreamEvent::Other(event) => {
                log::debug!("Ignoring stream event: {event}");
                return Ok(None);
            }
        }

        if !self.synced {
            self.synced = true;
            return Ok(None);
        }

        Ok(Some(ReadingChange {
            before,
            after: self.reading(),
        }))
    }
}

/// Reconnection policy for the event stream: a constant delay and no limit on
/// attempts.
pub fn reconnect_builder() -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(RECONNECT_DELAY)
        .without_max_times()
}

/// Watches the sensor node until the task is dropped, handing every write to
/// `notifier` in its own task.
pub async fn watch<T, P>(
    db: &RealtimeDb,
    notifier: Arc<Notifier<T, P>>,
    reconnect: ConstantBuilder,
) where
    T: TokenSource + Send + Sync + 'static,
    P: Pusher + Send + Sync + 'static,
{
    loop {
        let connected = (|| db.stream(SENSOR_DATA_PATH))
            .retry(reconnect)
            .notify(|e, dur| {
                log::error!("{e:#}");
                log::info!("Reconnecting in {:?}", dur);
            })
            .await;

        match connected {
            Ok(response) => {
                log::info!("Watching /{SENSOR_DATA_PATH} for changes");

                match consume(response.bytes_stream(), &notifier).await {
                    Ok(()) => log::warn!("Sensor data stream closed"),
                    Err(e) => log::error!("Sensor data stream failed: {e:#}"),
                }
            }
            Err(e) => log::error!("Failed to connect to sensor data stream: {e:#}"),
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Applies every event of one connection to a fresh mirror and spawns a
/// notifier call per write. Returns when the stream ends.
async fn consume<S, B, E, T, P>(stream: S, notifier: &Arc<Notifier<T, P>>) -> anyhow::Result<()>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
    T: TokenSource + Send + Sync + 'static,
    P: Pusher + Send + Sync + 'static,
{
    let mut mirror = Mirror::default();
    let mut decoder = SseDecoder::default();
    let mut stream = pin!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("failed to read sensor data stream")?;

        for frame in decoder.push(chunk.as_ref()) {
            let event = StreamEvent::parse(&frame)?;
            let Some(change) = mirror.apply(event)? else {
                continue;
            };

            let notifier = Arc::clone(notifier);
            tokio::spawn(async move {
                if let Err(e) = notifier.handle(&change).await {
                    log::error!("Failed to notify: {e:#}");
                }
            });
        }
    }

    Ok(())
}
