use std::time::Duration;

use anyhow::Context as _;
use reqwest::{Client, RequestBuilder, Response, header};
use serde_json::Value;

use crate::{
    reading::Reading,
    store::{ReadingSource, TokenSource},
};

pub const SENSOR_DATA_PATH: &str = "sensor_data";
pub const TRACK_STATUS_PATH: &str = "track/status";
pub const FCM_TOKENS_PATH: &str = "fcm_tokens";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Firebase Realtime Database accessed through its REST interface.
#[derive(Debug, Clone)]
pub struct RealtimeDb {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl RealtimeDb {
    pub fn new(base_url: &str, auth: Option<String>) -> Result<Self, anyhow::Error> {
        // No overall timeout: event streams stay open indefinitely.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(self.url(path));
        match &self.auth {
            Some(auth) => request.query(&[("auth", auth)]),
            None => request,
        }
    }

    /// Reads the JSON value at `path`. A missing node reads as `null`.
    pub async fn get(&self, path: &str) -> Result<Value, anyhow::Error> {
        self.request(path)
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("failed to read /{path}"))?
            .error_for_status()
            .with_context(|| format!("failed to read /{path}"))?
            .json::<Value>()
            .await
            .with_context(|| format!("failed to decode /{path}"))
    }

    /// Opens the server-sent event stream for `path`.
    pub async fn stream(&self, path: &str) -> Result<Response, anyhow::Error> {
        self.request(path)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("failed to open event stream for /{path}"))?
            .error_for_status()
            .with_context(|| format!("failed to open event stream for /{path}"))
    }
}

impl ReadingSource for RealtimeDb {
    async fn reading(&self) -> anyhow::Result<Option<Reading>> {
        let snapshot = self.get(SENSOR_DATA_PATH).await?;
        Ok(Reading::from_snapshot(&snapshot))
    }

    async fn tracking_enabled(&self) -> anyhow::Result<bool> {
        let status = self.get(TRACK_STATUS_PATH).await?;
        Ok(tracking_flag(&status))
    }
}

impl TokenSource for RealtimeDb {
    async fn tokens(&self) -> anyhow::Result<Vec<String>> {
        let tokens = self.get(FCM_TOKENS_PATH).await?;
        Ok(tokens_from_snapshot(&tokens))
    }
}

/// Tracking is on only for the JSON boolean `true`.
pub fn tracking_flag(status: &Value) -> bool {
    matches!(status, Value::Bool(true))
}

/// Tokens are the keys of the `/fcm_tokens` object; the values are ignored.
pub fn tokens_from_snapshot(snapshot: &Value) -> Vec<String> {
    snapshot
        .as_object()
        .map(|tokens| tokens.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_url() {
        let db = RealtimeDb::new("https://coolship-default-rtdb.firebaseio.com/", None).unwrap();

        assert_eq!(
            db.url(SENSOR_DATA_PATH),
            "https://coolship-default-rtdb.firebaseio.com/sensor_data.json"
        );
        assert_eq!(
            db.url("/track/status"),
            "https://coolship-default-rtdb.firebaseio.com/track/status.json"
        );
    }

    #[test]
    fn test_request_carries_auth() {
        let db = RealtimeDb::new("https://example.firebaseio.com", Some("secret".into())).unwrap();
        let request = db.request(FCM_TOKENS_PATH).build().unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://example.firebaseio.com/fcm_tokens.json?auth=secret"
        );
    }

    #[test]
    fn test_tracking_flag() {
        assert!(tracking_flag(&json!(true)));
        assert!(!tracking_flag(&json!(false)));
        assert!(!tracking_flag(&json!("true")));
        assert!(!tracking_flag(&json!(1)));
        assert!(!tracking_flag(&Value::Null));
    }

    #[test]
    fn test_tokens_from_snapshot() {
        let mut tokens = tokens_from_snapshot(&json!({"tok1": true, "tok2": {"ua": "x"}}));
        tokens.sort();
        assert_eq!(tokens, ["tok1", "tok2"]);

        assert!(tokens_from_snapshot(&Value::Null).is_empty());
        assert!(tokens_from_snapshot(&json!(["tok1"])).is_empty());
    }
}
