use anyhow::Context as _;

use crate::{
    push::{BatchResponse, MulticastMessage, Notification, Pusher},
    reading::Reading,
    store::TokenSource,
    threshold::Thresholds,
};

pub const DEFAULT_ALERT_TITLE: &str = "⚠️ Kondisi Tidak Ideal!";

/// A write to the reading node: the snapshot before and after it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadingChange {
    pub before: Option<Reading>,
    pub after: Option<Reading>,
}

/// Sends an alert to every registered device whenever a written reading is
/// outside the safe band. Consecutive bad readings each produce an alert.
#[derive(Debug)]
pub struct Notifier<T, P> {
    tokens: T,
    pusher: P,
    thresholds: Thresholds,
    title: String,
}

impl<T: TokenSource, P: Pusher> Notifier<T, P> {
    pub fn new(tokens: T, pusher: P, thresholds: Thresholds, title: String) -> Self {
        Self {
            tokens,
            pusher,
            thresholds,
            title,
        }
    }

    /// Returns the delivery counts when an alert was sent.
    pub async fn handle(&self, change: &ReadingChange) -> anyhow::Result<Option<BatchResponse>> {
        let Some(after) = change.after else {
            return Ok(None);
        };

        let evaluation = self.thresholds.evaluate(&after);
        if !evaluation.is_out_of_range() {
            return Ok(None);
        }

        log::debug!("Reading changed from {:?} to {:?}", change.before, after);
        log::warn!(
            "Reading out of range: temperature {:?} ({:?}), humidity {:?} ({:?})",
            after.temperature,
            evaluation.temperature,
            after.humidity,
            evaluation.humidity,
        );

        let tokens = self
            .tokens
            .tokens()
            .await
            .context("failed to read notification tokens")?;

        if tokens.is_empty() {
            log::info!("No devices registered for notifications");
            return Ok(None);
        }

        let message = MulticastMessage {
            notification: Notification {
                title: self.title.clone(),
                body: alert_body(&after),
            },
            tokens,
        };

        let response = self
            .pusher
            .send_multicast(&message)
            .await
            .context("failed to send alert notification")?;

        log::info!(
            "Notification sent to {} devices ({} failed)",
            response.success_count,
            response.failure_count
        );

        Ok(Some(response))
    }
}

/// Renders the parsed values rather than the device's raw text, so `"-5.00"`
/// is shown as `-5`. Absent values are shown as `-`.
pub fn alert_body(reading: &Reading) -> String {
    format!(
        "Suhu: {}°C, Kelembapan: {}%",
        display(reading.temperature),
        display(reading.humidity)
    )
}

fn display(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeRealtimeDb, RecordingPusher};

    fn notifier(tokens: &[&str]) -> Notifier<FakeRealtimeDb, RecordingPusher> {
        let db = FakeRealtimeDb {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..FakeRealtimeDb::default()
        };
        Notifier::new(
            db,
            RecordingPusher::default(),
            Thresholds::default(),
            DEFAULT_ALERT_TITLE.to_string(),
        )
    }

    fn change(temperature: f64, humidity: f64) -> ReadingChange {
        ReadingChange {
            before: None,
            after: Some(Reading {
                temperature: Some(temperature),
                humidity: Some(humidity),
                ..Reading::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_alert_reaches_every_token() {
        let notifier = notifier(&["tok1", "tok2"]);

        let response = notifier.handle(&change(-5.0, 80.0)).await.unwrap();
        assert_eq!(
            response,
            Some(BatchResponse {
                success_count: 2,
                failure_count: 0,
            })
        );

        let sent = notifier.pusher.sent();
        assert_eq!(sent.len(), 1);

        let mut tokens = sent[0].tokens.clone();
        tokens.sort();
        assert_eq!(tokens, ["tok1", "tok2"]);
        assert_eq!(sent[0].notification.title, DEFAULT_ALERT_TITLE);
        assert!(sent[0].notification.body.contains("-5"));
        assert!(sent[0].notification.body.contains("80"));
    }

    #[tokio::test]
    async fn test_no_tokens_no_delivery() {
        let notifier = notifier(&[]);

        assert_eq!(notifier.handle(&change(-5.0, 80.0)).await.unwrap(), None);
        assert!(notifier.pusher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_in_range_no_delivery() {
        let notifier = notifier(&["tok1"]);

        assert_eq!(notifier.handle(&change(-12.0, 82.0)).await.unwrap(), None);
        assert_eq!(notifier.handle(&ReadingChange::default()).await.unwrap(), None);
        assert!(notifier.pusher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_bad_readings_are_not_deduplicated() {
        let notifier = notifier(&["tok1"]);

        notifier.handle(&change(-5.0, 80.0)).await.unwrap();
        notifier.handle(&change(-5.0, 80.0)).await.unwrap();

        assert_eq!(notifier.pusher.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_token_read_failure_propagates() {
        let notifier = Notifier::new(
            FakeRealtimeDb {
                fail: true,
                ..FakeRealtimeDb::default()
            },
            RecordingPusher::default(),
            Thresholds::default(),
            DEFAULT_ALERT_TITLE.to_string(),
        );

        assert!(notifier.handle(&change(-5.0, 80.0)).await.is_err());
        assert!(notifier.pusher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_partial_delivery_failure_is_reported_as_counts() {
        let notifier = Notifier::new(
            FakeRealtimeDb {
                tokens: vec!["tok1".to_string(), "stale".to_string()],
                ..FakeRealtimeDb::default()
            },
            RecordingPusher {
                rejected: vec!["stale".to_string()],
                ..RecordingPusher::default()
            },
            Thresholds::default(),
            DEFAULT_ALERT_TITLE.to_string(),
        );

        assert_eq!(
            notifier.handle(&change(-5.0, 80.0)).await.unwrap(),
            Some(BatchResponse {
                success_count: 1,
                failure_count: 1,
            })
        );
        assert_eq!(notifier.pusher.sent().len(), 1);
    }

    #[test]
    fn test_alert_body() {
        let reading = Reading {
            temperature: Some(-5.0),
            humidity: Some(82.5),
            ..Reading::default()
        };
        assert_eq!(alert_body(&reading), "Suhu: -5°C, Kelembapan: 82.5%");

        let reading = Reading {
            humidity: Some(95.0),
            ..Reading::default()
        };
        assert_eq!(alert_body(&reading), "Suhu: -°C, Kelembapan: 95%");

        let reading = Reading::from_snapshot(&serde_json::json!({
            "temperature_ds18b20": "-5.00",
            "humidity": " 80.50 ",
        }))
        .unwrap();
        assert_eq!(alert_body(&reading), "Suhu: -5°C, Kelembapan: 80.5%");
    }
}
