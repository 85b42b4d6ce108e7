use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context as _, bail};
use reqwest::Client;
use serde::Serialize;
use tokio::task::JoinSet;

pub const FCM_PROJECTS_URL: &str = "https://fcm.googleapis.com/v1/projects";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// The same notification addressed to many devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MulticastMessage {
    pub notification: Notification,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
}

pub trait Pusher {
    /// Delivers `message` to every token. Individual delivery failures only
    /// show up in the counts.
    fn send_multicast(
        &self,
        message: &MulticastMessage,
    ) -> impl Future<Output = anyhow::Result<BatchResponse>> + Send;
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: TokenMessage<'a>,
}

#[derive(Debug, Serialize)]
struct TokenMessage<'a> {
    token: &'a str,
    notification: &'a Notification,
}

/// Firebase Cloud Messaging HTTP v1 transport. The OAuth access token is read
/// from a file before every batch so it can be rotated externally.
#[derive(Debug, Clone)]
pub struct FcmPusher {
    client: Client,
    send_url: String,
    access_token_file: PathBuf,
}

impl FcmPusher {
    pub fn new(project_id: &str, access_token_file: PathBuf) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            send_url: format!("{FCM_PROJECTS_URL}/{project_id}/messages:send"),
            access_token_file,
        })
    }

    async fn access_token(&self) -> Result<String, anyhow::Error> {
        read_access_token(&self.access_token_file).await
    }
}

async fn read_access_token(path: &Path) -> Result<String, anyhow::Error> {
    let token = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read FCM access token: {}", path.display()))?;

    let token = token.trim();
    if token.is_empty() {
        bail!("FCM access token file is empty: {}", path.display());
    }

    Ok(token.to_string())
}

impl Pusher for FcmPusher {
    async fn send_multicast(&self, message: &MulticastMessage) -> anyhow::Result<BatchResponse> {
        let access_token = self.access_token().await?;

        let mut deliveries = JoinSet::new();
        for token in &message.tokens {
            let request = self
                .client
                .post(&self.send_url)
                .bearer_auth(&access_token)
                .json(&SendRequest {
                    message: TokenMessage {
                        token,
                        notification: &message.notification,
                    },
                });

            deliveries.spawn(async move { request.send().await?.error_for_status() });
        }

        let mut response = BatchResponse::default();
        while let Some(delivery) = deliveries.join_next().await {
            match delivery {
                Ok(Ok(_)) => response.success_count += 1,
                Ok(Err(_)) | Err(_) => response.failure_count += 1,
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_send_request_shape() {
        let notification = Notification {
            title: "title".to_string(),
            body: "body".to_string(),
        };
        let request = SendRequest {
            message: TokenMessage {
                token: "tok1",
                notification: &notification,
            },
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "message": {
                    "token": "tok1",
                    "notification": {"title": "title", "body": "body"},
                }
            })
        );
    }

    #[test]
    fn test_send_url() {
        let pusher = FcmPusher::new("coolship", PathBuf::from("token")).unwrap();
        assert_eq!(
            pusher.send_url,
            "https://fcm.googleapis.com/v1/projects/coolship/messages:send"
        );
    }

    #[tokio::test]
    async fn test_read_access_token() {
        let path = std::env::temp_dir().join(format!("coolship-token-{}", std::process::id()));

        tokio::fs::write(&path, "ya29.token\n").await.unwrap();
        assert_eq!(read_access_token(&path).await.unwrap(), "ya29.token");

        tokio::fs::write(&path, "  \n").await.unwrap();
        assert!(read_access_token(&path).await.is_err());

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(read_access_token(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_tokens_count_as_failures() {
        let path = std::env::temp_dir().join(format!("coolship-send-token-{}", std::process::id()));
        tokio::fs::write(&path, "ya29.token").await.unwrap();

        let mut pusher = FcmPusher::new("coolship", path.clone()).unwrap();
        pusher.send_url = "http://127.0.0.1:1/send".to_string();

        let message = MulticastMessage {
            notification: Notification {
                title: "title".to_string(),
                body: "body".to_string(),
            },
            tokens: vec!["tok1".to_string(), "tok2".to_string()],
        };
        let response = pusher.send_multicast(&message).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(
            response.unwrap(),
            BatchResponse {
                success_count: 0,
                failure_count: 2,
            }
        );
    }
}
