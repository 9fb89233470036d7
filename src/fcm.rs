use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::{NotificationCategory, PushMessage};

#[derive(Debug, Error)]
pub enum PushError {
    /// The gateway no longer knows the token; the device was wiped or the
    /// app reinstalled. Callers should drop the stored token.
    #[error("push token is no longer registered")]
    TokenUnregistered,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A deliver-or-fail push gateway. Returns the gateway's message reference
/// on success.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError>;
}

pub struct FcmClient {
    http: HttpClient,
    send_url: String,
    server_key: String,
}

#[derive(Deserialize)]
struct FcmSendResponse {
    name: String,
}

fn category_str(category: NotificationCategory) -> &'static str {
    match category {
        NotificationCategory::Delivery => "delivery",
        NotificationCategory::Payment => "payment",
        NotificationCategory::Journey => "journey",
        NotificationCategory::System => "system",
        NotificationCategory::General => "general",
    }
}

impl FcmClient {
    pub fn new(http: HttpClient, send_url: String, server_key: String) -> Self {
        Self {
            http,
            send_url,
            server_key,
        }
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        // FCM data values must be strings; category rides along with the
        // caller-supplied payload
        let mut data = message.data.clone();
        data.insert("category".to_string(), category_str(message.category).to_string());

        let body = json!({
            "message": {
                "token": message.token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": data,
            }
        });

        debug!(title = %message.title, "Attempting FCM send");

        const MAX_RETRIES: u8 = 3;
        let mut retry_count = 0;
        let mut backoff_ms = 100;

        loop {
            let result = self
                .http
                .post(&self.send_url)
                .bearer_auth(&self.server_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: FcmSendResponse = response
                            .json()
                            .await
                            .context("malformed FCM send response")?;
                        info!(
                            category = %category_str(message.category),
                            message_id = %parsed.name,
                            "Notification delivered"
                        );
                        return Ok(parsed.name);
                    }

                    // UNREGISTERED comes back as 404; older endpoints used 410
                    if status == 404 || status == 410 {
                        warn!(status = %status, "FCM rejected token as unregistered");
                        return Err(PushError::TokenUnregistered);
                    }

                    if status.is_server_error() && retry_count < MAX_RETRIES - 1 {
                        retry_count += 1;
                        warn!(
                            status = %status,
                            attempt = retry_count,
                            "FCM send failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms *= 2;
                        continue;
                    }

                    let text = response.text().await.unwrap_or_default();
                    error!(status = %status, "FCM send rejected");
                    return Err(anyhow!("FCM send returned {}: {}", status, text).into());
                }
                Err(e) => {
                    retry_count += 1;
                    warn!(
                        error = %e,
                        attempt = retry_count,
                        "FCM request failed, retrying"
                    );

                    if retry_count >= MAX_RETRIES {
                        error!(error = %e, "FCM send failed after maximum retries");
                        return Err(anyhow::Error::from(e)
                            .context("FCM send failed after retries")
                            .into());
                    }

                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}
