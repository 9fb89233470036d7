use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::fcm::{PushError, PushGateway};
use crate::metrics;
use crate::models::{DispatchOutcome, NewNotification, NotificationCategory, PushMessage};
use crate::store::DocumentStore;

/// Composes token lookup, push dispatch and durable notification records.
/// One record is written per successful dispatch; none on skip or failure.
pub struct Notifier {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PushGateway>,
}

impl Notifier {
    pub fn new(store: Arc<dyn DocumentStore>, gateway: Arc<dyn PushGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn send(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        category: NotificationCategory,
        data: HashMap<String, String>,
    ) -> ServiceResult<DispatchOutcome> {
        let token = self.store.get_push_token(user_id).await?;
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => {
                info!(user_id = %user_id, "No push token registered, skipping send");
                metrics::NOTIFICATIONS_SKIPPED.inc();
                return Ok(DispatchOutcome::SkippedNoToken);
            }
        };

        let message = PushMessage {
            token,
            title: title.to_string(),
            body: body.to_string(),
            category,
            data: data.clone(),
        };

        let timer = metrics::DISPATCH_TIME.start_timer();
        let dispatch = self.gateway.send(&message).await;
        timer.observe_duration();

        let message_id = match dispatch {
            Ok(id) => id,
            Err(PushError::TokenUnregistered) => {
                // Drop the stale token so later sends short-circuit to the skip path
                if let Err(e) = self.store.delete_push_token(user_id).await {
                    warn!(user_id = %user_id, error = %e, "Failed to remove stale push token");
                } else {
                    info!(user_id = %user_id, "Removed unregistered push token");
                }
                metrics::NOTIFICATIONS_FAILED.inc();
                return Err(ServiceError::Internal(anyhow::anyhow!(
                    "push token for {} is no longer registered",
                    user_id
                )));
            }
            Err(PushError::Other(e)) => {
                metrics::NOTIFICATIONS_FAILED.inc();
                return Err(ServiceError::Internal(e));
            }
        };

        let record = self
            .store
            .insert_notification(NewNotification {
                user_id: user_id.to_string(),
                title: title.to_string(),
                body: body.to_string(),
                category,
                data,
                dispatch_ref: message_id.clone(),
            })
            .await?;

        metrics::NOTIFICATIONS_SENT.inc();
        Ok(DispatchOutcome::Sent {
            message_id,
            record_id: record.id,
        })
    }

    /// Callable path: a missing token is surfaced as not-found.
    pub async fn send_callable(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        category: NotificationCategory,
        data: HashMap<String, String>,
    ) -> ServiceResult<String> {
        match self.send(user_id, title, body, category, data).await? {
            DispatchOutcome::Sent { message_id, .. } => Ok(message_id),
            DispatchOutcome::SkippedNoToken => Err(ServiceError::NotFound(format!(
                "no push token registered for user {}",
                user_id
            ))),
        }
    }

    /// Trigger path: fire-and-forget. Failures are logged and swallowed so
    /// the triggering document write is never affected.
    pub async fn send_silent(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        category: NotificationCategory,
        data: HashMap<String, String>,
    ) {
        match self.send(user_id, title, body, category, data).await {
            Ok(DispatchOutcome::Sent {
                message_id,
                record_id,
            }) => {
                info!(
                    user_id = %user_id,
                    message_id = %message_id,
                    record_id = %record_id,
                    "Trigger notification sent"
                );
            }
            Ok(DispatchOutcome::SkippedNoToken) => {}
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Trigger notification failed");
            }
        }
    }
}
