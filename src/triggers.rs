use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::metrics;
use crate::models::{DocumentEvent, EventKind, NotificationCategory};
use crate::notify::Notifier;
use crate::store::DocumentStore;

const DELIVERY_CATEGORY: &str = "Entrega";
const DEFAULT_CLIENT_NAME: &str = "Cliente";

/// Reacts to create/update events on the transactions collection. Read-only
/// with respect to the triggering document; all failures are logged and
/// swallowed so the upstream write is never affected. The event feed is
/// at-least-once, so a redelivered event may produce a duplicate
/// notification.
pub struct TriggerHandler {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<Notifier>,
}

pub async fn run_trigger_consumer(
    mut event_receiver: mpsc::Receiver<DocumentEvent>,
    handler: TriggerHandler,
) -> Result<()> {
    info!("Starting delivery trigger consumer");

    while let Some(event) = event_receiver.recv().await {
        metrics::EVENTS_PROCESSED.inc();
        let result = match event.kind {
            EventKind::Created => handler.on_created(&event).await,
            EventKind::Updated => handler.on_updated(&event).await,
        };
        if let Err(e) = result {
            error!(document_id = %event.document_id, error = %e, "Trigger handler failed");
        }
    }

    info!("Delivery trigger consumer stopped");
    Ok(())
}

fn field<'a>(doc: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    doc.get(name).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn delivery_data(document_id: &str) -> HashMap<String, String> {
    HashMap::from([
        ("deliveryId".to_string(), document_id.to_string()),
        (
            "actionUrl".to_string(),
            format!("/dashboard/entregas/{}", document_id),
        ),
    ])
}

impl TriggerHandler {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<Notifier>) -> Self {
        Self { store, notifier }
    }

    /// New delivery with an assigned driver: notify the driver.
    pub async fn on_created(&self, event: &DocumentEvent) -> Result<()> {
        if field(&event.after, "category") != Some(DELIVERY_CATEGORY) {
            return Ok(());
        }
        let Some(driver_id) = field(&event.after, "assignedDriverId") else {
            debug!(document_id = %event.document_id, "Delivery created without a driver, skipping");
            return Ok(());
        };

        let client_name = match field(&event.after, "clientId") {
            Some(client_id) => self
                .store
                .get_user(client_id)
                .await?
                .map(|u| u.display_name)
                .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
            None => DEFAULT_CLIENT_NAME.to_string(),
        };

        info!(
            document_id = %event.document_id,
            driver_id = %driver_id,
            "New delivery assigned, notifying driver"
        );

        self.notifier
            .send_silent(
                driver_id,
                "Nova Entrega Disponível",
                &format!("{} solicitou uma nova entrega. Toque para ver os detalhes.", client_name),
                NotificationCategory::Delivery,
                delivery_data(&event.document_id),
            )
            .await;

        Ok(())
    }

    /// Status transition on an existing delivery: notify the client for the
    /// allow-listed target statuses only.
    pub async fn on_updated(&self, event: &DocumentEvent) -> Result<()> {
        if field(&event.after, "category") != Some(DELIVERY_CATEGORY) {
            return Ok(());
        }
        let before_status = event.before.as_ref().and_then(|b| field(b, "deliveryStatus"));
        let Some(after_status) = field(&event.after, "deliveryStatus") else {
            return Ok(());
        };
        if before_status == Some(after_status) {
            return Ok(());
        }

        // Deliberate allow-list; other transitions (including into Pendente)
        // are not notified
        let (title, body) = match after_status {
            "Confirmada" => (
                "Entrega Confirmada",
                "O motorista confirmou sua entrega e está a caminho.",
            ),
            "Recusada" => (
                "Entrega Recusada",
                "O motorista recusou sua entrega. Ela será reatribuída em breve.",
            ),
            "Entregue" => (
                "Entrega Concluída",
                "Sua entrega foi realizada com sucesso.",
            ),
            _ => return Ok(()),
        };

        let Some(client_id) = field(&event.after, "clientId") else {
            debug!(document_id = %event.document_id, "Status change without a client, skipping");
            return Ok(());
        };

        info!(
            document_id = %event.document_id,
            status = %after_status,
            "Delivery status changed, notifying client"
        );

        self.notifier
            .send_silent(
                client_id,
                title,
                body,
                NotificationCategory::Delivery,
                delivery_data(&event.document_id),
            )
            .await;

        Ok(())
    }
}
