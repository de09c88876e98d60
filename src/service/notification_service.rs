use crate::domain::error::{ApiError, ApiErrorCode};
use crate::domain::merchant::Psp;
use crate::gateways::registry::PspRegistry;
use crate::repo::store::{NewNotification, NotificationStore};
use crate::service::transaction_service::psp_failure;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub received: usize,
    /// Events not seen before; redeliveries of a stored key are dropped.
    pub stored: usize,
}

/// Accepts provider webhooks and queues each event once per
/// `(psp_transaction_id, psp_event)`.
#[derive(Clone)]
pub struct NotificationIngestor {
    pub notifications: Arc<dyn NotificationStore>,
    pub registry: PspRegistry,
}

impl NotificationIngestor {
    pub fn new(notifications: Arc<dyn NotificationStore>, registry: PspRegistry) -> Self {
        Self {
            notifications,
            registry,
        }
    }

    pub async fn ingest(&self, psp: Psp, body: &[u8]) -> Result<IngestReport, ApiError> {
        let gateway = self
            .registry
            .find(psp)
            .ok_or_else(|| ApiError::of(ApiErrorCode::PspImplNotFound))?;
        let events = gateway
            .extract_notifications(body)
            .map_err(|e| psp_failure(e, "extract_notifications"))?;

        let mut report = IngestReport {
            received: events.len(),
            stored: 0,
        };
        for event in events {
            let stored = self
                .notifications
                .insert_if_absent(&NewNotification {
                    id: event.id,
                    psp,
                    message: event.message,
                })
                .await
                .map_err(ApiError::internal)?;
            if stored {
                report.stored += 1;
            }
        }
        info!(psp = %psp, received = report.received, stored = report.stored, "notifications ingested");
        Ok(report)
    }
}

/// Body the provider expects back once its events are stored.
pub fn acknowledgement(psp: Psp) -> (&'static str, String) {
    match psp {
        Psp::BsPayone => ("text/plain", "TSOK".to_string()),
        _ => (
            "application/json",
            serde_json::json!({ "notificationResponse": "[accepted]" }).to_string(),
        ),
    }
}
