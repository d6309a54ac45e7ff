//! # Order Notifications
//!
//! Best-effort fan-out after a state change has committed. A failed or slow
//! dispatch is logged and never rolls anything back.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use orderline_core::order::OrderWithItems;

/// What happened to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    PaymentReceived,
    PaymentFailed,
    OrderCancelled,
    OrderRefunded,
    FulfillmentUpdated,
}

/// Dispatch failure reported by a [`NotificationDispatcher`].
#[derive(Debug, Clone, Error)]
#[error("Notification dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Delivers order notifications (email, chat, message queue...).
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, order: &OrderWithItems, kind: NotificationKind) -> Result<(), DispatchError>;
}

/// Dispatcher that writes the order snapshot to the log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify(&self, order: &OrderWithItems, kind: NotificationKind) -> Result<(), DispatchError> {
        let payload = serde_json::to_string(&serde_json::json!({
            "kind": kind,
            "order": order,
        }))
        .map_err(|e| DispatchError(e.to_string()))?;

        info!(
            order_number = %order.order.order_number,
            kind = ?kind,
            payload = %payload,
            "Order notification"
        );
        Ok(())
    }
}
