//! # Side-Effect Notifications
//!
//! Events published after a use case commits. Delivery is best effort:
//! a failing notifier is logged and skipped, never surfaced to the caller.
//!
//! ## Fan-out
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  side_effects_phase                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Notifiers::publish(event)                                              │
//! │       ├──► TracingNotifier     info!(event = {json})                    │
//! │       └──► BroadcastNotifier   tokio::sync::broadcast ──► subscribers   │
//! │                                (UI bridge, receipt printer, ...)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tally_core::ledger::CounterpartyKind;

/// Events emitted after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TallyEvent {
    #[serde(rename_all = "camelCase")]
    PaymentRecorded {
        payment_id: i64,
        kind: CounterpartyKind,
        counterparty_id: i64,
        amount: i64,
        balance_after: i64,
    },

    #[serde(rename_all = "camelCase")]
    SaleCompleted {
        sale_id: i64,
        invoice_number: String,
        total: i64,
        cogs: i64,
        profit: i64,
    },

    #[serde(rename_all = "camelCase")]
    LowStock {
        product_id: i64,
        sku: String,
        current_stock: i64,
        threshold: i64,
    },

    #[serde(rename_all = "camelCase")]
    PurchaseReceived {
        purchase_id: i64,
        supplier_id: i64,
        total: i64,
    },

    #[serde(rename_all = "camelCase")]
    BalancesRepaired { repaired: usize },
}

impl TallyEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TallyEvent::PaymentRecorded { .. } => "payment_recorded",
            TallyEvent::SaleCompleted { .. } => "sale_completed",
            TallyEvent::LowStock { .. } => "low_stock",
            TallyEvent::PurchaseReceived { .. } => "purchase_received",
            TallyEvent::BalancesRepaired { .. } => "balances_repaired",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notifier unavailable: {0}")]
    Unavailable(String),
}

/// A sink for post-commit events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &TallyEvent) -> Result<(), NotifyError>;
}

// =============================================================================
// Tracing Notifier
// =============================================================================

/// Writes each event to the log as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &TallyEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        info!(event = event.name(), payload = %payload, "Event");
        Ok(())
    }
}

// =============================================================================
// Broadcast Notifier
// =============================================================================

/// Fans events out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TallyEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastNotifier { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TallyEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: &TallyEvent) -> Result<(), NotifyError> {
        // No subscribers is normal while nothing listens
        match self.tx.send(event.clone()) {
            Ok(receivers) => debug!(event = event.name(), receivers, "Event broadcast"),
            Err(_) => debug!(event = event.name(), "Event dropped, no subscribers"),
        }
        Ok(())
    }
}

// =============================================================================
// Notifier Set
// =============================================================================

/// The notifiers a use case publishes to.
#[derive(Clone, Default)]
pub struct Notifiers {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracing only.
    pub fn tracing() -> Self {
        Self::new().with(TracingNotifier)
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.sinks.push(Arc::new(notifier));
        self
    }

    /// Delivers to every sink; failures are logged and swallowed.
    pub fn publish(&self, event: &TallyEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event) {
                warn!(event = event.name(), error = %e, "Notifier failed");
            }
        }
    }
}

impl std::fmt::Debug for Notifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifiers").field("sinks", &self.sinks.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _event: &TallyEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Unavailable("printer offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let broadcast = BroadcastNotifier::new(8);
        let mut rx = broadcast.subscribe();
        let notifiers = Notifiers::tracing().with(broadcast);

        let event = TallyEvent::BalancesRepaired { repaired: 2 };
        notifiers.publish(&event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_failing_notifier_is_swallowed() {
        let broadcast = BroadcastNotifier::new(8);
        let mut rx = broadcast.subscribe();
        let notifiers = Notifiers::new().with(FailingNotifier).with(broadcast);

        notifiers.publish(&TallyEvent::BalancesRepaired { repaired: 1 });

        // Later sinks still receive the event
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_event_json_shape() {
        let event = TallyEvent::LowStock {
            product_id: 3,
            sku: "TEA-1".to_string(),
            current_stock: 2,
            threshold: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "lowStock");
        assert_eq!(json["currentStock"], 2);
    }
}
