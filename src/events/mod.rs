use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// A single field-level change, shipped to the external audit-log appender.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl FieldChange {
    pub fn new(
        field: impl Into<String>,
        before: Option<impl ToString>,
        after: Option<impl ToString>,
    ) -> Self {
        Self {
            field: field.into(),
            before: before.map(|v| v.to_string()),
            after: after.map(|v| v.to_string()),
        }
    }
}

/// Events emitted by the core services.
///
/// Consumers outside the core (notifications, reporting, the audit log)
/// subscribe to these; nothing in the core depends on them being handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderUpdated {
        order_id: Uuid,
        actor: Option<Uuid>,
        changes: Vec<FieldChange>,
    },
    OrderRefunded {
        order_id: Uuid,
        reason: String,
    },
    OrderOnHold {
        order_id: Uuid,
    },
    OrderReleasedFromHold {
        order_id: Uuid,
    },
    OrderProgressRecorded {
        order_id: Uuid,
        status: String,
        changed_at: DateTime<Utc>,
    },

    // Stock events
    StockAdjusted {
        stock_item_id: Uuid,
        branch_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
    },
    StockTransferred {
        stock_item_id: Uuid,
        from_branch_id: Uuid,
        to_branch_id: Uuid,
        quantity: i32,
    },

    // Payment events
    PaymentRecorded {
        order_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    RefundExpenseCreated {
        order_id: Uuid,
        amount: Decimal,
        note: String,
    },

    // Numbering events
    MntRecordCreated {
        order_id: Uuid,
        mnt_number: String,
    },
    RefractionCreated {
        refraction_id: Uuid,
        refraction_number: String,
    },

    /// Generic event data for consumers that need a free-form payload.
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Wraps a plain message as a generic event.
    pub fn with_message(message: impl Into<String>) -> Self {
        Event::Generic {
            message: message.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Builds a connected sender/receiver pair with a default buffer.
pub fn channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(100);
    (EventSender::new(tx), rx)
}

/// Drains events until all senders are dropped. Spawn this once at startup;
/// tests spawn it so service sends never block.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!("Received event: {:?}", event);
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_roundtrip() {
        let (sender, mut rx) = channel();
        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();
        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn field_change_stringifies_values() {
        let change = FieldChange::new("discount", Some(10), Some(25));
        assert_eq!(change.before.as_deref(), Some("10"));
        assert_eq!(change.after.as_deref(), Some("25"));
    }
}
