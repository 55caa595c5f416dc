use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the order lifecycle. Consumed by a single logging
/// task today; the enum is the seam for future outbound integrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    CheckoutStaged {
        reference: String,
    },
    StagedOrderPromoted {
        reference: String,
        order_id: Uuid,
    },
    StagedOrderAbandoned {
        reference: String,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        payment_status: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. Failures are reported to the caller,
    /// who logs and moves on; event delivery never fails a request.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a connected sender/processor pair with the given channel capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, recording each delivery.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        info!(?event, "event processed");
    }
    info!("event channel closed");
}
