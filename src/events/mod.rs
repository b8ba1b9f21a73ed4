use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::entities::OrderStatus;

/// Events emitted by the engine after a successful commit.
///
/// Delivery is best-effort and in-process; nothing in the engine depends on
/// an event being observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartCreated(Uuid),
    CartUpdated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    PromoCodeApplied { cart_id: Uuid, promo_code_id: Uuid },
    PromoCodeRemoved { cart_id: Uuid },
    PromoCodeRedeemed { promo_code_id: Uuid, order_id: Uuid },
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    WalletCredited { wallet_id: Uuid, amount: Decimal },
    WalletDebited { wallet_id: Uuid, amount: Decimal },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, failing if the receiver has gone away.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("dropping event: {}", e);
        }
    }
}

/// Creates an event channel with the given buffer capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}
