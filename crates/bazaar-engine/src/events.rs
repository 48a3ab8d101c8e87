//! # Market Events
//!
//! Notifications emitted after a state transition has already happened.
//!
//! ```text
//! ┌──────────────┐  publish   ┌──────────────────────┐  recv   ┌────────────┐
//! │ AuctionBook  │ ─────────► │ broadcast::Sender    │ ──────► │ notifier   │
//! │ Checkout     │            │ (bounded ring)       │ ──────► │ audit log  │
//! │ Registry     │            └──────────────────────┘         └────────────┘
//! └──────────────┘
//!
//! No subscribers → dropped, logged at debug
//! Slow subscriber → it sees RecvError::Lagged, the publisher never blocks
//! ```
//!
//! Delivery failure never rolls a transition back: `publish` returns nothing.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use bazaar_core::purchase::{BidReceipt, Receipt};
use bazaar_core::{Money, PurchaseId, ShopId, UserId};

/// Something observers may want to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    BidAccepted {
        auction_id: PurchaseId,
        bidder: UserId,
        amount: Money,
        outbid: Option<UserId>,
    },
    BidRejected {
        auction_id: PurchaseId,
        bidder: UserId,
        amount: Money,
        reason: String,
    },
    AuctionResolved {
        receipt: BidReceipt,
    },
    PurchaseCompleted {
        receipt: Receipt,
    },
    DiscountsChanged {
        shop: ShopId,
        discount_count: usize,
    },
}

impl MarketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MarketEvent::BidAccepted { .. } => "bid_accepted",
            MarketEvent::BidRejected { .. } => "bid_rejected",
            MarketEvent::AuctionResolved { .. } => "auction_resolved",
            MarketEvent::PurchaseCompleted { .. } => "purchase_completed",
            MarketEvent::DiscountsChanged { .. } => "discounts_changed",
        }
    }
}

/// Cloneable publisher handle over a broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MarketEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: MarketEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event = name, receivers, "Event published"),
            Err(_) => debug!(event = name, "Event dropped, no subscribers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(count: usize) -> MarketEvent {
        MarketEvent::DiscountsChanged {
            shop: ShopId::new(1),
            discount_count: count,
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(changed(1));
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(changed(1));
        bus.publish(changed(2));

        assert_eq!(rx.recv().await.unwrap(), changed(1));
        assert_eq!(rx.recv().await.unwrap(), changed(2));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_publisher() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(changed(i));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_string(&changed(3)).unwrap();
        assert!(json.contains("\"type\":\"discounts_changed\""));
    }
}
