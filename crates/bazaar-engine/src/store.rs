//! # Persistence Ports
//!
//! The engine never talks to a database directly. It saves and loads its
//! aggregates through two small traits, and ships an in-memory
//! implementation used by tests and the `simulate` binary.
//!
//! ## Aggregates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        What Gets Persisted                              │
//! │                                                                         │
//! │  DiscountStore                     PurchaseStore                        │
//! │  ─────────────                     ─────────────                        │
//! │  ShopId → DiscountSet              PurchaseId → Purchase                │
//! │    saved before a new set            saved at checkout                  │
//! │    becomes visible                 PurchaseId → Auction                 │
//! │                                      saved at open, bid and finalize    │
//! │                                    UserId → [Receipt]                   │
//! │                                      deleted again on rollback          │
//! │                                    PurchaseId → BidReceipt              │
//! │                                                                         │
//! │  Contract: read-after-write is sequentially consistent per aggregate.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use bazaar_core::auction::Auction;
use bazaar_core::discount::DiscountSet;
use bazaar_core::purchase::{BidReceipt, Purchase, Receipt};
use bazaar_core::{PurchaseId, ShopId, UserId};

// =============================================================================
// Errors
// =============================================================================

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached. Usually transient.
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    /// A write lost against a concurrent writer.
    #[error("Write conflict on {0}")]
    Conflict(String),

    /// The aggregate could not be encoded or decoded.
    #[error("Failed to encode {entity}: {reason}")]
    Serialization { entity: String, reason: String },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Conflict(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            entity: "json".to_string(),
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Persistence of each shop's discount set.
pub trait DiscountStore: Send + Sync {
    fn load_discounts(&self, shop: ShopId) -> StoreResult<Option<DiscountSet>>;
    fn save_discounts(&self, shop: ShopId, set: &DiscountSet) -> StoreResult<()>;
    fn delete_discounts(&self, shop: ShopId) -> StoreResult<()>;
}

/// Persistence of purchases, auctions and their receipts.
pub trait PurchaseStore: Send + Sync {
    fn save_purchase(&self, purchase: &Purchase) -> StoreResult<()>;
    fn load_purchase(&self, id: PurchaseId) -> StoreResult<Option<Purchase>>;

    fn save_auction(&self, auction: &Auction) -> StoreResult<()>;
    fn load_auction(&self, id: PurchaseId) -> StoreResult<Option<Auction>>;

    fn save_receipt(&self, receipt: &Receipt) -> StoreResult<()>;
    /// Compensating write for a receipt whose checkout was rolled back.
    /// Deleting an absent receipt succeeds.
    fn delete_receipt(&self, user: UserId, purchase_id: PurchaseId) -> StoreResult<()>;
    fn receipts_for_user(&self, user: UserId) -> StoreResult<Vec<Receipt>>;

    fn save_bid_receipt(&self, receipt: &BidReceipt) -> StoreResult<()>;
    fn load_bid_receipt(&self, auction_id: PurchaseId) -> StoreResult<Option<BidReceipt>>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// DashMap-backed store. Every write is immediately visible to every reader.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    discounts: DashMap<ShopId, DiscountSet>,
    purchases: DashMap<PurchaseId, Purchase>,
    auctions: DashMap<PurchaseId, Auction>,
    receipts: DashMap<UserId, Vec<Receipt>>,
    bid_receipts: DashMap<PurchaseId, BidReceipt>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored auctions (open or finalized).
    pub fn auction_count(&self) -> usize {
        self.auctions.len()
    }
}

impl DiscountStore for InMemoryStore {
    fn load_discounts(&self, shop: ShopId) -> StoreResult<Option<DiscountSet>> {
        Ok(self.discounts.get(&shop).map(|set| set.value().clone()))
    }

    fn save_discounts(&self, shop: ShopId, set: &DiscountSet) -> StoreResult<()> {
        debug!(shop = %shop, count = set.len(), "Saving discount set");
        self.discounts.insert(shop, set.clone());
        Ok(())
    }

    fn delete_discounts(&self, shop: ShopId) -> StoreResult<()> {
        self.discounts.remove(&shop);
        Ok(())
    }
}

impl PurchaseStore for InMemoryStore {
    fn save_purchase(&self, purchase: &Purchase) -> StoreResult<()> {
        self.purchases.insert(purchase.id(), purchase.clone());
        Ok(())
    }

    fn load_purchase(&self, id: PurchaseId) -> StoreResult<Option<Purchase>> {
        Ok(self.purchases.get(&id).map(|p| p.value().clone()))
    }

    fn save_auction(&self, auction: &Auction) -> StoreResult<()> {
        self.auctions.insert(auction.id(), auction.clone());
        Ok(())
    }

    fn load_auction(&self, id: PurchaseId) -> StoreResult<Option<Auction>> {
        Ok(self.auctions.get(&id).map(|a| a.value().clone()))
    }

    fn save_receipt(&self, receipt: &Receipt) -> StoreResult<()> {
        self.receipts
            .entry(receipt.user)
            .or_default()
            .push(receipt.clone());
        Ok(())
    }

    fn delete_receipt(&self, user: UserId, purchase_id: PurchaseId) -> StoreResult<()> {
        if let Some(mut receipts) = self.receipts.get_mut(&user) {
            receipts.retain(|r| r.purchase_id != purchase_id);
        }
        Ok(())
    }

    fn receipts_for_user(&self, user: UserId) -> StoreResult<Vec<Receipt>> {
        Ok(self
            .receipts
            .get(&user)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    fn save_bid_receipt(&self, receipt: &BidReceipt) -> StoreResult<()> {
        self.bid_receipts.insert(receipt.auction_id, receipt.clone());
        Ok(())
    }

    fn load_bid_receipt(&self, auction_id: PurchaseId) -> StoreResult<Option<BidReceipt>> {
        Ok(self.bid_receipts.get(&auction_id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::discount::{Discount, DiscountTarget, Stacking};
    use bazaar_core::policy::PolicyNode;
    use bazaar_core::{ItemId, ItemQuantities, Money, ShippingAddress};
    use chrono::Utc;

    #[test]
    fn test_discount_round_trip() {
        let store = InMemoryStore::new();
        let shop = ShopId::new(1);
        assert!(store.load_discounts(shop).unwrap().is_none());

        let set = DiscountSet::new().with_added(
            Discount::new(DiscountTarget::Global, 5, Stacking::Additive, PolicyNode::default())
                .unwrap(),
        );
        store.save_discounts(shop, &set).unwrap();
        assert_eq!(store.load_discounts(shop).unwrap(), Some(set));

        store.delete_discounts(shop).unwrap();
        assert!(store.load_discounts(shop).unwrap().is_none());
    }

    #[test]
    fn test_purchase_round_trip() {
        let store = InMemoryStore::new();
        let items: ItemQuantities = [(ItemId::new(3), 1)].into_iter().collect();
        let purchase = Purchase::new(UserId::new(9), ShopId::new(1), items, Utc::now()).unwrap();

        store.save_purchase(&purchase).unwrap();
        assert_eq!(store.load_purchase(purchase.id()).unwrap(), Some(purchase));
        assert!(store.receipts_for_user(UserId::new(9)).unwrap().is_empty());
    }

    #[test]
    fn test_delete_receipt() {
        let store = InMemoryStore::new();
        let buyer = UserId::new(9);
        let items: ItemQuantities = [(ItemId::new(3), 1)].into_iter().collect();
        let address = ShippingAddress {
            country: "IL".into(),
            city: "Acre".into(),
            street: "Port 2".into(),
            zip_code: "24100".into(),
        };

        let mut receipts = Vec::new();
        for _ in 0..2 {
            let mut purchase =
                Purchase::new(buyer, ShopId::new(1), items.clone(), Utc::now()).unwrap();
            let receipt = purchase
                .complete(Money::from_cents(300), address.clone(), Utc::now())
                .unwrap();
            store.save_receipt(&receipt).unwrap();
            receipts.push(receipt);
        }

        store.delete_receipt(buyer, receipts[0].purchase_id).unwrap();
        assert_eq!(store.receipts_for_user(buyer).unwrap(), vec![receipts[1].clone()]);

        // Unknown user or receipt is fine
        store.delete_receipt(UserId::new(77), receipts[0].purchase_id).unwrap();
        store.delete_receipt(buyer, receipts[0].purchase_id).unwrap();
        assert_eq!(store.receipts_for_user(buyer).unwrap().len(), 1);
    }

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Unavailable("x".into()).is_transient());
        assert!(!StoreError::Serialization {
            entity: "auction".into(),
            reason: "bad".into()
        }
        .is_transient());
    }
}
