//! # Purchases & Receipts
//!
//! A [`Purchase`] is a basket on its way to becoming a [`Receipt`].
//!
//! ## Status Flow
//! ```text
//! ┌─────────────┐   complete(price, ...)  ┌─────────────┐
//! │   Pending   │ ──────────────────────► │  Completed  │ ──► Receipt
//! └──────┬──────┘                         └─────────────┘
//!        │ cancel()
//!        ▼
//! ┌─────────────┐
//! │  Cancelled  │   no receipt, no stock
//! └─────────────┘
//! ```
//!
//! Only `Pending` purchases accept item changes. Completion happens once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{ItemId, ItemQuantities, PurchaseId, ShippingAddress, ShopId, UserId};
use crate::validation::{validate_items, validate_price_cents, validate_quantity};

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }
}

// =============================================================================
// Purchase
// =============================================================================

/// A direct (non-auction) purchase from one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    id: PurchaseId,
    user: UserId,
    shop: ShopId,
    items: ItemQuantities,
    status: PurchaseStatus,
    shipping: Option<ShippingAddress>,
    final_price: Option<Money>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Purchase {
    /// Opens a pending purchase.
    ///
    /// ## Errors
    /// Validation errors for an empty or malformed item list.
    pub fn new(
        user: UserId,
        shop: ShopId,
        items: ItemQuantities,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        validate_items(&items)?;
        Ok(Purchase {
            id: PurchaseId::generate(),
            user,
            shop,
            items,
            status: PurchaseStatus::Pending,
            shipping: None,
            final_price: None,
            created_at,
            completed_at: None,
        })
    }

    pub fn id(&self) -> PurchaseId {
        self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn shop(&self) -> ShopId {
        self.shop
    }

    pub fn items(&self) -> &ItemQuantities {
        &self.items
    }

    pub fn status(&self) -> PurchaseStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn shipping(&self) -> Option<&ShippingAddress> {
        self.shipping.as_ref()
    }

    /// Price charged, set once the purchase completes.
    pub fn final_price(&self) -> Option<Money> {
        self.final_price
    }

    fn ensure_pending(&self) -> CoreResult<()> {
        if self.status != PurchaseStatus::Pending {
            return Err(CoreError::InvalidPurchaseStatus {
                purchase_id: self.id,
                current_status: self.status.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Adds `quantity` of `item`, merging with an existing line.
    pub fn add_item(&mut self, item: ItemId, quantity: u32) -> CoreResult<()> {
        self.ensure_pending()?;
        let merged = self.items.get(&item).copied().unwrap_or(0) as i64 + quantity as i64;
        validate_quantity(quantity as i64)?;
        validate_quantity(merged)?;
        self.items.insert(item, merged as u32);
        Ok(())
    }

    /// Removes up to `quantity` of `item`, dropping the line once it reaches
    /// zero. Removing an absent item is a no-op.
    pub fn remove_item(&mut self, item: ItemId, quantity: u32) -> CoreResult<()> {
        self.ensure_pending()?;
        let Some(current) = self.items.get(&item).copied() else {
            return Ok(());
        };

        if current > quantity {
            self.items.insert(item, current - quantity);
        } else {
            self.items.remove(&item);
        }
        Ok(())
    }

    /// Marks the purchase completed and issues its receipt.
    pub fn complete(
        &mut self,
        final_price: Money,
        shipping: ShippingAddress,
        at: DateTime<Utc>,
    ) -> CoreResult<Receipt> {
        self.ensure_pending()?;
        validate_price_cents(final_price.cents())?;

        self.status = PurchaseStatus::Completed;
        self.completed_at = Some(at);
        self.shipping = Some(shipping.clone());
        self.final_price = Some(final_price);

        Ok(Receipt {
            purchase_id: self.id,
            user: self.user,
            shop: self.shop,
            items: self.items.clone(),
            final_price,
            shipping,
            completed_at: at,
        })
    }

    pub fn cancel(&mut self) -> CoreResult<()> {
        self.ensure_pending()?;
        self.status = PurchaseStatus::Cancelled;
        Ok(())
    }
}

// =============================================================================
// Receipts
// =============================================================================

/// Immutable record of a completed direct purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub purchase_id: PurchaseId,
    pub user: UserId,
    pub shop: ShopId,
    pub items: ItemQuantities,
    pub final_price: Money,
    pub shipping: ShippingAddress,
    pub completed_at: DateTime<Utc>,
}

/// How an auction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidOutcome {
    /// The highest bidder wins at their bid.
    Sold,
    /// Nobody bid. The lot stays with the shop at its initial price.
    NoBids,
}

/// Immutable record of a finalized auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidReceipt {
    pub auction_id: PurchaseId,
    pub initiator: UserId,
    pub shop: ShopId,
    pub items: ItemQuantities,
    pub initial_price: Money,
    pub final_price: Money,
    pub winner: Option<UserId>,
    pub outcome: BidOutcome,
    pub auction_end: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}

impl BidReceipt {
    pub fn is_sold(&self) -> bool {
        self.outcome == BidOutcome::Sold
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
