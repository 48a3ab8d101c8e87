//! # Checkout Service
//!
//! Turns a cart into completed purchases, one per shop basket.
//!
//! ## Two-Phase Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PHASE 1 (per shop, in shop-id order)                                   │
//! │    snapshot base prices + categories (Catalog)                          │
//! │    snapshot discount set (DiscountRegistry)                             │
//! │    quote ──► Purchase::new ──► reserve stock ──► charge                 │
//! │                                                                         │
//! │    any failure ─┐                                                       │
//! │                 ▼                                                       │
//! │    ROLLBACK: refund every charge (newest first), release every          │
//! │              reservation, return the error unchanged                    │
//! │                                                                         │
//! │  PHASE 2 (all shops staged)                                             │
//! │    complete + save every purchase                                       │
//! │    then save every receipt            failure → ROLLBACK, receipts      │
//! │                                       already written are deleted,      │
//! │                                       purchases re-saved as cancelled   │
//! │    commit every reservation                                             │
//! │    publish PurchaseCompleted                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use bazaar_core::pricing::{PriceQuote, PricingEngine};
use bazaar_core::purchase::{Purchase, Receipt};
use bazaar_core::{Cart, ItemQuantities, Money, ShippingAddress, ShopId, UserId, ValidationError};
use chrono::{DateTime, Utc};

use crate::catalog::{snapshot_basket, Catalog};
use crate::clock::Clock;
use crate::discounts::DiscountRegistry;
use crate::error::EngineResult;
use crate::events::{EventBus, MarketEvent};
use crate::payment::{PaymentGateway, PaymentId};
use crate::stock::{Reservation, StockLedger};
use crate::store::PurchaseStore;

// =============================================================================
// Quotes
// =============================================================================

/// Priced basket of one shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopQuote {
    pub shop: ShopId,
    pub quote: PriceQuote,
}

/// Priced cart across every shop in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartQuote {
    pub shops: Vec<ShopQuote>,
    pub total: Money,
}

/// Records written in phase 2, undone on rollback.
#[derive(Default)]
struct Written {
    purchases: Vec<Purchase>,
    receipts: Vec<Receipt>,
}

/// A shop basket that passed phase 1.
struct Staged {
    purchase: Purchase,
    price: Money,
    payment: PaymentId,
    reservation: Reservation,
}

// =============================================================================
// Service
// =============================================================================

pub struct CheckoutService {
    catalog: Arc<dyn Catalog>,
    discounts: Arc<DiscountRegistry>,
    stock: Arc<StockLedger>,
    payments: Arc<dyn PaymentGateway>,
    store: Arc<dyn PurchaseStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        discounts: Arc<DiscountRegistry>,
        stock: Arc<StockLedger>,
        payments: Arc<dyn PaymentGateway>,
        store: Arc<dyn PurchaseStore>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        CheckoutService {
            catalog,
            discounts,
            stock,
            payments,
            store,
            clock,
            events,
        }
    }

    /// Prices one shop basket against the shop's current discounts.
    pub fn quote_shop(&self, shop: ShopId, basket: &ItemQuantities) -> EngineResult<PriceQuote> {
        let (base, categories) = snapshot_basket(self.catalog.as_ref(), shop, basket)?;
        let discounts = self.discounts.snapshot(shop)?;
        let quote = PricingEngine::new(&discounts).quote(basket, &base, &categories)?;
        debug!(
            shop = %shop,
            base = quote.base_total.cents(),
            discounted = quote.discounted_total.cents(),
            "Basket priced"
        );
        Ok(quote)
    }

    /// Prices a whole cart without reserving anything.
    pub fn quote(&self, cart: &Cart) -> EngineResult<CartQuote> {
        let mut shops = Vec::new();
        let mut total = Money::zero();
        for (shop, basket) in cart.baskets() {
            let quote = self.quote_shop(shop, basket)?;
            total += quote.discounted_total;
            shops.push(ShopQuote { shop, quote });
        }
        Ok(CartQuote { shops, total })
    }

    /// Buys everything in the cart, or nothing.
    ///
    /// ## Errors
    /// The first failure, unchanged: validation (empty cart), `ItemNotFound`,
    /// `InsufficientStock`, `ConcurrencyConflict`, payment or storage errors.
    pub fn checkout(
        &self,
        user: UserId,
        cart: &Cart,
        shipping: ShippingAddress,
    ) -> EngineResult<Vec<Receipt>> {
        if cart.is_empty() {
            return Err(ValidationError::Required {
                field: "cart".to_string(),
            }
            .into());
        }

        let now = self.clock.now();
        let mut staged = Vec::new();
        if let Err(err) = self.stage_all(user, cart, now, &mut staged) {
            warn!(user = %user, %err, "Checkout failed while staging");
            self.roll_back(staged, &Written::default());
            return Err(err);
        }

        let mut written = Written::default();
        let receipts = match self.persist(&staged, &shipping, now, &mut written) {
            Ok(receipts) => receipts,
            Err(err) => {
                error!(user = %user, %err, "Checkout failed while persisting");
                self.roll_back(staged, &written);
                return Err(err);
            }
        };

        for s in staged {
            s.reservation.commit();
        }

        let total: Money = receipts.iter().map(|r| r.final_price).sum();
        info!(user = %user, shops = receipts.len(), total = total.cents(), "Checkout completed");

        for receipt in &receipts {
            self.events.publish(MarketEvent::PurchaseCompleted {
                receipt: receipt.clone(),
            });
        }
        Ok(receipts)
    }

    fn stage_all(
        &self,
        user: UserId,
        cart: &Cart,
        now: DateTime<Utc>,
        staged: &mut Vec<Staged>,
    ) -> EngineResult<()> {
        for (shop, basket) in cart.baskets() {
            let quote = self.quote_shop(shop, basket)?;
            let purchase = Purchase::new(user, shop, basket.clone(), now)?;
            let reservation = self.stock.reserve(shop, basket)?;
            // A failed charge drops the reservation, returning this shop's stock
            let payment = self.payments.charge(user, shop, quote.discounted_total)?;

            debug!(shop = %shop, payment = %payment, "Shop basket staged");
            staged.push(Staged {
                purchase,
                price: quote.discounted_total,
                payment,
                reservation,
            });
        }
        Ok(())
    }

    fn persist(
        &self,
        staged: &[Staged],
        shipping: &ShippingAddress,
        now: DateTime<Utc>,
        written: &mut Written,
    ) -> EngineResult<Vec<Receipt>> {
        let mut receipts = Vec::with_capacity(staged.len());
        for s in staged {
            let mut purchase = s.purchase.clone();
            let receipt = purchase.complete(s.price, shipping.clone(), now)?;
            self.store.save_purchase(&purchase)?;
            written.purchases.push(s.purchase.clone());
            receipts.push(receipt);
        }
        // Receipts only once every purchase record is in place
        for receipt in &receipts {
            self.store.save_receipt(receipt)?;
            written.receipts.push(receipt.clone());
        }
        Ok(receipts)
    }

    /// Undoes phase 1 and any records already written. Failures here are
    /// logged; the original error is what the caller sees.
    fn roll_back(&self, staged: Vec<Staged>, written: &Written) {
        for receipt in &written.receipts {
            if let Err(err) = self.store.delete_receipt(receipt.user, receipt.purchase_id) {
                error!(purchase_id = %receipt.purchase_id, %err, "Failed to delete receipt of rolled back purchase");
            }
        }

        for pending in &written.purchases {
            let mut cancelled = pending.clone();
            if cancelled.cancel().is_ok() {
                if let Err(err) = self.store.save_purchase(&cancelled) {
                    error!(purchase_id = %cancelled.id(), %err, "Failed to mark purchase cancelled");
                }
            }
        }

        for s in staged.into_iter().rev() {
            if let Err(err) = self.payments.refund(s.payment) {
                error!(payment = %s.payment, %err, "Refund failed during checkout rollback");
            }
            s.reservation.release();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::clock::SystemClock;
    use crate::error::EngineError;
    use crate::payment::AcceptAllPayments;
    use crate::store::InMemoryStore;
    use bazaar_core::discount::{Discount, DiscountTarget, Stacking};
    use bazaar_core::policy::PolicyNode;
    use bazaar_core::{CoreError, ItemCategory, ItemId};

    const BUYER: UserId = UserId::new(42);
    const SHOP: ShopId = ShopId::new(1);
    const KETTLE: ItemId = ItemId::new(100);

    struct Fixture {
        service: CheckoutService,
        discounts: Arc<DiscountRegistry>,
        stock: Arc<StockLedger>,
        payments: Arc<AcceptAllPayments>,
        store: Arc<InMemoryStore>,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog
            .add_item(SHOP, KETTLE, ItemCategory::Electronics, Money::from_cents(10_000))
            .unwrap();

        let store = Arc::new(InMemoryStore::new());
        let events = EventBus::new(16);
        let discounts = Arc::new(DiscountRegistry::new(store.clone(), events.clone(), 16));
        let stock = Arc::new(StockLedger::new(16));
        stock.restock(SHOP, KETTLE, 3).unwrap();
        let payments = Arc::new(AcceptAllPayments::new());

        let service = CheckoutService::new(
            catalog,
            discounts.clone(),
            stock.clone(),
            payments.clone(),
            store.clone(),
            Arc::new(SystemClock),
            events,
        );
        Fixture {
            service,
            discounts,
            stock,
            payments,
            store,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            country: "IL".into(),
            city: "Haifa".into(),
            street: "Herzl 5".into(),
            zip_code: "3303".into(),
        }
    }

    #[test]
    fn test_quote_applies_discounts() {
        let f = fixture();
        f.discounts
            .add(
                SHOP,
                Discount::new(
                    DiscountTarget::Item(KETTLE),
                    10,
                    Stacking::Additive,
                    PolicyNode::unconditional(),
                )
                .unwrap(),
            )
            .unwrap();
        f.discounts
            .add(
                SHOP,
                Discount::new(
                    DiscountTarget::Global,
                    20,
                    Stacking::Multiplicative,
                    PolicyNode::unconditional(),
                )
                .unwrap(),
            )
            .unwrap();

        let cart = Cart::new().with(SHOP, KETTLE, 2).unwrap();
        let quote = f.service.quote(&cart).unwrap();
        assert_eq!(quote.total, Money::from_cents(14_400));
        assert_eq!(quote.shops[0].quote.savings, Money::from_cents(5_600));
        // Quoting reserves nothing
        assert_eq!(f.stock.available(SHOP, KETTLE), 3);
    }

    #[test]
    fn test_checkout_commits_everything() {
        let f = fixture();
        let cart = Cart::new().with(SHOP, KETTLE, 2).unwrap();

        let receipts = f.service.checkout(BUYER, &cart, address()).unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].final_price, Money::from_cents(20_000));
        assert_eq!(f.stock.available(SHOP, KETTLE), 1);
        assert_eq!(f.payments.net_charged(), Money::from_cents(20_000));
        assert_eq!(f.store.receipts_for_user(BUYER).unwrap(), receipts);
    }

    #[test]
    fn test_empty_cart_rejected() {
        let f = fixture();
        let err = f
            .service
            .checkout(BUYER, &Cart::new(), address())
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
    }

    #[test]
    fn test_insufficient_stock_charges_nothing() {
        let f = fixture();
        let cart = Cart::new().with(SHOP, KETTLE, 4).unwrap();

        let err = f.service.checkout(BUYER, &cart, address()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));
        assert_eq!(f.stock.available(SHOP, KETTLE), 3);
        assert_eq!(f.payments.net_charged(), Money::zero());
    }

    #[test]
    fn test_unknown_item_is_not_found() {
        let f = fixture();
        let cart = Cart::new().with(SHOP, ItemId::new(999), 1).unwrap();
        assert!(matches!(
            f.service.quote(&cart),
            Err(EngineError::Core(CoreError::ItemNotFound(_)))
        ));
    }
}
