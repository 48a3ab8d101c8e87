//! # Discount Registry
//!
//! Holds every shop's [`DiscountSet`] for concurrent readers.
//!
//! ## Snapshot & Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  shops: DashMap<ShopId, Arc<RwLock<Arc<DiscountSet>>>>                  │
//! │                                                                         │
//! │  READ (checkout, quote)                                                 │
//! │    read lock ─► clone inner Arc ─► unlock ─► price without any lock     │
//! │                                                                         │
//! │  WRITE (add / remove / set_for_target)                                  │
//! │    write lock (one shop)                                                │
//! │      next = f(current)            new immutable set                     │
//! │      store.save_discounts(next)   fails → nothing visible changed      │
//! │      *slot = Arc::new(next)       swap                                  │
//! │    unlock ─► publish DiscountsChanged                                   │
//! │                                                                         │
//! │  DROP (drop_shop): same write lock, delete in store, swap to empty      │
//! │                                                                         │
//! │  Readers holding the old Arc finish on the old set; nothing is ever    │
//! │  mutated in place.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use bazaar_core::discount::{Discount, DiscountSet};
use bazaar_core::{CoreResult, DiscountId, ShopId, ValidationError};

use crate::error::EngineResult;
use crate::events::{EventBus, MarketEvent};
use crate::store::DiscountStore;

type Slot = Arc<RwLock<Arc<DiscountSet>>>;

pub struct DiscountRegistry {
    shops: DashMap<ShopId, Slot>,
    store: Arc<dyn DiscountStore>,
    events: EventBus,
    max_per_shop: usize,
}

impl DiscountRegistry {
    pub fn new(store: Arc<dyn DiscountStore>, events: EventBus, max_per_shop: usize) -> Self {
        DiscountRegistry {
            shops: DashMap::new(),
            store,
            events,
            max_per_shop,
        }
    }

    /// Current set of a shop. Never blocks on a writer for longer than the
    /// pointer copy.
    pub fn snapshot(&self, shop: ShopId) -> EngineResult<Arc<DiscountSet>> {
        let slot = self.slot(shop)?;
        let current = Arc::clone(&slot.read());
        Ok(current)
    }

    /// Appends a discount and returns its id.
    pub fn add(&self, shop: ShopId, discount: Discount) -> EngineResult<DiscountId> {
        let id = discount.id();
        self.update(shop, |set| Ok(set.with_added(discount)))?;
        info!(shop = %shop, discount_id = %id, "Discount added");
        Ok(id)
    }

    /// Removes a discount.
    ///
    /// ## Errors
    /// `DiscountNotFound` when the shop has no such discount.
    pub fn remove(&self, shop: ShopId, id: DiscountId) -> EngineResult<()> {
        self.update(shop, |set| set.without(id))?;
        info!(shop = %shop, discount_id = %id, "Discount removed");
        Ok(())
    }

    /// Installs `discount` in place of any discount with the same target.
    pub fn set_for_target(&self, shop: ShopId, discount: Discount) -> EngineResult<DiscountId> {
        let id = discount.id();
        let target = discount.target();
        self.update(shop, |set| Ok(set.replace_target(discount)))?;
        info!(shop = %shop, discount_id = %id, ?target, "Discount replaced for target");
        Ok(id)
    }

    /// Forgets a shop's discounts, in storage and in memory.
    ///
    /// Runs under the shop's write lock, so a writer that already holds the
    /// shop's slot either lands before the delete or applies to the emptied
    /// set afterwards. The dropped discounts never come back.
    pub fn drop_shop(&self, shop: ShopId) -> EngineResult<()> {
        let slot = self.slot(shop)?;
        {
            let mut current = slot.write();
            self.store.delete_discounts(shop)?;
            *current = Arc::new(DiscountSet::new());
        }

        self.events.publish(MarketEvent::DiscountsChanged {
            shop,
            discount_count: 0,
        });
        info!(shop = %shop, "Shop discounts dropped");
        Ok(())
    }

    fn update<F>(&self, shop: ShopId, f: F) -> EngineResult<()>
    where
        F: FnOnce(&DiscountSet) -> CoreResult<DiscountSet>,
    {
        let slot = self.slot(shop)?;
        let count = {
            let mut current = slot.write();
            let next = f(&current)?;

            if next.len() > self.max_per_shop {
                return Err(ValidationError::OutOfRange {
                    field: "discounts per shop".to_string(),
                    min: 0,
                    max: self.max_per_shop as i64,
                }
                .into());
            }

            self.store.save_discounts(shop, &next)?;
            let count = next.len();
            *current = Arc::new(next);
            count
        };

        self.events.publish(MarketEvent::DiscountsChanged {
            shop,
            discount_count: count,
        });
        Ok(())
    }

    /// The shop's slot, loading it from storage on first use.
    fn slot(&self, shop: ShopId) -> EngineResult<Slot> {
        if let Some(slot) = self.shops.get(&shop) {
            return Ok(Arc::clone(slot.value()));
        }

        let loaded = self.store.load_discounts(shop)?.unwrap_or_default();
        debug!(shop = %shop, count = loaded.len(), "Loaded discount set");

        let slot = self
            .shops
            .entry(shop)
            .or_insert_with(|| Arc::new(RwLock::new(Arc::new(loaded))));
        Ok(Arc::clone(slot.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreError, StoreResult};
    use bazaar_core::discount::{DiscountTarget, Stacking};
    use bazaar_core::policy::PolicyNode;
    use bazaar_core::{CoreError, ItemId};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use crate::error::EngineError;

    const SHOP: ShopId = ShopId::new(1);

    /// Delegates to an in-memory store until told to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        failing: AtomicBool,
    }

    impl DiscountStore for FlakyStore {
        fn load_discounts(&self, shop: ShopId) -> StoreResult<Option<DiscountSet>> {
            self.inner.load_discounts(shop)
        }

        fn save_discounts(&self, shop: ShopId, set: &DiscountSet) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.save_discounts(shop, set)
        }

        fn delete_discounts(&self, shop: ShopId) -> StoreResult<()> {
            self.inner.delete_discounts(shop)
        }
    }

    /// Parks inside the first save until released.
    struct ParkingStore {
        inner: InMemoryStore,
        entered: Barrier,
        release: Barrier,
    }

    impl DiscountStore for ParkingStore {
        fn load_discounts(&self, shop: ShopId) -> StoreResult<Option<DiscountSet>> {
            self.inner.load_discounts(shop)
        }

        fn save_discounts(&self, shop: ShopId, set: &DiscountSet) -> StoreResult<()> {
            self.entered.wait();
            self.release.wait();
            self.inner.save_discounts(shop, set)
        }

        fn delete_discounts(&self, shop: ShopId) -> StoreResult<()> {
            self.inner.delete_discounts(shop)
        }
    }

    fn discount(target: DiscountTarget, p: i64) -> Discount {
        Discount::new(target, p, Stacking::Additive, PolicyNode::unconditional()).unwrap()
    }

    fn registry(store: Arc<dyn DiscountStore>, max: usize) -> DiscountRegistry {
        DiscountRegistry::new(store, EventBus::new(16), max)
    }

    #[test]
    fn test_add_remove_and_snapshot_isolation() {
        let registry = registry(Arc::new(InMemoryStore::new()), 8);
        let before = registry.snapshot(SHOP).unwrap();
        assert!(before.is_empty());

        let id = registry.add(SHOP, discount(DiscountTarget::Global, 10)).unwrap();
        // The old snapshot is untouched
        assert!(before.is_empty());
        assert_eq!(registry.snapshot(SHOP).unwrap().len(), 1);

        registry.remove(SHOP, id).unwrap();
        assert!(registry.snapshot(SHOP).unwrap().is_empty());

        assert!(matches!(
            registry.remove(SHOP, id),
            Err(EngineError::Core(CoreError::DiscountNotFound(_)))
        ));
    }

    #[test]
    fn test_set_for_target_replaces() {
        let registry = registry(Arc::new(InMemoryStore::new()), 8);
        let item = DiscountTarget::Item(ItemId::new(4));
        registry.set_for_target(SHOP, discount(item, 10)).unwrap();
        registry.set_for_target(SHOP, discount(item, 30)).unwrap();

        let set = registry.snapshot(SHOP).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().percentage().value(), 30);
    }

    #[test]
    fn test_limit_per_shop() {
        let registry = registry(Arc::new(InMemoryStore::new()), 1);
        registry.add(SHOP, discount(DiscountTarget::Global, 10)).unwrap();
        let err = registry.add(SHOP, discount(DiscountTarget::Global, 20)).unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
        assert_eq!(registry.snapshot(SHOP).unwrap().len(), 1);
    }

    #[test]
    fn test_store_failure_leaves_visible_set_unchanged() {
        let store = Arc::new(FlakyStore::default());
        let registry = registry(store.clone(), 8);
        registry.add(SHOP, discount(DiscountTarget::Global, 10)).unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let err = registry.add(SHOP, discount(DiscountTarget::Global, 20)).unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));
        assert_eq!(registry.snapshot(SHOP).unwrap().len(), 1);
    }

    #[test]
    fn test_loads_persisted_set_and_drops_shop() {
        let store = Arc::new(InMemoryStore::new());
        let persisted = DiscountSet::new().with_added(discount(DiscountTarget::Global, 5));
        store.save_discounts(SHOP, &persisted).unwrap();

        let registry = registry(store.clone(), 8);
        assert_eq!(*registry.snapshot(SHOP).unwrap(), persisted);

        registry.drop_shop(SHOP).unwrap();
        assert!(store.load_discounts(SHOP).unwrap().is_none());
        assert!(registry.snapshot(SHOP).unwrap().is_empty());
    }

    #[test]
    fn test_drop_shop_waits_for_inflight_writer() {
        let store = Arc::new(ParkingStore {
            inner: InMemoryStore::new(),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        let registry = Arc::new(registry(store.clone(), 8));

        let writer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.add(SHOP, discount(DiscountTarget::Global, 10)))
        };
        store.entered.wait();

        let dropper = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.drop_shop(SHOP))
        };
        // Give the dropper time to reach the store if it could
        thread::sleep(Duration::from_millis(20));
        store.release.wait();

        writer.join().unwrap().unwrap();
        dropper.join().unwrap().unwrap();

        assert!(store.load_discounts(SHOP).unwrap().is_none());
        assert!(registry.snapshot(SHOP).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_changes_are_published() {
        let events = EventBus::new(4);
        let mut rx = events.subscribe();
        let registry = DiscountRegistry::new(Arc::new(InMemoryStore::new()), events, 8);

        registry.add(SHOP, discount(DiscountTarget::Global, 10)).unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            MarketEvent::DiscountsChanged {
                shop: SHOP,
                discount_count: 1
            }
        );
    }
}
