//! # Catalog Port
//!
//! Where base prices and categories come from. Item storage itself is
//! somebody else's job; the engine only needs two lookups, and it takes both
//! once per shop basket so a single evaluation sees one consistent snapshot.
//!
//! ```text
//! basket (item → qty) ──► snapshot_basket ──► (PriceSnapshot, CategoryMap)
//!                               │
//!                               ├── Catalog::base_price(shop, item)
//!                               └── Catalog::item_category(item)
//! ```

use dashmap::DashMap;

use bazaar_core::validation::validate_price_cents;
use bazaar_core::{
    CategoryMap, CoreError, CoreResult, ItemCategory, ItemId, ItemQuantities, Money, PriceSnapshot,
    ShopId,
};

/// Item lookups consumed by pricing and checkout.
pub trait Catalog: Send + Sync {
    fn item_category(&self, item: ItemId) -> CoreResult<ItemCategory>;
    fn base_price(&self, shop: ShopId, item: ItemId) -> CoreResult<Money>;
}

/// Captures the prices and categories of one basket.
///
/// ## Errors
/// `ItemNotFound` when the shop does not sell a basket item.
pub fn snapshot_basket(
    catalog: &dyn Catalog,
    shop: ShopId,
    basket: &ItemQuantities,
) -> CoreResult<(PriceSnapshot, CategoryMap)> {
    let mut prices = std::collections::BTreeMap::new();
    let mut categories = CategoryMap::new();
    for item in basket.keys() {
        prices.insert(*item, catalog.base_price(shop, *item)?);
        categories.insert(*item, catalog.item_category(*item)?);
    }
    Ok((PriceSnapshot::new(prices)?, categories))
}

// =============================================================================
// In-Memory Catalog
// =============================================================================

/// Catalog held in concurrent maps, for tests and the demo binary.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    categories: DashMap<ItemId, ItemCategory>,
    prices: DashMap<(ShopId, ItemId), Money>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists `item` in `shop` at `price`.
    pub fn add_item(
        &self,
        shop: ShopId,
        item: ItemId,
        category: ItemCategory,
        price: Money,
    ) -> CoreResult<()> {
        validate_price_cents(price.cents())?;
        self.categories.insert(item, category);
        self.prices.insert((shop, item), price);
        Ok(())
    }

    pub fn set_price(&self, shop: ShopId, item: ItemId, price: Money) -> CoreResult<()> {
        validate_price_cents(price.cents())?;
        let mut entry = self
            .prices
            .get_mut(&(shop, item))
            .ok_or(CoreError::ItemNotFound(item))?;
        *entry = price;
        Ok(())
    }

    pub fn remove_item(&self, shop: ShopId, item: ItemId) {
        self.prices.remove(&(shop, item));
    }
}

impl Catalog for InMemoryCatalog {
    fn item_category(&self, item: ItemId) -> CoreResult<ItemCategory> {
        self.categories
            .get(&item)
            .map(|c| *c.value())
            .ok_or(CoreError::ItemNotFound(item))
    }

    fn base_price(&self, shop: ShopId, item: ItemId) -> CoreResult<Money> {
        self.prices
            .get(&(shop, item))
            .map(|p| *p.value())
            .ok_or(CoreError::ItemNotFound(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_basket() {
        let catalog = InMemoryCatalog::new();
        let shop = ShopId::new(1);
        catalog
            .add_item(shop, ItemId::new(1), ItemCategory::Books, Money::from_cents(1200))
            .unwrap();

        let basket: ItemQuantities = [(ItemId::new(1), 2)].into_iter().collect();
        let (prices, categories) = snapshot_basket(&catalog, shop, &basket).unwrap();
        assert_eq!(prices.get(ItemId::new(1)), Some(Money::from_cents(1200)));
        assert_eq!(categories[&ItemId::new(1)], ItemCategory::Books);

        // Same item, other shop
        assert!(matches!(
            snapshot_basket(&catalog, ShopId::new(2), &basket),
            Err(CoreError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_prices_are_validated() {
        let catalog = InMemoryCatalog::new();
        let shop = ShopId::new(1);
        assert!(catalog
            .add_item(shop, ItemId::new(1), ItemCategory::Toys, Money::from_cents(-5))
            .is_err());
        assert!(catalog
            .set_price(shop, ItemId::new(1), Money::from_cents(100))
            .is_err());
    }
}
