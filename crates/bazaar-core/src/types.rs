//! # Domain Types
//!
//! Core value types shared by the pricing engine and the auction machine.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Identifiers            Values                 Snapshots                │
//! │  ─────────────────      ──────────────────     ───────────────────────  │
//! │  UserId    (u64)        Percentage [0,100]     Cart                     │
//! │  ShopId    (u64)        ItemCategory           shop → item → qty        │
//! │  ItemId    (u64)        ShippingAddress        PriceSnapshot            │
//! │  PurchaseId (UUID)                             item → base unit price   │
//! │  DiscountId (UUID)                             CategoryMap              │
//! │                                                item → category          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordered Maps
//! Every snapshot is a `BTreeMap`, so evaluation walks items in a stable
//! order and two runs over the same input produce identical output.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::{validate_price_cents, validate_quantity, ValidationResult};

// =============================================================================
// Numeric Identifiers
// =============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            pub const fn new(raw: u64) -> Self {
                $name(raw)
            }

            #[inline]
            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                $name(raw)
            }
        }
    };
}

numeric_id!(
    /// An already-authenticated user. The core never validates credentials.
    UserId
);
numeric_id!(
    /// A shop (store) owning a discount set and stock.
    ShopId
);
numeric_id!(
    /// A catalog item.
    ItemId
);

// =============================================================================
// UUID Identifiers
// =============================================================================

/// Identifier of a purchase. Auctions are purchases, so they share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(Uuid);

impl PurchaseId {
    /// Generates a new random (v4) identifier.
    pub fn generate() -> Self {
        PurchaseId(Uuid::new_v4())
    }
}

impl fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one discount inside a shop's discount set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscountId(Uuid);

impl DiscountId {
    pub fn generate() -> Self {
        DiscountId(Uuid::new_v4())
    }
}

impl fmt::Display for DiscountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Item Category
// =============================================================================

/// Catalog category of an item. Closed set, matched exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Electronics,
    Clothing,
    Books,
    Grocery,
    Toys,
    Sports,
    Beauty,
    Automotive,
}

impl ItemCategory {
    pub const ALL: [ItemCategory; 8] = [
        ItemCategory::Electronics,
        ItemCategory::Clothing,
        ItemCategory::Books,
        ItemCategory::Grocery,
        ItemCategory::Toys,
        ItemCategory::Sports,
        ItemCategory::Beauty,
        ItemCategory::Automotive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Electronics => "electronics",
            ItemCategory::Clothing => "clothing",
            ItemCategory::Books => "books",
            ItemCategory::Grocery => "grocery",
            ItemCategory::Toys => "toys",
            ItemCategory::Sports => "sports",
            ItemCategory::Beauty => "beauty",
            ItemCategory::Automotive => "automotive",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "category".to_string(),
                allowed: ItemCategory::ALL.iter().map(|c| c.to_string()).collect(),
            })
    }
}

/// Item → category lookup captured for one evaluation.
pub type CategoryMap = BTreeMap<ItemId, ItemCategory>;

// =============================================================================
// Percentage
// =============================================================================

/// A discount percentage, guaranteed to lie in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Percentage(u8);

impl Percentage {
    /// Validates and wraps a raw percentage.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::types::Percentage;
    ///
    /// assert!(Percentage::new(0).is_ok());
    /// assert!(Percentage::new(100).is_ok());
    /// assert!(Percentage::new(101).is_err());
    /// assert!(Percentage::new(-1).is_err());
    /// ```
    pub fn new(raw: i64) -> ValidationResult<Self> {
        if !(0..=100).contains(&raw) {
            return Err(ValidationError::OutOfRange {
                field: "percentage".to_string(),
                min: 0,
                max: 100,
            });
        }
        Ok(Percentage(raw as u8))
    }

    #[inline]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// The share of the price that remains after the discount, in percent.
    #[inline]
    pub const fn kept(&self) -> u8 {
        100 - self.0
    }
}

impl TryFrom<i64> for Percentage {
    type Error = ValidationError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Percentage::new(raw)
    }
}

impl From<Percentage> for i64 {
    fn from(p: Percentage) -> Self {
        p.0 as i64
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// =============================================================================
// Item Quantities
// =============================================================================

/// Item → quantity lines of one shop basket, purchase or auction lot.
pub type ItemQuantities = BTreeMap<ItemId, u32>;

// =============================================================================
// Cart
// =============================================================================

/// A user's cart: shop → (item → quantity), quantities always > 0.
///
/// ## Ownership
/// Ephemeral and owned by the caller for one request. The pricing engine
/// only ever borrows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    baskets: BTreeMap<ShopId, ItemQuantities>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` of an item, merging with an existing line.
    pub fn add(&mut self, shop: ShopId, item: ItemId, quantity: u32) -> ValidationResult<()> {
        validate_quantity(quantity as i64)?;
        let line = self.baskets.entry(shop).or_default().entry(item).or_insert(0);
        *line = line.saturating_add(quantity);
        Ok(())
    }

    /// Builder-style variant of [`Cart::add`].
    pub fn with(mut self, shop: ShopId, item: ItemId, quantity: u32) -> ValidationResult<Self> {
        self.add(shop, item, quantity)?;
        Ok(self)
    }

    /// Removes up to `quantity` of an item; the line disappears at zero.
    pub fn remove(&mut self, shop: ShopId, item: ItemId, quantity: u32) {
        if let Some(basket) = self.baskets.get_mut(&shop) {
            if let Some(line) = basket.get_mut(&item) {
                if *line > quantity {
                    *line -= quantity;
                } else {
                    basket.remove(&item);
                }
            }
            if basket.is_empty() {
                self.baskets.remove(&shop);
            }
        }
    }

    /// Returns the basket of one shop, if any.
    pub fn basket(&self, shop: ShopId) -> Option<&ItemQuantities> {
        self.baskets.get(&shop)
    }

    /// Iterates shop baskets in shop-id order.
    pub fn baskets(&self) -> impl Iterator<Item = (ShopId, &ItemQuantities)> {
        self.baskets.iter().map(|(shop, items)| (*shop, items))
    }

    pub fn is_empty(&self) -> bool {
        self.baskets.is_empty()
    }
}

// =============================================================================
// Price Snapshot
// =============================================================================

/// Item → non-negative base unit price, captured once per evaluation.
///
/// Immutable after construction: the only way in is [`PriceSnapshot::new`]
/// (or `FromIterator` through [`PriceSnapshot::try_from_iter`]), which
/// rejects negative prices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    prices: BTreeMap<ItemId, Money>,
}

impl PriceSnapshot {
    /// Validates every price and freezes the map.
    pub fn new(prices: BTreeMap<ItemId, Money>) -> ValidationResult<Self> {
        for price in prices.values() {
            validate_price_cents(price.cents())?;
        }
        Ok(PriceSnapshot { prices })
    }

    pub fn try_from_iter<I>(iter: I) -> ValidationResult<Self>
    where
        I: IntoIterator<Item = (ItemId, Money)>,
    {
        Self::new(iter.into_iter().collect())
    }

    pub fn get(&self, item: ItemId) -> Option<Money> {
        self.prices.get(&item).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, Money)> + '_ {
        self.prices.iter().map(|(item, price)| (*item, *price))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

// =============================================================================
// Shipping Address
// =============================================================================

/// Where a completed purchase ships to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub country: String,
    pub city: String,
    pub street: String,
    pub zip_code: String,
}

impl fmt::Display for ShippingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {} {}",
            self.street, self.city, self.country, self.zip_code
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(Percentage::new(25).unwrap().kept(), 75);
        assert!(matches!(
            Percentage::new(130),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_percentage_serde_rejects_out_of_range() {
        let ok: Percentage = serde_json::from_str("40").unwrap();
        assert_eq!(ok.value(), 40);
        assert!(serde_json::from_str::<Percentage>("140").is_err());
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("Books".parse::<ItemCategory>().unwrap(), ItemCategory::Books);
        assert!("furniture".parse::<ItemCategory>().is_err());
    }

    #[test]
    fn test_cart_merges_and_removes() {
        let shop = ShopId::new(1);
        let item = ItemId::new(10);
        let mut cart = Cart::new();

        cart.add(shop, item, 2).unwrap();
        cart.add(shop, item, 3).unwrap();
        assert_eq!(cart.basket(shop).unwrap()[&item], 5);

        cart.remove(shop, item, 4);
        assert_eq!(cart.basket(shop).unwrap()[&item], 1);

        cart.remove(shop, item, 1);
        assert!(cart.basket(shop).is_none());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_cart_rejects_zero_quantity() {
        let mut cart = Cart::new();
        assert!(cart.add(ShopId::new(1), ItemId::new(1), 0).is_err());
    }

    #[test]
    fn test_price_snapshot_rejects_negative() {
        let ok = PriceSnapshot::try_from_iter([(ItemId::new(1), Money::from_cents(0))]);
        assert!(ok.is_ok());

        let bad = PriceSnapshot::try_from_iter([(ItemId::new(1), Money::from_cents(-1))]);
        assert!(bad.is_err());
    }
}
