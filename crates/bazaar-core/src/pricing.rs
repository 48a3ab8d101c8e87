//! # Pricing Engine
//!
//! Applies a shop's ordered [`DiscountSet`] to one basket.
//!
//! ## Evaluation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    apply_discounts(basket, base, categories)            │
//! │                                                                         │
//! │  discounted := base                                                     │
//! │                                                                         │
//! │  for d in discount_set (insertion order)                               │
//! │    for item in basket matching d.target, qty > 0                        │
//! │      if !d.policy.test(basket, discounted, categories) → skip          │
//! │                                                                         │
//! │      ADDITIVE        candidate  = base[item] × (100 - p) / 100         │
//! │                      discounted = min(discounted, candidate)           │
//! │                      → only the best single additive discount survives │
//! │                                                                         │
//! │      MULTIPLICATIVE  discounted = discounted × (100 - p) / 100         │
//! │                      → compounds on whatever is there, additive too    │
//! │                                                                         │
//! │  Example: base 100, additive 10% then multiplicative 20%               │
//! │           100 ──► min(100, 90) = 90 ──► 90 × 0.8 = 72                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exactness
//! Intermediate prices are [`UnitPrice`] values: cents scaled by a power of
//! 100, so every percentage step is exact and two multiplicative discounts
//! give bit-identical results in either order. Rounding to whole cents
//! happens once, when a [`Money`] is requested.
//!
//! The engine is synchronous and side-effect free; it can be called from any
//! thread without locking as long as the caller owns (or has snapshotted)
//! its inputs.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Add;

use serde::{Deserialize, Serialize};

use crate::discount::{DiscountSet, Stacking};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CategoryMap, ItemId, ItemQuantities, Percentage, PriceSnapshot};

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of exact percentage steps (scale 100^6 = 10^12).
///
/// A seventh compounding step on the same price rounds at 10^-12 cents.
const MAX_SCALE_EXP: u8 = 6;

#[inline]
fn pow100(exp: u8) -> u128 {
    100u128.pow(exp as u32)
}

// =============================================================================
// Unit Price
// =============================================================================

/// An exact, non-negative price in cents: `scaled / 100^exp`.
///
/// Always kept in canonical form (no trailing factor of 100 while `exp > 0`),
/// which makes the derived equality exact value equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitPrice {
    scaled: u128,
    exp: u8,
}

impl UnitPrice {
    pub const ZERO: UnitPrice = UnitPrice { scaled: 0, exp: 0 };

    /// Lifts a whole-cent amount. Negative amounts clamp to zero; callers
    /// only ever pass validated snapshot prices.
    pub fn from_money(money: Money) -> Self {
        UnitPrice {
            scaled: money.cents().max(0) as u128,
            exp: 0,
        }
    }

    /// Returns the price after taking `pct` off, without rounding.
    pub fn discounted(self, pct: Percentage) -> Self {
        let scaled = self.scaled * pct.kept() as u128;
        let next = if self.exp < MAX_SCALE_EXP {
            UnitPrice {
                scaled,
                exp: self.exp + 1,
            }
        } else {
            // Past the exact range: round half-up at the finest scale
            UnitPrice {
                scaled: (scaled + 50) / 100,
                exp: MAX_SCALE_EXP,
            }
        };
        next.normalized()
    }

    /// Multiplies by a line quantity.
    pub fn times(self, qty: u32) -> Self {
        UnitPrice {
            scaled: self.scaled * qty as u128,
            exp: self.exp,
        }
        .normalized()
    }

    /// Rounds half-up to whole cents.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::money::Money;
    /// use bazaar_core::pricing::UnitPrice;
    /// use bazaar_core::types::Percentage;
    ///
    /// let price = UnitPrice::from_money(Money::from_cents(999))
    ///     .discounted(Percentage::new(50).unwrap()); // 499.5 cents
    /// assert_eq!(price.to_money().cents(), 500);
    /// ```
    pub fn to_money(self) -> Money {
        let den = pow100(self.exp);
        let cents = (self.scaled * 2 + den) / (den * 2);
        Money::from_cents(cents as i64)
    }

    pub fn is_zero(&self) -> bool {
        self.scaled == 0
    }

    fn at_exp(&self, exp: u8) -> u128 {
        self.scaled * pow100(exp - self.exp)
    }

    fn normalized(mut self) -> Self {
        while self.exp > 0 && self.scaled % 100 == 0 {
            self.scaled /= 100;
            self.exp -= 1;
        }
        if self.scaled == 0 {
            self.exp = 0;
        }
        self
    }
}

impl Ord for UnitPrice {
    fn cmp(&self, other: &Self) -> Ordering {
        let exp = self.exp.max(other.exp);
        self.at_exp(exp).cmp(&other.at_exp(exp))
    }
}

impl PartialOrd for UnitPrice {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for UnitPrice {
    type Output = UnitPrice;

    fn add(self, other: Self) -> Self {
        let exp = self.exp.max(other.exp);
        UnitPrice {
            scaled: self.at_exp(exp) + other.at_exp(exp),
            exp,
        }
        .normalized()
    }
}

impl From<Money> for UnitPrice {
    fn from(money: Money) -> Self {
        UnitPrice::from_money(money)
    }
}

// =============================================================================
// Price Lookup
// =============================================================================

/// Anything a policy can read unit prices from.
///
/// Implemented by the immutable base [`PriceSnapshot`] and by the evolving
/// [`DiscountedPrices`], so policies can be tested against either.
pub trait UnitPrices {
    fn unit_price(&self, item: ItemId) -> Option<UnitPrice>;
}

impl UnitPrices for PriceSnapshot {
    fn unit_price(&self, item: ItemId) -> Option<UnitPrice> {
        self.get(item).map(UnitPrice::from_money)
    }
}

// =============================================================================
// Discounted Prices
// =============================================================================

/// Result of one evaluation: item → exact discounted unit price.
///
/// ## Invariant
/// For every item, `0 ≤ discounted ≤ base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountedPrices {
    prices: BTreeMap<ItemId, UnitPrice>,
}

impl DiscountedPrices {
    fn from_base(basket: &ItemQuantities, base: &PriceSnapshot) -> CoreResult<Self> {
        let mut prices = BTreeMap::new();
        for (item, qty) in basket {
            if *qty == 0 {
                continue;
            }
            let price = base.get(*item).ok_or(CoreError::ItemNotFound(*item))?;
            prices.insert(*item, UnitPrice::from_money(price));
        }
        Ok(DiscountedPrices { prices })
    }

    pub fn get(&self, item: ItemId) -> Option<UnitPrice> {
        self.prices.get(&item).copied()
    }

    /// Rounded unit price of one item.
    pub fn rounded(&self, item: ItemId) -> Option<Money> {
        self.get(item).map(UnitPrice::to_money)
    }

    /// Rounds every price into a fresh, immutable snapshot.
    pub fn to_snapshot(&self) -> PriceSnapshot {
        let prices = self
            .prices
            .iter()
            .map(|(item, price)| (*item, price.to_money()))
            .collect();
        // Rounded non-negative prices always validate
        PriceSnapshot::new(prices).unwrap_or_default()
    }

    /// Exact quantity-weighted total, rounded once.
    pub fn total(&self, basket: &ItemQuantities) -> Money {
        basket
            .iter()
            .filter_map(|(item, qty)| self.get(*item).map(|p| p.times(*qty)))
            .fold(UnitPrice::ZERO, |acc, line| acc + line)
            .to_money()
    }

    fn set(&mut self, item: ItemId, price: UnitPrice) {
        self.prices.insert(item, price);
    }
}

impl UnitPrices for DiscountedPrices {
    fn unit_price(&self, item: ItemId) -> Option<UnitPrice> {
        self.get(item)
    }
}

// =============================================================================
// Price Quote
// =============================================================================

/// One priced line of a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub item: ItemId,
    pub quantity: u32,
    pub base_unit_price: Money,
    /// Rounded for display; the totals use the exact value.
    pub unit_price: Money,
}

/// A priced shop basket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub lines: Vec<QuoteLine>,
    pub base_total: Money,
    pub discounted_total: Money,
    pub savings: Money,
}

// =============================================================================
// Pricing Engine
// =============================================================================

/// Stateless evaluator bound to one discount set.
#[derive(Debug, Clone, Copy)]
pub struct PricingEngine<'a> {
    discounts: &'a DiscountSet,
}

impl<'a> PricingEngine<'a> {
    pub fn new(discounts: &'a DiscountSet) -> Self {
        PricingEngine { discounts }
    }

    /// Computes the discounted unit price of every basket line.
    ///
    /// ## Errors
    /// - `ItemNotFound` when a basket line has no base price
    pub fn apply_discounts(
        &self,
        basket: &ItemQuantities,
        base: &PriceSnapshot,
        categories: &CategoryMap,
    ) -> CoreResult<DiscountedPrices> {
        let mut discounted = DiscountedPrices::from_base(basket, base)?;

        for discount in self.discounts.iter() {
            for (item, qty) in basket {
                if *qty == 0 || !discount.target().matches(*item, categories) {
                    continue;
                }
                if !discount.policy().test(basket, &discounted, categories) {
                    continue;
                }

                let (Some(current), Some(base_price)) = (discounted.get(*item), base.get(*item))
                else {
                    continue;
                };

                let next = match discount.stacking() {
                    Stacking::Additive => {
                        let candidate =
                            UnitPrice::from_money(base_price).discounted(discount.percentage());
                        current.min(candidate)
                    }
                    Stacking::Multiplicative => current.discounted(discount.percentage()),
                };
                discounted.set(*item, next);
            }
        }

        Ok(discounted)
    }

    /// Prices a basket and summarizes it.
    pub fn quote(
        &self,
        basket: &ItemQuantities,
        base: &PriceSnapshot,
        categories: &CategoryMap,
    ) -> CoreResult<PriceQuote> {
        let discounted = self.apply_discounts(basket, base, categories)?;

        let mut lines = Vec::with_capacity(basket.len());
        let mut base_total = Money::zero();
        for (item, qty) in basket.iter().filter(|(_, q)| **q > 0) {
            let base_unit_price = base.get(*item).ok_or(CoreError::ItemNotFound(*item))?;
            base_total += base_unit_price * *qty;
            lines.push(QuoteLine {
                item: *item,
                quantity: *qty,
                base_unit_price,
                unit_price: discounted.rounded(*item).unwrap_or(base_unit_price),
            });
        }

        let discounted_total = discounted.total(basket);
        Ok(PriceQuote {
            lines,
            base_total,
            discounted_total,
            savings: base_total - discounted_total,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
