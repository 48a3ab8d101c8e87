//! # Discounts
//!
//! A shop's discounts form an ordered, immutable [`DiscountSet`]. Order is
//! significant once additive and multiplicative discounts are mixed, so the
//! set keeps insertion order and every mutation returns a new set.
//!
//! ## Stacking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ADDITIVE         compared against the BASE price; the lowest result   │
//! │                   among additive discounts wins (they never compound)  │
//! │                                                                         │
//! │  MULTIPLICATIVE   compounds on the CURRENT price, including whatever   │
//! │                   an earlier additive discount produced                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::policy::PolicyNode;
use crate::types::{CategoryMap, DiscountId, ItemCategory, ItemId, Percentage};
use crate::validation::ValidationResult;

// =============================================================================
// Target & Stacking
// =============================================================================

/// Which items a discount applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountTarget {
    Global,
    Item(ItemId),
    Category(ItemCategory),
}

impl DiscountTarget {
    pub fn matches(&self, item: ItemId, categories: &CategoryMap) -> bool {
        match self {
            DiscountTarget::Global => true,
            DiscountTarget::Item(target) => *target == item,
            DiscountTarget::Category(category) => categories.get(&item) == Some(category),
        }
    }
}

/// How a discount combines with the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stacking {
    Additive,
    Multiplicative,
}

// =============================================================================
// Discount
// =============================================================================

/// One percentage discount, gated by a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    id: DiscountId,
    target: DiscountTarget,
    percentage: Percentage,
    stacking: Stacking,
    #[serde(default)]
    policy: PolicyNode,
}

impl Discount {
    /// Creates a discount with a fresh id.
    ///
    /// ## Errors
    /// - `OutOfRange` when `percentage` is outside `[0, 100]`
    /// - any leaf error of `policy`
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::discount::{Discount, DiscountTarget, Stacking};
    /// use bazaar_core::policy::PolicyNode;
    ///
    /// let ok = Discount::new(DiscountTarget::Global, 15, Stacking::Additive, PolicyNode::unconditional());
    /// assert!(ok.is_ok());
    ///
    /// let bad = Discount::new(DiscountTarget::Global, 130, Stacking::Additive, PolicyNode::unconditional());
    /// assert!(bad.is_err());
    /// ```
    pub fn new(
        target: DiscountTarget,
        percentage: i64,
        stacking: Stacking,
        policy: PolicyNode,
    ) -> ValidationResult<Self> {
        let percentage = Percentage::new(percentage)?;
        policy.validate()?;
        Ok(Discount {
            id: DiscountId::generate(),
            target,
            percentage,
            stacking,
            policy,
        })
    }

    pub fn id(&self) -> DiscountId {
        self.id
    }

    pub fn target(&self) -> DiscountTarget {
        self.target
    }

    pub fn percentage(&self) -> Percentage {
        self.percentage
    }

    pub fn stacking(&self) -> Stacking {
        self.stacking
    }

    pub fn policy(&self) -> &PolicyNode {
        &self.policy
    }
}

// =============================================================================
// Discount Set
// =============================================================================

/// Ordered, immutable collection of one shop's discounts.
///
/// ## Lifecycle
/// ```text
/// current ──with_added / without / replace_target──► new set
///    │                                                   │
///    └── readers keep using it                           └── swapped in
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscountSet {
    discounts: Vec<Discount>,
}

impl DiscountSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `discount` appended.
    pub fn with_added(&self, discount: Discount) -> Self {
        let mut discounts = self.discounts.clone();
        discounts.push(discount);
        DiscountSet { discounts }
    }

    /// Returns a copy without the discount `id`.
    ///
    /// ## Errors
    /// `DiscountNotFound` when the id is not in the set.
    pub fn without(&self, id: DiscountId) -> CoreResult<Self> {
        if !self.discounts.iter().any(|d| d.id == id) {
            return Err(CoreError::DiscountNotFound(id));
        }
        let discounts = self.discounts.iter().filter(|d| d.id != id).cloned().collect();
        Ok(DiscountSet { discounts })
    }

    /// Returns a copy where `discount` takes the place of every discount
    /// with the same target, at the position of the first one. Appends when
    /// no discount shares the target.
    pub fn replace_target(&self, discount: Discount) -> Self {
        let position = self.discounts.iter().position(|d| d.target == discount.target);
        let mut discounts: Vec<Discount> = self
            .discounts
            .iter()
            .filter(|d| d.target != discount.target)
            .cloned()
            .collect();
        match position {
            Some(index) => discounts.insert(index, discount),
            None => discounts.push(discount),
        }
        DiscountSet { discounts }
    }

    pub fn get(&self, id: DiscountId) -> Option<&Discount> {
        self.discounts.iter().find(|d| d.id == id)
    }

    /// Iterates in insertion (evaluation) order.
    pub fn iter(&self) -> impl Iterator<Item = &Discount> {
        self.discounts.iter()
    }

    pub fn len(&self) -> usize {
        self.discounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discounts.is_empty()
    }

    /// Parses a persisted set and re-validates every policy tree.
    pub fn from_json(json: &str) -> ValidationResult<Self> {
        let set: DiscountSet =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidFormat {
                field: "discounts".to_string(),
                reason: e.to_string(),
            })?;
        for discount in &set.discounts {
            discount.policy.validate()?;
        }
        Ok(set)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
