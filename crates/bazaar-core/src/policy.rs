//! # Purchase Policies
//!
//! Predicate trees that gate whether a discount applies to a basket.
//!
//! ## Tree Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          PolicyNode                                     │
//! │                                                                         │
//! │                     Composite(AND)                                      │
//! │                     ┌──────┴──────┐                                     │
//! │           Leaf(item 7 ≥ 2)   Composite(XOR)                             │
//! │                              ┌──────┴──────┐                            │
//! │                  Leaf(books ≥ 3)   Leaf(basket ≥ $50.00)               │
//! │                                                                         │
//! │  Leaf kinds                                                             │
//! │  ├── ItemThreshold       quantity of one item ≥ n                       │
//! │  ├── CategoryThreshold   summed quantity of a category ≥ n              │
//! │  ├── BasketValueAtLeast  Σ current unit price × qty ≥ amount            │
//! │  └── Unconditional       always true                                    │
//! │                                                                         │
//! │  Composite children (at most two)                                      │
//! │  ├── none     → true                                                    │
//! │  ├── one      → that child's result, operator ignored                  │
//! │  └── two      → AND / OR / XOR of both                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The arity limit lives in the type: a composite has a `left` and a `right`
//! slot. Builders and deserialized trees are validated once, at
//! construction, so [`PolicyNode::test`] itself never fails.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::pricing::{UnitPrice, UnitPrices};
use crate::types::{CategoryMap, ItemCategory, ItemId, ItemQuantities};
use crate::validation::{validate_price_cents, validate_threshold, ValidationResult};

/// Maximum children of a composite node.
pub const MAX_POLICY_CHILDREN: usize = 2;

// =============================================================================
// Leaf
// =============================================================================

/// A single condition over one basket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyLeaf {
    ItemThreshold { item: ItemId, min_quantity: u32 },
    CategoryThreshold { category: ItemCategory, min_quantity: u32 },
    BasketValueAtLeast { amount: Money },
    Unconditional,
}

impl PolicyLeaf {
    fn validate(&self) -> ValidationResult<()> {
        match self {
            PolicyLeaf::ItemThreshold { min_quantity, .. }
            | PolicyLeaf::CategoryThreshold { min_quantity, .. } => {
                validate_threshold(*min_quantity)
            }
            PolicyLeaf::BasketValueAtLeast { amount } => validate_price_cents(amount.cents()),
            PolicyLeaf::Unconditional => Ok(()),
        }
    }

    fn test<P: UnitPrices + ?Sized>(
        &self,
        basket: &ItemQuantities,
        prices: &P,
        categories: &CategoryMap,
    ) -> bool {
        match self {
            PolicyLeaf::ItemThreshold { item, min_quantity } => {
                basket.get(item).copied().unwrap_or(0) >= *min_quantity
            }
            PolicyLeaf::CategoryThreshold {
                category,
                min_quantity,
            } => {
                let total: u64 = basket
                    .iter()
                    .filter(|(item, _)| categories.get(item) == Some(category))
                    .map(|(_, qty)| *qty as u64)
                    .sum();
                total >= *min_quantity as u64
            }
            PolicyLeaf::BasketValueAtLeast { amount } => {
                let value = basket
                    .iter()
                    .filter_map(|(item, qty)| prices.unit_price(*item).map(|p| p.times(*qty)))
                    .fold(UnitPrice::ZERO, |acc, line| acc + line);
                value >= UnitPrice::from_money(*amount)
            }
            PolicyLeaf::Unconditional => true,
        }
    }
}

// =============================================================================
// Operator
// =============================================================================

/// Logical operator of a composite node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOperator {
    And,
    Or,
    Xor,
}

impl PolicyOperator {
    #[inline]
    pub fn combine(&self, left: bool, right: bool) -> bool {
        match self {
            PolicyOperator::And => left && right,
            PolicyOperator::Or => left || right,
            PolicyOperator::Xor => left ^ right,
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// A policy tree. Immutable once built; owned by exactly one discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyNode {
    Leaf(PolicyLeaf),
    Composite {
        operator: PolicyOperator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        left: Option<Box<PolicyNode>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<Box<PolicyNode>>,
    },
}

impl PolicyNode {
    /// The always-true policy.
    pub fn unconditional() -> Self {
        PolicyNode::Leaf(PolicyLeaf::Unconditional)
    }

    /// Requires at least `min_quantity` of `item` in the basket.
    pub fn item_threshold(item: ItemId, min_quantity: u32) -> ValidationResult<Self> {
        validate_threshold(min_quantity)?;
        Ok(PolicyNode::Leaf(PolicyLeaf::ItemThreshold { item, min_quantity }))
    }

    /// Requires at least `min_quantity` items of `category`, summed.
    pub fn category_threshold(category: ItemCategory, min_quantity: u32) -> ValidationResult<Self> {
        validate_threshold(min_quantity)?;
        Ok(PolicyNode::Leaf(PolicyLeaf::CategoryThreshold {
            category,
            min_quantity,
        }))
    }

    /// Requires the basket, at current discounted prices, to be worth at
    /// least `amount`.
    pub fn basket_value_at_least(amount: Money) -> ValidationResult<Self> {
        validate_price_cents(amount.cents())?;
        Ok(PolicyNode::Leaf(PolicyLeaf::BasketValueAtLeast { amount }))
    }

    pub fn and(left: PolicyNode, right: PolicyNode) -> Self {
        Self::pair(PolicyOperator::And, left, right)
    }

    pub fn or(left: PolicyNode, right: PolicyNode) -> Self {
        Self::pair(PolicyOperator::Or, left, right)
    }

    pub fn xor(left: PolicyNode, right: PolicyNode) -> Self {
        Self::pair(PolicyOperator::Xor, left, right)
    }

    fn pair(operator: PolicyOperator, left: PolicyNode, right: PolicyNode) -> Self {
        PolicyNode::Composite {
            operator,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    /// Builds a composite from a list of children.
    ///
    /// ## Errors
    /// `InvalidFormat` when more than [`MAX_POLICY_CHILDREN`] are given.
    pub fn composite(operator: PolicyOperator, children: Vec<PolicyNode>) -> ValidationResult<Self> {
        if children.len() > MAX_POLICY_CHILDREN {
            return Err(too_many_children(children.len()));
        }
        let mut children = children.into_iter().map(Box::new);
        Ok(PolicyNode::Composite {
            operator,
            left: children.next(),
            right: children.next(),
        })
    }

    /// Parses a policy tree from JSON and validates every leaf.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::policy::PolicyNode;
    ///
    /// let json = r#"{"leaf":{"kind":"item_threshold","item":7,"min_quantity":2}}"#;
    /// assert!(PolicyNode::from_json(json).is_ok());
    ///
    /// let unknown = r#"{"leaf":{"kind":"weather_is_nice"}}"#;
    /// assert!(PolicyNode::from_json(unknown).is_err());
    /// ```
    pub fn from_json(json: &str) -> ValidationResult<Self> {
        let node: PolicyNode =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidFormat {
                field: "policy".to_string(),
                reason: e.to_string(),
            })?;
        node.validate()?;
        Ok(node)
    }

    /// Re-checks every leaf. Needed for trees that did not come through the
    /// validating constructors.
    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            PolicyNode::Leaf(leaf) => leaf.validate(),
            PolicyNode::Composite { left, right, .. } => {
                for child in [left, right].into_iter().flatten() {
                    child.validate()?;
                }
                Ok(())
            }
        }
    }

    /// Evaluates the tree against one basket.
    ///
    /// `prices` are the prices current at this point of the evaluation,
    /// which is what [`PolicyLeaf::BasketValueAtLeast`] reads.
    pub fn test<P: UnitPrices + ?Sized>(
        &self,
        basket: &ItemQuantities,
        prices: &P,
        categories: &CategoryMap,
    ) -> bool {
        match self {
            PolicyNode::Leaf(leaf) => leaf.test(basket, prices, categories),
            PolicyNode::Composite {
                operator,
                left,
                right,
            } => match (left, right) {
                (None, None) => true,
                (Some(only), None) | (None, Some(only)) => only.test(basket, prices, categories),
                (Some(l), Some(r)) => operator.combine(
                    l.test(basket, prices, categories),
                    r.test(basket, prices, categories),
                ),
            },
        }
    }

    /// Number of levels, a lone leaf being 1.
    pub fn depth(&self) -> usize {
        match self {
            PolicyNode::Leaf(_) => 1,
            PolicyNode::Composite { left, right, .. } => {
                1 + [left, right]
                    .into_iter()
                    .flatten()
                    .map(|c| c.depth())
                    .max()
                    .unwrap_or(0)
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            PolicyNode::Leaf(_) => 1,
            PolicyNode::Composite { left, right, .. } => [left, right]
                .into_iter()
                .flatten()
                .map(|c| c.leaf_count())
                .sum(),
        }
    }
}

impl Default for PolicyNode {
    fn default() -> Self {
        PolicyNode::unconditional()
    }
}

fn too_many_children(count: usize) -> ValidationError {
    ValidationError::InvalidFormat {
        field: "policy".to_string(),
        reason: format!(
            "composite accepts at most {} children, got {}",
            MAX_POLICY_CHILDREN, count
        ),
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Incremental composite builder that refuses a third child.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    operator: PolicyOperator,
    children: Vec<PolicyNode>,
}

impl PolicyBuilder {
    pub fn new(operator: PolicyOperator) -> Self {
        PolicyBuilder {
            operator,
            children: Vec::with_capacity(MAX_POLICY_CHILDREN),
        }
    }

    /// Adds a child.
    ///
    /// ## Errors
    /// `InvalidFormat` when the composite already has two children. The
    /// builder is left unchanged.
    pub fn push(&mut self, child: PolicyNode) -> ValidationResult<&mut Self> {
        if self.children.len() >= MAX_POLICY_CHILDREN {
            return Err(too_many_children(self.children.len() + 1));
        }
        self.children.push(child);
        Ok(self)
    }

    pub fn build(self) -> PolicyNode {
        let mut children = self.children.into_iter().map(Box::new);
        PolicyNode::Composite {
            operator: self.operator,
            left: children.next(),
            right: children.next(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
