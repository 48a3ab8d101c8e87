//! # bazaar-core: Pure Pricing & Auction Logic for Bazaar
//!
//! This crate holds the marketplace rules as pure functions and plain state
//! machines with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bazaar Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Callers (service layer, CLI)                   │   │
//! │  │    quote cart ──► checkout ──► open auction ──► bid ──► close   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 bazaar-engine (concurrency layer)               │   │
//! │  │   DiscountRegistry • AuctionBook • StockLedger • Checkout      │   │
//! │  │   locks, atomics, tokio sweeper, events, config, stores        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bazaar-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │  policy  │ │ discount │ │ pricing  │ │ auction/purchase │  │   │
//! │  │   │ AND/OR/  │ │ additive │ │ exact    │ │ bid state        │  │   │
//! │  │   │ XOR tree │ │ multipl. │ │ prices   │ │ machine, receipts│  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO LOCKS • NO CLOCK READS • PURE FUNCTIONS          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Identifiers, categories, percentages, carts, snapshots
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`policy`] - Predicate trees gating discounts
//! - [`discount`] - Discounts and the ordered discount set
//! - [`pricing`] - The pricing engine and exact unit prices
//! - [`purchase`] - Purchases and receipts
//! - [`auction`] - The auction state machine
//! - [`error`] - Domain error types
//! - [`validation`] - Construction-time validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Time is always passed in, never read
//! 2. **No I/O**: Storage, clocks and payment live in bazaar-engine
//! 3. **Integer Money**: Whole cents at every boundary, exact fractions inside
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use bazaar_core::discount::{Discount, DiscountSet, DiscountTarget, Stacking};
//! use bazaar_core::policy::PolicyNode;
//! use bazaar_core::pricing::PricingEngine;
//! use bazaar_core::{CategoryMap, ItemId, ItemQuantities, Money, PriceSnapshot};
//!
//! let item = ItemId::new(1);
//! let set = DiscountSet::new()
//!     .with_added(Discount::new(DiscountTarget::Item(item), 10, Stacking::Additive, PolicyNode::unconditional()).unwrap())
//!     .with_added(Discount::new(DiscountTarget::Global, 20, Stacking::Multiplicative, PolicyNode::unconditional()).unwrap());
//!
//! let basket: ItemQuantities = [(item, 1)].into_iter().collect();
//! let base = PriceSnapshot::try_from_iter([(item, Money::from_cents(10_000))]).unwrap();
//!
//! let prices = PricingEngine::new(&set)
//!     .apply_discounts(&basket, &base, &CategoryMap::new())
//!     .unwrap();
//!
//! // $100.00 → additive 10% → $90.00 → multiplicative 20% → $72.00
//! assert_eq!(prices.rounded(item), Some(Money::from_cents(7_200)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auction;
pub mod discount;
pub mod error;
pub mod money;
pub mod policy;
pub mod pricing;
pub mod purchase;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ClosedReason, CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single item line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum distinct item lines in one purchase or auction lot.
pub const MAX_LINES_PER_PURCHASE: usize = 100;
