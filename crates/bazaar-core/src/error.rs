//! # Error Types
//!
//! Domain-specific error types for bazaar-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bazaar-core errors (this file)                                        │
//! │  ├── CoreError        - Domain errors, grouped by ErrorKind            │
//! │  └── ValidationError  - Malformed input (field-level)                  │
//! │                                                                         │
//! │  bazaar-engine errors (separate crate)                                 │
//! │  └── EngineError      - Core + storage + payment + config failures     │
//! │                                                                         │
//! │  ErrorKind       Retry?   Examples                                     │
//! │  ─────────────   ──────   ──────────────────────────────────────────   │
//! │  Validation      no       percentage 130, negative price, no items     │
//! │  State           no       self-bid, bid too low, double finalize       │
//! │  NotFound        no       unknown auction / discount / item            │
//! │  Concurrency     yes      CAS retries exhausted under contention       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (IDs, amounts)
//! 3. Errors are enum variants, never String
//! 4. A rejected operation never leaves partial state behind

use thiserror::Error;

use crate::money::Money;
use crate::types::{DiscountId, ItemId, PurchaseId, ShopId, UserId};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. Surfaced immediately, never retried.
    Validation,
    /// Illegal transition for the current state. No state was changed.
    State,
    /// Unknown reference.
    NotFound,
    /// Transient race loss that survived the bounded internal retries.
    Concurrency,
}

// =============================================================================
// Auction Closed Reason
// =============================================================================

/// Why an auction refused a bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    /// The bidding window has not opened yet.
    NotStarted,
    /// The bidding window is over.
    Ended,
    /// The auction was already finalized.
    Completed,
    /// A finalize is writing the auction out.
    Finalizing,
}

impl std::fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosedReason::NotStarted => write!(f, "has not started yet"),
            ClosedReason::Ended => write!(f, "has ended"),
            ClosedReason::Completed => write!(f, "is already completed"),
            ClosedReason::Finalizing => write!(f, "is being finalized"),
        }
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// Every variant belongs to exactly one [`ErrorKind`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Not Found
    // =========================================================================
    /// Item is unknown to the catalog or to the shop.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// Shop is unknown.
    #[error("Shop not found: {0}")]
    ShopNotFound(ShopId),

    /// Discount id is not part of the shop's discount set.
    #[error("Discount not found: {0}")]
    DiscountNotFound(DiscountId),

    /// Auction id is unknown.
    #[error("Auction not found: {0}")]
    AuctionNotFound(PurchaseId),

    /// Purchase id is unknown.
    #[error("Purchase not found: {0}")]
    PurchaseNotFound(PurchaseId),

    // =========================================================================
    // State
    // =========================================================================
    /// Bid does not strictly exceed the current highest bid.
    ///
    /// ## User Workflow
    /// ```text
    /// highest = $50.00 (bidder 7)
    ///      │
    ///      ▼
    /// post_bid(bidder 9, $50.00)   ← ties are rejected
    ///      │
    ///      ▼
    /// BidTooLow { amount: $50.00, highest: $50.00 }
    /// ```
    #[error("Bid of {amount} does not exceed the current highest bid of {highest}")]
    BidTooLow { amount: Money, highest: Money },

    /// The auction initiator tried to bid on their own auction.
    #[error("User {0} cannot bid on their own auction")]
    SelfBid(UserId),

    /// The auction does not accept bids right now.
    #[error("Auction {auction_id} {reason}")]
    AuctionClosed {
        auction_id: PurchaseId,
        reason: ClosedReason,
    },

    /// A windowed auction was finalized before its end time.
    #[error("Auction {0} is still running")]
    AuctionStillRunning(PurchaseId),

    /// Finalize was called a second time.
    #[error("Auction {0} is already finalized")]
    AlreadyFinalized(PurchaseId),

    /// The caller may not perform this transition (e.g. initiator accepting
    /// their own auction, expiry-finalizing an auction without a window).
    #[error("Operation not permitted on {purchase_id}: {reason}")]
    NotPermitted {
        purchase_id: PurchaseId,
        reason: String,
    },

    /// Purchase is not in a state that allows the requested operation.
    #[error("Purchase {purchase_id} is {current_status}, cannot perform operation")]
    InvalidPurchaseStatus {
        purchase_id: PurchaseId,
        current_status: String,
    },

    /// Insufficient stock to reserve a line.
    #[error("Insufficient stock for item {item}: available {available}, requested {requested}")]
    InsufficientStock {
        item: ItemId,
        available: i64,
        requested: i64,
    },

    // =========================================================================
    // Concurrency
    // =========================================================================
    /// A compare-and-swap loop lost the race too many times.
    #[error("Concurrent update conflict on {resource} after {attempts} attempts")]
    ConcurrencyConflict { resource: String, attempts: u32 },
}

impl CoreError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::ItemNotFound(_)
            | CoreError::ShopNotFound(_)
            | CoreError::DiscountNotFound(_)
            | CoreError::AuctionNotFound(_)
            | CoreError::PurchaseNotFound(_) => ErrorKind::NotFound,
            CoreError::BidTooLow { .. }
            | CoreError::SelfBid(_)
            | CoreError::AuctionClosed { .. }
            | CoreError::AuctionStillRunning(_)
            | CoreError::AlreadyFinalized(_)
            | CoreError::NotPermitted { .. }
            | CoreError::InvalidPurchaseStatus { .. }
            | CoreError::InsufficientStock { .. } => ErrorKind::State,
            CoreError::ConcurrencyConflict { .. } => ErrorKind::Concurrency,
        }
    }

    /// Returns true if the operation may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Raised at construction time, never during evaluation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format or shape (e.g., malformed policy tree, bad window).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            item: ItemId::new(42),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for item 42: available 3, requested 5"
        );

        let err = CoreError::BidTooLow {
            amount: Money::from_cents(5000),
            highest: Money::from_cents(5000),
        };
        assert_eq!(
            err.to_string(),
            "Bid of $50.00 does not exceed the current highest bid of $50.00"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::OutOfRange {
            field: "percentage".to_string(),
            min: 0,
            max: 100,
        };
        assert_eq!(err.to_string(), "percentage must be between 0 and 100");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_kinds_and_retryability() {
        assert_eq!(CoreError::SelfBid(UserId::new(1)).kind(), ErrorKind::State);
        assert_eq!(
            CoreError::ItemNotFound(ItemId::new(1)).kind(),
            ErrorKind::NotFound
        );

        let conflict = CoreError::ConcurrencyConflict {
            resource: "stock".into(),
            attempts: 8,
        };
        assert!(conflict.is_retryable());
        assert!(!CoreError::SelfBid(UserId::new(1)).is_retryable());
    }
}
