//! # Validation Module
//!
//! Input validation shared by every constructor in bazaar-core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      When Validation Happens                            │
//! │                                                                         │
//! │  Construction time (THIS MODULE)                                       │
//! │  ├── Percentage::new, Discount::new       percentage ∈ [0, 100]        │
//! │  ├── PriceSnapshot::new                   prices ≥ 0                   │
//! │  ├── PolicyNode::composite                at most two children         │
//! │  └── Auction::open                        items, price, window         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Evaluation time                                                        │
//! │  └── never fails: a missing item simply does not satisfy a policy      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bazaar_core::validation::{validate_quantity, validate_price_cents};
//!
//! validate_quantity(5).unwrap();
//! validate_price_cents(1099).unwrap();
//! assert!(validate_price_cents(-1).is_err());
//! ```

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::ItemQuantities;
use crate::{MAX_ITEM_QUANTITY, MAX_LINES_PER_PURCHASE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a base price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items)
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates the opening price of an auction.
///
/// ## Rules
/// - Must be strictly positive: a free lot cannot be outbid meaningfully
pub fn validate_initial_price(price: Money) -> ValidationResult<()> {
    if !price.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "initial price".to_string(),
        });
    }

    Ok(())
}

/// Validates a bid amount.
pub fn validate_bid_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "bid amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a policy threshold (minimum quantity).
pub fn validate_threshold(min_quantity: u32) -> ValidationResult<()> {
    if min_quantity == 0 {
        return Err(ValidationError::MustBePositive {
            field: "threshold".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the item lines of a purchase or auction lot.
///
/// ## Rules
/// - At least one line
/// - At most MAX_LINES_PER_PURCHASE lines
/// - Every quantity passes [`validate_quantity`]
pub fn validate_items(items: &ItemQuantities) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if items.len() > MAX_LINES_PER_PURCHASE {
        return Err(ValidationError::OutOfRange {
            field: "item lines".to_string(),
            min: 1,
            max: MAX_LINES_PER_PURCHASE as i64,
        });
    }

    for qty in items.values() {
        validate_quantity(*qty as i64)?;
    }

    Ok(())
}

// =============================================================================
// Time Validators
// =============================================================================

/// Validates an optional auction window.
///
/// ## Rules
/// - Either both ends are given or neither
/// - `end` must be strictly after `start`
pub fn validate_auction_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> ValidationResult<()> {
    match (start, end) {
        (None, None) => Ok(()),
        (Some(start), Some(end)) if end > start => Ok(()),
        (Some(_), Some(_)) => Err(ValidationError::InvalidFormat {
            field: "auction window".to_string(),
            reason: "end must be after start".to_string(),
        }),
        _ => Err(ValidationError::InvalidFormat {
            field: "auction window".to_string(),
            reason: "start and end must be given together".to_string(),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemId;
    use chrono::Duration;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-5).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_initial_price() {
        assert!(validate_initial_price(Money::from_cents(1)).is_ok());
        assert!(validate_initial_price(Money::zero()).is_err());
        assert!(validate_initial_price(Money::from_cents(-10)).is_err());
    }

    #[test]
    fn test_validate_items() {
        let mut items = ItemQuantities::new();
        assert!(matches!(
            validate_items(&items),
            Err(ValidationError::Required { .. })
        ));

        items.insert(ItemId::new(1), 2);
        assert!(validate_items(&items).is_ok());

        items.insert(ItemId::new(2), 0);
        assert!(validate_items(&items).is_err());
    }

    #[test]
    fn test_validate_auction_window() {
        let now = Utc::now();
        assert!(validate_auction_window(None, None).is_ok());
        assert!(validate_auction_window(Some(now), Some(now + Duration::minutes(5))).is_ok());
        assert!(validate_auction_window(Some(now), Some(now)).is_err());
        assert!(validate_auction_window(Some(now), None).is_err());
        assert!(validate_auction_window(None, Some(now)).is_err());
    }
}
