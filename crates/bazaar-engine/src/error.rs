//! # Engine Error Types
//!
//! Error types for the concurrent marketplace services.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Domain      │  │    Storage      │  │       Payment           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Core(CoreError)│  │  Store(...)     │  │  PaymentDeclined        │ │
//! │  │  validation,    │  │  propagated     │  │  PaymentFailed          │ │
//! │  │  state, lookup, │  │  unchanged      │  │                         │ │
//! │  │  contention     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Configuration  │  │                Internal                     │  │
//! │  │                 │  │                                             │  │
//! │  │  InvalidConfig  │  │  ChannelError, ShuttingDown                 │  │
//! │  │  ConfigLoad/Save│  │                                             │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use bazaar_core::{CoreError, ErrorKind, UserId};

use crate::store::StoreError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering every failure an engine operation can report.
///
/// ## Design Principles
/// - Domain errors keep their `CoreError` shape so callers can match on them
/// - Storage failures are never swallowed
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// A domain rule rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// The persistence port failed.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    // =========================================================================
    // Payment Errors
    // =========================================================================
    /// The gateway refused the charge.
    #[error("Payment declined for user {user}: {reason}")]
    PaymentDeclined { user: UserId, reason: String },

    /// The gateway could not be reached or failed mid-operation.
    #[error("Payment gateway error: {0}")]
    PaymentFailed(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// A background task is shutting down.
    #[error("Engine is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<bazaar_core::ValidationError> for EngineError {
    fn from(err: bazaar_core::ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    /// Returns the domain classification, if this is a domain error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Core(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// Returns true if the same call may succeed when retried unchanged.
    ///
    /// ## Retryable Errors
    /// - CAS contention that survived the internal retries
    /// - Storage backend temporarily unavailable
    /// - Payment gateway failures (not declines)
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Core(err) => err.is_retryable(),
            EngineError::Store(err) => err.is_transient(),
            EngineError::PaymentFailed(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{ItemId, ValidationError};

    #[test]
    fn test_retryable_errors() {
        let conflict = EngineError::Core(CoreError::ConcurrencyConflict {
            resource: "stock".into(),
            attempts: 3,
        });
        assert!(conflict.is_retryable());
        assert!(EngineError::Store(StoreError::Unavailable("down".into())).is_retryable());
        assert!(EngineError::PaymentFailed("timeout".into()).is_retryable());

        assert!(!EngineError::Core(CoreError::ItemNotFound(ItemId::new(1))).is_retryable());
        assert!(!EngineError::InvalidConfig("bad".into()).is_retryable());
        assert!(!EngineError::PaymentDeclined {
            user: UserId::new(1),
            reason: "card".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_core_errors_display_unchanged() {
        let err: EngineError = CoreError::ItemNotFound(ItemId::new(42)).into();
        assert_eq!(err.to_string(), "Item not found: 42");
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_validation_converts_through_core() {
        let err: EngineError = ValidationError::Required {
            field: "cart".into(),
        }
        .into();
        assert_eq!(err.kind(), Some(ErrorKind::Validation));
        assert!(!err.is_config_error());
    }
}
