//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure. Storage failures
//! are classified into these variants by `store::error`.

use rust_decimal::Decimal;
use thiserror::Error;

use super::{AmountError, AssetId, UserId};

/// Errors produced by the stores and the purchase/deposit coordinators.
///
/// Client errors leave no trace in storage: the enclosing transaction is
/// rolled back before the error is returned. `TransactionFailed` and
/// `StoreUnavailable` are transient and safe to retry for purchases.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Account not found for user {0}")]
    AccountNotFound(UserId),

    #[error("Asset not found: {0}")]
    AssetNotFound(AssetId),

    /// Non-positive ids, empty names and other malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Zero, negative or out-of-range money value
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("User {user_id} cannot purchase their own asset {asset_id}")]
    SelfPurchaseForbidden { asset_id: AssetId, user_id: UserId },

    #[error("User {user_id} has already purchased asset {asset_id}")]
    AlreadyPurchased { asset_id: AssetId, user_id: UserId },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Serialization failure or deadlock reported by the store. The
    /// transaction has been rolled back and may be re-run from the start.
    #[error("Concurrent transaction conflict: {0}")]
    Conflict(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds { required, available }
    }

    /// Check if this is a client error (caller's fault, never retried)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::AssetNotFound(_)
                | Self::InvalidInput(_)
                | Self::InvalidAmount(_)
                | Self::SelfPurchaseForbidden { .. }
                | Self::AlreadyPurchased { .. }
                | Self::InsufficientFunds { .. }
                | Self::AlreadyExists(_)
        )
    }

    /// Check if the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::TransactionFailed(_) | Self::StoreUnavailable(_)
        )
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        DomainError::InvalidAmount(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(dec!(100), dec!(50));

        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_self_purchase_error() {
        let err = DomainError::SelfPurchaseForbidden { asset_id: 7, user_id: 3 };

        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "User 3 cannot purchase their own asset 7");
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        for err in [
            DomainError::Conflict("40001".to_string()),
            DomainError::TransactionFailed("commit".to_string()),
            DomainError::StoreUnavailable("pool timed out".to_string()),
        ] {
            assert!(err.is_retryable(), "{err} should be retryable");
            assert!(!err.is_client_error());
        }
    }

    #[test]
    fn test_amount_error_becomes_invalid_amount() {
        let err: DomainError = AmountError::NotPositive(dec!(-5)).into();
        assert!(matches!(err, DomainError::InvalidAmount(_)));
    }
}
