//! Coordinator module
//!
//! Multi-store operations that must commit or roll back as a unit.

mod commands;
mod deposit;
mod purchase;
pub mod transaction;

pub use commands::{DepositCommand, DepositResult, PurchaseCommand, PurchaseResult};
pub use deposit::DepositCoordinator;
pub use purchase::PurchaseCoordinator;
pub use transaction::{IsolationLevel, TransactionSettings};

use sqlx::PgPool;

use crate::domain::{ensure_positive_id, Balance, DomainError, UserId};
use crate::store::AccountStore;

/// Current balance of one account.
///
/// A plain read without row locks; it observes the last committed value and
/// never blocks behind an in-flight purchase or deposit.
pub async fn check_balance(pool: &PgPool, user_id: UserId) -> Result<Balance, DomainError> {
    ensure_positive_id("user id", user_id)?;
    AccountStore::new(pool.clone()).read_balance(user_id).await
}
