//! Deposit Coordinator
//!
//! Adds funds to one account in its own transaction and returns the
//! post-update balance.

use sqlx::PgPool;

use crate::domain::{ensure_positive_id, Amount, DomainError, OperationContext, UserId};
use crate::store::AccountStore;

use super::transaction::{self, run_with_retry, IsolationLevel, TransactionSettings};
use super::{DepositCommand, DepositResult};

/// Deposits lock a single row, so read committed already serializes them
/// and concurrent deposits never abort each other with conflicts.
const DEPOSIT_ISOLATION: IsolationLevel = IsolationLevel::ReadCommitted;

/// Coordinator for balance deposits
pub struct DepositCoordinator {
    pool: PgPool,
    accounts: AccountStore,
    settings: TransactionSettings,
}

impl DepositCoordinator {
    pub fn new(pool: PgPool, settings: TransactionSettings) -> Self {
        Self {
            accounts: AccountStore::new(pool.clone()),
            pool,
            settings,
        }
    }

    /// Execute the deposit command.
    ///
    /// Not idempotent: a caller re-sending after `TransactionFailed` may
    /// deposit twice unless it deduplicates its own requests.
    pub async fn execute(
        &self,
        command: DepositCommand,
        context: &OperationContext,
    ) -> Result<DepositResult, DomainError> {
        ensure_positive_id("user id", command.user_id)?;

        // Rejected before any transaction is opened
        let amount = Amount::new(command.amount)?;

        let result = run_with_retry(&self.settings, "deposit", |_| {
            self.try_deposit(command.user_id, amount)
        })
        .await;

        match &result {
            Ok(deposit) => tracing::info!(
                user_id = deposit.user_id,
                amount = %deposit.amount,
                balance = %deposit.balance,
                correlation_id = ?context.correlation_id,
                api_key_id = ?context.api_key_id,
                client_ip = ?context.client_ip,
                "Deposit committed"
            ),
            Err(e) => tracing::warn!(
                user_id = command.user_id,
                amount = %amount,
                correlation_id = ?context.correlation_id,
                api_key_id = ?context.api_key_id,
                client_ip = ?context.client_ip,
                error = %e,
                "Deposit failed"
            ),
        }

        result
    }

    async fn try_deposit(
        &self,
        user_id: UserId,
        amount: Amount,
    ) -> Result<DepositResult, DomainError> {
        let mut tx = transaction::begin(&self.pool, DEPOSIT_ISOLATION, self.settings.timeout).await?;

        let previous = self.accounts.lock_and_read_balance(&mut tx, user_id).await?;
        let balance = self
            .accounts
            .adjust_balance(&mut tx, user_id, amount.value())
            .await?;

        transaction::commit(tx).await?;

        Ok(DepositResult {
            user_id,
            amount: amount.value(),
            previous_balance: previous.value(),
            balance: balance.value(),
        })
    }
}
