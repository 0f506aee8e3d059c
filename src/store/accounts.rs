//! Account Store
//!
//! Holds each user's balance. Every balance write is a server-side
//! read-modify-write on a locked row, never a value computed by the client.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Balance, DomainError, UserId};

/// Store for account balances
#[derive(Debug, Clone)]
pub struct AccountStore {
    pool: PgPool,
}

impl AccountStore {
    /// Create a new AccountStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open an account with a zero balance for a freshly registered user
    pub async fn open(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> Result<(), DomainError> {
        sqlx::query("INSERT INTO accounts (user_id, balance) VALUES ($1, 0)")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    // =========================================================================
    // lock_and_read_balance
    // =========================================================================

    /// Read the balance while taking an exclusive row lock.
    ///
    /// Concurrent debits and deposits on the same account block here until
    /// the holder's transaction ends.
    pub async fn lock_and_read_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> Result<Balance, DomainError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT balance FROM accounts
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        let balance = balance.ok_or(DomainError::AccountNotFound(user_id))?;
        stored_balance(user_id, balance)
    }

    // =========================================================================
    // adjust_balance
    // =========================================================================

    /// Apply `balance += delta` and return the resulting balance.
    ///
    /// The update only matches when the result stays non-negative, so the
    /// sufficiency check and the write happen in one locked statement.
    pub async fn adjust_balance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
        delta: Decimal,
    ) -> Result<Balance, DomainError> {
        let updated: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance = balance + $2, updated_at = NOW()
            WHERE user_id = $1 AND balance + $2 >= 0
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(balance) = updated {
            return stored_balance(user_id, balance);
        }

        // Nothing matched: either the account is missing or the debit is too large
        let available: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut **tx)
                .await?;

        match available {
            None => Err(DomainError::AccountNotFound(user_id)),
            Some(available) => Err(DomainError::insufficient_funds(-delta, available)),
        }
    }

    // =========================================================================
    // read_balance
    // =========================================================================

    /// Lock-free read for balance checks
    pub async fn read_balance(&self, user_id: UserId) -> Result<Balance, DomainError> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let balance = balance.ok_or(DomainError::AccountNotFound(user_id))?;
        stored_balance(user_id, balance)
    }
}

fn stored_balance(user_id: UserId, value: Decimal) -> Result<Balance, DomainError> {
    Balance::new(value).map_err(|e| {
        tracing::error!(user_id, %value, "Stored balance violates invariant");
        DomainError::TransactionFailed(format!("invalid stored balance for user {}: {}", user_id, e))
    })
}
