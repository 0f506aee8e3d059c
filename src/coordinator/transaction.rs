//! Transaction plumbing shared by the coordinators
//!
//! Opening a transaction at a chosen isolation level, bounding how long it
//! may wait on row locks, and re-running it after a serialization conflict.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::Config;
use crate::domain::DomainError;
use crate::store::error::classify;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(format!("unknown isolation level: {}", other)),
        }
    }
}

/// Per-coordinator transaction settings
#[derive(Debug, Clone)]
pub struct TransactionSettings {
    /// Isolation used by purchases
    pub isolation: IsolationLevel,
    /// Deadline for one attempt, also applied as the server-side lock_timeout
    pub timeout: Duration,
    /// Attempts made when the store reports a serialization conflict
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl TransactionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            isolation: config.purchase_isolation,
            timeout: config.transaction_timeout,
            max_attempts: config.transaction_max_attempts.max(1),
            ..Self::default()
        }
    }
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::RepeatableRead,
            timeout: Duration::from_secs(5),
            max_attempts: 5,
            retry_base_delay: Duration::from_millis(50),
        }
    }
}

/// Open a transaction at `isolation` whose lock waits give up after `lock_timeout`
pub async fn begin(
    pool: &PgPool,
    isolation: IsolationLevel,
    lock_timeout: Duration,
) -> Result<Transaction<'static, Postgres>, DomainError> {
    let mut tx = pool.begin().await?;

    // Must be the first statement of the transaction
    let set_isolation = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());
    sqlx::query(&set_isolation).execute(&mut *tx).await?;

    let set_lock_timeout = format!("SET LOCAL lock_timeout = {}", lock_timeout.as_millis().max(1));
    sqlx::query(&set_lock_timeout).execute(&mut *tx).await?;

    Ok(tx)
}

/// Commit, keeping serialization failures retryable (the server rolled back)
/// and reporting anything else as a failed transaction.
pub async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), DomainError> {
    tx.commit().await.map_err(|e| match classify(&e) {
        conflict @ DomainError::Conflict(_) => conflict,
        _ => {
            tracing::error!(error = %e, "Commit failed");
            DomainError::TransactionFailed(format!("commit failed: {}", e))
        }
    })
}

/// Roll back explicitly and hand back the error that caused it
pub async fn abort(tx: Transaction<'_, Postgres>, cause: DomainError) -> DomainError {
    if let Err(e) = tx.rollback().await {
        // The connection discards the transaction when it returns to the pool
        tracing::warn!(error = %e, cause = %cause, "Explicit rollback failed");
    }
    cause
}

// =========================================================================
// run_with_retry
// =========================================================================

/// Run `attempt` under the configured deadline, re-running it while the store
/// reports a serialization conflict.
///
/// Only `Conflict` is retried: the server has already rolled that attempt
/// back, so re-running cannot apply an effect twice. A timed-out attempt is
/// dropped, which rolls its transaction back, and is surfaced as
/// `TransactionFailed` without retrying.
pub async fn run_with_retry<T, F, Fut>(
    settings: &TransactionSettings,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, DomainError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt_no = 1;

    loop {
        let outcome = match tokio::time::timeout(settings.timeout, attempt(attempt_no)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    operation,
                    attempt = attempt_no,
                    timeout_ms = settings.timeout.as_millis() as u64,
                    "Transaction deadline exceeded, rolled back"
                );
                Err(DomainError::TransactionFailed(format!(
                    "{} timed out after {}ms",
                    operation,
                    settings.timeout.as_millis()
                )))
            }
        };

        match outcome {
            Err(DomainError::Conflict(reason)) if attempt_no < max_attempts => {
                let delay = backoff(settings.retry_base_delay, attempt_no);
                tracing::warn!(
                    operation,
                    attempt = attempt_no,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Transaction conflict, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt_no += 1;
            }
            Err(DomainError::Conflict(reason)) => {
                return Err(DomainError::TransactionFailed(format!(
                    "{} gave up after {} attempts: {}",
                    operation, attempt_no, reason
                )));
            }
            other => return other,
        }
    }
}

/// Linear backoff with jitter so colliding retries spread out
fn backoff(base: Duration, attempt: u32) -> Duration {
    let jitter_ceiling = (base.as_millis() as u64 / 2).max(1);
    let jitter = rand::thread_rng().gen_range(0..jitter_ceiling);
    base * attempt + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_settings(max_attempts: u32) -> TransactionSettings {
        TransactionSettings {
            max_attempts,
            retry_base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
            ..TransactionSettings::default()
        }
    }

    #[test]
    fn test_isolation_level_parsing() {
        assert_eq!(
            "read_committed".parse::<IsolationLevel>(),
            Ok(IsolationLevel::ReadCommitted)
        );
        assert_eq!(
            "Repeatable Read".parse::<IsolationLevel>(),
            Ok(IsolationLevel::RepeatableRead)
        );
        assert_eq!(
            "SERIALIZABLE".parse::<IsolationLevel>(),
            Ok(IsolationLevel::Serializable)
        );
        assert!("snapshot".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = TransactionSettings::default();
        assert_eq!(settings.isolation, IsolationLevel::RepeatableRead);
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let base = Duration::from_millis(50);
        let first = backoff(base, 1);
        let third = backoff(base, 3);
        assert!(first >= base && first < base * 2);
        assert!(third >= base * 3);
    }

    #[tokio::test]
    async fn test_conflict_is_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(&fast_settings(3), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(DomainError::Conflict("could not serialize access".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_conflict_exhaustion_becomes_transaction_failed() {
        let result: Result<(), _> = run_with_retry(&fast_settings(2), "purchase", |_| async {
            Err(DomainError::Conflict("deadlock detected".to_string()))
        })
        .await;

        match result {
            Err(DomainError::TransactionFailed(msg)) => assert!(msg.contains("2 attempts")),
            other => panic!("expected TransactionFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&fast_settings(5), "purchase", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DomainError::AlreadyPurchased { asset_id: 1, user_id: 2 }) }
        })
        .await;

        assert!(matches!(result, Err(DomainError::AlreadyPurchased { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_exceeded_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&fast_settings(3), "deposit", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;

        match result {
            Err(DomainError::TransactionFailed(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected TransactionFailed, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
