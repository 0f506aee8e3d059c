//! Store error classification
//!
//! Maps `sqlx::Error` onto the domain taxonomy so coordinators can decide
//! between rejecting, retrying and reporting the store as unavailable.

use crate::domain::DomainError;

/// PostgreSQL SQLSTATE codes the stores care about
pub mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const QUERY_CANCELED: &str = "57014";
}

/// SQLSTATE of a database error, if the error came from the server
pub fn sql_state(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    sql_state(err).as_deref() == Some(sqlstate::UNIQUE_VIOLATION)
}

pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sql_state(err).as_deref() == Some(sqlstate::FOREIGN_KEY_VIOLATION)
}

/// Classify a storage error.
///
/// - serialization failure / deadlock → `Conflict` (rolled back, re-runnable)
/// - lock or statement timeout → `TransactionFailed`
/// - connection-level failure → `StoreUnavailable`
/// - anything else → `TransactionFailed`
pub fn classify(err: &sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db.code().as_deref() {
                Some(sqlstate::SERIALIZATION_FAILURE) | Some(sqlstate::DEADLOCK_DETECTED) => {
                    DomainError::Conflict(message)
                }
                Some(sqlstate::LOCK_NOT_AVAILABLE) | Some(sqlstate::QUERY_CANCELED) => {
                    DomainError::TransactionFailed(format!("timed out: {}", message))
                }
                Some(sqlstate::CHECK_VIOLATION) => {
                    DomainError::TransactionFailed(format!("constraint rejected write: {}", message))
                }
                _ => DomainError::TransactionFailed(message),
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DomainError::StoreUnavailable(err.to_string()),
        _ => DomainError::TransactionFailed(err.to_string()),
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        let classified = classify(&err);
        if matches!(classified, DomainError::StoreUnavailable(_)) {
            tracing::error!(error = %err, "Store unavailable");
        }
        classified
    }
}
