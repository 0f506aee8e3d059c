//! User Directory
//!
//! Registration creates the user row and its zero-balance account together.

use sqlx::PgPool;

use crate::domain::{DomainError, User};

use super::error::is_unique_violation;
use super::AccountStore;

const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct UserDirectory {
    pool: PgPool,
    accounts: AccountStore,
}

impl UserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            accounts: AccountStore::new(pool.clone()),
            pool,
        }
    }

    /// Register a user and open their account with a zero balance
    pub async fn register(&self, username: &str) -> Result<User, DomainError> {
        let username = validate_username(username)?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username)
            VALUES ($1)
            RETURNING id, username, created_at
            "#,
        )
        .bind(&username)
        .fetch_one(&mut *tx)
        .await;

        let user = match inserted {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                return Err(DomainError::AlreadyExists(format!("username '{}'", username)));
            }
            Err(e) => return Err(e.into()),
        };

        self.accounts.open(&mut tx, user.id).await?;

        tx.commit().await?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");

        Ok(user)
    }

}

fn validate_username(username: &str) -> Result<String, DomainError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(DomainError::InvalidInput("username must not be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(DomainError::InvalidInput(format!(
            "username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(username.to_string())
}
