//! Purchase Grant Registry
//!
//! Records which users have paid for which assets. The `(asset_id, user_id)`
//! primary key is the storage-level guarantee of at most one grant per pair.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Asset, AssetId, DomainError, UserId};

#[derive(Debug, Clone)]
pub struct GrantRegistry {
    pool: PgPool,
}

impl GrantRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the grant unless it already exists.
    ///
    /// Returns `false` when the pair was already granted. This is a single
    /// conflict-ignoring insert, so there is no window between the existence
    /// check and the write.
    pub async fn grant_if_absent(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        asset_id: AssetId,
        user_id: UserId,
        price_paid: Decimal,
    ) -> Result<bool, DomainError> {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO purchase_grants (asset_id, user_id, price_paid)
            VALUES ($1, $2, $3)
            ON CONFLICT (asset_id, user_id) DO NOTHING
            "#,
        )
        .bind(asset_id)
        .bind(user_id)
        .bind(price_paid)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    pub async fn is_granted(&self, asset_id: AssetId, user_id: UserId) -> Result<bool, DomainError> {
        let granted: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM purchase_grants WHERE asset_id = $1 AND user_id = $2)",
        )
        .bind(asset_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(granted)
    }

    /// Assets the user has purchased access to. Grants for assets deleted by
    /// their owner are kept but no longer listed.
    pub async fn list_granted_assets(&self, user_id: UserId) -> Result<Vec<Asset>, DomainError> {
        let assets = sqlx::query_as::<_, Asset>(
            r#"
            SELECT a.id, a.name, a.description, a.price, a.owner_id
            FROM purchase_grants g
            JOIN assets a ON a.id = g.asset_id
            WHERE g.user_id = $1
            ORDER BY g.granted_at, a.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assets)
    }
}
