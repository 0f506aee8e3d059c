//! Asset Catalog
//!
//! Asset rows and the purchase-time row lock on them.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Asset, AssetId, DomainError, NewAsset, UserId};

use super::error::is_foreign_key_violation;

/// Price and owner observed under the asset row lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct PurchaseTerms {
    pub price: Decimal,
    pub owner_id: UserId,
}

/// Store for catalog assets
#[derive(Debug, Clone)]
pub struct AssetCatalog {
    pool: PgPool,
}

impl AssetCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock the asset row for the rest of the transaction and read its terms.
    ///
    /// A second purchaser of the same asset blocks here until the first
    /// transaction commits or rolls back.
    pub async fn lock_and_read_for_purchase(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        asset_id: AssetId,
    ) -> Result<PurchaseTerms, DomainError> {
        let terms: Option<PurchaseTerms> = sqlx::query_as(
            r#"
            SELECT price, owner_id FROM assets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(asset_id)
        .fetch_optional(&mut **tx)
        .await?;

        terms.ok_or(DomainError::AssetNotFound(asset_id))
    }

    /// Insert a new asset and return the stored row
    pub async fn store(&self, asset: &NewAsset) -> Result<Asset, DomainError> {
        let stored = sqlx::query_as::<_, Asset>(
            r#"
            INSERT INTO assets (name, description, price, owner_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, description, price, owner_id
            "#,
        )
        .bind(&asset.name)
        .bind(&asset.description)
        .bind(asset.price.value())
        .bind(asset.owner_id)
        .fetch_one(&self.pool)
        .await;

        match stored {
            Ok(asset) => Ok(asset),
            Err(e) if is_foreign_key_violation(&e) => Err(DomainError::AccountNotFound(asset.owner_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an asset owned by `owner_id`. Returns false when no such asset
    /// belongs to that owner.
    pub async fn erase(&self, owner_id: UserId, asset_id: AssetId) -> Result<bool, DomainError> {
        let rows_affected = sqlx::query("DELETE FROM assets WHERE id = $1 AND owner_id = $2")
            .bind(asset_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Asset>, DomainError> {
        let assets = sqlx::query_as::<_, Asset>(
            r#"
            SELECT id, name, description, price, owner_id
            FROM assets
            WHERE owner_id = $1
            ORDER BY id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assets)
    }

    /// Assets a user could buy: everything not owned by them
    pub async fn list_excluding_owner(&self, user_id: UserId) -> Result<Vec<Asset>, DomainError> {
        let assets = sqlx::query_as::<_, Asset>(
            r#"
            SELECT id, name, description, price, owner_id
            FROM assets
            WHERE owner_id <> $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assets)
    }

    pub async fn get_by_id(&self, asset_id: AssetId) -> Result<Option<Asset>, DomainError> {
        let asset = sqlx::query_as::<_, Asset>(
            "SELECT id, name, description, price, owner_id FROM assets WHERE id = $1",
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(asset)
    }
}
