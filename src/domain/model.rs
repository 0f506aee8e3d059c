//! Marketplace records
//!
//! Rows as the stores hand them out. Accounts are never represented as
//! shared in-memory objects; only ids cross the coordinator boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DomainError, Price};

pub type UserId = i64;
pub type AssetId = i64;

/// Registered user
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Asset listed in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub owner_id: UserId,
}

/// Validated asset awaiting insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewAsset {
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub price: Price,
}

impl NewAsset {
    pub fn new(
        owner_id: UserId,
        name: String,
        description: Option<String>,
        price: Decimal,
    ) -> Result<Self, DomainError> {
        ensure_positive_id("owner id", owner_id)?;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::InvalidInput("asset name must not be empty".to_string()));
        }

        Ok(Self {
            owner_id,
            name,
            description: description.unwrap_or_default(),
            price: Price::new(price)?,
        })
    }
}

/// Reject zero and negative ids before they reach the store.
pub fn ensure_positive_id(kind: &str, id: i64) -> Result<(), DomainError> {
    if id <= 0 {
        return Err(DomainError::InvalidInput(format!("{kind} must be positive (got {id})")));
    }
    Ok(())
}
