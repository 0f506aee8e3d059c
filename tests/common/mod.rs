//! Common test utilities
#![allow(dead_code)]

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use asset_market::api::middleware::hash_api_key;
use asset_market::domain::{Asset, NewAsset, User, UserId};
use asset_market::store::{AssetCatalog, UserDirectory};
use asset_market::{db, DepositCommand, DepositCoordinator, OperationContext, TransactionSettings};

pub const TEST_API_KEY: &str = "test_key_123";

/// Connect, migrate and seed the test API key.
///
/// Returns `None` when DATABASE_URL is not set so database tests can be
/// skipped on machines without PostgreSQL.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping database test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    db::run_migrations(&pool).await.expect("Failed to run migrations");

    sqlx::query(
        r#"
        INSERT INTO api_keys (id, name, key_hash, is_active)
        VALUES ($1, $2, $3, true)
        ON CONFLICT (key_hash) DO NOTHING
        "#,
    )
    .bind(uuid::Uuid::new_v4())
    .bind("Test Key")
    .bind(hash_api_key(TEST_API_KEY))
    .execute(&pool)
    .await
    .expect("Failed to seed API key");

    Some(pool)
}

/// Fast settings for tests; conflicts are still retried
pub fn test_settings() -> TransactionSettings {
    TransactionSettings {
        max_attempts: 5,
        ..TransactionSettings::default()
    }
}

/// Unique username so tests never collide across runs
pub fn unique_username(prefix: &str) -> String {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &tag[..12])
}

pub async fn register_user(pool: &PgPool, prefix: &str) -> User {
    UserDirectory::new(pool.clone())
        .register(&unique_username(prefix))
        .await
        .expect("Failed to register user")
}

pub async fn fund(pool: &PgPool, user_id: UserId, amount: Decimal) {
    DepositCoordinator::new(pool.clone(), test_settings())
        .execute(DepositCommand::new(user_id, amount), &OperationContext::new())
        .await
        .expect("Failed to fund account");
}

pub async fn create_asset(pool: &PgPool, owner_id: UserId, price: Decimal) -> Asset {
    let new_asset = NewAsset::new(owner_id, "test asset".to_string(), None, price)
        .expect("Invalid test asset");
    AssetCatalog::new(pool.clone())
        .store(&new_asset)
        .await
        .expect("Failed to store asset")
}
