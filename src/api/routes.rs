//! API Routes
//!
//! HTTP endpoint definitions.

use std::str::FromStr;

use axum::{
    extract::{Extension, FromRequest, FromRequestParts, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::coordinator::{
    self, DepositCommand, DepositCoordinator, PurchaseCommand, PurchaseCoordinator,
};
use crate::domain::{ensure_positive_id, Asset, AssetId, DomainError, NewAsset, OperationContext, UserId};
use crate::error::{AppError, AppResult};
use crate::store::{AssetCatalog, GrantRegistry, UserDirectory};

use super::middleware::RequestUser;
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user_id: UserId,
    pub username: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub user_id: UserId,
    pub amount: Decimal,
    pub previous_balance: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateAssetRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: String,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub asset_id: AssetId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub price: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub asset_id: AssetId,
    pub user_id: UserId,
    pub granted: bool,
}

/// JSON body whose rejection becomes a structured `AppError`
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path parameters whose rejection becomes a structured `AppError`
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Parse a decimal money field sent as a string
fn parse_money(field: &str, raw: &str) -> Result<Decimal, AppError> {
    Decimal::from_str(raw.trim()).map_err(|_| {
        AppError::Domain(DomainError::InvalidAmount(format!("{} is not a decimal number: '{}'", field, raw)))
    })
}

/// Caller identity is required for every per-user endpoint
fn require_user(request_user: Option<Extension<RequestUser>>) -> Result<RequestUser, AppError> {
    request_user
        .map(|Extension(user)| user)
        .ok_or_else(|| AppError::MissingHeader("X-Request-User-Id".to_string()))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/balance", get(get_balance))
        .route("/deposits", post(deposit))
        .route("/assets", post(create_asset).get(list_own_assets))
        .route("/assets/market", get(list_market_assets))
        .route("/assets/purchased", get(list_purchased_assets))
        .route("/assets/:asset_id", get(get_asset).delete(delete_asset))
        .route("/assets/:asset_id/purchase", post(purchase_asset))
        .route("/assets/:asset_id/access", get(check_access))
}

// =========================================================================
// POST /users
// =========================================================================

/// Register a user with an empty account
async fn create_user(
    State(pool): State<PgPool>,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<CreateUserResponse>)> {
    let user = UserDirectory::new(pool).register(&request.username).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            user_id: user.id,
            username: user.username,
            balance: Decimal::ZERO,
            created_at: user.created_at,
        }),
    ))
}

// =========================================================================
// GET /balance
// =========================================================================

async fn get_balance(
    State(pool): State<PgPool>,
    request_user: Option<Extension<RequestUser>>,
) -> AppResult<Json<BalanceResponse>> {
    let user = require_user(request_user)?;
    let balance = coordinator::check_balance(&pool, user.user_id).await?;

    Ok(Json(BalanceResponse {
        user_id: user.user_id,
        balance: balance.value(),
    }))
}

// =========================================================================
// POST /deposits
// =========================================================================

/// Add funds to the caller's account
async fn deposit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    request_user: Option<Extension<RequestUser>>,
    ApiJson(request): ApiJson<DepositRequest>,
) -> AppResult<Json<DepositResponse>> {
    let user = require_user(request_user)?;
    let amount = parse_money("amount", &request.amount)?;

    let coordinator = DepositCoordinator::new(state.pool, state.tx_settings);
    let result = coordinator
        .execute(DepositCommand::new(user.user_id, amount), &context)
        .await?;

    Ok(Json(DepositResponse {
        user_id: result.user_id,
        amount: result.amount,
        previous_balance: result.previous_balance,
        balance: result.balance,
    }))
}

// =========================================================================
// Assets
// =========================================================================

/// Create an asset owned by the caller
async fn create_asset(
    State(pool): State<PgPool>,
    request_user: Option<Extension<RequestUser>>,
    ApiJson(request): ApiJson<CreateAssetRequest>,
) -> AppResult<(StatusCode, Json<Asset>)> {
    let user = require_user(request_user)?;
    let price = parse_money("price", &request.price)?;

    let new_asset = NewAsset::new(user.user_id, request.name, request.description, price)?;
    let asset = AssetCatalog::new(pool).store(&new_asset).await?;

    tracing::info!(
        asset_id = asset.id,
        owner_id = asset.owner_id,
        price = %asset.price,
        "Asset created"
    );

    Ok((StatusCode::CREATED, Json(asset)))
}

async fn list_own_assets(
    State(pool): State<PgPool>,
    request_user: Option<Extension<RequestUser>>,
) -> AppResult<Json<Vec<Asset>>> {
    let user = require_user(request_user)?;
    let assets = AssetCatalog::new(pool).list_by_owner(user.user_id).await?;
    Ok(Json(assets))
}

/// Assets available to buy: everything the caller does not own
async fn list_market_assets(
    State(pool): State<PgPool>,
    request_user: Option<Extension<RequestUser>>,
) -> AppResult<Json<Vec<Asset>>> {
    let user = require_user(request_user)?;
    let assets = AssetCatalog::new(pool).list_excluding_owner(user.user_id).await?;
    Ok(Json(assets))
}

async fn list_purchased_assets(
    State(pool): State<PgPool>,
    request_user: Option<Extension<RequestUser>>,
) -> AppResult<Json<Vec<Asset>>> {
    let user = require_user(request_user)?;
    let assets = GrantRegistry::new(pool).list_granted_assets(user.user_id).await?;
    Ok(Json(assets))
}

async fn get_asset(
    State(pool): State<PgPool>,
    ApiPath(asset_id): ApiPath<AssetId>,
) -> AppResult<Json<Asset>> {
    ensure_positive_id("asset id", asset_id)?;

    let asset = AssetCatalog::new(pool)
        .get_by_id(asset_id)
        .await?
        .ok_or(DomainError::AssetNotFound(asset_id))?;

    Ok(Json(asset))
}

/// Delete one of the caller's assets. Existing grants are kept.
async fn delete_asset(
    State(pool): State<PgPool>,
    request_user: Option<Extension<RequestUser>>,
    ApiPath(asset_id): ApiPath<AssetId>,
) -> AppResult<StatusCode> {
    let user = require_user(request_user)?;
    ensure_positive_id("asset id", asset_id)?;

    if !AssetCatalog::new(pool).erase(user.user_id, asset_id).await? {
        return Err(DomainError::AssetNotFound(asset_id).into());
    }

    tracing::info!(asset_id, owner_id = user.user_id, "Asset deleted");

    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// POST /assets/:asset_id/purchase
// =========================================================================

/// Buy access to another user's asset
async fn purchase_asset(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    request_user: Option<Extension<RequestUser>>,
    ApiPath(asset_id): ApiPath<AssetId>,
) -> AppResult<Json<PurchaseResponse>> {
    let user = require_user(request_user)?;

    let coordinator = PurchaseCoordinator::new(state.pool, state.tx_settings);
    let result = coordinator
        .execute(PurchaseCommand::new(user.user_id, asset_id), &context)
        .await?;

    Ok(Json(PurchaseResponse {
        asset_id: result.asset_id,
        buyer_id: result.buyer_id,
        seller_id: result.seller_id,
        price: result.price,
        balance: result.balance,
    }))
}

async fn check_access(
    State(pool): State<PgPool>,
    request_user: Option<Extension<RequestUser>>,
    ApiPath(asset_id): ApiPath<AssetId>,
) -> AppResult<Json<AccessResponse>> {
    let user = require_user(request_user)?;
    ensure_positive_id("asset id", asset_id)?;

    let granted = GrantRegistry::new(pool).is_granted(asset_id, user.user_id).await?;

    Ok(Json(AccessResponse {
        asset_id,
        user_id: user.user_id,
        granted,
    }))
}
