//! API Integration Tests

use std::str::FromStr;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use asset_market::api::{build_app, AppState};

mod common;

use common::TEST_API_KEY;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn post(uri: &str, user_id: Option<i64>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-API-Key", TEST_API_KEY);
    if let Some(id) = user_id {
        builder = builder.header("X-Request-User-Id", id.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user_id: i64) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("X-API-Key", TEST_API_KEY)
        .header("X-Request-User-Id", user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal encoded as string")).unwrap()
}

async fn register(app: &Router, prefix: &str) -> i64 {
    let username = common::unique_username(prefix);
    let (status, json) = send(app, post("/api/v1/users", None, json!({ "username": username }))).await;
    assert_eq!(status, StatusCode::CREATED, "registration failed: {}", json);
    assert_eq!(decimal(&json["balance"]), dec!(0));
    json["user_id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_purchase_e2e() {
    let Some(pool) = common::setup_test_db().await else { return };
    let app = build_app(AppState::new(pool.clone(), common::test_settings()), false);

    let buyer = register(&app, "u1").await;
    let seller = register(&app, "u2").await;

    // Fund the buyer
    let (status, json) = send(&app, post("/api/v1/deposits", Some(buyer), json!({ "amount": "200" }))).await;
    assert_eq!(status, StatusCode::OK, "deposit failed: {}", json);
    assert_eq!(decimal(&json["balance"]), dec!(200));

    // Seller lists an asset
    let (status, asset) = send(
        &app,
        post(
            "/api/v1/assets",
            Some(seller),
            json!({ "name": "Vintage lamp", "description": "brass", "price": "150.00" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "asset creation failed: {}", asset);
    let asset_id = asset["id"].as_i64().unwrap();

    // Visible on the buyer's market, not on the seller's
    let (_, market) = send(&app, get("/api/v1/assets/market", buyer)).await;
    assert!(market.as_array().unwrap().iter().any(|a| a["id"] == asset_id));
    let (_, own_market) = send(&app, get("/api/v1/assets/market", seller)).await;
    assert!(!own_market.as_array().unwrap().iter().any(|a| a["id"] == asset_id));

    // Purchase
    let purchase_uri = format!("/api/v1/assets/{}/purchase", asset_id);
    let (status, json) = send(&app, post(&purchase_uri, Some(buyer), json!({}))).await;
    assert_eq!(status, StatusCode::OK, "purchase failed: {}", json);
    assert_eq!(decimal(&json["balance"]), dec!(50));
    assert_eq!(json["seller_id"], seller);

    // Repeat purchase
    let (status, json) = send(&app, post(&purchase_uri, Some(buyer), json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error_code"], "already_purchased");

    // Self purchase
    let (status, json) = send(&app, post(&purchase_uri, Some(seller), json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error_code"], "self_purchase_forbidden");

    // Access and purchased list
    let (status, json) = send(&app, get(&format!("/api/v1/assets/{}/access", asset_id), buyer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["granted"], true);

    let (_, purchased) = send(&app, get("/api/v1/assets/purchased", buyer)).await;
    assert_eq!(purchased.as_array().unwrap().len(), 1);
    assert_eq!(purchased[0]["id"], asset_id);

    // Deposits after the purchase
    let (status, json) = send(&app, post("/api/v1/deposits", Some(buyer), json!({ "amount": "-5" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "invalid_amount");

    let (status, json) = send(&app, post("/api/v1/deposits", Some(buyer), json!({ "amount": "25" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&json["balance"]), dec!(75));

    let (status, json) = send(&app, get("/api/v1/balance", buyer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&json["balance"]), dec!(75));
}

#[tokio::test]
async fn test_insufficient_funds_and_asset_deletion() {
    let Some(pool) = common::setup_test_db().await else { return };
    let app = build_app(AppState::new(pool.clone(), common::test_settings()), false);

    let buyer = register(&app, "broke").await;
    let seller = register(&app, "seller").await;

    let (_, asset) = send(&app, post("/api/v1/assets", Some(seller), json!({ "name": "Map", "price": "20" }))).await;
    let asset_id = asset["id"].as_i64().unwrap();

    let (status, json) = send(&app, post(&format!("/api/v1/assets/{}/purchase", asset_id), Some(buyer), json!({}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "insufficient_funds");

    // Only the owner can delete
    let delete = |user_id: i64| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/assets/{}", asset_id))
            .header("X-API-Key", TEST_API_KEY)
            .header("X-Request-User-Id", user_id.to_string())
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = send(&app, delete(buyer)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, delete(seller)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(&app, get(&format!("/api/v1/assets/{}", asset_id), buyer)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error_code"], "asset_not_found");

    let (status, json) = send(&app, get("/api/v1/assets", seller)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_authentication_and_identity_headers() {
    let Some(pool) = common::setup_test_db().await else { return };
    let app = build_app(AppState::new(pool.clone(), common::test_settings()), false);

    // Missing API key
    let request = Request::builder()
        .uri("/api/v1/balance")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "missing_api_key");

    // Unknown API key
    let request = Request::builder()
        .uri("/api/v1/balance")
        .header("X-API-Key", "not-a-real-key")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error_code"], "invalid_api_key");

    // Missing caller identity
    let request = Request::builder()
        .uri("/api/v1/balance")
        .header("X-API-Key", TEST_API_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "missing_header");

    // Malformed caller identity
    let request = Request::builder()
        .uri("/api/v1/balance")
        .header("X-API-Key", TEST_API_KEY)
        .header("X-Request-User-Id", "alice")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "invalid_user_id");

    // Health checks need no key
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["database"], "ok");
}
