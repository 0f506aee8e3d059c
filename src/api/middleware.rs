//! API Middleware
//!
//! Authentication, caller identity and request logging middleware.

use std::net::IpAddr;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{OperationContext, UserId};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const REQUEST_USER_ID_HEADER: &str = "X-Request-User-Id";
pub const REQUEST_USERNAME_HEADER: &str = "X-Request-Username";
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Caller identity resolved by the trusted upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUser {
    pub user_id: UserId,
    pub username: Option<String>,
}

/// Hex-encoded SHA-256 of a raw API key, as stored in `api_keys.key_hash`
pub fn hash_api_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

fn reject(status: StatusCode, error: &str, error_code: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "error_code": error_code
        })),
    )
        .into_response()
}

/// Parse the caller identity headers. `Ok(None)` when no user id was sent.
pub fn parse_request_user(headers: &HeaderMap) -> Result<Option<RequestUser>, &'static str> {
    let raw_id = match headers.get(REQUEST_USER_ID_HEADER) {
        Some(value) => value.to_str().map_err(|_| "Invalid X-Request-User-Id header format")?,
        None => return Ok(None),
    };

    let user_id: UserId = raw_id
        .trim()
        .parse()
        .map_err(|_| "Invalid X-Request-User-Id header format")?;
    if user_id <= 0 {
        return Err("X-Request-User-Id must be a positive integer");
    }

    let username = headers
        .get(REQUEST_USERNAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Ok(Some(RequestUser { user_id, username }))
}

/// First address of X-Forwarded-For, if any
fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse().ok())
}

// =========================================================================
// API Key Authentication Middleware
// =========================================================================

/// Extract and validate API key from X-API-Key header
pub async fn auth_middleware(
    State(pool): State<PgPool>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let api_key = match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(key) => key,
        None => {
            return Err(reject(
                StatusCode::UNAUTHORIZED,
                "Missing X-API-Key header",
                "missing_api_key",
            ));
        }
    };

    let api_key_record: Option<(Uuid, String, bool)> = match sqlx::query_as(
        r#"
        SELECT id, name, is_active
        FROM api_keys
        WHERE key_hash = $1
        "#,
    )
    .bind(hash_api_key(api_key))
    .fetch_optional(&pool)
    .await
    {
        Ok(record) => record,
        Err(e) => {
            tracing::error!("Database error during API key validation: {}", e);
            return Err(reject(
                StatusCode::SERVICE_UNAVAILABLE,
                "Temporarily unable to complete the request, retry later",
                "store_unavailable",
            ));
        }
    };

    let (api_key_id, name, is_active) = match api_key_record {
        Some(record) => record,
        None => {
            return Err(reject(StatusCode::UNAUTHORIZED, "Invalid API key", "invalid_api_key"));
        }
    };

    if !is_active {
        return Err(reject(
            StatusCode::UNAUTHORIZED,
            "API key is disabled",
            "api_key_disabled",
        ));
    }

    tracing::debug!(api_key_id = %api_key_id, api_key_name = %name, "API key authenticated");

    // Endpoints acting on behalf of a user check for the RequestUser extension
    let request_user = match parse_request_user(&headers) {
        Ok(user) => user,
        Err(message) => {
            return Err(reject(StatusCode::BAD_REQUEST, message, "invalid_user_id"));
        }
    };

    let correlation_id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new()
        .with_api_key(api_key_id)
        .with_correlation_id(correlation_id);
    if let Some(ip) = forwarded_client_ip(&headers) {
        context = context.with_client_ip(ip);
    }
    if let Some(user) = request_user {
        context = context.with_request_user(user.user_id);
        request.extensions_mut().insert(user);
    }

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            correlation_id = ?correlation_id,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            correlation_id = ?correlation_id,
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("x-api-key", "secret-key-12345".parse().unwrap());
        headers.insert("x-request-user-id", "42".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let api_key = masked.iter().find(|(k, _)| k == "x-api-key");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let user_id = masked.iter().find(|(k, _)| k == "x-request-user-id");

        assert_eq!(api_key.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(user_id.unwrap().1, "42");
    }

    #[test]
    fn test_sensitive_headers_list() {
        assert!(SENSITIVE_HEADERS.contains(&"x-api-key"));
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(!SENSITIVE_HEADERS.contains(&"content-type"));
    }

    #[test]
    fn test_hash_api_key_is_sha256_hex() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parse_request_user() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_request_user(&headers), Ok(None));

        headers.insert("x-request-user-id", " 7 ".parse().unwrap());
        headers.insert("x-request-username", "alice".parse().unwrap());
        assert_eq!(
            parse_request_user(&headers),
            Ok(Some(RequestUser { user_id: 7, username: Some("alice".to_string()) }))
        );

        headers.insert("x-request-user-id", "0".parse().unwrap());
        assert!(parse_request_user(&headers).is_err());

        headers.insert("x-request-user-id", "not-a-number".parse().unwrap());
        assert!(parse_request_user(&headers).is_err());
    }

    #[test]
    fn test_forwarded_client_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(forwarded_client_ip(&headers), "203.0.113.7".parse().ok());
    }
}
