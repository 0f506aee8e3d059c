//! Operation Context
//!
//! Contains metadata about the current operation for tracing.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::UserId;

/// Context for an operation, carried from the HTTP edge into the coordinators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// API key ID used for this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<Uuid>,

    /// Caller resolved from X-Request-User-Id by the upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_user_id: Option<UserId>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            api_key_id: None,
            request_user_id: None,
            correlation_id: None,
            client_ip: None,
        }
    }

    /// Create context with API key
    pub fn with_api_key(mut self, api_key_id: Uuid) -> Self {
        self.api_key_id = Some(api_key_id);
        self
    }

    /// Create context with request user ID
    pub fn with_request_user(mut self, user_id: UserId) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with client IP
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let api_key_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let context = OperationContext::new()
            .with_api_key(api_key_id)
            .with_request_user(42)
            .with_correlation_id(correlation_id)
            .with_client_ip("203.0.113.7".parse().unwrap());

        assert_eq!(context.api_key_id, Some(api_key_id));
        assert_eq!(context.client_ip, "203.0.113.7".parse().ok());
        assert_eq!(context.request_user_id, Some(42));
        assert_eq!(context.correlation_id, Some(correlation_id));
    }

    #[test]
    fn test_empty_fields_are_not_serialized() {
        let json = serde_json::to_value(OperationContext::new().with_request_user(7)).unwrap();
        assert_eq!(json, serde_json::json!({ "request_user_id": 7 }));
    }
}
