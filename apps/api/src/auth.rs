//! Caller context extracted from gateway headers.
//!
//! Authentication happens in front of this service. The gateway forwards
//! the resolved identity as plain headers, and these extractors only parse
//! them:
//!
//! ```text
//! admin routes      X-Operator-Id, X-Operator-Name, X-Shop-Id, X-Operator-Root
//! customer routes   X-User-Id
//! pay callback      X-Gateway-Secret (compared with the configured secret)
//! ```
//!
//! A missing or malformed header rejects the request with `-2` before the
//! handler runs.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use stockroom_core::Operator;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

pub const OPERATOR_ID_HEADER: &str = "x-operator-id";
pub const OPERATOR_NAME_HEADER: &str = "x-operator-name";
pub const SHOP_ID_HEADER: &str = "x-shop-id";
pub const OPERATOR_ROOT_HEADER: &str = "x-operator-root";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";

/// Back-office operator making an admin call.
#[derive(Debug, Clone)]
pub struct OperatorContext(pub Operator);

/// Storefront customer making an order or cart call.
#[derive(Debug, Clone, Copy)]
pub struct CustomerContext {
    pub user_id: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for OperatorContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let operator_id = positive_id(headers, OPERATOR_ID_HEADER)?;
        let shop_id = positive_id(headers, SHOP_ID_HEADER)?;
        let name = header_str(headers, OPERATOR_NAME_HEADER).unwrap_or_default();
        let is_root = matches!(
            header_str(headers, OPERATOR_ROOT_HEADER).as_deref(),
            Some("1") | Some("true")
        );

        debug!(operator_id, shop_id, is_root, "Operator context resolved");

        Ok(OperatorContext(Operator::new(operator_id, name, shop_id, is_root)))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CustomerContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = positive_id(&parts.headers, USER_ID_HEADER)?;
        Ok(CustomerContext { user_id })
    }
}

/// Payment gateway relaying a callback, proven by the shared secret.
#[derive(Debug, Clone, Copy)]
pub struct GatewayContext;

#[async_trait]
impl FromRequestParts<AppState> for GatewayContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.pay_callback_secret.as_deref() else {
            warn!("Payment callback refused, no gateway secret configured");
            return Err(ApiError::Unauthorized("payment callback disabled".to_string()));
        };

        let supplied = header_str(&parts.headers, GATEWAY_SECRET_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {GATEWAY_SECRET_HEADER} header")))?;

        if !bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
            warn!("Payment callback with wrong gateway secret");
            return Err(ApiError::Unauthorized("invalid gateway secret".to_string()));
        }

        Ok(GatewayContext)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn positive_id(headers: &HeaderMap, name: &str) -> Result<i64, ApiError> {
    let raw = header_str(headers, name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?;
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::Unauthorized(format!("malformed {name} header")))
}
