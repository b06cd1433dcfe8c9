//! # API Errors and Response Envelope
//!
//! Every response body has the same shape:
//!
//! ```json
//! { "code": 0, "message": "ok", "data": { ... } }
//! ```
//!
//! Failures carry a negative `code`, a message and no `data`.
//!
//! ## Code Table
//!
//! | code | HTTP | meaning |
//! |------|------|---------|
//! |  0   | 200  | success |
//! | -1   | 400  | malformed or invalid input, total or paid amount mismatch |
//! | -2   | 401  | missing or malformed gateway headers, bad callback secret |
//! | -3   | 403  | cross-shop access |
//! | -4   | 404  | product / order / operation / address / cart row not found |
//! | -5   | 409  | insufficient stock, order or payment state conflict |
//! | -6   | 501  | refund of a paid order |
//! | -7   | 503  | database busy, safe to retry |
//! | -9   | 500  | internal error (details only in the log) |

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use stockroom_core::CoreError;
use stockroom_db::DbError;
use tracing::{error, warn};

pub const CODE_OK: i32 = 0;
pub const CODE_INVALID: i32 = -1;
pub const CODE_UNAUTHORIZED: i32 = -2;
pub const CODE_FORBIDDEN: i32 = -3;
pub const CODE_NOT_FOUND: i32 = -4;
pub const CODE_CONFLICT: i32 = -5;
pub const CODE_NOT_IMPLEMENTED: i32 = -6;
pub const CODE_UNAVAILABLE: i32 = -7;
pub const CODE_INTERNAL: i32 = -9;

/// Response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// One page of a list plus the unpaged count.
#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// Errors a handler can return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Gateway headers missing or unparsable.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Body, query or path did not bind.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Db(DbError::Domain(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    /// HTTP status, envelope code and client-facing message.
    fn parts(&self) -> (StatusCode, i32, String) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, CODE_UNAUTHORIZED, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, CODE_INVALID, self.to_string()),
            ApiError::Unavailable(msg) => {
                warn!(error = %msg, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, CODE_UNAVAILABLE, self.to_string())
            }
            ApiError::Db(DbError::Domain(domain)) => domain_parts(domain),
            ApiError::Db(db) => db_parts(db),
        }
    }
}

fn domain_parts(err: &CoreError) -> (StatusCode, i32, String) {
    let (status, code) = match err {
        CoreError::Validation(_)
        | CoreError::TotalMismatch { .. }
        | CoreError::NotOutbound { .. }
        | CoreError::InvalidPaymentStatus(_)
        | CoreError::PaymentAmountMismatch { .. } => (StatusCode::BAD_REQUEST, CODE_INVALID),

        CoreError::CrossShopAccess { .. } => (StatusCode::FORBIDDEN, CODE_FORBIDDEN),

        CoreError::ProductNotFound(_)
        | CoreError::OperationNotFound(_)
        | CoreError::OrderNotFound(_)
        | CoreError::AddressNotFound(_)
        | CoreError::CartItemNotFound(_) => (StatusCode::NOT_FOUND, CODE_NOT_FOUND),

        CoreError::InsufficientStock { .. }
        | CoreError::InvalidOrderStatus { .. }
        | CoreError::InvalidPaymentTransition { .. } => (StatusCode::CONFLICT, CODE_CONFLICT),

        CoreError::RefundNotImplemented { .. } => (StatusCode::NOT_IMPLEMENTED, CODE_NOT_IMPLEMENTED),
    };
    (status, code, err.to_string())
}

fn db_parts(err: &DbError) -> (StatusCode, i32, String) {
    match err {
        DbError::NotFound { .. } => (StatusCode::NOT_FOUND, CODE_NOT_FOUND, err.to_string()),
        DbError::UniqueViolation { .. } => (StatusCode::CONFLICT, CODE_CONFLICT, err.to_string()),
        DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => {
            warn!(error = %err, "Constraint rejected write");
            (StatusCode::BAD_REQUEST, CODE_INVALID, "Request violates a data constraint".to_string())
        }
        _ if err.is_retryable() => {
            warn!(error = %err, "Database busy, transaction rolled back");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                CODE_UNAVAILABLE,
                "Database busy, please retry".to_string(),
            )
        }
        _ => {
            error!(target: "database", error = %err, "Database error occurred");
            (StatusCode::INTERNAL_SERVER_ERROR, CODE_INTERNAL, "Internal server error".to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = Json(ApiResponse::<()> {
            code,
            message,
            data: None,
        });
        (status, body).into_response()
    }
}

/// Wraps `data` in a success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: CODE_OK,
        message: "ok".to_string(),
        data: Some(data),
    })
}
