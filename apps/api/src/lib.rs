//! # Stockroom API
//!
//! HTTP boundary for the stock ledger and the storefront order flow.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Stockroom API                                 │
//! │                                                                         │
//! │  Gateway ──► axum Router ──► TraceLayer ──► handler                     │
//! │                                               │                         │
//! │              OperatorContext / CustomerContext│(headers)                │
//! │                                               ▼                         │
//! │                            StockLedger / CheckoutService / Repos        │
//! │                                               │                         │
//! │                                               ▼                         │
//! │                                          SQLite (WAL)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `STOCKROOM_BIND_ADDR` - listen address (default: 0.0.0.0:8080)
//! - `STOCKROOM_DB_PATH` - SQLite file (default: stockroom.db)
//! - `STOCKROOM_DB_MAX_CONNECTIONS` - pool size (default: 5)
//! - `STOCKROOM_FREE_SHIPPING_THRESHOLD` - cents (default: 100)
//! - `STOCKROOM_SHIPPING_FEE` - cents (default: 1000)
//! - `STOCKROOM_ORDER_PREFIX` / `STOCKROOM_OPERATION_PREFIX` - number prefixes
//! - `STOCKROOM_PAY_CALLBACK_SECRET` - gateway secret for `/api/pay/callback`
//!   (unset: callbacks are refused)
//! - `RUST_LOG` - log filter (default: info,stockroom_api=debug,stockroom_db=debug,sqlx=warn)

use axum::Router;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

// Re-exports
pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ApiResponse};
pub use state::AppState;

/// Builds the application with request tracing.
pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
