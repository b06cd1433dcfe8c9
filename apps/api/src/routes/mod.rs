//! # HTTP Routes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  /health                                   public                       │
//! │                                                                         │
//! │  /api/admin/stock/...      OperatorContext  StockLedger                 │
//! │  /api/order/...            CustomerContext  CheckoutService             │
//! │  /api/cart/...             CustomerContext  CartRepository              │
//! │  /api/pay/callback         gateway relay    CheckoutService             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers bind the request, resolve the caller and hand over to a
//! service; no business rule lives here.

use axum::Router;
use stockroom_core::validation::Page;

use crate::error::Paged;
use crate::state::AppState;

pub mod cart;
pub mod health;
pub mod order;
pub mod pay;
pub mod stock;

/// All routes, without state.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/admin/stock", stock::router())
        .nest("/api/order", order::router())
        .nest("/api/cart", cart::router())
        .nest("/api/pay", pay::router())
}

pub(crate) fn paged<T>((items, total): (Vec<T>, i64), page: Page) -> Paged<T> {
    Paged {
        items,
        total,
        page: page.page,
        page_size: page.page_size,
    }
}
