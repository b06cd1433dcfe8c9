//! Payment gateway relay.
//!
//! The gateway (or the service that verifies its signature) posts the order
//! number and the collected amount once the customer has paid, with the
//! shared secret in `X-Gateway-Secret`. Repeated callbacks are harmless.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use stockroom_core::{Money, Order};

use crate::auth::GatewayContext;
use crate::error::{ok, ApiResponse, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/callback", post(callback))
}

#[derive(Debug, Deserialize)]
pub struct PayCallback {
    pub order_no: String,
    /// What the gateway collected, in cents.
    pub payment_amount_cents: i64,
    /// Defaults to the time the callback arrives.
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

async fn callback(
    State(state): State<AppState>,
    _gateway: GatewayContext,
    body: Result<Json<PayCallback>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    let Json(callback) = body?;
    let paid_at = callback.paid_at.unwrap_or_else(Utc::now);
    let order = state
        .checkout
        .mark_order_paid(
            &callback.order_no,
            Money::from_cents(callback.payment_amount_cents),
            paid_at,
        )
        .await?;
    Ok(ok(order))
}
