//! Customer order routes.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use stockroom_core::checkout::{CheckoutPreview, CheckoutReceipt, CheckoutRequest};
use stockroom_core::validation::Page;
use stockroom_core::{Order, OrderStatus};
use stockroom_db::OrderDetail;

use crate::auth::CustomerContext;
use crate::error::{ok, ApiResponse, ApiResult, Paged};
use crate::routes::paged;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/preview", post(preview))
        .route("/list", get(list))
        .route("/detail", get(detail))
        .route("/cancel", post(cancel))
        .route("/delete", delete(delete_order))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<OrderStatus>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: String,
}

async fn checkout(
    State(state): State<AppState>,
    customer: CustomerContext,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<CheckoutReceipt>>> {
    let Json(request) = body?;
    let receipt = state.checkout.checkout(customer.user_id, request).await?;
    Ok(ok(receipt))
}

async fn preview(
    State(state): State<AppState>,
    customer: CustomerContext,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<CheckoutPreview>>> {
    let Json(request) = body?;
    let preview = state.checkout.preview(customer.user_id, &request).await?;
    Ok(ok(preview))
}

async fn list(
    State(state): State<AppState>,
    customer: CustomerContext,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Paged<Order>>>> {
    let Query(query) = query?;
    let page = Page::normalize(query.page, query.page_size);
    let result = state
        .checkout
        .list_orders(customer.user_id, query.status, page)
        .await?;
    Ok(ok(paged(result, page)))
}

async fn detail(
    State(state): State<AppState>,
    customer: CustomerContext,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<OrderDetail>>> {
    let Query(IdQuery { id }) = query?;
    let detail = state.checkout.order_detail(customer.user_id, &id).await?;
    Ok(ok(detail))
}

async fn cancel(
    State(state): State<AppState>,
    customer: CustomerContext,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    let Query(IdQuery { id }) = query?;
    let order = state.checkout.cancel_order(customer.user_id, &id).await?;
    Ok(ok(order))
}

async fn delete_order(
    State(state): State<AppState>,
    customer: CustomerContext,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    let Query(IdQuery { id }) = query?;
    let order = state.checkout.delete_order(customer.user_id, &id).await?;
    Ok(ok(order))
}
