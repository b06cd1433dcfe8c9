//! Back-office stock ledger routes.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use stockroom_core::ledger::{InboundRequest, OutboundRequest, ReturnRequest};
use stockroom_core::validation::Page;
use stockroom_core::{OperationType, PaymentStatus, StockOperation, StockOperationItem};
use stockroom_db::OperationDetail;

use crate::auth::OperatorContext;
use crate::error::{ok, ApiResponse, ApiResult, Paged};
use crate::routes::paged;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inbound", post(inbound))
        .route("/outbound", post(outbound))
        .route("/return", post(record_return))
        .route("/operations", get(list_operations))
        .route("/operations/:id", get(operation_detail))
        .route("/operations/:id/payment-status", post(set_payment_status))
        .route("/items", get(list_items))
        .route("/orders/:order_id/items", get(order_items))
}

#[derive(Debug, Deserialize)]
pub struct OperationsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub kind: Option<OperationType>,
    #[serde(default)]
    pub shop_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    #[serde(default)]
    pub shop_id: i64,
    pub product_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusBody {
    pub payment_status: PaymentStatus,
}

/// A zero total from a form means "not given".
fn total_hint(cents: Option<i64>) -> Option<i64> {
    cents.filter(|cents| *cents != 0)
}

async fn inbound(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    body: Result<Json<InboundRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<OperationDetail>>> {
    let Json(mut request) = body?;
    request.total_amount_cents = total_hint(request.total_amount_cents);
    let detail = state.ledger.record_inbound(&operator, request).await?;
    Ok(ok(detail))
}

async fn outbound(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    body: Result<Json<OutboundRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<OperationDetail>>> {
    let Json(mut request) = body?;
    request.total_amount_cents = total_hint(request.total_amount_cents);
    let detail = state.ledger.record_outbound(&operator, request).await?;
    Ok(ok(detail))
}

async fn record_return(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    body: Result<Json<ReturnRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<OperationDetail>>> {
    let Json(request) = body?;
    let detail = state.ledger.record_return(&operator, request).await?;
    Ok(ok(detail))
}

async fn list_operations(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    query: Result<Query<OperationsQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Paged<StockOperation>>>> {
    let Query(query) = query?;
    let page = Page::normalize(query.page, query.page_size);
    let result = state
        .ledger
        .get_operations(&operator, query.shop_id, query.kind, page)
        .await?;
    Ok(ok(paged(result, page)))
}

async fn operation_detail(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<ApiResponse<OperationDetail>>> {
    let Path(id) = id?;
    let detail = state.ledger.get_operation_detail(&operator, &id).await?;
    Ok(ok(detail))
}

async fn set_payment_status(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<PaymentStatusBody>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<StockOperation>>> {
    let Path(id) = id?;
    let Json(body) = body?;
    let operation = state
        .ledger
        .set_outbound_payment_status(&operator, &id, body.payment_status)
        .await?;
    Ok(ok(operation))
}

async fn list_items(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    query: Result<Query<ItemsQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Paged<StockOperationItem>>>> {
    let Query(query) = query?;
    let page = Page::normalize(query.page, query.page_size);
    let product_id = query.product_id.as_deref().filter(|id| !id.is_empty());
    let result = state
        .ledger
        .items_by_shop(&operator, query.shop_id, product_id, page)
        .await?;
    Ok(ok(paged(result, page)))
}

async fn order_items(
    State(state): State<AppState>,
    OperatorContext(operator): OperatorContext,
    order_id: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<ApiResponse<Vec<StockOperationItem>>>> {
    let Path(order_id) = order_id?;
    let items = state.ledger.items_by_order(&operator, &order_id).await?;
    Ok(ok(items))
}
