//! Customer cart routes.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use stockroom_core::CartItem;
use stockroom_db::repository::cart::CartEntry;

use crate::auth::CustomerContext;
use crate::error::{ok, ApiResponse, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/list", get(list))
        .route("/add", post(add))
        .route("/update", post(update))
        .route("/delete", post(remove))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub shop_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddBody {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub removed: u64,
}

async fn list(
    State(state): State<AppState>,
    customer: CustomerContext,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<CartEntry>>>> {
    let Query(query) = query?;
    let shop_id = query.shop_id.filter(|id| *id > 0);
    let entries = state.db.carts().list_for_user(customer.user_id, shop_id).await?;
    Ok(ok(entries))
}

async fn add(
    State(state): State<AppState>,
    customer: CustomerContext,
    body: Result<Json<AddBody>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<CartItem>>> {
    let Json(body) = body?;
    let item = state
        .db
        .carts()
        .add(customer.user_id, &body.product_id, body.quantity)
        .await?;
    Ok(ok(item))
}

async fn update(
    State(state): State<AppState>,
    customer: CustomerContext,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let Json(body) = body?;
    state
        .db
        .carts()
        .update_quantity(customer.user_id, &body.id, body.quantity)
        .await?;
    Ok(ok(()))
}

async fn remove(
    State(state): State<AppState>,
    customer: CustomerContext,
    body: Result<Json<DeleteBody>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<Removed>>> {
    let Json(body) = body?;
    let removed = state.db.carts().remove(customer.user_id, &body.ids).await?;
    Ok(ok(Removed { removed }))
}
