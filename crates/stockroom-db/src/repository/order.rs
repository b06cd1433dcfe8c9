//! # Order Repository
//!
//! Orders and their append-only logs.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  checkout ──► pending_payment ──(pay callback)──► awaiting_shipment     │
//! │                     │                                     │             │
//! │                     │ cancel (unpaid only)                │ ship        │
//! │                     ▼                                     ▼             │
//! │                 cancelled                         awaiting_receipt      │
//! │                     │                                     │             │
//! │                     │ delete (soft)                       ▼             │
//! │                     ▼                                 completed ──►     │
//! │                 deleted_at set  ◄───────── delete (soft) ─┘             │
//! │                                                                         │
//! │  Every arrow writes one order_logs row in the same transaction.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status changes are single conditional UPDATEs (`... WHERE status = ...
//! RETURNING`), so the check and the write cannot be split by a concurrent
//! request. When nothing matches, the caller reads the row back to explain
//! why.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::validation::Page;
use stockroom_core::{Order, OrderAction, OrderLog, OrderStatus, OperatorType};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

const ORDER_COLUMNS: &str = "id, order_no, user_id, shop_id, status, payment_status, \
     total_amount_cents, payment_amount_cents, shipping_fee_cents, discount_amount_cents, \
     receiver_name, receiver_phone, receiver_address, address_id, coupon_id, note, \
     paid_at, cancelled_at, deleted_at, created_at, updated_at";

const LOG_COLUMNS: &str =
    "id, order_id, order_no, action, operator, operator_type, content, created_at";

/// Repository for order reads outside the checkout transactions.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// The user's order, unless soft-deleted.
    pub async fn get_for_user(&self, user_id: i64, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        find_for_user(&mut conn, user_id, id).await
    }

    /// Lists the user's orders newest first, hiding soft-deleted ones.
    pub async fn list_for_user(
        &self,
        user_id: i64,
        status: Option<OrderStatus>,
        page: Page,
    ) -> DbResult<(Vec<Order>, i64)> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE user_id = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR status = ?2) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(user_id)
            .bind(status)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders \
             WHERE user_id = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR status = ?2)",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok((orders, total))
    }

    /// Audit trail of an order, oldest first.
    pub async fn logs(&self, order_id: &str) -> DbResult<Vec<OrderLog>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM order_logs WHERE order_id = ?1 ORDER BY created_at, rowid"
        );
        let logs = sqlx::query_as::<_, OrderLog>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(logs)
    }
}

// =============================================================================
// Transactional statements
// =============================================================================

pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(id = %order.id, order_no = %order.order_no, "Inserting order");

    sqlx::query(
        r#"
        INSERT INTO orders (
            id, order_no, user_id, shop_id, status, payment_status,
            total_amount_cents, payment_amount_cents, shipping_fee_cents, discount_amount_cents,
            receiver_name, receiver_phone, receiver_address, address_id, coupon_id, note,
            paid_at, cancelled_at, deleted_at, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21
        )
        "#,
    )
    .bind(&order.id)
    .bind(&order.order_no)
    .bind(order.user_id)
    .bind(order.shop_id)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.total_amount_cents)
    .bind(order.payment_amount_cents)
    .bind(order.shipping_fee_cents)
    .bind(order.discount_amount_cents)
    .bind(&order.receiver_name)
    .bind(&order.receiver_phone)
    .bind(&order.receiver_address)
    .bind(&order.address_id)
    .bind(&order.coupon_id)
    .bind(&order.note)
    .bind(order.paid_at)
    .bind(order.cancelled_at)
    .bind(order.deleted_at)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Appends one audit row for `order`.
pub async fn append_log(
    conn: &mut SqliteConnection,
    order: &Order,
    action: OrderAction,
    operator: &str,
    operator_type: OperatorType,
    content: &str,
    at: DateTime<Utc>,
) -> DbResult<OrderLog> {
    let log = OrderLog {
        id: Uuid::new_v4().to_string(),
        order_id: order.id.clone(),
        order_no: order.order_no.clone(),
        action,
        operator: operator.to_string(),
        operator_type,
        content: content.to_string(),
        created_at: at,
    };

    sqlx::query(
        "INSERT INTO order_logs (id, order_id, order_no, action, operator, operator_type, content, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&log.id)
    .bind(&log.order_id)
    .bind(&log.order_no)
    .bind(log.action)
    .bind(&log.operator)
    .bind(log.operator_type)
    .bind(&log.content)
    .bind(log.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(log)
}

pub async fn find_for_user(conn: &mut SqliteConnection, user_id: i64, id: &str) -> DbResult<Option<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

pub async fn find_by_no(conn: &mut SqliteConnection, order_no: &str) -> DbResult<Option<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_no = ?1 AND deleted_at IS NULL \
         ORDER BY created_at DESC, rowid DESC LIMIT 1"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(order_no)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

/// pending_payment + unpaid → cancelled. `None` when the order is missing
/// or not in that state.
pub async fn cancel_if_unpaid(
    conn: &mut SqliteConnection,
    user_id: i64,
    id: &str,
    at: DateTime<Utc>,
) -> DbResult<Option<Order>> {
    let sql = format!(
        "UPDATE orders SET status = 'cancelled', cancelled_at = ?3, updated_at = ?3 \
         WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL \
           AND status = 'pending_payment' AND payment_status = 'unpaid' \
         RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

/// Soft-deletes a cancelled or completed order.
pub async fn soft_delete_closed(
    conn: &mut SqliteConnection,
    user_id: i64,
    id: &str,
    at: DateTime<Utc>,
) -> DbResult<Option<Order>> {
    let sql = format!(
        "UPDATE orders SET deleted_at = ?3, updated_at = ?3 \
         WHERE id = ?1 AND user_id = ?2 AND deleted_at IS NULL \
           AND status IN ('cancelled', 'completed') \
         RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

/// pending_payment → awaiting_shipment, payment paid.
pub async fn mark_paid(
    conn: &mut SqliteConnection,
    order_no: &str,
    paid_at: DateTime<Utc>,
) -> DbResult<Option<Order>> {
    let sql = format!(
        "UPDATE orders SET status = 'awaiting_shipment', payment_status = 'paid', \
                paid_at = ?2, updated_at = ?3 \
         WHERE order_no = ?1 AND deleted_at IS NULL AND status = 'pending_payment' \
         RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(order_no)
        .bind(paid_at)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}
