//! # Stock Ledger Rows
//!
//! Storage for `stock_operations` (headers) and `stock_operation_items`
//! (lines). Writes happen only through the transactional functions at the
//! bottom of this file, called by [`crate::ledger::StockLedger`] and
//! [`crate::checkout::CheckoutService`]; [`StockRepository`] is read-only.
//!
//! ## Kind Columns
//! ```text
//! ┌────────────┬──────────────────┬─────────────┬────────────────┐
//! │ kind       │ outbound_channel │ supplier_id │ payment_status │
//! ├────────────┼──────────────────┼─────────────┼────────────────┤
//! │ inbound    │ NULL             │ optional    │ NULL           │
//! │ outbound   │ required         │ NULL        │ unpaid / paid  │
//! │ return     │ NULL             │ NULL        │ NULL           │
//! └────────────┴──────────────────┴─────────────┴────────────────┘
//! ```
//! The table stores these flat; [`OperationKind`] is rebuilt on read and
//! rejects a row that puts a column on the wrong kind.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::validation::Page;
use stockroom_core::{
    CoreError, OperationKind, OperationType, OperatorType, OutboundChannel, PaymentStatus,
    ShopScope, StockOperation, StockOperationItem,
};
use tracing::debug;

use crate::error::{DbError, DbResult};

const OPERATION_COLUMNS: &str = "id, operation_no, kind, outbound_channel, supplier_id, \
     operator_id, operator_name, operator_type, customer_id, customer_name, shop_id, \
     total_amount_cents, total_profit_cents, payment_status, payment_finished_at, remark, created_at";

const ITEM_COLUMNS: &str = "id, operation_id, line_no, product_id, shop_id, product_name, \
     specification, unit, quantity, unit_price_cents, total_price_cents, before_stock, after_stock, \
     cost_cents, shipping_cost_cents, product_cost_cents, profit_cents, order_id, remark, created_at";

/// Flat row of `stock_operations`.
#[derive(Debug, Clone, sqlx::FromRow)]
struct StockOperationRow {
    id: String,
    operation_no: String,
    kind: OperationType,
    outbound_channel: Option<OutboundChannel>,
    supplier_id: Option<String>,
    operator_id: i64,
    operator_name: String,
    operator_type: OperatorType,
    customer_id: Option<i64>,
    customer_name: Option<String>,
    shop_id: i64,
    total_amount_cents: i64,
    total_profit_cents: i64,
    payment_status: Option<PaymentStatus>,
    payment_finished_at: Option<DateTime<Utc>>,
    remark: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<StockOperationRow> for StockOperation {
    type Error = CoreError;

    fn try_from(row: StockOperationRow) -> Result<Self, Self::Error> {
        let kind = OperationKind::from_parts(row.kind, row.outbound_channel, row.supplier_id)?;
        Ok(StockOperation {
            id: row.id,
            operation_no: row.operation_no,
            kind,
            operator_id: row.operator_id,
            operator_name: row.operator_name,
            operator_type: row.operator_type,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            shop_id: row.shop_id,
            total_amount_cents: row.total_amount_cents,
            total_profit_cents: row.total_profit_cents,
            payment_status: row.payment_status,
            payment_finished_at: row.payment_finished_at,
            remark: row.remark,
            created_at: row.created_at,
        })
    }
}

fn into_operations(rows: Vec<StockOperationRow>) -> DbResult<Vec<StockOperation>> {
    rows.into_iter()
        .map(|row| StockOperation::try_from(row).map_err(DbError::from))
        .collect()
}

/// Read-only access to the ledger.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Lists operation headers newest first.
    pub async fn list_operations(
        &self,
        scope: ShopScope,
        kind: Option<OperationType>,
        page: Page,
    ) -> DbResult<(Vec<StockOperation>, i64)> {
        let shop_id = scope.shop_id();
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM stock_operations \
             WHERE (?1 IS NULL OR shop_id = ?1) AND (?2 IS NULL OR kind = ?2) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
        );
        let rows = sqlx::query_as::<_, StockOperationRow>(&sql)
            .bind(shop_id)
            .bind(kind)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stock_operations \
             WHERE (?1 IS NULL OR shop_id = ?1) AND (?2 IS NULL OR kind = ?2)",
        )
        .bind(shop_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;

        Ok((into_operations(rows)?, total))
    }

    pub async fn get_operation(&self, id: &str) -> DbResult<Option<StockOperation>> {
        let mut conn = self.pool.acquire().await?;
        find_operation(&mut conn, id).await
    }

    /// Lines of one operation in line order.
    pub async fn items_for_operation(&self, operation_id: &str) -> DbResult<Vec<StockOperationItem>> {
        let mut conn = self.pool.acquire().await?;
        items_of_operation(&mut conn, operation_id).await
    }

    /// Every ledger line linked to an order (its sale and any returns).
    pub async fn items_by_order(&self, order_id: &str) -> DbResult<Vec<StockOperationItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM stock_operation_items \
             WHERE order_id = ?1 ORDER BY created_at, rowid"
        );
        let items = sqlx::query_as::<_, StockOperationItem>(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    /// Ledger lines of a shop newest first, optionally for one product
    /// (its stock history).
    pub async fn items_by_shop(
        &self,
        scope: ShopScope,
        product_id: Option<&str>,
        page: Page,
    ) -> DbResult<(Vec<StockOperationItem>, i64)> {
        let shop_id = scope.shop_id();
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM stock_operation_items \
             WHERE (?1 IS NULL OR shop_id = ?1) AND (?2 IS NULL OR product_id = ?2) \
             ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
        );
        let items = sqlx::query_as::<_, StockOperationItem>(&sql)
            .bind(shop_id)
            .bind(product_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stock_operation_items \
             WHERE (?1 IS NULL OR shop_id = ?1) AND (?2 IS NULL OR product_id = ?2)",
        )
        .bind(shop_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((items, total))
    }
}

// =============================================================================
// Transactional statements
// =============================================================================

pub async fn find_operation(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StockOperation>> {
    let sql = format!("SELECT {OPERATION_COLUMNS} FROM stock_operations WHERE id = ?1");
    let row = sqlx::query_as::<_, StockOperationRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|row| StockOperation::try_from(row).map_err(DbError::from))
        .transpose()
}

pub async fn items_of_operation(
    conn: &mut SqliteConnection,
    operation_id: &str,
) -> DbResult<Vec<StockOperationItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM stock_operation_items WHERE operation_id = ?1 ORDER BY line_no"
    );
    let items = sqlx::query_as::<_, StockOperationItem>(&sql)
        .bind(operation_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

/// Lines that sold `order_id` (outbound lines only, not its returns).
pub async fn sold_items_of_order(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<StockOperationItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM stock_operation_items \
         WHERE order_id = ?1 \
           AND operation_id IN (SELECT id FROM stock_operations WHERE kind = 'outbound') \
         ORDER BY created_at, line_no"
    );
    let items = sqlx::query_as::<_, StockOperationItem>(&sql)
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

/// Writes an operation header. Lines go in afterwards with [`insert_item`].
pub async fn insert_operation(conn: &mut SqliteConnection, operation: &StockOperation) -> DbResult<()> {
    debug!(
        id = %operation.id,
        operation_no = %operation.operation_no,
        kind = %operation.kind.operation_type(),
        "Inserting stock operation"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_operations (
            id, operation_no, kind, outbound_channel, supplier_id,
            operator_id, operator_name, operator_type, customer_id, customer_name, shop_id,
            total_amount_cents, total_profit_cents, payment_status, payment_finished_at,
            remark, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(&operation.id)
    .bind(&operation.operation_no)
    .bind(operation.kind.operation_type())
    .bind(operation.kind.outbound_channel())
    .bind(operation.kind.supplier_id())
    .bind(operation.operator_id)
    .bind(&operation.operator_name)
    .bind(operation.operator_type)
    .bind(operation.customer_id)
    .bind(&operation.customer_name)
    .bind(operation.shop_id)
    .bind(operation.total_amount_cents)
    .bind(operation.total_profit_cents)
    .bind(operation.payment_status)
    .bind(operation.payment_finished_at)
    .bind(&operation.remark)
    .bind(operation.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn insert_item(conn: &mut SqliteConnection, item: &StockOperationItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_operation_items (
            id, operation_id, line_no, product_id, shop_id,
            product_name, specification, unit,
            quantity, unit_price_cents, total_price_cents, before_stock, after_stock,
            cost_cents, shipping_cost_cents, product_cost_cents, profit_cents,
            order_id, remark, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
        )
        "#,
    )
    .bind(&item.id)
    .bind(&item.operation_id)
    .bind(item.line_no)
    .bind(&item.product_id)
    .bind(item.shop_id)
    .bind(&item.product_name)
    .bind(&item.specification)
    .bind(&item.unit)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.total_price_cents)
    .bind(item.before_stock)
    .bind(item.after_stock)
    .bind(item.cost_cents)
    .bind(item.shipping_cost_cents)
    .bind(item.product_cost_cents)
    .bind(item.profit_cents)
    .bind(&item.order_id)
    .bind(&item.remark)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// unpaid → paid on one outbound operation. Returns whether a row changed.
pub async fn mark_operation_paid(
    conn: &mut SqliteConnection,
    operation_id: &str,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE stock_operations SET payment_status = 'paid', payment_finished_at = ?2 \
         WHERE id = ?1 AND kind = 'outbound' AND payment_status = 'unpaid'",
    )
    .bind(operation_id)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Marks the unpaid outbound operations that sold `order_id` as paid.
pub async fn mark_order_operations_paid(
    conn: &mut SqliteConnection,
    order_id: &str,
    at: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE stock_operations SET payment_status = 'paid', payment_finished_at = ?2
        WHERE kind = 'outbound' AND payment_status = 'unpaid'
          AND id IN (SELECT operation_id FROM stock_operation_items WHERE order_id = ?1)
        "#,
    )
    .bind(order_id)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
