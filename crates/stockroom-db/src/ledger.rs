//! # Stock Ledger
//!
//! Records every inventory change as an immutable operation with its lines.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record_outbound(operator, request)                                     │
//! │       │                                                                 │
//! │       │  validate request, resolve shop (tenancy)   ← no tx yet         │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │   ├── for each line, in request order:                                  │
//! │   │     UPDATE products SET stock = stock - q WHERE stock >= q          │
//! │   │     RETURNING stock, cost ...   (0 rows → InsufficientStock)        │
//! │   │     price the line with the returned live cost                      │
//! │   ├── reconcile caller total against Σ line totals                      │
//! │   ├── INSERT stock_operations (header, totals, profit)                  │
//! │   └── INSERT stock_operation_items (one per line, line_no 1..n)         │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any `?` before COMMIT drops the transaction: ROLLBACK, nothing stays.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound and return follow the same shape with an increment instead of a
//! decrement. Inbound additionally moves the product's cost basis when a
//! line carries a new purchase cost; that write sits in the same
//! transaction, so a rollback restores the old cost too.
//!
//! The line helpers at the bottom are shared with
//! [`crate::checkout::CheckoutService`], whose transactions write the same
//! ledger rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use stockroom_core::ledger::{
    plan_cost_update, plan_payment_transition, price_inbound_line, price_outbound_line,
    price_return_line, reconcile_total, InboundRequest, LineAmounts, OutboundRequest,
    PaymentTransition, ReturnRequest, StockMovement,
};
use stockroom_core::numbering::generate_number;
use stockroom_core::validation::Page;
use stockroom_core::{
    CheckoutConfig, CoreError, CostBasis, Money, OperationKind, OperationType, Operator,
    OperatorType, Order, OutboundChannel, PaymentStatus, StockOperation, StockOperationItem,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::product::{
    decrement_stock, increment_stock, set_product_cost, stock_state, StockRow,
};
use crate::repository::stock::{self, StockRepository};
use crate::repository::supplier::SupplierRepository;

/// An operation header with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDetail {
    pub operation: StockOperation,
    pub items: Vec<StockOperationItem>,
}

/// Administrative entry point to the ledger.
///
/// Cheap to clone; holds the pool and the immutable numbering config.
#[derive(Debug, Clone)]
pub struct StockLedger {
    pool: SqlitePool,
    config: CheckoutConfig,
}

impl StockLedger {
    pub fn new(pool: SqlitePool, config: CheckoutConfig) -> Self {
        StockLedger { pool, config }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Receives goods from a supplier.
    ///
    /// Each line adds `quantity` to stock. A line whose `product_cost_cents`
    /// differs from the stored purchase cost moves the product's cost basis
    /// (`cost = product_cost + shipping_cost`) before the line is priced at
    /// the landed cost.
    pub async fn record_inbound(&self, operator: &Operator, request: InboundRequest) -> DbResult<OperationDetail> {
        request.validate()?;
        let shop_id = resolve_write_shop(operator, request.shop_id)?;

        if let Some(supplier_id) = &request.supplier_id {
            SupplierRepository::new(self.pool.clone())
                .get_in_shop(supplier_id, shop_id)
                .await?
                .ok_or_else(|| DbError::not_found("Supplier", supplier_id.as_str()))?;
        }

        let mut tx = self.pool.begin().await?;

        let mut drafts = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let row = add_stock(&mut tx, &line.product_id, shop_id, line.quantity).await?;

            let stored = row.cost_basis();
            let supplied = line.product_cost_cents.map(Money::from_cents);
            let basis = match plan_cost_update(&stored, supplied) {
                Some(planned) => {
                    debug!(
                        product_id = %row.id,
                        from = stored.product_cost.cents(),
                        to = planned.product_cost.cents(),
                        "Updating cost basis"
                    );
                    set_product_cost(
                        &mut tx,
                        &row.id,
                        stored.product_cost.cents(),
                        planned.product_cost.cents(),
                    )
                    .await?
                }
                None => stored,
            };

            let amounts = price_inbound_line(&basis, line.quantity);
            drafts.push(LineDraft::new(
                OperationType::Inbound,
                row,
                line.quantity,
                basis,
                amounts,
                None,
                &line.remark,
            ));
        }

        let (computed, _) = sum_lines(&drafts);
        let total = checked_total(request.total_amount_cents, computed)?;

        let operation = StockOperation {
            id: Uuid::new_v4().to_string(),
            operation_no: self.next_operation_no(operator.operator_id),
            kind: OperationKind::Inbound {
                supplier_id: request.supplier_id.clone(),
            },
            operator_id: operator.operator_id,
            operator_name: operator.name.clone(),
            operator_type: OperatorType::Admin,
            customer_id: None,
            customer_name: None,
            shop_id,
            total_amount_cents: total.cents(),
            total_profit_cents: 0,
            payment_status: None,
            payment_finished_at: None,
            remark: request.remark.clone(),
            created_at: request.operated_at.unwrap_or_else(Utc::now),
        };
        let items = write_operation(&mut tx, &operation, drafts).await?;

        tx.commit().await?;

        info!(
            operation_no = %operation.operation_no,
            shop_id,
            lines = items.len(),
            total = operation.total_amount_cents,
            "Inbound recorded"
        );

        Ok(OperationDetail { operation, items })
    }

    /// Takes goods off the shelf for an administrative sale or write-off.
    ///
    /// Fails as a whole with `InsufficientStock` if any line asks for more
    /// than is on the shelf at the moment its decrement runs. The operation
    /// starts unpaid.
    pub async fn record_outbound(&self, operator: &Operator, request: OutboundRequest) -> DbResult<OperationDetail> {
        request.validate()?;
        let shop_id = resolve_write_shop(operator, request.shop_id)?;

        let mut tx = self.pool.begin().await?;

        let mut drafts = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let row = take_stock(&mut tx, &line.product_id, shop_id, line.quantity).await?;
            let basis = row.cost_basis();
            let amounts = price_outbound_line(
                line.unit_price_cents.map(Money::from_cents),
                row.sale_price(),
                basis.cost,
                line.quantity,
            );
            drafts.push(LineDraft::new(
                OperationType::Outbound,
                row,
                line.quantity,
                basis,
                amounts,
                None,
                &line.remark,
            ));
        }

        let (computed, profit) = sum_lines(&drafts);
        let total = checked_total(request.total_amount_cents, computed)?;

        let operation = StockOperation {
            id: Uuid::new_v4().to_string(),
            operation_no: self.next_operation_no(operator.operator_id),
            kind: OperationKind::Outbound {
                channel: OutboundChannel::Administrative,
            },
            operator_id: operator.operator_id,
            operator_name: operator.name.clone(),
            operator_type: OperatorType::Admin,
            customer_id: request.customer_id,
            customer_name: request.customer_name.clone(),
            shop_id,
            total_amount_cents: total.cents(),
            total_profit_cents: profit.cents(),
            payment_status: Some(PaymentStatus::Unpaid),
            payment_finished_at: None,
            remark: request.remark.clone(),
            created_at: request.operated_at.unwrap_or_else(Utc::now),
        };
        let items = write_operation(&mut tx, &operation, drafts).await?;

        tx.commit().await?;

        info!(
            operation_no = %operation.operation_no,
            shop_id,
            lines = items.len(),
            total = operation.total_amount_cents,
            profit = operation.total_profit_cents,
            "Outbound recorded"
        );

        Ok(OperationDetail { operation, items })
    }

    /// Puts returned goods back on the shelf, optionally against an order.
    pub async fn record_return(&self, operator: &Operator, request: ReturnRequest) -> DbResult<OperationDetail> {
        request.validate()?;
        let shop_id = resolve_write_shop(operator, request.shop_id)?;

        if let Some(order_id) = &request.order_id {
            let order_shop: Option<i64> = sqlx::query_scalar("SELECT shop_id FROM orders WHERE id = ?1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;
            if order_shop != Some(shop_id) {
                return Err(CoreError::OrderNotFound(order_id.clone()).into());
            }
        }

        let mut tx = self.pool.begin().await?;

        let mut drafts = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let row = add_stock(&mut tx, &line.product_id, shop_id, line.quantity).await?;
            let basis = row.cost_basis();
            let amounts = price_return_line(
                line.unit_price_cents.map(Money::from_cents),
                row.sale_price(),
                line.quantity,
            );
            drafts.push(LineDraft::new(
                OperationType::Return,
                row,
                line.quantity,
                basis,
                amounts,
                request.order_id.clone(),
                &line.remark,
            ));
        }

        let (total, _) = sum_lines(&drafts);

        let operation = StockOperation {
            id: Uuid::new_v4().to_string(),
            operation_no: self.next_operation_no(operator.operator_id),
            kind: OperationKind::Return,
            operator_id: operator.operator_id,
            operator_name: operator.name.clone(),
            operator_type: OperatorType::Admin,
            customer_id: None,
            customer_name: None,
            shop_id,
            total_amount_cents: total.cents(),
            total_profit_cents: 0,
            payment_status: None,
            payment_finished_at: None,
            remark: request.remark.clone(),
            created_at: request.operated_at.unwrap_or_else(Utc::now),
        };
        let items = write_operation(&mut tx, &operation, drafts).await?;

        tx.commit().await?;

        info!(
            operation_no = %operation.operation_no,
            shop_id,
            lines = items.len(),
            "Return recorded"
        );

        Ok(OperationDetail { operation, items })
    }

    /// Completes payment on an outbound operation (credit sales).
    ///
    /// `unpaid → paid` stamps the completion time; asking for the current
    /// status again changes nothing.
    pub async fn set_outbound_payment_status(
        &self,
        operator: &Operator,
        operation_id: &str,
        requested: PaymentStatus,
    ) -> DbResult<StockOperation> {
        let mut tx = self.pool.begin().await?;

        let mut operation = stock::find_operation(&mut tx, operation_id)
            .await?
            .ok_or_else(|| CoreError::OperationNotFound(operation_id.to_string()))?;
        operator.ensure_can_access(operation.shop_id).map_err(|e| {
            warn!(operator_id = operator.operator_id, operation_id = %operation_id, "Cross-shop payment update rejected");
            e
        })?;

        if !operation.kind.is_outbound() {
            return Err(CoreError::NotOutbound {
                operation_no: operation.operation_no.clone(),
                kind: operation.kind.operation_type().to_string(),
            }
            .into());
        }

        let current = operation.payment_status.unwrap_or(PaymentStatus::Unpaid);
        match plan_payment_transition(&operation.operation_no, current, requested)? {
            PaymentTransition::Unchanged => return Ok(operation),
            PaymentTransition::MarkPaid => {
                let now = Utc::now();
                if stock::mark_operation_paid(&mut tx, &operation.id, now).await? {
                    operation.payment_status = Some(PaymentStatus::Paid);
                    operation.payment_finished_at = Some(now);
                }
            }
        }

        tx.commit().await?;

        info!(operation_no = %operation.operation_no, "Outbound marked paid");
        Ok(operation)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Lists operation headers newest first, within the operator's scope.
    pub async fn get_operations(
        &self,
        operator: &Operator,
        requested_shop: i64,
        kind: Option<OperationType>,
        page: Page,
    ) -> DbResult<(Vec<StockOperation>, i64)> {
        let scope = operator.read_scope(requested_shop)?;
        self.stock().list_operations(scope, kind, page).await
    }

    /// One operation with its lines. Operations of other shops read as
    /// missing.
    pub async fn get_operation_detail(&self, operator: &Operator, operation_id: &str) -> DbResult<OperationDetail> {
        let repo = self.stock();
        let operation = repo
            .get_operation(operation_id)
            .await?
            .filter(|operation| operator.ensure_can_access(operation.shop_id).is_ok())
            .ok_or_else(|| CoreError::OperationNotFound(operation_id.to_string()))?;
        let items = repo.items_for_operation(&operation.id).await?;
        Ok(OperationDetail { operation, items })
    }

    /// Ledger lines linked to an order, limited to shops the operator sees.
    pub async fn items_by_order(&self, operator: &Operator, order_id: &str) -> DbResult<Vec<StockOperationItem>> {
        let scope = operator.read_scope(0)?;
        let mut items = self.stock().items_by_order(order_id).await?;
        items.retain(|item| scope.allows(item.shop_id));
        Ok(items)
    }

    /// Ledger lines of a shop, optionally one product's stock history.
    pub async fn items_by_shop(
        &self,
        operator: &Operator,
        requested_shop: i64,
        product_id: Option<&str>,
        page: Page,
    ) -> DbResult<(Vec<StockOperationItem>, i64)> {
        let scope = operator.read_scope(requested_shop)?;
        self.stock().items_by_shop(scope, product_id, page).await
    }

    fn stock(&self) -> StockRepository {
        StockRepository::new(self.pool.clone())
    }

    fn next_operation_no(&self, actor_id: i64) -> String {
        generate_number(&self.config.operation_prefix, actor_id, Utc::now())
    }
}

fn resolve_write_shop(operator: &Operator, requested: i64) -> DbResult<i64> {
    operator.write_shop(requested).map_err(|e| {
        if matches!(e, CoreError::CrossShopAccess { .. }) {
            warn!(
                operator_id = operator.operator_id,
                operator_shop = operator.shop_id,
                requested_shop = requested,
                "Cross-shop write rejected"
            );
        }
        DbError::from(e)
    })
}

fn checked_total(supplied_cents: Option<i64>, computed: Money) -> DbResult<Money> {
    reconcile_total(supplied_cents.map(Money::from_cents), computed).map_err(|e| {
        warn!(
            supplied = supplied_cents,
            computed = computed.cents(),
            "Total mismatch, rolling back"
        );
        DbError::from(e)
    })
}

// =============================================================================
// Line helpers (shared with checkout)
// =============================================================================

/// A priced line waiting for its operation header.
#[derive(Debug, Clone)]
pub(crate) struct LineDraft {
    row: StockRow,
    quantity: i64,
    movement: StockMovement,
    basis: CostBasis,
    amounts: LineAmounts,
    order_id: Option<String>,
    remark: String,
}

impl LineDraft {
    /// `row` is the product as the stock statement returned it, after the
    /// change.
    pub(crate) fn new(
        operation_type: OperationType,
        row: StockRow,
        quantity: i64,
        basis: CostBasis,
        amounts: LineAmounts,
        order_id: Option<String>,
        remark: &str,
    ) -> Self {
        let movement = StockMovement::from_after(operation_type, row.stock, quantity);
        LineDraft {
            row,
            quantity,
            movement,
            basis,
            amounts,
            order_id,
            remark: remark.to_string(),
        }
    }

    fn into_item(self, operation: &StockOperation, line_no: i64) -> StockOperationItem {
        StockOperationItem {
            id: Uuid::new_v4().to_string(),
            operation_id: operation.id.clone(),
            line_no,
            product_id: self.row.id,
            shop_id: operation.shop_id,
            product_name: self.row.name,
            specification: self.row.specification,
            unit: self.row.unit,
            quantity: self.quantity,
            unit_price_cents: self.amounts.unit_price.cents(),
            total_price_cents: self.amounts.total_price.cents(),
            before_stock: self.movement.before,
            after_stock: self.movement.after,
            cost_cents: self.basis.cost.cents(),
            shipping_cost_cents: self.basis.shipping_cost.cents(),
            product_cost_cents: self.basis.product_cost.cents(),
            profit_cents: self.amounts.profit.cents(),
            order_id: self.order_id,
            remark: self.remark,
            created_at: operation.created_at,
        }
    }
}

/// (Σ line totals, Σ line profits)
pub(crate) fn sum_lines(drafts: &[LineDraft]) -> (Money, Money) {
    drafts.iter().fold((Money::zero(), Money::zero()), |(total, profit), draft| {
        (total + draft.amounts.total_price, profit + draft.amounts.profit)
    })
}

/// Conditional decrement; explains a miss as not-found or short.
pub(crate) async fn take_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    shop_id: i64,
    quantity: i64,
) -> DbResult<StockRow> {
    if let Some(row) = decrement_stock(conn, product_id, shop_id, quantity).await? {
        return Ok(row);
    }

    match stock_state(conn, product_id, shop_id).await? {
        None => Err(CoreError::ProductNotFound(product_id.to_string()).into()),
        Some((name, available)) => {
            warn!(
                product_id = %product_id,
                available,
                requested = quantity,
                "Insufficient stock, rolling back"
            );
            Err(CoreError::insufficient_stock(product_id, name, available, quantity).into())
        }
    }
}

async fn add_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    shop_id: i64,
    quantity: i64,
) -> DbResult<StockRow> {
    increment_stock(conn, product_id, shop_id, quantity)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
}

/// Writes the header, then its lines numbered from 1 in draft order.
pub(crate) async fn write_operation(
    conn: &mut SqliteConnection,
    operation: &StockOperation,
    drafts: Vec<LineDraft>,
) -> DbResult<Vec<StockOperationItem>> {
    stock::insert_operation(conn, operation).await?;

    let mut items = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.into_iter().enumerate() {
        let item = draft.into_item(operation, index as i64 + 1);
        stock::insert_item(conn, &item).await?;
        items.push(item);
    }
    Ok(items)
}

/// Header for a ledger operation a customer's order causes (the sale at
/// checkout, the restock on cancellation).
pub(crate) fn order_operation(
    config: &CheckoutConfig,
    kind: OperationKind,
    order: &Order,
    totals: (Money, Money),
    remark: String,
    at: DateTime<Utc>,
) -> StockOperation {
    let (total, profit) = totals;
    let payment_status = kind.is_outbound().then_some(PaymentStatus::Unpaid);
    StockOperation {
        id: Uuid::new_v4().to_string(),
        operation_no: generate_number(&config.operation_prefix, order.user_id, at),
        kind,
        operator_id: order.user_id,
        operator_name: format!("user:{}", order.user_id),
        operator_type: OperatorType::User,
        customer_id: Some(order.user_id),
        customer_name: Some(order.receiver_name.clone()),
        shop_id: order.shop_id,
        total_amount_cents: total.cents(),
        total_profit_cents: profit.cents(),
        payment_status,
        payment_finished_at: None,
        remark,
        created_at: at,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;
    use stockroom_core::ledger::{InboundLine, OutboundLine, ReturnLine};
    use stockroom_core::{ShopScope, ValidationError};

    fn admin() -> Operator {
        Operator::new(11, "clerk", 1, false)
    }

    fn root() -> Operator {
        Operator::new(1, "root", 1, true)
    }

    async fn setup() -> (Database, StockLedger) {
        setup_on(DbConfig::in_memory()).await
    }

    async fn setup_on(config: DbConfig) -> (Database, StockLedger) {
        let db = Database::new(config).await.unwrap();
        let ledger = db.ledger(CheckoutConfig::default());
        (db, ledger)
    }

    async fn product(db: &Database, shop_id: i64, product_cost: i64, shipping: i64) -> String {
        db.products()
            .create(NewProduct {
                shop_id,
                name: "Wall paint".into(),
                specification: "5L".into(),
                unit: "bucket".into(),
                sale_price_cents: 1200,
                product_cost_cents: product_cost,
                shipping_cost_cents: shipping,
            })
            .await
            .unwrap()
            .id
    }

    fn inbound(product_id: &str, quantity: i64, product_cost: Option<i64>) -> InboundRequest {
        InboundRequest {
            shop_id: 0,
            supplier_id: None,
            operated_at: None,
            total_amount_cents: None,
            remark: String::new(),
            items: vec![InboundLine {
                product_id: product_id.to_string(),
                quantity,
                product_cost_cents: product_cost,
                remark: String::new(),
            }],
        }
    }

    fn outbound(lines: &[(&str, i64, Option<i64>)]) -> OutboundRequest {
        OutboundRequest {
            shop_id: 0,
            customer_id: None,
            customer_name: None,
            operated_at: None,
            total_amount_cents: None,
            remark: String::new(),
            items: lines
                .iter()
                .map(|(product_id, quantity, price)| OutboundLine {
                    product_id: product_id.to_string(),
                    quantity: *quantity,
                    unit_price_cents: *price,
                    remark: String::new(),
                })
                .collect(),
        }
    }

    async fn stock_of(db: &Database, product_id: &str) -> i64 {
        db.products().get_by_id(product_id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn test_inbound_then_outbound_profit_uses_current_cost() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;

        ledger.record_inbound(&admin(), inbound(&p, 10, Some(500))).await.unwrap();
        let received = ledger.record_inbound(&admin(), inbound(&p, 5, Some(600))).await.unwrap();

        assert_eq!(received.items[0].before_stock, 10);
        assert_eq!(received.items[0].after_stock, 15);
        assert_eq!(received.items[0].unit_price_cents, 600);
        assert_eq!(received.operation.total_amount_cents, 3000);

        let stored = db.products().get_by_id(&p).await.unwrap().unwrap();
        assert_eq!(stored.stock, 15);
        assert_eq!(stored.cost_cents, 600);

        let sold = ledger
            .record_outbound(&admin(), outbound(&[(&p, 12, Some(900))]))
            .await
            .unwrap();

        assert_eq!(stock_of(&db, &p).await, 3);
        assert_eq!(sold.operation.total_amount_cents, 10_800);
        assert_eq!(sold.operation.total_profit_cents, 3600);
        assert_eq!(sold.operation.payment_status, Some(PaymentStatus::Unpaid));
        assert_eq!(sold.items[0].before_stock, 15);
        assert_eq!(sold.items[0].after_stock, 3);
        assert_eq!(sold.items[0].cost_cents, 600);
    }

    #[tokio::test]
    async fn test_unchanged_cost_leaves_basis_alone() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 40).await;

        ledger.record_inbound(&admin(), inbound(&p, 1, Some(600))).await.unwrap();
        let after_first = db.products().get_by_id(&p).await.unwrap().unwrap();
        assert_eq!(after_first.product_cost_cents, 600);
        assert_eq!(after_first.cost_cents, 640);

        ledger.record_inbound(&admin(), inbound(&p, 1, Some(600))).await.unwrap();
        ledger.record_inbound(&admin(), inbound(&p, 1, None)).await.unwrap();
        let after_repeat = db.products().get_by_id(&p).await.unwrap().unwrap();
        assert_eq!(after_repeat.product_cost_cents, 600);
        assert_eq!(after_repeat.shipping_cost_cents, 40);
        assert_eq!(after_repeat.cost_cents, 640);
        assert_eq!(after_repeat.stock, 3);
    }

    #[tokio::test]
    async fn test_inbound_unknown_product_persists_nothing() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;

        let mut request = inbound(&p, 5, Some(700));
        request.items.push(InboundLine {
            product_id: "550e8400-e29b-41d4-a716-446655440000".into(),
            quantity: 1,
            product_cost_cents: None,
            remark: String::new(),
        });

        let err = ledger.record_inbound(&admin(), request).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::ProductNotFound(_))));

        let stored = db.products().get_by_id(&p).await.unwrap().unwrap();
        assert_eq!(stored.stock, 0);
        assert_eq!(stored.product_cost_cents, 500);
        let (_, total) = ledger
            .get_operations(&root(), 0, None, Page::default())
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_outbound_shortfall_rolls_back_every_line() {
        let (db, ledger) = setup().await;
        let a = product(&db, 1, 500, 0).await;
        let b = product(&db, 1, 500, 0).await;
        ledger.record_inbound(&admin(), inbound(&a, 10, None)).await.unwrap();
        ledger.record_inbound(&admin(), inbound(&b, 2, None)).await.unwrap();

        let err = ledger
            .record_outbound(&admin(), outbound(&[(&a, 4, None), (&b, 5, None)]))
            .await
            .unwrap_err();

        match err {
            DbError::Domain(ref core) => {
                assert!(matches!(core, CoreError::InsufficientStock { product_id, .. } if *product_id == b));
                assert_eq!(core.shortfall(), Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(stock_of(&db, &a).await, 10);
        assert_eq!(stock_of(&db, &b).await, 2);

        let (_, outbound_count) = ledger
            .get_operations(&admin(), 0, Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(outbound_count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_outbounds_never_overdraw() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;
        ledger.record_inbound(&admin(), inbound(&p, 5, None)).await.unwrap();

        let operator = admin();
        let (first, second) = tokio::join!(
            ledger.record_outbound(&operator, outbound(&[(&p, 4, None)])),
            ledger.record_outbound(&operator, outbound(&[(&p, 4, None)])),
        );

        let committed = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(committed, 1);
        let failure = first.err().or(second.err()).unwrap();
        assert!(matches!(failure, DbError::Domain(CoreError::InsufficientStock { .. })));
        assert_eq!(stock_of(&db, &p).await, 1);
    }

    #[tokio::test]
    async fn test_outbound_price_beyond_limit_is_rejected() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;
        ledger.record_inbound(&admin(), inbound(&p, 5, None)).await.unwrap();

        let err = ledger
            .record_outbound(&admin(), outbound(&[(&p, 3, Some(i64::MAX / 2))]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::Validation(ValidationError::OutOfRange { ref field, .. }))
                if field == "unit_price"
        ));

        let err = ledger
            .record_inbound(&admin(), inbound(&p, 1, Some(stockroom_core::MAX_PRICE_CENTS + 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let priciest = ledger
            .record_outbound(
                &admin(),
                outbound(&[(&p, 5, Some(stockroom_core::MAX_PRICE_CENTS))]),
            )
            .await
            .unwrap();
        assert_eq!(
            priciest.operation.total_amount_cents,
            stockroom_core::MAX_PRICE_CENTS * 5
        );
        assert_eq!(stock_of(&db, &p).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pooled_outbounds_never_overdraw() {
        let dir = tempfile::tempdir().unwrap();
        let (db, ledger) = setup_on(DbConfig::new(dir.path().join("ledger.db")).max_connections(8)).await;
        let p = product(&db, 1, 500, 0).await;
        ledger.record_inbound(&admin(), inbound(&p, 10, None)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                let request = outbound(&[(&p, 3, None)]);
                tokio::spawn(async move { ledger.record_outbound(&admin(), request).await })
            })
            .collect();

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(detail) => {
                    committed += 1;
                    assert!(detail.items[0].after_stock >= 0);
                }
                Err(DbError::Domain(CoreError::InsufficientStock { .. })) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(committed, 3);
        assert_eq!(stock_of(&db, &p).await, 1);
        let (_, total) = ledger
            .get_operations(&admin(), 0, Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(total, 3);
        db.close().await;
    }

    #[tokio::test]
    async fn test_cross_shop_outbound_rejected_before_ledger() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;
        ledger.record_inbound(&root(), inbound(&p, 5, None)).await.unwrap();

        let shop_two = Operator::new(22, "clerk-2", 2, false);
        let mut request = outbound(&[(&p, 1, None)]);
        request.shop_id = 1;

        let err = ledger.record_outbound(&shop_two, request).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::CrossShopAccess { operator_shop: 2, target_shop: 1 })
        ));
        assert_eq!(stock_of(&db, &p).await, 5);
        let (_, total) = ledger
            .get_operations(&root(), 1, Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_product_of_other_shop_is_not_found() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;
        ledger.record_inbound(&root(), inbound(&p, 5, None)).await.unwrap();

        let shop_two = Operator::new(22, "clerk-2", 2, false);
        let err = ledger
            .record_outbound(&shop_two, outbound(&[(&p, 1, None)]))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::ProductNotFound(_))));
        assert_eq!(stock_of(&db, &p).await, 5);
    }

    #[tokio::test]
    async fn test_total_mismatch_rolls_back() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;
        ledger.record_inbound(&admin(), inbound(&p, 5, None)).await.unwrap();

        let mut request = outbound(&[(&p, 2, Some(900))]);
        request.total_amount_cents = Some(1000);
        let err = ledger.record_outbound(&admin(), request).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::TotalMismatch { .. })));
        assert_eq!(stock_of(&db, &p).await, 5);

        let mut request = outbound(&[(&p, 2, Some(900))]);
        request.total_amount_cents = Some(1800);
        let sold = ledger.record_outbound(&admin(), request).await.unwrap();
        assert_eq!(sold.operation.total_amount_cents, 1800);
    }

    #[tokio::test]
    async fn test_line_totals_add_up() {
        let (db, ledger) = setup().await;
        let a = product(&db, 1, 500, 0).await;
        let b = product(&db, 1, 300, 0).await;
        ledger.record_inbound(&admin(), inbound(&a, 10, None)).await.unwrap();
        ledger.record_inbound(&admin(), inbound(&b, 10, None)).await.unwrap();

        let sold = ledger
            .record_outbound(&admin(), outbound(&[(&a, 3, Some(700)), (&b, 2, None)]))
            .await
            .unwrap();

        let sum: i64 = sold.items.iter().map(|item| item.total_price_cents).sum();
        assert_eq!(sold.operation.total_amount_cents, sum);
        assert_eq!(sold.operation.total_amount_cents, 3 * 700 + 2 * 1200);
        assert_eq!(sold.items[1].unit_price_cents, 1200);
        assert_eq!(
            sold.items.iter().map(|item| item.line_no).collect::<Vec<_>>(),
            vec![1, 2]
        );
        for item in &sold.items {
            assert_eq!(item.before_stock - item.after_stock, item.quantity);
        }
    }

    #[tokio::test]
    async fn test_return_restocks_at_sale_price() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;

        let returned = ledger
            .record_return(
                &admin(),
                ReturnRequest {
                    shop_id: 1,
                    order_id: None,
                    operated_at: None,
                    remark: "damaged box".into(),
                    items: vec![ReturnLine {
                        product_id: p.clone(),
                        quantity: 2,
                        unit_price_cents: None,
                        remark: String::new(),
                    }],
                },
            )
            .await
            .unwrap();

        assert_eq!(stock_of(&db, &p).await, 2);
        assert_eq!(returned.operation.kind, OperationKind::Return);
        assert_eq!(returned.operation.total_amount_cents, 2400);
        assert_eq!(returned.operation.total_profit_cents, 0);
        assert_eq!(returned.operation.payment_status, None);
        assert_eq!(returned.items[0].after_stock - returned.items[0].before_stock, 2);
    }

    #[tokio::test]
    async fn test_return_against_unknown_order() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;

        let err = ledger
            .record_return(
                &admin(),
                ReturnRequest {
                    shop_id: 0,
                    order_id: Some("550e8400-e29b-41d4-a716-446655440000".into()),
                    operated_at: None,
                    remark: String::new(),
                    items: vec![ReturnLine {
                        product_id: p.clone(),
                        quantity: 1,
                        unit_price_cents: None,
                        remark: String::new(),
                    }],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::OrderNotFound(_))));
        assert_eq!(stock_of(&db, &p).await, 0);
    }

    #[tokio::test]
    async fn test_supplier_must_belong_to_shop() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;
        let own = db.suppliers().create(1, "Acme Coatings", "", "").await.unwrap();
        let foreign = db.suppliers().create(2, "Elsewhere Ltd", "", "").await.unwrap();

        let mut request = inbound(&p, 1, None);
        request.supplier_id = Some(foreign.id.clone());
        let err = ledger.record_inbound(&admin(), request).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let mut request = inbound(&p, 1, None);
        request.supplier_id = Some(own.id.clone());
        let received = ledger.record_inbound(&admin(), request).await.unwrap();
        assert_eq!(received.operation.kind.supplier_id(), Some(own.id.as_str()));

        let detail = ledger
            .get_operation_detail(&admin(), &received.operation.id)
            .await
            .unwrap();
        assert_eq!(detail.operation.kind, received.operation.kind);
    }

    #[tokio::test]
    async fn test_payment_status_transitions() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;
        let received = ledger.record_inbound(&admin(), inbound(&p, 5, None)).await.unwrap();
        let sold = ledger
            .record_outbound(&admin(), outbound(&[(&p, 1, None)]))
            .await
            .unwrap();
        let id = sold.operation.id.as_str();

        let unchanged = ledger
            .set_outbound_payment_status(&admin(), id, PaymentStatus::Unpaid)
            .await
            .unwrap();
        assert!(unchanged.payment_finished_at.is_none());

        let paid = ledger
            .set_outbound_payment_status(&admin(), id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.payment_status, Some(PaymentStatus::Paid));
        let stamped = paid.payment_finished_at.unwrap().timestamp_millis();

        let again = ledger
            .set_outbound_payment_status(&admin(), id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(
            again.payment_finished_at.map(|at| at.timestamp_millis()),
            Some(stamped)
        );

        assert!(matches!(
            ledger.set_outbound_payment_status(&admin(), id, PaymentStatus::Unpaid).await,
            Err(DbError::Domain(CoreError::InvalidPaymentTransition { .. }))
        ));
        assert!(matches!(
            ledger.set_outbound_payment_status(&admin(), id, PaymentStatus::Refunding).await,
            Err(DbError::Domain(CoreError::InvalidPaymentStatus(_)))
        ));
        assert!(matches!(
            ledger
                .set_outbound_payment_status(&admin(), &received.operation.id, PaymentStatus::Paid)
                .await,
            Err(DbError::Domain(CoreError::NotOutbound { .. }))
        ));

        let shop_two = Operator::new(22, "clerk-2", 2, false);
        assert!(matches!(
            ledger.set_outbound_payment_status(&shop_two, id, PaymentStatus::Paid).await,
            Err(DbError::Domain(CoreError::CrossShopAccess { .. }))
        ));
    }

    #[tokio::test]
    async fn test_reads_stay_inside_the_shop() {
        let (db, ledger) = setup().await;
        let one = product(&db, 1, 500, 0).await;
        let two = product(&db, 2, 500, 0).await;
        let in_one = ledger.record_inbound(&root(), inbound(&one, 3, None)).await.unwrap();
        let mut request = inbound(&two, 4, None);
        request.shop_id = 2;
        ledger.record_inbound(&root(), request).await.unwrap();

        let shop_two = Operator::new(22, "clerk-2", 2, false);

        let (operations, total) = ledger
            .get_operations(&shop_two, 0, None, Page::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(operations.iter().all(|op| op.shop_id == 2));

        assert!(matches!(
            ledger.get_operations(&shop_two, 1, None, Page::default()).await,
            Err(DbError::Domain(CoreError::CrossShopAccess { .. }))
        ));
        assert!(matches!(
            ledger.get_operation_detail(&shop_two, &in_one.operation.id).await,
            Err(DbError::Domain(CoreError::OperationNotFound(_)))
        ));

        let (_, all) = ledger
            .get_operations(&root(), 0, None, Page::default())
            .await
            .unwrap();
        assert_eq!(all, 2);

        let (history, count) = ledger
            .items_by_shop(&shop_two, 0, Some(two.as_str()), Page::default())
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(history[0].product_id, two);
        let (_, none) = ledger
            .items_by_shop(&shop_two, 0, Some(one.as_str()), Page::default())
            .await
            .unwrap();
        assert_eq!(none, 0);
        assert_eq!(
            db.stock()
                .items_by_shop(ShopScope::All, None, Page::default())
                .await
                .unwrap()
                .1,
            2
        );
    }

    #[tokio::test]
    async fn test_backdated_operation_time() {
        let (db, ledger) = setup().await;
        let p = product(&db, 1, 500, 0).await;
        let when = "2026-01-05T08:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let mut request = inbound(&p, 1, None);
        request.operated_at = Some(when);
        let received = ledger.record_inbound(&admin(), request).await.unwrap();

        assert_eq!(received.operation.created_at, when);
        assert_eq!(received.items[0].created_at, when);
        assert!(received.operation.operation_no.starts_with("SO"));
    }
}
