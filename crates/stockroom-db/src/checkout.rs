//! # Checkout Orchestrator
//!
//! Turns a cart selection or a "buy now" request into an order plus its
//! outbound ledger entry, and runs the order's later transitions (cancel,
//! delete, payment callback).
//!
//! ## Checkout States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Validating ──► Pricing ──► Committing ──┬──► Committed                 │
//! │      │             │            │        └──► Aborted (ROLLBACK)        │
//! │      │             │            │                                       │
//! │      │             │            └─ one transaction:                     │
//! │      │             │                 1. INSERT orders                   │
//! │      │             │                 2. INSERT order_logs (create)      │
//! │      │             │                 3. per line, resolved order:       │
//! │      │             │                      conditional decrement         │
//! │      │             │                 4. INSERT stock_operations         │
//! │      │             │                 5. INSERT stock_operation_items    │
//! │      │             │                 6. DELETE consumed cart rows       │
//! │      │             │                                                    │
//! │      │             └─ current sale price × quantity, shipping fee       │
//! │      └─ source, address, cart rows, products (same shop)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines are booked at the price quoted during Pricing, so the outbound
//! operation total always equals the order's `total_amount`.
//!
//! Stock read during Validating is advisory only. The decrement in step 3
//! re-checks against the live row, so a checkout that loses a race fails
//! with `InsufficientStock` and leaves no order, no ledger rows and the
//! cart as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use stockroom_core::checkout::{
    AddressSnapshot, CheckoutLine, CheckoutPreview, CheckoutReceipt, CheckoutRequest,
    CheckoutSource, CheckoutTotals,
};
use stockroom_core::ledger::{price_outbound_line, price_return_line};
use stockroom_core::numbering::generate_number;
use stockroom_core::validation::Page;
use stockroom_core::{
    Address, CheckoutConfig, CoreError, Money, OperationKind, OperationType, OperatorType,
    Order, OrderAction, OrderLog, OrderStatus, OutboundChannel, PaymentStatus, Product,
    StockOperationItem,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::ledger::{order_operation, sum_lines, take_stock, write_operation, LineDraft};
use crate::repository::address::AddressRepository;
use crate::repository::cart::{self, CartRepository};
use crate::repository::order::{self, OrderRepository};
use crate::repository::product::{return_to_stock, ProductRepository};
use crate::repository::stock::{self, StockRepository};

/// An order with everything that happened to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<StockOperationItem>,
    pub logs: Vec<OrderLog>,
}

/// Customer-facing order service.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    pool: SqlitePool,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(pool: SqlitePool, config: CheckoutConfig) -> Self {
        CheckoutService { pool, config }
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Validates and prices a checkout without writing anything.
    pub async fn preview(&self, user_id: i64, request: &CheckoutRequest) -> DbResult<CheckoutPreview> {
        let source = request.source()?;
        let address = self.resolve_address(user_id, request.address_id.as_deref()).await?;
        let lines = self.resolve_lines(user_id, request.shop_id, &source).await?;
        let totals = CheckoutTotals::compute(&lines, &self.config);

        Ok(CheckoutPreview {
            lines,
            totals,
            address: AddressSnapshot::from(&address),
        })
    }

    /// Places an order: order row, order log, stock decrements, outbound
    /// ledger entry and cart cleanup commit together or not at all.
    pub async fn checkout(&self, user_id: i64, request: CheckoutRequest) -> DbResult<CheckoutReceipt> {
        // Validating
        let source = request.source()?;
        let address = self.resolve_address(user_id, request.address_id.as_deref()).await?;
        let lines = self.resolve_lines(user_id, request.shop_id, &source).await?;

        // Pricing
        let totals = CheckoutTotals::compute(&lines, &self.config);
        let snapshot = AddressSnapshot::from(&address);

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            order_no: generate_number(&self.config.order_prefix, user_id, now),
            user_id,
            shop_id: request.shop_id,
            status: OrderStatus::PendingPayment,
            payment_status: PaymentStatus::Unpaid,
            total_amount_cents: totals.total_amount_cents,
            payment_amount_cents: totals.payment_amount_cents,
            shipping_fee_cents: totals.shipping_fee_cents,
            discount_amount_cents: totals.discount_amount_cents,
            receiver_name: snapshot.recipient_name.clone(),
            receiver_phone: snapshot.recipient_phone.clone(),
            receiver_address: snapshot.full_address.clone(),
            address_id: Some(address.id.clone()),
            coupon_id: request.coupon_id.clone(),
            note: request.note.clone(),
            paid_at: None,
            cancelled_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        // Committing
        let mut tx = self.pool.begin().await?;

        order::insert_order(&mut tx, &order).await?;
        order::append_log(
            &mut tx,
            &order,
            OrderAction::CreateOrder,
            &customer_operator(user_id),
            OperatorType::User,
            "order created",
            now,
        )
        .await?;

        let mut drafts = Vec::with_capacity(lines.len());
        for line in &lines {
            let row = take_stock(&mut tx, &line.product_id, order.shop_id, line.quantity).await?;
            let basis = row.cost_basis();
            let amounts = price_outbound_line(
                Some(Money::from_cents(line.unit_price_cents)),
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
                Some(order.id.clone()),
                "",
            ));
        }

        let (computed, profit) = sum_lines(&drafts);

        let operation = order_operation(
            &self.config,
            OperationKind::Outbound {
                channel: OutboundChannel::CustomerPurchase,
            },
            &order,
            (computed, profit),
            order.note.clone(),
            now,
        );
        let items = write_operation(&mut tx, &operation, drafts).await?;

        if let CheckoutSource::Cart(cart_ids) = &source {
            let deleted = cart::delete_for_user(&mut tx, user_id, cart_ids).await?;
            cart::ensure_all_deleted(deleted, cart_ids)?;
        }

        tx.commit().await?;

        info!(
            order_no = %order.order_no,
            operation_no = %operation.operation_no,
            user_id,
            shop_id = order.shop_id,
            lines = items.len(),
            payment = order.payment_amount_cents,
            "Checkout committed"
        );

        Ok(CheckoutReceipt {
            order_id: order.id,
            order_no: order.order_no,
            operation_no: operation.operation_no,
            totals,
            address: snapshot,
            items,
        })
    }

    async fn resolve_address(&self, user_id: i64, address_id: Option<&str>) -> DbResult<Address> {
        let addresses = AddressRepository::new(self.pool.clone());
        let found = match address_id {
            Some(id) => addresses.get_for_user(user_id, id).await?,
            None => addresses.default_or_first(user_id).await?,
        };
        found.ok_or_else(|| {
            CoreError::AddressNotFound(address_id.unwrap_or("default").to_string()).into()
        })
    }

    /// Resolves priced lines in source order. Every product must be active
    /// and belong to `shop_id`.
    async fn resolve_lines(
        &self,
        user_id: i64,
        shop_id: i64,
        source: &CheckoutSource,
    ) -> DbResult<Vec<CheckoutLine>> {
        let wanted: Vec<(String, i64, Option<String>)> = match source {
            CheckoutSource::Cart(ids) => CartRepository::new(self.pool.clone())
                .get_for_user(user_id, ids)
                .await?
                .into_iter()
                .map(|row| (row.product_id, row.quantity, Some(row.id)))
                .collect(),
            CheckoutSource::BuyNow(items) => items
                .iter()
                .map(|item| (item.product_id.clone(), item.quantity, None))
                .collect(),
        };

        let ids: Vec<String> = wanted.iter().map(|(id, _, _)| id.clone()).collect();
        let products = ProductRepository::new(self.pool.clone()).get_by_ids(&ids).await?;

        wanted
            .into_iter()
            .map(|(product_id, quantity, cart_id)| -> DbResult<CheckoutLine> {
                let product = find_in_shop(&products, &product_id, shop_id)
                    .ok_or_else(|| DbError::from(CoreError::ProductNotFound(product_id.clone())))?;
                Ok(CheckoutLine::price(product, quantity, cart_id))
            })
            .collect()
    }

    // =========================================================================
    // Order transitions
    // =========================================================================

    /// Cancels an unpaid order and puts its goods back on the shelf.
    ///
    /// The status change, the `cancel_order` log and a `return` operation
    /// linked to the order commit together. A paid order is refused with
    /// `RefundNotImplemented` and left untouched.
    pub async fn cancel_order(&self, user_id: i64, order_id: &str) -> DbResult<Order> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let Some(cancelled) = order::cancel_if_unpaid(&mut tx, user_id, order_id, now).await? else {
            let existing = order::find_for_user(&mut tx, user_id, order_id)
                .await?
                .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;
            if existing.payment_status == PaymentStatus::Paid {
                warn!(order_no = %existing.order_no, "Cancel of paid order refused, refund needed");
                return Err(CoreError::RefundNotImplemented {
                    order_no: existing.order_no,
                }
                .into());
            }
            return Err(invalid_status(&existing, "cancel"));
        };

        order::append_log(
            &mut tx,
            &cancelled,
            OrderAction::CancelOrder,
            &customer_operator(user_id),
            OperatorType::User,
            "order cancelled by customer",
            now,
        )
        .await?;

        let sold = stock::sold_items_of_order(&mut tx, &cancelled.id).await?;
        let mut drafts = Vec::with_capacity(sold.len());
        for item in &sold {
            let row = return_to_stock(&mut tx, &item.product_id, item.shop_id, item.quantity)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(item.product_id.clone()))?;
            let basis = row.cost_basis();
            let amounts = price_return_line(Some(item.unit_price()), row.sale_price(), item.quantity);
            drafts.push(LineDraft::new(
                OperationType::Return,
                row,
                item.quantity,
                basis,
                amounts,
                Some(cancelled.id.clone()),
                "",
            ));
        }

        if !drafts.is_empty() {
            let (total, _) = sum_lines(&drafts);
            let operation = order_operation(
                &self.config,
                OperationKind::Return,
                &cancelled,
                (total, Money::zero()),
                format!("cancel order {}", cancelled.order_no),
                now,
            );
            write_operation(&mut tx, &operation, drafts).await?;
        }

        tx.commit().await?;

        info!(order_no = %cancelled.order_no, user_id, restocked_lines = sold.len(), "Order cancelled");
        Ok(cancelled)
    }

    /// Soft-deletes a cancelled or completed order.
    pub async fn delete_order(&self, user_id: i64, order_id: &str) -> DbResult<Order> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let Some(deleted) = order::soft_delete_closed(&mut tx, user_id, order_id, now).await? else {
            let existing = order::find_for_user(&mut tx, user_id, order_id)
                .await?
                .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;
            return Err(invalid_status(&existing, "delete"));
        };

        order::append_log(
            &mut tx,
            &deleted,
            OrderAction::DeleteOrder,
            &customer_operator(user_id),
            OperatorType::User,
            "order deleted by customer",
            now,
        )
        .await?;

        tx.commit().await?;

        info!(order_no = %deleted.order_no, user_id, "Order deleted");
        Ok(deleted)
    }

    /// Applies a payment-gateway callback: the order moves to
    /// awaiting_shipment and its outbound operation is marked paid.
    ///
    /// `amount` is what the gateway collected; it must equal the order's
    /// payment amount or nothing changes. A repeated callback for an order
    /// that is already paid returns the order unchanged.
    pub async fn mark_order_paid(
        &self,
        order_no: &str,
        amount: Money,
        paid_at: DateTime<Utc>,
    ) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;

        let Some(paid) = order::mark_paid(&mut tx, order_no, paid_at).await? else {
            let existing = order::find_by_no(&mut tx, order_no)
                .await?
                .ok_or_else(|| CoreError::OrderNotFound(order_no.to_string()))?;
            ensure_paid_amount(&existing, amount)?;
            if existing.payment_status == PaymentStatus::Paid {
                return Ok(existing);
            }
            return Err(invalid_status(&existing, "pay"));
        };
        // dropping `tx` on mismatch rolls the status change back
        ensure_paid_amount(&paid, amount)?;

        order::append_log(
            &mut tx,
            &paid,
            OrderAction::PayOrder,
            &customer_operator(paid.user_id),
            OperatorType::User,
            "payment confirmed",
            paid_at,
        )
        .await?;
        let operations = stock::mark_order_operations_paid(&mut tx, &paid.id, paid_at).await?;

        tx.commit().await?;

        info!(order_no = %paid.order_no, operations, "Order paid");
        Ok(paid)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The user's orders newest first, soft-deleted ones hidden.
    pub async fn list_orders(
        &self,
        user_id: i64,
        status: Option<OrderStatus>,
        page: Page,
    ) -> DbResult<(Vec<Order>, i64)> {
        self.orders().list_for_user(user_id, status, page).await
    }

    /// One of the user's orders with its ledger lines and log.
    pub async fn order_detail(&self, user_id: i64, order_id: &str) -> DbResult<OrderDetail> {
        let orders = self.orders();
        let order = orders
            .get_for_user(user_id, order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;
        let items = StockRepository::new(self.pool.clone())
            .items_by_order(&order.id)
            .await?;
        let logs = orders.logs(&order.id).await?;
        Ok(OrderDetail { order, items, logs })
    }

    fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }
}

fn customer_operator(user_id: i64) -> String {
    format!("user:{user_id}")
}

fn find_in_shop<'a>(products: &'a [Product], product_id: &str, shop_id: i64) -> Option<&'a Product> {
    products
        .iter()
        .find(|product| product.id == product_id && product.shop_id == shop_id)
}

fn ensure_paid_amount(order: &Order, amount: Money) -> DbResult<()> {
    let expected = Money::from_cents(order.payment_amount_cents);
    if expected != amount {
        warn!(order_no = %order.order_no, %expected, received = %amount, "Payment amount mismatch");
        return Err(CoreError::PaymentAmountMismatch {
            order_no: order.order_no.clone(),
            expected,
            received: amount,
        }
        .into());
    }
    Ok(())
}

fn invalid_status(order: &Order, action: &str) -> DbError {
    CoreError::InvalidOrderStatus {
        order_no: order.order_no.clone(),
        current_status: order.status.to_string(),
        action: action.to_string(),
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::StockLedger;
    use crate::pool::{Database, DbConfig};
    use crate::repository::address::NewAddress;
    use crate::repository::product::{NewProduct, ProductUpdate};
    use stockroom_core::checkout::BuyNowItem;
    use stockroom_core::ledger::{InboundLine, InboundRequest};
    use stockroom_core::Operator;

    const USER: i64 = 7;

    struct Fixture {
        db: Database,
        ledger: StockLedger,
        service: CheckoutService,
    }

    async fn setup() -> Fixture {
        setup_on(DbConfig::in_memory()).await
    }

    async fn setup_on(config: DbConfig) -> Fixture {
        let db = Database::new(config).await.unwrap();
        let ledger = db.ledger(CheckoutConfig::default());
        let service = db.checkout(CheckoutConfig::default());
        db.addresses()
            .create(
                USER,
                NewAddress {
                    recipient_name: "Li Na".into(),
                    recipient_phone: "13800000000".into(),
                    province: "Hebei".into(),
                    city: "Langfang".into(),
                    district: "Sanhe".into(),
                    detail: "No. 8 Garden Rd".into(),
                    is_default: true,
                },
            )
            .await
            .unwrap();
        Fixture { db, ledger, service }
    }

    impl Fixture {
        /// Creates a shop-1 product and shelves `stock` units at its cost.
        async fn product(&self, sale_price: i64, stock: i64) -> String {
            let product = self
                .db
                .products()
                .create(NewProduct {
                    shop_id: 1,
                    name: "Brush".into(),
                    specification: "2in".into(),
                    unit: "pc".into(),
                    sale_price_cents: sale_price,
                    product_cost_cents: 300,
                    shipping_cost_cents: 20,
                })
                .await
                .unwrap();
            if stock > 0 {
                self.ledger
                    .record_inbound(
                        &Operator::new(1, "root", 1, true),
                        InboundRequest {
                            shop_id: 1,
                            supplier_id: None,
                            operated_at: None,
                            total_amount_cents: None,
                            remark: String::new(),
                            items: vec![InboundLine {
                                product_id: product.id.clone(),
                                quantity: stock,
                                product_cost_cents: None,
                                remark: String::new(),
                            }],
                        },
                    )
                    .await
                    .unwrap();
            }
            product.id
        }

        async fn stock_of(&self, product_id: &str) -> i64 {
            self.db.products().get_by_id(product_id).await.unwrap().unwrap().stock
        }
    }

    fn buy_now(product_id: &str, quantity: i64) -> CheckoutRequest {
        CheckoutRequest {
            shop_id: 1,
            buy_now_items: vec![BuyNowItem {
                product_id: product_id.to_string(),
                quantity,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_buy_now_checkout_commits_order_and_ledger() {
        let fx = setup().await;
        let p = fx.product(1500, 10).await;

        let receipt = fx.service.checkout(USER, buy_now(&p, 3)).await.unwrap();

        assert_eq!(receipt.totals.total_amount_cents, 4500);
        assert_eq!(receipt.totals.shipping_fee_cents, 0);
        assert_eq!(receipt.totals.payment_amount_cents, 4500);
        assert_eq!(receipt.address.recipient_name, "Li Na");
        assert!(receipt.order_no.starts_with("OD"));
        assert!(receipt.operation_no.starts_with("SO"));
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].profit_cents, (1500 - 320) * 3);
        assert_eq!(receipt.items[0].order_id.as_deref(), Some(receipt.order_id.as_str()));
        assert_eq!(fx.stock_of(&p).await, 7);

        let detail = fx.service.order_detail(USER, &receipt.order_id).await.unwrap();
        assert_eq!(detail.order.status, OrderStatus::PendingPayment);
        assert_eq!(detail.order.receiver_address, "Hebei Langfang Sanhe No. 8 Garden Rd");
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.logs.len(), 1);
        assert_eq!(detail.logs[0].action, OrderAction::CreateOrder);
        assert_eq!(detail.logs[0].operator, "user:7");

        let (operations, _) = fx
            .db
            .stock()
            .list_operations(stockroom_core::ShopScope::Shop(1), Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(
            operations[0].kind,
            OperationKind::Outbound { channel: OutboundChannel::CustomerPurchase }
        );
        assert_eq!(operations[0].operator_type, OperatorType::User);
        assert_eq!(operations[0].total_amount_cents, 4500);
    }

    #[tokio::test]
    async fn test_small_order_pays_shipping() {
        let fx = setup().await;
        let p = fx.product(40, 10).await;

        let receipt = fx.service.checkout(USER, buy_now(&p, 2)).await.unwrap();
        assert_eq!(receipt.totals.total_amount_cents, 80);
        assert_eq!(receipt.totals.shipping_fee_cents, 1000);
        assert_eq!(receipt.totals.payment_amount_cents, 1080);
    }

    #[tokio::test]
    async fn test_cart_checkout_consumes_cart_rows() {
        let fx = setup().await;
        let a = fx.product(1500, 10).await;
        let b = fx.product(900, 10).await;
        let carts = fx.db.carts();
        let row_a = carts.add(USER, &a, 2).await.unwrap();
        let row_b = carts.add(USER, &b, 1).await.unwrap();

        let request = CheckoutRequest {
            shop_id: 1,
            cart_ids: vec![row_a.id.clone(), row_b.id.clone()],
            ..Default::default()
        };
        let preview = fx.service.preview(USER, &request).await.unwrap();
        assert_eq!(preview.totals.total_amount_cents, 3900);
        assert_eq!(carts.list_for_user(USER, None).await.unwrap().len(), 2);

        let receipt = fx.service.checkout(USER, request).await.unwrap();
        assert_eq!(receipt.totals, preview.totals);
        assert_eq!(receipt.items[0].product_id, a);
        assert_eq!(receipt.items[1].product_id, b);
        assert!(carts.list_for_user(USER, None).await.unwrap().is_empty());
        assert_eq!(fx.stock_of(&a).await, 8);
        assert_eq!(fx.stock_of(&b).await, 9);
    }

    #[tokio::test]
    async fn test_failed_cart_checkout_leaves_everything() {
        let fx = setup().await;
        let a = fx.product(1500, 10).await;
        let b = fx.product(900, 0).await;
        let carts = fx.db.carts();
        let row_a = carts.add(USER, &a, 2).await.unwrap();
        let row_b = carts.add(USER, &b, 1).await.unwrap();

        let err = fx
            .service
            .checkout(
                USER,
                CheckoutRequest {
                    shop_id: 1,
                    cart_ids: vec![row_a.id, row_b.id],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Domain(CoreError::InsufficientStock { ref product_id, .. }) if *product_id == b));
        assert_eq!(fx.stock_of(&a).await, 10);
        assert_eq!(carts.list_for_user(USER, None).await.unwrap().len(), 2);
        let (orders, total) = fx.service.list_orders(USER, None, Page::default()).await.unwrap();
        assert!(orders.is_empty());
        assert_eq!(total, 0);
        let (_, outbound) = fx
            .db
            .stock()
            .list_operations(stockroom_core::ShopScope::All, Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(outbound, 0);
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_exactly_one_wins() {
        let fx = setup().await;
        let p = fx.product(1500, 5).await;

        let first = fx.service.clone();
        let second = fx.service.clone();
        let (p1, p2) = (p.clone(), p.clone());
        let a = tokio::spawn(async move { first.checkout(USER, buy_now(&p1, 4)).await });
        let b = tokio::spawn(async move { second.checkout(USER, buy_now(&p2, 4)).await });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(DbError::Domain(CoreError::InsufficientStock { available: 1, requested: 4, .. }))
        )));
        assert_eq!(fx.stock_of(&p).await, 1);
        let (_, total) = fx.service.list_orders(USER, None, Page::default()).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pooled_checkouts_never_overdraw() {
        let dir = tempfile::tempdir().unwrap();
        let fx = setup_on(DbConfig::new(dir.path().join("race.db")).max_connections(8)).await;
        let p = fx.product(1500, 5).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = fx.service.clone();
                let product_id = p.clone();
                tokio::spawn(async move { service.checkout(USER, buy_now(&product_id, 4)).await })
            })
            .collect();

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => committed += 1,
                Err(DbError::Domain(CoreError::InsufficientStock { available: 1, requested: 4, .. })) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(committed, 1);
        assert_eq!(fx.stock_of(&p).await, 1);
        let (_, orders) = fx.service.list_orders(USER, None, Page::default()).await.unwrap();
        assert_eq!(orders, 1);
        let (_, outbound) = fx
            .db
            .stock()
            .list_operations(stockroom_core::ShopScope::Shop(1), Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(outbound, 1);
        fx.db.close().await;
    }

    #[tokio::test]
    async fn test_checkout_validation() {
        let fx = setup().await;
        let p = fx.product(1500, 5).await;

        let empty = CheckoutRequest {
            shop_id: 1,
            ..Default::default()
        };
        assert!(matches!(
            fx.service.checkout(USER, empty).await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
        assert!(matches!(
            fx.service.checkout(USER, buy_now(&p, 0)).await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));

        let mut other_shop = buy_now(&p, 1);
        other_shop.shop_id = 2;
        assert!(matches!(
            fx.service.checkout(USER, other_shop).await,
            Err(DbError::Domain(CoreError::ProductNotFound(_)))
        ));

        // someone else's cart row
        let theirs = fx.db.carts().add(99, &p, 1).await.unwrap();
        let request = CheckoutRequest {
            shop_id: 1,
            cart_ids: vec![theirs.id],
            ..Default::default()
        };
        assert!(matches!(
            fx.service.checkout(USER, request).await,
            Err(DbError::Domain(CoreError::CartItemNotFound(_)))
        ));
        assert_eq!(fx.stock_of(&p).await, 5);
    }

    #[tokio::test]
    async fn test_address_resolution() {
        let fx = setup().await;
        let p = fx.product(1500, 5).await;

        // no address on file
        assert!(matches!(
            fx.service.checkout(42, buy_now(&p, 1)).await,
            Err(DbError::Domain(CoreError::AddressNotFound(_)))
        ));

        // another user's address
        let foreign = fx
            .db
            .addresses()
            .create(
                42,
                NewAddress {
                    recipient_name: "Zhao Lei".into(),
                    recipient_phone: "13900000000".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let mut request = buy_now(&p, 1);
        request.address_id = Some(foreign.id.clone());
        assert!(matches!(
            fx.service.checkout(USER, request).await,
            Err(DbError::Domain(CoreError::AddressNotFound(_)))
        ));

        // 42 falls back to their only address
        let receipt = fx.service.checkout(42, buy_now(&p, 1)).await.unwrap();
        assert_eq!(receipt.address.address_id, foreign.id);
    }

    #[tokio::test]
    async fn test_cancel_unpaid_order_restocks() {
        let fx = setup().await;
        let p = fx.product(1500, 5).await;
        let receipt = fx.service.checkout(USER, buy_now(&p, 3)).await.unwrap();
        assert_eq!(fx.stock_of(&p).await, 2);

        let cancelled = fx.service.cancel_order(USER, &receipt.order_id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(fx.stock_of(&p).await, 5);

        let detail = fx.service.order_detail(USER, &receipt.order_id).await.unwrap();
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.items[1].before_stock, 2);
        assert_eq!(detail.items[1].after_stock, 5);
        assert_eq!(
            detail.logs.iter().map(|log| log.action).collect::<Vec<_>>(),
            vec![OrderAction::CreateOrder, OrderAction::CancelOrder]
        );

        assert!(matches!(
            fx.service.cancel_order(USER, &receipt.order_id).await,
            Err(DbError::Domain(CoreError::InvalidOrderStatus { .. }))
        ));
        assert!(matches!(
            fx.service.cancel_order(99, &receipt.order_id).await,
            Err(DbError::Domain(CoreError::OrderNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_paid_order_cannot_be_cancelled() {
        let fx = setup().await;
        let p = fx.product(1500, 5).await;
        let receipt = fx.service.checkout(USER, buy_now(&p, 1)).await.unwrap();

        let amount = Money::from_cents(receipt.totals.payment_amount_cents);
        let paid = fx.service.mark_order_paid(&receipt.order_no, amount, Utc::now()).await.unwrap();
        assert_eq!(paid.status, OrderStatus::AwaitingShipment);
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        // gateway retry
        let again = fx.service.mark_order_paid(&receipt.order_no, amount, Utc::now()).await.unwrap();
        assert_eq!(again.status, OrderStatus::AwaitingShipment);

        let (operations, _) = fx
            .db
            .stock()
            .list_operations(stockroom_core::ShopScope::Shop(1), Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(operations[0].payment_status, Some(PaymentStatus::Paid));
        assert!(operations[0].payment_finished_at.is_some());

        assert!(matches!(
            fx.service.cancel_order(USER, &receipt.order_id).await,
            Err(DbError::Domain(CoreError::RefundNotImplemented { .. }))
        ));
        assert_eq!(fx.stock_of(&p).await, 4);

        let detail = fx.service.order_detail(USER, &receipt.order_id).await.unwrap();
        assert_eq!(detail.logs.len(), 2);
        assert_eq!(detail.logs[1].action, OrderAction::PayOrder);
    }

    #[tokio::test]
    async fn test_delete_only_closed_orders() {
        let fx = setup().await;
        let p = fx.product(1500, 5).await;
        let receipt = fx.service.checkout(USER, buy_now(&p, 1)).await.unwrap();

        assert!(matches!(
            fx.service.delete_order(USER, &receipt.order_id).await,
            Err(DbError::Domain(CoreError::InvalidOrderStatus { .. }))
        ));

        fx.service.cancel_order(USER, &receipt.order_id).await.unwrap();
        let deleted = fx.service.delete_order(USER, &receipt.order_id).await.unwrap();
        assert!(deleted.deleted_at.is_some());

        assert!(matches!(
            fx.service.order_detail(USER, &receipt.order_id).await,
            Err(DbError::Domain(CoreError::OrderNotFound(_)))
        ));
        let (orders, _) = fx.service.list_orders(USER, None, Page::default()).await.unwrap();
        assert!(orders.is_empty());

        let logs = fx.db.orders().logs(&receipt.order_id).await.unwrap();
        assert_eq!(logs.last().map(|log| log.action), Some(OrderAction::DeleteOrder));
    }

    #[tokio::test]
    async fn test_list_orders_by_status() {
        let fx = setup().await;
        let p = fx.product(1500, 10).await;
        let first = fx.service.checkout(USER, buy_now(&p, 1)).await.unwrap();
        fx.service.checkout(USER, buy_now(&p, 1)).await.unwrap();
        fx.service.cancel_order(USER, &first.order_id).await.unwrap();

        let (pending, total) = fx
            .service
            .list_orders(USER, Some(OrderStatus::PendingPayment), Page::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(pending[0].status, OrderStatus::PendingPayment);

        let (all, total) = fx.service.list_orders(USER, None, Page::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_pay_unknown_order() {
        let fx = setup().await;
        assert!(matches!(
            fx.service
                .mark_order_paid("OD2026101700070001", Money::from_cents(100), Utc::now())
                .await,
            Err(DbError::Domain(CoreError::OrderNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_underpaid_callback_leaves_order_unpaid() {
        let fx = setup().await;
        let p = fx.product(1500, 5).await;
        let receipt = fx.service.checkout(USER, buy_now(&p, 2)).await.unwrap();
        assert_eq!(receipt.totals.payment_amount_cents, 3000);

        let err = fx
            .service
            .mark_order_paid(&receipt.order_no, Money::from_cents(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::PaymentAmountMismatch { ref expected, ref received, .. })
                if expected.cents() == 3000 && received.cents() == 1
        ));

        let detail = fx.service.order_detail(USER, &receipt.order_id).await.unwrap();
        assert_eq!(detail.order.status, OrderStatus::PendingPayment);
        assert_eq!(detail.order.payment_status, PaymentStatus::Unpaid);
        assert!(detail.order.paid_at.is_none());
        assert_eq!(detail.logs.len(), 1);
        let (operations, _) = fx
            .db
            .stock()
            .list_operations(stockroom_core::ShopScope::Shop(1), Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(operations[0].payment_status, Some(PaymentStatus::Unpaid));
    }

    #[tokio::test]
    async fn test_checkout_books_quoted_price() {
        let fx = setup().await;
        let p = fx.product(1500, 5).await;
        let preview = fx.service.preview(USER, &buy_now(&p, 2)).await.unwrap();
        assert_eq!(preview.totals.total_amount_cents, 3000);

        fx.db
            .products()
            .update_details(
                &p,
                1,
                &ProductUpdate {
                    name: "Brush".into(),
                    specification: "2in".into(),
                    unit: "pc".into(),
                    sale_price_cents: 1700,
                },
            )
            .await
            .unwrap();

        let receipt = fx.service.checkout(USER, buy_now(&p, 2)).await.unwrap();
        assert_eq!(receipt.totals.total_amount_cents, 3400);
        assert_eq!(receipt.items[0].unit_price_cents, 1700);

        let (operations, _) = fx
            .db
            .stock()
            .list_operations(stockroom_core::ShopScope::Shop(1), Some(OperationType::Outbound), Page::default())
            .await
            .unwrap();
        assert_eq!(operations[0].total_amount_cents, receipt.totals.total_amount_cents);
        assert_eq!(operations[0].total_profit_cents, (1700 - 320) * 2);
    }
}
