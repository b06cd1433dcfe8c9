//! # Ledger Arithmetic
//!
//! Pure calculations behind every stock operation: line pricing, profit,
//! stock movement, total reconciliation and the cost-basis decision.
//! `stockroom-db` runs these inside its transactions; nothing here touches
//! storage.
//!
//! ## Line Math
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  inbound   unit_price = landed cost (product_cost + shipping_cost)      │
//! │            after = before + qty                     profit = 0          │
//! │                                                                         │
//! │  outbound  unit_price = supplied price, or the sale price               │
//! │            after = before − qty  (never below 0)                        │
//! │            profit = (unit_price − live cost) × qty                      │
//! │                                                                         │
//! │  return    unit_price = supplied price, or the sale price               │
//! │            after = before + qty                     profit = 0          │
//! │                                                                         │
//! │  every kind: line.total = unit_price × qty                              │
//! │              op.total   = Σ line.total                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Profit uses the cost basis on the product row at the moment of the sale.
//! There is no FIFO or weighted-average costing across inbound batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{OperationType, PaymentStatus};
use crate::validation::{
    validate_line_count, validate_optional_text, validate_price_cents, validate_quantity,
    validate_uuid,
};
use crate::MAX_REMARK_LENGTH;

// =============================================================================
// Cost Basis
// =============================================================================

/// Per-unit cost of a product: `cost = product_cost + shipping_cost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBasis {
    pub cost: Money,
    pub shipping_cost: Money,
    pub product_cost: Money,
}

impl CostBasis {
    /// Builds a consistent basis from its two components.
    pub fn from_components(product_cost: Money, shipping_cost: Money) -> Self {
        Self {
            cost: product_cost + shipping_cost,
            shipping_cost,
            product_cost,
        }
    }
}

/// Decides whether an inbound line changes the product's cost basis.
///
/// Returns the new basis when `supplied_product_cost` differs from the
/// stored product cost, `None` when the stored fields stay as they are.
/// Shipping cost is never changed by an inbound operation.
///
/// ```rust
/// use stockroom_core::ledger::{plan_cost_update, CostBasis};
/// use stockroom_core::Money;
///
/// let stored = CostBasis::from_components(Money::from_cents(500), Money::from_cents(0));
/// let updated = plan_cost_update(&stored, Some(Money::from_cents(600))).unwrap();
/// assert_eq!(updated.cost.cents(), 600);
/// assert!(plan_cost_update(&updated, Some(Money::from_cents(600))).is_none());
/// ```
pub fn plan_cost_update(stored: &CostBasis, supplied_product_cost: Option<Money>) -> Option<CostBasis> {
    let supplied = supplied_product_cost?;
    if supplied == stored.product_cost {
        return None;
    }
    Some(CostBasis::from_components(supplied, stored.shipping_cost))
}

// =============================================================================
// Line Amounts
// =============================================================================

/// Money columns of one ledger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub unit_price: Money,
    pub total_price: Money,
    pub profit: Money,
}

/// Prices an inbound line at the landed unit cost.
pub fn price_inbound_line(basis: &CostBasis, quantity: i64) -> LineAmounts {
    LineAmounts {
        unit_price: basis.cost,
        total_price: basis.cost.multiply_quantity(quantity),
        profit: Money::zero(),
    }
}

/// Prices an outbound line.
///
/// A missing or zero `requested_price` falls back to the sale price.
pub fn price_outbound_line(
    requested_price: Option<Money>,
    sale_price: Money,
    live_cost: Money,
    quantity: i64,
) -> LineAmounts {
    let unit_price = effective_unit_price(requested_price, sale_price);
    LineAmounts {
        unit_price,
        total_price: unit_price.multiply_quantity(quantity),
        profit: (unit_price - live_cost).multiply_quantity(quantity),
    }
}

/// Prices a return line. Returns carry no profit.
pub fn price_return_line(requested_price: Option<Money>, sale_price: Money, quantity: i64) -> LineAmounts {
    let unit_price = effective_unit_price(requested_price, sale_price);
    LineAmounts {
        unit_price,
        total_price: unit_price.multiply_quantity(quantity),
        profit: Money::zero(),
    }
}

fn effective_unit_price(requested: Option<Money>, sale_price: Money) -> Money {
    match requested {
        Some(price) if !price.is_zero() => price,
        _ => sale_price,
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// Before/after stock snapshot of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub before: i64,
    pub after: i64,
}

impl StockMovement {
    /// Reconstructs the movement from the stock a conditional update
    /// returned (`after`).
    pub fn from_after(operation_type: OperationType, after: i64, quantity: i64) -> Self {
        Self {
            before: after - operation_type.stock_delta(quantity),
            after,
        }
    }
}

// =============================================================================
// Total Reconciliation
// =============================================================================

/// Checks a caller-supplied total against the computed sum of the lines.
///
/// `None` means the caller gave no hint. Any supplied figure must match
/// exactly; the returned (and persisted) value is always the computed sum.
pub fn reconcile_total(supplied: Option<Money>, computed: Money) -> CoreResult<Money> {
    match supplied {
        Some(supplied) if supplied != computed => Err(CoreError::TotalMismatch { supplied, computed }),
        _ => Ok(computed),
    }
}

// =============================================================================
// Payment Completion
// =============================================================================

/// Outcome of a payment-completion status change on an outbound operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// Status already matches; nothing to write.
    Unchanged,
    /// unpaid → paid: stamp the completion time.
    MarkPaid,
}

/// Validates a payment-completion change.
///
/// Only `unpaid` and `paid` may be requested. `unpaid → paid` stamps the
/// completion time, repeating the current status is a no-op, and a paid
/// operation cannot be reopened.
pub fn plan_payment_transition(
    operation_no: &str,
    current: PaymentStatus,
    requested: PaymentStatus,
) -> CoreResult<PaymentTransition> {
    if !matches!(requested, PaymentStatus::Unpaid | PaymentStatus::Paid) {
        return Err(CoreError::InvalidPaymentStatus(requested.to_string()));
    }

    match (current, requested) {
        (PaymentStatus::Paid, PaymentStatus::Unpaid) => Err(CoreError::InvalidPaymentTransition {
            operation_no: operation_no.to_string(),
        }),
        (current, requested) if current == requested => Ok(PaymentTransition::Unchanged),
        (_, PaymentStatus::Paid) => Ok(PaymentTransition::MarkPaid),
        _ => Err(CoreError::InvalidPaymentTransition {
            operation_no: operation_no.to_string(),
        }),
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One product received from a supplier.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InboundLine {
    pub product_id: String,
    pub quantity: i64,
    /// New per-unit purchase cost; `None` keeps the stored cost basis.
    #[serde(default)]
    pub product_cost_cents: Option<i64>,
    #[serde(default)]
    pub remark: String,
}

/// Goods arriving from a supplier.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InboundRequest {
    /// Target shop; 0 means the operator's own shop.
    #[serde(default)]
    pub shop_id: i64,
    #[serde(default)]
    pub supplier_id: Option<String>,
    /// Backdated operation time.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub operated_at: Option<DateTime<Utc>>,
    /// Caller's expected total; must match the computed sum when given.
    #[serde(default)]
    pub total_amount_cents: Option<i64>,
    #[serde(default)]
    pub remark: String,
    pub items: Vec<InboundLine>,
}

impl InboundRequest {
    pub fn validate(&self) -> CoreResult<()> {
        validate_line_count("items", self.items.len())?;
        if let Some(supplier_id) = &self.supplier_id {
            validate_uuid("supplier_id", supplier_id)?;
        }
        validate_optional_text("remark", &self.remark, MAX_REMARK_LENGTH)?;
        validate_total_hint(self.total_amount_cents)?;
        for line in &self.items {
            validate_uuid("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
            if let Some(cost) = line.product_cost_cents {
                validate_price_cents("product_cost", cost)?;
            }
            validate_optional_text("remark", &line.remark, MAX_REMARK_LENGTH)?;
        }
        Ok(())
    }
}

/// One product leaving the shelf on an administrative outbound.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OutboundLine {
    pub product_id: String,
    pub quantity: i64,
    /// Agreed unit price; `None` or 0 uses the sale price.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub remark: String,
}

/// Administrative outbound (back-office sale, credit sale, write-off).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OutboundRequest {
    #[serde(default)]
    pub shop_id: i64,
    /// Customer the goods went to, when known.
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub operated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_amount_cents: Option<i64>,
    #[serde(default)]
    pub remark: String,
    pub items: Vec<OutboundLine>,
}

impl OutboundRequest {
    pub fn validate(&self) -> CoreResult<()> {
        validate_line_count("items", self.items.len())?;
        validate_optional_text("remark", &self.remark, MAX_REMARK_LENGTH)?;
        validate_total_hint(self.total_amount_cents)?;
        for line in &self.items {
            validate_uuid("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
            if let Some(price) = line.unit_price_cents {
                validate_price_cents("unit_price", price)?;
            }
            validate_optional_text("remark", &line.remark, MAX_REMARK_LENGTH)?;
        }
        Ok(())
    }
}

/// One product coming back.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnLine {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub remark: String,
}

/// Goods returned to the shelf, optionally against an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnRequest {
    #[serde(default)]
    pub shop_id: i64,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub operated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remark: String,
    pub items: Vec<ReturnLine>,
}

impl ReturnRequest {
    pub fn validate(&self) -> CoreResult<()> {
        validate_line_count("items", self.items.len())?;
        if let Some(order_id) = &self.order_id {
            validate_uuid("order_id", order_id)?;
        }
        validate_optional_text("remark", &self.remark, MAX_REMARK_LENGTH)?;
        for line in &self.items {
            validate_uuid("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
            if let Some(price) = line.unit_price_cents {
                validate_price_cents("unit_price", price)?;
            }
        }
        Ok(())
    }
}

fn validate_total_hint(total: Option<i64>) -> CoreResult<()> {
    if let Some(total) = total {
        if total < 0 {
            return Err(ValidationError::OutOfRange {
                field: "total_amount".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn basis(product_cost: i64, shipping: i64) -> CostBasis {
        CostBasis::from_components(Money::from_cents(product_cost), Money::from_cents(shipping))
    }

    #[test]
    fn test_cost_update_only_when_changed() {
        let stored = basis(500, 40);
        assert!(plan_cost_update(&stored, None).is_none());
        assert!(plan_cost_update(&stored, Some(Money::from_cents(500))).is_none());

        let updated = plan_cost_update(&stored, Some(Money::from_cents(600))).unwrap();
        assert_eq!(updated.product_cost.cents(), 600);
        assert_eq!(updated.shipping_cost.cents(), 40);
        assert_eq!(updated.cost.cents(), 640);
    }

    #[test]
    fn test_outbound_profit_uses_live_cost() {
        // stock 15 @ cost 600, sell 12 @ 900
        let amounts = price_outbound_line(
            Some(Money::from_cents(900)),
            Money::from_cents(1200),
            Money::from_cents(600),
            12,
        );
        assert_eq!(amounts.unit_price.cents(), 900);
        assert_eq!(amounts.total_price.cents(), 10_800);
        assert_eq!(amounts.profit.cents(), 3600);
    }

    #[test]
    fn test_outbound_price_falls_back_to_sale_price() {
        let sale = Money::from_cents(1200);
        let cost = Money::from_cents(1000);
        assert_eq!(price_outbound_line(None, sale, cost, 1).unit_price, sale);
        assert_eq!(
            price_outbound_line(Some(Money::zero()), sale, cost, 2).profit.cents(),
            400
        );
    }

    #[test]
    fn test_below_cost_sale_has_negative_profit() {
        let amounts = price_outbound_line(
            Some(Money::from_cents(400)),
            Money::from_cents(900),
            Money::from_cents(600),
            3,
        );
        assert_eq!(amounts.profit.cents(), -600);
    }

    #[test]
    fn test_inbound_and_return_prices() {
        let inbound = price_inbound_line(&basis(600, 50), 5);
        assert_eq!(inbound.unit_price.cents(), 650);
        assert_eq!(inbound.total_price.cents(), 3250);
        assert!(inbound.profit.is_zero());

        let ret = price_return_line(None, Money::from_cents(900), 2);
        assert_eq!(ret.total_price.cents(), 1800);
        assert!(ret.profit.is_zero());
    }

    #[test]
    fn test_stock_movement() {
        assert_eq!(
            StockMovement::from_after(OperationType::Outbound, 3, 12),
            StockMovement { before: 15, after: 3 }
        );
        assert_eq!(
            StockMovement::from_after(OperationType::Inbound, 15, 5).before,
            10
        );
        assert_eq!(
            StockMovement::from_after(OperationType::Return, 7, 2),
            StockMovement { before: 5, after: 7 }
        );
    }

    #[test]
    fn test_reconcile_total() {
        let computed = Money::from_cents(10_800);
        assert_eq!(reconcile_total(None, computed).unwrap(), computed);
        assert_eq!(reconcile_total(Some(computed), computed).unwrap(), computed);
        assert!(matches!(
            reconcile_total(Some(Money::from_cents(10_000)), computed),
            Err(CoreError::TotalMismatch { .. })
        ));
    }

    #[test]
    fn test_payment_transitions() {
        use PaymentStatus::*;
        assert_eq!(
            plan_payment_transition("SO1", Unpaid, Paid).unwrap(),
            PaymentTransition::MarkPaid
        );
        assert_eq!(
            plan_payment_transition("SO1", Paid, Paid).unwrap(),
            PaymentTransition::Unchanged
        );
        assert_eq!(
            plan_payment_transition("SO1", Unpaid, Unpaid).unwrap(),
            PaymentTransition::Unchanged
        );
        assert!(matches!(
            plan_payment_transition("SO1", Paid, Unpaid),
            Err(CoreError::InvalidPaymentTransition { .. })
        ));
        assert!(matches!(
            plan_payment_transition("SO1", Unpaid, Refunding),
            Err(CoreError::InvalidPaymentStatus(_))
        ));
    }

    #[test]
    fn test_inbound_request_validation() {
        let mut request = InboundRequest {
            shop_id: 0,
            supplier_id: None,
            operated_at: None,
            total_amount_cents: None,
            remark: String::new(),
            items: vec![],
        };
        assert!(request.validate().is_err());

        request.items.push(InboundLine {
            product_id: PRODUCT.into(),
            quantity: 5,
            product_cost_cents: Some(600),
            remark: String::new(),
        });
        assert!(request.validate().is_ok());

        request.items[0].quantity = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_outbound_request_rejects_bad_ids() {
        let request = OutboundRequest {
            shop_id: 1,
            customer_id: None,
            customer_name: None,
            operated_at: None,
            total_amount_cents: None,
            remark: String::new(),
            items: vec![OutboundLine {
                product_id: "p-1".into(),
                quantity: 1,
                unit_price_cents: None,
                remark: String::new(),
            }],
        };
        assert!(matches!(request.validate(), Err(CoreError::Validation(_))));
    }
}
