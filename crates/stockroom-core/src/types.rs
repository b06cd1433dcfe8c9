//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌──────────────────────┐ │
//! │  │    Product      │   │  StockOperation  │   │ StockOperationItem   │ │
//! │  │  ─────────────  │   │  ──────────────  │   │  ──────────────────  │ │
//! │  │  stock          │◄──│  kind (sum type) │──►│  before/after stock  │ │
//! │  │  cost basis     │   │  total_amount    │   │  cost snapshot       │ │
//! │  │  sale_price     │   │  total_profit    │   │  profit, order_id    │ │
//! │  └─────────────────┘   └──────────────────┘   └──────────┬───────────┘ │
//! │                                                           │             │
//! │  ┌─────────────────┐   ┌──────────────────┐              │ order_id    │
//! │  │   CartItem      │   │     Order        │◄─────────────┘             │
//! │  │   Address       │   │  status/payment  │──► OrderLog (append-only)  │
//! │  │   Supplier      │   │  receiver snap   │                            │
//! │  └─────────────────┘   └──────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! - Entities (products, operations, orders, ...) use UUID v4 string ids
//! - Users, shops and operators are integer ids handed to us by the
//!   authentication layer
//! - Operations and orders also carry a human-readable number

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::ledger::CostBasis;
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A catalog product. Stock and cost basis move only through the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Owning shop.
    pub shop_id: i64,

    pub name: String,

    /// Free-text specification ("5L", "matte white").
    pub specification: String,

    /// Unit of sale ("L", "bucket", "set").
    pub unit: String,

    /// Current sale price.
    pub sale_price_cents: i64,

    /// Landed cost per unit: `product_cost + shipping_cost`.
    pub cost_cents: i64,

    /// Per-unit shipping component of the cost basis.
    pub shipping_cost_cents: i64,

    /// Per-unit purchase component of the cost basis.
    pub product_cost_cents: i64,

    /// Units on hand. Never persisted negative.
    pub stock: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the sale price as Money.
    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents)
    }

    /// Returns the stored cost basis.
    pub fn cost_basis(&self) -> CostBasis {
        CostBasis {
            cost: Money::from_cents(self.cost_cents),
            shipping_cost: Money::from_cents(self.shipping_cost_cents),
            product_cost: Money::from_cents(self.product_cost_cents),
        }
    }

    /// Checks if `quantity` units can leave the shelf right now.
    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }
}

// =============================================================================
// Operation Kind
// =============================================================================

/// Flat discriminant of a stock operation, as stored in the `kind` column
/// and used for list filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Inbound,
    Outbound,
    Return,
}

impl OperationType {
    /// Signed stock movement for `quantity` units of this type.
    pub fn stock_delta(self, quantity: i64) -> i64 {
        match self {
            OperationType::Inbound | OperationType::Return => quantity,
            OperationType::Outbound => -quantity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Inbound => "inbound",
            OperationType::Outbound => "outbound",
            OperationType::Return => "return",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why goods left the shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OutboundChannel {
    /// Storefront checkout; every line links to an order.
    CustomerPurchase,
    /// Back-office sale or write-off entered by an operator.
    Administrative,
}

/// A stock operation's kind together with the fields only that kind may carry.
///
/// ```text
/// Inbound  { supplier_id }   ── supplier only makes sense for receiving goods
/// Outbound { channel }       ── customer purchase vs. administrative
/// Return                     ── goods coming back (lines may link an order)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Inbound { supplier_id: Option<String> },
    Outbound { channel: OutboundChannel },
    Return,
}

impl OperationKind {
    pub fn operation_type(&self) -> OperationType {
        match self {
            OperationKind::Inbound { .. } => OperationType::Inbound,
            OperationKind::Outbound { .. } => OperationType::Outbound,
            OperationKind::Return => OperationType::Return,
        }
    }

    pub fn is_outbound(&self) -> bool {
        matches!(self, OperationKind::Outbound { .. })
    }

    pub fn supplier_id(&self) -> Option<&str> {
        match self {
            OperationKind::Inbound { supplier_id } => supplier_id.as_deref(),
            _ => None,
        }
    }

    pub fn outbound_channel(&self) -> Option<OutboundChannel> {
        match self {
            OperationKind::Outbound { channel } => Some(*channel),
            _ => None,
        }
    }

    /// Rebuilds the kind from its stored columns, rejecting combinations
    /// that put a field on the wrong kind.
    pub fn from_parts(
        operation_type: OperationType,
        channel: Option<OutboundChannel>,
        supplier_id: Option<String>,
    ) -> CoreResult<Self> {
        let misplaced = |field: &str| {
            CoreError::from(crate::error::ValidationError::NotAllowed {
                field: field.to_string(),
                allowed: vec![match field {
                    "supplier_id" => "inbound".to_string(),
                    _ => "outbound".to_string(),
                }],
            })
        };

        match operation_type {
            OperationType::Inbound => {
                if channel.is_some() {
                    return Err(misplaced("outbound_channel"));
                }
                Ok(OperationKind::Inbound { supplier_id })
            }
            OperationType::Outbound => {
                if supplier_id.is_some() {
                    return Err(misplaced("supplier_id"));
                }
                let channel = channel.ok_or_else(|| {
                    CoreError::from(crate::error::ValidationError::Required {
                        field: "outbound_channel".to_string(),
                    })
                })?;
                Ok(OperationKind::Outbound { channel })
            }
            OperationType::Return => {
                if supplier_id.is_some() {
                    return Err(misplaced("supplier_id"));
                }
                if channel.is_some() {
                    return Err(misplaced("outbound_channel"));
                }
                Ok(OperationKind::Return)
            }
        }
    }
}

// =============================================================================
// Operator / Actor
// =============================================================================

/// Who performed an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OperatorType {
    /// Storefront customer.
    User,
    /// Back-office operator.
    Admin,
}

// =============================================================================
// Stock Operation (ledger header)
// =============================================================================

/// Ledger header. Written once with its lines; afterwards only the
/// payment-completion pair may change.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockOperation {
    pub id: String,

    /// Human-readable number: prefix + date + actor fragment + random.
    pub operation_no: String,

    pub kind: OperationKind,

    pub operator_id: i64,
    pub operator_name: String,
    pub operator_type: OperatorType,

    /// Customer the goods went to (outbound only).
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,

    pub shop_id: i64,

    /// Always the sum of the lines' `total_price_cents`.
    pub total_amount_cents: i64,

    /// Sum of line profits (outbound only, zero otherwise).
    pub total_profit_cents: i64,

    /// Deferred-payment tracking (outbound only).
    pub payment_status: Option<PaymentStatus>,

    #[ts(as = "Option<String>")]
    pub payment_finished_at: Option<DateTime<Utc>>,

    pub remark: String,

    /// May be backdated by an administrative caller.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockOperation {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }

    #[inline]
    pub fn total_profit(&self) -> Money {
        Money::from_cents(self.total_profit_cents)
    }
}

// =============================================================================
// Stock Operation Item (ledger line)
// =============================================================================

/// One product's movement within an operation.
/// Uses snapshot pattern: name/spec/unit and cost basis are frozen here.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockOperationItem {
    pub id: String,
    pub operation_id: String,

    /// Position within the operation (processing order).
    pub line_no: i64,

    pub product_id: String,
    pub shop_id: i64,

    /// Product name at time of operation (frozen).
    pub product_name: String,
    /// Specification at time of operation (frozen).
    pub specification: String,
    /// Unit at time of operation (frozen).
    pub unit: String,

    /// Always positive; direction comes from the operation kind.
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// unit_price × quantity.
    pub total_price_cents: i64,

    pub before_stock: i64,
    pub after_stock: i64,

    /// Cost basis snapshot at time of operation.
    pub cost_cents: i64,
    pub shipping_cost_cents: i64,
    pub product_cost_cents: i64,

    /// (unit_price − cost) × quantity on outbound lines, zero otherwise.
    pub profit_cents: i64,

    /// Order this line belongs to (customer purchases and order returns).
    pub order_id: Option<String>,

    pub remark: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockOperationItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    #[inline]
    pub fn profit(&self) -> Money {
        Money::from_cents(self.profit_cents)
    }
}

// =============================================================================
// Order Status / Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    /// Paid, waiting to be shipped.
    AwaitingShipment,
    AwaitingReceipt,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::AwaitingShipment => "awaiting_shipment",
            OrderStatus::AwaitingReceipt => "awaiting_receipt",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::PendingPayment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paying,
    Paid,
    Refunding,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paying => "paying",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunding => "refunding",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

// =============================================================================
// Order
// =============================================================================

/// A customer order. Its goods are the ledger lines carrying its id.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub order_no: String,
    pub user_id: i64,
    pub shop_id: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,

    /// Sum of line totals.
    pub total_amount_cents: i64,
    /// total + shipping − discount.
    pub payment_amount_cents: i64,
    pub shipping_fee_cents: i64,
    pub discount_amount_cents: i64,

    /// Receiver snapshot copied at checkout time.
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_address: String,

    pub address_id: Option<String>,
    pub coupon_id: Option<String>,
    pub note: String,

    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }

    #[inline]
    pub fn payment_amount(&self) -> Money {
        Money::from_cents(self.payment_amount_cents)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// =============================================================================
// Order Log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    CreateOrder,
    PayOrder,
    CancelOrder,
    DeleteOrder,
}

/// Append-only audit row; one per state-changing action on an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLog {
    pub id: String,
    pub order_id: String,
    pub order_no: String,
    pub action: OrderAction,
    /// "user:42", "gateway", ...
    pub operator: String,
    pub operator_type: OperatorType,
    pub content: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CartItem {
    pub id: String,
    pub user_id: i64,
    pub product_id: String,
    pub quantity: i64,
    pub selected: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Address
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Address {
    pub id: String,
    pub user_id: i64,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail: String,
    pub is_default: bool,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Address {
    /// One-line postal address, skipping empty parts.
    pub fn full_address(&self) -> String {
        [&self.province, &self.city, &self.district, &self.detail]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// =============================================================================
// Supplier
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supplier {
    pub id: String,
    pub shop_id: i64,
    pub name: String,
    pub contact: String,
    pub phone: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_delta_direction() {
        assert_eq!(OperationType::Inbound.stock_delta(5), 5);
        assert_eq!(OperationType::Return.stock_delta(2), 2);
        assert_eq!(OperationType::Outbound.stock_delta(12), -12);
    }

    #[test]
    fn test_kind_from_parts() {
        let inbound =
            OperationKind::from_parts(OperationType::Inbound, None, Some("sup-1".into())).unwrap();
        assert_eq!(inbound.supplier_id(), Some("sup-1"));

        let outbound = OperationKind::from_parts(
            OperationType::Outbound,
            Some(OutboundChannel::Administrative),
            None,
        )
        .unwrap();
        assert_eq!(
            outbound.outbound_channel(),
            Some(OutboundChannel::Administrative)
        );
        assert!(outbound.is_outbound());

        assert_eq!(
            OperationKind::from_parts(OperationType::Return, None, None).unwrap(),
            OperationKind::Return
        );
    }

    #[test]
    fn test_kind_rejects_misplaced_fields() {
        assert!(OperationKind::from_parts(
            OperationType::Outbound,
            Some(OutboundChannel::Administrative),
            Some("sup-1".into())
        )
        .is_err());
        assert!(OperationKind::from_parts(OperationType::Outbound, None, None).is_err());
        assert!(OperationKind::from_parts(
            OperationType::Inbound,
            Some(OutboundChannel::CustomerPurchase),
            None
        )
        .is_err());
        assert!(OperationKind::from_parts(OperationType::Return, None, Some("s".into())).is_err());
    }

    #[test]
    fn test_kind_wire_format() {
        let kind = OperationKind::Outbound {
            channel: OutboundChannel::CustomerPurchase,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "outbound", "channel": "customer_purchase"})
        );
    }

    #[test]
    fn test_status_defaults_and_names() {
        assert_eq!(OrderStatus::default(), OrderStatus::PendingPayment);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Unpaid);
        assert_eq!(OrderStatus::AwaitingShipment.to_string(), "awaiting_shipment");
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Refunding).unwrap(),
            "\"refunding\""
        );
    }

    #[test]
    fn test_full_address_skips_blanks() {
        let now = Utc::now();
        let address = Address {
            id: "a".into(),
            user_id: 7,
            recipient_name: "Li".into(),
            recipient_phone: "13800000000".into(),
            province: "Hebei".into(),
            city: "Langfang".into(),
            district: " ".into(),
            detail: "No. 8 Garden Rd".into(),
            is_default: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(address.full_address(), "Hebei Langfang No. 8 Garden Rd");
    }
}
