//! # Checkout Pricing
//!
//! The pure half of the checkout flow: request shape, source selection,
//! server-side line pricing, shipping and totals. `stockroom-db` owns the
//! transactional half (Committing).
//!
//! ## Checkout States
//! ```text
//! ┌────────────┐     ┌──────────┐     ┌────────────┐     ┌───────────┐
//! │ Validating │ ──► │ Pricing  │ ──► │ Committing │ ──► │ Committed │
//! │  (here +   │     │  (here)  │     │  (db tx)   │     └───────────┘
//! │   db reads)│     └──────────┘     └─────┬──────┘
//! └────────────┘                            │ any failure
//!                                           ▼
//!                                     ┌───────────┐
//!                                     │  Aborted  │  nothing persisted
//!                                     └───────────┘
//! ```
//!
//! Prices always come from the product row, never from the client.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Address, Product, StockOperationItem};
use crate::validation::{
    validate_line_count, validate_optional_text, validate_price_cents, validate_quantity,
    validate_text, validate_uuid,
};
use crate::MAX_REMARK_LENGTH;

// =============================================================================
// Configuration
// =============================================================================

/// Immutable checkout settings, passed in at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Subtotals below this pay the flat shipping fee.
    pub free_shipping_threshold_cents: i64,
    pub shipping_fee_cents: i64,
    /// Prefix of order numbers.
    pub order_prefix: String,
    /// Prefix of stock operation numbers.
    pub operation_prefix: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold_cents: 100,
            shipping_fee_cents: 1000,
            order_prefix: "OD".to_string(),
            operation_prefix: "SO".to_string(),
        }
    }
}

impl CheckoutConfig {
    /// Flat fee below the threshold, free at or above it.
    pub fn shipping_fee_for(&self, subtotal: Money) -> Money {
        if subtotal.cents() < self.free_shipping_threshold_cents {
            Money::from_cents(self.shipping_fee_cents)
        } else {
            Money::zero()
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_price_cents("free_shipping_threshold", self.free_shipping_threshold_cents)?;
        validate_price_cents("shipping_fee", self.shipping_fee_cents)?;
        validate_text("order_prefix", &self.order_prefix, 8)?;
        validate_text("operation_prefix", &self.operation_prefix, 8)?;
        Ok(())
    }
}

// =============================================================================
// Request
// =============================================================================

/// A "buy now" line: product and quantity, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BuyNowItem {
    pub product_id: String,
    pub quantity: i64,
}

/// Customer checkout request. Exactly one of `cart_ids` / `buy_now_items`
/// drives the order; the cart wins when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    /// Shop the order is placed with.
    pub shop_id: i64,
    #[serde(default)]
    pub cart_ids: Vec<String>,
    #[serde(default)]
    pub buy_now_items: Vec<BuyNowItem>,
    /// Explicit shipping address; default-or-first when absent.
    #[serde(default)]
    pub address_id: Option<String>,
    #[serde(default)]
    pub coupon_id: Option<String>,
    #[serde(default)]
    pub note: String,
}

/// Where the checkout lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutSource {
    Cart(Vec<String>),
    BuyNow(Vec<BuyNowItem>),
}

impl CheckoutRequest {
    /// Validates the request and picks its source.
    pub fn source(&self) -> CoreResult<CheckoutSource> {
        if self.shop_id <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "shop_id".to_string(),
            }
            .into());
        }
        if let Some(address_id) = &self.address_id {
            validate_uuid("address_id", address_id)?;
        }
        validate_optional_text("note", &self.note, MAX_REMARK_LENGTH)?;

        if !self.cart_ids.is_empty() {
            validate_line_count("cart_ids", self.cart_ids.len())?;
            for id in &self.cart_ids {
                validate_uuid("cart_id", id)?;
            }
            return Ok(CheckoutSource::Cart(self.cart_ids.clone()));
        }

        if !self.buy_now_items.is_empty() {
            validate_line_count("buy_now_items", self.buy_now_items.len())?;
            for item in &self.buy_now_items {
                validate_uuid("product_id", &item.product_id)?;
                validate_quantity(item.quantity)?;
            }
            return Ok(CheckoutSource::BuyNow(self.buy_now_items.clone()));
        }

        Err(ValidationError::Required {
            field: "cart_ids or buy_now_items".to_string(),
        }
        .into())
    }
}

// =============================================================================
// Pricing
// =============================================================================

/// One resolved and priced checkout line, in processing order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutLine {
    pub product_id: String,
    pub product_name: String,
    pub specification: String,
    pub unit: String,
    /// Current sale price of the product.
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub total_price_cents: i64,
    /// Cart row this line consumes, for cart checkouts.
    pub cart_id: Option<String>,
}

impl CheckoutLine {
    pub fn price(product: &Product, quantity: i64, cart_id: Option<String>) -> Self {
        let unit_price = product.sale_price();
        Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            specification: product.specification.clone(),
            unit: product.unit.clone(),
            unit_price_cents: unit_price.cents(),
            quantity,
            total_price_cents: unit_price.multiply_quantity(quantity).cents(),
            cart_id,
        }
    }

    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

/// Order amounts. `payment = total + shipping − discount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutTotals {
    pub total_amount_cents: i64,
    pub shipping_fee_cents: i64,
    pub discount_amount_cents: i64,
    pub payment_amount_cents: i64,
}

impl CheckoutTotals {
    /// Sums the lines and applies shipping. Discounts are not computed here.
    pub fn compute(lines: &[CheckoutLine], config: &CheckoutConfig) -> Self {
        let total: Money = lines.iter().map(CheckoutLine::total_price).sum();
        let shipping = config.shipping_fee_for(total);
        let discount = Money::zero();
        Self {
            total_amount_cents: total.cents(),
            shipping_fee_cents: shipping.cents(),
            discount_amount_cents: discount.cents(),
            payment_amount_cents: (total + shipping - discount).cents(),
        }
    }

    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

// =============================================================================
// Results
// =============================================================================

/// Receiver details copied onto the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AddressSnapshot {
    pub address_id: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub full_address: String,
}

impl From<&Address> for AddressSnapshot {
    fn from(address: &Address) -> Self {
        Self {
            address_id: address.id.clone(),
            recipient_name: address.recipient_name.clone(),
            recipient_phone: address.recipient_phone.clone(),
            full_address: address.full_address(),
        }
    }
}

/// Validating + Pricing without a commit.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutPreview {
    pub lines: Vec<CheckoutLine>,
    pub totals: CheckoutTotals,
    pub address: AddressSnapshot,
}

/// What the customer gets back from a committed checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutReceipt {
    pub order_id: String,
    pub order_no: String,
    pub operation_no: String,
    pub totals: CheckoutTotals,
    pub address: AddressSnapshot,
    pub items: Vec<StockOperationItem>,
}

// =============================================================================
// Unit Tests
// =============================================================================
