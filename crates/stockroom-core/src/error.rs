//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockroom-db errors (separate crate)                                  │
//! │  └── DbError          - Database failures, carries CoreError through   │
//! │                                                                         │
//! │  HTTP errors (apps/api)                                                 │
//! │  └── ApiError         - What clients see ({code, message})             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Client       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include the identifying key in every not-found message
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the ledger, checkout and tenancy logic.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found (or is outside the caller's shop).
    ///
    /// ## When This Occurs
    /// - Product ID doesn't exist
    /// - Product was deactivated
    /// - Product belongs to a different shop than the operation
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Stock operation cannot be found in the caller's scope.
    #[error("Stock operation not found: {0}")]
    OperationNotFound(String),

    /// Order cannot be found for this user (or was soft-deleted).
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Shipping address cannot be found for this user.
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// Cart row cannot be found for this user.
    #[error("Cart item not found: {0}")]
    CartItemNotFound(String),

    /// Not enough stock to complete an outbound movement.
    ///
    /// ## When This Occurs
    /// - Admin outbound asks for more than is on the shelf
    /// - Checkout loses a race: stock was sufficient when priced, but a
    ///   concurrent checkout committed first
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (qty: 4)
    ///      │
    ///      ▼
    /// UPDATE ... WHERE stock >= 4 → 0 rows
    ///      │
    ///      ▼
    /// InsufficientStock { available: 1, requested: 4 }  (short by 3)
    ///      │
    ///      ▼
    /// Whole transaction rolled back
    /// ```
    #[error(
        "Insufficient stock for {product_name}: available {available}, requested {requested}, short by {}",
        .requested - .available
    )]
    InsufficientStock {
        product_id: String,
        product_name: String,
        available: i64,
        requested: i64,
    },

    /// A non-root operator targeted another shop.
    ///
    /// ## When This Occurs
    /// - Request body/query names a `shop_id` other than the operator's own
    /// - Operator is not root
    #[error("Operator of shop {operator_shop} cannot act on shop {target_shop}")]
    CrossShopAccess { operator_shop: i64, target_shop: i64 },

    /// Caller-supplied total disagrees with the sum of the line totals.
    #[error("Total amount mismatch: supplied {supplied}, computed {computed}")]
    TotalMismatch { supplied: Money, computed: Money },

    /// Order is not in a state that allows the requested action.
    ///
    /// ## When This Occurs
    /// - Cancelling an order that is already cancelled or completed
    /// - Deleting an order that is still open
    /// - Paying an order that is no longer pending payment
    #[error("Order {order_no} is {current_status}, cannot {action}")]
    InvalidOrderStatus {
        order_no: String,
        current_status: String,
        action: String,
    },

    /// Payment-completion status only applies to outbound operations.
    #[error("Stock operation {operation_no} is {kind}, payment status applies to outbound only")]
    NotOutbound { operation_no: String, kind: String },

    /// Only `unpaid` and `paid` may be set on an outbound operation.
    #[error("Payment status {0} cannot be set on a stock operation (allowed: unpaid, paid)")]
    InvalidPaymentStatus(String),

    /// A paid outbound operation cannot be reopened.
    #[error("Stock operation {operation_no} is already paid")]
    InvalidPaymentTransition { operation_no: String },

    /// The gateway reported a paid amount other than what the order asks for.
    ///
    /// ## When This Occurs
    /// - Payment callback carries a `payment_amount` that differs from the
    ///   order's `payment_amount`; the order stays unpaid
    #[error("Order {order_no} expects payment of {expected}, gateway reported {received}")]
    PaymentAmountMismatch {
        order_no: String,
        expected: Money,
        received: Money,
    },

    /// Cancelling a paid order needs a refund, which is not wired up.
    ///
    /// ## When This Occurs
    /// - Customer cancels after paying; the order stays as it is and has to
    ///   be reconciled by hand until refunds exist
    #[error("Order {order_no} is paid; refunds are not implemented")]
    RefundNotImplemented { order_no: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InsufficientStock error.
    pub fn insufficient_stock(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        available: i64,
        requested: i64,
    ) -> Self {
        CoreError::InsufficientStock {
            product_id: product_id.into(),
            product_name: product_name.into(),
            available,
            requested,
        }
    }

    /// Units missing for an InsufficientStock error, `None` otherwise.
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => Some(requested - available),
            _ => None,
        }
    }

    /// Whether the error means "does not exist (for you)".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::ProductNotFound(_)
                | CoreError::OperationNotFound(_)
                | CoreError::OrderNotFound(_)
                | CoreError::AddressNotFound(_)
                | CoreError::CartItemNotFound(_)
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any transaction opens, so they never have side effects.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_names_product_and_shortfall() {
        let err = CoreError::insufficient_stock("p-1", "Wall paint 5L", 1, 4);
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Wall paint 5L: available 1, requested 4, short by 3"
        );
        assert_eq!(err.shortfall(), Some(3));
    }

    #[test]
    fn test_shortfall_only_for_stock_errors() {
        assert_eq!(CoreError::OrderNotFound("x".into()).shortfall(), None);
    }

    #[test]
    fn test_not_found_classification() {
        assert!(CoreError::ProductNotFound("p".into()).is_not_found());
        assert!(CoreError::AddressNotFound("a".into()).is_not_found());
        assert!(!CoreError::CrossShopAccess {
            operator_shop: 2,
            target_shop: 1
        }
        .is_not_found());
    }

    #[test]
    fn test_total_mismatch_message() {
        let err = CoreError::TotalMismatch {
            supplied: Money::from_cents(1000),
            computed: Money::from_cents(999),
        };
        assert_eq!(
            err.to_string(),
            "Total amount mismatch: supplied 10.00, computed 9.99"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: items is required");
    }
}
