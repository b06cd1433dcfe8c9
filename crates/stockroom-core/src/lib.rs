//! # stockroom-core: Pure Domain Logic for Stockroom
//!
//! Everything the stock ledger and the checkout orchestrator decide, as pure
//! functions with zero I/O dependencies. `stockroom-db` runs these
//! decisions inside its transactions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  apps/api (axum, JSON envelope)                 │   │
//! │  │   admin stock routes ─ order/cart routes ─ payment callback    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │         stockroom-db (StockLedger, CheckoutService, repos)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ stockroom-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌─────────┐ ┌─────────┐ │   │
//! │  │   │  money  │ │  types  │ │  ledger  │ │checkout │ │ tenancy │ │   │
//! │  │   │  Money  │ │ Product │ │ profit,  │ │ pricing │ │  shop   │ │   │
//! │  │   │         │ │ Order   │ │ cost     │ │ totals  │ │  scope  │ │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └─────────┘ └─────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, StockOperation, Order, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation and paging
//! - [`ledger`] - Line pricing, profit, cost basis, total reconciliation
//! - [`checkout`] - Checkout request, pricing and configuration
//! - [`tenancy`] - Shop scope resolution for operators
//! - [`numbering`] - Order and operation numbers
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::ledger::price_outbound_line;
//! use stockroom_core::Money;
//!
//! // 12 units sold at 9.00 with a live cost of 6.00
//! let line = price_outbound_line(
//!     Some(Money::from_cents(900)),
//!     Money::from_cents(1200),
//!     Money::from_cents(600),
//!     12,
//! );
//! assert_eq!(line.total_price.cents(), 10_800);
//! assert_eq!(line.profit.cents(), 3_600);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod error;
pub mod ledger;
pub mod money;
pub mod numbering;
pub mod tenancy;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checkout::CheckoutConfig;
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::CostBasis;
pub use money::Money;
pub use tenancy::{Operator, ShopScope};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in one stock operation or checkout.
pub const MAX_LINE_ITEMS: usize = 100;

/// Maximum quantity on a single line.
///
/// ## Business Reason
/// Catches typos (an extra zero on a paint order) before they hit the shelf
/// count.
pub const MAX_LINE_QUANTITY: i64 = 100_000;

/// Maximum price, cost or fee in cents (100 million in major units).
///
/// `MAX_PRICE_CENTS × MAX_LINE_QUANTITY × MAX_LINE_ITEMS` stays well inside
/// `i64`, so line totals, profit and operation sums never overflow.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

/// Largest page a list endpoint will serve.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Maximum length of remarks and order notes.
pub const MAX_REMARK_LENGTH: usize = 500;
