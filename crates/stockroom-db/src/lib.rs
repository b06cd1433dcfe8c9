//! # stockroom-db: Database Layer for Stockroom
//!
//! Storage and transactions for the stock ledger and customer checkout.
//! It uses SQLite through sqlx; every multi-row change runs in one
//! transaction so a failure leaves nothing behind.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  HTTP handler (POST /admin/stock/outbound, POST /orders/checkout)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                  stockroom-db (THIS CRATE)                      │    │
//! │  │                                                                 │    │
//! │  │   ┌──────────────┐   ┌─────────────────┐   ┌───────────────┐    │    │
//! │  │   │   Services   │   │  Repositories   │   │  Migrations   │    │    │
//! │  │   │              │   │                 │   │  (embedded)   │    │    │
//! │  │   │ StockLedger  │──►│ product / stock │   │               │    │    │
//! │  │   │ Checkout-    │──►│ order / cart    │   │ 001_initial   │    │    │
//! │  │   │   Service    │   │ address / supp. │   │ _schema.sql   │    │    │
//! │  │   └──────────────┘   └─────────────────┘   └───────────────┘    │    │
//! │  │          │                                                      │    │
//! │  │          └── one transaction per request; ROLLBACK on any error │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     SQLite Database (WAL)                       │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Table-level reads and transactional statements
//! - [`ledger`] - Inbound / outbound / return recording
//! - [`checkout`] - Order placement and order transitions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_core::CheckoutConfig;
//! use stockroom_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("stockroom.db")).await?;
//!
//! let ledger = db.ledger(CheckoutConfig::default());
//! let detail = ledger.record_outbound(&operator, request).await?;
//!
//! let checkout = db.checkout(CheckoutConfig::default());
//! let receipt = checkout.checkout(user_id, checkout_request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use checkout::{CheckoutService, OrderDetail};
pub use error::{DbError, DbResult};
pub use ledger::{OperationDetail, StockLedger};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    AddressRepository, CartRepository, OrderRepository, ProductRepository, StockRepository,
    SupplierRepository,
};
