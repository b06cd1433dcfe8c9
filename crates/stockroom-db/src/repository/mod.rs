//! # Repository Module
//!
//! Table-level access for Stockroom.
//!
//! ## Two Kinds of Functions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Repository structs (own a SqlitePool clone)                            │
//! │  ├── db.products().list_by_shop(1, page)      reads, admin edits        │
//! │  ├── db.carts().add(user, product, qty)       cart store                │
//! │  └── db.stock().list_operations(scope, ..)    ledger reads              │
//! │                                                                         │
//! │  Free functions taking `&mut SqliteConnection`                          │
//! │  ├── product::decrement_stock(conn, ..)       conditional decrement     │
//! │  ├── stock::insert_operation(conn, ..)        ledger header             │
//! │  ├── order::cancel_if_unpaid(conn, ..)        status transition         │
//! │  └── cart::delete_for_user(conn, ..)          consume cart rows         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Called by StockLedger / CheckoutService on their open transaction,     │
//! │  so one commit (or one rollback) covers all of them.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`] - Catalog reads and administrative edits
//! - [`SupplierRepository`] - Suppliers per shop
//! - [`AddressRepository`] - Address book surface used by checkout
//! - [`CartRepository`] - Cart rows per user
//! - [`OrderRepository`] - Orders and order logs
//! - [`StockRepository`] - Ledger headers and lines (read-only)

pub mod address;
pub mod cart;
pub mod order;
pub mod product;
pub mod stock;
pub mod supplier;

pub use address::AddressRepository;
pub use cart::CartRepository;
pub use order::OrderRepository;
pub use product::ProductRepository;
pub use stock::StockRepository;
pub use supplier::SupplierRepository;
