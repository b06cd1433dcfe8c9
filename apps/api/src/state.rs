//! Shared application state.

use std::sync::Arc;

use stockroom_core::CheckoutConfig;
use stockroom_db::{CheckoutService, Database, StockLedger};

/// Handles every request needs. Cloning is cheap: the services share one
/// pool and the secret is reference-counted.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub ledger: StockLedger,
    pub checkout: CheckoutService,
    /// Expected `X-Gateway-Secret` on payment callbacks; `None` refuses them all.
    pub pay_callback_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: Database, config: CheckoutConfig) -> Self {
        AppState {
            ledger: db.ledger(config.clone()),
            checkout: db.checkout(config),
            db,
            pay_callback_secret: None,
        }
    }

    pub fn with_pay_callback_secret(mut self, secret: Option<String>) -> Self {
        self.pay_callback_secret = secret.map(Arc::from);
        self
    }
}
