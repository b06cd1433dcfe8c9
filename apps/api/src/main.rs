//! Stockroom API server entry point.

use stockroom_api::{app, ApiConfig, AppState};
use stockroom_db::{Database, DbConfig};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,stockroom_api=debug,stockroom_db=debug,sqlx=warn";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Stockroom API server...");

    let config = ApiConfig::load()?;
    info!(
        addr = %config.bind_addr,
        db_path = %config.db_path.display(),
        free_shipping_threshold = config.checkout.free_shipping_threshold_cents,
        shipping_fee = config.checkout.shipping_fee_cents,
        "Configuration loaded"
    );

    let db = Database::new(DbConfig::new(config.db_path.clone()).max_connections(config.db_max_connections)).await?;
    let (total, applied) = db.migration_status().await?;
    info!(applied, total, "Database ready");

    if config.pay_callback_secret.is_none() {
        warn!("STOCKROOM_PAY_CALLBACK_SECRET not set, payment callbacks will be refused");
    }
    let state = AppState::new(db.clone(), config.checkout.clone())
        .with_pay_callback_secret(config.pay_callback_secret.clone());

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the built-in filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
