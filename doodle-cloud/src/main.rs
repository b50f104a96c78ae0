//! doodle-cloud: book fulfillment service
//!
//! Long-running service that:
//! - Turns paid orders into print-ready PDFs (digital download or print job)
//! - Reconciles print provider status webhooks into order status
//! - Moves orders on Stripe payment and refund events

mod api;
mod assets;
mod config;
mod db;
mod email;
mod error;
mod fulfillment;
mod lulu;
mod orders;
mod reconcile;
mod retry;
mod state;
mod storage;
mod stripe;
mod util;

#[cfg(test)]
mod testing;

use config::Config;
use error::BoxError;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "doodle_cloud=info,doodle_pdf=info,tower_http=info".into());
    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting doodle-cloud (env: {})", config.environment);

    let state = AppState::new(&config).await?;
    let app = api::create_router(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("doodle-cloud HTTP listening on {http_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
