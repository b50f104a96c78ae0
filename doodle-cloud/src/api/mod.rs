//! API routes for doodle-cloud

pub mod auth;
pub mod health;
pub mod orders;
pub mod print_webhook;
pub mod stripe_webhook;

use axum::routing::{get, post};
use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Internal API (bearer token)
    let internal = Router::new()
        .route("/api/orders/{id}/fulfill", post(orders::fulfill))
        .route("/api/orders/{id}/download", get(orders::download))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_internal_token,
        ));

    // Webhooks (signature-verified, raw body)
    let webhooks = Router::new()
        .route("/stripe/webhook", post(stripe_webhook::handle_webhook))
        .route("/webhooks/print", post(print_webhook::handle_webhook));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(webhooks)
        .merge(internal)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
