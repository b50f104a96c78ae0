//! Stripe webhook handler
//!
//! POST /stripe/webhook: moves paid orders to `payment_received` and starts
//! fulfillment; refunds move pre-terminal orders to `refunded`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use shared::order::{OrderPatch, OrderStatus};
use uuid::Uuid;

use crate::orders::TransitionError;
use crate::state::AppState;
use crate::stripe;
use crate::util::now_millis;

/// Handle incoming Stripe webhook events
///
/// Must receive raw body (not JSON) for HMAC signature verification.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing Stripe-Signature header");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(e) = stripe::verify_webhook_signature(&body, sig_header, &state.stripe_webhook_secret) {
        tracing::warn!(error = e, "Webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };

    let event_type = event["type"].as_str().unwrap_or("");
    let Some(event_id) = event["id"].as_str() else {
        tracing::warn!("Webhook event missing id");
        return StatusCode::BAD_REQUEST;
    };
    tracing::info!(event_type, event_id, "Received Stripe webhook");

    // Idempotency: INSERT first, check rows_affected
    match state
        .orders
        .record_payment_event(event_id, event_type, now_millis())
        .await
    {
        Ok(false) => {
            tracing::info!(event_id, "Duplicate webhook event, skipping");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::error!(error = %e, "DB error recording webhook event");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        Ok(true) => {}
    }

    let status = match event_type {
        "checkout.session.completed" => handle_checkout_completed(&state, &event).await,
        "charge.refunded" => handle_charge_refunded(&state, &event).await,
        _ => {
            tracing::debug!(event_type, "Unhandled webhook event type");
            StatusCode::OK
        }
    };

    if status.is_server_error()
        && let Err(e) = state.orders.forget_payment_event(event_id).await
    {
        tracing::error!(event_id, error = %e, "Failed to forget webhook event");
    }
    status
}

fn order_id_of(event: &serde_json::Value) -> Option<Uuid> {
    event["data"]["object"]["metadata"]["order_id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Status for a transition triggered by a payment event
fn transition_status(result: Result<(), TransitionError>, order_id: Uuid, to: OrderStatus) -> StatusCode {
    match result {
        Ok(()) => StatusCode::OK,
        Err(TransitionError::Repository(e)) => {
            tracing::error!(order_id = %order_id, error = %e, "DB error applying payment event");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            // Already past this point or unknown; nothing for Stripe to retry
            tracing::warn!(order_id = %order_id, %to, error = %e, "Payment event not applied");
            StatusCode::OK
        }
    }
}

/// checkout.session.completed → payment_received, then fulfill in the background
async fn handle_checkout_completed(state: &AppState, event: &serde_json::Value) -> StatusCode {
    let Some(order_id) = order_id_of(event) else {
        tracing::warn!("checkout.session.completed missing metadata.order_id");
        return StatusCode::OK;
    };

    let result = state
        .machine
        .transition_by_id(order_id, OrderStatus::PaymentReceived, OrderPatch::none())
        .await;
    let applied = result.is_ok();
    let status = transition_status(result.map(|_| ()), order_id, OrderStatus::PaymentReceived);

    if applied {
        let dispatcher = state.dispatcher.clone();
        tokio::spawn(async move {
            match dispatcher.fulfill(order_id).await {
                Ok(outcome) => tracing::info!(order_id = %order_id, ?outcome, "Order fulfilled"),
                Err(e) => tracing::warn!(order_id = %order_id, error = %e, "Fulfillment run did not finish"),
            }
        });
    }
    status
}

/// charge.refunded → refunded
async fn handle_charge_refunded(state: &AppState, event: &serde_json::Value) -> StatusCode {
    let Some(order_id) = order_id_of(event) else {
        tracing::debug!("charge.refunded without metadata.order_id");
        return StatusCode::OK;
    };

    let result = state
        .machine
        .transition_by_id(order_id, OrderStatus::Refunded, OrderPatch::none())
        .await;
    transition_status(result.map(|_| ()), order_id, OrderStatus::Refunded)
}
