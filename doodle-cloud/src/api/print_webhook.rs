//! Print provider webhook (reconciliation listener)
//!
//! POST /webhooks/print: raw body for HMAC verification.
//! 200 once the event is durably recorded (no-ops included), 400 on a bad
//! signature or payload, 404 for an unknown job, 500 on persistence failure.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::lulu;
use crate::reconcile::ReconcileError;
use crate::state::AppState;
use crate::util::sha256_hex;

pub const SIGNATURE_HEADER: &str = "lulu-hmac-sha256";

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!("Missing print webhook signature");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(e) = lulu::verify_webhook_signature(&body, signature, &state.print_webhook_secret) {
        tracing::warn!(error = e, "Print webhook signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    let event = match lulu::parse_webhook(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed print webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    // Payloads carry no event id; identical bodies are the same event
    let event_id = sha256_hex(&body);
    tracing::info!(
        provider_job_id = %event.job_id,
        provider_status = %event.status,
        "Received print status change"
    );

    match state.reconciler.handle(&event, &event_id).await {
        Ok(outcome) => {
            tracing::info!(provider_job_id = %event.job_id, ?outcome, "Print event reconciled");
            StatusCode::OK
        }
        Err(ReconcileError::UnknownJob(job_id)) => {
            tracing::warn!(provider_job_id = %job_id, "Print event for unknown job");
            StatusCode::NOT_FOUND
        }
        Err(e) => {
            tracing::error!(provider_job_id = %event.job_id, error = %e, "Failed to reconcile print event");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
