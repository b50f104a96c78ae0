//! Internal order API
//!
//! - POST /api/orders/{id}/fulfill: re-request or retry fulfillment
//! - GET  /api/orders/{id}/download: download link once the book is ready

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use shared::error::{ApiResponse, AppError, ErrorCode};
use shared::order::Channel;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::fulfillment::FulfillmentError;
use crate::state::AppState;

fn processing() -> Response {
    (
        StatusCode::ACCEPTED,
        Json(ApiResponse::success_with_message(
            "Fulfillment in progress",
            json!({ "status": "processing" }),
        )),
    )
        .into_response()
}

pub async fn fulfill(State(state): State<AppState>, Path(order_id): Path<Uuid>) -> Response {
    match state.dispatcher.fulfill(order_id).await {
        Ok(outcome) => Json(ApiResponse::success(outcome)).into_response(),
        Err(FulfillmentError::InFlight) => processing(),
        Err(e) => AppError::from(e).into_response(),
    }
}

pub async fn download(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> ServiceResult<Response> {
    let order = state.orders.get(order_id).await?.ok_or_else(|| {
        AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", order_id.to_string())
    })?;

    if order.channel == Channel::Physical {
        return Err(AppError::with_message(
            ErrorCode::OrderNotFulfillable,
            "Physical orders have no download",
        )
        .into());
    }
    if let Some(download) = order.delivered_download() {
        return Ok(Json(ApiResponse::success(download.clone())).into_response());
    }
    if order.status.is_terminal() {
        return Err(AppError::new(ErrorCode::OrderTerminal)
            .with_detail("status", order.status.as_db())
            .into());
    }
    // No link yet reads as "still processing"
    Ok(processing())
}
