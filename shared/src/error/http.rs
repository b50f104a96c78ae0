//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::NotFound | Self::OrderNotFound => StatusCode::NOT_FOUND,

            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,

            // 409 Conflict
            Self::OrderNotFulfillable
            | Self::InvalidTransition
            | Self::OrderTerminal
            | Self::FulfillmentInProgress => StatusCode::CONFLICT,

            // 422: content problems the client cannot fix by retrying
            Self::ContentIncomplete | Self::AssemblyFailed => StatusCode::UNPROCESSABLE_ENTITY,

            // 502: upstream collaborator failed
            Self::PrintProviderError | Self::StorageFailed => StatusCode::BAD_GATEWAY,

            Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request (default for validation/request errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
