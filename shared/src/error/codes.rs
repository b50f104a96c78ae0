//! Unified error codes
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 4xxx: Order errors
//! - 6xxx: Fulfillment errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Represented as u16 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Signature on an inbound webhook did not verify
    SignatureInvalid = 1002,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order is not in a state that allows fulfillment
    OrderNotFulfillable = 4002,
    /// Requested status transition is not allowed
    InvalidTransition = 4003,
    /// Order already reached a terminal status
    OrderTerminal = 4004,

    // ==================== 6xxx: Fulfillment ====================
    /// Another fulfillment run holds the order
    FulfillmentInProgress = 6001,
    /// Book content is incomplete (missing story page image)
    ContentIncomplete = 6002,
    /// Document assembly failed
    AssemblyFailed = 6003,
    /// Print provider rejected or failed the request
    PrintProviderError = 6004,
    /// Artifact storage failed
    StorageFailed = 6005,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
}

impl ErrorCode {
    /// Numeric value of this code
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Default human-readable message
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::InvalidRequest => "Invalid request",
            Self::NotAuthenticated => "Authentication required",
            Self::SignatureInvalid => "Invalid signature",
            Self::OrderNotFound => "Order not found",
            Self::OrderNotFulfillable => "Order cannot be fulfilled in its current status",
            Self::InvalidTransition => "Order status transition not allowed",
            Self::OrderTerminal => "Order already reached a terminal status",
            Self::FulfillmentInProgress => "Fulfillment already in progress",
            Self::ContentIncomplete => "Book content is incomplete",
            Self::AssemblyFailed => "Document assembly failed",
            Self::PrintProviderError => "Print provider error",
            Self::StorageFailed => "Artifact storage failed",
            Self::InternalError => "Internal server error",
            Self::DatabaseError => "Database error",
            Self::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Returned when a u16 does not name an [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::SignatureInvalid),
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderNotFulfillable),
            4003 => Ok(ErrorCode::InvalidTransition),
            4004 => Ok(ErrorCode::OrderTerminal),
            6001 => Ok(ErrorCode::FulfillmentInProgress),
            6002 => Ok(ErrorCode::ContentIncomplete),
            6003 => Ok(ErrorCode::AssemblyFailed),
            6004 => Ok(ErrorCode::PrintProviderError),
            6005 => Ok(ErrorCode::StorageFailed),
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::ConfigError),
            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::OrderNotFound.code(), 4001);
        assert_eq!(ErrorCode::ContentIncomplete.code(), 6002);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_try_from_u16() {
        assert_eq!(ErrorCode::try_from(6003), Ok(ErrorCode::AssemblyFailed));
        assert_eq!(ErrorCode::try_from(999), Err(InvalidErrorCode(999)));
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::FulfillmentInProgress).unwrap();
        assert_eq!(json, "6001");
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorCode::FulfillmentInProgress);
    }
}
