//! Dispatcher errors and their failure taxonomy

use doodle_pdf::PdfError;
use serde::Serialize;
use shared::BookError;
use shared::error::{AppError, ErrorCode};
use shared::order::OrderStatus;
use thiserror::Error;
use uuid::Uuid;

use crate::error::BoxError;
use crate::lulu::ProviderError;
use crate::orders::TransitionError;
use crate::retry::IsTransient;
use crate::storage::StorageError;

/// How a failed run should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or storage hiccup; re-invoke the dispatcher
    Transient,
    /// Book content cannot produce a complete book
    ContentFatal,
    /// Rendering or merge failed
    AssemblyFatal,
    /// Order is not in a fulfillable status
    NotFulfillable,
    /// Another run holds the order
    InFlight,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::ContentFatal => "content_fatal",
            FailureKind::AssemblyFatal => "assembly_fatal",
            FailureKind::NotFulfillable => "not_fulfillable",
            FailureKind::InFlight => "in_flight",
        }
    }
}

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error("Order is {0}, nothing to fulfill")]
    NotFulfillable(OrderStatus),

    #[error("Another fulfillment run holds this order")]
    InFlight,

    #[error("Creation {0} not found")]
    CreationMissing(Uuid),

    #[error("Book content incomplete: {0}")]
    Content(#[from] BookError),

    #[error("Physical order has no shipping address")]
    MissingShippingAddress,

    #[error("Assembly failed: {0}")]
    Assembly(#[from] PdfError),

    #[error("Order is ready but has no stored artifact")]
    MissingArtifact,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Repository error: {0}")]
    Repository(#[from] BoxError),

    #[error("Assembly task failed: {0}")]
    Task(String),
}

impl FulfillmentError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) | Self::NotFulfillable(_) => FailureKind::NotFulfillable,
            Self::InFlight => FailureKind::InFlight,
            Self::CreationMissing(_) | Self::Content(_) | Self::MissingShippingAddress => {
                FailureKind::ContentFatal
            }
            Self::Assembly(e) => match e {
                PdfError::MissingPageImage(_)
                | PdfError::EmptyBook
                | PdfError::CapacityExceeded { .. } => FailureKind::ContentFatal,
                _ => FailureKind::AssemblyFatal,
            },
            Self::MissingArtifact => FailureKind::AssemblyFatal,
            Self::Storage(_) | Self::Repository(_) | Self::Task(_) => FailureKind::Transient,
            Self::Provider(e) if e.is_transient() => FailureKind::Transient,
            Self::Provider(_) => FailureKind::ContentFatal,
            Self::Transition(TransitionError::Conflict { .. }) => FailureKind::InFlight,
            Self::Transition(TransitionError::Repository(_)) => FailureKind::Transient,
            Self::Transition(_) => FailureKind::NotFulfillable,
        }
    }

    /// Pipeline stage the error came from
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::NotFulfillable(_) | Self::InFlight => "claim",
            Self::CreationMissing(_) | Self::Content(_) | Self::MissingShippingAddress => "content",
            Self::Assembly(_) | Self::Task(_) => "assembly",
            Self::MissingArtifact | Self::Storage(_) => "storage",
            Self::Provider(_) => "print_submission",
            Self::Transition(_) => "transition",
            Self::Repository(_) => "repository",
        }
    }
}

impl From<FulfillmentError> for AppError {
    fn from(e: FulfillmentError) -> Self {
        let message = e.to_string();
        match e {
            FulfillmentError::NotFound(id) => {
                AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id.to_string())
            }
            FulfillmentError::NotFulfillable(status) if status.is_terminal() => {
                AppError::new(ErrorCode::OrderTerminal).with_detail("status", status.as_db())
            }
            FulfillmentError::NotFulfillable(status) => {
                AppError::new(ErrorCode::OrderNotFulfillable).with_detail("status", status.as_db())
            }
            FulfillmentError::InFlight => AppError::new(ErrorCode::FulfillmentInProgress),
            FulfillmentError::Transition(t) => t.into(),
            FulfillmentError::Storage(_) => AppError::with_message(ErrorCode::StorageFailed, message),
            FulfillmentError::Provider(_) => {
                AppError::with_message(ErrorCode::PrintProviderError, message)
            }
            other => match other.kind() {
                FailureKind::ContentFatal => {
                    AppError::with_message(ErrorCode::ContentIncomplete, message)
                }
                FailureKind::AssemblyFatal => {
                    AppError::with_message(ErrorCode::AssemblyFailed, message)
                }
                _ => {
                    tracing::error!(error = %message, "Fulfillment infrastructure error");
                    AppError::new(ErrorCode::InternalError)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_page_is_content_fatal() {
        assert_eq!(
            FulfillmentError::from(BookError::MissingImage(3)).kind(),
            FailureKind::ContentFatal
        );
        assert_eq!(
            FulfillmentError::from(PdfError::MissingPageImage(3)).kind(),
            FailureKind::ContentFatal
        );
        assert_eq!(
            FulfillmentError::from(PdfError::PageCountMismatch {
                expected: 14,
                actual: 13
            })
            .kind(),
            FailureKind::AssemblyFatal
        );
    }

    #[test]
    fn test_network_failures_are_transient() {
        assert_eq!(
            FulfillmentError::from(StorageError::Request("timeout".into())).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            FulfillmentError::from(ProviderError::Transport("reset".into())).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            FulfillmentError::from(ProviderError::Rejected {
                status: 400,
                body: "bad address".into()
            })
            .kind(),
            FailureKind::ContentFatal
        );
    }

    #[test]
    fn test_api_error_codes() {
        let err: AppError = FulfillmentError::InFlight.into();
        assert_eq!(err.code, ErrorCode::FulfillmentInProgress);
        let err: AppError = FulfillmentError::NotFulfillable(OrderStatus::Refunded).into();
        assert_eq!(err.code, ErrorCode::OrderTerminal);
        let err: AppError = FulfillmentError::from(BookError::MissingImage(2)).into();
        assert_eq!(err.code, ErrorCode::ContentIncomplete);
    }
}
