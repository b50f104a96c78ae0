//! Error types for the document library

use thiserror::Error;

/// Rendering / assembly error types
#[derive(Debug, Error)]
pub enum PdfError {
    /// Embedded raster could not be decoded or re-encoded
    #[error("Image error: {0}")]
    Image(String),

    /// PDF object model error
    #[error("Document error: {0}")]
    Document(#[from] lopdf::Error),

    /// IO error while serializing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A story page has no image bytes; interior story pages are mandatory
    #[error("Story page {0} has no image")]
    MissingPageImage(u32),

    /// Book has no story pages
    #[error("Book has no story pages")]
    EmptyBook,

    /// Story does not fit the provider's fixed interior page count
    #[error("Story has {pages} pages, print interior holds at most {max}")]
    CapacityExceeded { pages: usize, max: usize },

    /// Merged output does not have the expected number of pages
    #[error("Page count mismatch: expected {expected}, got {actual}")]
    PageCountMismatch { expected: usize, actual: usize },
}

impl From<image::ImageError> for PdfError {
    fn from(e: image::ImageError) -> Self {
        PdfError::Image(e.to_string())
    }
}

/// Result type for document operations
pub type PdfResult<T> = Result<T, PdfError>;
