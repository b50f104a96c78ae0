//! Shared types for the Doodle book pipeline
//!
//! Common types used across the rendering library and the cloud service:
//! book content, the order lifecycle and its transition rules, and the
//! unified error/response structures.

pub mod book;
pub mod error;
pub mod order;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use book::{BookContent, BookError, StoryPage};
pub use order::{Channel, DownloadHandle, GeneratedArtifact, Order, OrderStatus, ShippingAddress};
