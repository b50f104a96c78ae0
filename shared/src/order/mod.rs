//! Book order lifecycle
//!
//! The order record is the single source of truth for fulfillment progress.
//! This module holds the record itself and the pure transition rules; the
//! persistence-backed state machine lives in the cloud service.

pub mod status;
pub mod types;

pub use status::{Disposition, OrderStatus, classify};
pub use types::{
    Channel, DownloadHandle, GeneratedArtifact, Order, OrderPatch, ShippingAddress,
};
