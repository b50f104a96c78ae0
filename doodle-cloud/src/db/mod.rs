//! Database access layer

pub mod creations;
pub mod orders;

pub use creations::{CreationSource, PgCreationSource};
pub use orders::{FailureRecord, OrderRepository, PgOrderRepository, RepoResult};
