//! Order record and related value types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::OrderStatus;

// ============================================================================
// Channel
// ============================================================================

/// Fulfillment channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Instant download of a single merged ebook
    Digital,
    /// Manufactured and shipped by the print provider
    Physical,
}

impl Channel {
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Digital => "digital",
            Self::Physical => "physical",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "digital" => Some(Self::Digital),
            "physical" => Some(Self::Physical),
            _ => None,
        }
    }
}

// ============================================================================
// Value types
// ============================================================================

/// Destination address for physical orders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub street1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub postcode: String,
    /// ISO 3166-1 alpha-2
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Public download link for a digital book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadHandle {
    pub url: String,
    /// Unix millis
    pub expires_at: i64,
}

/// A generated document, immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Storage path inside the artifacts bucket
    pub path: String,
    pub byte_size: u64,
    pub page_count: usize,
    /// Unix millis
    pub generated_at: i64,
}

// ============================================================================
// Order
// ============================================================================

/// Persistent order record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    /// Source creation (drawing + story)
    pub creation_id: Uuid,
    pub channel: Channel,
    /// Amount captured, minor units
    pub amount_cents: i64,
    pub currency: String,
    pub cover_color_id: String,
    pub text_color_id: String,
    /// Recipient of delivery notifications
    pub customer_email: Option<String>,
    pub status: OrderStatus,
    pub shipping_address: Option<ShippingAddress>,
    pub provider_job_id: Option<String>,
    pub tracking_number: Option<String>,
    /// Main artifact: the ebook (digital) or interior file (physical)
    pub artifact_path: Option<String>,
    /// Full-wrap cover file (physical only)
    pub cover_artifact_path: Option<String>,
    pub download: Option<DownloadHandle>,
    pub needs_review: bool,
    /// Soft-lock lease start of the current fulfillment run (unix millis)
    pub claimed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

/// Fields written together with a status transition.
/// `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
    pub artifact_path: Option<String>,
    pub cover_artifact_path: Option<String>,
    pub download: Option<DownloadHandle>,
    pub provider_job_id: Option<String>,
    pub completed_at: Option<i64>,
}

impl OrderPatch {
    pub fn none() -> Self {
        Self::default()
    }
}

impl Order {
    /// Apply an already-validated transition in memory
    pub fn apply(&mut self, to: OrderStatus, patch: &OrderPatch, now: i64) {
        self.status = to;
        if let Some(path) = &patch.artifact_path {
            self.artifact_path = Some(path.clone());
        }
        if let Some(path) = &patch.cover_artifact_path {
            self.cover_artifact_path = Some(path.clone());
        }
        if let Some(download) = &patch.download {
            self.download = Some(download.clone());
        }
        if let Some(job_id) = &patch.provider_job_id {
            self.provider_job_id = Some(job_id.clone());
        }
        if let Some(at) = patch.completed_at {
            self.completed_at = Some(at);
        }
        self.updated_at = now;
    }

    /// Digital order that already has its link
    pub fn delivered_download(&self) -> Option<&DownloadHandle> {
        match (self.channel, self.status) {
            (Channel::Digital, OrderStatus::Completed) => self.download.as_ref(),
            _ => None,
        }
    }
}
