//! Fulfillment dispatcher
//!
//! One run walks an order from `payment_received` to `completed` (digital)
//! or `submitted_to_printer` (physical):
//!
//! ```text
//! payment_received → processing → generating_pdf → pdf_ready → completed
//!                                                             → submitted_to_printer
//! ```
//!
//! The status is the single source of truth for resuming. A run that dies
//! before `pdf_ready` regenerates from scratch under a fresh artifact path;
//! a run resuming at `pdf_ready` re-derives the link or submission from the
//! stored artifacts. A soft-lock lease keeps concurrent runs apart.

mod error;

pub use error::{FailureKind, FulfillmentError};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use doodle_pdf::{AssembledBook, AssemblyOptions, BookAssets, PrintSpec, max_print_story_pages};
use serde::Serialize;
use shared::order::{Channel, DownloadHandle, GeneratedArtifact, Order, OrderPatch, OrderStatus};
use shared::{BookContent, BookError};
use uuid::Uuid;

use crate::assets::AssetResolver;
use crate::db::{CreationSource, FailureRecord, OrderRepository};
use crate::email::{Email, Notifier, notify_in_background};
use crate::lulu::{PrintJobRequest, PrintProvider};
use crate::orders::{OrderStateMachine, TransitionError};
use crate::reconcile::HeldTransitions;
use crate::retry::{RetryConfig, retry_on_transient};
use crate::storage::ObjectStorage;
use crate::util::{artifact_path, now_millis};

const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub artifacts_bucket: String,
    pub download_ttl: Duration,
    pub print_url_ttl: Duration,
    pub claim_lease: Duration,
    pub max_failures_before_review: i64,
    pub print: PrintSpec,
    pub retry: RetryConfig,
}

/// Successful or short-circuited run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FulfillmentOutcome {
    Delivered { download: DownloadHandle },
    AlreadyDelivered { download: DownloadHandle },
    Submitted { provider_job_id: String },
    AlreadySubmitted { provider_job_id: Option<String> },
}

/// Collaborators of one dispatcher
pub struct DispatcherDeps {
    pub orders: Arc<dyn OrderRepository>,
    pub creations: Arc<dyn CreationSource>,
    pub assets: AssetResolver,
    pub storage: Arc<dyn ObjectStorage>,
    pub printer: Arc<dyn PrintProvider>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct Dispatcher {
    orders: Arc<dyn OrderRepository>,
    machine: OrderStateMachine,
    held: HeldTransitions,
    creations: Arc<dyn CreationSource>,
    assets: AssetResolver,
    storage: Arc<dyn ObjectStorage>,
    printer: Arc<dyn PrintProvider>,
    notifier: Arc<dyn Notifier>,
    settings: DispatchSettings,
}

/// Artifacts written by one generation pass
struct Generated {
    main: GeneratedArtifact,
    cover: Option<GeneratedArtifact>,
}

fn is_fulfillable(status: OrderStatus) -> bool {
    status == OrderStatus::PaymentReceived || status.is_processing()
}

/// Idempotency short-circuit for orders that are already past fulfillment
fn already_fulfilled(order: &Order) -> Option<FulfillmentOutcome> {
    if let Some(download) = order.delivered_download() {
        return Some(FulfillmentOutcome::AlreadyDelivered {
            download: download.clone(),
        });
    }
    if order.channel == Channel::Physical
        && order
            .status
            .has_reached(OrderStatus::SubmittedToPrinter, Channel::Physical)
    {
        return Some(FulfillmentOutcome::AlreadySubmitted {
            provider_job_id: order.provider_job_id.clone(),
        });
    }
    None
}

impl Dispatcher {
    pub fn new(deps: DispatcherDeps, settings: DispatchSettings) -> Self {
        Self {
            machine: OrderStateMachine::new(deps.orders.clone()),
            held: HeldTransitions::new(deps.orders.clone(), deps.notifier.clone()),
            orders: deps.orders,
            creations: deps.creations,
            assets: deps.assets,
            storage: deps.storage,
            printer: deps.printer,
            notifier: deps.notifier,
            settings,
        }
    }

    /// Fulfill one order. Safe to call repeatedly and concurrently.
    pub async fn fulfill(&self, order_id: Uuid) -> Result<FulfillmentOutcome, FulfillmentError> {
        let order = self.load_order(order_id).await?;
        if let Some(outcome) = already_fulfilled(&order) {
            tracing::info!(order_id = %order_id, status = %order.status, "Order already fulfilled");
            return Ok(outcome);
        }
        if !is_fulfillable(order.status) {
            return Err(FulfillmentError::NotFulfillable(order.status));
        }

        let lease_ms = self.settings.claim_lease.as_millis() as i64;
        let claimed_at = now_millis();
        if !self.orders.try_claim(order_id, claimed_at, lease_ms).await? {
            tracing::info!(order_id = %order_id, "Fulfillment already in flight");
            return Err(FulfillmentError::InFlight);
        }

        let result = self.run_claimed(order_id).await;

        if let Err(e) = self.orders.release_claim(order_id, claimed_at).await {
            tracing::warn!(order_id = %order_id, error = %e, "Failed to release claim");
        }
        result
    }

    /// Body of a claimed run; every error is recorded before it is returned
    async fn run_claimed(&self, order_id: Uuid) -> Result<FulfillmentOutcome, FulfillmentError> {
        // Re-read under the claim: another run may have finished meanwhile
        let order = self.load_order(order_id).await?;
        if let Some(outcome) = already_fulfilled(&order) {
            return Ok(outcome);
        }
        if !is_fulfillable(order.status) {
            return Err(FulfillmentError::NotFulfillable(order.status));
        }

        let content = self.load_content(&order).await;
        let title = content.as_ref().ok().map(|c| c.title.clone());
        let result = match content {
            Ok(content) => self.run(order.clone(), content).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.record_failure(&order, title.as_deref(), e).await;
        }
        result
    }

    async fn load_order(&self, order_id: Uuid) -> Result<Order, FulfillmentError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(FulfillmentError::NotFound(order_id))
    }

    async fn load_content(&self, order: &Order) -> Result<BookContent, FulfillmentError> {
        let mut content = self
            .creations
            .load(order.creation_id)
            .await?
            .ok_or(FulfillmentError::CreationMissing(order.creation_id))?;
        content.normalize()?;
        Ok(content)
    }

    async fn run(
        &self,
        mut order: Order,
        content: BookContent,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        if order.channel == Channel::Physical && order.shipping_address.is_none() {
            return Err(FulfillmentError::MissingShippingAddress);
        }

        if order.status == OrderStatus::PaymentReceived {
            order = self
                .machine
                .transition(&order, OrderStatus::Processing, OrderPatch::none())
                .await?;
        }
        if order.status == OrderStatus::Processing {
            order = self
                .machine
                .transition(&order, OrderStatus::GeneratingPdf, OrderPatch::none())
                .await?;
        }
        if order.status == OrderStatus::GeneratingPdf {
            let generated = self.generate(&order, &content).await?;
            let patch = OrderPatch {
                artifact_path: Some(generated.main.path.clone()),
                cover_artifact_path: generated.cover.as_ref().map(|c| c.path.clone()),
                ..OrderPatch::none()
            };
            order = self
                .machine
                .transition(&order, OrderStatus::PdfReady, patch)
                .await?;
        }

        match order.channel {
            Channel::Digital => self.deliver(order, &content.title).await,
            Channel::Physical => self.submit(order, &content.title).await,
        }
    }

    /// Resolve assets, assemble, upload
    async fn generate(
        &self,
        order: &Order,
        content: &BookContent,
    ) -> Result<Generated, FulfillmentError> {
        if let Some(page) = content.first_unresolved_page() {
            return Err(BookError::MissingImage(page).into());
        }
        if order.channel == Channel::Physical {
            let max = max_print_story_pages(&self.settings.print);
            if content.page_count() > max {
                return Err(doodle_pdf::PdfError::CapacityExceeded {
                    pages: content.page_count(),
                    max,
                }
                .into());
            }
        }

        let assets = self.resolve_assets(content).await?;

        let options = AssemblyOptions {
            cover_color_id: order.cover_color_id.clone(),
            text_color_id: order.text_color_id.clone(),
            print: self.settings.print.clone(),
        };
        let channel = order.channel;
        let owned = content.clone();
        let book = tokio::task::spawn_blocking(move || {
            doodle_pdf::assemble(channel, &owned, &assets, &options)
        })
        .await
        .map_err(|e| FulfillmentError::Task(e.to_string()))??;

        let generated_at = now_millis();
        match book {
            AssembledBook::Digital { book } => {
                let main = self.upload(order.id, generated_at, "book", book).await?;
                Ok(Generated { main, cover: None })
            }
            AssembledBook::Physical { interior, cover } => {
                let main = self.upload(order.id, generated_at, "interior", interior).await?;
                let cover = self.upload(order.id, generated_at, "cover", cover).await?;
                Ok(Generated {
                    main,
                    cover: Some(cover),
                })
            }
        }
    }

    /// Story images are mandatory, cover art is optional
    async fn resolve_assets(&self, content: &BookContent) -> Result<BookAssets, FulfillmentError> {
        let references: Vec<(u32, String)> = content
            .pages
            .iter()
            .map(|p| (p.page_number, p.image_path.clone().unwrap_or_default()))
            .collect();

        let (pages, hero, original) = tokio::join!(
            self.assets.fetch_all(&references),
            self.assets.fetch_optional(content.hero_image_path.as_deref()),
            self.assets.fetch_optional(content.original_image_path.as_deref()),
        );

        let mut resolved = BTreeMap::new();
        for (page_number, bytes) in pages {
            match bytes {
                Some(bytes) => {
                    resolved.insert(page_number, bytes);
                }
                None => return Err(BookError::MissingImage(page_number).into()),
            }
        }

        Ok(BookAssets {
            hero,
            original,
            pages: resolved,
        })
    }

    async fn upload(
        &self,
        order_id: Uuid,
        generated_at: i64,
        suffix: &str,
        document: doodle_pdf::AssembledDocument,
    ) -> Result<GeneratedArtifact, FulfillmentError> {
        let path = artifact_path(order_id, generated_at, suffix);
        let bucket = self.settings.artifacts_bucket.as_str();
        let byte_size = document.byte_size();
        let bytes = document.bytes;

        retry_on_transient(&self.settings.retry, "artifact_upload", |_| {
            self.storage
                .upload(bucket, &path, bytes.clone(), PDF_CONTENT_TYPE)
        })
        .await
        .into_result()?;

        tracing::info!(
            order_id = %order_id,
            path = %path,
            page_count = document.page_count,
            byte_size,
            "Artifact stored"
        );
        Ok(GeneratedArtifact {
            path,
            byte_size,
            page_count: document.page_count,
            generated_at,
        })
    }

    async fn sign(&self, path: &str, ttl: Duration) -> Result<String, FulfillmentError> {
        let bucket = self.settings.artifacts_bucket.as_str();
        let url = retry_on_transient(&self.settings.retry, "artifact_sign", |_| {
            self.storage.signed_url(bucket, path, ttl)
        })
        .await
        .into_result()?;
        Ok(url)
    }

    /// Digital branch: long-lived link, `completed`, notification
    async fn deliver(&self, order: Order, title: &str) -> Result<FulfillmentOutcome, FulfillmentError> {
        let path = order
            .artifact_path
            .clone()
            .ok_or(FulfillmentError::MissingArtifact)?;
        let ttl = self.settings.download_ttl;
        let url = self.sign(&path, ttl).await?;

        let now = now_millis();
        let download = DownloadHandle {
            url,
            expires_at: now + ttl.as_millis() as i64,
        };
        let patch = OrderPatch {
            download: Some(download.clone()),
            completed_at: Some(now),
            ..OrderPatch::none()
        };
        let order = self
            .machine
            .transition(&order, OrderStatus::Completed, patch)
            .await?;

        tracing::info!(order_id = %order.id, title, expires_at = download.expires_at, "Digital book delivered");
        notify_in_background(
            self.notifier.clone(),
            order.customer_email.clone(),
            Email::BookReady {
                title: title.to_string(),
                download_url: download.url.clone(),
                expires_at: download.expires_at,
            },
        );
        Ok(FulfillmentOutcome::Delivered { download })
    }

    /// Physical branch: submit once, persist the job id, `submitted_to_printer`
    async fn submit(&self, order: Order, title: &str) -> Result<FulfillmentOutcome, FulfillmentError> {
        let job_id = match order.provider_job_id.clone() {
            Some(job_id) => {
                tracing::info!(order_id = %order.id, provider_job_id = %job_id, "Print job already recorded");
                job_id
            }
            None => self.submit_job(&order, title).await?,
        };

        let patch = OrderPatch {
            provider_job_id: Some(job_id.clone()),
            ..OrderPatch::none()
        };
        let order = match self
            .machine
            .transition(&order, OrderStatus::SubmittedToPrinter, patch)
            .await
        {
            Ok(order) => order,
            Err(TransitionError::Conflict { expected }) => {
                // The provider's own status report may land first
                let current = self.load_order(order.id).await?;
                let confirmed = current
                    .status
                    .has_reached(OrderStatus::SubmittedToPrinter, Channel::Physical)
                    && current.provider_job_id.as_deref() == Some(job_id.as_str());
                if !confirmed {
                    return Err(TransitionError::Conflict { expected }.into());
                }
                tracing::info!(
                    order_id = %order.id,
                    provider_job_id = %job_id,
                    status = %current.status,
                    "Provider reported the job before submission was recorded"
                );
                current
            }
            Err(e) => return Err(e.into()),
        };

        notify_in_background(
            self.notifier.clone(),
            order.customer_email.clone(),
            Email::BookSubmitted {
                title: title.to_string(),
            },
        );

        let order_id = order.id;
        if let Err(e) = self.held.replay(order).await {
            // Left in place; the next provider event replays them
            tracing::warn!(order_id = %order_id, error = %e, "Held provider statuses not replayed");
        }
        Ok(FulfillmentOutcome::Submitted {
            provider_job_id: job_id,
        })
    }

    async fn submit_job(&self, order: &Order, title: &str) -> Result<String, FulfillmentError> {
        let shipping_address = order
            .shipping_address
            .clone()
            .ok_or(FulfillmentError::MissingShippingAddress)?;
        let interior_path = order
            .artifact_path
            .as_deref()
            .ok_or(FulfillmentError::MissingArtifact)?;
        let cover_path = order
            .cover_artifact_path
            .as_deref()
            .ok_or(FulfillmentError::MissingArtifact)?;

        let ttl = self.settings.print_url_ttl;
        let job = PrintJobRequest {
            external_id: order.id.to_string(),
            title: title.to_string(),
            interior_url: self.sign(interior_path, ttl).await?,
            cover_url: self.sign(cover_path, ttl).await?,
            shipping_address,
            contact_email: order.customer_email.clone(),
        };

        let job_id = retry_on_transient(&self.settings.retry, "print_submit", |_| {
            self.printer.submit_job(&job)
        })
        .await
        .into_result()?;

        // Persist before the transition so a retry never resubmits
        self.orders
            .set_provider_job_id(order.id, &job_id, now_millis())
            .await?;
        tracing::info!(order_id = %order.id, provider_job_id = %job_id, title, "Print job submitted");
        Ok(job_id)
    }

    async fn record_failure(&self, order: &Order, title: Option<&str>, error: &FulfillmentError) {
        let kind = error.kind();
        tracing::error!(
            order_id = %order.id,
            title = title.unwrap_or(""),
            channel = order.channel.as_db(),
            stage = error.stage(),
            kind = kind.as_str(),
            error = %error,
            "Fulfillment run failed"
        );

        let record = FailureRecord {
            order_id: order.id,
            stage: error.stage(),
            kind: kind.as_str(),
            message: error.to_string(),
            created_at: now_millis(),
        };
        let failures = match self.orders.record_failure(&record).await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Failed to record fulfillment failure");
                return;
            }
        };

        if order.channel == Channel::Physical
            && failures >= self.settings.max_failures_before_review
            && !order.needs_review
        {
            tracing::warn!(order_id = %order.id, failures, "Escalating order to manual review");
            if let Err(e) = self.orders.flag_for_review(order.id, now_millis()).await {
                tracing::error!(order_id = %order.id, error = %e, "Failed to flag order for review");
            }
        }
    }
}
