//! In-memory collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::order::{Channel, Order, OrderPatch, OrderStatus, ShippingAddress};
use shared::{BookContent, StoryPage};
use uuid::Uuid;

use crate::assets::{Fetch, FetchError};
use crate::db::{CreationSource, FailureRecord, OrderRepository, RepoResult};
use crate::email::{Email, Notifier};
use crate::error::BoxError;
use crate::lulu::{PrintJobRequest, PrintProvider, ProviderError};
use crate::storage::{ObjectStorage, StorageError};

pub const IMAGES_BUCKET: &str = "images";
pub const ARTIFACTS_BUCKET: &str = "artifacts";

// ============================================================================
// Orders
// ============================================================================

#[derive(Default)]
struct OrdersInner {
    orders: HashMap<Uuid, Order>,
    transitions: Vec<(Uuid, OrderStatus, OrderStatus)>,
    failures: Vec<FailureRecord>,
    provider_events: HashSet<String>,
    held: Vec<(Uuid, OrderStatus)>,
    payment_events: HashSet<String>,
    fail_status_writes: bool,
    status_on_job_recorded: Option<OrderStatus>,
}

#[derive(Default)]
pub struct MemoryOrders {
    inner: Mutex<OrdersInner>,
}

impl MemoryOrders {
    pub fn insert(&self, order: Order) {
        self.inner.lock().orders.insert(order.id, order);
    }

    pub fn status_of(&self, id: Uuid) -> Option<OrderStatus> {
        self.inner.lock().orders.get(&id).map(|o| o.status)
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Order> {
        self.inner.lock().orders.get(&id).cloned()
    }

    pub fn transitions_of(&self, id: Uuid) -> Vec<(OrderStatus, OrderStatus)> {
        self.inner
            .lock()
            .transitions
            .iter()
            .filter(|(order_id, _, _)| *order_id == id)
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }

    pub fn failures_of(&self, id: Uuid) -> Vec<FailureRecord> {
        self.inner
            .lock()
            .failures
            .iter()
            .filter(|f| f.order_id == id)
            .cloned()
            .collect()
    }

    pub fn held_of(&self, id: Uuid) -> Vec<OrderStatus> {
        self.inner
            .lock()
            .held
            .iter()
            .filter(|(order_id, _)| *order_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    /// Make status compare-and-swap fail with a repository error
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_status_writes = fail;
    }

    /// Move the order to `status` as soon as a provider job id is recorded,
    /// as a provider webhook racing the dispatcher would
    pub fn advance_when_job_recorded(&self, status: OrderStatus) {
        self.inner.lock().status_on_job_recorded = Some(status);
    }
}

#[async_trait]
impl OrderRepository for MemoryOrders {
    async fn get(&self, id: Uuid) -> RepoResult<Option<Order>> {
        Ok(self.snapshot(id))
    }

    async fn find_by_provider_job(&self, job_id: &str) -> RepoResult<Option<Order>> {
        Ok(self
            .inner
            .lock()
            .orders
            .values()
            .find(|o| o.provider_job_id.as_deref() == Some(job_id))
            .cloned())
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: OrderStatus,
        to: OrderStatus,
        patch: &OrderPatch,
        now: i64,
    ) -> RepoResult<bool> {
        let mut inner = self.inner.lock();
        if inner.fail_status_writes {
            return Err("database unavailable".into());
        }
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != expected {
            return Ok(false);
        }
        order.apply(to, patch, now);
        inner.transitions.push((id, expected, to));
        Ok(true)
    }

    async fn try_claim(&self, id: Uuid, now: i64, lease_ms: i64) -> RepoResult<bool> {
        let mut inner = self.inner.lock();
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(false);
        };
        match order.claimed_at {
            Some(at) if at > now - lease_ms => Ok(false),
            _ => {
                order.claimed_at = Some(now);
                Ok(true)
            }
        }
    }

    async fn release_claim(&self, id: Uuid, claimed_at: i64) -> RepoResult<()> {
        if let Some(order) = self.inner.lock().orders.get_mut(&id)
            && order.claimed_at == Some(claimed_at)
        {
            order.claimed_at = None;
        }
        Ok(())
    }

    async fn set_provider_job_id(&self, id: Uuid, job_id: &str, now: i64) -> RepoResult<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(order) = inner.orders.get_mut(&id) {
            order.provider_job_id = Some(job_id.to_string());
            order.updated_at = now;
            if let Some(to) = inner.status_on_job_recorded.take() {
                inner.transitions.push((id, order.status, to));
                order.apply(to, &OrderPatch::none(), now);
            }
        }
        Ok(())
    }

    async fn set_tracking_number(&self, id: Uuid, tracking: &str, now: i64) -> RepoResult<()> {
        if let Some(order) = self.inner.lock().orders.get_mut(&id) {
            order.tracking_number = Some(tracking.to_string());
            order.updated_at = now;
        }
        Ok(())
    }

    async fn record_failure(&self, failure: &FailureRecord) -> RepoResult<i64> {
        let mut inner = self.inner.lock();
        inner.failures.push(failure.clone());
        Ok(inner
            .failures
            .iter()
            .filter(|f| f.order_id == failure.order_id)
            .count() as i64)
    }

    async fn flag_for_review(&self, id: Uuid, now: i64) -> RepoResult<()> {
        if let Some(order) = self.inner.lock().orders.get_mut(&id) {
            order.needs_review = true;
            order.updated_at = now;
        }
        Ok(())
    }

    async fn record_provider_event(&self, event_id: &str, _order_id: Uuid, _now: i64) -> RepoResult<bool> {
        Ok(self.inner.lock().provider_events.insert(event_id.to_string()))
    }

    async fn forget_provider_event(&self, event_id: &str) -> RepoResult<()> {
        self.inner.lock().provider_events.remove(event_id);
        Ok(())
    }

    async fn hold_transition(&self, order_id: Uuid, target: OrderStatus, _now: i64) -> RepoResult<()> {
        let mut inner = self.inner.lock();
        if !inner.held.contains(&(order_id, target)) {
            inner.held.push((order_id, target));
        }
        Ok(())
    }

    async fn held_transitions(&self, order_id: Uuid) -> RepoResult<Vec<OrderStatus>> {
        Ok(self.held_of(order_id))
    }

    async fn drop_held_transition(&self, order_id: Uuid, target: OrderStatus) -> RepoResult<()> {
        self.inner
            .lock()
            .held
            .retain(|entry| *entry != (order_id, target));
        Ok(())
    }

    async fn record_payment_event(&self, event_id: &str, _event_type: &str, _now: i64) -> RepoResult<bool> {
        Ok(self.inner.lock().payment_events.insert(event_id.to_string()))
    }

    async fn forget_payment_event(&self, event_id: &str) -> RepoResult<()> {
        self.inner.lock().payment_events.remove(event_id);
        Ok(())
    }
}

// ============================================================================
// Creations
// ============================================================================

#[derive(Default)]
pub struct MemoryCreations {
    creations: Mutex<HashMap<Uuid, BookContent>>,
}

impl MemoryCreations {
    pub fn insert(&self, id: Uuid, content: BookContent) {
        self.creations.lock().insert(id, content);
    }
}

#[async_trait]
impl CreationSource for MemoryCreations {
    async fn load(&self, creation_id: Uuid) -> Result<Option<BookContent>, BoxError> {
        Ok(self.creations.lock().get(&creation_id).cloned())
    }
}

// ============================================================================
// Storage and fetch
// ============================================================================

#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    uploads: Mutex<Vec<(String, String)>>,
    failing_uploads: Mutex<u32>,
}

impl MemoryStorage {
    pub fn insert(&self, bucket: &str, path: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .insert((bucket.to_string(), path.to_string()), bytes);
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Successful uploads as (bucket, path), in order
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().clone()
    }

    pub fn fail_next_uploads(&self, n: u32) {
        *self.failing_uploads.lock() = n;
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> Result<String, StorageError> {
        Ok(format!("memory://{bucket}/{path}?ttl={}", ttl.as_secs()))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        {
            let mut failing = self.failing_uploads.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(StorageError::Request("connection reset".to_string()));
            }
        }
        self.insert(bucket, path, bytes);
        self.uploads
            .lock()
            .push((bucket.to_string(), path.to_string()));
        Ok(())
    }
}

/// Resolves `memory://bucket/path?...` URLs against a `MemoryStorage`
pub struct FakeFetch {
    storage: Arc<MemoryStorage>,
    failures: Mutex<HashMap<String, u32>>,
    requests: Mutex<HashMap<String, u32>>,
}

impl FakeFetch {
    pub fn new(storage: Arc<MemoryStorage>) -> Self {
        Self {
            storage,
            failures: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Next `n` requests for `path` fail with a transport error
    pub fn fail_next(&self, path: &str, n: u32) {
        self.failures.lock().insert(path.to_string(), n);
    }

    pub fn requests_for(&self, path: &str) -> u32 {
        self.requests.lock().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetch for FakeFetch {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let Some(rest) = url.strip_prefix("memory://") else {
            return Err(FetchError::NotFound);
        };
        let rest = rest.split('?').next().unwrap_or(rest);
        let (bucket, path) = rest.split_once('/').ok_or(FetchError::NotFound)?;

        *self.requests.lock().entry(path.to_string()).or_insert(0) += 1;
        if let Some(remaining) = self.failures.lock().get_mut(path)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(FetchError::Transport("connection reset".to_string()));
        }

        self.storage.object(bucket, path).ok_or(FetchError::NotFound)
    }
}

// ============================================================================
// Print provider and notifier
// ============================================================================

#[derive(Default)]
pub struct FakePrinter {
    jobs: Mutex<Vec<PrintJobRequest>>,
    reject_with: Mutex<Option<u16>>,
}

impl FakePrinter {
    pub fn submissions(&self) -> Vec<PrintJobRequest> {
        self.jobs.lock().clone()
    }

    pub fn reject_with(&self, status: Option<u16>) {
        *self.reject_with.lock() = status;
    }
}

#[async_trait]
impl PrintProvider for FakePrinter {
    async fn submit_job(&self, job: &PrintJobRequest) -> Result<String, ProviderError> {
        if let Some(status) = *self.reject_with.lock() {
            return Err(ProviderError::Rejected {
                status,
                body: "rejected".to_string(),
            });
        }
        let mut jobs = self.jobs.lock();
        jobs.push(job.clone());
        Ok(format!("job-{}", jobs.len()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Email)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Email)> {
        self.sent.lock().clone()
    }

    /// Template keys once at least `n` notifications arrived (or after ~1s)
    pub async fn wait_for(&self, n: usize) -> Vec<String> {
        for _ in 0..100 {
            if self.sent.lock().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent
            .lock()
            .iter()
            .map(|(_, email)| email.template_key().to_string())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, email: &Email) -> Result<(), BoxError> {
        self.sent.lock().push((to.to_string(), email.clone()));
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn order_fixture(channel: Channel, status: OrderStatus) -> Order {
    let shipping_address = (channel == Channel::Physical).then(|| ShippingAddress {
        name: "Ana Gómez".to_string(),
        street1: "12 Elm Street".to_string(),
        street2: None,
        city: "Springfield".to_string(),
        state_code: Some("IL".to_string()),
        postcode: "62701".to_string(),
        country_code: "US".to_string(),
        phone_number: Some("+15555550100".to_string()),
    });
    Order {
        id: Uuid::new_v4(),
        user_id: "user-1".to_string(),
        creation_id: Uuid::new_v4(),
        channel,
        amount_cents: if channel == Channel::Digital { 999 } else { 3499 },
        currency: "usd".to_string(),
        cover_color_id: "coral".to_string(),
        text_color_id: "white".to_string(),
        customer_email: Some("parent@example.com".to_string()),
        status,
        shipping_address,
        provider_job_id: None,
        tracking_number: None,
        artifact_path: None,
        cover_artifact_path: None,
        download: None,
        needs_review: false,
        claimed_at: None,
        created_at: 1,
        updated_at: 1,
        completed_at: None,
    }
}

pub fn page_path(creation_id: Uuid, page_number: u32) -> String {
    format!("creations/{creation_id}/page-{page_number}.png")
}

pub fn creation_fixture(creation_id: Uuid, pages: u32) -> BookContent {
    BookContent {
        title: "The Purple Dragon".to_string(),
        artist_name: "Mia".to_string(),
        artist_age: Some("age 6".to_string()),
        dedication: Some("For Grandma".to_string()),
        hero_image_path: Some(format!("creations/{creation_id}/hero.png")),
        original_image_path: None,
        pages: (1..=pages)
            .map(|n| StoryPage {
                page_number: n,
                text: format!("On page {n} the dragon found another friend."),
                image_path: Some(page_path(creation_id, n)),
            })
            .collect(),
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7) as u8, (y * 5) as u8, 160])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Store an illustration for every page that references one
pub fn stock_images(storage: &MemoryStorage, content: &BookContent) {
    for page in &content.pages {
        if let Some(path) = &page.image_path {
            storage.insert(IMAGES_BUCKET, path, png(48, 36));
        }
    }
    if let Some(path) = &content.hero_image_path {
        storage.insert(IMAGES_BUCKET, path, png(60, 60));
    }
}
