//! Book order repository
//!
//! Every write is keyed by order id. Status changes go through
//! `compare_and_swap` so concurrent writers never overwrite each other.

use async_trait::async_trait;
use shared::order::{Channel, DownloadHandle, Order, OrderPatch, OrderStatus, ShippingAddress};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::BoxError;

pub type RepoResult<T> = Result<T, BoxError>;

/// One failed dispatcher run
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub order_id: Uuid,
    pub stage: &'static str,
    pub kind: &'static str,
    pub message: String,
    pub created_at: i64,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> RepoResult<Option<Order>>;

    async fn find_by_provider_job(&self, job_id: &str) -> RepoResult<Option<Order>>;

    /// Move `expected` → `to` and write `patch` atomically.
    /// Returns false when the stored status is no longer `expected`.
    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: OrderStatus,
        to: OrderStatus,
        patch: &OrderPatch,
        now: i64,
    ) -> RepoResult<bool>;

    /// Take the fulfillment lease unless a live one exists
    async fn try_claim(&self, id: Uuid, now: i64, lease_ms: i64) -> RepoResult<bool>;

    /// Drop the lease taken at `claimed_at`; a lease since taken over is left alone
    async fn release_claim(&self, id: Uuid, claimed_at: i64) -> RepoResult<()>;

    async fn set_provider_job_id(&self, id: Uuid, job_id: &str, now: i64) -> RepoResult<()>;

    async fn set_tracking_number(&self, id: Uuid, tracking: &str, now: i64) -> RepoResult<()>;

    /// Store a failure; returns the order's total failure count
    async fn record_failure(&self, failure: &FailureRecord) -> RepoResult<i64>;

    async fn flag_for_review(&self, id: Uuid, now: i64) -> RepoResult<()>;

    /// Returns false when the provider event was already recorded
    async fn record_provider_event(&self, event_id: &str, order_id: Uuid, now: i64) -> RepoResult<bool>;

    async fn forget_provider_event(&self, event_id: &str) -> RepoResult<()>;

    async fn hold_transition(&self, order_id: Uuid, target: OrderStatus, now: i64) -> RepoResult<()>;

    /// Held targets, oldest first
    async fn held_transitions(&self, order_id: Uuid) -> RepoResult<Vec<OrderStatus>>;

    async fn drop_held_transition(&self, order_id: Uuid, target: OrderStatus) -> RepoResult<()>;

    /// Returns false when the payment event was already processed
    async fn record_payment_event(&self, event_id: &str, event_type: &str, now: i64) -> RepoResult<bool>;

    async fn forget_payment_event(&self, event_id: &str) -> RepoResult<()>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    creation_id: Uuid,
    channel: String,
    amount_cents: i64,
    currency: String,
    cover_color_id: String,
    text_color_id: String,
    customer_email: Option<String>,
    status: String,
    shipping_address: Option<Json<ShippingAddress>>,
    provider_job_id: Option<String>,
    tracking_number: Option<String>,
    artifact_path: Option<String>,
    cover_artifact_path: Option<String>,
    download_url: Option<String>,
    download_expires_at: Option<i64>,
    needs_review: bool,
    claimed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<OrderRow> for Order {
    type Error = BoxError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let channel = Channel::from_db(&row.channel)
            .ok_or_else(|| format!("Unknown channel '{}' on order {}", row.channel, row.id))?;
        let status = OrderStatus::from_db(&row.status)
            .ok_or_else(|| format!("Unknown status '{}' on order {}", row.status, row.id))?;
        let download = match (row.download_url, row.download_expires_at) {
            (Some(url), Some(expires_at)) => Some(DownloadHandle { url, expires_at }),
            _ => None,
        };
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            creation_id: row.creation_id,
            channel,
            amount_cents: row.amount_cents,
            currency: row.currency,
            cover_color_id: row.cover_color_id,
            text_color_id: row.text_color_id,
            customer_email: row.customer_email,
            status,
            shipping_address: row.shipping_address.map(|j| j.0),
            provider_job_id: row.provider_job_id,
            tracking_number: row.tracking_number,
            artifact_path: row.artifact_path,
            cover_artifact_path: row.cover_artifact_path,
            download,
            needs_review: row.needs_review,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, user_id, creation_id, channel, amount_cents, currency,
    cover_color_id, text_color_id, customer_email, status, shipping_address,
    provider_job_id, tracking_number, artifact_path, cover_artifact_path,
    download_url, download_expires_at, needs_review, claimed_at,
    created_at, updated_at, completed_at";

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn get(&self, id: Uuid) -> RepoResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM book_orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_by_provider_job(&self, job_id: &str) -> RepoResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM book_orders WHERE provider_job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        expected: OrderStatus,
        to: OrderStatus,
        patch: &OrderPatch,
        now: i64,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE book_orders SET
                status = $3,
                artifact_path = COALESCE($4, artifact_path),
                cover_artifact_path = COALESCE($5, cover_artifact_path),
                download_url = COALESCE($6, download_url),
                download_expires_at = COALESCE($7, download_expires_at),
                provider_job_id = COALESCE($8, provider_job_id),
                completed_at = COALESCE($9, completed_at),
                updated_at = $10
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(expected.as_db())
        .bind(to.as_db())
        .bind(patch.artifact_path.as_deref())
        .bind(patch.cover_artifact_path.as_deref())
        .bind(patch.download.as_ref().map(|d| d.url.as_str()))
        .bind(patch.download.as_ref().map(|d| d.expires_at))
        .bind(patch.provider_job_id.as_deref())
        .bind(patch.completed_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_claim(&self, id: Uuid, now: i64, lease_ms: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE book_orders SET claimed_at = $2
             WHERE id = $1 AND (claimed_at IS NULL OR claimed_at <= $3)",
        )
        .bind(id)
        .bind(now)
        .bind(now - lease_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, id: Uuid, claimed_at: i64) -> RepoResult<()> {
        sqlx::query("UPDATE book_orders SET claimed_at = NULL WHERE id = $1 AND claimed_at = $2")
            .bind(id)
            .bind(claimed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_provider_job_id(&self, id: Uuid, job_id: &str, now: i64) -> RepoResult<()> {
        sqlx::query("UPDATE book_orders SET provider_job_id = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(job_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_tracking_number(&self, id: Uuid, tracking: &str, now: i64) -> RepoResult<()> {
        sqlx::query("UPDATE book_orders SET tracking_number = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(tracking)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, failure: &FailureRecord) -> RepoResult<i64> {
        sqlx::query(
            "INSERT INTO fulfillment_failures (order_id, stage, kind, message, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(failure.order_id)
        .bind(failure.stage)
        .bind(failure.kind)
        .bind(&failure.message)
        .bind(failure.created_at)
        .execute(&self.pool)
        .await?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM fulfillment_failures WHERE order_id = $1")
                .bind(failure.order_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn flag_for_review(&self, id: Uuid, now: i64) -> RepoResult<()> {
        sqlx::query("UPDATE book_orders SET needs_review = TRUE, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_provider_event(&self, event_id: &str, order_id: Uuid, now: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "INSERT INTO provider_events (event_id, order_id, received_at)
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(order_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn forget_provider_event(&self, event_id: &str) -> RepoResult<()> {
        sqlx::query("DELETE FROM provider_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn hold_transition(&self, order_id: Uuid, target: OrderStatus, now: i64) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO held_provider_transitions (order_id, target_status, received_at)
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(order_id)
        .bind(target.as_db())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn held_transitions(&self, order_id: Uuid) -> RepoResult<Vec<OrderStatus>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT target_status FROM held_provider_transitions
             WHERE order_id = $1 ORDER BY received_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        let mut held = Vec::with_capacity(rows.len());
        for (status,) in rows {
            match OrderStatus::from_db(&status) {
                Some(s) => held.push(s),
                None => tracing::warn!(order_id = %order_id, status, "Ignoring unknown held status"),
            }
        }
        Ok(held)
    }

    async fn drop_held_transition(&self, order_id: Uuid, target: OrderStatus) -> RepoResult<()> {
        sqlx::query("DELETE FROM held_provider_transitions WHERE order_id = $1 AND target_status = $2")
            .bind(order_id)
            .bind(target.as_db())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_payment_event(&self, event_id: &str, event_type: &str, now: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn forget_payment_event(&self, event_id: &str) -> RepoResult<()> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
