//! Reconciliation of print-provider status reports
//!
//! Provider events are applied as strict one-step transitions. An event that
//! runs ahead of the order is held and replayed once its predecessor lands;
//! an event at or behind the current status is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use shared::order::{Disposition, Order, OrderPatch, OrderStatus, classify};
use thiserror::Error;
use uuid::Uuid;

use crate::db::OrderRepository;
use crate::email::{Email, Notifier, notify_in_background};
use crate::error::BoxError;
use crate::lulu::ProviderEvent;
use crate::orders::{OrderStateMachine, TransitionError};
use crate::util::now_millis;

// ============================================================================
// Status map
// ============================================================================

const DEFAULT_STATUS_MAP: &[(&str, OrderStatus)] = &[
    ("CREATED", OrderStatus::SubmittedToPrinter),
    ("UNPAID", OrderStatus::SubmittedToPrinter),
    ("PAYMENT_IN_PROGRESS", OrderStatus::SubmittedToPrinter),
    ("PRODUCTION_DELAYED", OrderStatus::SubmittedToPrinter),
    ("PRODUCTION_READY", OrderStatus::InProduction),
    ("IN_PRODUCTION", OrderStatus::InProduction),
    ("SHIPPED", OrderStatus::Shipped),
    ("DELIVERED", OrderStatus::Delivered),
    ("CANCELED", OrderStatus::Cancelled),
    ("REJECTED", OrderStatus::Cancelled),
];

/// Provider status vocabulary → local status
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMap {
    entries: HashMap<String, OrderStatus>,
}

impl Default for StatusMap {
    fn default() -> Self {
        Self {
            entries: DEFAULT_STATUS_MAP
                .iter()
                .map(|(name, status)| (name.to_string(), *status))
                .collect(),
        }
    }
}

impl StatusMap {
    /// Defaults with JSON overrides applied: `{"ON_HOLD": "submitted_to_printer", "REJECTED": null}`.
    /// A `null` value removes the mapping.
    pub fn with_overrides(overrides: Option<&str>) -> Result<Self, String> {
        let mut map = Self::default();
        let Some(raw) = overrides else {
            return Ok(map);
        };
        let parsed: HashMap<String, Option<String>> =
            serde_json::from_str(raw).map_err(|e| format!("Invalid PRINT_STATUS_MAP: {e}"))?;
        for (provider, local) in parsed {
            let key = provider.trim().to_ascii_uppercase();
            match local {
                None => {
                    map.entries.remove(&key);
                }
                Some(local) => {
                    let status = OrderStatus::from_db(local.trim())
                        .ok_or_else(|| format!("Unknown local status '{local}' for {key}"))?;
                    map.entries.insert(key, status);
                }
            }
        }
        Ok(map)
    }

    pub fn lookup(&self, provider_status: &str) -> Option<OrderStatus> {
        self.entries
            .get(&provider_status.trim().to_ascii_uppercase())
            .copied()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Transition applied (plus any held transitions it unblocked)
    Applied(OrderStatus),
    /// Same event id seen before
    Duplicate,
    /// Target equals or is behind the current status
    AlreadyApplied,
    /// Target is ahead of the order; held for replay
    Held,
    /// Provider status has no local mapping
    Unmapped,
    /// Order is terminal or the target is foreign to its channel
    Inconsistent,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("No order for provider job {0}")]
    UnknownJob(String),

    #[error("Order repository error: {0}")]
    Repository(#[from] BoxError),

    #[error(transparent)]
    Transition(TransitionError),
}

impl From<TransitionError> for ReconcileError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Repository(e) => ReconcileError::Repository(e),
            other => ReconcileError::Transition(other),
        }
    }
}

/// Concurrent writers can race a provider event; re-read and re-classify this often
const MAX_CONFLICT_RETRIES: usize = 3;

// ============================================================================
// Provider-driven transitions
// ============================================================================

/// Applies provider-driven transitions and replays held ones.
///
/// Any writer that moves an order onto a status a held transition waits for
/// (the reconciler, or the dispatcher reaching `submitted_to_printer`) must
/// call [`HeldTransitions::replay`] afterwards.
#[derive(Clone)]
pub struct HeldTransitions {
    orders: Arc<dyn OrderRepository>,
    machine: OrderStateMachine,
    notifier: Arc<dyn Notifier>,
}

impl HeldTransitions {
    pub fn new(orders: Arc<dyn OrderRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            machine: OrderStateMachine::new(orders.clone()),
            orders,
            notifier,
        }
    }

    async fn reload(&self, order_id: Uuid) -> Result<Order, ReconcileError> {
        Ok(self
            .orders
            .get(order_id)
            .await?
            .ok_or(TransitionError::NotFound(order_id))?)
    }

    /// One provider-driven step: terminal statuses stamp `completed_at`,
    /// `shipped` notifies the customer.
    async fn advance(&self, order: &Order, to: OrderStatus) -> Result<Order, TransitionError> {
        let patch = OrderPatch {
            completed_at: to.is_terminal().then(now_millis),
            ..OrderPatch::none()
        };
        let updated = self.machine.transition(order, to, patch).await?;
        if to == OrderStatus::Shipped {
            notify_in_background(
                self.notifier.clone(),
                updated.customer_email.clone(),
                Email::BookShipped {
                    order_id: updated.id,
                    tracking_number: updated.tracking_number.clone(),
                },
            );
        }
        Ok(updated)
    }

    /// Replay held transitions unblocked by the order's current status
    pub async fn replay(&self, mut order: Order) -> Result<Order, ReconcileError> {
        let mut conflicts = 0;
        loop {
            let held = self.orders.held_transitions(order.id).await?;
            let mut rescan = false;
            for target in held {
                match classify(order.status, target, order.channel) {
                    Disposition::Premature => {}
                    Disposition::AlreadyApplied | Disposition::Rejected => {
                        self.orders.drop_held_transition(order.id, target).await?;
                    }
                    Disposition::Apply => match self.advance(&order, target).await {
                        Ok(updated) => {
                            order = updated;
                            self.orders.drop_held_transition(order.id, target).await?;
                            tracing::info!(order_id = %order.id, status = %target, "Held provider status applied");
                            rescan = true;
                            break;
                        }
                        Err(TransitionError::Conflict { .. }) if conflicts < MAX_CONFLICT_RETRIES => {
                            conflicts += 1;
                            order = self.reload(order.id).await?;
                            rescan = true;
                            break;
                        }
                        Err(e) => return Err(e.into()),
                    },
                }
            }
            if !rescan {
                return Ok(order);
            }
        }
    }
}

// ============================================================================
// Reconciler
// ============================================================================

pub struct Reconciler {
    orders: Arc<dyn OrderRepository>,
    held: HeldTransitions,
    statuses: StatusMap,
}

impl Reconciler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        notifier: Arc<dyn Notifier>,
        statuses: StatusMap,
    ) -> Self {
        Self {
            held: HeldTransitions::new(orders.clone(), notifier),
            orders,
            statuses,
        }
    }

    /// Apply one provider event. `event_id` identifies redeliveries.
    pub async fn handle(
        &self,
        event: &ProviderEvent,
        event_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let order = self
            .orders
            .find_by_provider_job(&event.job_id)
            .await?
            .ok_or_else(|| ReconcileError::UnknownJob(event.job_id.clone()))?;

        if !self
            .orders
            .record_provider_event(event_id, order.id, now_millis())
            .await?
        {
            tracing::info!(order_id = %order.id, provider_job_id = %event.job_id, "Duplicate provider event");
            return Ok(ReconcileOutcome::Duplicate);
        }

        match self.apply_event(order, event).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Let the provider's retry through
                if let Err(forget) = self.orders.forget_provider_event(event_id).await {
                    tracing::error!(event_id, error = %forget, "Failed to forget provider event");
                }
                Err(e)
            }
        }
    }

    async fn apply_event(
        &self,
        mut order: Order,
        event: &ProviderEvent,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if let Some(tracking) = event.tracking_number.as_deref()
            && order.tracking_number.as_deref() != Some(tracking)
        {
            self.orders
                .set_tracking_number(order.id, tracking, now_millis())
                .await?;
            order.tracking_number = Some(tracking.to_string());
            tracing::info!(order_id = %order.id, tracking_number = tracking, "Tracking number recorded");
        }

        let Some(target) = self.statuses.lookup(&event.status) else {
            tracing::warn!(
                order_id = %order.id,
                provider_job_id = %event.job_id,
                provider_status = %event.status,
                "Unmapped provider status, ignored"
            );
            return Ok(ReconcileOutcome::Unmapped);
        };

        let mut attempts = 0;
        loop {
            match classify(order.status, target, order.channel) {
                Disposition::AlreadyApplied => return Ok(ReconcileOutcome::AlreadyApplied),
                Disposition::Rejected => {
                    tracing::warn!(
                        order_id = %order.id,
                        current = %order.status,
                        reported = %target,
                        "Inconsistent provider status, ignored"
                    );
                    return Ok(ReconcileOutcome::Inconsistent);
                }
                Disposition::Premature => return self.hold(order, target).await,
                Disposition::Apply => match self.held.advance(&order, target).await {
                    Ok(updated) => {
                        let last = self.held.replay(updated).await?;
                        return Ok(ReconcileOutcome::Applied(last.status));
                    }
                    Err(TransitionError::Conflict { .. }) if attempts < MAX_CONFLICT_RETRIES => {
                        attempts += 1;
                        order = self.held.reload(order.id).await?;
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }
    }

    /// Park `target` until its predecessor lands
    async fn hold(&self, order: Order, target: OrderStatus) -> Result<ReconcileOutcome, ReconcileError> {
        self.orders
            .hold_transition(order.id, target, now_millis())
            .await?;
        tracing::info!(
            order_id = %order.id,
            current = %order.status,
            held = %target,
            "Provider status ahead of order, held"
        );

        // The order may have moved after it was read, and its writer may have
        // scanned the held set before this entry existed
        let current = self.held.reload(order.id).await?;
        let replayed = self.held.replay(current).await?;
        if replayed.status.has_reached(target, replayed.channel) {
            return Ok(ReconcileOutcome::Applied(replayed.status));
        }
        Ok(ReconcileOutcome::Held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryOrders, RecordingNotifier, order_fixture};
    use shared::order::Channel;

    struct Harness {
        repo: Arc<MemoryOrders>,
        notifier: Arc<RecordingNotifier>,
        reconciler: Reconciler,
        order: Order,
    }

    fn harness(status: OrderStatus) -> Harness {
        let repo = Arc::new(MemoryOrders::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut order = order_fixture(Channel::Physical, status);
        order.provider_job_id = Some("job-77".to_string());
        order.customer_email = Some("parent@example.com".to_string());
        repo.insert(order.clone());
        let reconciler = Reconciler::new(repo.clone(), notifier.clone(), StatusMap::default());
        Harness {
            repo,
            notifier,
            reconciler,
            order,
        }
    }

    fn event(status: &str) -> ProviderEvent {
        ProviderEvent {
            job_id: "job-77".to_string(),
            status: status.to_string(),
            tracking_number: None,
        }
    }

    #[test]
    fn test_status_map_overrides() {
        let map = StatusMap::with_overrides(Some(
            r#"{"on_hold": "submitted_to_printer", "REJECTED": null}"#,
        ))
        .unwrap();
        assert_eq!(map.lookup("ON_HOLD"), Some(OrderStatus::SubmittedToPrinter));
        assert_eq!(map.lookup("rejected"), None);
        assert_eq!(map.lookup("shipped"), Some(OrderStatus::Shipped));
        assert!(StatusMap::with_overrides(Some(r#"{"X": "printing"}"#)).is_err());
        assert!(StatusMap::with_overrides(Some("[")).is_err());
    }

    #[tokio::test]
    async fn test_out_of_order_events_linearize() {
        let h = harness(OrderStatus::SubmittedToPrinter);

        let first = h.reconciler.handle(&event("SHIPPED"), "e1").await.unwrap();
        assert_eq!(first, ReconcileOutcome::Held);
        assert_eq!(h.repo.status_of(h.order.id), Some(OrderStatus::SubmittedToPrinter));

        let second = h.reconciler.handle(&event("IN_PRODUCTION"), "e2").await.unwrap();
        assert_eq!(second, ReconcileOutcome::Applied(OrderStatus::Shipped));
        assert_eq!(
            h.repo.transitions_of(h.order.id),
            vec![
                (OrderStatus::SubmittedToPrinter, OrderStatus::InProduction),
                (OrderStatus::InProduction, OrderStatus::Shipped),
            ]
        );
        assert!(h.repo.held_of(h.order.id).is_empty());
        assert_eq!(h.notifier.wait_for(1).await, vec!["book_shipped".to_string()]);
    }

    #[tokio::test]
    async fn test_redelivery_is_a_no_op() {
        let h = harness(OrderStatus::InProduction);

        let first = h.reconciler.handle(&event("SHIPPED"), "e1").await.unwrap();
        assert_eq!(first, ReconcileOutcome::Applied(OrderStatus::Shipped));
        let again = h.reconciler.handle(&event("SHIPPED"), "e1").await.unwrap();
        assert_eq!(again, ReconcileOutcome::Duplicate);
        // Same state under a new event id
        let equivalent = h.reconciler.handle(&event("SHIPPED"), "e2").await.unwrap();
        assert_eq!(equivalent, ReconcileOutcome::AlreadyApplied);

        assert_eq!(h.repo.transitions_of(h.order.id).len(), 1);
        assert_eq!(h.notifier.wait_for(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_backward_report_never_moves_order() {
        let h = harness(OrderStatus::Shipped);
        let outcome = h.reconciler.handle(&event("IN_PRODUCTION"), "e1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::AlreadyApplied);
        assert_eq!(h.repo.status_of(h.order.id), Some(OrderStatus::Shipped));
    }

    #[tokio::test]
    async fn test_unmapped_status_keeps_tracking_number() {
        let h = harness(OrderStatus::InProduction);
        let mut ev = event("LOST_IN_SPACE");
        ev.tracking_number = Some("1Z999".to_string());

        let outcome = h.reconciler.handle(&ev, "e1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unmapped);
        let stored = h.repo.get(h.order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::InProduction);
        assert_eq!(stored.tracking_number.as_deref(), Some("1Z999"));
    }

    #[tokio::test]
    async fn test_terminal_order_is_inconsistent() {
        let h = harness(OrderStatus::Cancelled);
        let outcome = h.reconciler.handle(&event("SHIPPED"), "e1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Inconsistent);
        assert_eq!(h.repo.status_of(h.order.id), Some(OrderStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_delivered_sets_completed_at() {
        let h = harness(OrderStatus::Shipped);
        let outcome = h.reconciler.handle(&event("DELIVERED"), "e1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied(OrderStatus::Delivered));
        let stored = h.repo.get(h.order.id).await.unwrap().unwrap();
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let h = harness(OrderStatus::InProduction);
        let mut ev = event("SHIPPED");
        ev.job_id = "nope".to_string();
        let err = h.reconciler.handle(&ev, "e1").await.unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownJob(_)));
    }

    #[tokio::test]
    async fn test_persistence_failure_forgets_event() {
        let h = harness(OrderStatus::InProduction);
        h.repo.fail_writes(true);
        assert!(h.reconciler.handle(&event("SHIPPED"), "e1").await.is_err());

        h.repo.fail_writes(false);
        let retried = h.reconciler.handle(&event("SHIPPED"), "e1").await.unwrap();
        assert_eq!(retried, ReconcileOutcome::Applied(OrderStatus::Shipped));
    }

    #[tokio::test]
    async fn test_stranded_held_status_is_replayed_by_next_event() {
        let h = harness(OrderStatus::InProduction);
        // Left behind by a writer that stopped before scanning the held set
        h.repo
            .hold_transition(h.order.id, OrderStatus::Shipped, 0)
            .await
            .unwrap();

        let outcome = h.reconciler.handle(&event("DELIVERED"), "e1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied(OrderStatus::Delivered));
        assert_eq!(
            h.repo.transitions_of(h.order.id),
            vec![
                (OrderStatus::InProduction, OrderStatus::Shipped),
                (OrderStatus::Shipped, OrderStatus::Delivered),
            ]
        );
        assert!(h.repo.held_of(h.order.id).is_empty());
    }
}
