//! Order state machine service
//!
//! Validates a transition against the forward-only rules in
//! `shared::order::status`, then persists it with a compare-and-swap on the
//! current status. An order is never moved backward and a stale writer never
//! overwrites a newer status.

use std::sync::Arc;

use shared::error::{AppError, ErrorCode};
use shared::order::{Order, OrderPatch, OrderStatus};
use thiserror::Error;
use uuid::Uuid;

use crate::db::OrderRepository;
use crate::error::BoxError;
use crate::util::now_millis;

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error("Order is terminal ({0})")]
    Terminal(OrderStatus),

    #[error("Transition {from} -> {to} is not allowed")]
    NotAllowed { from: OrderStatus, to: OrderStatus },

    #[error("Order is no longer {expected}")]
    Conflict { expected: OrderStatus },

    #[error("Order repository error: {0}")]
    Repository(#[from] BoxError),
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::NotFound(id) => {
                AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id.to_string())
            }
            TransitionError::Terminal(status) => {
                AppError::new(ErrorCode::OrderTerminal).with_detail("status", status.as_db())
            }
            TransitionError::NotAllowed { from, to } => AppError::with_message(
                ErrorCode::InvalidTransition,
                format!("Cannot move order from {from} to {to}"),
            ),
            TransitionError::Conflict { .. } => AppError::new(ErrorCode::FulfillmentInProgress),
            TransitionError::Repository(e) => {
                tracing::error!(error = %e, "Order repository error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

#[derive(Clone)]
pub struct OrderStateMachine {
    repo: Arc<dyn OrderRepository>,
}

impl OrderStateMachine {
    pub fn new(repo: Arc<dyn OrderRepository>) -> Self {
        Self { repo }
    }

    /// Move `order` to `to`, writing `patch` in the same update.
    ///
    /// Returns the updated record. `order` must be the last-read state;
    /// a concurrent change yields `Conflict` and nothing is written.
    pub async fn transition(
        &self,
        order: &Order,
        to: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, TransitionError> {
        let from = order.status;
        if from.is_terminal() {
            return Err(TransitionError::Terminal(from));
        }
        if !from.can_transition_to(to, order.channel) {
            return Err(TransitionError::NotAllowed { from, to });
        }

        let now = now_millis();
        let swapped = self
            .repo
            .compare_and_swap(order.id, from, to, &patch, now)
            .await?;
        if !swapped {
            tracing::warn!(order_id = %order.id, %from, %to, "Order changed concurrently");
            return Err(TransitionError::Conflict { expected: from });
        }

        tracing::info!(order_id = %order.id, %from, %to, "Order status changed");
        let mut updated = order.clone();
        updated.apply(to, &patch, now);
        Ok(updated)
    }

    /// Load then transition
    pub async fn transition_by_id(
        &self,
        id: Uuid,
        to: OrderStatus,
        patch: OrderPatch,
    ) -> Result<Order, TransitionError> {
        let order = self
            .repo
            .get(id)
            .await?
            .ok_or(TransitionError::NotFound(id))?;
        self.transition(&order, to, patch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryOrders, order_fixture};
    use shared::order::Channel;

    #[tokio::test]
    async fn test_forward_transition_is_persisted() {
        let repo = Arc::new(MemoryOrders::default());
        let order = order_fixture(Channel::Digital, OrderStatus::PaymentReceived);
        repo.insert(order.clone());
        let machine = OrderStateMachine::new(repo.clone());

        let updated = machine
            .transition(&order, OrderStatus::Processing, OrderPatch::none())
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        assert_eq!(repo.status_of(order.id), Some(OrderStatus::Processing));
    }

    #[tokio::test]
    async fn test_backward_and_skipping_transitions_are_rejected() {
        let repo = Arc::new(MemoryOrders::default());
        let order = order_fixture(Channel::Physical, OrderStatus::InProduction);
        repo.insert(order.clone());
        let machine = OrderStateMachine::new(repo.clone());

        for to in OrderStatus::ALL {
            if order.status.can_transition_to(to, Channel::Physical) {
                continue;
            }
            let err = machine
                .transition(&order, to, OrderPatch::none())
                .await
                .unwrap_err();
            assert!(matches!(err, TransitionError::NotAllowed { .. }), "{to}");
            assert_eq!(repo.status_of(order.id), Some(OrderStatus::InProduction));
        }
    }

    #[tokio::test]
    async fn test_terminal_order_rejects_refund() {
        let repo = Arc::new(MemoryOrders::default());
        let order = order_fixture(Channel::Digital, OrderStatus::Completed);
        repo.insert(order.clone());
        let machine = OrderStateMachine::new(repo);

        let err = machine
            .transition(&order, OrderStatus::Refunded, OrderPatch::none())
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::Terminal(OrderStatus::Completed)));
    }

    #[tokio::test]
    async fn test_stale_snapshot_conflicts() {
        let repo = Arc::new(MemoryOrders::default());
        let order = order_fixture(Channel::Digital, OrderStatus::PaymentReceived);
        repo.insert(order.clone());
        let machine = OrderStateMachine::new(repo.clone());

        machine
            .transition(&order, OrderStatus::Processing, OrderPatch::none())
            .await
            .unwrap();
        // Second writer still holds the payment_received snapshot
        let err = machine
            .transition(&order, OrderStatus::Processing, OrderPatch::none())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Conflict {
                expected: OrderStatus::PaymentReceived
            }
        ));
        assert_eq!(repo.transitions_of(order.id).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let repo = Arc::new(MemoryOrders::default());
        let machine = OrderStateMachine::new(repo);
        let err = machine
            .transition_by_id(Uuid::new_v4(), OrderStatus::Processing, OrderPatch::none())
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotFound(_)));
    }
}
