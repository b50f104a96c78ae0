//! Order status and forward-only transition rules

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::Channel;

/// Lifecycle status of a book order
///
/// `GeneratingPdf` and `PdfReady` are sub-states of `Processing`.
/// `Completed` is the digital terminal status, equivalent to `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    PaymentReceived,
    Processing,
    GeneratingPdf,
    PdfReady,
    SubmittedToPrinter,
    InProduction,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Refunded,
}

const DIGITAL_CHAIN: &[OrderStatus] = &[
    OrderStatus::PendingPayment,
    OrderStatus::PaymentReceived,
    OrderStatus::Processing,
    OrderStatus::GeneratingPdf,
    OrderStatus::PdfReady,
    OrderStatus::Completed,
];

const PHYSICAL_CHAIN: &[OrderStatus] = &[
    OrderStatus::PendingPayment,
    OrderStatus::PaymentReceived,
    OrderStatus::Processing,
    OrderStatus::GeneratingPdf,
    OrderStatus::PdfReady,
    OrderStatus::SubmittedToPrinter,
    OrderStatus::InProduction,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

impl OrderStatus {
    pub const ALL: [OrderStatus; 12] = [
        OrderStatus::PendingPayment,
        OrderStatus::PaymentReceived,
        OrderStatus::Processing,
        OrderStatus::GeneratingPdf,
        OrderStatus::PdfReady,
        OrderStatus::SubmittedToPrinter,
        OrderStatus::InProduction,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::PaymentReceived => "payment_received",
            Self::Processing => "processing",
            Self::GeneratingPdf => "generating_pdf",
            Self::PdfReady => "pdf_ready",
            Self::SubmittedToPrinter => "submitted_to_printer",
            Self::InProduction => "in_production",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_db() == s)
    }

    /// No further transitions are accepted from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Completed | Self::Cancelled | Self::Refunded
        )
    }

    /// Processing or one of its sub-states
    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing | Self::GeneratingPdf | Self::PdfReady)
    }

    /// Statuses from which cancellation or refund is accepted
    fn is_exit(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    fn position(&self, channel: Channel) -> Option<usize> {
        chain(channel).iter().position(|s| s == self)
    }

    /// Next status on the channel's forward chain
    pub fn successor(&self, channel: Channel) -> Option<Self> {
        let pos = self.position(channel)?;
        chain(channel).get(pos + 1).copied()
    }

    /// True when `self` equals `target` or lies after it on the channel's chain.
    pub fn has_reached(&self, target: OrderStatus, channel: Channel) -> bool {
        match (self.position(channel), target.position(channel)) {
            (Some(current), Some(target)) => current >= target,
            _ => false,
        }
    }

    /// Forward-only rule: only the immediate successor, or cancel/refund
    /// from any pre-terminal status.
    pub fn can_transition_to(&self, to: OrderStatus, channel: Channel) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to.is_exit() {
            return true;
        }
        self.successor(channel) == Some(to)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

/// Forward chain of statuses for a channel
pub fn chain(channel: Channel) -> &'static [OrderStatus] {
    match channel {
        Channel::Digital => DIGITAL_CHAIN,
        Channel::Physical => PHYSICAL_CHAIN,
    }
}

/// How an externally reported status relates to the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Target is the next step (or an accepted exit): apply now
    Apply,
    /// Target equals or is behind the current status: no-op
    AlreadyApplied,
    /// Target is more than one step ahead: hold until its predecessor is reached
    Premature,
    /// Order is terminal or the target is not on this channel's chain
    Rejected,
}

/// Decide what to do with a reported `target` while the order sits at `current`.
pub fn classify(current: OrderStatus, target: OrderStatus, channel: Channel) -> Disposition {
    if current == target {
        return Disposition::AlreadyApplied;
    }
    if current.is_terminal() {
        return Disposition::Rejected;
    }
    if current.can_transition_to(target, channel) {
        return Disposition::Apply;
    }
    match (current.position(channel), target.position(channel)) {
        (Some(c), Some(t)) if t < c => Disposition::AlreadyApplied,
        (Some(_), Some(_)) => Disposition::Premature,
        _ => Disposition::Rejected,
    }
}
