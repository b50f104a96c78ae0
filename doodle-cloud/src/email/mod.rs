//! Delivery notifications
//!
//! Sending is fire-and-forget: `notify_in_background` spawns the send and
//! only logs a failure. A failed email never rolls back an order.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use uuid::Uuid;

use crate::error::BoxError;

/// Notification templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Email {
    BookReady {
        title: String,
        download_url: String,
        /// Unix millis
        expires_at: i64,
    },
    BookSubmitted {
        title: String,
    },
    BookShipped {
        order_id: Uuid,
        tracking_number: Option<String>,
    },
}

impl Email {
    pub fn template_key(&self) -> &'static str {
        match self {
            Email::BookReady { .. } => "book_ready",
            Email::BookSubmitted { .. } => "book_submitted",
            Email::BookShipped { .. } => "book_shipped",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Email::BookReady { title, .. } => format!("Your book \"{title}\" is ready"),
            Email::BookSubmitted { title } => format!("\"{title}\" is off to the printer"),
            Email::BookShipped { .. } => "Your book has shipped".to_string(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Email::BookReady {
                title,
                download_url,
                expires_at,
            } => {
                let expires = chrono::DateTime::from_timestamp_millis(*expires_at)
                    .map(|t| t.format("%B %-d, %Y").to_string())
                    .unwrap_or_default();
                format!(
                    "\"{title}\" is ready to download:\n\n{download_url}\n\n\
                     This link is valid until {expires}."
                )
            }
            Email::BookSubmitted { title } => format!(
                "We sent \"{title}\" to our print partner. \
                 You will get another email with tracking details once it ships."
            ),
            Email::BookShipped {
                order_id,
                tracking_number,
            } => match tracking_number {
                Some(tracking) => {
                    format!("Order {order_id} is on its way.\nTracking number: {tracking}")
                }
                None => format!("Order {order_id} is on its way."),
            },
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, email: &Email) -> Result<(), BoxError>;
}

/// SES-backed notifier
#[derive(Clone)]
pub struct SesNotifier {
    ses: SesClient,
    from: String,
}

impl SesNotifier {
    pub fn new(ses: SesClient, from: impl Into<String>) -> Self {
        Self {
            ses,
            from: from.into(),
        }
    }
}

#[async_trait]
impl Notifier for SesNotifier {
    async fn send(&self, to: &str, email: &Email) -> Result<(), BoxError> {
        let subject = Content::builder().data(email.subject()).build()?;

        let body = Body::builder()
            .text(Content::builder().data(email.body()).build()?)
            .build();

        let message = Message::builder().subject(subject).body(body).build();

        self.ses
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await?;

        tracing::info!(to, template = email.template_key(), "Notification sent");
        Ok(())
    }
}

/// Spawn the send; a missing recipient skips it
pub fn notify_in_background(notifier: Arc<dyn Notifier>, recipient: Option<String>, email: Email) {
    let Some(to) = recipient else {
        tracing::debug!(template = email.template_key(), "No recipient, notification skipped");
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&to, &email).await {
            tracing::warn!(to, template = email.template_key(), error = %e, "Notification failed");
        }
    });
}
