//! Print provider (Lulu Print API)
//!
//! Outbound: OAuth client-credentials token, then `POST /print-jobs/`.
//! Inbound: `PRINT_JOB_STATUS_CHANGED` webhooks signed with HMAC-SHA256.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use shared::order::ShippingAddress;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::retry::IsTransient;

const TOKEN_PATH: &str = "/auth/realms/glasstree/protocol/openid-connect/token";
const PRINT_JOBS_PATH: &str = "/print-jobs/";
/// Refresh the token this long before it expires
const TOKEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Print provider authentication failed: {0}")]
    Auth(String),

    #[error("Print provider rejected the job (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Print provider request failed: {0}")]
    Transport(String),

    #[error("Unexpected print provider response: {0}")]
    InvalidResponse(String),
}

impl IsTransient for ProviderError {
    fn is_transient(&self) -> bool {
        match self {
            ProviderError::Rejected { status, .. } => *status >= 500 || *status == 429,
            ProviderError::Transport(_) => true,
            ProviderError::Auth(_) | ProviderError::InvalidResponse(_) => false,
        }
    }
}

/// One manufacturing job: a single book shipped to one address
#[derive(Debug, Clone, PartialEq)]
pub struct PrintJobRequest {
    /// Idempotency key on the provider side (the order id)
    pub external_id: String,
    pub title: String,
    pub interior_url: String,
    pub cover_url: String,
    pub shipping_address: ShippingAddress,
    pub contact_email: Option<String>,
}

#[async_trait]
pub trait PrintProvider: Send + Sync {
    /// Submit a job, returning the provider job id
    async fn submit_job(&self, job: &PrintJobRequest) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct LuluSettings {
    pub api_base: String,
    pub client_key: String,
    pub client_secret: String,
    pub pod_package_id: String,
    pub shipping_level: String,
    /// Fallback contact when the order has no customer email
    pub contact_email: String,
}

struct CachedToken {
    value: String,
    expires: Instant,
}

pub struct LuluClient {
    http: reqwest::Client,
    settings: LuluSettings,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct JobResponse {
    id: serde_json::Value,
}

impl LuluClient {
    pub fn new(settings: LuluSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            settings,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let url = format!("{}{TOKEN_PATH}", self.settings.api_base);
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.settings.client_key, Some(&self.settings.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Auth(format!("token endpoint returned {status}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_SLACK);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    fn job_body(&self, job: &PrintJobRequest) -> serde_json::Value {
        let address = &job.shipping_address;
        json!({
            "external_id": job.external_id,
            "contact_email": job.contact_email.as_deref().unwrap_or(&self.settings.contact_email),
            "shipping_level": self.settings.shipping_level,
            "line_items": [{
                "external_id": job.external_id,
                "title": job.title,
                "quantity": 1,
                "printable_normalization": {
                    "pod_package_id": self.settings.pod_package_id,
                    "interior": { "source_url": job.interior_url },
                    "cover": { "source_url": job.cover_url },
                },
            }],
            "shipping_address": {
                "name": address.name,
                "street1": address.street1,
                "street2": address.street2,
                "city": address.city,
                "state_code": address.state_code,
                "postcode": address.postcode,
                "country_code": address.country_code,
                "phone_number": address.phone_number,
            },
        })
    }
}

#[async_trait]
impl PrintProvider for LuluClient {
    async fn submit_job(&self, job: &PrintJobRequest) -> Result<String, ProviderError> {
        let token = self.access_token().await?;
        let url = format!("{}{PRINT_JOBS_PATH}", self.settings.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&self.job_body(job))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(external_id = %job.external_id, %status, body, "Print job rejected");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: JobResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let job_id = match created.id {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) if !s.is_empty() => s,
            other => return Err(ProviderError::InvalidResponse(format!("job id {other}"))),
        };

        tracing::info!(external_id = %job.external_id, provider_job_id = %job_id, "Print job created");
        Ok(job_id)
    }
}

// ============================================================================
// Webhook
// ============================================================================

/// Status change reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub job_id: String,
    pub status: String,
    pub tracking_number: Option<String>,
}

/// Verify the `Lulu-HMAC-SHA256` header: hex HMAC-SHA256 of the raw body
pub fn verify_webhook_signature(body: &[u8], signature: &str, secret: &str) -> Result<(), &'static str> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(body);
    let sig_bytes = hex::decode(signature.trim()).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Webhook signature mismatch")
}

#[derive(Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    topic: Option<String>,
    data: WebhookJob,
}

#[derive(Deserialize)]
struct WebhookJob {
    id: serde_json::Value,
    status: WebhookStatus,
    #[serde(default)]
    line_items: Vec<WebhookLineItem>,
}

#[derive(Deserialize)]
struct WebhookStatus {
    name: String,
}

#[derive(Deserialize)]
struct WebhookLineItem {
    #[serde(default)]
    tracking_id: Option<String>,
}

/// Parse a `PRINT_JOB_STATUS_CHANGED` payload
pub fn parse_webhook(body: &[u8]) -> Result<ProviderEvent, String> {
    let payload: WebhookPayload = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    if let Some(topic) = payload.topic.as_deref()
        && topic != "PRINT_JOB_STATUS_CHANGED"
    {
        return Err(format!("unsupported topic {topic}"));
    }

    let job_id = match payload.data.id {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) if !s.trim().is_empty() => s,
        _ => return Err("missing job id".to_string()),
    };
    let status = payload.data.status.name.trim().to_string();
    if status.is_empty() {
        return Err("missing status".to_string());
    }
    let tracking_number = payload
        .data
        .line_items
        .into_iter()
        .filter_map(|item| item.tracking_id)
        .find(|t| !t.trim().is_empty());

    Ok(ProviderEvent {
        job_id,
        status,
        tracking_number,
    })
}

#[cfg(test)]
pub(crate) fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
