//! Service configuration

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// HTTP port
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    /// Bucket holding story / hero / original images
    pub images_bucket: String,
    /// Bucket receiving generated documents
    pub artifacts_bucket: String,
    /// Signed-URL lifetime for assets fetched during assembly
    pub asset_url_ttl: Duration,
    /// Digital download link lifetime
    pub download_ttl: Duration,
    /// Lifetime of artifact URLs handed to the print provider
    pub print_url_ttl: Duration,
    /// Soft-lock lease of one dispatcher run
    pub claim_lease: Duration,
    /// Physical orders escalate to manual review after this many failed runs
    pub max_failures_before_review: i64,
    /// SES sender email address
    pub ses_from_email: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Print provider
    pub lulu_api_base: String,
    pub lulu_client_key: String,
    pub lulu_client_secret: String,
    pub lulu_webhook_secret: String,
    pub lulu_pod_package_id: String,
    pub lulu_shipping_level: String,
    /// JSON overrides for the provider status map
    pub print_status_map: Option<String>,
    /// Bearer token for /api/*
    pub internal_api_token: String,
    /// `json` for JSON log lines
    pub log_format: String,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

const DAY_SECS: u64 = 24 * 60 * 60;

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = env_or("ENVIRONMENT", "development");

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: env_parse("HTTP_PORT", 8080),
            environment: environment.clone(),
            images_bucket: env_or("IMAGES_BUCKET", "doodle-creations"),
            artifacts_bucket: env_or("ARTIFACTS_BUCKET", "doodle-books"),
            asset_url_ttl: Duration::from_secs(env_parse("ASSET_URL_TTL_SECS", 3600)),
            download_ttl: Duration::from_secs(env_parse("DOWNLOAD_TTL_DAYS", 7u64) * DAY_SECS),
            print_url_ttl: Duration::from_secs(env_parse("PRINT_URL_TTL_DAYS", 7u64) * DAY_SECS),
            claim_lease: Duration::from_secs(env_parse("CLAIM_LEASE_SECS", 900)),
            max_failures_before_review: env_parse("MAX_FAILURES_BEFORE_REVIEW", 3),
            ses_from_email: env_or("SES_FROM_EMAIL", "books@doodle.studio"),
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            lulu_api_base: env_or("LULU_API_BASE", "https://api.lulu.com"),
            lulu_client_key: Self::require_secret("LULU_CLIENT_KEY", &environment)?,
            lulu_client_secret: Self::require_secret("LULU_CLIENT_SECRET", &environment)?,
            lulu_webhook_secret: Self::require_secret("LULU_WEBHOOK_SECRET", &environment)?,
            lulu_pod_package_id: env_or("LULU_POD_PACKAGE_ID", "0850X0850FCPRESS080CW444GXX"),
            lulu_shipping_level: env_or("LULU_SHIPPING_LEVEL", "MAIL"),
            print_status_map: std::env::var("PRINT_STATUS_MAP").ok().filter(|s| !s.trim().is_empty()),
            internal_api_token: Self::require_secret("INTERNAL_API_TOKEN", &environment)?,
            log_format: env_or("LOG_FORMAT", "text"),
        })
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}
