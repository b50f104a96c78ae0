//! Application state for doodle-cloud

use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::Client as SesClient;
use doodle_pdf::PrintSpec;
use sqlx::PgPool;

use crate::assets::{AssetResolver, HttpFetch};
use crate::config::Config;
use crate::db::{OrderRepository, PgCreationSource, PgOrderRepository};
use crate::email::SesNotifier;
use crate::error::BoxError;
use crate::fulfillment::{DispatchSettings, Dispatcher, DispatcherDeps};
use crate::lulu::{LuluClient, LuluSettings};
use crate::orders::OrderStateMachine;
use crate::reconcile::{Reconciler, StatusMap};
use crate::retry::RetryConfig;
use crate::storage::S3Storage;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderRepository>,
    pub machine: OrderStateMachine,
    pub dispatcher: Arc<Dispatcher>,
    pub reconciler: Arc<Reconciler>,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Print provider webhook HMAC secret
    pub print_webhook_secret: String,
    /// Bearer token for /api/*
    pub internal_api_token: String,
}

impl AppState {
    /// Connect to PostgreSQL and AWS and wire every component
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3 = S3Client::new(&aws_config);
        let ses = SesClient::new(&aws_config);

        let orders: Arc<dyn OrderRepository> = Arc::new(PgOrderRepository::new(pool.clone()));
        let storage = Arc::new(S3Storage::new(s3));
        let notifier = Arc::new(SesNotifier::new(ses, &config.ses_from_email));
        let printer = Arc::new(LuluClient::new(LuluSettings {
            api_base: config.lulu_api_base.clone(),
            client_key: config.lulu_client_key.clone(),
            client_secret: config.lulu_client_secret.clone(),
            pod_package_id: config.lulu_pod_package_id.clone(),
            shipping_level: config.lulu_shipping_level.clone(),
            contact_email: config.ses_from_email.clone(),
        })?);
        let assets = AssetResolver::new(
            storage.clone(),
            Arc::new(HttpFetch::new()?),
            &config.images_bucket,
            config.asset_url_ttl,
        );

        let dispatcher = Dispatcher::new(
            DispatcherDeps {
                orders: orders.clone(),
                creations: Arc::new(PgCreationSource::new(pool.clone())),
                assets,
                storage,
                printer,
                notifier: notifier.clone(),
            },
            DispatchSettings {
                artifacts_bucket: config.artifacts_bucket.clone(),
                download_ttl: config.download_ttl,
                print_url_ttl: config.print_url_ttl,
                claim_lease: config.claim_lease,
                max_failures_before_review: config.max_failures_before_review,
                print: PrintSpec::default(),
                retry: RetryConfig::default(),
            },
        );

        let statuses = StatusMap::with_overrides(config.print_status_map.as_deref())?;
        let reconciler = Reconciler::new(orders.clone(), notifier, statuses);

        tracing::info!(
            images_bucket = %config.images_bucket,
            artifacts_bucket = %config.artifacts_bucket,
            "Fulfillment pipeline ready"
        );

        Ok(Self {
            machine: OrderStateMachine::new(orders.clone()),
            orders,
            dispatcher: Arc::new(dispatcher),
            reconciler: Arc::new(reconciler),
            stripe_webhook_secret: config.stripe_webhook_secret.clone(),
            print_webhook_secret: config.lulu_webhook_secret.clone(),
            internal_api_token: config.internal_api_token.clone(),
        })
    }
}
