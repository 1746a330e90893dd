//! doorwatch-an - Motion Image Analysis Service
//!
//! Accepts motion-triggered images from the capture service, classifies
//! them through the Clarifai API under a pro-rated monthly budget, archives
//! them to S3, and coalesces success notifications (webhook + batch email)
//! behind a quiet-window debounce.

use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use doorwatch_common::config::TomlConfig;
use doorwatch_common::events::EventBus;

use doorwatch_an::config::{resolve_clarifai_api_key, ServiceConfig};
use doorwatch_an::services::archiver::{Archiver, S3ObjectStore};
use doorwatch_an::services::classifier::Classifier;
use doorwatch_an::services::coalescer::BatchCoalescer;
use doorwatch_an::services::mailer::SmtpMailer;
use doorwatch_an::services::notifier::WebhookNotifier;
use doorwatch_an::services::pause::PauseGate;
use doorwatch_an::services::quota::QuotaTracker;
use doorwatch_an::services::recognizer::ClarifaiClient;
use doorwatch_an::AppState;

/// Cadence of the quota month-rollover check
const QUOTA_RESET_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting doorwatch-an (motion image analysis) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Load TOML config and resolve the root folder
    let toml_config = TomlConfig::load().unwrap_or_else(|e| {
        error!("Config file unusable, continuing with defaults: {}", e);
        TomlConfig::default()
    });
    let cli_root = std::env::args().nth(1);
    let root_folder = doorwatch_common::config::resolve_root_folder(cli_root.as_deref(), &toml_config);

    // Step 2: Create the root folder if missing, open or create the database
    let db_path = doorwatch_common::config::prepare_root_folder(&root_folder)
        .context("Failed to initialize root folder")?;
    info!("Database: {}", db_path.display());
    let db_pool = doorwatch_common::db::init_database(&db_path).await?;
    info!("Database connection established");

    // Step 3: Resolve service configuration and the Clarifai credential
    let config = ServiceConfig::resolve(&toml_config);
    let api_key = resolve_clarifai_api_key(&db_pool, &toml_config).await?;
    let api_key = Arc::new(RwLock::new(api_key));

    // Create event bus for SSE broadcasting
    let event_bus = EventBus::new(100);

    // Step 4: Quota tracker; roll the counter over now, then once a day
    let quota = Arc::new(QuotaTracker::new(
        db_pool.clone(),
        config.monthly_call_ceiling,
    ));
    quota.reset_if_new_month().await?;
    {
        let quota = Arc::clone(&quota);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(QUOTA_RESET_PERIOD);
            interval.tick().await; // first tick completes immediately
            loop {
                interval.tick().await;
                if let Err(e) = quota.reset_if_new_month().await {
                    error!("Quota month-rollover check failed: {}", e);
                }
            }
        });
    }

    // Step 5: Classification path
    let recognizer = Arc::new(
        ClarifaiClient::new(Arc::clone(&api_key), config.model_id.clone())
            .map_err(|e| anyhow!("Failed to create Clarifai client: {}", e))?,
    );
    let classifier = Arc::new(Classifier::new(
        recognizer,
        Arc::clone(&quota),
        config.threshold,
    ));

    // Step 6: Flush collaborators and the coalescer
    let bucket = config.s3_bucket.clone().ok_or_else(|| {
        anyhow!("s3_bucket not configured (doorwatch.toml or DOORWATCH_S3_BUCKET)")
    })?;
    let store = Arc::new(
        S3ObjectStore::from_env(bucket, config.s3_region.clone())
            .await
            .map_err(|e| anyhow!("Failed to create S3 client: {}", e))?,
    );
    let archiver = Arc::new(Archiver::new(store, config.presign_ttl));
    let mailer = Arc::new(SmtpMailer::new(config.mail.clone()));
    let notifier = Arc::new(WebhookNotifier::new(
        config.notification_url.clone(),
        config.after_stored_url.clone(),
    )
    .map_err(|e| anyhow!("Failed to create webhook client: {}", e))?);
    let coalescer = BatchCoalescer::new(
        config.quiet_window,
        archiver,
        mailer,
        notifier,
        event_bus.clone(),
    );

    // Create application state and serve
    let state = AppState::new(
        db_pool,
        event_bus,
        classifier,
        coalescer,
        Arc::new(PauseGate::new()),
        quota,
        api_key,
    );
    let app = doorwatch_an::build_router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Listening on http://{}:{}", config.host, config.port);
    info!("Health check: http://{}:{}/health", config.host, config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
