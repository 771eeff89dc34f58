use secrecy::ExposeSecret;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use card_tracker::api::{self, state::AppState};
use card_tracker::config::Config;
use card_tracker::db::{self, seed::SeedData};
use card_tracker::jobs::backup_monitor::{self, BackupMonitor};
use card_tracker::services::{notifier::WebhookNotifier, tracker::TrackingService};
use card_tracker::store::{PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "card_tracker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting card tracker...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Select the store
    let store = match &config.database_url {
        Some(database_url) => {
            let pool = db::create_pool(database_url.expose_secret(), config.lock_timeout()).await?;
            tracing::info!("Database pool created");

            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations completed");

            Store::Postgres(PgStore::new(pool, config.lock_timeout()))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Store::memory()
        }
    };

    let tracker = TrackingService::new(store.clone(), config.lock_timeout(), config.operations_limit);

    if let Some(seed_file) = &config.seed_file {
        let stats = SeedData::from_file(seed_file)?.apply(&tracker).await?;
        tracing::info!(created = stats.created, existing = stats.existing, file = %seed_file, "Seed file loaded");
    }

    // Start the backup monitor when a webhook is configured
    let _scheduler = match &config.backup_webhook_url {
        Some(url) => {
            let monitor = Arc::new(BackupMonitor::new(
                store.clone(),
                WebhookNotifier::new(url.clone())?,
                config.backup_status.clone(),
            ));
            monitor.init().await?;
            let scheduler = backup_monitor::start(monitor, config.backup_scan_interval()).await?;
            tracing::info!(status = %config.backup_status, "Backup monitor started");
            Some(scheduler)
        }
        None => {
            tracing::info!("BACKUP_WEBHOOK_URL not set, backup monitor disabled");
            None
        }
    };

    let host: std::net::IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((host, config.port));

    // Build router
    let app = api::router(AppState::new(tracker));

    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
