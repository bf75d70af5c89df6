//! Acme Credential Server - Main entry point.
//!
//! Runs the expiry sweeper daemon against PostgreSQL.

use std::sync::Arc;

use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use acme_creds_lib::clock::SystemClock;
use acme_creds_lib::config::Config;
use acme_creds_lib::migration::Migrator;
use acme_creds_lib::notify::LogNotifier;
use acme_creds_lib::services::{start_sweeper_task, LifecycleManager, SweeperConfig};
use acme_creds_lib::store::postgres::PgStore;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Acme Credential Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development default for DATABASE_URL");
    }

    // Connect to PostgreSQL
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");
    info!("Database connection established");

    // Run migrations
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    info!("Database migrations complete");

    // Wire up the lifecycle manager
    let store = Arc::new(PgStore::new(db));
    let manager = LifecycleManager::new(store, Arc::new(SystemClock), Arc::new(LogNotifier));

    // Start the expiry sweeper
    let sweeper_config = SweeperConfig {
        interval_secs: config.sweep_interval_secs,
    };
    start_sweeper_task(manager, sweeper_config);
    info!(
        "Expiry sweeper started (interval: {} seconds)",
        config.sweep_interval_secs
    );

    // Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
