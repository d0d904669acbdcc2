//! Entitlement Daemon - Main Entry Point
//! Hosts the entitlement notification queue on a local SQLite store

mod logging;
mod settings;
mod telemetry;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use entitlement_core::application::{EntitlementService, ExponentialRetryPolicy, ServiceCollaborators};
use entitlement_core::port::id_provider::UuidProvider;
use entitlement_core::port::time_provider::SystemTimeProvider;
use entitlement_core::port::{FixedOffsetCallContextFactory, IdProvider, TimeProvider};
use entitlement_infra_sqlite::{
    create_pool, run_migrations, SqliteBlockingStateDao, SqliteEntitlementApi,
    SqliteNotificationQueueService, SqlitePersistentBus,
};
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let settings = Settings::load().context("Failed to load settings")?;
    let _log_guard = logging::init(&settings.log)?;

    info!("Entitlement daemon v{} starting...", VERSION);

    // 2. Database
    let database_url = shellexpand::tilde(&settings.database.url).into_owned();
    ensure_database_dir(&database_url)?;
    info!(database_url = %database_url, "Initializing database...");

    let pool = create_pool(&database_url)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 3. DI wiring
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
    let blocking_state_dao = Arc::new(SqliteBlockingStateDao::new(
        pool.clone(),
        Arc::clone(&time_provider),
    ));
    let entitlement_api = Arc::new(SqliteEntitlementApi::new(
        pool.clone(),
        blocking_state_dao.clone(),
        Arc::clone(&id_provider),
        Arc::clone(&time_provider),
    ));
    let queue_service = Arc::new(SqliteNotificationQueueService::with_poll_interval(
        pool.clone(),
        Arc::clone(&time_provider),
        Duration::from_millis(settings.queue.poll_interval_ms),
    ));
    let context_factory = Arc::new(
        FixedOffsetCallContextFactory::new(settings.context.time_zone_offset_secs)
            .context("Invalid account time zone")?,
    );
    let retry_schedule = Arc::new(ExponentialRetryPolicy::new(
        settings.retry.base_delay_ms,
        settings.retry.backoff_factor,
        settings.retry.max_attempts,
    )
    .context("Invalid retry settings")?);

    let service = EntitlementService::new(ServiceCollaborators {
        queue_service,
        entitlement_api,
        blocking_state_dao,
        bus: Arc::new(SqlitePersistentBus::new(pool.clone(), Arc::clone(&time_provider))),
        context_factory,
        id_provider,
        time_provider,
        retry_schedule,
    });

    // 4. Queue lifecycle: a name collision aborts before any delivery starts
    service
        .initialize()
        .await
        .context("Entitlement service initialization failed")?;
    service.start().await.context("Entitlement service start failed")?;

    info!("System ready. Delivering entitlement notifications...");
    info!("Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 6. Graceful shutdown: in-flight handling completes before the loop exits
    if let Err(e) = service.stop().await {
        error!(error = %e, "Entitlement service stop failed");
    }
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}

/// SQLite creates the file but not its directory
fn ensure_database_dir(database_url: &str) -> Result<()> {
    if database_url.contains(":memory:") {
        return Ok(());
    }
    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}
