//! BlogMirror binary entry point

use blogmirror::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Initialize metrics
/// 3. Load configuration from file and environment
/// 4. Initialize AppState and start sync workers
/// 5. Start the periodic refresh task (if configured)
/// 6. Wait for Ctrl-C, then drain the queue
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("BLOGMIRROR__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "blogmirror=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "blogmirror=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting BlogMirror...");

    // 2. Initialize metrics
    blogmirror::metrics::init_metrics();

    // 3. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        database = %config.database.path.display(),
        profile = ?config.sync.profile,
        workers = config.sync.workers,
        "Configuration loaded"
    );

    // 4. Initialize application state
    let (state, workers) = AppState::new(config).await?;

    // 5. Start background tasks
    let refresh = state
        .config
        .sync
        .refresh_interval()
        .map(|period| spawn_refresh_task(state.clone(), period));

    // 6. Shut down on Ctrl-C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, draining sync queue...");

    if let Some(refresh) = refresh {
        refresh.abort();
    }
    drop(state);
    workers.join().await;

    tracing::info!("BlogMirror stopped");
    Ok(())
}

/// Spawn the periodic refresh task
///
/// Each tick requests a sync for every account with credentials and prunes
/// expired kv entries.
fn spawn_refresh_task(
    state: AppState,
    period: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            tracing::info!("Running scheduled refresh...");
            match state.refresh_all().await {
                Ok(accepted) => tracing::info!(accepted, "Scheduled refresh queued"),
                Err(error) => {
                    tracing::error!(%error, "Scheduled refresh failed");
                    break;
                }
            }

            match state.kv.prune_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Pruned expired kv entries"),
                Err(error) => tracing::warn!(%error, "Failed to prune kv entries"),
            }
        }
    });

    tracing::info!(period_seconds = period.as_secs(), "Refresh task spawned");
    handle
}
