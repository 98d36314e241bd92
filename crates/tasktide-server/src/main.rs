//! # tasktide-server
//!
//! Binary entry point: reads configuration from the environment, opens the
//! database and attachment directory, and serves the REST API until Ctrl+C.

use std::time::Duration;

use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tasktide_server::attachments::AttachmentStore;
use tasktide_server::rate_limit::RateLimiter;
use tasktide_server::{api, AppState, ServerConfig};
use tasktide_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tasktide_server=debug")),
        )
        .init();

    info!("Starting tasktide server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        instance = %config.instance_name,
        registration_open = config.registration_open,
        day_offset_minutes = config.day_offset_minutes,
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => {
            info!(path = %path.display(), "opening database");
            Database::open_at(path)?
        }
        None => Database::new()?,
    };

    // Attachment store (creates directory if missing)
    let attachments =
        AttachmentStore::new(config.upload_path.clone(), config.max_upload_size).await?;

    let rate_limiter =
        RateLimiter::per_window(config.rate_limit_per_window, config.rate_limit_window());

    let http_addr = config.http_addr;
    let window = config.rate_limit_window();
    let app_state = AppState::new(db, attachments, rate_limiter.clone(), config);

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Evict buckets that have been idle for a full window (checked every 5 minutes)
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(window).await;
        }
    });

    // Expired session cleanup (hourly)
    let sessions_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            let purged = sessions_state
                .db()
                .and_then(|db| db.purge_expired_sessions(Utc::now()).map_err(Into::into));
            match purged {
                Ok(0) => {}
                Ok(n) => info!(count = n, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
