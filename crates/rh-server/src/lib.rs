//! rh-server: HTTP API, stream engine, and background library indexer.
//!
//! This crate ties the rh-* crates together into a running server:
//!
//! - conditional and range-aware file delivery behind signed stream keys
//! - an incremental filesystem indexer fed by a per-library job queue
//! - library management and browsing endpoints
//! - graceful shutdown via signal handling

pub mod conditional;
pub mod context;
pub mod delivery;
pub mod error;
pub mod indexer;
pub mod middleware;
pub mod probe;
pub mod range;
pub mod router;
pub mod routes;
pub mod scheduler;
pub mod tokens;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rh_core::config::Config;
use rh_core::{Error, LibraryId, Result};
use rh_db::pool::{get_conn, DbPool};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::indexer::{IndexMode, IndexReport, LibraryIndexer};
use crate::probe::{FfprobeProbe, MetadataProbe, UnavailableProbe};

/// Open (or create) the database without touching index state.
pub fn open_pool(config: &Config) -> Result<DbPool> {
    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    let db = rh_db::pool::init_pool(db_path)?;
    if existed {
        tracing::info!("Database opened (existing) at {}", db_path.display());
    } else {
        tracing::info!("Database created (new) at {}", db_path.display());
    }
    Ok(db)
}

/// Open the database and close any index runs a previous process left
/// open. Only the server owns index state, so only it calls this.
pub fn open_database(config: &Config) -> Result<DbPool> {
    let db = open_pool(config)?;

    let conn = get_conn(&db)?;
    let reset = rh_db::queries::libraries::reset_interrupted(&conn, &Utc::now().to_rfc3339())?;
    for library_id in reset {
        tracing::warn!(library_id = %library_id, "Closed index run interrupted by shutdown");
    }

    Ok(db)
}

/// The configured ffprobe, or a probe that always fails.
pub fn discover_probe(config: &Config) -> Arc<dyn MetadataProbe> {
    match FfprobeProbe::discover(&config.indexer) {
        Some(probe) => {
            tracing::info!("Tool found: ffprobe");
            Arc::new(probe)
        }
        None => {
            tracing::warn!("ffprobe not found; full indexes will not record durations");
            Arc::new(UnavailableProbe)
        }
    }
}

/// Start the reelhouse server.
///
/// Returns when a shutdown signal is received.
pub async fn start(config: Config) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    if !config.media.root.exists() {
        std::fs::create_dir_all(&config.media.root)?;
        tracing::info!("Created media root {}", config.media.root.display());
    }

    let db = open_database(&config)?;
    let probe = discover_probe(&config);

    let cancel = CancellationToken::new();
    let ctx = AppContext::build(config.clone(), db, probe, cancel.clone())?;

    let periodic = config
        .indexer
        .schedule_interval_secs
        .filter(|secs| *secs > 0)
        .map(|secs| ctx.scheduler.spawn_periodic(Duration::from_secs(secs)));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid server address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    let app = router::build_router(ctx.clone());
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Stop background work whichever way the server ended.
    cancel.cancel();
    if let Some(handle) = periodic {
        let _ = handle.await;
    }
    ctx.scheduler.join().await;

    serve_result.map_err(|e| Error::Internal(format!("server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Run one index of `library_id` in the foreground.
///
/// A server may be running against the same database, so runs it has in
/// flight are left open.
pub async fn index_once(config: &Config, library_id: LibraryId, mode: IndexMode) -> Result<IndexReport> {
    let db = open_pool(config)?;
    {
        let conn = get_conn(&db)?;
        rh_db::queries::libraries::get_library(&conn, library_id)?
            .ok_or_else(|| Error::not_found("library", library_id))?;
    }

    let indexer = LibraryIndexer::new(db, config.media.root.clone(), discover_probe(config));
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(shutdown_signal(cancel.clone()));

    let report = indexer.run(library_id, mode, &cancel).await;
    watcher.abort();
    Ok(report)
}

/// Wait for SIGINT, SIGTERM, or `cancel`.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
