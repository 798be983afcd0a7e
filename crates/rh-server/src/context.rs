//! Application context shared by route handlers via axum state.

use std::sync::Arc;

use rh_core::config::Config;
use rh_core::Result;
use rh_db::pool::DbPool;
use tokio_util::sync::CancellationToken;

use crate::indexer::LibraryIndexer;
use crate::probe::MetadataProbe;
use crate::scheduler::IndexScheduler;
use crate::tokens::{StreamTokenResolver, StreamTokenService};

/// Cheaply cloneable: every field is an `Arc` or a pool handle.
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration.
    pub config: Arc<Config>,
    /// Stream key to file path resolution.
    pub tokens: Arc<dyn StreamTokenResolver>,
    pub indexer: Arc<LibraryIndexer>,
    pub scheduler: Arc<IndexScheduler>,
}

impl AppContext {
    /// Wire up the token service, indexer, and scheduler workers.
    ///
    /// Must be called inside a tokio runtime; the scheduler spawns its
    /// workers immediately and stops them when `cancel` fires.
    pub fn build(
        config: Config,
        db: DbPool,
        probe: Arc<dyn MetadataProbe>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let tokens = Arc::new(StreamTokenService::from_config(&config.stream)?);
        let indexer = Arc::new(LibraryIndexer::new(
            db.clone(),
            config.media.root.clone(),
            probe,
        ));
        let scheduler = IndexScheduler::start(indexer.clone(), config.indexer.workers, cancel);

        Ok(Self {
            db,
            config: Arc::new(config),
            tokens,
            indexer,
            scheduler,
        })
    }
}
