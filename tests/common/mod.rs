//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] over an
//! in-memory DB and a temporary media root. [`TestHarness::with_server`]
//! starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use rh_core::config::Config;
use rh_core::{Error, LibraryId, VideoId};
use rh_db::models::{Dir, Library, Video};
use rh_db::pool::{init_memory_pool, DbPool};
use rh_server::context::AppContext;
use rh_server::indexer::{IndexMode, IndexReport};
use rh_server::probe::MetadataProbe;
use rh_server::router::build_router;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Probe double returning a fixed duration, or failing when `duration` is
/// `None`. Counts calls and can be slowed down.
#[derive(Debug, Default)]
pub struct FixedProbe {
    pub duration: Option<Duration>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FixedProbe {
    pub fn returning(secs: f64) -> Self {
        Self {
            duration: Some(Duration::from_secs_f64(secs)),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            duration: Some(Duration::from_secs(1)),
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProbe for FixedProbe {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn probe(&self, path: &Path) -> rh_core::Result<Duration> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.duration
            .ok_or_else(|| Error::Probe(format!("no duration for {}", path.display())))
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
///
/// Must be created inside a tokio runtime; the index workers stop when the
/// harness is dropped.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub media: TempDir,
    pub probe: Arc<FixedProbe>,
    cancel: CancellationToken,
}

impl TestHarness {
    /// Default configuration, in-memory DB, probe reporting 90 seconds.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, FixedProbe::returning(90.0))
    }

    pub fn with_probe(probe: FixedProbe) -> Self {
        Self::build(Config::default(), probe)
    }

    fn build(mut config: Config, probe: FixedProbe) -> Self {
        let media = tempfile::tempdir().expect("failed to create media root");
        config.media.root = media.path().to_path_buf();
        config.stream.token_secret = Some(TEST_SECRET.into());

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let probe = Arc::new(probe);
        let cancel = CancellationToken::new();
        let ctx = AppContext::build(config, db.clone(), probe.clone(), cancel.clone())
            .expect("failed to build context");

        Self {
            ctx,
            db,
            media,
            probe,
            cancel,
        }
    }

    /// Start an Axum server on a random port.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::serve(Self::new()).await
    }

    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        Self::serve(Self::with_config(config)).await
    }

    pub async fn serve(harness: Self) -> (Self, SocketAddr) {
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> rh_db::pool::PooledConnection {
        rh_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    pub fn media_root(&self) -> &Path {
        self.media.path()
    }

    /// Write `bytes` to `rel` under the media root, creating parents.
    pub fn write_file(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.media.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    pub fn remove_file(&self, rel: &str) {
        std::fs::remove_file(self.media.path().join(rel)).unwrap();
    }

    /// Create a library row and its directory under the media root.
    pub fn create_library(&self, media_path: &str) -> Library {
        std::fs::create_dir_all(self.media.path().join(media_path)).unwrap();
        rh_db::queries::libraries::create_library(&self.conn(), media_path, media_path).unwrap()
    }

    pub fn library(&self, id: LibraryId) -> Library {
        rh_db::queries::libraries::get_library(&self.conn(), id)
            .unwrap()
            .unwrap()
    }

    /// Run the indexer in the foreground.
    pub async fn index(&self, id: LibraryId, mode: IndexMode) -> IndexReport {
        self.ctx
            .indexer
            .run(id, mode, &CancellationToken::new())
            .await
    }

    pub fn videos(&self, id: LibraryId) -> Vec<Video> {
        rh_db::queries::videos::list_videos(&self.conn(), id).unwrap()
    }

    pub fn dirs(&self, id: LibraryId) -> Vec<Dir> {
        rh_db::queries::dirs::list_dirs(&self.conn(), id).unwrap()
    }

    pub fn video_at(&self, id: LibraryId, library_path: &str) -> Video {
        self.videos(id)
            .into_iter()
            .find(|v| v.library_path == library_path)
            .unwrap_or_else(|| panic!("no video at {library_path}"))
    }

    pub fn dir_at(&self, id: LibraryId, library_path: &str) -> Dir {
        rh_db::queries::dirs::get_dir_by_path(&self.conn(), id, library_path)
            .unwrap()
            .unwrap_or_else(|| panic!("no dir at {library_path}"))
    }

    /// Open a stream for the anonymous caller without going through HTTP.
    pub fn issue_key(&self, video_id: VideoId) -> String {
        let conn = self.conn();
        let video = rh_db::queries::videos::get_video(&conn, video_id)
            .unwrap()
            .unwrap();
        let library = rh_db::queries::libraries::get_library(&conn, video.library_id)
            .unwrap()
            .unwrap();
        let anon = rh_server::middleware::auth::Caller::anonymous();
        let token = rh_db::queries::stream_tokens::create_stream_token(
            &conn,
            anon.user_id,
            anon.device_id.unwrap(),
            video_id,
        )
        .unwrap();
        let path = self
            .media
            .path()
            .join(&library.media_path)
            .join(&video.library_path);
        self.ctx.tokens.issue(token.id, path)
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
