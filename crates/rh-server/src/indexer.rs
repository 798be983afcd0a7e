//! Incremental library indexer.
//!
//! A run reconciles the `videos` table with the files under a library root,
//! rebuilds the `dirs` hierarchy from the surviving video paths, then links
//! videos to their directories. A second run over an unchanged tree writes
//! nothing but the started/completed timestamps.
//!
//! Runs never fail outward: every error is logged, the run is closed with a
//! completed timestamp, and the caller gets an [`IndexReport`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rh_core::{is_video_file, Error, LibraryId, Result, VideoId};
use rh_db::models::Library;
use rh_db::pool::{get_conn, DbPool};
use rh_db::queries::{dirs, libraries, videos};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::probe::MetadataProbe;

/// How much work a run does per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Presence and absence only.
    #[default]
    Quick,
    /// Also probe durations of new videos and of videos still missing one.
    Full,
}

impl IndexMode {
    pub fn from_full(full: bool) -> Self {
        if full {
            Self::Full
        } else {
            Self::Quick
        }
    }
}

impl fmt::Display for IndexMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quick => f.write_str("quick"),
            Self::Full => f.write_str("full"),
        }
    }
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub videos_removed: usize,
    pub videos_added: usize,
    pub durations_set: usize,
    pub probe_failures: usize,
    pub dirs_removed: usize,
    pub dirs_added: usize,
    pub videos_linked: usize,
    pub videos_unlinked: usize,
    pub root_missing: bool,
    pub cancelled: bool,
}

impl IndexReport {
    /// Whether the run changed any video or dir row.
    pub fn changed(&self) -> bool {
        self.videos_removed
            + self.videos_added
            + self.durations_set
            + self.dirs_removed
            + self.dirs_added
            + self.videos_linked
            > 0
    }
}

/// A video file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FoundFile {
    library_path: String,
    abs_path: PathBuf,
    title: String,
}

#[derive(Debug, Default)]
struct WalkResult {
    /// Sorted by `library_path`.
    found: Vec<FoundFile>,
    gone: Vec<VideoId>,
}

/// Walks library roots and writes the results to the database.
pub struct LibraryIndexer {
    db: DbPool,
    media_root: PathBuf,
    probe: Arc<dyn MetadataProbe>,
}

impl LibraryIndexer {
    pub fn new(db: DbPool, media_root: PathBuf, probe: Arc<dyn MetadataProbe>) -> Self {
        Self {
            db,
            media_root,
            probe,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub(crate) fn db(&self) -> &DbPool {
        &self.db
    }

    /// Index one library.
    pub async fn run(
        &self,
        library_id: LibraryId,
        mode: IndexMode,
        cancel: &CancellationToken,
    ) -> IndexReport {
        let mut report = IndexReport::default();

        let library = match self.load_library(library_id) {
            Ok(Some(lib)) => lib,
            Ok(None) => {
                tracing::warn!(library_id = %library_id, "Library vanished before indexing");
                return report;
            }
            Err(e) => {
                tracing::error!(library_id = %library_id, error = %e, "Failed to load library");
                return report;
            }
        };

        let root = self.media_root.join(&library.media_path);
        if !root.is_dir() {
            tracing::error!(
                library_id = %library_id,
                root = %root.display(),
                "Library root does not exist; skipping index"
            );
            report.root_missing = true;
            if library.is_indexing() {
                self.finish(library_id);
            }
            return report;
        }

        if let Err(e) = self.mark_started(library_id) {
            tracing::error!(library_id = %library_id, error = %e, "Failed to mark index started");
        }

        tracing::info!(
            library_id = %library_id,
            root = %root.display(),
            mode = %mode,
            "Starting library index"
        );

        if let Err(e) = self
            .reconcile(&library, &root, mode, cancel, &mut report)
            .await
        {
            tracing::error!(library_id = %library_id, error = %e, "Library index failed");
        }

        self.finish(library_id);

        tracing::info!(
            library_id = %library_id,
            videos_removed = report.videos_removed,
            videos_added = report.videos_added,
            durations_set = report.durations_set,
            probe_failures = report.probe_failures,
            dirs_removed = report.dirs_removed,
            dirs_added = report.dirs_added,
            videos_linked = report.videos_linked,
            videos_unlinked = report.videos_unlinked,
            cancelled = report.cancelled,
            "Library index complete"
        );

        report
    }

    fn load_library(&self, library_id: LibraryId) -> Result<Option<Library>> {
        let conn = get_conn(&self.db)?;
        libraries::get_library(&conn, library_id)
    }

    fn mark_started(&self, library_id: LibraryId) -> Result<()> {
        let conn = get_conn(&self.db)?;
        libraries::mark_index_started(&conn, library_id, &Utc::now().to_rfc3339())?;
        Ok(())
    }

    fn finish(&self, library_id: LibraryId) {
        let result = get_conn(&self.db).and_then(|conn| {
            libraries::mark_index_completed(&conn, library_id, &Utc::now().to_rfc3339())
        });
        if let Err(e) = result {
            tracing::error!(library_id = %library_id, error = %e, "Failed to mark index completed");
        }
    }

    async fn reconcile(
        &self,
        library: &Library,
        root: &Path,
        mode: IndexMode,
        cancel: &CancellationToken,
        report: &mut IndexReport,
    ) -> Result<()> {
        let library_id = library.id;

        let existing = {
            let conn = get_conn(&self.db)?;
            videos::list_videos(&conn, library_id)?
        };
        let known: Vec<(VideoId, String)> = existing
            .iter()
            .map(|v| (v.id, v.library_path.clone()))
            .collect();

        let walk_root = root.to_path_buf();
        let walk = tokio::task::spawn_blocking(move || walk_library(&walk_root, &known))
            .await
            .map_err(|e| Error::Internal(format!("library walk panicked: {e}")))?;

        // 1. Remove rows whose file is gone, as one batch.
        if !walk.gone.is_empty() {
            let conn = get_conn(&self.db)?;
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| Error::database(e.to_string()))?;
            report.videos_removed = videos::delete_videos(&tx, &walk.gone)?;
            tx.commit().map_err(|e| Error::database(e.to_string()))?;
        }
        if cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(());
        }

        // 2. Insert files the table does not know yet.
        let known_paths: HashSet<&str> = existing.iter().map(|v| v.library_path.as_str()).collect();
        for file in walk
            .found
            .iter()
            .filter(|f| !known_paths.contains(f.library_path.as_str()))
        {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(());
            }

            let duration = match mode {
                IndexMode::Full => self.probe_duration(&file.abs_path, report).await,
                IndexMode::Quick => None,
            };

            let conn = get_conn(&self.db)?;
            match videos::insert_video(&conn, library_id, &file.title, &file.library_path, duration) {
                Ok(_) => report.videos_added += 1,
                Err(e) => {
                    tracing::error!(
                        library_id = %library_id,
                        path = %file.library_path,
                        error = %e,
                        "Failed to insert video"
                    );
                }
            }
        }

        // Full runs also fill in durations left empty by earlier runs.
        if mode == IndexMode::Full {
            let gone: HashSet<VideoId> = walk.gone.iter().copied().collect();
            for video in existing
                .iter()
                .filter(|v| v.duration_secs.is_none() && !gone.contains(&v.id))
            {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    return Ok(());
                }
                let abs = root.join(&video.library_path);
                if let Some(secs) = self.probe_duration(&abs, report).await {
                    let conn = get_conn(&self.db)?;
                    videos::set_video_duration(&conn, video.id, Some(secs))?;
                    report.durations_set += 1;
                }
            }
        }

        // 3. Rebuild the directory hierarchy, one depth per transaction.
        let all_paths: Vec<String> = {
            let conn = get_conn(&self.db)?;
            videos::list_videos(&conn, library_id)?
                .into_iter()
                .map(|v| v.library_path)
                .collect()
        };
        for (depth, wanted) in dir_paths_by_depth(&all_paths) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(());
            }
            let conn = get_conn(&self.db)?;
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| Error::database(e.to_string()))?;

            let stale: Vec<_> = dirs::list_dirs_at_depth(&tx, library_id, depth)?
                .into_iter()
                .filter(|d| !wanted.contains(&d.library_path))
                .map(|d| d.id)
                .collect();
            report.dirs_removed += dirs::delete_dirs(&tx, &stale)?;

            for path in &wanted {
                if dirs::get_dir_by_path(&tx, library_id, path)?.is_some() {
                    continue;
                }
                let (parent_path, name) = match path.rsplit_once('/') {
                    Some((parent, name)) => (Some(parent), name),
                    None => (None, path.as_str()),
                };
                let parent = match parent_path {
                    Some(p) => {
                        let found = dirs::get_dir_by_path(&tx, library_id, p)?;
                        if found.is_none() {
                            tracing::warn!(
                                library_id = %library_id,
                                path = %path,
                                "Parent dir missing; attaching at root"
                            );
                        }
                        found.map(|d| d.id)
                    }
                    None => None,
                };
                dirs::insert_dir(&tx, library_id, parent, depth, name, path)?;
                report.dirs_added += 1;
            }

            tx.commit().map_err(|e| Error::database(e.to_string()))?;
        }

        // 4. Link videos that have no dir yet.
        let conn = get_conn(&self.db)?;
        let by_path = dirs::dir_ids_by_path(&conn, library_id)?;
        for video in videos::list_unlinked_videos(&conn, library_id)? {
            let Some(dir_path) = video.dir_path() else {
                continue;
            };
            match by_path.get(dir_path) {
                Some(dir_id) => {
                    videos::set_video_dir(&conn, video.id, Some(*dir_id))?;
                    report.videos_linked += 1;
                }
                None => {
                    tracing::error!(
                        library_id = %library_id,
                        video_id = %video.id,
                        dir = %dir_path,
                        "No dir row for video; leaving it unlinked"
                    );
                    report.videos_unlinked += 1;
                }
            }
        }

        Ok(())
    }

    async fn probe_duration(&self, path: &Path, report: &mut IndexReport) -> Option<f64> {
        match self.probe.probe(path).await {
            Ok(d) => Some(d.as_secs_f64()),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    probe = self.probe.name(),
                    error = %e,
                    "Failed to probe duration"
                );
                report.probe_failures += 1;
                None
            }
        }
    }
}

/// Walk `root` for video files and find which `known` rows have no file.
///
/// Symlinks are followed, so a linked file counts as present here exactly
/// when `Path::is_file` says so. Link cycles surface as walk errors.
fn walk_library(root: &Path, known: &[(VideoId, String)]) -> WalkResult {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Error walking library");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_video_file(entry.path()) {
            continue;
        }

        let Some(library_path) = library_path(root, entry.path()) else {
            tracing::warn!(path = %entry.path().display(), "Skipping file with non UTF-8 path");
            continue;
        };
        let title = entry
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        found.push(FoundFile {
            library_path,
            abs_path: entry.into_path(),
            title,
        });
    }
    found.sort_by(|a, b| a.library_path.cmp(&b.library_path));

    let present: HashSet<&str> = found.iter().map(|f| f.library_path.as_str()).collect();
    let gone = known
        .iter()
        .filter(|(_, path)| !present.contains(path.as_str()) && !root.join(path).is_file())
        .map(|(id, _)| *id)
        .collect();

    WalkResult { found, gone }
}

/// `path` relative to `root`, segments joined with `/`.
fn library_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let segments: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    Some(segments?.join("/"))
}

/// Every directory prefix of `paths`, grouped by depth (0 = top level).
fn dir_paths_by_depth(paths: &[String]) -> BTreeMap<i64, BTreeSet<String>> {
    let mut by_depth: BTreeMap<i64, BTreeSet<String>> = BTreeMap::new();
    for path in paths {
        let Some((dir, _)) = path.rsplit_once('/') else {
            continue;
        };
        let mut prefix = String::new();
        for (depth, segment) in dir.split('/').enumerate() {
            if depth > 0 {
                prefix.push('/');
            }
            prefix.push_str(segment);
            by_depth.entry(depth as i64).or_default().insert(prefix.clone());
        }
    }
    by_depth
}
