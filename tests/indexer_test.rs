//! End-to-end indexer runs against a temporary media root.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{FixedProbe, TestHarness};
use rh_server::indexer::IndexMode;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn builds_dirs_and_links_videos() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/a/b/video1.mkv", b"one");
    h.write_file("movies/a/video2.mp4", b"two");
    h.write_file("movies/a/readme.txt", b"skip");

    let report = h.index(lib.id, IndexMode::Full).await;
    assert_eq!(report.videos_added, 2);
    assert_eq!(report.dirs_added, 2);
    assert_eq!(report.videos_linked, 2);
    assert_eq!(report.videos_unlinked, 0);

    let a = h.dir_at(lib.id, "a");
    let ab = h.dir_at(lib.id, "a/b");
    assert_eq!((a.depth, a.parent_dir_id, a.name.as_str()), (0, None, "a"));
    assert_eq!((ab.depth, ab.parent_dir_id, ab.name.as_str()), (1, Some(a.id), "b"));

    let v1 = h.video_at(lib.id, "a/b/video1.mkv");
    let v2 = h.video_at(lib.id, "a/video2.mp4");
    assert_eq!(v1.dir_id, Some(ab.id));
    assert_eq!(v1.title, "video1");
    assert_eq!(v2.dir_id, Some(a.id));
    assert_eq!(v2.duration_secs, Some(90.0));

    let lib = h.library(lib.id);
    assert!(lib.last_index_started.is_some());
    assert!(!lib.is_indexing());
}

#[tokio::test]
async fn removed_file_drops_its_row_only() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/a/b/video1.mkv", b"one");
    h.write_file("movies/a/video2.mp4", b"two");
    h.index(lib.id, IndexMode::Quick).await;
    let ab = h.dir_at(lib.id, "a/b");

    h.remove_file("movies/a/b/video1.mkv");
    let report = h.index(lib.id, IndexMode::Quick).await;

    assert_eq!(report.videos_removed, 1);
    assert_eq!(report.videos_added, 0);
    let videos = h.videos(lib.id);
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].library_path, "a/video2.mp4");

    // No surviving path reaches depth 1, so that level is left alone.
    assert_eq!(report.dirs_removed, 0);
    assert_eq!(h.dir_at(lib.id, "a/b").id, ab.id);
}

#[tokio::test]
async fn stale_dirs_removed_at_present_depths() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/x/1.mkv", b"1");
    h.write_file("movies/y/2.mkv", b"2");
    h.index(lib.id, IndexMode::Quick).await;

    std::fs::remove_dir_all(h.media_root().join("movies/y")).unwrap();
    let report = h.index(lib.id, IndexMode::Quick).await;

    assert_eq!(report.videos_removed, 1);
    assert_eq!(report.dirs_removed, 1);
    let paths: Vec<String> = h.dirs(lib.id).into_iter().map(|d| d.library_path).collect();
    assert_eq!(paths, vec!["x".to_string()]);
}

#[tokio::test]
async fn moved_file_is_reinserted_and_relinked() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/old/film.avi", b"f");
    h.index(lib.id, IndexMode::Quick).await;
    let before = h.video_at(lib.id, "old/film.avi");

    std::fs::create_dir_all(h.media_root().join("movies/new")).unwrap();
    std::fs::rename(
        h.media_root().join("movies/old/film.avi"),
        h.media_root().join("movies/new/film.avi"),
    )
    .unwrap();
    let report = h.index(lib.id, IndexMode::Quick).await;

    assert_eq!(report.videos_removed, 1);
    assert_eq!(report.videos_added, 1);
    let after = h.video_at(lib.id, "new/film.avi");
    assert_ne!(after.id, before.id);
    assert_eq!(after.dir_id, Some(h.dir_at(lib.id, "new").id));
    assert_eq!(report.dirs_removed, 1);
    assert_eq!(report.dirs_added, 1);
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/a/b/c/deep.mkv", b"d");
    h.write_file("movies/top.mpeg", b"t");
    h.write_file("movies/a/UPPER.MKV", b"u");

    let first = h.index(lib.id, IndexMode::Quick).await;
    assert!(first.changed());
    let ids: Vec<_> = h.videos(lib.id).into_iter().map(|v| v.id).collect();
    assert_eq!(ids.len(), 3);

    let second = h.index(lib.id, IndexMode::Quick).await;
    assert!(!second.changed(), "unexpected changes: {second:?}");
    let again: Vec<_> = h.videos(lib.id).into_iter().map(|v| v.id).collect();
    assert_eq!(ids, again);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_videos_are_indexed() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/a/real.mkv", b"r");
    h.write_file("outside/target.mkv", b"t");
    let root = h.media_root();
    std::os::unix::fs::symlink(root.join("outside/target.mkv"), root.join("movies/a/linked.mkv"))
        .unwrap();
    // A cycle back to the library root must not stall the walk.
    std::os::unix::fs::symlink(root.join("movies"), root.join("movies/a/loop")).unwrap();

    let report = h.index(lib.id, IndexMode::Quick).await;
    assert_eq!(report.videos_added, 2);
    let a = h.dir_at(lib.id, "a");
    let linked = h.video_at(lib.id, "a/linked.mkv");
    assert_eq!(linked.dir_id, Some(a.id));
    assert_eq!(linked.title, "linked");
    assert_eq!(h.video_at(lib.id, "a/real.mkv").dir_id, Some(a.id));

    let second = h.index(lib.id, IndexMode::Quick).await;
    assert!(!second.changed(), "unexpected changes: {second:?}");

    // A dangling link counts as a missing file.
    h.remove_file("outside/target.mkv");
    let report = h.index(lib.id, IndexMode::Quick).await;
    assert_eq!(report.videos_removed, 1);
    let paths: Vec<String> = h.videos(lib.id).into_iter().map(|v| v.library_path).collect();
    assert_eq!(paths, vec!["a/real.mkv".to_string()]);
}

#[tokio::test]
async fn dir_depth_matches_parent_chain() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    for path in [
        "movies/a/b/c/d/1.mkv",
        "movies/a/b/2.mkv",
        "movies/e/f/3.mkv",
        "movies/g/4.mkv",
        "movies/5.mkv",
    ] {
        h.write_file(path, b"x");
    }
    h.index(lib.id, IndexMode::Quick).await;

    let dirs = h.dirs(lib.id);
    assert_eq!(dirs.len(), 7);
    let by_id: HashMap<_, _> = dirs.iter().map(|d| (d.id, d)).collect();
    for dir in &dirs {
        match dir.parent_dir_id {
            Some(parent) => {
                let parent = by_id[&parent];
                assert_eq!(dir.depth, parent.depth + 1);
                assert_eq!(dir.library_path, format!("{}/{}", parent.library_path, dir.name));
            }
            None => {
                assert_eq!(dir.depth, 0);
                assert_eq!(dir.library_path, dir.name);
            }
        }
    }

    let root_video = h.video_at(lib.id, "5.mkv");
    assert_eq!(root_video.dir_id, None);
}

#[tokio::test]
async fn missing_root_is_reported() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    std::fs::remove_dir(h.media_root().join("movies")).unwrap();

    let report = h.index(lib.id, IndexMode::Quick).await;
    assert!(report.root_missing);
    assert!(!report.changed());
    // Never started, so nothing is closed either.
    assert!(h.library(lib.id).last_index_completed.is_none());

    rh_db::queries::libraries::mark_index_started(&h.conn(), lib.id, &chrono::Utc::now().to_rfc3339())
        .unwrap();
    let report = h.index(lib.id, IndexMode::Quick).await;
    assert!(report.root_missing);
    assert!(!h.library(lib.id).is_indexing());
}

#[tokio::test]
async fn full_mode_records_durations() {
    let h = TestHarness::with_probe(FixedProbe::returning(5400.5));
    let lib = h.create_library("movies");
    h.write_file("movies/a.mkv", b"a");
    h.write_file("movies/b/c.mp4", b"c");

    let report = h.index(lib.id, IndexMode::Full).await;
    assert_eq!(report.videos_added, 2);
    assert_eq!(report.probe_failures, 0);
    assert_eq!(h.probe.calls(), 2);
    for video in h.videos(lib.id) {
        assert_eq!(video.duration_secs, Some(5400.5));
    }

    // Nothing left to probe.
    h.index(lib.id, IndexMode::Full).await;
    assert_eq!(h.probe.calls(), 2);
}

#[tokio::test]
async fn quick_mode_never_probes() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/a.mkv", b"a");

    h.index(lib.id, IndexMode::Quick).await;
    assert_eq!(h.probe.calls(), 0);
    assert_eq!(h.video_at(lib.id, "a.mkv").duration_secs, None);
}

#[tokio::test]
async fn probe_failure_still_inserts_video() {
    let h = TestHarness::with_probe(FixedProbe::failing());
    let lib = h.create_library("movies");
    h.write_file("movies/a.mkv", b"a");

    let report = h.index(lib.id, IndexMode::Full).await;
    assert_eq!(report.videos_added, 1);
    assert_eq!(report.probe_failures, 1);
    assert_eq!(h.video_at(lib.id, "a.mkv").duration_secs, None);
}

#[tokio::test]
async fn full_mode_backfills_missing_durations() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/a.mkv", b"a");
    h.index(lib.id, IndexMode::Quick).await;
    assert_eq!(h.video_at(lib.id, "a.mkv").duration_secs, None);

    let report = h.index(lib.id, IndexMode::Full).await;
    assert_eq!(report.videos_added, 0);
    assert_eq!(report.durations_set, 1);
    assert_eq!(h.video_at(lib.id, "a.mkv").duration_secs, Some(90.0));
}

#[tokio::test]
async fn cancelled_run_stops_before_inserting() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/a/1.mkv", b"1");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = h.ctx.indexer.run(lib.id, IndexMode::Quick, &cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.videos_added, 0);
    assert!(h.videos(lib.id).is_empty());
    assert!(!h.library(lib.id).is_indexing());

    // The next run picks up where this one stopped.
    let report = h.index(lib.id, IndexMode::Quick).await;
    assert_eq!(report.videos_added, 1);
}

#[tokio::test]
async fn libraries_are_isolated() {
    let h = TestHarness::new();
    let movies = h.create_library("movies");
    let shows = h.create_library("shows");
    h.write_file("movies/a/film.mkv", b"m");
    h.write_file("shows/a/episode.mkv", b"s");

    h.index(movies.id, IndexMode::Quick).await;
    assert_eq!(h.videos(movies.id).len(), 1);
    assert!(h.videos(shows.id).is_empty());

    h.index(shows.id, IndexMode::Quick).await;
    let movies_a = h.dir_at(movies.id, "a");
    let shows_a = h.dir_at(shows.id, "a");
    assert_ne!(movies_a.id, shows_a.id);
    assert_eq!(h.video_at(shows.id, "a/episode.mkv").dir_id, Some(shows_a.id));
}

#[tokio::test]
async fn scheduler_runs_queued_library() {
    let h = TestHarness::new();
    let lib = h.create_library("movies");
    h.write_file("movies/a.mkv", b"a");

    assert!(h.ctx.scheduler.enqueue(lib.id, IndexMode::Quick));
    tokio::time::timeout(Duration::from_secs(5), h.ctx.scheduler.wait_idle())
        .await
        .unwrap();

    assert_eq!(h.videos(lib.id).len(), 1);
    assert!(!h.library(lib.id).is_indexing());
}
