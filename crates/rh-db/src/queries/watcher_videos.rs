//! Per-user watch progress.

use chrono::Utc;
use rh_core::{Error, Result, UserId, VideoId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::WatcherVideo;

const COLS: &str = "user_id, video_id, position_secs, updated_at";

/// Insert or update the playback position for a (user, video) pair.
pub fn upsert_progress(
    conn: &Connection,
    user_id: UserId,
    video_id: VideoId,
    position_secs: f64,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO watcher_videos (user_id, video_id, position_secs, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, video_id) DO UPDATE SET
            position_secs = excluded.position_secs,
            updated_at = excluded.updated_at",
        rusqlite::params![user_id.to_string(), video_id.to_string(), position_secs, now],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Get the progress row for a (user, video) pair.
pub fn get_progress(
    conn: &Connection,
    user_id: UserId,
    video_id: VideoId,
) -> Result<Option<WatcherVideo>> {
    let q = format!("SELECT {COLS} FROM watcher_videos WHERE user_id = ?1 AND video_id = ?2");
    conn.query_row(
        &q,
        rusqlite::params![user_id.to_string(), video_id.to_string()],
        WatcherVideo::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Number of users with progress on a video.
pub fn count_for_video(conn: &Connection, video_id: VideoId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM watcher_videos WHERE video_id = ?1",
        [video_id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}
