//! Stream token bookkeeping.

use chrono::Utc;
use rh_core::{DeviceId, Error, Result, StreamTokenId, UserId, VideoId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::StreamToken;

const COLS: &str = "id, user_id, device_id, video_id, started_at, ended_at";

/// Open a stream token for (user, device, video) starting now.
pub fn create_stream_token(
    conn: &Connection,
    user_id: UserId,
    device_id: DeviceId,
    video_id: VideoId,
) -> Result<StreamToken> {
    let id = StreamTokenId::new();
    let started_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO stream_tokens (id, user_id, device_id, video_id, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            id.to_string(),
            user_id.to_string(),
            device_id.to_string(),
            video_id.to_string(),
            started_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(StreamToken {
        id,
        user_id,
        device_id,
        video_id,
        started_at,
        ended_at: None,
    })
}

/// Get a stream token by ID.
pub fn get_stream_token(conn: &Connection, id: StreamTokenId) -> Result<Option<StreamToken>> {
    let q = format!("SELECT {COLS} FROM stream_tokens WHERE id = ?1");
    conn.query_row(&q, [id.to_string()], StreamToken::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Set `ended_at` on an open token. Returns `false` if the token does not
/// exist or was already ended.
pub fn mark_stream_ended(conn: &Connection, id: StreamTokenId, now: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE stream_tokens SET ended_at = ?1 WHERE id = ?2 AND ended_at IS NULL",
            rusqlite::params![now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Number of tokens ever issued for a video.
pub fn count_for_video(conn: &Connection, video_id: VideoId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM stream_tokens WHERE video_id = ?1",
        [video_id.to_string()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}
