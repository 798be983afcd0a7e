//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. Column order in `from_row` matches the `COLS` constant
//! of the corresponding query module.

use chrono::{DateTime, FixedOffset};
use rh_core::{DeviceId, DirId, LibraryId, SessionId, StreamTokenId, UserId, VideoId};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(T::from(uuid))
}

fn parse_opt_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => {
            let uuid = Uuid::parse_str(&v).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok(Some(T::from(uuid)))
        }
        None => Ok(None),
    }
}

fn parse_ts(s: Option<&str>) -> Option<DateTime<FixedOffset>> {
    s.and_then(|v| DateTime::parse_from_rfc3339(v).ok())
}

// ---------------------------------------------------------------------------
// User / Device / AuthToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl User {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            is_admin: row.get::<_, i32>(3)? != 0,
            created_at: row.get(4)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: String,
}

impl Device {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthToken {
    pub id: SessionId,
    pub user_id: UserId,
    pub device_id: Option<DeviceId>,
    pub token: String,
    pub expires_at: String,
}

impl AuthToken {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            device_id: parse_opt_id(row, 2)?,
            token: row.get(3)?,
            expires_at: row.get(4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    /// Directory of the library, relative to the configured media root.
    pub media_path: String,
    pub last_index_started: Option<String>,
    pub last_index_completed: Option<String>,
    pub created_at: String,
}

impl Library {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            media_path: row.get(2)?,
            last_index_started: row.get(3)?,
            last_index_completed: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    /// A run is in flight when it started after the last completion.
    ///
    /// Never started, or started and completed at the same instant, both
    /// count as idle. Started with no completion yet counts as indexing.
    pub fn is_indexing(&self) -> bool {
        let started = parse_ts(self.last_index_started.as_deref());
        let completed = parse_ts(self.last_index_completed.as_deref());
        match (started, completed) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(s), Some(c)) => s > c,
        }
    }
}

// ---------------------------------------------------------------------------
// Dir
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Dir {
    pub id: DirId,
    pub library_id: LibraryId,
    pub parent_dir_id: Option<DirId>,
    pub depth: i64,
    pub name: String,
    pub library_path: String,
}

impl Dir {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            library_id: parse_id(row, 1)?,
            parent_dir_id: parse_opt_id(row, 2)?,
            depth: row.get(3)?,
            name: row.get(4)?,
            library_path: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    pub id: VideoId,
    pub library_id: LibraryId,
    pub dir_id: Option<DirId>,
    pub title: String,
    /// Path relative to the library root, segments joined with `/`.
    pub library_path: String,
    pub duration_secs: Option<f64>,
    pub created_at: String,
}

impl Video {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            library_id: parse_id(row, 1)?,
            dir_id: parse_opt_id(row, 2)?,
            title: row.get(3)?,
            library_path: row.get(4)?,
            duration_secs: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    /// Directory component of `library_path`, or `None` at the library root.
    pub fn dir_path(&self) -> Option<&str> {
        self.library_path.rsplit_once('/').map(|(dir, _)| dir)
    }
}

// ---------------------------------------------------------------------------
// StreamToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StreamToken {
    pub id: StreamTokenId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub video_id: VideoId,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl StreamToken {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            device_id: parse_id(row, 2)?,
            video_id: parse_id(row, 3)?,
            started_at: row.get(4)?,
            ended_at: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// WatcherVideo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WatcherVideo {
    pub user_id: UserId,
    pub video_id: VideoId,
    pub position_secs: f64,
    pub updated_at: String,
}

impl WatcherVideo {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: parse_id(row, 0)?,
            video_id: parse_id(row, 1)?,
            position_secs: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}
