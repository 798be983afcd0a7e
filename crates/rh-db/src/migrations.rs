//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use rh_core::{Error, Result};
use rusqlite::Connection;

/// V1: users, their devices, and bearer tokens.
const V1_USERS: &str = r#"
CREATE TABLE users (
    id            TEXT PRIMARY KEY,
    username      TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    is_admin      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE TABLE user_devices (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE auth_tokens (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    device_id  TEXT REFERENCES user_devices(id) ON DELETE CASCADE,
    token      TEXT UNIQUE NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX idx_user_devices_user ON user_devices(user_id);
"#;

/// V2: libraries and the indexed dir/video tree.
const V2_LIBRARY_TREE: &str = r#"
CREATE TABLE libraries (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    media_path           TEXT NOT NULL UNIQUE,
    last_index_started   TEXT,
    last_index_completed TEXT,
    created_at           TEXT NOT NULL
);

CREATE TABLE dirs (
    id            TEXT PRIMARY KEY,
    library_id    TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
    parent_dir_id TEXT REFERENCES dirs(id) ON DELETE CASCADE,
    depth         INTEGER NOT NULL,
    name          TEXT NOT NULL,
    library_path  TEXT NOT NULL,
    UNIQUE (library_id, library_path)
);

CREATE TABLE videos (
    id            TEXT PRIMARY KEY,
    library_id    TEXT NOT NULL REFERENCES libraries(id) ON DELETE CASCADE,
    dir_id        TEXT REFERENCES dirs(id) ON DELETE SET NULL,
    title         TEXT NOT NULL,
    library_path  TEXT NOT NULL,
    duration_secs REAL,
    created_at    TEXT NOT NULL,
    UNIQUE (library_id, library_path)
);

CREATE INDEX idx_dirs_library_depth ON dirs(library_id, depth);
CREATE INDEX idx_dirs_parent        ON dirs(parent_dir_id);
CREATE INDEX idx_videos_dir         ON videos(dir_id);
"#;

/// V3: stream tokens and per-user watch progress.
const V3_STREAMING: &str = r#"
CREATE TABLE stream_tokens (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    device_id  TEXT NOT NULL REFERENCES user_devices(id) ON DELETE CASCADE,
    video_id   TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    started_at TEXT NOT NULL,
    ended_at   TEXT
);

CREATE TABLE watcher_videos (
    user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    video_id      TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
    position_secs REAL NOT NULL DEFAULT 0.0,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (user_id, video_id)
);

CREATE INDEX idx_stream_tokens_video  ON stream_tokens(video_id);
CREATE INDEX idx_watcher_videos_video ON watcher_videos(video_id);
"#;

/// V4: seed the anonymous user and device used when auth is disabled.
///
/// The auth middleware hands out these well-known ids for unauthenticated
/// requests; without matching rows, stream token inserts would violate the
/// FK constraints.
const V4_ANONYMOUS: &str = r#"
INSERT OR IGNORE INTO users (id, username, password_hash, is_admin, created_at)
VALUES ('00000000-0000-0000-0000-000000000000', 'anonymous', '!disabled', 1, datetime('now'));

INSERT OR IGNORE INTO user_devices (id, user_id, name, created_at)
VALUES ('00000000-0000-0000-0000-000000000000', '00000000-0000-0000-0000-000000000000', 'anonymous', datetime('now'));
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, V1_USERS),
    (2, V2_LIBRARY_TREE),
    (3, V3_STREAMING),
    (4, V4_ANONYMOUS),
];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
