//! Library CRUD and index bookkeeping.

use chrono::Utc;
use rh_core::{Error, LibraryId, Result};
use rusqlite::Connection;

use crate::models::Library;

const COLS: &str =
    "id, name, media_path, last_index_started, last_index_completed, created_at";

/// Create a new library. `media_path` must be unique.
pub fn create_library(conn: &Connection, name: &str, media_path: &str) -> Result<Library> {
    let id = LibraryId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO libraries (id, name, media_path, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), name, media_path, created_at],
    )
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            Error::Conflict(format!("Media path '{media_path}' is already a library"))
        } else {
            Error::database(e.to_string())
        }
    })?;

    Ok(Library {
        id,
        name: name.to_string(),
        media_path: media_path.to_string(),
        last_index_started: None,
        last_index_completed: None,
        created_at,
    })
}

/// Get a library by ID.
pub fn get_library(conn: &Connection, id: LibraryId) -> Result<Option<Library>> {
    let q = format!("SELECT {COLS} FROM libraries WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Library::from_row);
    match result {
        Ok(l) => Ok(Some(l)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a library by its media path.
pub fn get_library_by_media_path(conn: &Connection, media_path: &str) -> Result<Option<Library>> {
    let q = format!("SELECT {COLS} FROM libraries WHERE media_path = ?1");
    let result = conn.query_row(&q, [media_path], Library::from_row);
    match result {
        Ok(l) => Ok(Some(l)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all libraries ordered by name.
pub fn list_libraries(conn: &Connection) -> Result<Vec<Library>> {
    let q = format!("SELECT {COLS} FROM libraries ORDER BY name");
    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], Library::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Rename a library.
pub fn rename_library(conn: &Connection, id: LibraryId, name: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE libraries SET name = ?1 WHERE id = ?2",
            rusqlite::params![name, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete a library (cascades to dirs and videos).
pub fn delete_library(conn: &Connection, id: LibraryId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM libraries WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Record the start of an index run at `now` (RFC 3339).
pub fn mark_index_started(conn: &Connection, id: LibraryId, now: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE libraries SET last_index_started = ?1 WHERE id = ?2",
            rusqlite::params![now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Record the completion of an index run at `now` (RFC 3339).
pub fn mark_index_completed(conn: &Connection, id: LibraryId, now: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE libraries SET last_index_completed = ?1 WHERE id = ?2",
            rusqlite::params![now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Close every run left in flight by a previous process.
///
/// Returns the ids of the libraries that were reset.
pub fn reset_interrupted(conn: &Connection, now: &str) -> Result<Vec<LibraryId>> {
    let stuck: Vec<LibraryId> = list_libraries(conn)?
        .into_iter()
        .filter(Library::is_indexing)
        .map(|l| l.id)
        .collect();

    for id in &stuck {
        mark_index_completed(conn, *id, now)?;
    }
    Ok(stuck)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    #[test]
    fn crud() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let lib = create_library(&conn, "Movies", "movies").unwrap();
        assert_eq!(lib.name, "Movies");
        assert!(!lib.is_indexing());

        let found = get_library(&conn, lib.id).unwrap().unwrap();
        assert_eq!(found.media_path, "movies");

        let by_path = get_library_by_media_path(&conn, "movies").unwrap().unwrap();
        assert_eq!(by_path.id, lib.id);

        assert_eq!(list_libraries(&conn).unwrap().len(), 1);

        assert!(rename_library(&conn, lib.id, "Films").unwrap());
        let renamed = get_library(&conn, lib.id).unwrap().unwrap();
        assert_eq!(renamed.name, "Films");

        assert!(delete_library(&conn, lib.id).unwrap());
        assert!(get_library(&conn, lib.id).unwrap().is_none());
        assert!(!delete_library(&conn, lib.id).unwrap());
    }

    #[test]
    fn media_path_is_unique() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        create_library(&conn, "A", "shared").unwrap();
        let err = create_library(&conn, "B", "shared").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn index_timestamps_drive_indexing_flag() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let lib = create_library(&conn, "Shows", "shows").unwrap();

        mark_index_started(&conn, lib.id, "2024-05-01T10:00:00+00:00").unwrap();
        assert!(get_library(&conn, lib.id).unwrap().unwrap().is_indexing());

        mark_index_completed(&conn, lib.id, "2024-05-01T10:05:00+00:00").unwrap();
        assert!(!get_library(&conn, lib.id).unwrap().unwrap().is_indexing());
    }

    #[test]
    fn reset_interrupted_closes_stuck_runs() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let stuck = create_library(&conn, "Stuck", "stuck").unwrap();
        let idle = create_library(&conn, "Idle", "idle").unwrap();

        mark_index_started(&conn, stuck.id, "2024-05-01T10:00:00+00:00").unwrap();

        let reset = reset_interrupted(&conn, "2024-05-02T00:00:00+00:00").unwrap();
        assert_eq!(reset, vec![stuck.id]);
        assert!(!get_library(&conn, stuck.id).unwrap().unwrap().is_indexing());

        let idle = get_library(&conn, idle.id).unwrap().unwrap();
        assert!(idle.last_index_completed.is_none());
    }
}
