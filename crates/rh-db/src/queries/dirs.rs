//! Directory tree operations. Rows here are owned by the indexer.

use std::collections::HashMap;

use rh_core::{DirId, Error, LibraryId, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::models::Dir;

const COLS: &str = "id, library_id, parent_dir_id, depth, name, library_path";

fn query_dirs(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Dir>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params, Dir::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Insert a dir row.
pub fn insert_dir(
    conn: &Connection,
    library_id: LibraryId,
    parent_dir_id: Option<DirId>,
    depth: i64,
    name: &str,
    library_path: &str,
) -> Result<Dir> {
    let id = DirId::new();
    conn.execute(
        "INSERT INTO dirs (id, library_id, parent_dir_id, depth, name, library_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            library_id.to_string(),
            parent_dir_id.map(|p| p.to_string()),
            depth,
            name,
            library_path,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Dir {
        id,
        library_id,
        parent_dir_id,
        depth,
        name: name.to_string(),
        library_path: library_path.to_string(),
    })
}

/// Get a dir by ID, scoped to its library.
pub fn get_dir(conn: &Connection, library_id: LibraryId, id: DirId) -> Result<Option<Dir>> {
    let q = format!("SELECT {COLS} FROM dirs WHERE id = ?1 AND library_id = ?2");
    conn.query_row(
        &q,
        rusqlite::params![id.to_string(), library_id.to_string()],
        Dir::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Get a dir by its library-relative path.
pub fn get_dir_by_path(
    conn: &Connection,
    library_id: LibraryId,
    library_path: &str,
) -> Result<Option<Dir>> {
    let q = format!("SELECT {COLS} FROM dirs WHERE library_id = ?1 AND library_path = ?2");
    conn.query_row(
        &q,
        rusqlite::params![library_id.to_string(), library_path],
        Dir::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// All dirs of a library, shallowest first.
pub fn list_dirs(conn: &Connection, library_id: LibraryId) -> Result<Vec<Dir>> {
    let q = format!("SELECT {COLS} FROM dirs WHERE library_id = ?1 ORDER BY depth, library_path");
    query_dirs(conn, &q, [library_id.to_string()])
}

/// Dirs of a library at exactly `depth`.
pub fn list_dirs_at_depth(conn: &Connection, library_id: LibraryId, depth: i64) -> Result<Vec<Dir>> {
    let q = format!("SELECT {COLS} FROM dirs WHERE library_id = ?1 AND depth = ?2");
    query_dirs(conn, &q, rusqlite::params![library_id.to_string(), depth])
}

/// Top-level dirs (no parent), sorted by name.
pub fn list_root_dirs(conn: &Connection, library_id: LibraryId) -> Result<Vec<Dir>> {
    let q = format!(
        "SELECT {COLS} FROM dirs WHERE library_id = ?1 AND parent_dir_id IS NULL ORDER BY name"
    );
    query_dirs(conn, &q, [library_id.to_string()])
}

/// Direct children of `parent`, sorted by name.
pub fn list_child_dirs(conn: &Connection, parent: DirId) -> Result<Vec<Dir>> {
    let q = format!("SELECT {COLS} FROM dirs WHERE parent_dir_id = ?1 ORDER BY name");
    query_dirs(conn, &q, [parent.to_string()])
}

/// Map of `library_path` to dir id for a whole library.
pub fn dir_ids_by_path(conn: &Connection, library_id: LibraryId) -> Result<HashMap<String, DirId>> {
    Ok(list_dirs(conn, library_id)?
        .into_iter()
        .map(|d| (d.library_path, d.id))
        .collect())
}

/// Delete dirs by id. Sub-dirs cascade; their videos are unlinked.
pub fn delete_dirs(conn: &Connection, ids: &[DirId]) -> Result<usize> {
    let mut stmt = conn
        .prepare("DELETE FROM dirs WHERE id = ?1")
        .map_err(|e| Error::database(e.to_string()))?;
    let mut total = 0;
    for id in ids {
        total += stmt
            .execute([id.to_string()])
            .map_err(|e| Error::database(e.to_string()))?;
    }
    Ok(total)
}
