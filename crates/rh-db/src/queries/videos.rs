//! Video operations.

use chrono::Utc;
use rh_core::{DirId, Error, LibraryId, Result, VideoId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::Video;

const COLS: &str = "id, library_id, dir_id, title, library_path, duration_secs, created_at";

fn query_videos(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Video>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params, Video::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Insert a newly discovered video. It starts without a dir.
pub fn insert_video(
    conn: &Connection,
    library_id: LibraryId,
    title: &str,
    library_path: &str,
    duration_secs: Option<f64>,
) -> Result<Video> {
    let id = VideoId::new();
    let created_at = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO videos (id, library_id, dir_id, title, library_path, duration_secs, created_at)
         VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.to_string(),
            library_id.to_string(),
            title,
            library_path,
            duration_secs,
            created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Video {
        id,
        library_id,
        dir_id: None,
        title: title.to_string(),
        library_path: library_path.to_string(),
        duration_secs,
        created_at,
    })
}

/// Get a video by ID.
pub fn get_video(conn: &Connection, id: VideoId) -> Result<Option<Video>> {
    let q = format!("SELECT {COLS} FROM videos WHERE id = ?1");
    conn.query_row(&q, [id.to_string()], Video::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// All videos of a library.
pub fn list_videos(conn: &Connection, library_id: LibraryId) -> Result<Vec<Video>> {
    let q = format!("SELECT {COLS} FROM videos WHERE library_id = ?1 ORDER BY library_path");
    query_videos(conn, &q, [library_id.to_string()])
}

/// Videos of a library that have no dir assigned.
pub fn list_unlinked_videos(conn: &Connection, library_id: LibraryId) -> Result<Vec<Video>> {
    let q = format!("SELECT {COLS} FROM videos WHERE library_id = ?1 AND dir_id IS NULL");
    query_videos(conn, &q, [library_id.to_string()])
}

/// Videos directly inside `dir_id`, sorted by title.
pub fn list_videos_in_dir(conn: &Connection, dir_id: DirId) -> Result<Vec<Video>> {
    let q = format!("SELECT {COLS} FROM videos WHERE dir_id = ?1 ORDER BY title");
    query_videos(conn, &q, [dir_id.to_string()])
}

/// Videos at the library root (no directory component), sorted by title.
pub fn list_root_videos(conn: &Connection, library_id: LibraryId) -> Result<Vec<Video>> {
    let q = format!(
        "SELECT {COLS} FROM videos
         WHERE library_id = ?1 AND dir_id IS NULL AND instr(library_path, '/') = 0
         ORDER BY title"
    );
    query_videos(conn, &q, [library_id.to_string()])
}

/// Assign (or clear) the dir of a video.
pub fn set_video_dir(conn: &Connection, id: VideoId, dir_id: Option<DirId>) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE videos SET dir_id = ?1 WHERE id = ?2",
            rusqlite::params![dir_id.map(|d| d.to_string()), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Set the probed duration of a video.
pub fn set_video_duration(conn: &Connection, id: VideoId, duration_secs: Option<f64>) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE videos SET duration_secs = ?1 WHERE id = ?2",
            rusqlite::params![duration_secs, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete videos by id. Stream tokens and watcher rows cascade.
///
/// Run inside a transaction to make the batch atomic.
pub fn delete_videos(conn: &Connection, ids: &[VideoId]) -> Result<usize> {
    let mut stmt = conn
        .prepare("DELETE FROM videos WHERE id = ?1")
        .map_err(|e| Error::database(e.to_string()))?;
    let mut total = 0;
    for id in ids {
        total += stmt
            .execute([id.to_string()])
            .map_err(|e| Error::database(e.to_string()))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::{dirs, libraries};

    #[test]
    fn insert_and_list() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let lib = libraries::create_library(&conn, "L", "l").unwrap();

        let v = insert_video(&conn, lib.id, "video1", "a/b/video1.mkv", Some(90.5)).unwrap();
        insert_video(&conn, lib.id, "root", "root.mp4", None).unwrap();

        let found = get_video(&conn, v.id).unwrap().unwrap();
        assert_eq!(found.duration_secs, Some(90.5));
        assert_eq!(found.dir_id, None);

        assert_eq!(list_videos(&conn, lib.id).unwrap().len(), 2);
        assert_eq!(list_unlinked_videos(&conn, lib.id).unwrap().len(), 2);

        let roots = list_root_videos(&conn, lib.id).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].title, "root");
    }

    #[test]
    fn path_is_unique_per_library() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = libraries::create_library(&conn, "A", "a").unwrap();
        let b = libraries::create_library(&conn, "B", "b").unwrap();

        insert_video(&conn, a.id, "v", "v.mkv", None).unwrap();
        insert_video(&conn, b.id, "v", "v.mkv", None).unwrap();
        assert!(insert_video(&conn, a.id, "v", "v.mkv", None).is_err());
    }

    #[test]
    fn link_and_delete() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let lib = libraries::create_library(&conn, "L", "l").unwrap();
        let d = dirs::insert_dir(&conn, lib.id, None, 0, "a", "a").unwrap();

        let v = insert_video(&conn, lib.id, "x", "a/x.avi", None).unwrap();
        assert!(set_video_dir(&conn, v.id, Some(d.id)).unwrap());
        assert!(set_video_duration(&conn, v.id, Some(12.0)).unwrap());

        let in_dir = list_videos_in_dir(&conn, d.id).unwrap();
        assert_eq!(in_dir.len(), 1);
        assert_eq!(in_dir[0].duration_secs, Some(12.0));
        assert!(list_unlinked_videos(&conn, lib.id).unwrap().is_empty());

        assert_eq!(delete_videos(&conn, &[v.id, VideoId::new()]).unwrap(), 1);
        assert!(get_video(&conn, v.id).unwrap().is_none());
    }

    #[test]
    fn deleting_library_cascades() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let lib = libraries::create_library(&conn, "L", "l").unwrap();
        let d = dirs::insert_dir(&conn, lib.id, None, 0, "a", "a").unwrap();
        let v = insert_video(&conn, lib.id, "x", "a/x.avi", None).unwrap();
        set_video_dir(&conn, v.id, Some(d.id)).unwrap();

        libraries::delete_library(&conn, lib.id).unwrap();
        assert!(get_video(&conn, v.id).unwrap().is_none());
        assert!(dirs::list_dirs(&conn, lib.id).unwrap().is_empty());
    }
}
