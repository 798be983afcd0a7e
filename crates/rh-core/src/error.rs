//! The error type every reelhouse crate returns.
//!
//! Each variant maps to one status code through [`Error::http_status`], so a
//! handler can return any of them with `?`. Stream key failures split in two:
//! a key that does not parse or verify is [`Error::Validation`], while a
//! well-formed key with no live token behind it is [`Error::NotFound`].

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown library, dir, or video ID, a stream key whose token has
    /// expired or been completed, or a video whose file left the disk.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Row kind as shown to clients: "library", "dir", "video", "stream", "file".
        entity: String,
        id: String,
    },

    /// Missing or expired bearer token while auth is enabled.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed stream key, bad path segment ID, a media_path outside the
    /// media root, or an unreadable config file.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate media_path or username, or an index request for a library
    /// that is already indexing.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {source}")]
    Database {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// ffprobe failed or reported no usable duration.
    /// The indexer counts these and keeps going.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Bind failures, a panicked walk task, and other bugs.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code the API answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Probe(_) => 422,
            Error::Internal(_) => 500,
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Wrap a rusqlite or r2d2 failure.
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_stream_key_is_not_found() {
        let err = Error::not_found("stream", "0f1e2d3c4b5a69788796a5b4c3d2e1f0.abcd");
        assert_eq!(
            err.to_string(),
            "stream not found: 0f1e2d3c4b5a69788796a5b4c3d2e1f0.abcd"
        );
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn vanished_file_names_its_path() {
        let path = std::path::Path::new("/media/movies/a/film.mkv");
        let err = Error::not_found("file", path.display());
        assert_eq!(err.to_string(), "file not found: /media/movies/a/film.mkv");
    }

    #[test]
    fn malformed_stream_key_is_bad_request() {
        let err = Error::Validation("malformed stream key".into());
        assert_eq!(err.to_string(), "Validation error: malformed stream key");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn indexing_twice_conflicts() {
        let err = Error::Conflict("library 42 is already being indexed".into());
        assert_eq!(err.http_status(), 409);
        assert!(err.to_string().starts_with("Conflict: "));
    }

    #[test]
    fn missing_bearer_token_is_401() {
        assert_eq!(Error::Unauthorized("authentication required".into()).http_status(), 401);
    }

    #[test]
    fn ffprobe_timeout_is_unprocessable() {
        let err = Error::Probe("ffprobe timed out after 30s".into());
        assert_eq!(err.to_string(), "Probe error: ffprobe timed out after 30s");
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn unreadable_media_root_is_server_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "media root");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn database_source_is_kept() {
        let err = Error::database("database is locked");
        assert_eq!(err.to_string(), "Database error: database is locked");
        assert_eq!(err.http_status(), 500);
        assert!(std::error::Error::source(&err).is_some());
    }
}
