//! Video file classification and MIME type lookup.
//!
//! The extension allow-list here is the single source of truth for what the
//! indexer treats as a video, so any future format check must go through
//! [`is_video_file`].

use std::path::Path;

/// Extensions (lowercase, without the dot) that are indexed as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "avi", "mp4", "mpeg"];

/// Return `true` when `path` has one of the [`VIDEO_EXTENSIONS`],
/// compared case-insensitively.
pub fn is_video_file(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
}

/// Guess the MIME type from a file name's extension.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        "webm" => "video/webm",
        "ts" => "video/mp2t",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_extensions() {
        for name in ["a.mkv", "b.avi", "c.mp4", "d.mpeg"] {
            assert!(is_video_file(name), "{name} should be a video");
        }
    }

    #[test]
    fn extension_is_case_insensitive() {
        assert!(is_video_file("/media/Movie.MKV"));
        assert!(is_video_file("clip.Mp4"));
    }

    #[test]
    fn rejects_other_files() {
        assert!(!is_video_file("notes.txt"));
        assert!(!is_video_file("movie.webm"));
        assert!(!is_video_file("mkv"));
        assert!(!is_video_file("archive.mkv.part"));
        assert!(!is_video_file(""));
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(guess_content_type("movie.mkv"), "video/x-matroska");
        assert_eq!(guess_content_type("movie.MP4"), "video/mp4");
        assert_eq!(guess_content_type("x.avi"), "video/x-msvideo");
        assert_eq!(guess_content_type("x.mpeg"), "video/mpeg");
        assert_eq!(guess_content_type("file.xyz"), "application/octet-stream");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }
}
