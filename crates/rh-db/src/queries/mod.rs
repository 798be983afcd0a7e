//! Database query modules.

pub mod auth;
pub mod devices;
pub mod dirs;
pub mod libraries;
pub mod stream_tokens;
pub mod users;
pub mod videos;
pub mod watcher_videos;
