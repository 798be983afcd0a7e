//! rh-core: shared types, IDs, errors, configuration, and path rules.
//!
//! This crate is the foundational dependency for the other rh-* crates,
//! providing type-safe identifiers, a unified error type, the application
//! configuration, and the video-file classification used by the indexer
//! and the stream engine.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use media::{guess_content_type, is_video_file};
