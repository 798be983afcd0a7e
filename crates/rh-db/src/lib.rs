//! rh-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and query modules for libraries,
//! the indexed directory/video tree, stream tokens, and the auth contract.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
