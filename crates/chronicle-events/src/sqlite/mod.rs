//! `SQLite` storage backend.
//!
//! - [`connection`]: r2d2 pool with per-connection pragmas
//! - [`migrations`]: embedded, versioned schema migrations
//! - [`SqliteStorage`]: the [`EventStorage`](crate::EventStorage) implementation

pub mod connection;
pub mod migrations;
mod storage;

pub use connection::{ConnectionConfig, ConnectionPool};
pub use storage::SqliteStorage;
