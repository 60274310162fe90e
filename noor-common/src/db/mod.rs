//! Database schema and connection setup
//!
//! The hub's durable store runs on SQLite. This module only creates the
//! schema and pool; queries live with the store adapter in `noor-hub`.

pub mod init;

pub use init::{init_database, init_memory_database};
