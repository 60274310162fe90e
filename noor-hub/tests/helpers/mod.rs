//! Test helper modules for noor-hub integration tests
//!
//! - TestHub: hub over an in-memory or file-backed SQLite store
//! - FlakyStore: store wrapper that injects conflicts and failures

#![allow(dead_code)]

pub mod error_injection;
pub mod test_hub;

pub use error_injection::FlakyStore;
pub use test_hub::{drain, TestHub};
