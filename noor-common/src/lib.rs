//! # NOOR Canvas Common Library
//!
//! Shared code for the NOOR Canvas real-time hub including:
//! - Error types
//! - Typed broadcast group names
//! - Outbound event types (HubEvent enum)
//! - Session, question and annotation models
//! - Configuration loading
//! - Database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod groups;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use events::HubEvent;
pub use groups::GroupKind;
