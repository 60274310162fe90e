//! # NOOR Canvas Hub (noor-hub)
//!
//! Real-time session hub: tracks live connections, groups them per session,
//! and fans out Q&A, annotation and lifecycle events over SSE.
//!
//! **Architecture:** stateless `Hub` facade over an injected connection
//! registry, broadcast dispatcher, durable store and authorizer.

pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod hub;
pub mod registry;
pub mod store;

pub use error::{HubError, Result};
pub use hub::{Hub, HubStats};
