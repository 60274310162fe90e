//! HTTP transport
//!
//! Inbound operations are plain JSON POSTs; outbound events flow over one
//! SSE stream per connection.

pub mod error;
pub mod handlers;
pub mod server;
pub mod sse;

pub use error::{ApiError, ApiResult};
pub use server::{create_router, run, AppContext};

/// Header naming the caller's hub connection
pub const CONNECTION_HEADER: &str = "x-connection-id";
