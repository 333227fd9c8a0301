//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, refuses requests while draining)
//!     → dispatch.rs (host lookup, chain invocation, fallbacks)
//!     → pipe chain
//!     → upstream.rs (forward to origin) | not-found fallback
//!     → response.rs (built-in error bodies)
//! ```

pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;
pub mod upstream;

pub use dispatch::{DispatchError, Dispatcher};
pub use request::{DispatchFailure, RequestIdExt, RouteInfo, X_REQUEST_ID};
pub use server::HttpServer;
