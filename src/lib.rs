//! pipehub: an HTTP front-end that routes each request, by host, through a
//! chain of pluggable handlers called pipes.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ http::dispatch ──▶ pipe chain ──▶ upstream origin
//!                                            │                 │          or not-found
//!                                            │ lookup          │ built from
//!                                            ▼                 ▼
//!                                     routing::table     pipe::registry
//!                                            ▲                 ▲
//!                                            └──── config ─────┘
//!
//!     lifecycle: signals / async pipe errors ──▶ shutdown ──▶ drain ──▶ close pipes
//! ```
//!
//! Pipes are compiled in: a [`pipe::PipeCatalog`] maps `(identity, version)`
//! to a factory, and the config decides which ones are instantiated and how
//! they are chained.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipe;
pub mod routing;

pub use config::{load_config, parse_config, HubConfig};
pub use http::Dispatcher;
pub use lifecycle::{Hub, Shutdown, ShutdownReport, StartupError};
pub use pipe::{Pipe, PipeCatalog, PipeContext, PipeError};
