//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, registry, lifecycle produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (text or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metrics are recorded unconditionally; without an installed exporter
//!   the `metrics` facade discards them
//! - Log verbosity comes from `RUST_LOG`, with a default when unset

pub mod logging;
pub mod metrics;

pub use logging::LogFormat;
