//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     HubConfig → RoutingTable → PipeRegistry → Dispatcher → bind → serve
//!
//! Shutdown (shutdown.rs):
//!     trigger (signal | async pipe error | server exit)
//!     → stop accepting → drain until deadline → close pipes → Closed
//!
//! Drain (in_flight.rs):
//!     each dispatched request is counted; past the deadline the rest are abandoned
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then pipes, then listeners
//! - Exactly one trigger takes effect
//! - Shutdown has a deadline: closes still running past it are abandoned

pub mod in_flight;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use in_flight::{InFlight, InFlightGuard};
pub use shutdown::{AsyncErrorReporter, Shutdown, ShutdownReason, ShutdownState};
pub use startup::{Hub, ShutdownReport, StartupError};
