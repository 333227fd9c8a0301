//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (Host header / authority)
//!     → matcher.rs (normalize host, candidate keys)
//!     → table.rs (route lookup)
//!     → Return: matched Route or None
//!
//! Table Compilation (at startup):
//!     HubConfig
//!     → validate (block counts, aliases, endpoints)
//!     → compile host bindings into routes
//!     → Freeze as immutable RoutingTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same host always matches same route
//! - Explicit no-match; the dispatcher decides the fallback

pub mod matcher;
pub mod table;

pub use table::{Origin, Route, RoutingTable};
