//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & generic decode into toml::Table)
//!     → normalize.rs (raw tree → HubConfig)
//!     → validation.rs (semantic checks, first violation wins)
//!     → routing::RoutingTable (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; changes require a restart
//! - Unknown sections, fields and pipe attributes are errors
//! - Normalization separates shape errors from semantic checks

pub mod duration;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod schema;
pub mod validation;

pub use error::ConfigError;
pub use loader::{load_config, parse_config};
pub use normalize::normalize;
pub use schema::{
    ActionBlock, HandlerRef, HostBinding, HttpBlock, HubConfig, PipeDeclaration, ServerBlock,
    ServerSettings,
};
pub use validation::{validate_config, ValidationError};
