//! Configuration schema definitions.
//!
//! `HubConfig` is the typed output of normalization. It still carries block
//! multiplicity (`servers`, `http`, `action` are lists) so that validation can
//! reject duplicated blocks instead of silently picking the first one.
//! `ServerSettings` is the validated, collapsed view used at runtime.

use std::time::Duration;

use serde::Deserialize;

/// Port used when no `server.http.port` is configured.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Origin value meaning "no upstream": the chain terminates in the not-found handler.
pub const WILDCARD_ORIGIN: &str = "*";

/// Root configuration for the hub.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HubConfig {
    /// Host bindings, in declaration order.
    pub hosts: Vec<HostBinding>,

    /// Pipe declarations, in declaration order.
    pub pipes: Vec<PipeDeclaration>,

    /// Server blocks. Valid configs have at most one.
    pub servers: Vec<ServerBlock>,
}

/// A pipe to instantiate, referenced elsewhere by its alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeDeclaration {
    /// Module identity, e.g. an import path such as `github.com/pipehub/auth`.
    pub identity: String,
    pub version: String,
    pub alias: String,
}

/// Binds a request host to a chain of pipe aliases.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostBinding {
    /// Host the request is addressed to (matched case-insensitively).
    pub endpoint: String,

    /// Upstream the chain forwards to, or `*` for none.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Alias, or list of aliases, forming the chain. First is outermost.
    pub handler: HandlerRef,
}

impl HostBinding {
    /// Aliases of the chain in invocation order.
    pub fn chain(&self) -> Vec<&str> {
        match &self.handler {
            HandlerRef::Single(alias) => vec![alias.as_str()],
            HandlerRef::Chain(aliases) => aliases.iter().map(String::as_str).collect(),
        }
    }
}

fn default_origin() -> String {
    WILDCARD_ORIGIN.to_string()
}

/// The `handler` field of a host binding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HandlerRef {
    Single(String),
    Chain(Vec<String>),
}

/// A raw `server` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerBlock {
    /// Drain deadline, e.g. `"10s"`. Parsed during validation.
    #[serde(rename = "graceful-shutdown", default)]
    pub graceful_shutdown: Option<String>,

    #[serde(default)]
    pub http: Vec<HttpBlock>,

    #[serde(default)]
    pub action: Vec<ActionBlock>,
}

/// A raw `server.http` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpBlock {
    #[serde(default)]
    pub port: Option<u16>,
}

/// A raw `server.action` block naming fallback pipes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionBlock {
    #[serde(rename = "not-found", default)]
    pub not_found: Option<String>,

    #[serde(default)]
    pub panic: Option<String>,
}

/// Validated server settings. Absent fields fall back to built-in behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSettings {
    /// Bound on the drain-then-close sequence. `None` shuts down immediately.
    pub graceful_shutdown: Option<Duration>,
    pub http_port: Option<u16>,
    /// Alias of the pipe answering unmatched hosts.
    pub not_found: Option<String>,
    /// Alias of the pipe answering failed chains.
    pub panic: Option<String>,
}

impl ServerSettings {
    /// Port to listen on.
    pub fn port(&self) -> u16 {
        self.http_port.unwrap_or(DEFAULT_HTTP_PORT)
    }
}

impl ActionBlock {
    pub(crate) fn not_found_alias(&self) -> Option<&str> {
        non_empty(self.not_found.as_deref())
    }

    pub(crate) fn panic_alias(&self) -> Option<&str> {
        non_empty(self.panic.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
