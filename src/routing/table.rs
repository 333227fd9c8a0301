//! Routing table construction and lookup.
//!
//! # Responsibilities
//! - Validate a normalized config (see `config::validation`)
//! - Compile host bindings into routes keyed by normalized endpoint
//! - Look up the route for a request host
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) host lookup via HashMap
//! - Routes reference pipes by alias; instances are bound later by the dispatcher

use std::collections::HashMap;

use axum::http::Uri;

use crate::config::schema::{HubConfig, ServerSettings, WILDCARD_ORIGIN};
use crate::config::validation::{validate_config, ValidationError};
use crate::routing::matcher::{candidate_keys, normalize_host};

/// Where a chain sends requests that pass through every pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// No upstream; the chain ends in the not-found handler.
    Wildcard,
    /// Forward to this `http://` base URI.
    Upstream(Uri),
}

impl Origin {
    fn parse(endpoint: &str, raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() || raw == WILDCARD_ORIGIN {
            return Ok(Origin::Wildcard);
        }
        let invalid = |reason: &str| ValidationError::InvalidOrigin {
            endpoint: endpoint.to_string(),
            origin: raw.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = raw.parse().map_err(|_| invalid("not a valid URI"))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(_) => return Err(invalid("only http origins are supported")),
            None => return Err(invalid("origin must be an absolute URI")),
        }
        if uri.authority().is_none() {
            return Err(invalid("origin has no host"));
        }
        Ok(Origin::Upstream(uri))
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Wildcard => f.write_str(WILDCARD_ORIGIN),
            Origin::Upstream(uri) => write!(f, "{uri}"),
        }
    }
}

/// A compiled host binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Endpoint as written in the config.
    pub endpoint: String,
    pub origin: Origin,
    /// Pipe aliases, outermost first.
    pub chain: Vec<String>,
}

/// Immutable mapping from request host to route, plus server settings.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: HashMap<String, Route>,
    settings: ServerSettings,
}

impl RoutingTable {
    /// Validate `config` and compile its host bindings.
    pub fn build(config: &HubConfig) -> Result<Self, ValidationError> {
        let settings = validate_config(config)?;

        let mut routes = HashMap::with_capacity(config.hosts.len());
        for host in &config.hosts {
            let route = Route {
                endpoint: host.endpoint.clone(),
                origin: Origin::parse(&host.endpoint, &host.origin)?,
                chain: host.chain().into_iter().map(str::to_string).collect(),
            };
            routes.insert(normalize_host(&host.endpoint), route);
        }

        tracing::debug!(
            routes = routes.len(),
            not_found = ?settings.not_found,
            panic = ?settings.panic,
            "Routing table built"
        );

        Ok(Self { routes, settings })
    }

    /// Find the route for a request host.
    pub fn lookup(&self, host: &str) -> Option<&Route> {
        candidate_keys(host)
            .iter()
            .find_map(|key| self.routes.get(key))
    }

    /// Iterate over all routes (unordered).
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}
