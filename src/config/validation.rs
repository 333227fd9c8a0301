//! Configuration validation.
//!
//! # Responsibilities
//! - Enforce block multiplicity (one `server`, one `http`, one `action`)
//! - Check referential integrity (every referenced alias is declared)
//! - Reject duplicate aliases, empty chains and duplicate endpoints
//! - Parse values that only make sense once (durations)
//!
//! # Design Decisions
//! - Fail fast: the first violation wins, in a fixed order
//! - Validation is a pure function over `HubConfig`
//! - Runs before any pipe is instantiated

use std::collections::HashSet;

use thiserror::Error;

use crate::config::duration::parse_duration;
use crate::config::schema::{HubConfig, ServerSettings};

/// A semantic configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("more than one 'server' block found ({0}), only one is allowed")]
    MultipleServerBlocks(usize),

    #[error("more than one 'server.http' block found ({0}), only one is allowed")]
    MultipleHttpBlocks(usize),

    #[error("more than one 'server.action' block found ({0}), only one is allowed")]
    MultipleActionBlocks(usize),

    #[error("{referenced_by} references unknown pipe alias '{alias}'")]
    UnknownAlias { alias: String, referenced_by: String },

    #[error("pipe alias '{0}' is declared more than once")]
    DuplicateAlias(String),

    #[error("host binding #{0} has an empty endpoint")]
    EmptyEndpoint(usize),

    #[error("host '{0}' has an empty handler chain")]
    EmptyChain(String),

    #[error("host '{0}' is bound more than once")]
    DuplicateEndpoint(String),

    #[error("host '{endpoint}' has invalid origin '{origin}': {reason}")]
    InvalidOrigin {
        endpoint: String,
        origin: String,
        reason: String,
    },

    #[error("invalid 'server.graceful-shutdown' value '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },
}

/// Validate a normalized config and collapse its server block into settings.
pub fn validate_config(config: &HubConfig) -> Result<ServerSettings, ValidationError> {
    // (1) and (2): block multiplicity
    if config.servers.len() > 1 {
        return Err(ValidationError::MultipleServerBlocks(config.servers.len()));
    }
    let server = config.servers.first();
    if let Some(server) = server {
        if server.http.len() > 1 {
            return Err(ValidationError::MultipleHttpBlocks(server.http.len()));
        }
        if server.action.len() > 1 {
            return Err(ValidationError::MultipleActionBlocks(server.action.len()));
        }
    }
    let action = server.and_then(|s| s.action.first());

    // (3) references
    let declared: HashSet<&str> = config.pipes.iter().map(|p| p.alias.as_str()).collect();
    for host in &config.hosts {
        for alias in host.chain() {
            if !declared.contains(alias) {
                return Err(ValidationError::UnknownAlias {
                    alias: alias.to_string(),
                    referenced_by: format!("host '{}'", host.endpoint),
                });
            }
        }
    }
    if let Some(action) = action {
        let fallbacks = [
            ("server.action.not-found", action.not_found_alias()),
            ("server.action.panic", action.panic_alias()),
        ];
        for (field, alias) in fallbacks {
            if let Some(alias) = alias {
                if !declared.contains(alias) {
                    return Err(ValidationError::UnknownAlias {
                        alias: alias.to_string(),
                        referenced_by: field.to_string(),
                    });
                }
            }
        }
    }

    // (4) alias uniqueness
    if declared.len() != config.pipes.len() {
        let mut seen = HashSet::new();
        if let Some(dup) = config.pipes.iter().find(|p| !seen.insert(p.alias.as_str())) {
            return Err(ValidationError::DuplicateAlias(dup.alias.clone()));
        }
    }

    // Host bindings
    let mut endpoints = HashSet::new();
    for (index, host) in config.hosts.iter().enumerate() {
        if host.endpoint.trim().is_empty() {
            return Err(ValidationError::EmptyEndpoint(index));
        }
        if host.chain().is_empty() {
            return Err(ValidationError::EmptyChain(host.endpoint.clone()));
        }
        if !endpoints.insert(crate::routing::matcher::normalize_host(&host.endpoint)) {
            return Err(ValidationError::DuplicateEndpoint(host.endpoint.clone()));
        }
    }

    let graceful_shutdown = match server.and_then(|s| s.graceful_shutdown.as_deref()) {
        Some(raw) if !raw.trim().is_empty() => {
            Some(parse_duration(raw).map_err(|reason| ValidationError::InvalidDuration {
                value: raw.to_string(),
                reason,
            })?)
        }
        _ => None,
    };

    Ok(ServerSettings {
        graceful_shutdown,
        http_port: server.and_then(|s| s.http.first()).and_then(|h| h.port),
        not_found: action.and_then(|a| a.not_found_alias()).map(str::to_string),
        panic: action.and_then(|a| a.panic_alias()).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        ActionBlock, HandlerRef, HostBinding, HttpBlock, PipeDeclaration, ServerBlock,
    };
    use std::time::Duration;

    fn pipe(alias: &str) -> PipeDeclaration {
        PipeDeclaration {
            identity: format!("pipes/{alias}"),
            version: "v1.0.0".into(),
            alias: alias.into(),
        }
    }

    fn host(endpoint: &str, alias: &str) -> HostBinding {
        HostBinding {
            endpoint: endpoint.into(),
            origin: "*".into(),
            handler: HandlerRef::Single(alias.into()),
        }
    }

    #[test]
    fn test_valid_config_settings() {
        let config = HubConfig {
            hosts: vec![host("a.example.com", "auth")],
            pipes: vec![pipe("auth"), pipe("nf")],
            servers: vec![ServerBlock {
                graceful_shutdown: Some("3s".into()),
                http: vec![HttpBlock { port: Some(9000) }],
                action: vec![ActionBlock {
                    not_found: Some("nf".into()),
                    panic: None,
                }],
            }],
        };
        let settings = validate_config(&config).unwrap();
        assert_eq!(settings.graceful_shutdown, Some(Duration::from_secs(3)));
        assert_eq!(settings.port(), 9000);
        assert_eq!(settings.not_found.as_deref(), Some("nf"));
        assert_eq!(settings.panic, None);
    }

    #[test]
    fn test_server_block_count_checked_first() {
        let config = HubConfig {
            // Dangling alias would also fail, but multiplicity is checked first.
            hosts: vec![host("a", "missing")],
            pipes: vec![],
            servers: vec![ServerBlock::default(), ServerBlock::default()],
        };
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::MultipleServerBlocks(2))
        );
    }

    #[test]
    fn test_nested_block_counts() {
        let mut config = HubConfig {
            servers: vec![ServerBlock {
                http: vec![HttpBlock::default(), HttpBlock::default()],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::MultipleHttpBlocks(2))
        );

        config.servers[0].http.truncate(1);
        config.servers[0].action = vec![ActionBlock::default(); 3];
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::MultipleActionBlocks(3))
        );
    }

    #[test]
    fn test_dangling_references() {
        let config = HubConfig {
            hosts: vec![host("a", "auth")],
            pipes: vec![pipe("log")],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::UnknownAlias { ref alias, .. }) if alias == "auth"
        ));

        let config = HubConfig {
            pipes: vec![pipe("log")],
            servers: vec![ServerBlock {
                action: vec![ActionBlock {
                    not_found: None,
                    panic: Some("oops".into()),
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::UnknownAlias {
                alias: "oops".into(),
                referenced_by: "server.action.panic".into(),
            })
        );
    }

    #[test]
    fn test_duplicate_alias() {
        let config = HubConfig {
            pipes: vec![pipe("a"), pipe("b"), pipe("a")],
            ..Default::default()
        };
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::DuplicateAlias("a".into()))
        );
    }

    #[test]
    fn test_host_checks() {
        let config = HubConfig {
            hosts: vec![host("A.example.com", "x"), host("a.example.com", "x")],
            pipes: vec![pipe("x")],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::DuplicateEndpoint(_))
        ));

        let config = HubConfig {
            hosts: vec![HostBinding {
                endpoint: "a".into(),
                origin: "*".into(),
                handler: HandlerRef::Chain(vec![]),
            }],
            ..Default::default()
        };
        assert_eq!(
            validate_config(&config),
            Err(ValidationError::EmptyChain("a".into()))
        );

        let config = HubConfig {
            hosts: vec![host(" ", "x")],
            pipes: vec![pipe("x")],
            ..Default::default()
        };
        assert_eq!(validate_config(&config), Err(ValidationError::EmptyEndpoint(0)));
    }

    #[test]
    fn test_invalid_duration() {
        let config = HubConfig {
            servers: vec![ServerBlock {
                graceful_shutdown: Some("soon".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ValidationError::InvalidDuration { .. })
        ));
    }
}
