//! Normalization of the raw configuration document into [`HubConfig`].
//!
//! # Responsibilities
//! - Walk the `pipe` section with a dedicated decoder
//! - Map `host` and `server` through serde with unknown fields denied
//! - Reject duplicate pipe aliases
//!
//! # Design Decisions
//! - The `pipe` section is an association list whose keys are pipe
//!   identities, so it cannot be mapped onto a struct. It is walked by hand
//!   and every shape mismatch is an error naming its location.
//! - A malformed `pipe` section never degrades to "no pipes declared".
//! - Block sections accept a single table where a list is expected so that
//!   `[server]` and `[[server]]` both work; multiplicity is kept for validation.

use std::collections::HashMap;

use toml::{Table, Value};

use crate::config::error::ConfigError;
use crate::config::schema::{HostBinding, HubConfig, PipeDeclaration, ServerBlock};

const SECTION_HOST: &str = "host";
const SECTION_PIPE: &str = "pipe";
const SECTION_SERVER: &str = "server";

const ATTR_VERSION: &str = "version";
const ATTR_ALIAS: &str = "alias";

/// Convert the generic decode of a configuration source into a typed config.
pub fn normalize(doc: &Table) -> Result<HubConfig, ConfigError> {
    if let Some(section) = doc
        .keys()
        .find(|key| ![SECTION_HOST, SECTION_PIPE, SECTION_SERVER].contains(&key.as_str()))
    {
        return Err(ConfigError::UnknownSection(section.clone()));
    }

    let hosts = match doc.get(SECTION_HOST) {
        Some(raw) => decode_blocks::<HostBinding>(SECTION_HOST, raw)?,
        None => Vec::new(),
    };

    let pipes = match doc.get(SECTION_PIPE) {
        Some(raw) => decode_pipes(raw)?,
        None => Vec::new(),
    };

    let servers = match doc.get(SECTION_SERVER) {
        Some(raw) => decode_servers(raw)?,
        None => Vec::new(),
    };

    Ok(HubConfig {
        hosts,
        pipes,
        servers,
    })
}

/// Decode the `pipe` section.
///
/// Expected shape, in TOML terms:
///
/// ```toml
/// [[pipe]]
/// [[pipe."github.com/pipehub/auth"]]
/// version = "v1.2.0"
/// alias = "auth"
/// ```
///
/// i.e. a list of tables keyed by identity, each holding a list of attribute
/// tables. Every attribute table yields one declaration.
pub fn decode_pipes(raw: &Value) -> Result<Vec<PipeDeclaration>, ConfigError> {
    tracing::trace!(raw = ?raw, "Decoding pipe section");

    let mut declarations = Vec::new();
    for (index, entry) in as_blocks(SECTION_PIPE, raw)?.iter().enumerate() {
        let entry = entry.as_table().ok_or_else(|| {
            ConfigError::shape(
                format!("{SECTION_PIPE}[{index}]"),
                format!("expected a table keyed by pipe identity, found {}", entry.type_str()),
            )
        })?;

        for (identity, attributes) in entry {
            let location = format!("{SECTION_PIPE}.\"{identity}\"");
            for (position, attrs) in as_blocks(&location, attributes)?.iter().enumerate() {
                let attrs = attrs.as_table().ok_or_else(|| {
                    ConfigError::shape(
                        format!("{location}[{position}]"),
                        format!("expected an attribute table, found {}", attrs.type_str()),
                    )
                })?;
                declarations.push(decode_declaration(identity, &location, attrs)?);
            }
        }
    }

    check_unique_aliases(&declarations)?;
    tracing::debug!(pipes = ?declarations, "Decoded pipe declarations");
    Ok(declarations)
}

fn decode_declaration(
    identity: &str,
    location: &str,
    attrs: &Table,
) -> Result<PipeDeclaration, ConfigError> {
    let mut version = None;
    let mut alias = None;

    for (key, value) in attrs {
        let text = value.as_str().ok_or_else(|| {
            ConfigError::shape(
                format!("{location}.{key}"),
                format!("expected a string, found {}", value.type_str()),
            )
        })?;
        match key.as_str() {
            ATTR_VERSION => version = Some(text),
            ATTR_ALIAS => alias = Some(text),
            other => {
                return Err(ConfigError::UnknownAttribute {
                    identity: identity.to_string(),
                    attribute: other.to_string(),
                })
            }
        }
    }

    let version = required(identity, ATTR_VERSION, version)?;
    let alias = required(identity, ATTR_ALIAS, alias)?;

    Ok(PipeDeclaration {
        identity: identity.to_string(),
        version,
        alias,
    })
}

fn required(
    identity: &str,
    attribute: &'static str,
    value: Option<&str>,
) -> Result<String, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingAttribute {
        identity: identity.to_string(),
        attribute,
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyAttribute {
            identity: identity.to_string(),
            attribute,
        });
    }
    Ok(value.to_string())
}

fn check_unique_aliases(declarations: &[PipeDeclaration]) -> Result<(), ConfigError> {
    let mut seen: HashMap<&str, &str> = HashMap::with_capacity(declarations.len());
    for decl in declarations {
        if let Some(first) = seen.insert(&decl.alias, &decl.identity) {
            return Err(ConfigError::DuplicateAlias {
                alias: decl.alias.clone(),
                first: first.to_string(),
                second: decl.identity.clone(),
            });
        }
    }
    Ok(())
}

fn decode_servers(raw: &Value) -> Result<Vec<ServerBlock>, ConfigError> {
    let mut servers = Vec::new();
    for (index, block) in as_blocks(SECTION_SERVER, raw)?.iter().enumerate() {
        let location = format!("{SECTION_SERVER}[{index}]");
        let mut table = block
            .as_table()
            .ok_or_else(|| {
                ConfigError::shape(&location, format!("expected a table, found {}", block.type_str()))
            })?
            .clone();

        // Nested blocks follow the same one-or-many rule as top-level ones.
        for nested in ["http", "action"] {
            if let Some(value) = table.get_mut(nested) {
                if value.is_table() {
                    let single = std::mem::replace(value, Value::Array(Vec::new()));
                    *value = Value::Array(vec![single]);
                }
            }
        }

        let server = Value::Table(table)
            .try_into::<ServerBlock>()
            .map_err(|source| ConfigError::Decode {
                section: location,
                source,
            })?;
        servers.push(server);
    }
    Ok(servers)
}

fn decode_blocks<T>(section: &str, raw: &Value) -> Result<Vec<T>, ConfigError>
where
    T: serde::de::DeserializeOwned,
{
    as_blocks(section, raw)?
        .iter()
        .enumerate()
        .map(|(index, block)| {
            (*block).clone().try_into::<T>().map_err(|source| ConfigError::Decode {
                section: format!("{section}[{index}]"),
                source,
            })
        })
        .collect()
}

/// View a section as a list of blocks. A lone table counts as one block.
fn as_blocks<'a>(section: &str, raw: &'a Value) -> Result<Vec<&'a Value>, ConfigError> {
    match raw {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Table(_) => Ok(vec![raw]),
        other => Err(ConfigError::shape(
            section,
            format!("expected a table or a list of tables, found {}", other.type_str()),
        )),
    }
}
