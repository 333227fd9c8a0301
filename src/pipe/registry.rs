//! Pipe instances and their lifecycle.
//!
//! # Responsibilities
//! - Instantiate exactly one pipe per declaration, keyed by alias
//! - Hand out instances for chain composition
//! - Close every instance on shutdown
//!
//! # Design Decisions
//! - Instantiation is all-or-nothing: on failure, instances already created
//!   are closed before the error is returned
//! - Closes run concurrently, one task each; failures are collected, never
//!   short-circuited
//! - A close still running at the deadline is detached and reported

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::schema::PipeDeclaration;
use crate::lifecycle::shutdown::AsyncErrorReporter;
use crate::observability::metrics;
use crate::pipe::{Pipe, PipeCatalog, PipeContext, PipeError};

/// Bound on closing already-created pipes when startup fails.
pub(crate) const ROLLBACK_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while instantiating pipes.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(
        "pipe '{alias}': no module '{identity}' registered at version '{version}' (available: {})",
        describe_versions(.available)
    )]
    UnknownModule {
        alias: String,
        identity: String,
        version: String,
        available: Vec<String>,
    },

    #[error("pipe '{alias}' ({identity}@{version}) failed to initialize: {source}")]
    Init {
        alias: String,
        identity: String,
        version: String,
        #[source]
        source: PipeError,
    },

    #[error("pipe alias '{0}' is declared more than once")]
    DuplicateAlias(String),
}

fn describe_versions(versions: &[String]) -> String {
    if versions.is_empty() {
        "none".to_string()
    } else {
        versions.join(", ")
    }
}

/// Why a pipe did not close cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseFailureReason {
    /// `close` returned an error.
    Failed(String),
    /// `close` panicked.
    Panicked,
    /// `close` was still running at the deadline and has been abandoned.
    DeadlineExceeded,
}

/// One pipe that did not close cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFailure {
    pub alias: String,
    pub reason: CloseFailureReason,
}

impl std::fmt::Display for CloseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            CloseFailureReason::Failed(err) => write!(f, "pipe '{}': {}", self.alias, err),
            CloseFailureReason::Panicked => write!(f, "pipe '{}': panicked while closing", self.alias),
            CloseFailureReason::DeadlineExceeded => {
                write!(f, "pipe '{}': close did not finish before the deadline", self.alias)
            }
        }
    }
}

/// Every close failure of one shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} pipe(s) failed to close: {}", .0.len(), join_failures(.0))]
pub struct CloseErrors(pub Vec<CloseFailure>);

fn join_failures(failures: &[CloseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A pipe instance and the declaration it came from.
#[derive(Clone)]
pub struct PipeInstance {
    pub declaration: PipeDeclaration,
    pub pipe: Arc<dyn Pipe>,
}

impl std::fmt::Debug for PipeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeInstance")
            .field("declaration", &self.declaration)
            .finish_non_exhaustive()
    }
}

/// Owns every pipe instance for the life of the process.
#[derive(Debug, Default)]
pub struct PipeRegistry {
    /// Creation order.
    instances: Vec<PipeInstance>,
    by_alias: HashMap<String, usize>,
}

impl PipeRegistry {
    /// Create one instance per declaration.
    pub async fn instantiate(
        declarations: &[PipeDeclaration],
        catalog: &PipeCatalog,
        errors: &AsyncErrorReporter,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for decl in declarations {
            if let Err(e) = registry.instantiate_one(decl, catalog, errors) {
                tracing::error!(alias = %decl.alias, error = %e, "Pipe instantiation failed");
                if !registry.is_empty() {
                    let deadline = Instant::now() + ROLLBACK_CLOSE_TIMEOUT;
                    if let Err(close_errors) = registry.close_all(Some(deadline)).await {
                        tracing::warn!(error = %close_errors, "Rollback after failed startup was incomplete");
                    }
                }
                return Err(e);
            }
        }

        metrics::record_pipes_active(registry.len());
        tracing::info!(pipes = registry.len(), "Pipes instantiated");
        Ok(registry)
    }

    fn instantiate_one(
        &mut self,
        decl: &PipeDeclaration,
        catalog: &PipeCatalog,
        errors: &AsyncErrorReporter,
    ) -> Result<(), RegistryError> {
        if self.by_alias.contains_key(&decl.alias) {
            return Err(RegistryError::DuplicateAlias(decl.alias.clone()));
        }

        let factory = catalog
            .resolve(&decl.identity, &decl.version)
            .ok_or_else(|| RegistryError::UnknownModule {
                alias: decl.alias.clone(),
                identity: decl.identity.clone(),
                version: decl.version.clone(),
                available: catalog.versions(&decl.identity),
            })?;

        let ctx = PipeContext {
            identity: decl.identity.clone(),
            version: decl.version.clone(),
            alias: decl.alias.clone(),
            errors: errors.clone(),
        };
        let pipe = factory(ctx).map_err(|source| RegistryError::Init {
            alias: decl.alias.clone(),
            identity: decl.identity.clone(),
            version: decl.version.clone(),
            source,
        })?;

        tracing::debug!(
            alias = %decl.alias,
            identity = %decl.identity,
            version = %decl.version,
            "Pipe instantiated"
        );
        self.by_alias.insert(decl.alias.clone(), self.instances.len());
        self.instances.push(PipeInstance {
            declaration: decl.clone(),
            pipe,
        });
        Ok(())
    }

    /// The instance bound to `alias`.
    pub fn get(&self, alias: &str) -> Option<&Arc<dyn Pipe>> {
        self.by_alias
            .get(alias)
            .map(|&index| &self.instances[index].pipe)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Close every pipe concurrently, waiting at most until `deadline`
    /// (forever when `None`).
    pub async fn close_all(&self, deadline: Option<Instant>) -> Result<(), CloseErrors> {
        let pending: Vec<_> = self
            .instances
            .iter()
            .map(|instance| {
                let pipe = Arc::clone(&instance.pipe);
                let handle = tokio::spawn(async move { pipe.close(deadline).await });
                (instance.declaration.alias.clone(), handle)
            })
            .collect();

        let mut failures = Vec::new();
        for (alias, handle) in pending {
            let joined = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline.into(), handle).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            // Dropping the handle detaches the task; it is not awaited further.
                            tracing::warn!(alias = %alias, "Pipe close exceeded shutdown deadline, abandoning");
                            failures.push(CloseFailure {
                                alias,
                                reason: CloseFailureReason::DeadlineExceeded,
                            });
                            continue;
                        }
                    }
                }
                None => handle.await,
            };

            let reason = match joined {
                Ok(Ok(())) => {
                    tracing::debug!(alias = %alias, "Pipe closed");
                    continue;
                }
                Ok(Err(e)) => {
                    tracing::warn!(alias = %alias, error = %e, "Pipe close failed");
                    CloseFailureReason::Failed(e.to_string())
                }
                Err(join_err) => {
                    tracing::error!(alias = %alias, error = %join_err, "Pipe close panicked");
                    CloseFailureReason::Panicked
                }
            };
            failures.push(CloseFailure { alias, reason });
        }

        metrics::record_close_failures(&failures);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseErrors(failures))
        }
    }
}
