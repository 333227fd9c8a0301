//! Startup orchestration and the shutdown sequence.
//!
//! # Responsibilities
//! - Build the routing table, pipe instances and dispatcher, in that order
//! - Serve until shutdown is triggered
//! - Drain, close every pipe, and report how shutdown went
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, and pipes already created are
//!   closed before the error is returned
//! - The drain and close phases share one deadline, measured from the trigger
//! - `run` never fails; close problems are reported, not raised

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, HubConfig, ServerSettings, ValidationError};
use crate::http::dispatch::{DispatchError, Dispatcher};
use crate::http::server::HttpServer;
use crate::http::upstream;
use crate::lifecycle::in_flight::InFlight;
use crate::lifecycle::shutdown::{Shutdown, ShutdownReason};
use crate::pipe::registry::ROLLBACK_CLOSE_TIMEOUT;
use crate::pipe::{CloseErrors, CloseFailure, PipeCatalog, PipeRegistry, RegistryError};
use crate::routing::RoutingTable;

/// Anything that stops the hub before it starts serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// How shutdown went.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    /// Whether every in-flight request finished before the deadline. `false`
    /// means the rest were abandoned.
    pub drained: bool,
    pub close_failures: Vec<CloseFailure>,
}

/// A fully initialized hub, ready to serve.
pub struct Hub {
    shutdown: Shutdown,
    table: Arc<RoutingTable>,
    registry: PipeRegistry,
    dispatcher: Arc<Dispatcher>,
}

impl Hub {
    /// Validate `config`, instantiate its pipes and compose every chain.
    pub async fn bootstrap(config: &HubConfig, catalog: &PipeCatalog) -> Result<Self, StartupError> {
        let table = Arc::new(RoutingTable::build(config)?);
        tracing::info!(routes = table.len(), "Routing table built");

        let shutdown = Shutdown::new();
        let registry =
            PipeRegistry::instantiate(&config.pipes, catalog, &shutdown.reporter()).await?;

        let dispatcher = match Dispatcher::new(Arc::clone(&table), &registry, upstream::client()) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                rollback(&registry).await;
                return Err(e.into());
            }
        };

        Ok(Self {
            shutdown,
            table,
            registry,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Handle on the shutdown coordinator shared with every pipe.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn settings(&self) -> &ServerSettings {
        self.table.settings()
    }

    /// Number of pipe instances created at bootstrap.
    pub fn pipe_count(&self) -> usize {
        self.registry.len()
    }

    /// Bind the configured port on all interfaces.
    pub async fn bind(&self) -> Result<TcpListener, StartupError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.settings().port()));
        TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })
    }

    /// Close every pipe without serving. Used when startup fails after
    /// bootstrap, e.g. on a bind error.
    pub async fn abort(self) {
        rollback(&self.registry).await;
        self.shutdown.mark_closed();
    }

    /// Serve on `listener` until shutdown, then drain and close.
    ///
    /// Without a grace period the drain is unbounded. With one, requests
    /// still running at the deadline are abandoned before any pipe closes.
    pub async fn run(self, listener: TcpListener) -> ShutdownReport {
        let in_flight = InFlight::new();
        let server = HttpServer::new(
            Arc::clone(&self.dispatcher),
            self.shutdown.clone(),
            in_flight.clone(),
        );
        let mut server_task = tokio::spawn(server.run(listener));

        let mut server_done = false;
        tokio::select! {
            _ = self.shutdown.wait() => {}
            result = &mut server_task => {
                server_done = true;
                let why = match result {
                    Ok(Ok(())) => "stopped without a shutdown trigger".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => e.to_string(),
                };
                tracing::error!(error = %why, "HTTP server exited unexpectedly");
                self.shutdown.trigger(ShutdownReason::ServerExited(why));
            }
        }

        let reason = self.shutdown.reason().unwrap_or(ShutdownReason::Requested);
        let triggered_at = self.shutdown.triggered_at().unwrap_or_else(Instant::now);
        let deadline = self.settings().graceful_shutdown.map(|grace| triggered_at + grace);
        tracing::info!(
            reason = %reason,
            in_flight = in_flight.count(),
            grace_ms = self.settings().graceful_shutdown.map(|d| d.as_millis() as u64),
            "Draining"
        );

        let drained = match deadline {
            None => {
                drain(&mut server_task, server_done, &in_flight).await;
                true
            }
            Some(deadline) => {
                let outcome = tokio::time::timeout_at(
                    deadline.into(),
                    drain(&mut server_task, server_done, &in_flight),
                )
                .await;
                if outcome.is_ok() {
                    true
                } else {
                    tracing::warn!(
                        in_flight = in_flight.count(),
                        "Drain deadline reached, abandoning in-flight requests"
                    );
                    in_flight.abandon();
                    server_task.abort();
                    // Abandoned requests stop at their next poll.
                    in_flight.idle().await;
                    false
                }
            }
        };

        let close_failures = match self.registry.close_all(deadline).await {
            Ok(()) => Vec::new(),
            Err(CloseErrors(failures)) => {
                tracing::warn!(failures = failures.len(), "Some pipes did not close cleanly");
                failures
            }
        };
        self.shutdown.mark_closed();

        tracing::info!(
            reason = %reason,
            drained,
            close_failures = close_failures.len(),
            "Shutdown complete"
        );
        ShutdownReport {
            reason,
            drained,
            close_failures,
        }
    }
}

/// Wait for the server to stop accepting and for every request to finish.
async fn drain(
    server_task: &mut JoinHandle<std::io::Result<()>>,
    server_done: bool,
    in_flight: &InFlight,
) {
    if !server_done {
        if let Err(e) = server_task.await {
            tracing::warn!(error = %e, "HTTP server task failed while draining");
        }
    }
    in_flight.idle().await;
}

async fn rollback(registry: &PipeRegistry) {
    let deadline = Instant::now() + ROLLBACK_CLOSE_TIMEOUT;
    if let Err(e) = registry.close_all(Some(deadline)).await {
        tracing::warn!(error = %e, "Rollback after failed startup was incomplete");
    }
}
