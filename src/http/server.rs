//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to the dispatcher
//! - Wire up tracing middleware
//! - Refuse new requests once shutdown has begun
//! - Count requests in flight, and cut them short when told to abandon them
//! - Serve until shutdown is triggered, then stop accepting connections

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::http::dispatch::Dispatcher;
use crate::http::response;
use crate::lifecycle::in_flight::InFlight;
use crate::lifecycle::shutdown::Shutdown;
use crate::pipe::{Request, Response};

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown: Shutdown,
    pub in_flight: InFlight,
}

/// HTTP front-end of the hub.
pub struct HttpServer {
    router: Router,
    shutdown: Shutdown,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>, shutdown: Shutdown, in_flight: InFlight) -> Self {
        let state = AppState {
            dispatcher,
            shutdown: shutdown.clone(),
            in_flight,
        };
        Self {
            router: Self::build_router(state),
            shutdown,
        }
    }

    /// Every path and method goes to the dispatcher; routing is by host.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve on `listener` until shutdown is triggered.
    ///
    /// Returns once every connection has finished. Bounding that wait is the
    /// caller's job; requests still running are counted in [`InFlight`].
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let reason = shutdown.wait().await;
                tracing::info!(reason = %reason, "HTTP server no longer accepting connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn dispatch_handler(State(state): State<AppState>, req: Request) -> Response {
    // Counted before the state check, so a request admitted while running is
    // always seen by the drain.
    let _guard = state.in_flight.enter();
    if !state.shutdown.is_running() {
        tracing::debug!(path = %req.uri().path(), "Request refused during shutdown");
        return response::shutting_down();
    }

    let path = req.uri().path().to_string();
    tokio::select! {
        res = state.dispatcher.dispatch(req) => res,
        _ = state.in_flight.abandoned() => {
            tracing::warn!(path = %path, "In-flight request abandoned at shutdown deadline");
            response::shutting_down()
        }
    }
}
