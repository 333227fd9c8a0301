//! Request dispatch through composed pipe chains.
//!
//! # Responsibilities
//! - Compose one handler per route at startup, first-declared pipe outermost
//! - Look up the route for each request and invoke its chain
//! - Answer unmatched hosts with the not-found fallback
//! - Contain chain failures and panics, answering with the panic fallback
//!
//! # Design Decisions
//! - Composition happens once; dispatch does no per-request allocation of chains
//! - The dispatcher holds no mutable state
//! - Fallbacks are themselves guarded: if one fails, a built-in response is used

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use thiserror::Error;

use crate::http::request::{DispatchFailure, RequestHead, RouteInfo};
use crate::http::response;
use crate::http::upstream::{self, UpstreamClient};
use crate::observability::metrics;
use crate::pipe::{handler_fn, BoxHandler, Pipe, PipeRegistry, Request, Response};
use crate::routing::matcher::request_host;
use crate::routing::{Origin, RoutingTable};

/// Raised when a route or fallback names an alias the registry does not hold.
#[derive(Debug, Error)]
#[error("{referenced_by} references pipe '{alias}', which was not instantiated")]
pub struct DispatchError {
    pub alias: String,
    pub referenced_by: String,
}

/// Routes requests to their pipe chains.
pub struct Dispatcher {
    table: Arc<RoutingTable>,
    /// Composed chain per route, keyed by the route's endpoint.
    chains: HashMap<String, BoxHandler>,
    not_found: BoxHandler,
    panic: BoxHandler,
}

impl Dispatcher {
    /// Compose every route's chain from registry instances.
    pub fn new(
        table: Arc<RoutingTable>,
        registry: &PipeRegistry,
        client: UpstreamClient,
    ) -> Result<Self, DispatchError> {
        let settings = table.settings();

        let not_found = fallback(
            registry,
            settings.not_found.as_deref(),
            "server.action.not-found",
            builtin(response::not_found),
        )?;
        let panic = fallback(
            registry,
            settings.panic.as_deref(),
            "server.action.panic",
            builtin(response::internal_error),
        )?;

        let mut chains = HashMap::with_capacity(table.len());
        for route in table.routes() {
            let terminal = match &route.origin {
                Origin::Wildcard => Arc::clone(&not_found),
                Origin::Upstream(uri) => upstream::forward_to(uri.clone(), client.clone()),
            };
            let referenced_by = format!("host '{}'", route.endpoint);
            let chain = route
                .chain
                .iter()
                .rev()
                .try_fold(terminal, |next, alias| {
                    resolve(registry, alias, &referenced_by).map(|pipe| pipe.wrap(next))
                })?;
            chains.insert(route.endpoint.clone(), chain);
        }

        Ok(Self {
            table,
            chains,
            not_found,
            panic,
        })
    }

    /// Handle one request. Never fails and never panics because of a pipe.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let start = Instant::now();

        let route = request_host(&req).and_then(|host| self.table.lookup(host));
        let matched = route.and_then(|r| self.chains.get(&r.endpoint).map(|chain| (r, chain)));
        let Some((route, chain)) = matched else {
            tracing::debug!(
                host = request_host(&req).unwrap_or("-"),
                path = %req.uri().path(),
                "No route matched"
            );
            let res = guarded(&self.not_found, req, "not-found fallback", response::not_found).await;
            metrics::record_request("none", "not_found", res.status().as_u16(), start);
            return res;
        };

        let head = RequestHead::of(&req);
        req.extensions_mut().insert(RouteInfo {
            endpoint: route.endpoint.clone(),
            origin: route.origin.clone(),
            chain: route.chain.clone(),
        });

        let outcome = AssertUnwindSafe(async move { chain.call(req).await })
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(res)) => {
                metrics::record_request(&route.endpoint, "ok", res.status().as_u16(), start);
                return res;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panic: {}", panic_message(payload.as_ref())),
        };

        tracing::error!(endpoint = %route.endpoint, error = %failure, "Pipe chain failed");
        let mut fallback_req = head.to_request();
        fallback_req
            .extensions_mut()
            .insert(DispatchFailure { message: failure });
        let res = guarded(&self.panic, fallback_req, "panic fallback", response::internal_error).await;
        metrics::record_request(&route.endpoint, "failed", res.status().as_u16(), start);
        res
    }
}

/// Invoke a fallback handler, replacing any failure with `default`.
async fn guarded(
    handler: &BoxHandler,
    req: Request,
    what: &'static str,
    default: fn() -> Response,
) -> Response {
    let outcome = AssertUnwindSafe(async move { handler.call(req).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(res)) => res,
        Ok(Err(e)) => {
            tracing::error!(fallback = what, error = %e, "Fallback failed, using built-in response");
            default()
        }
        Err(payload) => {
            tracing::error!(
                fallback = what,
                panic = %panic_message(payload.as_ref()),
                "Fallback panicked, using built-in response"
            );
            default()
        }
    }
}

fn builtin(respond: fn() -> Response) -> BoxHandler {
    handler_fn(move |_req| async move { Ok(respond()) })
}

fn fallback(
    registry: &PipeRegistry,
    alias: Option<&str>,
    referenced_by: &str,
    default: BoxHandler,
) -> Result<BoxHandler, DispatchError> {
    match alias {
        Some(alias) => Ok(resolve(registry, alias, referenced_by)?.wrap(default)),
        None => Ok(default),
    }
}

fn resolve<'a>(
    registry: &'a PipeRegistry,
    alias: &str,
    referenced_by: &str,
) -> Result<&'a Arc<dyn Pipe>, DispatchError> {
    registry.get(alias).ok_or_else(|| DispatchError {
        alias: alias.to_string(),
        referenced_by: referenced_by.to_string(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
