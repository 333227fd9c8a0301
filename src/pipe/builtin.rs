//! Pipes shipped with the hub.
//!
//! They are registered at [`BUILTIN_VERSION`] by [`PipeCatalog::with_builtins`].

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, StatusCode};
use uuid::Uuid;

use crate::http::request::{RequestIdExt, RouteInfo, X_REQUEST_ID};
use crate::http::response::error_response;
use crate::pipe::{handler_fn, BoxHandler, Pipe, PipeCatalog, PipeContext, PipeError};

pub const BUILTIN_VERSION: &str = "v1.0.0";

pub const REQUEST_ID: &str = "pipehub/request-id";
pub const ACCESS_LOG: &str = "pipehub/access-log";
pub const NOT_FOUND: &str = "pipehub/not-found";
pub const INTERNAL_ERROR: &str = "pipehub/internal-error";

pub(crate) fn register(catalog: &mut PipeCatalog) {
    catalog
        .register(REQUEST_ID, BUILTIN_VERSION, |_| Ok(RequestIdPipe))
        .register(ACCESS_LOG, BUILTIN_VERSION, |ctx: PipeContext| {
            Ok(AccessLogPipe { alias: ctx.alias })
        })
        .register(NOT_FOUND, BUILTIN_VERSION, |_| {
            Ok(StaticResponsePipe {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: "no route matches this host",
            })
        })
        .register(INTERNAL_ERROR, BUILTIN_VERSION, |_| {
            Ok(StaticResponsePipe {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal_error",
                message: "the request could not be processed",
            })
        });
}

/// Ensures every request and response carries an `x-request-id`.
pub struct RequestIdPipe;

impl Pipe for RequestIdPipe {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        handler_fn(move |mut req| {
            let next = next.clone();
            async move {
                let id = match req.request_id() {
                    Some(id) => id.clone(),
                    None => {
                        let id = HeaderValue::from_str(&Uuid::new_v4().to_string())
                            .map_err(|e| PipeError::msg(format!("invalid request id: {e}")))?;
                        req.headers_mut().insert(X_REQUEST_ID, id.clone());
                        id
                    }
                };
                let mut res = next.call(req).await?;
                res.headers_mut().entry(X_REQUEST_ID).or_insert(id);
                Ok::<_, PipeError>(res)
            }
        })
    }
}

/// Logs one line per request passing through it.
pub struct AccessLogPipe {
    alias: String,
}

impl Pipe for AccessLogPipe {
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        let alias = self.alias.clone();
        handler_fn(move |req| {
            let next = next.clone();
            let alias = alias.clone();
            async move {
                let start = Instant::now();
                let method = req.method().clone();
                let path = req.uri().path().to_string();
                let request_id = req
                    .request_id()
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-")
                    .to_string();
                let client = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let route = req
                    .extensions()
                    .get::<RouteInfo>()
                    .map(|r| r.endpoint.clone())
                    .unwrap_or_else(|| "-".to_string());

                let result = next.call(req).await;
                let latency_ms = start.elapsed().as_millis() as u64;
                match &result {
                    Ok(res) => tracing::info!(
                        pipe = %alias,
                        request_id = %request_id,
                        client = %client,
                        route = %route,
                        method = %method,
                        path = %path,
                        status = res.status().as_u16(),
                        latency_ms,
                        "Request served"
                    ),
                    Err(e) => tracing::warn!(
                        pipe = %alias,
                        request_id = %request_id,
                        client = %client,
                        route = %route,
                        method = %method,
                        path = %path,
                        error = %e,
                        latency_ms,
                        "Request failed"
                    ),
                }
                result
            }
        })
    }
}

/// Answers every request itself; the wrapped handler is never called.
pub struct StaticResponsePipe {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
}

impl Pipe for StaticResponsePipe {
    fn wrap(&self, _next: BoxHandler) -> BoxHandler {
        let (status, code, message) = (self.status, self.code, self.message);
        handler_fn(move |_req| async move { Ok(error_response(status, code, message)) })
    }
}
