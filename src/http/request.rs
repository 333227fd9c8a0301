//! Request-side helpers shared by the dispatcher and pipes.
//!
//! # Responsibilities
//! - Name the request ID header and read it back
//! - Define the extensions the dispatcher attaches to requests
//! - Keep a bodiless copy of a request for fallback handlers

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};

use crate::pipe::Request as PipeRequest;
use crate::routing::Origin;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Read the request ID header.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&HeaderValue>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&HeaderValue> {
        self.headers().get(X_REQUEST_ID)
    }
}

/// Route a request was matched to. Inserted as an extension before the chain runs.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub endpoint: String,
    pub origin: Origin,
    pub chain: Vec<String>,
}

/// Why the panic fallback is being invoked. Inserted as an extension on the
/// request handed to it.
#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub message: String,
}

/// The parts of a request needed to replay it, without the body.
#[derive(Debug, Clone)]
pub(crate) struct RequestHead {
    method: axum::http::Method,
    uri: axum::http::Uri,
    version: axum::http::Version,
    headers: axum::http::HeaderMap,
}

impl RequestHead {
    pub(crate) fn of(req: &PipeRequest) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            version: req.version(),
            headers: req.headers().clone(),
        }
    }

    /// A fresh request with the same head and an empty body.
    pub(crate) fn to_request(&self) -> PipeRequest {
        let mut req = Request::new(Body::empty());
        *req.method_mut() = self.method.clone();
        *req.uri_mut() = self.uri.clone();
        *req.version_mut() = self.version;
        *req.headers_mut() = self.headers.clone();
        req
    }
}
