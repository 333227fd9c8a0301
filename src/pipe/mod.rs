//! Pipe subsystem: pluggable request-handling modules.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     PipeDeclaration (identity, version, alias)
//!     → catalog.rs (resolve factory by identity + version)
//!     → registry.rs (one instance per declaration, keyed by alias)
//!
//! Request:
//!     dispatcher → pipe[0] → pipe[1] → ... → terminal handler
//!
//! Shutdown:
//!     registry.rs close_all (concurrent, deadline-bounded)
//! ```
//!
//! # Design Decisions
//! - A pipe is middleware: it wraps the next handler and returns a new one
//! - Chains are composed once at startup, never per request
//! - Pipes are shared across concurrent requests and guard their own state

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::lifecycle::shutdown::AsyncErrorReporter;

pub mod builtin;
pub mod catalog;
pub mod registry;

pub use catalog::{PipeCatalog, PipeFactory};
pub use registry::{CloseErrors, CloseFailure, CloseFailureReason, PipeRegistry, RegistryError};

/// Request type flowing through pipes.
pub type Request = axum::extract::Request;

/// Response type flowing through pipes.
pub type Response = axum::response::Response;

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of invoking a handler. `Err` means the chain failed irrecoverably.
pub type HandlerResult = Result<Response, PipeError>;

/// Something that turns a request into a response.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(req))
    }
}

/// Shared, type-erased handler.
pub type BoxHandler = Arc<dyn Handler>;

/// Box a closure as a [`BoxHandler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(f)
}

/// A pipe instance.
///
/// # Example
///
/// ```rust
/// use pipehub::pipe::{handler_fn, BoxHandler, Pipe};
///
/// struct Server(&'static str);
///
/// impl Pipe for Server {
///     fn wrap(&self, next: BoxHandler) -> BoxHandler {
///         let name = self.0;
///         handler_fn(move |req| {
///             let next = next.clone();
///             async move {
///                 let mut res = next.call(req).await?;
///                 res.headers_mut().insert("server", name.parse().unwrap());
///                 Ok::<_, pipehub::pipe::PipeError>(res)
///             }
///         })
///     }
/// }
/// ```
pub trait Pipe: Send + Sync + 'static {
    /// Wrap `next`, producing the handler that runs this pipe in front of it.
    fn wrap(&self, next: BoxHandler) -> BoxHandler;

    /// Release resources. Called once during shutdown; `deadline` is when
    /// the hub stops waiting.
    fn close(&self, _deadline: Option<Instant>) -> BoxFuture<'_, Result<(), PipeError>> {
        Box::pin(async { Ok(()) })
    }
}

/// What a factory knows when building a pipe.
#[derive(Debug, Clone)]
pub struct PipeContext {
    pub identity: String,
    pub version: String,
    pub alias: String,
    /// Reports errors outside the request path; reporting ends the process.
    pub errors: AsyncErrorReporter,
}

/// Error produced by a pipe, while handling a request or closing.
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl PipeError {
    pub fn msg(message: impl Into<String>) -> Self {
        PipeError::Message(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    struct Tag(&'static str);

    impl Pipe for Tag {
        fn wrap(&self, next: BoxHandler) -> BoxHandler {
            let tag = self.0;
            handler_fn(move |req| {
                let next = next.clone();
                async move {
                    let mut res = next.call(req).await?;
                    let seen = res
                        .headers()
                        .get("x-trail")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| format!("{tag},{v}"))
                        .unwrap_or_else(|| tag.to_string());
                    res.headers_mut().insert("x-trail", seen.parse().unwrap());
                    Ok::<_, PipeError>(res)
                }
            })
        }
    }

    #[tokio::test]
    async fn test_first_declared_is_outermost() {
        let terminal = handler_fn(|_req| async { Ok(StatusCode::OK.into_response()) });
        let chain = [Tag("outer"), Tag("inner")]
            .iter()
            .rev()
            .fold(terminal, |next, pipe| pipe.wrap(next));

        let res = chain.call(Request::new(Body::empty())).await.unwrap();
        // Responses unwind inner to outer.
        assert_eq!(res.headers()["x-trail"], "outer,inner");
    }

    #[tokio::test]
    async fn test_default_close_is_ok() {
        assert!(Tag("x").close(None).await.is_ok());
    }
}
