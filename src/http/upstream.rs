//! Forwarding to an upstream origin.
//!
//! The innermost handler of a chain whose host binding names an `http://`
//! origin. The request URI is rewritten onto the origin and sent with a
//! shared hyper client; an unreachable origin yields a 502, not a chain failure.

use axum::body::Body;
use axum::http::uri::{PathAndQuery, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::http::request::RequestIdExt;
use crate::http::response;
use crate::pipe::{handler_fn, BoxHandler, PipeError, Request, Response};

/// HTTP client shared by every upstream handler.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Build the shared client.
pub fn client() -> UpstreamClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// A handler forwarding every request to `origin`.
pub fn forward_to(origin: Uri, client: UpstreamClient) -> BoxHandler {
    handler_fn(move |req: Request| {
        let client = client.clone();
        let origin = origin.clone();
        async move {
            let request_id = req
                .request_id()
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            let (mut parts, body) = req.into_parts();
            parts.uri = rewrite_uri(&origin, &parts.uri)?;
            let uri = parts.uri.clone();

            match client.request(Request::from_parts(parts, body)).await {
                Ok(res) => Ok::<_, PipeError>(into_response(res)),
                Err(e) => {
                    tracing::error!(request_id = %request_id, uri = %uri, error = %e, "Upstream error");
                    Ok(response::bad_gateway())
                }
            }
        }
    })
}

fn into_response(res: hyper::Response<Incoming>) -> Response {
    res.map(Body::new)
}

/// Place the request's path and query under the origin's base path.
fn rewrite_uri(origin: &Uri, request: &Uri) -> Result<Uri, PipeError> {
    let base = origin.path().trim_end_matches('/');
    let path_and_query = request
        .path_and_query()
        .map(PathAndQuery::as_str)
        .unwrap_or("/");
    let joined = format!("{base}{path_and_query}");

    let mut parts = origin.clone().into_parts();
    parts.path_and_query = Some(
        joined
            .parse()
            .map_err(|e| PipeError::msg(format!("invalid upstream path '{joined}': {e}")))?,
    );
    Uri::from_parts(parts).map_err(|e| PipeError::msg(format!("invalid upstream uri: {e}")))
}
