//! Host matching logic.
//!
//! # Responsibilities
//! - Extract the request host (`Host` header, else URI authority)
//! - Normalize hosts and endpoints to a comparable key
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - A trailing dot is ignored (`example.com.` == `example.com`)
//! - Exact `host:port` match wins over a port-less match

use axum::http::{header, Request};

/// Normalize a host or endpoint into a routing key.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// The host a request is addressed to, if any.
pub fn request_host<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .filter(|h| !h.is_empty())
}

/// Routing keys to try for a host, most specific first.
pub fn candidate_keys(host: &str) -> Vec<String> {
    let exact = normalize_host(host);
    let mut keys = Vec::with_capacity(2);
    if let Some(bare) = strip_port(&exact) {
        let bare = bare.to_string();
        keys.push(exact);
        keys.push(bare);
    } else {
        keys.push(exact);
    }
    keys
}

fn strip_port(host: &str) -> Option<&str> {
    // Bracketed IPv6 literal: "[::1]:8080"
    if let Some(rest) = host.strip_prefix('[') {
        let end = rest.find(']')?;
        return rest[end + 1..].strip_prefix(':').map(|_| &host[..end + 2]);
    }
    let (name, port) = host.rsplit_once(':')?;
    if name.contains(':') || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(name)
}
