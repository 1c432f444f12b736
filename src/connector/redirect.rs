//! Redirect following.
//!
//! A redirect hop is derived from the response status and `Location` header:
//! - 303 always becomes a body-less GET (HEAD stays HEAD)
//! - 301 and 302 turn POST into GET unless the method is preserved
//! - 307 and 308 repeat the request as is
//!
//! The connector stops following when the next hop would need a body that was
//! already streamed, or when a [`RedirectController`] vetoes it.

use std::fmt;

use http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, PROXY_AUTHORIZATION, TRANSFER_ENCODING,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};

/// One redirect the connector is about to follow.
#[derive(Debug)]
pub struct RedirectAttempt<'a> {
    pub status: StatusCode,
    pub method: &'a Method,
    pub previous: &'a Uri,
    pub next: &'a Uri,
    /// Redirects already followed for this request.
    pub hops: u32,
}

/// Custom veto over redirect following.
pub trait RedirectController: fmt::Debug + Send + Sync {
    /// Return false to stop and hand the redirect response to the caller.
    fn follow(&self, attempt: &RedirectAttempt<'_>) -> bool;
}

/// Only follows redirects that stay on the same host and port.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameOriginRedirects;

impl RedirectController for SameOriginRedirects {
    fn follow(&self, attempt: &RedirectAttempt<'_>) -> bool {
        same_origin(attempt.previous, attempt.next)
    }
}

/// Where and how the next request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub method: Method,
    pub uri: Uri,
    pub keep_body: bool,
}

/// Derive the next hop, or `None` if `status` is not a followable redirect.
pub fn next_hop(
    status: StatusCode,
    method: &Method,
    current: &Uri,
    location: Option<&HeaderValue>,
    preserve_method: bool,
) -> Option<Redirect> {
    let (method, keep_body) = match status {
        StatusCode::SEE_OTHER => {
            let method = if method == Method::HEAD {
                Method::HEAD
            } else {
                Method::GET
            };
            (method, false)
        }
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => {
            if method == Method::POST && !preserve_method {
                (Method::GET, false)
            } else {
                (method.clone(), true)
            }
        }
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => (method.clone(), true),
        _ => return None,
    };

    let location = location?.to_str().ok()?;
    let uri = resolve_location(current, location)?;
    Some(Redirect {
        method,
        uri,
        keep_body,
    })
}

/// Resolve a possibly relative `Location` against the current URI.
pub fn resolve_location(current: &Uri, location: &str) -> Option<Uri> {
    let base = url::Url::parse(&current.to_string()).ok()?;
    let next = base.join(location.trim()).ok()?;
    match next.scheme() {
        "http" | "https" => next.as_str().parse().ok(),
        _ => None,
    }
}

/// Adjust headers for the next hop.
///
/// Body headers go with the body; credentials and the host header do not
/// cross to another origin.
pub fn prepare_headers(headers: &mut HeaderMap, previous: &Uri, next: &Uri, keep_body: bool) {
    if !keep_body {
        headers.remove(CONTENT_LENGTH);
        headers.remove(CONTENT_TYPE);
        headers.remove(TRANSFER_ENCODING);
    }
    if !same_origin(previous, next) {
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
        headers.remove(PROXY_AUTHORIZATION);
        headers.remove(HOST);
    }
}

fn same_origin(a: &Uri, b: &Uri) -> bool {
    a.scheme() == b.scheme() && a.host() == b.host() && effective_port(a) == effective_port(b)
}

fn effective_port(uri: &Uri) -> Option<u16> {
    uri.port_u16().or(match uri.scheme_str() {
        Some("https") => Some(443),
        Some("http") => Some(80),
        _ => None,
    })
}
