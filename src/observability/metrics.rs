//! Client metrics.
//!
//! # Metrics
//! - `restlink_client_requests_total` (counter): completed exchanges by method, status
//! - `restlink_client_request_duration_seconds` (histogram): time to response head
//! - `restlink_client_failures_total` (counter): failed exchanges by method, error kind

use std::time::Instant;

use crate::error::ConnectorError;

pub fn record_client_request(method: &str, status: u16, start: Instant) {
    let method = method.to_string();
    metrics::counter!(
        "restlink_client_requests_total",
        "method" => method.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("restlink_client_request_duration_seconds", "method" => method)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_client_failure(method: &str, error: &ConnectorError) {
    metrics::counter!(
        "restlink_client_failures_total",
        "method" => method.to_string(),
        "kind" => failure_kind(error)
    )
    .increment(1);
}

/// Low-cardinality label for an error.
pub fn failure_kind(error: &ConnectorError) -> &'static str {
    match error {
        ConnectorError::Config(_) => "config",
        ConnectorError::InvalidRequest(_) => "invalid_request",
        ConnectorError::Transport(_) | ConnectorError::Body(_) => "transport",
        ConnectorError::Connect(_) => "connect",
        ConnectorError::Tls(_) => "tls",
        ConnectorError::Timeout(_) => "timeout",
        ConnectorError::Entity(_) => "entity",
        ConnectorError::Pool(_) => "pool",
        ConnectorError::Panicked(_) => "panicked",
        ConnectorError::TooManyRedirects(_) => "redirects",
        ConnectorError::Closed => "closed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failure_kind() {
        assert_eq!(failure_kind(&ConnectorError::Timeout(Duration::from_secs(1))), "timeout");
        assert_eq!(failure_kind(&ConnectorError::Closed), "closed");
    }

    #[test]
    fn test_recording_without_recorder() {
        record_client_request("GET", 200, Instant::now());
        record_client_failure("GET", &ConnectorError::TooManyRedirects(5));
    }
}
