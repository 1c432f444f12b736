//! Error taxonomy.
//!
//! # Design Decisions
//! - One enum per subsystem: configuration, connector execution, server bootstrap
//! - Type-mismatched property values are not errors; they fall through the
//!   precedence chain (see `config::parse`)
//! - Transport errors keep their source so callers can inspect the hyper error

use std::time::Duration;
use thiserror::Error;

/// Errors raised while combining or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A property holds a value outside its allowed range.
    #[error("Invalid value {value} for property {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: &'static str,
    },

    /// Configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML for the expected schema.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TLS material could not be turned into a rustls configuration.
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Errors produced while executing a request through a connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The request could not be mapped onto the transport.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The transport failed while sending the request or reading the response.
    #[error("Transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    /// Establishing the connection (TCP, proxy tunnel or TLS) failed.
    #[error("Connect error: {0}")]
    Connect(String),

    /// TLS material for the connector could not be produced.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Reading the response body failed.
    #[error("Body error: {0}")]
    Body(#[from] hyper::Error),

    /// No response head arrived within the read timeout.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    /// Producing the request entity failed.
    #[error("Entity error: {0}")]
    Entity(#[from] std::io::Error),

    /// The asynchronous worker pool could not be created.
    #[error("Worker pool unavailable: {0}")]
    Pool(String),

    /// The request processing panicked on a worker.
    #[error("Request processing panicked: {0}")]
    Panicked(String),

    /// More redirects than allowed were returned.
    #[error("Too many redirects (max {0})")]
    TooManyRedirects(u32),

    /// The connector was closed before the request was submitted.
    #[error("Connector closed")]
    Closed,
}

/// Errors produced by the server bootstrap adapter.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Binding or serving failed.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Server certificate, key or CA material is unusable.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Serving failed after the listener was up.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The server task ended without reporting a listening address.
    #[error("Server exited before it started listening")]
    NotListening,

    #[error("Server not started")]
    NotStarted,

    #[error("Server already started")]
    AlreadyStarted,

    /// The serve task panicked or was cancelled.
    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
