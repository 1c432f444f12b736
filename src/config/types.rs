//! Value types carried by connector settings.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a request entity is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestEntityProcessing {
    /// Collect the whole entity first and send it with `Content-Length`.
    Buffered,
    /// Stream the entity in chunks as it is produced.
    Chunked,
}

impl FromStr for RequestEntityProcessing {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUFFERED" => Ok(Self::Buffered),
            "CHUNKED" => Ok(Self::Chunked),
            _ => Err(()),
        }
    }
}

/// Protocol identifier resolved per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpVersion {
    Http1,
    /// HTTP/2 with prior knowledge on plain connections.
    Http2,
}

impl FromStr for HttpVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HTTP/1.1" | "HTTP_1_1" | "HTTP1" | "1.1" => Ok(Self::Http1),
            "HTTP/2" | "HTTP_2" | "HTTP2" | "2" => Ok(Self::Http2),
            _ => Err(()),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::Http1 => write!(f, "HTTP/1.1"),
            HttpVersion::Http2 => write!(f, "HTTP/2"),
        }
    }
}

type SupplyFn = dyn Fn() -> Result<Arc<rustls::ClientConfig>, ConfigError> + Send + Sync;

/// Lazily produces the TLS client configuration for a connector.
///
/// Two suppliers are equal only if they are the same instance.
#[derive(Clone)]
pub struct SslContextSupplier(Arc<SupplyFn>);

impl SslContextSupplier {
    pub fn new<F>(supply: F) -> Self
    where
        F: Fn() -> Result<Arc<rustls::ClientConfig>, ConfigError> + Send + Sync + 'static,
    {
        Self(Arc::new(supply))
    }

    /// A supplier that always hands out the same configuration.
    pub fn fixed(config: Arc<rustls::ClientConfig>) -> Self {
        Self::new(move || Ok(config.clone()))
    }

    pub fn supply(&self) -> Result<Arc<rustls::ClientConfig>, ConfigError> {
        (self.0)()
    }

    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SslContextSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SslContextSupplier(..)")
    }
}
