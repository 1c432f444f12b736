//! Client-side request/response abstractions and the client handle.
//!
//! # Data Flow
//! ```text
//! ClientConfig (properties, default headers, TLS)
//!     → ConnectorProvider::connector()  (once, at Client construction)
//!     → Client::request()               → ClientRequest (request → client → system chain)
//!     → Connector::apply / apply_async  → ClientResponse
//! ```
//!
//! # Design Decisions
//! - Client properties are shared with every request through an `Arc`
//! - Default headers are copied onto each request when it is created
//! - A `Client` owns exactly one connector for its whole lifetime

pub mod entity;
pub mod request;
pub mod response;

pub use entity::{Entity, EntityWriter};
pub use request::ClientRequest;
pub use response::{ClientResponse, ResponseEntity};

use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};

use crate::config::properties::{Properties, PropertyValue, SystemProperties};
use crate::connector::{AsyncCallback, AsyncHandle, Connector};
use crate::error::ConnectorError;
use crate::provider::{ConnectorProvider, HyperConnectorProvider};

/// Client-level configuration: the middle layer of the property chain.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    properties: Arc<Properties>,
    system: Arc<SystemProperties>,
    default_headers: HeaderMap,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl ClientConfig {
    /// Empty configuration with an empty system layer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Arc::new(properties);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties_mut().set(key, value);
        self
    }

    pub fn with_system_properties(mut self, system: SystemProperties) -> Self {
        self.system = Arc::new(system);
        self
    }

    /// Header sent with every request of this client.
    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.append(name, value);
        self
    }

    /// TLS configuration used when no SSL context supplier is configured.
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        Arc::make_mut(&mut self.properties)
    }

    pub fn system_properties(&self) -> &SystemProperties {
        &self.system
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn tls(&self) -> Option<&Arc<rustls::ClientConfig>> {
        self.tls.as_ref()
    }

    /// Start a request scoped to this configuration.
    pub fn request(&self, method: Method, uri: Uri) -> ClientRequest {
        ClientRequest::scoped(
            method,
            uri,
            self.properties.clone(),
            self.system.clone(),
            self.default_headers.clone(),
        )
    }
}

/// A configured client bound to one connector.
pub struct Client {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
}

impl Client {
    /// Build a client on the default hyper connector.
    pub fn new(config: ClientConfig) -> Result<Self, ConnectorError> {
        Self::with_provider(config, &HyperConnectorProvider::new())
    }

    pub fn with_provider(
        config: ClientConfig,
        provider: &dyn ConnectorProvider,
    ) -> Result<Self, ConnectorError> {
        let connector = provider.connector(&config)?;
        tracing::debug!(connector = %connector.name(), "Client created");
        Ok(Self { config, connector })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn request(&self, method: Method, uri: Uri) -> ClientRequest {
        self.config.request(method, uri)
    }

    /// Start a GET request from a URI string.
    pub fn get(&self, uri: &str) -> Result<ClientRequest, ConnectorError> {
        let uri = uri
            .parse::<Uri>()
            .map_err(|e| ConnectorError::InvalidRequest(format!("{}: {}", uri, e)))?;
        Ok(self.request(Method::GET, uri))
    }

    /// Execute and wait for the response head.
    pub async fn execute(&self, request: ClientRequest) -> Result<ClientResponse, ConnectorError> {
        self.connector.apply(request).await
    }

    /// Execute on the connector's worker pool; `callback` sees the outcome.
    pub fn execute_async(&self, request: ClientRequest, callback: Box<dyn AsyncCallback>) -> AsyncHandle {
        self.connector.apply_async(request, callback)
    }

    pub fn close(&self) {
        self.connector.close();
    }
}
