//! Connector providers.
//!
//! # Data Flow
//! ```text
//! Client::with_provider(config, provider)
//!     → ConnectorProvider::connector(&ClientConfig)
//!         → provider configuration.for_client()   (validated)
//!         → HyperConnector::new()
//!     → Arc<dyn Connector>
//! ```
//!
//! # Design Decisions
//! - Providers are chosen explicitly through a `ProviderRegistry`, never discovered
//! - A provider only carries configuration; connectors own all transport state

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::client::ClientConfig;
use crate::connector::hyper::{HyperConfiguration, HyperConnector};
use crate::connector::Connector;
use crate::error::ConnectorError;

/// Name under which [`ProviderRegistry::with_defaults`] registers the hyper provider.
pub const HYPER_PROVIDER: &str = "hyper";

/// Builds a connector for a client.
pub trait ConnectorProvider: Send + Sync {
    fn connector(&self, client: &ClientConfig) -> Result<Arc<dyn Connector>, ConnectorError>;
}

/// Provider of [`HyperConnector`]s.
#[derive(Debug, Clone, Default)]
pub struct HyperConnectorProvider {
    configuration: Option<HyperConfiguration>,
}

impl HyperConnectorProvider {
    /// Provider that relies on client and system properties only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with connector-level settings below client properties.
    pub fn with_configuration(configuration: HyperConfiguration) -> Self {
        Self {
            configuration: Some(configuration),
        }
    }

    pub fn configuration(&self) -> Option<&HyperConfiguration> {
        self.configuration.as_ref()
    }
}

impl ConnectorProvider for HyperConnectorProvider {
    fn connector(&self, client: &ClientConfig) -> Result<Arc<dyn Connector>, ConnectorError> {
        let base = self
            .configuration
            .clone()
            .unwrap_or_else(HyperConfiguration::with_defaults);
        let configuration = base.for_client(client)?;
        Ok(Arc::new(HyperConnector::new(configuration, client)))
    }
}

impl PartialEq for HyperConnectorProvider {
    fn eq(&self, other: &Self) -> bool {
        self.configuration == other.configuration
    }
}

impl Hash for HyperConnectorProvider {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.configuration.hash(state);
    }
}

/// Named connector providers, assembled at startup.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ConnectorProvider>>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the hyper provider under [`HYPER_PROVIDER`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(HYPER_PROVIDER, Arc::new(HyperConnectorProvider::new()));
        registry
    }

    /// Register `provider` under `name`, returning the provider it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn ConnectorProvider>,
    ) -> Option<Arc<dyn ConnectorProvider>> {
        let name = name.into();
        tracing::debug!(provider = %name, "Connector provider registered");
        self.providers.insert(name, provider)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ConnectorProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Build a connector with the provider registered under `name`.
    pub fn connector(&self, name: &str, client: &ClientConfig) -> Result<Arc<dyn Connector>, ConnectorError> {
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| ConnectorError::InvalidRequest(format!("no connector provider named {}", name)))?;
        provider.connector(client)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("ProviderRegistry").field("providers", &names).finish()
    }
}
