//! Configuration loading from disk.
//!
//! Connector defaults can be kept in a TOML file and turned into a provider
//! template. Every field is optional; an absent field leaves the setting unset
//! so the built-in default still applies.
//!
//! ```toml
//! connect_timeout_ms = 2000
//! request_entity_processing = "chunked"
//!
//! [proxy]
//! uri = "http://proxy.internal:3128"
//!
//! [hyper]
//! max_total_connections = 64
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use http::Uri;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::keys;
use crate::config::types::{HttpVersion, RequestEntityProcessing};
use crate::connector::hyper::HyperConfiguration;
use crate::error::ConfigError;

/// Read and deserialize a TOML file.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)?;
    let value = toml::from_str(&content)?;
    tracing::debug!(path = %path.display(), "Configuration file loaded");
    Ok(value)
}

/// File form of a connector template.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectorDefaults {
    pub prefix: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub follow_redirects: Option<bool>,
    pub expect_100_continue: Option<bool>,
    pub expect_100_continue_threshold: Option<u64>,
    pub proxy: Option<ProxyDefaults>,
    pub sni_hostname: Option<String>,
    pub async_thread_pool_size: Option<i64>,
    pub request_entity_processing: Option<RequestEntityProcessing>,
    pub chunk_size: Option<usize>,
    pub http_version: Option<HttpVersion>,
    pub fixed_length_streaming: Option<bool>,
    pub hyper: HyperDefaults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyDefaults {
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HyperDefaults {
    pub max_total_connections: Option<i64>,
    pub max_connections_per_destination: Option<i64>,
    pub idle_connection_prune_timeout_ms: Option<u64>,
    pub max_redirects: Option<u32>,
    pub preserve_method_on_redirect: Option<bool>,
    pub max_header_size: Option<usize>,
    pub max_initial_line_length: Option<usize>,
    pub filter_headers_for_proxy: Option<bool>,
}

impl ConnectorDefaults {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    /// Build the connector template described by this file.
    pub fn to_configuration(&self) -> Result<HyperConfiguration, ConfigError> {
        let mut c = HyperConfiguration::new();
        c = apply(c, self.prefix.clone(), HyperConfiguration::prefix_with);
        c = apply(c, self.connect_timeout_ms.map(Duration::from_millis), HyperConfiguration::connect_timeout);
        c = apply(c, self.read_timeout_ms.map(Duration::from_millis), HyperConfiguration::read_timeout);
        c = apply(c, self.follow_redirects, HyperConfiguration::follow_redirects);
        c = apply(c, self.expect_100_continue, HyperConfiguration::expect_100_continue);
        c = apply(
            c,
            self.expect_100_continue_threshold,
            HyperConfiguration::expect_100_continue_threshold,
        );
        c = apply(c, self.sni_hostname.clone(), HyperConfiguration::sni_hostname);
        c = apply(c, self.async_thread_pool_size, HyperConfiguration::async_thread_pool_size);
        c = apply(
            c,
            self.request_entity_processing,
            HyperConfiguration::request_entity_processing,
        );
        c = apply(c, self.chunk_size, HyperConfiguration::chunk_size);
        c = apply(c, self.http_version, HyperConfiguration::http_version);
        c = apply(c, self.fixed_length_streaming, HyperConfiguration::fixed_length_streaming);

        if let Some(proxy) = &self.proxy {
            let uri: Uri = proxy.uri.parse().map_err(|_| ConfigError::InvalidValue {
                key: keys::PROXY_URI.to_string(),
                value: proxy.uri.clone(),
                reason: "not a valid URI",
            })?;
            c = c.proxy_uri(uri);
            c = apply(c, proxy.username.clone(), HyperConfiguration::proxy_username);
            c = apply(c, proxy.password.clone(), HyperConfiguration::proxy_password);
        }

        let hyper = &self.hyper;
        c = apply(c, hyper.max_total_connections, HyperConfiguration::max_total_connections);
        c = apply(
            c,
            hyper.max_connections_per_destination,
            HyperConfiguration::max_connections_per_destination,
        );
        c = apply(
            c,
            hyper.idle_connection_prune_timeout_ms.map(Duration::from_millis),
            HyperConfiguration::idle_connection_prune_timeout,
        );
        c = apply(c, hyper.max_redirects, HyperConfiguration::max_redirects);
        c = apply(
            c,
            hyper.preserve_method_on_redirect,
            HyperConfiguration::preserve_method_on_redirect,
        );
        c = apply(c, hyper.max_header_size, HyperConfiguration::max_header_size);
        c = apply(c, hyper.max_initial_line_length, HyperConfiguration::max_initial_line_length);
        c = apply(c, hyper.filter_headers_for_proxy, HyperConfiguration::filter_headers_for_proxy);

        c.validate()?;
        Ok(c)
    }
}

fn apply<C, T>(configuration: C, value: Option<T>, set: impl FnOnce(C, T) -> C) -> C {
    match value {
        Some(value) => set(configuration, value),
        None => configuration,
    }
}
