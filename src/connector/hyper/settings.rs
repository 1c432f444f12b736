//! Settings understood only by the hyper connector.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientRequest;
use crate::config::connector::{ConnectorConfiguration, CoreSettings, SettingsExtension};
use crate::config::keys;
use crate::config::parse;
use crate::config::property_ref::PropertyRef;
use crate::config::settings::{descriptor, Descriptor, Setting, SettingTable};
use crate::connector::redirect::RedirectController;
use crate::connector::transport::ProxyTarget;
use crate::error::{ConfigError, ConnectorError};

pub const DEFAULT_MAX_REDIRECTS: u32 = 5;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8192;
pub const DEFAULT_MAX_INITIAL_LINE_LENGTH: usize = 4096;

/// hyper refuses read buffers smaller than this.
const MIN_READ_BUFFER: usize = 8192;

/// Partitions requests into separate connection pools.
pub trait ConnectionController: fmt::Debug + Send + Sync {
    /// Requests with equal groups share connections. `None` is the default pool.
    fn connection_group(&self, request: &ClientRequest) -> Option<String>;
}

/// Configuration of the hyper connector.
pub type HyperConfiguration = ConnectorConfiguration<HyperSettings>;

#[derive(Debug, Clone, Default)]
pub struct HyperSettings {
    /// Upper bound on requests in flight across all destinations; 0 is unbounded.
    pub max_total_connections: PropertyRef<i64>,
    /// Idle connections kept per destination; 0 keeps the transport default.
    pub max_connections_per_destination: PropertyRef<i64>,
    /// Milliseconds an idle pooled connection is kept; 0 keeps it forever.
    pub idle_connection_prune_timeout: PropertyRef<u64>,
    pub max_redirects: PropertyRef<u32>,
    pub preserve_method_on_redirect: PropertyRef<bool>,
    pub redirect_controller: PropertyRef<Arc<dyn RedirectController>>,
    pub connection_controller: PropertyRef<Arc<dyn ConnectionController>>,
    pub max_header_size: PropertyRef<usize>,
    pub max_initial_line_length: PropertyRef<usize>,
    /// When false, client default headers are also sent on CONNECT requests.
    pub filter_headers_for_proxy: PropertyRef<bool>,
}

static MAX_TOTAL_CONNECTIONS: Descriptor<HyperSettings, i64> = descriptor!(
    HyperSettings, max_total_connections: i64, keys::MAX_TOTAL_CONNECTIONS,
    parse::integer::<i64>, default = Some(0)
);
static MAX_CONNECTIONS_PER_DESTINATION: Descriptor<HyperSettings, i64> = descriptor!(
    HyperSettings, max_connections_per_destination: i64, keys::MAX_CONNECTIONS_PER_DESTINATION,
    parse::integer::<i64>, default = Some(0)
);
static IDLE_CONNECTION_PRUNE_TIMEOUT: Descriptor<HyperSettings, u64> = descriptor!(
    HyperSettings, idle_connection_prune_timeout: u64, keys::IDLE_CONNECTION_PRUNE_TIMEOUT,
    parse::integer::<u64>, default = Some(DEFAULT_IDLE_TIMEOUT_MS)
);
static MAX_REDIRECTS: Descriptor<HyperSettings, u32> = descriptor!(
    HyperSettings, max_redirects: u32, keys::MAX_REDIRECTS, parse::integer::<u32>,
    default = Some(DEFAULT_MAX_REDIRECTS)
);
static PRESERVE_METHOD_ON_REDIRECT: Descriptor<HyperSettings, bool> = descriptor!(
    HyperSettings, preserve_method_on_redirect: bool, keys::PRESERVE_METHOD_ON_REDIRECT,
    parse::boolean, default = Some(true)
);
static REDIRECT_CONTROLLER: Descriptor<HyperSettings, Arc<dyn RedirectController>> = descriptor!(
    HyperSettings, redirect_controller: Arc<dyn RedirectController>, keys::REDIRECT_CONTROLLER,
    parse::object::<Arc<dyn RedirectController>>, default = None, eq = Arc::ptr_eq
);
static CONNECTION_CONTROLLER: Descriptor<HyperSettings, Arc<dyn ConnectionController>> = descriptor!(
    HyperSettings, connection_controller: Arc<dyn ConnectionController>, keys::CONNECTION_CONTROLLER,
    parse::object::<Arc<dyn ConnectionController>>, default = None, eq = Arc::ptr_eq
);
static MAX_HEADER_SIZE: Descriptor<HyperSettings, usize> = descriptor!(
    HyperSettings, max_header_size: usize, keys::MAX_HEADER_SIZE, parse::integer::<usize>,
    default = Some(DEFAULT_MAX_HEADER_SIZE)
);
static MAX_INITIAL_LINE_LENGTH: Descriptor<HyperSettings, usize> = descriptor!(
    HyperSettings, max_initial_line_length: usize, keys::MAX_INITIAL_LINE_LENGTH,
    parse::integer::<usize>, default = Some(DEFAULT_MAX_INITIAL_LINE_LENGTH)
);
static FILTER_HEADERS_FOR_PROXY: Descriptor<HyperSettings, bool> = descriptor!(
    HyperSettings, filter_headers_for_proxy: bool, keys::FILTER_HEADERS_FOR_PROXY,
    parse::boolean, default = Some(true)
);

static HYPER_SETTINGS: &[&dyn Setting<HyperSettings>] = &[
    &MAX_TOTAL_CONNECTIONS,
    &MAX_CONNECTIONS_PER_DESTINATION,
    &IDLE_CONNECTION_PRUNE_TIMEOUT,
    &MAX_REDIRECTS,
    &PRESERVE_METHOD_ON_REDIRECT,
    &REDIRECT_CONTROLLER,
    &CONNECTION_CONTROLLER,
    &MAX_HEADER_SIZE,
    &MAX_INITIAL_LINE_LENGTH,
    &FILTER_HEADERS_FOR_PROXY,
];

impl SettingsExtension for HyperSettings {
    fn settings() -> SettingTable<Self> {
        HYPER_SETTINGS
    }

    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        let limits = [
            (keys::MAX_TOTAL_CONNECTIONS, &self.max_total_connections),
            (keys::MAX_CONNECTIONS_PER_DESTINATION, &self.max_connections_per_destination),
        ];
        for (key, cell) in limits {
            if let Some(value) = cell.get().filter(|v| **v < 0) {
                return Err(ConfigError::InvalidValue {
                    key: format!("{}{}", prefix, key),
                    value: value.to_string(),
                    reason: "must not be negative",
                });
            }
        }
        Ok(())
    }
}

/// Buffer limits handed to the HTTP/1 codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    pub max_buf_size: usize,
}

impl HyperSettings {
    pub fn total_connection_limit(&self) -> Option<usize> {
        positive(self.max_total_connections.get())
    }

    pub fn per_destination_limit(&self) -> Option<usize> {
        positive(self.max_connections_per_destination.get())
    }

    /// `None` keeps idle connections until the peer closes them.
    pub fn idle_timeout(&self) -> Option<Duration> {
        let ms = self
            .idle_connection_prune_timeout
            .get()
            .copied()
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_MS);
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    pub fn redirect_limit(&self) -> u32 {
        self.max_redirects.get().copied().unwrap_or(DEFAULT_MAX_REDIRECTS)
    }

    pub fn preserves_method(&self) -> bool {
        self.preserve_method_on_redirect.get().copied().unwrap_or(true)
    }

    pub fn filters_proxy_headers(&self) -> bool {
        self.filter_headers_for_proxy.get().copied().unwrap_or(true)
    }

    /// Read buffer bound: initial line, header block and one body chunk.
    pub fn codec(&self, chunk_size: usize) -> CodecLimits {
        let line = self
            .max_initial_line_length
            .get()
            .copied()
            .unwrap_or(DEFAULT_MAX_INITIAL_LINE_LENGTH);
        let headers = self.max_header_size.get().copied().unwrap_or(DEFAULT_MAX_HEADER_SIZE);
        let max_buf_size = line
            .saturating_add(headers)
            .saturating_add(chunk_size)
            .max(MIN_READ_BUFFER);
        CodecLimits { max_buf_size }
    }
}

fn positive(value: Option<&i64>) -> Option<usize> {
    value
        .copied()
        .filter(|v| *v > 0)
        .and_then(|v| usize::try_from(v).ok())
}

/// The proxy a request should use. An unset or null proxy URI means a direct
/// connection.
pub fn proxy_target(core: &CoreSettings) -> Result<Option<ProxyTarget>, ConnectorError> {
    let Some(uri) = core.proxy_uri.get() else {
        return Ok(None);
    };
    let username = core.proxy_username.get().map(String::as_str);
    let password = core.proxy_password.get().map(String::as_str);
    ProxyTarget::new(uri, username, password).map(Some)
}

impl ConnectorConfiguration<HyperSettings> {
    pub fn max_total_connections(mut self, max: i64) -> Self {
        self.ext_mut().max_total_connections.set_value(max);
        self
    }

    pub fn max_connections_per_destination(mut self, max: i64) -> Self {
        self.ext_mut().max_connections_per_destination.set_value(max);
        self
    }

    pub fn idle_connection_prune_timeout(mut self, timeout: Duration) -> Self {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.ext_mut().idle_connection_prune_timeout.set_value(ms);
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.ext_mut().max_redirects.set_value(max);
        self
    }

    pub fn preserve_method_on_redirect(mut self, preserve: bool) -> Self {
        self.ext_mut().preserve_method_on_redirect.set_value(preserve);
        self
    }

    pub fn redirect_controller(mut self, controller: Arc<dyn RedirectController>) -> Self {
        self.ext_mut().redirect_controller.set_value(controller);
        self
    }

    pub fn connection_controller(mut self, controller: Arc<dyn ConnectionController>) -> Self {
        self.ext_mut().connection_controller.set_value(controller);
        self
    }

    pub fn max_header_size(mut self, bytes: usize) -> Self {
        self.ext_mut().max_header_size.set_value(bytes);
        self
    }

    pub fn max_initial_line_length(mut self, bytes: usize) -> Self {
        self.ext_mut().max_initial_line_length.set_value(bytes);
        self
    }

    pub fn filter_headers_for_proxy(mut self, filter: bool) -> Self {
        self.ext_mut().filter_headers_for_proxy.set_value(filter);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::config::properties::Properties;
    use crate::connector::redirect::SameOriginRedirects;
    use http::{Method, Uri};

    #[test]
    fn test_defaults() {
        let configuration = HyperConfiguration::with_defaults();
        let settings = configuration.ext();
        assert_eq!(settings.redirect_limit(), 5);
        assert!(settings.preserves_method());
        assert!(settings.filters_proxy_headers());
        assert_eq!(settings.total_connection_limit(), None);
        assert_eq!(settings.idle_timeout(), Some(Duration::from_secs(60)));
        assert!(settings.redirect_controller.is_empty());
    }

    #[test]
    fn test_codec_limits() {
        let settings = HyperConfiguration::with_defaults().ext().clone();
        assert_eq!(settings.codec(4096).max_buf_size, 4096 + 8192 + 4096);

        let tiny = HyperConfiguration::with_defaults()
            .max_header_size(10)
            .max_initial_line_length(10);
        assert_eq!(tiny.ext().codec(10).max_buf_size, MIN_READ_BUFFER);
    }

    #[test]
    fn test_negative_limits_rejected_for_client() {
        let client = ClientConfig::new()
            .with_properties(Properties::new().with(keys::MAX_CONNECTIONS_PER_DESTINATION, -3));
        let err = HyperConfiguration::new().for_client(&client).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, keys::MAX_CONNECTIONS_PER_DESTINATION);
                assert_eq!(value, "-3");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_base_override_merges_core_only() {
        let base = ConnectorConfiguration::<()>::new().read_timeout(Duration::from_millis(75));
        let mut properties = Properties::new();
        properties.set_configuration(base);

        let template = HyperConfiguration::new().max_redirects(1);
        let scoped = template.for_client(&ClientConfig::new().with_properties(properties)).unwrap();
        assert_eq!(scoped.core().read_timeout.get(), Some(&75));
        assert_eq!(scoped.ext().redirect_limit(), 1);
    }

    #[test]
    fn test_hyper_override_object_carries_extension() {
        let controller: Arc<dyn RedirectController> = Arc::new(SameOriginRedirects);
        let override_config = HyperConfiguration::new()
            .max_total_connections(4)
            .redirect_controller(controller.clone());

        let client = ClientConfig::new();
        let scoped = HyperConfiguration::new().for_client(&client).unwrap();
        let mut request = client.request(Method::GET, Uri::from_static("http://localhost/"));
        request.properties_mut().set_configuration(override_config);

        let resolved = scoped.for_request(&request);
        assert_eq!(resolved.ext().total_connection_limit(), Some(4));
        let resolved_controller = resolved.ext().redirect_controller.get().unwrap();
        assert!(Arc::ptr_eq(resolved_controller, &controller));
    }

    #[test]
    fn test_proxy_target_from_core() {
        let configuration = HyperConfiguration::with_defaults();
        assert!(proxy_target(configuration.core()).unwrap().is_none());

        let configuration = configuration
            .proxy_uri(Uri::from_static("http://proxy.local:3128"))
            .proxy_username("u")
            .proxy_password("p");
        let target = proxy_target(configuration.core()).unwrap().unwrap();
        assert!(target.authorization().is_some());

        let mut disabled = configuration.copy();
        disabled.core_mut().proxy_uri.set(None);
        assert!(proxy_target(disabled.core()).unwrap().is_none());
    }
}
