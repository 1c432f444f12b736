//! Layered connector configuration.
//!
//! # Data Flow
//! ```text
//! built-in defaults (init)
//!     → connector template        (provider construction, never mutated again)
//!     → for_client()              copy + client override object + raw client/system properties
//!     → for_request()             copy + request override object + raw request chain
//!     → read by the connector, then dropped with the request
//! ```
//!
//! # Precedence (highest wins)
//! raw property on the request chain > request override object >
//! client override object > connector value > built-in default.
//!
//! Override objects are honoured only when their prefix is empty or equal to the
//! prefix of the configuration being resolved; otherwise they are ignored whole.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use http::Uri;

use crate::client::{ClientConfig, ClientRequest};
use crate::config::keys;
use crate::config::parse;
use crate::config::properties::{PropertyChain, PropertySource, PropertyValue};
use crate::config::property_ref::PropertyRef;
use crate::config::settings::{self, descriptor, Descriptor, Setting, SettingTable};
use crate::config::types::{HttpVersion, RequestEntityProcessing, SslContextSupplier};
use crate::error::ConfigError;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_EXPECT_100_CONTINUE_THRESHOLD: u64 = 64 * 1024;

/// Transport-specific settings layered on top of [`CoreSettings`].
pub trait SettingsExtension: Clone + Default + fmt::Debug + Send + Sync + 'static {
    fn settings() -> SettingTable<Self>;

    /// Range checks run when client properties are combined.
    fn validate(&self, _prefix: &str) -> Result<(), ConfigError> {
        Ok(())
    }
}

impl SettingsExtension for () {
    fn settings() -> SettingTable<Self> {
        &[]
    }
}

/// Settings shared by every connector.
#[derive(Debug, Clone, Default)]
pub struct CoreSettings {
    /// Milliseconds; 0 disables the timeout.
    pub connect_timeout: PropertyRef<u32>,
    /// Milliseconds; 0 disables the timeout.
    pub read_timeout: PropertyRef<u32>,
    pub follow_redirects: PropertyRef<bool>,
    pub expect_100_continue: PropertyRef<bool>,
    pub expect_100_continue_threshold: PropertyRef<u64>,
    pub proxy_uri: PropertyRef<Uri>,
    pub proxy_username: PropertyRef<String>,
    pub proxy_password: PropertyRef<String>,
    pub ssl_context: PropertyRef<SslContextSupplier>,
    pub sni_hostname: PropertyRef<String>,
    /// Worker threads for asynchronous execution; 0 picks the runtime default.
    pub async_thread_pool_size: PropertyRef<i64>,
    pub request_entity_processing: PropertyRef<RequestEntityProcessing>,
    pub chunk_size: PropertyRef<usize>,
    pub http_version: PropertyRef<HttpVersion>,
    pub fixed_length_streaming: PropertyRef<bool>,
}

static CONNECT_TIMEOUT: Descriptor<CoreSettings, u32> = descriptor!(
    CoreSettings, connect_timeout: u32, keys::CONNECT_TIMEOUT, parse::integer::<u32>, default = Some(0)
);
static READ_TIMEOUT: Descriptor<CoreSettings, u32> = descriptor!(
    CoreSettings, read_timeout: u32, keys::READ_TIMEOUT, parse::integer::<u32>, default = Some(0)
);
static FOLLOW_REDIRECTS: Descriptor<CoreSettings, bool> = descriptor!(
    CoreSettings, follow_redirects: bool, keys::FOLLOW_REDIRECTS, parse::boolean, default = Some(true)
);
static EXPECT_100_CONTINUE: Descriptor<CoreSettings, bool> = descriptor!(
    CoreSettings, expect_100_continue: bool, keys::EXPECT_100_CONTINUE, parse::boolean, default = Some(false)
);
static EXPECT_100_CONTINUE_THRESHOLD: Descriptor<CoreSettings, u64> = descriptor!(
    CoreSettings, expect_100_continue_threshold: u64, keys::EXPECT_100_CONTINUE_THRESHOLD,
    parse::integer::<u64>, default = Some(DEFAULT_EXPECT_100_CONTINUE_THRESHOLD)
);
static PROXY_URI: Descriptor<CoreSettings, Uri> = descriptor!(
    CoreSettings, proxy_uri: Uri, keys::PROXY_URI, parse::parsed::<Uri>, default = None
);
static PROXY_USERNAME: Descriptor<CoreSettings, String> = descriptor!(
    CoreSettings, proxy_username: String, keys::PROXY_USERNAME, parse::string, default = None
);
static PROXY_PASSWORD: Descriptor<CoreSettings, String> = descriptor!(
    CoreSettings, proxy_password: String, keys::PROXY_PASSWORD, parse::string, default = None
);
static SSL_CONTEXT: Descriptor<CoreSettings, SslContextSupplier> = descriptor!(
    CoreSettings, ssl_context: SslContextSupplier, keys::SSL_CONTEXT_SUPPLIER,
    parse::object::<SslContextSupplier>, default = None, eq = SslContextSupplier::same
);
static SNI_HOSTNAME: Descriptor<CoreSettings, String> = descriptor!(
    CoreSettings, sni_hostname: String, keys::SNI_HOST_NAME, parse::string, default = None
);
static ASYNC_THREAD_POOL_SIZE: Descriptor<CoreSettings, i64> = descriptor!(
    CoreSettings, async_thread_pool_size: i64, keys::ASYNC_THREAD_POOL_SIZE,
    parse::integer::<i64>, default = Some(0)
);
static REQUEST_ENTITY_PROCESSING: Descriptor<CoreSettings, RequestEntityProcessing> = descriptor!(
    CoreSettings, request_entity_processing: RequestEntityProcessing, keys::REQUEST_ENTITY_PROCESSING,
    parse::parsed::<RequestEntityProcessing>, default = Some(RequestEntityProcessing::Buffered)
);
static CHUNK_SIZE: Descriptor<CoreSettings, usize> = descriptor!(
    CoreSettings, chunk_size: usize, keys::CHUNKED_ENCODING_SIZE, parse::integer::<usize>,
    default = Some(DEFAULT_CHUNK_SIZE)
);
static HTTP_VERSION: Descriptor<CoreSettings, HttpVersion> = descriptor!(
    CoreSettings, http_version: HttpVersion, keys::HTTP_VERSION, parse::parsed::<HttpVersion>,
    default = Some(HttpVersion::Http1)
);
static FIXED_LENGTH_STREAMING: Descriptor<CoreSettings, bool> = descriptor!(
    CoreSettings, fixed_length_streaming: bool, keys::FIXED_LENGTH_STREAMING, parse::boolean,
    default = Some(false)
);

static CORE_SETTINGS: &[&dyn Setting<CoreSettings>] = &[
    &CONNECT_TIMEOUT,
    &READ_TIMEOUT,
    &FOLLOW_REDIRECTS,
    &EXPECT_100_CONTINUE,
    &EXPECT_100_CONTINUE_THRESHOLD,
    &PROXY_URI,
    &PROXY_USERNAME,
    &PROXY_PASSWORD,
    &SSL_CONTEXT,
    &SNI_HOSTNAME,
    &ASYNC_THREAD_POOL_SIZE,
    &REQUEST_ENTITY_PROCESSING,
    &CHUNK_SIZE,
    &HTTP_VERSION,
    &FIXED_LENGTH_STREAMING,
];

impl CoreSettings {
    pub fn table() -> SettingTable<Self> {
        CORE_SETTINGS
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout.get().copied().map(u64::from))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout.get().copied().map(u64::from))
    }

    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects.get().copied().unwrap_or(true)
    }

    pub fn entity_processing(&self) -> RequestEntityProcessing {
        self.request_entity_processing
            .get()
            .copied()
            .unwrap_or(RequestEntityProcessing::Buffered)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get().copied().unwrap_or(DEFAULT_CHUNK_SIZE).max(1)
    }

    pub fn http_version(&self) -> HttpVersion {
        self.http_version.get().copied().unwrap_or(HttpVersion::Http1)
    }
}

fn millis(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|ms| *ms > 0).map(Duration::from_millis)
}

/// A layered, mergeable bag of transport-tuning settings.
///
/// `X` carries the settings of one transport; `()` is the plain configuration
/// every transport understands.
#[derive(Debug, Clone, Default)]
pub struct ConnectorConfiguration<X: SettingsExtension = ()> {
    prefix: PropertyRef<String>,
    core: CoreSettings,
    ext: X,
}

impl<X: SettingsExtension> ConnectorConfiguration<X> {
    /// A configuration with every setting unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration holding only the built-in defaults.
    pub fn with_defaults() -> Self {
        let mut configuration = Self::new();
        configuration.init();
        configuration
    }

    /// Apply built-in defaults to every setting that is still unset.
    pub fn init(&mut self) {
        self.prefix.if_empty_set(Some(String::new()));
        settings::init_all(CoreSettings::table(), &mut self.core);
        settings::init_all(X::settings(), &mut self.ext);
    }

    /// Layer every set value of `other` over this configuration. The prefix is
    /// not touched.
    pub fn set_non_empty(&mut self, other: &Self) {
        settings::merge_all(CoreSettings::table(), &mut self.core, &other.core);
        settings::merge_all(X::settings(), &mut self.ext, &other.ext);
    }

    /// Layer the core settings of a plain configuration over this one.
    pub fn set_non_empty_core(&mut self, other: &ConnectorConfiguration) {
        settings::merge_all(CoreSettings::table(), &mut self.core, &other.core);
    }

    /// Defaults, then this instance's set values on top.
    pub fn copy(&self) -> Self {
        let mut copy = Self::with_defaults();
        copy.prefix.set_non_empty(&self.prefix);
        copy.set_non_empty(self);
        copy
    }

    pub fn prefix(&self) -> &str {
        self.prefix.get().map(String::as_str).unwrap_or("")
    }

    pub fn prefixed(&self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }

    /// Whether an override object declaring `prefix` may merge into this one.
    pub fn accepts(&self, prefix: &str) -> bool {
        prefix.is_empty() || prefix == self.prefix()
    }

    pub fn core(&self) -> &CoreSettings {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CoreSettings {
        &mut self.core
    }

    pub fn ext(&self) -> &X {
        &self.ext
    }

    pub fn ext_mut(&mut self) -> &mut X {
        &mut self.ext
    }

    /// Merge override objects found under the plain and the prefixed
    /// [`keys::CONNECTOR_CONFIGURATION`] key of `source`.
    pub fn merge_overrides(&mut self, source: &dyn PropertySource) {
        let plain = keys::CONNECTOR_CONFIGURATION;
        let prefixed = self.prefixed(plain);

        let mut candidates = vec![plain.to_string()];
        if prefixed != plain {
            candidates.push(prefixed);
        }

        for key in candidates {
            if let Some(value) = source.property(&key) {
                self.merge_override_value(&key, value);
            }
        }
    }

    fn merge_override_value(&mut self, key: &str, value: &PropertyValue) {
        if let Some(other) = value.downcast_ref::<Self>() {
            if self.accepts(other.prefix()) {
                self.set_non_empty(other);
            } else {
                tracing::trace!(key, prefix = other.prefix(), "Override prefix does not match");
            }
        } else if let Some(other) = value.downcast_ref::<ConnectorConfiguration>() {
            if self.accepts(other.prefix()) {
                self.set_non_empty_core(other);
            } else {
                tracing::trace!(key, prefix = other.prefix(), "Override prefix does not match");
            }
        } else {
            tracing::warn!(key, value = %value, "Ignoring connector configuration of unexpected type");
        }
    }

    /// Resolve raw properties of `source` into every setting.
    pub fn resolve_properties(&mut self, source: &dyn PropertySource) {
        let prefix = self.prefix().to_string();
        settings::resolve_all(CoreSettings::table(), &mut self.core, source, &prefix);
        settings::resolve_all(X::settings(), &mut self.ext, source, &prefix);
    }

    /// Derive the client-scoped configuration.
    ///
    /// Fails fast on values that can never be honoured, such as negative pool sizes.
    pub fn for_client(&self, client: &ClientConfig) -> Result<Self, ConfigError> {
        let mut configuration = self.copy();
        configuration.merge_overrides(client.properties());

        let chain = PropertyChain::new()
            .then(client.properties())
            .then(client.system_properties());
        configuration.resolve_properties(&chain);
        configuration.validate()?;
        Ok(configuration)
    }

    /// Derive the request-scoped configuration from a client-scoped one.
    pub fn for_request(&self, request: &ClientRequest) -> Self {
        let mut configuration = self.copy();
        configuration.merge_overrides(request.properties());
        configuration.resolve_properties(&request.resolver());
        configuration
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(size) = self.core.async_thread_pool_size.get() {
            if *size < 0 {
                return Err(ConfigError::InvalidValue {
                    key: self.prefixed(keys::ASYNC_THREAD_POOL_SIZE),
                    value: size.to_string(),
                    reason: "must not be negative",
                });
            }
        }
        self.ext.validate(self.prefix())
    }

    pub fn prefix_with(mut self, prefix: impl Into<String>) -> Self {
        self.prefix.set_value(prefix.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.core.connect_timeout.set_value(saturating_millis(timeout));
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.core.read_timeout.set_value(saturating_millis(timeout));
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.core.follow_redirects.set_value(follow);
        self
    }

    pub fn expect_100_continue(mut self, enabled: bool) -> Self {
        self.core.expect_100_continue.set_value(enabled);
        self
    }

    pub fn expect_100_continue_threshold(mut self, bytes: u64) -> Self {
        self.core.expect_100_continue_threshold.set_value(bytes);
        self
    }

    pub fn proxy_uri(mut self, uri: Uri) -> Self {
        self.core.proxy_uri.set_value(uri);
        self
    }

    pub fn proxy_username(mut self, username: impl Into<String>) -> Self {
        self.core.proxy_username.set_value(username.into());
        self
    }

    pub fn proxy_password(mut self, password: impl Into<String>) -> Self {
        self.core.proxy_password.set_value(password.into());
        self
    }

    pub fn ssl_context(mut self, supplier: SslContextSupplier) -> Self {
        self.core.ssl_context.set_value(supplier);
        self
    }

    pub fn sni_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.core.sni_hostname.set_value(hostname.into());
        self
    }

    pub fn async_thread_pool_size(mut self, size: i64) -> Self {
        self.core.async_thread_pool_size.set_value(size);
        self
    }

    pub fn request_entity_processing(mut self, mode: RequestEntityProcessing) -> Self {
        self.core.request_entity_processing.set_value(mode);
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.core.chunk_size.set_value(bytes);
        self
    }

    pub fn http_version(mut self, version: HttpVersion) -> Self {
        self.core.http_version.set_value(version);
        self
    }

    pub fn fixed_length_streaming(mut self, enabled: bool) -> Self {
        self.core.fixed_length_streaming.set_value(enabled);
        self
    }
}

fn saturating_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

impl<X: SettingsExtension> PartialEq for ConnectorConfiguration<X> {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
            && settings::same_all(CoreSettings::table(), &self.core, &other.core)
            && settings::same_all(X::settings(), &self.ext, &other.ext)
    }
}

impl<X: SettingsExtension> Eq for ConnectorConfiguration<X> {}

impl<X: SettingsExtension> Hash for ConnectorConfiguration<X> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.prefix.hash(state);
        settings::hash_all(CoreSettings::table(), &self.core, state);
        settings::hash_all(X::settings(), &self.ext, state);
    }
}
