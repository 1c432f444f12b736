//! Well-known property keys.
//!
//! Every key lives under [`FRAMEWORK_PREFIX`]. Properties under that prefix, and
//! configuration keys behind a configuration prefix, are never forwarded onto
//! the transport request.

/// Reserved prefix of all framework-owned property names.
pub const FRAMEWORK_PREFIX: &str = "restlink.";
/// Namespace of every configuration key, with or without a configuration prefix.
const CONFIG_NAMESPACE: &str = "restlink.config.";

/// Carries a fully configured `ConnectorConfiguration` override object.
pub const CONNECTOR_CONFIGURATION: &str = "restlink.config.client.connectorConfiguration";

/// Connect timeout in milliseconds; 0 disables it.
pub const CONNECT_TIMEOUT: &str = "restlink.config.client.connectTimeout";
/// Read timeout in milliseconds; 0 disables it.
pub const READ_TIMEOUT: &str = "restlink.config.client.readTimeout";
pub const FOLLOW_REDIRECTS: &str = "restlink.config.client.followRedirects";
pub const EXPECT_100_CONTINUE: &str = "restlink.config.client.request.expect.100.continue.processing";
/// Minimum entity size in bytes that triggers `Expect: 100-continue`.
pub const EXPECT_100_CONTINUE_THRESHOLD: &str =
    "restlink.config.client.request.expect.100.continue.threshold.size";
pub const PROXY_URI: &str = "restlink.config.client.proxy.uri";
pub const PROXY_USERNAME: &str = "restlink.config.client.proxy.username";
pub const PROXY_PASSWORD: &str = "restlink.config.client.proxy.password";
pub const SSL_CONTEXT_SUPPLIER: &str = "restlink.config.client.ssl.context.supplier";
pub const SNI_HOST_NAME: &str = "restlink.config.client.sniHostName";
pub const ASYNC_THREAD_POOL_SIZE: &str = "restlink.config.client.async.threadPoolSize";
/// `BUFFERED` or `CHUNKED`.
pub const REQUEST_ENTITY_PROCESSING: &str = "restlink.config.client.request.entity.processing";
pub const CHUNKED_ENCODING_SIZE: &str = "restlink.config.client.chunkedEncodingSize";
/// `HTTP/1.1` or `HTTP/2`.
pub const HTTP_VERSION: &str = "restlink.config.client.http.version";
pub const FIXED_LENGTH_STREAMING: &str = "restlink.config.client.fixedLengthStreaming";

pub const MAX_TOTAL_CONNECTIONS: &str = "restlink.config.hyper.maxTotalConnections";
pub const MAX_CONNECTIONS_PER_DESTINATION: &str = "restlink.config.hyper.maxConnectionsPerDestination";
pub const IDLE_CONNECTION_PRUNE_TIMEOUT: &str = "restlink.config.hyper.idleConnectionPruneTimeout";
pub const MAX_REDIRECTS: &str = "restlink.config.hyper.maxRedirects";
pub const PRESERVE_METHOD_ON_REDIRECT: &str = "restlink.config.hyper.preserveMethodOnRedirect";
pub const REDIRECT_CONTROLLER: &str = "restlink.config.hyper.redirectController";
pub const CONNECTION_CONTROLLER: &str = "restlink.config.hyper.connectionController";
pub const MAX_HEADER_SIZE: &str = "restlink.config.hyper.maxHeaderSize";
pub const MAX_INITIAL_LINE_LENGTH: &str = "restlink.config.hyper.maxInitialLineLength";
pub const FILTER_HEADERS_FOR_PROXY: &str = "restlink.config.hyper.filterHeadersForProxy";

/// True if `name` belongs to the framework and must stay off the wire.
pub fn is_framework_property(name: &str) -> bool {
    name.starts_with(FRAMEWORK_PREFIX) || name.contains(CONFIG_NAMESPACE)
}
