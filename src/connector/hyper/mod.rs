//! Connector backed by the hyper-util client.
//!
//! # Data Flow
//! ```text
//! ClientRequest
//!     → configuration.for_request()        request-scoped settings
//!     → client_for(TransportKey)           cached hyper client per transport key
//!     → Outgoing::prepare()                headers, framing, proxy credentials
//!     → client.request() under read timeout and connection budget
//!     → redirect loop (settings + controller)
//!     → ClientResponse
//! ```
//!
//! # Design Decisions
//! - Connect timeout and TLS are fixed when the connector is built
//! - One hyper client (and pool) per distinct transport key: proxy, protocol
//!   version, connection group, codec buffer, SNI name and pool limits
//! - The connection budget is a semaphore permit carried by the response

pub mod request;
pub mod settings;

pub use request::{entity_framing, expects_continue, Framing};
pub use settings::{proxy_target, CodecLimits, ConnectionController, HyperConfiguration, HyperSettings};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::body::Body;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use http::header::LOCATION;
use http::{HeaderMap, Request, Response, Uri};
use hyper::body::{Body as _, Incoming};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::client::response::Lease;
use crate::client::{ClientConfig, ClientRequest, ClientResponse, ResponseEntity};
use crate::config::types::HttpVersion;
use crate::connector::pool::WorkerPool;
use crate::connector::redirect::{self, RedirectAttempt};
use crate::connector::transport::{self, ProxyTarget, TlsContext, TransportConnector};
use crate::connector::{self as contract, AsyncCallback, AsyncHandle, Connector};
use crate::error::ConnectorError;
use crate::observability::metrics;

use request::Outgoing;

type HyperClient = Client<TransportConnector, Body>;

/// Thread name of the asynchronous worker pool.
pub const WORKER_THREAD_NAME: &str = "restlink-async";

/// Everything a cached transport client is built from.
///
/// Request-level overrides of any of these select (or build) a different client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TransportKey {
    proxy: Option<ProxyTarget>,
    http2: bool,
    group: Option<String>,
    max_buf_size: usize,
    sni_hostname: Option<String>,
    filter_proxy_headers: bool,
    idle_timeout: Option<Duration>,
    max_idle_per_host: Option<usize>,
}

impl TransportKey {
    fn new(configuration: &HyperConfiguration, proxy: Option<ProxyTarget>, group: Option<String>) -> Self {
        let core = configuration.core();
        let settings = configuration.ext();
        Self {
            proxy,
            http2: core.http_version() == HttpVersion::Http2,
            group,
            max_buf_size: settings.codec(core.chunk_size()).max_buf_size,
            sni_hostname: core.sni_hostname.cloned(),
            filter_proxy_headers: settings.filters_proxy_headers(),
            idle_timeout: settings.idle_timeout(),
            max_idle_per_host: settings.per_destination_limit(),
        }
    }
}

/// hyper-based [`Connector`].
pub struct HyperConnector {
    shared: Arc<Shared>,
    /// Taken on close; dropping the pool shuts it down in the background.
    workers: Mutex<Option<WorkerPool>>,
}

struct Shared {
    configuration: HyperConfiguration,
    http: HttpConnector,
    tls: Arc<TlsContext>,
    default_headers: HeaderMap,
    clients: DashMap<TransportKey, HyperClient>,
    budget: Option<Arc<Semaphore>>,
    closed: AtomicBool,
}

impl HyperConnector {
    /// Build a connector from an already client-scoped configuration.
    pub fn new(configuration: HyperConfiguration, client: &ClientConfig) -> Self {
        let core = configuration.core();
        let tls = Arc::new(TlsContext::new(core.ssl_context.cloned(), client.tls().cloned()));
        let http = transport::http_connector(core.connect_timeout());
        let budget = configuration
            .ext()
            .total_connection_limit()
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let pool_size = core
            .async_thread_pool_size
            .get()
            .and_then(|size| usize::try_from(*size).ok())
            .unwrap_or(0);

        tracing::debug!(
            prefix = configuration.prefix(),
            connect_timeout = ?core.connect_timeout(),
            max_total_connections = ?configuration.ext().total_connection_limit(),
            async_thread_pool_size = pool_size,
            "Hyper connector created"
        );

        Self {
            shared: Arc::new(Shared {
                configuration,
                http,
                tls,
                default_headers: client.default_headers().clone(),
                clients: DashMap::new(),
                budget,
                closed: AtomicBool::new(false),
            }),
            workers: Mutex::new(Some(WorkerPool::new(WORKER_THREAD_NAME, pool_size))),
        }
    }

    /// The client-scoped configuration requests are derived from.
    pub fn configuration(&self) -> &HyperConfiguration {
        &self.shared.configuration
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl Connector for HyperConnector {
    fn apply(&self, request: ClientRequest) -> BoxFuture<'_, Result<ClientResponse, ConnectorError>> {
        Box::pin(self.shared.clone().execute(request))
    }

    fn apply_async(&self, request: ClientRequest, callback: Box<dyn AsyncCallback>) -> AsyncHandle {
        if self.is_closed() {
            contract::notify(callback, Err(ConnectorError::Closed));
            return AsyncHandle::completed();
        }
        let handle = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(Err(ConnectorError::Closed), WorkerPool::handle);
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                contract::notify(callback, Err(e));
                return AsyncHandle::completed();
            }
        };
        let shared = self.shared.clone();
        AsyncHandle::spawned(handle.spawn(contract::complete(shared.execute(request), callback)))
    }

    fn name(&self) -> String {
        connector_name()
    }

    fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.clients.clear();
            let workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner).take();
            drop(workers);
            tracing::debug!("Hyper connector closed");
        }
    }
}

/// `Hyper Connector restlink/<version> (hyper/1; <os> <arch>)`
pub fn connector_name() -> String {
    format!(
        "Hyper Connector restlink/{} (hyper/1; {} {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

impl Shared {
    async fn execute(self: Arc<Self>, request: ClientRequest) -> Result<ClientResponse, ConnectorError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConnectorError::Closed);
        }

        let started = Instant::now();
        let method = request.method().clone();
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::debug_span!("client_request", %request_id, %method, uri = %request.uri());

        let result = self.dispatch(request).instrument(span).await;
        match &result {
            Ok(response) => {
                tracing::debug!(
                    %request_id,
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Response received"
                );
                metrics::record_client_request(method.as_str(), response.status().as_u16(), started);
            }
            Err(e) => {
                tracing::debug!(%request_id, error = %e, "Request failed");
                metrics::record_client_failure(method.as_str(), e);
            }
        }
        result
    }

    async fn dispatch(&self, request: ClientRequest) -> Result<ClientResponse, ConnectorError> {
        let configuration = self.configuration.for_request(&request);
        let core = configuration.core();
        let settings = configuration.ext();

        let proxy = proxy_target(core)?;
        let group = settings
            .connection_controller
            .get()
            .and_then(|controller| controller.connection_group(&request));
        let client = self.client_for(TransportKey::new(&configuration, proxy.clone(), group));

        let lease: Lease = match &self.budget {
            Some(budget) => Some(Arc::new(
                budget
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| ConnectorError::Closed)?,
            )),
            None => None,
        };

        let mut outgoing = Outgoing::prepare(request, &configuration, proxy.as_ref()).await?;
        let read_timeout = core.read_timeout();
        let mut hops = 0u32;

        loop {
            let response = send(&client, outgoing.to_hyper(), read_timeout).await?;
            if !core.follow_redirects() {
                return Ok(map_response(response, outgoing.uri, lease));
            }

            let Some(hop) = redirect::next_hop(
                response.status(),
                &outgoing.method,
                &outgoing.uri,
                response.headers().get(LOCATION),
                settings.preserves_method(),
            ) else {
                return Ok(map_response(response, outgoing.uri, lease));
            };

            if hop.keep_body && !outgoing.body.is_replayable() {
                tracing::debug!(status = %response.status(), "Streamed entity cannot be replayed; not following redirect");
                return Ok(map_response(response, outgoing.uri, lease));
            }

            if let Some(controller) = settings.redirect_controller.get() {
                let attempt = RedirectAttempt {
                    status: response.status(),
                    method: &hop.method,
                    previous: &outgoing.uri,
                    next: &hop.uri,
                    hops,
                };
                if !controller.follow(&attempt) {
                    return Ok(map_response(response, outgoing.uri, lease));
                }
            }

            let limit = settings.redirect_limit();
            if hops >= limit {
                return Err(ConnectorError::TooManyRedirects(limit));
            }
            hops += 1;

            tracing::debug!(
                status = %response.status(),
                from = %outgoing.uri,
                to = %hop.uri,
                method = %hop.method,
                "Following redirect"
            );
            drop(response);
            outgoing.redirect(hop);
        }
    }

    fn client_for(&self, key: TransportKey) -> HyperClient {
        if let Some(client) = self.clients.get(&key) {
            return client.clone();
        }
        let client = self.build_client(&key);
        self.clients.entry(key).or_insert(client).clone()
    }

    fn build_client(&self, key: &TransportKey) -> HyperClient {
        let tunnel_headers = if key.filter_proxy_headers {
            HeaderMap::new()
        } else {
            self.default_headers.clone()
        };
        let connector = TransportConnector::new(self.http.clone(), self.tls.clone())
            .proxy(key.proxy.clone())
            .tunnel_headers(tunnel_headers)
            .sni_hostname(key.sni_hostname.clone())
            .http2(key.http2);

        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(key.idle_timeout)
            .http1_max_buf_size(key.max_buf_size)
            .http2_only(key.http2);
        if let Some(max_idle) = key.max_idle_per_host {
            builder.pool_max_idle_per_host(max_idle);
        }

        tracing::debug!(
            proxy = ?key.proxy.as_ref().map(ProxyTarget::uri),
            http2 = key.http2,
            group = ?key.group,
            max_buf_size = key.max_buf_size,
            "Transport client created"
        );
        builder.build(connector)
    }
}

async fn send(
    client: &HyperClient,
    request: Request<Body>,
    read_timeout: Option<Duration>,
) -> Result<Response<Incoming>, ConnectorError> {
    let pending = client.request(request);
    let result = match read_timeout {
        Some(timeout) => tokio::time::timeout(timeout, pending)
            .await
            .map_err(|_| ConnectorError::Timeout(timeout))?,
        None => pending.await,
    };
    result.map_err(|e| {
        if e.is_connect() {
            ConnectorError::Connect(error_chain(&e))
        } else {
            ConnectorError::Transport(e)
        }
    })
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn map_response(response: Response<Incoming>, resolved_uri: Uri, lease: Lease) -> ClientResponse {
    let (parts, body) = response.into_parts();
    let reason = parts
        .extensions
        .get::<hyper::ext::ReasonPhrase>()
        .and_then(|reason| std::str::from_utf8(reason.as_bytes()).ok())
        .map(str::to_string)
        .or_else(|| parts.status.canonical_reason().map(str::to_string));
    let entity = (!body.is_end_stream()).then(|| ResponseEntity::new(body, lease.clone()));

    ClientResponse::from_parts(
        parts.status,
        reason,
        parts.version,
        parts.headers,
        resolved_uri,
        entity,
        lease,
    )
}
