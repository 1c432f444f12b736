//! Connection establishment for the hyper client.
//!
//! # Data Flow
//! ```text
//! destination Uri
//!     → no proxy:        TCP → (TLS if https)
//!     → proxy, http:     TCP to proxy, marked proxied (absolute-form requests)
//!     → proxy, https:    TCP to proxy → CONNECT tunnel → TLS
//!     → TransportStream  (hyper::rt::Read + Write + Connection)
//! ```

use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use base64::Engine;
use http::header::{HOST, PROXY_AUTHORIZATION};
use http::uri::Scheme;
use http::{HeaderMap, HeaderValue, Uri};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tower::{Service, ServiceExt};

use crate::config::types::SslContextSupplier;
use crate::error::ConnectorError;

/// Upper bound on the proxy's reply to CONNECT.
const MAX_TUNNEL_RESPONSE: usize = 8192;

/// An HTTP proxy and the credentials to present to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyTarget {
    uri: Uri,
    authorization: Option<HeaderValue>,
}

impl ProxyTarget {
    /// Explicit credentials win over user info embedded in the URI.
    pub fn new(uri: &Uri, username: Option<&str>, password: Option<&str>) -> Result<Self, ConnectorError> {
        match uri.scheme_str() {
            None | Some("http") => {}
            Some(other) => {
                return Err(ConnectorError::InvalidRequest(format!(
                    "unsupported proxy scheme {}",
                    other
                )))
            }
        }
        let host = uri
            .host()
            .ok_or_else(|| ConnectorError::InvalidRequest(format!("proxy URI {} has no host", uri)))?;
        let port = uri.port_u16().unwrap_or(80);

        let normalized = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(format!("{}:{}", host, port))
            .path_and_query("/")
            .build()
            .map_err(|e| ConnectorError::InvalidRequest(e.to_string()))?;

        let embedded = embedded_credentials(uri);
        let username = username
            .map(str::to_string)
            .or_else(|| embedded.as_ref().map(|(u, _)| u.clone()));
        let password = password
            .map(str::to_string)
            .or_else(|| embedded.and_then(|(_, p)| p));

        let authorization = match username {
            Some(username) => Some(basic_auth(&username, password.as_deref().unwrap_or(""))?),
            None => None,
        };

        Ok(Self {
            uri: normalized,
            authorization,
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// `Proxy-Authorization` value, when credentials are configured.
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }
}

fn embedded_credentials(uri: &Uri) -> Option<(String, Option<String>)> {
    let authority = uri.authority()?;
    if !authority.as_str().contains('@') {
        return None;
    }
    let url = url::Url::parse(&format!("http://{}/", authority)).ok()?;
    if url.username().is_empty() {
        return None;
    }
    Some((url.username().to_string(), url.password().map(str::to_string)))
}

fn basic_auth(username: &str, password: &str) -> Result<HeaderValue, ConnectorError> {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    let mut value = HeaderValue::try_from(format!("Basic {}", token))
        .map_err(|e| ConnectorError::InvalidRequest(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// TLS client configuration, resolved on the first TLS handshake.
///
/// Source order: SSL context supplier, then the client's explicit TLS
/// configuration, then the bundled web PKI roots.
#[derive(Debug)]
pub struct TlsContext {
    supplier: Option<SslContextSupplier>,
    explicit: Option<Arc<ClientConfig>>,
    resolved: OnceLock<Result<Arc<ClientConfig>, String>>,
    h2: OnceLock<Arc<ClientConfig>>,
}

impl TlsContext {
    pub fn new(supplier: Option<SslContextSupplier>, explicit: Option<Arc<ClientConfig>>) -> Self {
        Self {
            supplier,
            explicit,
            resolved: OnceLock::new(),
            h2: OnceLock::new(),
        }
    }

    /// The configuration to use. For HTTP/2 the ALPN list is narrowed to `h2`.
    pub fn config(&self, http2: bool) -> Result<Arc<ClientConfig>, ConnectorError> {
        let base = self
            .resolved
            .get_or_init(|| self.resolve())
            .clone()
            .map_err(ConnectorError::Tls)?;
        if !http2 {
            return Ok(base);
        }
        let h2 = self.h2.get_or_init(|| {
            let mut config = (*base).clone();
            config.alpn_protocols = vec![b"h2".to_vec()];
            Arc::new(config)
        });
        Ok(h2.clone())
    }

    fn resolve(&self) -> Result<Arc<ClientConfig>, String> {
        if let Some(supplier) = &self.supplier {
            return supplier.supply().map_err(|e| e.to_string());
        }
        if let Some(explicit) = &self.explicit {
            return Ok(explicit.clone());
        }
        default_client_config().map_err(|e| e.to_string())
    }
}

/// Client configuration trusting the bundled web PKI roots.
pub fn default_client_config() -> Result<Arc<ClientConfig>, rustls::Error> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// TCP dialer used as a template for every transport connector.
pub fn http_connector(connect_timeout: Option<Duration>) -> HttpConnector {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);
    http.set_connect_timeout(connect_timeout);
    http
}

/// `tower::Service<Uri>` that dials, tunnels and handshakes as needed.
#[derive(Clone)]
pub struct TransportConnector {
    http: HttpConnector,
    tls: Arc<TlsContext>,
    proxy: Option<ProxyTarget>,
    tunnel_headers: HeaderMap,
    sni_hostname: Option<String>,
    http2: bool,
}

impl TransportConnector {
    pub fn new(http: HttpConnector, tls: Arc<TlsContext>) -> Self {
        Self {
            http,
            tls,
            proxy: None,
            tunnel_headers: HeaderMap::new(),
            sni_hostname: None,
            http2: false,
        }
    }

    pub fn proxy(mut self, proxy: Option<ProxyTarget>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Extra headers sent with the CONNECT request.
    pub fn tunnel_headers(mut self, headers: HeaderMap) -> Self {
        self.tunnel_headers = headers;
        self
    }

    pub fn sni_hostname(mut self, hostname: Option<String>) -> Self {
        self.sni_hostname = hostname;
        self
    }

    pub fn http2(mut self, http2: bool) -> Self {
        self.http2 = http2;
        self
    }

    async fn connect(self, dst: Uri) -> io::Result<TransportStream> {
        let https = dst.scheme() == Some(&Scheme::HTTPS);
        let host = dst
            .host()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no host"))?
            .to_string();

        let Some(proxy) = self.proxy.clone() else {
            let tcp = self.dial(dst.clone()).await?;
            return if https {
                self.handshake(tcp, &host).await
            } else {
                Ok(TransportStream::plain(tcp, false))
            };
        };

        let mut tcp = self.dial(proxy.uri().clone()).await?;
        if !https {
            return Ok(TransportStream::plain(tcp, true));
        }

        let authority = format!("{}:{}", host, dst.port_u16().unwrap_or(443));
        tunnel(&mut tcp, &authority, &proxy, &self.tunnel_headers).await?;
        tracing::debug!(proxy = %proxy.uri(), target = %authority, "Proxy tunnel established");
        self.handshake(tcp, &host).await
    }

    async fn dial(&self, uri: Uri) -> io::Result<TcpStream> {
        let io = self
            .http
            .clone()
            .oneshot(uri)
            .await
            .map_err(io::Error::other)?;
        Ok(io.into_inner())
    }

    async fn handshake(&self, tcp: TcpStream, host: &str) -> io::Result<TransportStream> {
        let config = self.tls.config(self.http2).map_err(io::Error::other)?;
        let name = self
            .sni_hostname
            .clone()
            .unwrap_or_else(|| host.trim_start_matches('[').trim_end_matches(']').to_string());
        let server_name =
            ServerName::try_from(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let tls = TlsConnector::from(config).connect(server_name, tcp).await?;
        let h2 = tls.get_ref().1.alpn_protocol() == Some(b"h2".as_slice());
        Ok(TransportStream {
            io: TokioIo::new(Io::Tls(Box::new(tls))),
            proxied: false,
            h2,
        })
    }
}

impl Service<Uri> for TransportConnector {
    type Response = TransportStream;
    type Error = io::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = io::Result<TransportStream>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        Box::pin(self.clone().connect(dst))
    }
}

async fn tunnel(
    tcp: &mut TcpStream,
    authority: &str,
    proxy: &ProxyTarget,
    extra_headers: &HeaderMap,
) -> io::Result<()> {
    let mut request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n", authority);
    if let Some(value) = proxy.authorization().and_then(|v| v.to_str().ok()) {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", value));
    }
    for (name, value) in extra_headers {
        if name == HOST || name == PROXY_AUTHORIZATION {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }
    }
    request.push_str("\r\n");
    tcp.write_all(request.as_bytes()).await?;

    let mut head = Vec::with_capacity(512);
    let mut buf = [0u8; 512];
    loop {
        let n = tcp.read(&mut buf).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed the connection during CONNECT",
            ));
        }
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if head.len() > MAX_TUNNEL_RESPONSE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "proxy response head too large"));
        }
    }

    match tunnel_status(&head) {
        Some(status) if (200..300).contains(&status) => Ok(()),
        Some(status) => Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("proxy refused CONNECT to {} with status {}", authority, status),
        )),
        None => Err(io::Error::new(io::ErrorKind::InvalidData, "malformed proxy response")),
    }
}

/// Status code of a raw `HTTP/1.x NNN ...` response head.
fn tunnel_status(head: &[u8]) -> Option<u16> {
    let line = head.split(|b| *b == b'\n').next()?;
    let line = std::str::from_utf8(line).ok()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/1.") {
        return None;
    }
    parts.next()?.parse().ok()
}

enum Io {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Io {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Io::Tls(s) => Pin::new(&mut **s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Io {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Io::Tls(s) => Pin::new(&mut **s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_flush(cx),
            Io::Tls(s) => Pin::new(&mut **s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Io::Tls(s) => Pin::new(&mut **s).poll_shutdown(cx),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Io::Plain(s) => Pin::new(s).poll_write_vectored(cx, bufs),
            Io::Tls(s) => Pin::new(&mut **s).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Io::Plain(s) => s.is_write_vectored(),
            Io::Tls(s) => s.is_write_vectored(),
        }
    }
}

/// An established connection, plain or TLS.
pub struct TransportStream {
    io: TokioIo<Io>,
    proxied: bool,
    h2: bool,
}

impl TransportStream {
    fn plain(tcp: TcpStream, proxied: bool) -> Self {
        Self {
            io: TokioIo::new(Io::Plain(tcp)),
            proxied,
            h2: false,
        }
    }
}

impl hyper::rt::Read for TransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        hyper::rt::Read::poll_read(Pin::new(&mut self.io), cx, buf)
    }
}

impl hyper::rt::Write for TransportStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        hyper::rt::Write::poll_write(Pin::new(&mut self.io), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_flush(Pin::new(&mut self.io), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        hyper::rt::Write::poll_shutdown(Pin::new(&mut self.io), cx)
    }

    fn is_write_vectored(&self) -> bool {
        hyper::rt::Write::is_write_vectored(&self.io)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        hyper::rt::Write::poll_write_vectored(Pin::new(&mut self.io), cx, bufs)
    }
}

impl Connection for TransportStream {
    fn connected(&self) -> Connected {
        let connected = Connected::new().proxy(self.proxied);
        if self.h2 {
            connected.negotiated_h2()
        } else {
            connected
        }
    }
}
