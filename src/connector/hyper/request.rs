//! Mapping a `ClientRequest` onto a hyper request.

use std::io::{self, Write};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, EXPECT, PROXY_AUTHORIZATION};
use http::uri::Scheme;
use http::{HeaderMap, HeaderValue, Method, Request, Uri, Version};
use tokio::sync::mpsc;

use crate::client::entity::{EntityBody, EntityWriter};
use crate::client::ClientRequest;
use crate::config::connector::CoreSettings;
use crate::config::types::{HttpVersion, RequestEntityProcessing};
use crate::connector::redirect::{self, Redirect};
use crate::connector::transport::ProxyTarget;
use crate::connector::TransportProperties;
use crate::error::ConnectorError;

use super::settings::HyperConfiguration;

/// Chunks buffered between the entity writer and the connection.
const STREAM_BACKLOG: usize = 4;

/// How an entity goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Collected in memory, sent with a computed `Content-Length`.
    Buffered,
    /// Streamed under the given `Content-Length`.
    FixedLength(u64),
    /// Streamed with chunked transfer coding in pieces of the given size.
    Chunked(usize),
}

/// Pick the framing for an entity of `length` bytes (if known).
///
/// Fixed-length streaming only applies to streamed entities of known length
/// and never overrides a `Content-Length` header set by the caller.
pub fn entity_framing(core: &CoreSettings, length: Option<u64>, headers: &HeaderMap) -> Framing {
    match core.entity_processing() {
        RequestEntityProcessing::Buffered => Framing::Buffered,
        RequestEntityProcessing::Chunked => {
            let fixed = core.fixed_length_streaming.get().copied().unwrap_or(false);
            match length {
                Some(length) if fixed && !headers.contains_key(CONTENT_LENGTH) => {
                    Framing::FixedLength(length)
                }
                _ => Framing::Chunked(core.chunk_size()),
            }
        }
    }
}

/// Whether to send `Expect: 100-continue` for an entity of `length` bytes.
pub fn expects_continue(core: &CoreSettings, length: Option<u64>) -> bool {
    if !core.expect_100_continue.get().copied().unwrap_or(false) {
        return false;
    }
    let threshold = core.expect_100_continue_threshold.get().copied().unwrap_or(0);
    length.map_or(true, |length| length >= threshold)
}

pub(crate) enum OutgoingBody {
    Empty,
    Full(Bytes),
    Stream(Box<dyn EntityWriter>, usize),
    /// A streamed body that has already been handed to the transport.
    Sent,
}

impl OutgoingBody {
    pub(crate) fn is_replayable(&self) -> bool {
        matches!(self, OutgoingBody::Empty | OutgoingBody::Full(_))
    }
}

/// A request ready for the transport, re-targetable across redirects.
pub(crate) struct Outgoing {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: OutgoingBody,
    properties: TransportProperties,
    proxy_authorization: Option<HeaderValue>,
}

impl Outgoing {
    pub(crate) async fn prepare(
        mut request: ClientRequest,
        configuration: &HyperConfiguration,
        proxy: Option<&ProxyTarget>,
    ) -> Result<Self, ConnectorError> {
        let core = configuration.core();
        let uri = request.uri().clone();
        check_target(&uri)?;

        let mut headers = request.headers().clone();
        let entity = request.take_entity();
        let length = entity.as_ref().and_then(|e| e.length());

        let body = match entity {
            None => OutgoingBody::Empty,
            Some(entity) => match entity_framing(core, length, &headers) {
                Framing::Buffered => OutgoingBody::Full(entity.buffer().await?),
                Framing::FixedLength(length) => {
                    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
                    match entity.into_body() {
                        EntityBody::Bytes(bytes) => OutgoingBody::Full(bytes),
                        EntityBody::Writer(writer) => OutgoingBody::Stream(writer, core.chunk_size()),
                    }
                }
                Framing::Chunked(chunk_size) => match entity.into_body() {
                    EntityBody::Bytes(bytes) => {
                        let writer = move |out: &mut dyn Write| out.write_all(&bytes);
                        OutgoingBody::Stream(Box::new(writer), chunk_size)
                    }
                    EntityBody::Writer(writer) => OutgoingBody::Stream(writer, chunk_size),
                },
            },
        };

        if !matches!(body, OutgoingBody::Empty) && expects_continue(core, length) {
            headers.insert(EXPECT, HeaderValue::from_static("100-continue"));
        }

        let proxy_authorization = proxy.and_then(|p| p.authorization()).cloned();
        if uri.scheme() == Some(&Scheme::HTTP) {
            if let Some(value) = &proxy_authorization {
                headers
                    .entry(PROXY_AUTHORIZATION)
                    .or_insert_with(|| value.clone());
            }
        }

        let version = match core.http_version() {
            HttpVersion::Http1 => Version::HTTP_11,
            HttpVersion::Http2 => Version::HTTP_2,
        };

        Ok(Self {
            method: request.method().clone(),
            uri,
            version,
            headers,
            body,
            properties: TransportProperties::from_properties(request.properties()),
            proxy_authorization,
        })
    }

    /// Build the hyper request for the next attempt.
    ///
    /// In-memory bodies are kept for replay; streamed bodies are consumed.
    pub(crate) fn to_hyper(&mut self) -> Request<Body> {
        let body = match std::mem::replace(&mut self.body, OutgoingBody::Sent) {
            OutgoingBody::Empty => {
                self.body = OutgoingBody::Empty;
                Body::empty()
            }
            OutgoingBody::Full(bytes) => {
                self.body = OutgoingBody::Full(bytes.clone());
                Body::from(bytes)
            }
            OutgoingBody::Stream(writer, chunk_size) => stream_body(writer, chunk_size),
            OutgoingBody::Sent => Body::empty(),
        };

        let mut request = Request::new(body);
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        request.extensions_mut().insert(self.properties.clone());
        request
    }

    /// Re-target at a redirect hop.
    pub(crate) fn redirect(&mut self, hop: Redirect) {
        redirect::prepare_headers(&mut self.headers, &self.uri, &hop.uri, hop.keep_body);
        if !hop.keep_body {
            self.body = OutgoingBody::Empty;
            self.headers.remove(EXPECT);
        }
        if let Some(value) = &self.proxy_authorization {
            if hop.uri.scheme() == Some(&Scheme::HTTP) {
                self.headers.insert(PROXY_AUTHORIZATION, value.clone());
            } else {
                self.headers.remove(PROXY_AUTHORIZATION);
            }
        }
        self.method = hop.method;
        self.uri = hop.uri;
    }
}

fn check_target(uri: &Uri) -> Result<(), ConnectorError> {
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => {
            return Err(ConnectorError::InvalidRequest(format!(
                "{} is not an absolute http(s) URI",
                uri
            )))
        }
    }
    if uri.host().is_none() {
        return Err(ConnectorError::InvalidRequest(format!("{} has no host", uri)));
    }
    Ok(())
}

/// Run `writer` on the blocking pool and stream its output.
fn stream_body(writer: Box<dyn EntityWriter>, chunk_size: usize) -> Body {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(STREAM_BACKLOG);

    tokio::task::spawn_blocking(move || {
        let mut sink = ChunkSink::new(tx.clone(), chunk_size);
        let result = writer.write_to(&mut sink).and_then(|()| sink.flush());
        if let Err(e) = result {
            tracing::debug!(error = %e, "Request entity writer failed");
            let _ = tx.blocking_send(Err(e));
        }
    });

    let chunks = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Body::from_stream(chunks)
}

/// Blocking sink that cuts the written bytes into fixed-size chunks.
pub(crate) struct ChunkSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buffer: BytesMut,
    chunk_size: usize,
}

impl ChunkSink {
    pub(crate) fn new(tx: mpsc::Sender<io::Result<Bytes>>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tx,
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn send(&self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "request body receiver dropped"))
    }
}

impl Write for ChunkSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= self.chunk_size {
            let chunk = self.buffer.split_to(self.chunk_size).freeze();
            self.send(chunk)?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let chunk = self.buffer.split().freeze();
            self.send(chunk)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Entity;
    use crate::config::connector::{ConnectorConfiguration, DEFAULT_CHUNK_SIZE};

    fn core(configuration: ConnectorConfiguration) -> CoreSettings {
        configuration.copy().core().clone()
    }

    #[test]
    fn test_chunked_uses_default_chunk_size() {
        let core = core(
            ConnectorConfiguration::new().request_entity_processing(RequestEntityProcessing::Chunked),
        );
        assert_eq!(
            entity_framing(&core, None, &HeaderMap::new()),
            Framing::Chunked(DEFAULT_CHUNK_SIZE)
        );
    }

    #[test]
    fn test_buffered_is_default() {
        let core = core(ConnectorConfiguration::new().fixed_length_streaming(true));
        assert_eq!(entity_framing(&core, Some(10), &HeaderMap::new()), Framing::Buffered);
    }

    #[test]
    fn test_fixed_length_needs_known_length_and_no_header() {
        let core = core(
            ConnectorConfiguration::new()
                .request_entity_processing(RequestEntityProcessing::Chunked)
                .fixed_length_streaming(true),
        );
        assert_eq!(entity_framing(&core, Some(10), &HeaderMap::new()), Framing::FixedLength(10));
        assert_eq!(entity_framing(&core, None, &HeaderMap::new()), Framing::Chunked(4096));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert_eq!(entity_framing(&core, Some(10), &headers), Framing::Chunked(4096));
    }

    #[test]
    fn test_expect_continue_threshold() {
        let off = core(ConnectorConfiguration::new());
        assert!(!expects_continue(&off, None));

        let on = core(
            ConnectorConfiguration::new()
                .expect_100_continue(true)
                .expect_100_continue_threshold(100),
        );
        assert!(expects_continue(&on, None));
        assert!(expects_continue(&on, Some(100)));
        assert!(!expects_continue(&on, Some(99)));
    }

    #[test]
    fn test_chunk_sink_cuts_fixed_pieces() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut sink = ChunkSink::new(tx, DEFAULT_CHUNK_SIZE);
        sink.write_all(&[7u8; 10_000]).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let mut sizes = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            sizes.push(chunk.unwrap().len());
        }
        assert_eq!(sizes, [4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn test_prepare_maps_request() {
        let configuration = HyperConfiguration::with_defaults()
            .proxy_uri(Uri::from_static("http://proxy.local:3128"))
            .proxy_username("u")
            .proxy_password("p");
        let proxy = crate::connector::hyper::settings::proxy_target(configuration.core()).unwrap();

        let request = ClientRequest::new(Method::POST, Uri::from_static("http://example.com/items"))
            .header(http::header::ACCEPT, HeaderValue::from_static("text/plain"))
            .property("tenant", "blue")
            .property(crate::config::keys::READ_TIMEOUT, "10")
            .body(Entity::text("payload"));

        let mut outgoing = Outgoing::prepare(request, &configuration, proxy.as_ref())
            .await
            .unwrap();
        assert!(outgoing.body.is_replayable());
        assert!(outgoing.headers.contains_key(PROXY_AUTHORIZATION));

        let hyper_request = outgoing.to_hyper();
        assert_eq!(hyper_request.method(), Method::POST);
        assert_eq!(hyper_request.version(), Version::HTTP_11);
        let forwarded = hyper_request.extensions().get::<TransportProperties>().unwrap();
        assert_eq!(forwarded.get("tenant"), Some("blue"));
        assert_eq!(forwarded.len(), 1);

        outgoing.redirect(Redirect {
            method: Method::GET,
            uri: Uri::from_static("https://example.com/done"),
            keep_body: false,
        });
        assert!(!outgoing.headers.contains_key(PROXY_AUTHORIZATION));
        assert!(matches!(outgoing.body, OutgoingBody::Empty));
    }

    #[tokio::test]
    async fn test_streamed_body_is_not_replayable() {
        let configuration = HyperConfiguration::with_defaults()
            .request_entity_processing(RequestEntityProcessing::Chunked);
        let request = ClientRequest::new(Method::PUT, Uri::from_static("http://example.com/"))
            .body(Entity::streaming(|out| out.write_all(b"abc")));

        let mut outgoing = Outgoing::prepare(request, &configuration, None).await.unwrap();
        assert!(!outgoing.body.is_replayable());
        let _ = outgoing.to_hyper();
        assert!(matches!(outgoing.body, OutgoingBody::Sent));
    }

    #[tokio::test]
    async fn test_relative_uri_rejected() {
        let request = ClientRequest::new(Method::GET, Uri::from_static("/relative"));
        let result = Outgoing::prepare(request, &HyperConfiguration::with_defaults(), None).await;
        assert!(matches!(result, Err(ConnectorError::InvalidRequest(_))));
    }
}
