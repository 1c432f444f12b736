//! Incoming response abstraction.

use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode, Uri, Version};
use hyper::body::{Body as _, Incoming};
use tokio::sync::OwnedSemaphorePermit;

use crate::connector::StatusFamily;
use crate::error::ConnectorError;

/// Slot in the connector's connection budget, released on drop.
pub(crate) type Lease = Option<Arc<OwnedSemaphorePermit>>;

/// Response head plus an optional body stream.
#[derive(Debug)]
pub struct ClientResponse {
    status: StatusCode,
    reason: Option<String>,
    version: Version,
    headers: HeaderMap,
    resolved_uri: Uri,
    entity: Option<ResponseEntity>,
    _lease: Lease,
}

impl ClientResponse {
    pub(crate) fn from_parts(
        status: StatusCode,
        reason: Option<String>,
        version: Version,
        headers: HeaderMap,
        resolved_uri: Uri,
        entity: Option<ResponseEntity>,
        lease: Lease,
    ) -> Self {
        Self {
            status,
            reason,
            version,
            headers,
            resolved_uri,
            entity,
            _lease: lease,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase as sent by the peer, or the canonical one.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn family(&self) -> StatusFamily {
        StatusFamily::of(self.status)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URI of the final hop after redirects.
    pub fn resolved_uri(&self) -> &Uri {
        &self.resolved_uri
    }

    /// False when the transport reported an empty body.
    pub fn has_entity(&self) -> bool {
        self.entity.is_some()
    }

    pub fn entity_mut(&mut self) -> Option<&mut ResponseEntity> {
        self.entity.as_mut()
    }

    pub fn take_entity(&mut self) -> Option<ResponseEntity> {
        self.entity.take()
    }

    /// Read the whole body. Empty when there is no entity.
    pub async fn bytes(mut self) -> Result<Bytes, ConnectorError> {
        match self.entity.take() {
            Some(entity) => entity.bytes().await,
            None => Ok(Bytes::new()),
        }
    }

    pub async fn text(self) -> Result<String, ConnectorError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Release the body and the connection slot without reading further.
    pub fn close(self) {
        drop(self);
    }
}

/// Response body stream.
#[derive(Debug)]
pub struct ResponseEntity {
    body: Incoming,
    _lease: Lease,
}

impl ResponseEntity {
    pub(crate) fn new(body: Incoming, lease: Lease) -> Self {
        Self { body, _lease: lease }
    }

    /// Next data chunk, or `None` at the end of the body. Trailers are skipped.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ConnectorError> {
        loop {
            let frame =
                futures_util::future::poll_fn(|cx| Pin::new(&mut self.body).poll_frame(cx)).await;
            match frame {
                None => return Ok(None),
                Some(Err(e)) => return Err(ConnectorError::Body(e)),
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        return Ok(Some(data));
                    }
                }
            }
        }
    }

    pub async fn bytes(mut self) -> Result<Bytes, ConnectorError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    pub fn is_end_stream(&self) -> bool {
        self.body.is_end_stream()
    }

    /// The underlying hyper body.
    pub fn into_inner(self) -> Incoming {
        self.body
    }
}
