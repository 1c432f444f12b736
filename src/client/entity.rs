//! Request entities.
//!
//! An entity is either in-memory bytes or a writer that produces the body on
//! demand. Writers are blocking `std::io::Write` producers; the connector runs
//! them on the blocking pool and either collects their output (buffered mode)
//! or streams it in chunks (chunked mode).

use std::fmt;
use std::io::{self, Write};

use bytes::Bytes;

/// Produces a request body into a blocking sink.
pub trait EntityWriter: Send + 'static {
    fn write_to(self: Box<Self>, out: &mut dyn Write) -> io::Result<()>;
}

impl<F> EntityWriter for F
where
    F: FnOnce(&mut dyn Write) -> io::Result<()> + Send + 'static,
{
    fn write_to(self: Box<Self>, out: &mut dyn Write) -> io::Result<()> {
        (*self)(out)
    }
}

pub(crate) enum EntityBody {
    Bytes(Bytes),
    Writer(Box<dyn EntityWriter>),
}

/// A request body and, when known, its length.
pub struct Entity {
    body: EntityBody,
    length: Option<u64>,
}

impl Entity {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            length: Some(data.len() as u64),
            body: EntityBody::Bytes(data),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::bytes(text.into())
    }

    /// A body produced by a closure of unknown output length.
    pub fn streaming<F>(produce: F) -> Self
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()> + Send + 'static,
    {
        Self::writer(produce)
    }

    pub fn writer<W: EntityWriter>(writer: W) -> Self {
        Self {
            body: EntityBody::Writer(Box::new(writer)),
            length: None,
        }
    }

    /// Declare the number of bytes a writer entity will produce.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// In-memory entities can be sent more than once, e.g. across a redirect.
    pub fn is_repeatable(&self) -> bool {
        matches!(self.body, EntityBody::Bytes(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            EntityBody::Bytes(bytes) => Some(bytes),
            EntityBody::Writer(_) => None,
        }
    }

    pub(crate) fn into_body(self) -> EntityBody {
        self.body
    }

    /// Collect the whole entity in memory.
    ///
    /// Writers run on the blocking pool.
    pub async fn buffer(self) -> io::Result<Bytes> {
        match self.body {
            EntityBody::Bytes(bytes) => Ok(bytes),
            EntityBody::Writer(writer) => {
                let capacity = self.length.and_then(|l| usize::try_from(l).ok()).unwrap_or(0);
                tokio::task::spawn_blocking(move || -> io::Result<Bytes> {
                    let mut out = Vec::with_capacity(capacity);
                    writer.write_to(&mut out)?;
                    Ok(Bytes::from(out))
                })
                .await
                .map_err(io::Error::other)?
            }
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            EntityBody::Bytes(_) => "bytes",
            EntityBody::Writer(_) => "writer",
        };
        f.debug_struct("Entity")
            .field("kind", &kind)
            .field("length", &self.length)
            .finish()
    }
}

impl From<Bytes> for Entity {
    fn from(bytes: Bytes) -> Self {
        Self::bytes(bytes)
    }
}

impl From<&'static str> for Entity {
    fn from(text: &'static str) -> Self {
        Self::bytes(text)
    }
}

impl From<String> for Entity {
    fn from(text: String) -> Self {
        Self::bytes(text)
    }
}

impl From<Vec<u8>> for Entity {
    fn from(data: Vec<u8>) -> Self {
        Self::bytes(data)
    }
}
