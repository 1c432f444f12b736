//! Connector execution contract.
//!
//! # Data Flow
//! ```text
//! ClientRequest
//!     → Connector::apply        (caller awaits the response head)
//!     → Connector::apply_async  (runs on the connector's worker pool)
//!           → exactly one of AsyncCallback::response / AsyncCallback::failure
//!     → ClientResponse
//! ```
//!
//! # Design Decisions
//! - The trait is object safe; clients hold `Arc<dyn Connector>`
//! - Panics inside request processing are caught and reported as failures
//! - Closing never joins the worker pool

pub mod hyper;
pub mod pool;
pub mod redirect;
pub mod transport;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::StatusCode;
use tokio::task::{JoinError, JoinHandle};

use crate::client::{ClientRequest, ClientResponse};
use crate::config::keys;
use crate::config::properties::Properties;
use crate::error::ConnectorError;

/// A transport able to execute client requests.
pub trait Connector: Send + Sync {
    /// Execute `request`, resolving once the response head is available.
    fn apply(&self, request: ClientRequest) -> BoxFuture<'_, Result<ClientResponse, ConnectorError>>;

    /// Execute `request` on the worker pool and report through `callback`.
    fn apply_async(&self, request: ClientRequest, callback: Box<dyn AsyncCallback>) -> AsyncHandle;

    /// Diagnostic name carrying transport and platform identifiers.
    fn name(&self) -> String;

    /// Stop accepting requests. In-flight work is not waited for.
    fn close(&self);
}

/// Completion callback for asynchronous execution.
pub trait AsyncCallback: Send + 'static {
    fn response(self: Box<Self>, response: ClientResponse);

    fn failure(self: Box<Self>, error: ConnectorError);
}

struct FnCallback<R, F> {
    on_response: R,
    on_failure: F,
}

impl<R, F> AsyncCallback for FnCallback<R, F>
where
    R: FnOnce(ClientResponse) + Send + 'static,
    F: FnOnce(ConnectorError) + Send + 'static,
{
    fn response(self: Box<Self>, response: ClientResponse) {
        let this = *self;
        (this.on_response)(response)
    }

    fn failure(self: Box<Self>, error: ConnectorError) {
        let this = *self;
        (this.on_failure)(error)
    }
}

/// Build a callback from two closures.
pub fn callback<R, F>(on_response: R, on_failure: F) -> Box<dyn AsyncCallback>
where
    R: FnOnce(ClientResponse) + Send + 'static,
    F: FnOnce(ConnectorError) + Send + 'static,
{
    Box::new(FnCallback {
        on_response,
        on_failure,
    })
}

/// Handle to an asynchronous execution.
///
/// Aborting the task also drops the callback unfired.
#[derive(Debug)]
pub struct AsyncHandle {
    task: Option<JoinHandle<()>>,
}

impl AsyncHandle {
    pub(crate) fn spawned(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// The callback already ran on the submitting thread.
    pub(crate) fn completed() -> Self {
        Self { task: None }
    }

    /// Wait until the callback has run.
    pub async fn join(self) -> Result<(), JoinError> {
        match self.task {
            Some(task) => task.await,
            None => Ok(()),
        }
    }

    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// Drive `execution` and hand its outcome to `callback` exactly once.
pub(crate) async fn complete<F>(execution: F, callback: Box<dyn AsyncCallback>)
where
    F: Future<Output = Result<ClientResponse, ConnectorError>> + Send,
{
    let outcome = match AssertUnwindSafe(execution).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(ConnectorError::Panicked(panic_message(panic.as_ref()))),
    };
    notify(callback, outcome);
}

/// Invoke the matching callback method. A panicking callback is logged.
pub(crate) fn notify(callback: Box<dyn AsyncCallback>, outcome: Result<ClientResponse, ConnectorError>) {
    let delivered = std::panic::catch_unwind(AssertUnwindSafe(move || match outcome {
        Ok(response) => callback.response(response),
        Err(error) => callback.failure(error),
    }));
    if let Err(panic) = delivered {
        tracing::error!(panic = %panic_message(panic.as_ref()), "Async callback panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Response status class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFamily {
    Informational,
    Successful,
    Redirection,
    ClientError,
    ServerError,
    Other,
}

impl StatusFamily {
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() / 100 {
            1 => StatusFamily::Informational,
            2 => StatusFamily::Successful,
            3 => StatusFamily::Redirection,
            4 => StatusFamily::ClientError,
            5 => StatusFamily::ServerError,
            _ => StatusFamily::Other,
        }
    }
}

/// Non-framework string properties of a request, attached to the transport
/// request as an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportProperties(HashMap<String, String>);

impl TransportProperties {
    pub fn from_properties(properties: &Properties) -> Self {
        let forwarded = properties
            .iter()
            .filter(|(name, _)| !keys::is_framework_property(name))
            .filter_map(|(name, value)| value.as_str().map(|v| (name.to_string(), v.to_string())))
            .collect();
        Self(forwarded)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
