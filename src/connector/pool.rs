//! Lazily created worker pool for asynchronous execution.

use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::ConnectorError;

/// A dedicated multi-thread runtime, built on first use.
///
/// Creation happens at most once even under concurrent first calls. A failed
/// build is remembered and reported to every later caller.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    size: usize,
    runtime: OnceLock<Result<Runtime, String>>,
}

impl WorkerPool {
    /// `size` of 0 lets the runtime pick one worker per core.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            runtime: OnceLock::new(),
        }
    }

    pub fn handle(&self) -> Result<Handle, ConnectorError> {
        match self.runtime.get_or_init(|| self.build()) {
            Ok(runtime) => Ok(runtime.handle().clone()),
            Err(e) => Err(ConnectorError::Pool(e.clone())),
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self.runtime.get(), Some(Ok(_)))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn build(&self) -> Result<Runtime, String> {
        let mut builder = Builder::new_multi_thread();
        if self.size > 0 {
            builder.worker_threads(self.size);
        }
        let runtime = builder
            .thread_name(self.name.clone())
            .enable_all()
            .build()
            .map_err(|e| e.to_string())?;

        tracing::debug!(name = %self.name, size = self.size, "Worker pool started");
        Ok(runtime)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(Ok(runtime)) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
