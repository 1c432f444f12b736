//! Start/stop lifecycle of an embedded axum server.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::error::ServerError;
use crate::server::config::{BootstrapConfig, Protocol};
use crate::server::tls;

/// An axum application bound to a [`BootstrapConfig`].
pub struct ServerBootstrap {
    config: BootstrapConfig,
    router: Router,
    tls_config: Option<Arc<rustls::ServerConfig>>,
    handle: Handle,
    task: Option<JoinHandle<std::io::Result<()>>>,
    local_addr: Option<SocketAddr>,
}

impl ServerBootstrap {
    pub fn new(config: BootstrapConfig, router: Router) -> Self {
        Self {
            config,
            router,
            tls_config: None,
            handle: Handle::new(),
            task: None,
            local_addr: None,
        }
    }

    /// Create the server and start it when the configuration asks for it.
    pub async fn launch(config: BootstrapConfig, router: Router) -> Result<Self, ServerError> {
        let auto_start = config.auto_start;
        let mut server = Self::new(config, router);
        if auto_start {
            server.start().await?;
        }
        Ok(server)
    }

    /// TLS context used instead of the configured PEM files.
    pub fn with_tls_config(mut self, config: Arc<rustls::ServerConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Bind and serve. Resolves once the listener is up, or with the bind error.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.task.is_some() {
            return Err(ServerError::AlreadyStarted);
        }
        self.config.validate()?;

        let address = self.config.address();
        let addr = resolve(&address).await?;
        let app = self.application();
        let handle = Handle::new();

        let task = match self.config.protocol {
            Protocol::Http => {
                let server = axum_server::bind(addr).handle(handle.clone());
                tokio::spawn(async move { server.serve(app.into_make_service()).await })
            }
            Protocol::Https => {
                let rustls = RustlsConfig::from_config(self.server_tls()?);
                let server = axum_server::bind_rustls(addr, rustls).handle(handle.clone());
                tokio::spawn(async move { server.serve(app.into_make_service()).await })
            }
        };

        match handle.listening().await {
            Some(local) => {
                tracing::info!(
                    address = %local,
                    protocol = ?self.config.protocol,
                    root_path = %self.config.root_path,
                    "Server started"
                );
                self.handle = handle;
                self.task = Some(task);
                self.local_addr = Some(local);
                Ok(())
            }
            None => match task.await? {
                Err(source) => {
                    tracing::error!(address = %address, error = %source, "Server failed to start");
                    Err(ServerError::Bind { address, source })
                }
                Ok(()) => Err(ServerError::NotListening),
            },
        }
    }

    /// Graceful shutdown; resolves when the serve task has exited.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let task = self.task.take().ok_or(ServerError::NotStarted)?;
        self.handle
            .graceful_shutdown(Some(Duration::from_millis(self.config.shutdown_grace_ms)));
        let result = task.await?;
        self.local_addr = None;
        tracing::info!(address = %self.config.address(), "Server stopped");
        result.map_err(ServerError::Serve)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Access the native server handle, `axum_server::Handle`.
    pub fn unwrap<T: Any>(&self) -> Option<&T> {
        (&self.handle as &dyn Any).downcast_ref::<T>()
    }

    fn application(&self) -> Router {
        let router = self.router.clone();
        let router = match self.config.mount_path() {
            Some(path) => Router::new().nest(&path, router),
            None => router,
        };
        router.layer(TraceLayer::new_for_http())
    }

    fn server_tls(&self) -> Result<Arc<rustls::ServerConfig>, ServerError> {
        if let Some(config) = &self.tls_config {
            return Ok(config.clone());
        }
        let files = self
            .config
            .tls
            .as_ref()
            .ok_or_else(|| ServerError::Tls("protocol https requires a TLS configuration".to_string()))?;
        tls::server_config(files, self.config.client_auth)
    }
}

async fn resolve(address: &str) -> Result<SocketAddr, ServerError> {
    let bind_error = |source| ServerError::Bind {
        address: address.to_string(),
        source,
    };
    tokio::net::lookup_host(address)
        .await
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| {
            bind_error(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "host resolved to no addresses",
            ))
        })
}
