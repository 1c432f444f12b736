//! Embedded server bootstrap.
//!
//! # Data Flow
//! ```text
//! BootstrapConfig (TOML or code)
//!     → ServerBootstrap::new(config, Router)
//!     → start()  resolve host → TLS context (PEM or supplied) → axum-server bind
//!                → resolves once listening, or with the bind/TLS error
//!     → stop()   graceful shutdown → resolves when the serve task exits
//! ```
//!
//! # Design Decisions
//! - Start and stop failures are returned, never retried
//! - The application is mounted under the root path and wrapped in request tracing
//! - `unwrap` exposes the `axum_server::Handle` for anything not covered here

pub mod bootstrap;
pub mod config;
pub mod tls;

pub use bootstrap::ServerBootstrap;
pub use config::{BootstrapConfig, ClientAuth, Protocol, TlsFiles};
