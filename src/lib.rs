//! HTTP connector runtime.
//!
//! # Architecture Overview
//!
//! ```text
//!   ConnectorDefaults (TOML) ─┐
//!   HyperConfiguration ───────┼─▶ ConnectorProvider ──▶ Connector (one per Client)
//!   ClientConfig properties ──┘                             │
//!                                                           ▼
//!   ClientRequest ──▶ request-scoped configuration ──▶ hyper-util client
//!   (request → client → system properties)                  │  TCP / proxy / TLS
//!                                                           ▼
//!   ClientResponse ◀── redirects, read timeout ◀──── transport response
//!
//!   BootstrapConfig + axum::Router ──▶ ServerBootstrap (start / stop)
//! ```
//!
//! Configuration precedence, highest first: raw request property chain,
//! request overrides, client overrides, connector values, built-in defaults.

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod observability;
pub mod provider;
pub mod server;

pub use client::{Client, ClientConfig, ClientRequest, ClientResponse, Entity, ResponseEntity};
pub use config::{ConnectorConfiguration, ConnectorDefaults, Properties, PropertyRef, SystemProperties};
pub use connector::hyper::{HyperConfiguration, HyperConnector};
pub use connector::{callback, AsyncCallback, AsyncHandle, Connector, StatusFamily};
pub use error::{ConfigError, ConnectorError, ServerError};
pub use provider::{ConnectorProvider, HyperConnectorProvider, ProviderRegistry};
pub use server::{BootstrapConfig, ServerBootstrap};
