//! Connector configuration subsystem.
//!
//! # Data Flow
//! ```text
//! defaults file (TOML, optional)
//!     → loader.rs (deserialize into ConnectorDefaults)
//!     → ConnectorConfiguration<X> (provider template)
//!
//! per client:   template.for_client(&ClientConfig)      → client-scoped copy
//! per request:  client_scoped.for_request(&ClientRequest) → request-scoped copy
//!
//! raw properties (request → client → system)
//!     → properties.rs (PropertyChain)
//!     → parse.rs (silent coercion)
//!     → settings.rs (descriptor rows)
//! ```
//!
//! # Design Decisions
//! - Every setting is a `PropertyRef` cell, so "never set" and "set to null" stay distinct
//! - Merge, defaults and resolution walk one descriptor table per settings struct
//! - Templates are never mutated after construction; each scope owns its copy
//! - A value of the wrong type is treated as absent, never as an error

pub mod connector;
pub mod keys;
pub mod loader;
pub mod parse;
pub mod properties;
pub mod property_ref;
pub mod settings;
pub mod types;

pub use connector::{ConnectorConfiguration, CoreSettings, SettingsExtension};
pub use loader::{load_toml, ConnectorDefaults};
pub use properties::{Properties, PropertyChain, PropertySource, PropertyValue, SystemProperties};
pub use property_ref::PropertyRef;
pub use types::{HttpVersion, RequestEntityProcessing, SslContextSupplier};
