//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connectors, server bootstrap:
//!     → tracing macros (structured events, per-request spans with a request id)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging::init (stdout via tracing-subscriber)
//!     → any `metrics` recorder installed by the host application
//! ```
//!
//! # Design Decisions
//! - The library never installs a metrics recorder; without one, updates are no-ops
//! - Log filtering follows `RUST_LOG`

pub mod logging;
pub mod metrics;
