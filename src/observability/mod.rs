//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: network, service, height, id)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs installs a subscriber at the composition root
//!     → any `metrics` recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - Library code only emits; it never installs a subscriber or recorder
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
