//! Internal telemetry for the numwatch engine.
//!
//! In-memory counters and histograms only; snapshots are exposed through
//! the health endpoint and periodic log lines rather than an external
//! metrics system.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
