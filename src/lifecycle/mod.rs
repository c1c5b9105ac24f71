//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Metrics exporter → Build server → Bind listener
//!
//! Shutdown (shutdown.rs, inflight.rs):
//!     Signal received → Stop accepting → Drain in-flight → Abort stragglers → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when ready)
//! - Shutdown has a deadline: forced abort after the grace period

pub mod inflight;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use inflight::{InFlightGuard, InFlightTracker};
pub use shutdown::Shutdown;
