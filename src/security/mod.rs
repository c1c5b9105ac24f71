//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket)
//!     → token.rs (bearer token verification, protected routes only)
//!     → Pass to routing
//!
//! Outgoing response:
//!     → headers.rs (hardening headers, CORS)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a zero quota denies everything, an unverifiable token is refused
//! - Callers never learn which check failed

pub mod headers;
pub mod rate_limit;
pub mod token;

pub use rate_limit::{Admission, RateLimitError, VisitorThrottle};
pub use token::{AuthError, Claims, TokenValidator};
