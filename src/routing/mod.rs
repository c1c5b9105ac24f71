//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (method + segment-wise path match)
//!     → Return: RouteMatch (route + bound placeholders) or NotFound
//!
//! Route Compilation (at startup):
//!     RouteConfig[] + service base URLs
//!     → Parse method and path patterns
//!     → Reject duplicate method+shape definitions
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use matcher::{MethodMatcher, PathParams, PathPattern};
pub use router::{Route, RouteError, RouteMatch, RouteTable, RouteTableError};
