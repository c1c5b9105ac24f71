//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware layers)
//!     → request.rs (request ID)
//!     → dispatcher.rs (throttle → auth → route)
//!     → forwarder.rs (rewrite, relay to backend)
//!     → response.rs / error.rs (gateway-generated JSON responses)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod forwarder;
pub mod health;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::{DispatchState, Dispatcher, Guard, RequestContext};
pub use forwarder::{ForwardError, Forwarder};
pub use request::X_REQUEST_ID;
pub use server::{HttpServer, ServerError};
