//! Companion Dialog: pluggable dialog generation for desktop companion characters.
//!
//! Turns an interaction snapshot into a response line using interchangeable
//! backends: an order-N Markov generator with context-, personality- and
//! quality-aware filtering, and a table-driven fallback. A router tries the
//! default backend first and falls through an ordered chain on failure or
//! low confidence.

pub mod core;
pub mod schema;

pub use crate::core::backend::{BackendError, BackendKind, DialogBackend};
pub use crate::core::router::{DialogRouter, RouterError, RouterState};
pub use crate::schema::context::{DialogContext, UserFeedback};
pub use crate::schema::response::DialogResponse;
