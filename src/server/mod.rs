//! HTTP service.

pub mod handlers;
pub mod router;

pub use router::{start_server, AppState};
