//! Daemon request/response boundary

pub mod handlers;
pub mod serve;
pub mod state;

pub use serve::{bind, router, serve};
pub use state::ServerState;
