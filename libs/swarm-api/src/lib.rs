//! Wire models for the proxmox-swarm daemon
//!
//! Shared by the daemon's HTTP handlers and the client that talks to it over
//! the unix socket.

pub mod models;

pub use models::*;
