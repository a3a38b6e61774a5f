//! proxmox-swarm library
//!
//! Compose descriptor interpretation, storage and network operations, the
//! deployment orchestrator, and the local daemon with its client.

pub mod app;
pub mod backend;
pub mod client;
pub mod compose;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod network;
pub mod runtime;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod utils;
