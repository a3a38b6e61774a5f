//! Runtime context shared by the daemon, its client and the supervisor

pub mod layout;
pub mod pidfile;
pub mod wait;

pub use layout::RuntimeLayout;
pub use pidfile::PidLock;
pub use wait::{wait_until, WaitOptions, WaitOutcome};
