//! Daemon application: options, settings, lifecycle and supervision

pub mod lifecycle;
pub mod options;
pub mod run;
pub mod settings;
pub mod supervise;
