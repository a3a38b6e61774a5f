//! Deployment module

pub mod orchestrator;

pub use orchestrator::{DeployReport, DeployStep, Orchestrator, StepKind};
