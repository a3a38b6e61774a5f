//! Compose descriptor interpreter

pub mod parser;
pub mod schema;

use std::path::Path;

use swarm_api::DeploymentModel;
use tracing::{info, instrument};

use crate::errors::SwarmError;

pub use parser::parse_str;

/// Read and interpret a descriptor file
#[instrument]
pub async fn parse(path: &Path) -> Result<DeploymentModel, SwarmError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SwarmError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let model = parse_str(&text, &path.display().to_string())?;
    info!(
        services = model.services.len(),
        volumes = model.volumes.len(),
        "Parsed compose file"
    );
    Ok(model)
}
