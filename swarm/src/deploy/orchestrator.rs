//! Deployment pipeline
//!
//! Walks a [`DeploymentModel`] strictly in order: network, subvolumes, then
//! per service deploy, attach and mounts. The first non-zero backend status
//! ends the run and is returned as-is. Nothing already applied is undone.

use std::fmt;
use std::sync::Arc;

use swarm_api::{DeploymentModel, ServiceSpec};
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, Credentials, RunOptions};
use crate::errors::SwarmError;
use crate::network::NetworkOps;
use crate::storage::StorageOps;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    CreateNetwork,
    CreateSubvolume,
    DeployService,
    AttachNetwork,
    Mount,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::CreateNetwork => "create-network",
            StepKind::CreateSubvolume => "create-subvolume",
            StepKind::DeployService => "deploy-service",
            StepKind::AttachNetwork => "attach-network",
            StepKind::Mount => "mount",
        };
        write!(f, "{}", name)
    }
}

/// One backend call issued during a deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployStep {
    pub kind: StepKind,
    /// Network, volume or service the step acted on
    pub subject: String,
    pub status: i32,
}

/// What a deploy run did, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub steps: Vec<DeployStep>,
    /// `(service, volume)` pairs whose volume is not in the volume table
    pub skipped_mounts: Vec<(String, String)>,
}

impl DeployReport {
    /// Status of the run: the failing step's status, or 0
    pub fn status(&self) -> i32 {
        self.failed_step().map(|step| step.status).unwrap_or(0)
    }

    pub fn failed_step(&self) -> Option<&DeployStep> {
        self.steps.iter().find(|step| step.status != 0)
    }

    pub fn is_success(&self) -> bool {
        self.failed_step().is_none()
    }

    /// Record a step; returns `false` when the run must stop
    fn record(&mut self, kind: StepKind, subject: &str, status: i32) -> bool {
        self.steps.push(DeployStep {
            kind,
            subject: subject.to_string(),
            status,
        });
        status == 0
    }
}

/// Sequences storage, network and deploy calls for a model
pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    storage: StorageOps,
    network: NetworkOps,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            storage: StorageOps::new(backend.clone()),
            network: NetworkOps::new(backend.clone()),
            backend,
        }
    }

    pub fn storage(&self) -> &StorageOps {
        &self.storage
    }

    pub fn network(&self) -> &NetworkOps {
        &self.network
    }

    /// Deploy a model and return the backend status of the run
    pub async fn deploy(
        &self,
        model: &DeploymentModel,
        credentials: &Credentials,
        sdn_network: Option<&str>,
        create_sdn: bool,
    ) -> Result<i32, SwarmError> {
        let report = self
            .deploy_with_report(model, credentials, sdn_network, create_sdn)
            .await?;
        Ok(report.status())
    }

    /// Deploy a model, keeping a record of every call made
    #[instrument(skip_all, fields(services = model.services.len(), volumes = model.volumes.len()))]
    pub async fn deploy_with_report(
        &self,
        model: &DeploymentModel,
        credentials: &Credentials,
        sdn_network: Option<&str>,
        create_sdn: bool,
    ) -> Result<DeployReport, SwarmError> {
        let mut report = DeployReport::default();

        if let (Some(network), true) = (sdn_network, create_sdn) {
            let status = self
                .network
                .create_network(credentials, network, None, None)
                .await?;
            if !report.record(StepKind::CreateNetwork, network, status) {
                warn!(network = %network, status, "Network creation failed");
                return Ok(report);
            }
        }

        for (name, volume) in &model.volumes {
            if volume.external {
                debug!(volume = %name, "Skipping external volume");
                continue;
            }
            let status = self
                .storage
                .create_subvolume(credentials, &volume.subvolume, &volume.options)
                .await;
            if !report.record(StepKind::CreateSubvolume, name, status) {
                warn!(volume = %name, status, "Subvolume creation failed");
                return Ok(report);
            }
        }

        for (name, service) in &model.services {
            if !self
                .deploy_service(&mut report, model, credentials, name, service, sdn_network)
                .await?
            {
                warn!(service = %name, status = report.status(), "Service deployment failed");
                return Ok(report);
            }
        }

        info!(steps = report.steps.len(), "Deployment complete");
        Ok(report)
    }

    /// Deploy, attach and mount one service; returns `false` on the first failure
    async fn deploy_service(
        &self,
        report: &mut DeployReport,
        model: &DeploymentModel,
        credentials: &Credentials,
        name: &str,
        service: &ServiceSpec,
        sdn_network: Option<&str>,
    ) -> Result<bool, SwarmError> {
        if service.replicas > 1 {
            debug!(service = %name, replicas = service.replicas, "Replicas are recorded but deployed as one unit");
        }

        let options = RunOptions {
            ports: service.ports.clone(),
            environment: service.environment.clone(),
        };
        let args = vec![name.to_string(), service.image.clone()];
        let status = self
            .backend
            .run("deploy", &args, credentials, &options)
            .await;
        if !report.record(StepKind::DeployService, name, status) {
            return Ok(false);
        }

        if let Some(network) = sdn_network {
            let vlan = service.vlan.map(i64::from);
            let status = self
                .network
                .attach_to_sdn(credentials, name, network, service.tags.as_deref(), vlan)
                .await?;
            if !report.record(StepKind::AttachNetwork, name, status) {
                return Ok(false);
            }
        }

        for mount in &service.volumes {
            let Some(definition) = model.volumes.get(&mount.volume) else {
                warn!(service = %name, volume = %mount.volume, "Volume not defined in compose file");
                report
                    .skipped_mounts
                    .push((name.to_string(), mount.volume.clone()));
                continue;
            };
            let status = self
                .storage
                .mount(
                    credentials,
                    name,
                    &mount.target,
                    &definition.subvolume,
                    mount.mode.as_deref(),
                    &definition.options,
                )
                .await;
            if !report.record(StepKind::Mount, name, status) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// `start <vmid>`
    pub async fn start_unit(&self, credentials: &Credentials, vmid: &str) -> i32 {
        self.backend
            .run("start", &[vmid.to_string()], credentials, &RunOptions::default())
            .await
    }

    /// `stop <vmid>`
    pub async fn stop_unit(&self, credentials: &Credentials, vmid: &str) -> i32 {
        self.backend
            .run("stop", &[vmid.to_string()], credentials, &RunOptions::default())
            .await
    }
}
