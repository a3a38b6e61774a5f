//! Descriptor normalization
//!
//! Turns the intermediate schema into a [`DeploymentModel`]. Lenient fields
//! degrade to their defaults; only a missing `services` table and an
//! out-of-range VLAN are hard errors.

use std::env;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use swarm_api::{DeploymentModel, ServiceSpec, VolumeDefinition, VolumeMount};
use tracing::warn;

use super::schema::{
    stringify, Lenient, RawDocument, RawEnvironment, RawLongMount, RawMount, RawNumber,
    RawService, RawVolume, RawVolumeDefinition,
};
use crate::errors::SwarmError;

pub const MISSING_SERVICES: &str = "Compose file missing services definition";

/// Highest VLAN ID a descriptor may request
pub const MAX_VLAN: i64 = 4094;

/// Decode descriptor text into a model. `origin` names the source in errors.
pub fn parse_str(text: &str, origin: &str) -> Result<DeploymentModel, SwarmError> {
    let format_error = |e: serde_yaml::Error| SwarmError::Format {
        origin: origin.to_string(),
        reason: e.to_string(),
    };
    let mut value: Value = serde_yaml::from_str(text).map_err(format_error)?;
    // `<<: *anchor` keys are left as-is by the decoder
    value.apply_merge().map_err(format_error)?;

    let has_services = value
        .as_mapping()
        .and_then(|mapping| mapping.get("services"))
        .is_some_and(|services| !services.is_null());
    if !has_services {
        return Err(SwarmError::Schema(MISSING_SERVICES.to_string()));
    }

    let document: RawDocument = serde_yaml::from_value(value)
        .map_err(|e| SwarmError::Schema(format!("Invalid compose structure: {}", e)))?;

    normalize(document)
}

fn normalize(document: RawDocument) -> Result<DeploymentModel, SwarmError> {
    let services = match document.services {
        Lenient::Expected(services) => services,
        Lenient::Other(_) => {
            return Err(SwarmError::Schema(
                "Compose services definition must be a mapping".to_string(),
            ))
        }
    };

    let mut model = DeploymentModel::default();
    for (name, raw) in services {
        let raw = match raw {
            Lenient::Expected(raw) => raw,
            Lenient::Other(Value::Null) => RawService::default(),
            Lenient::Other(_) => {
                return Err(SwarmError::Schema(format!(
                    "Service {} must be a mapping",
                    name
                )))
            }
        };
        let spec = normalize_service(&name, raw)?;
        model.services.insert(name, spec);
    }

    match document.volumes {
        None => {}
        Some(Lenient::Expected(volumes)) => {
            for (name, raw) in volumes {
                if let Some(definition) = normalize_volume(&name, raw) {
                    model.volumes.insert(name, definition);
                }
            }
        }
        Some(Lenient::Other(other)) => {
            warn!(shape = %stringify(&other), "Ignoring volumes table that is not a mapping");
        }
    }

    Ok(model)
}

fn normalize_service(name: &str, raw: RawService) -> Result<ServiceSpec, SwarmError> {
    let image = match raw.image {
        Some(Lenient::Expected(image)) => image,
        Some(Lenient::Other(other)) => stringify(&other),
        None => String::new(),
    };

    let ports = string_list(raw.ports).unwrap_or_default();
    let environment = normalize_environment(name, raw.environment);

    let (replicas, constraints) = match raw.deploy.and_then(Lenient::expected) {
        Some(deploy) => {
            let constraints = deploy
                .placement
                .and_then(Lenient::expected)
                .and_then(|placement| string_list(placement.constraints))
                .unwrap_or_default();
            (normalize_replicas(deploy.replicas.as_ref()), constraints)
        }
        None => (1, Vec::new()),
    };

    let tags = string_list(raw.tags);
    let vlan = raw
        .vlan
        .as_ref()
        .map(|vlan| normalize_vlan(name, vlan))
        .transpose()?;

    let volumes = match raw.volumes {
        Some(Lenient::Expected(mounts)) => mounts
            .into_iter()
            .filter_map(|mount| normalize_mount(name, mount))
            .collect(),
        Some(Lenient::Other(other)) => {
            warn!(service = %name, shape = %stringify(&other), "Ignoring volumes that are not a list");
            Vec::new()
        }
        None => Vec::new(),
    };

    Ok(ServiceSpec {
        image,
        ports,
        environment,
        replicas,
        constraints,
        tags,
        vlan,
        volumes,
    })
}

/// A sequence stringified element-wise; `None` when the field is absent or not a list
fn string_list(field: Option<Lenient<Vec<Value>>>) -> Option<Vec<String>> {
    field
        .and_then(Lenient::expected)
        .map(|items| items.iter().map(stringify).collect())
}

fn normalize_replicas(raw: Option<&RawNumber>) -> u32 {
    match raw.and_then(RawNumber::leading_int) {
        Some(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => 1,
    }
}

fn normalize_vlan(service: &str, raw: &RawNumber) -> Result<u16, SwarmError> {
    match raw.leading_int() {
        Some(vlan) if (0..=MAX_VLAN).contains(&vlan) => Ok(vlan as u16),
        _ => Err(SwarmError::Schema(format!(
            "Invalid VLAN ID for service {}: {}",
            service, raw
        ))),
    }
}

fn normalize_environment(service: &str, raw: Option<RawEnvironment>) -> IndexMap<String, String> {
    let mut environment = IndexMap::new();

    match raw {
        None => {}
        Some(RawEnvironment::List(entries)) => {
            for entry in entries {
                let entry = match entry {
                    Value::String(entry) => entry,
                    other => {
                        warn!(service = %service, entry = %stringify(&other), "Ignoring non-string environment entry");
                        continue;
                    }
                };
                match entry.split_once('=') {
                    Some((key, value)) => {
                        environment.insert(key.to_string(), value.to_string());
                    }
                    None => {
                        warn!(service = %service, entry = %entry, "Ignoring malformed environment entry");
                    }
                }
            }
        }
        Some(RawEnvironment::Map(mapping)) => {
            for (key, value) in mapping {
                let key = stringify(&key);
                let value = match value {
                    Value::Null => env::var(&key).unwrap_or_default(),
                    other => stringify(&other),
                };
                environment.insert(key, value);
            }
        }
        Some(RawEnvironment::Other(other)) => {
            warn!(service = %service, shape = %stringify(&other), "Ignoring unrecognized environment");
        }
    }

    environment
}

fn normalize_mount(service: &str, raw: RawMount) -> Option<VolumeMount> {
    match raw {
        RawMount::Short(spec) => {
            let mut parts = spec.splitn(3, ':');
            let volume = parts.next().filter(|p| !p.is_empty());
            let target = parts.next().filter(|p| !p.is_empty());
            let mode = parts.next().filter(|p| !p.is_empty());
            match (volume, target) {
                (Some(volume), Some(target)) => Some(VolumeMount {
                    volume: volume.to_string(),
                    target: target.to_string(),
                    mode: mode.map(str::to_string),
                }),
                _ => {
                    warn!(service = %service, mount = %spec, "Ignoring volume mount without volume and target");
                    None
                }
            }
        }
        RawMount::Long(RawLongMount {
            source,
            volume,
            target,
            destination,
            mode,
        }) => {
            let volume = first_string(source, volume);
            let target = first_string(target, destination);
            match (volume, target) {
                (Some(volume), Some(target)) => Some(VolumeMount {
                    volume,
                    target,
                    mode: mode.and_then(Lenient::expected),
                }),
                _ => {
                    warn!(service = %service, "Ignoring volume mount missing source or target");
                    None
                }
            }
        }
        RawMount::Other(other) => {
            warn!(service = %service, mount = %stringify(&other), "Ignoring unrecognized volume mount");
            None
        }
    }
}

fn first_string(primary: Option<Lenient<String>>, fallback: Option<Lenient<String>>) -> Option<String> {
    primary
        .and_then(Lenient::expected)
        .or_else(|| fallback.and_then(Lenient::expected))
        .filter(|s| !s.is_empty())
}

fn normalize_volume(name: &str, raw: RawVolume) -> Option<VolumeDefinition> {
    match raw {
        RawVolume::Bare(subvolume) => Some(VolumeDefinition {
            subvolume,
            options: IndexMap::new(),
            external: false,
        }),
        RawVolume::Detailed(RawVolumeDefinition {
            subvolume,
            options,
            external,
        }) => Some(VolumeDefinition {
            subvolume: subvolume
                .and_then(Lenient::expected)
                .unwrap_or_else(|| name.to_string()),
            options: options
                .and_then(Lenient::expected)
                .map(stringify_mapping)
                .unwrap_or_default(),
            external: external.and_then(Lenient::expected).unwrap_or(false),
        }),
        RawVolume::Other(Value::Null) => Some(VolumeDefinition {
            subvolume: name.to_string(),
            ..Default::default()
        }),
        RawVolume::Other(other) => {
            warn!(volume = %name, shape = %stringify(&other), "Ignoring unrecognized volume definition");
            None
        }
    }
}

fn stringify_mapping(mapping: Mapping) -> IndexMap<String, String> {
    mapping
        .iter()
        .map(|(key, value)| (stringify(key), stringify(value)))
        .collect()
}
