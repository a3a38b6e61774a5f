//! Daemon API models

use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A normalized compose descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentModel {
    /// Services in document order
    #[serde(default)]
    pub services: IndexMap<String, ServiceSpec>,

    /// Named volumes in document order
    #[serde(default)]
    pub volumes: IndexMap<String, VolumeDefinition>,
}

/// One deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Image reference, empty when the descriptor omitted it
    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub environment: IndexMap<String, String>,

    /// Always at least 1
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default)]
    pub constraints: Vec<String>,

    /// `None` when the descriptor has no tags key, which differs from an empty list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// VLAN ID in `0..=4094`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,

    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
}

fn default_replicas() -> u32 {
    1
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            image: String::new(),
            ports: Vec::new(),
            environment: IndexMap::new(),
            replicas: default_replicas(),
            constraints: Vec::new(),
            tags: None,
            vlan: None,
            volumes: Vec::new(),
        }
    }
}

/// Reference from a service to a named volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub volume: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// A named storage volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDefinition {
    /// Backend subvolume path
    pub subvolume: String,

    /// Free-form options, filtered per operation before reaching the backend
    #[serde(default)]
    pub options: IndexMap<String, String>,

    /// Pre-existing volume that must not be created
    #[serde(default)]
    pub external: bool,
}

/// Backend credentials; absent fields fall back to the backend's own defaults
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "expose_password",
        deserialize_with = "protect_password"
    )]
    pub password: Option<SecretString>,
}

impl Credentials {
    pub fn new(host: Option<String>, user: Option<String>, password: Option<String>) -> Self {
        Self {
            host,
            user,
            password: password.map(SecretString::from),
        }
    }

    /// Check whether no credential was supplied
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.user.is_none() && self.password.is_none()
    }
}

fn expose_password<S>(password: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match password {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

fn protect_password<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// `POST /compose/parse`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    /// Descriptor path on the daemon's filesystem
    pub file: String,
}

/// `POST /deploy`
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Descriptor path on the daemon's filesystem
    pub compose: String,

    #[serde(default)]
    pub auth: Credentials,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdn_network: Option<String>,

    #[serde(default)]
    pub create_sdn: bool,
}

/// `POST /start` and `POST /stop`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UnitRequest {
    pub vmid: String,

    #[serde(default)]
    pub auth: Credentials,
}

/// `POST /network/attach`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AttachRequest {
    #[serde(default)]
    pub auth: Credentials,

    pub vmid: String,

    pub network: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<i64>,
}

/// `POST /storage/subvolume`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SubvolumeRequest {
    #[serde(default)]
    pub auth: Credentials,

    pub subvolume: String,

    #[serde(default)]
    pub options: IndexMap<String, String>,
}

/// `POST /storage/mount`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MountRequest {
    #[serde(default)]
    pub auth: Credentials,

    pub vmid: String,

    pub target: String,

    pub subvolume: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default)]
    pub options: IndexMap<String, String>,
}

/// Backend exit status of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: i32,
}

impl StatusResponse {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Error body for 4xx and 5xx responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatusResponse {
    /// Always `"ok"` while the daemon answers
    pub status: String,
    pub pid: u32,
    pub version: String,
    pub state: String,
    pub started_at: String,
    pub uptime_secs: u64,
    pub hostname: String,
}
