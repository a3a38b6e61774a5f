//! Overlay network (SDN) operations
//!
//! Arguments are validated in full before the backend is called, so an
//! invalid tag or VLAN never results in a partial call.

use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use ipnet::IpNet;
use tracing::debug;

use crate::backend::{Backend, Credentials};
use crate::errors::SwarmError;

/// VLAN IDs accepted when creating or attaching to a network
pub const VLAN_RANGE: RangeInclusive<i64> = 1..=4094;

/// MTU values accepted for interface configuration
pub const MTU_RANGE: RangeInclusive<u32> = 68..=65535;

pub const INVALID_VLAN_MESSAGE: &str = "VLAN must be an integer between 1 and 4094";

/// Check a tag or ACL token: ASCII alphanumerics plus `_ . : -`
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
}

pub fn validate_tags(tags: &[String]) -> Result<(), SwarmError> {
    match tags.iter().find(|tag| !is_valid_token(tag)) {
        Some(tag) => Err(SwarmError::Validation(format!("Invalid tag format: {}", tag))),
        None => Ok(()),
    }
}

pub fn validate_vlan(vlan: i64) -> Result<u16, SwarmError> {
    if VLAN_RANGE.contains(&vlan) {
        Ok(vlan as u16)
    } else {
        Err(SwarmError::Validation(INVALID_VLAN_MESSAGE.to_string()))
    }
}

fn validate_address(ip: &str) -> Result<(), SwarmError> {
    if ip.parse::<IpNet>().is_ok() || ip.parse::<IpAddr>().is_ok() {
        Ok(())
    } else {
        Err(SwarmError::Validation(format!("Invalid interface address: {}", ip)))
    }
}

fn validate_mtu(mtu: u32) -> Result<(), SwarmError> {
    if MTU_RANGE.contains(&mtu) {
        Ok(())
    } else {
        Err(SwarmError::Validation(format!(
            "MTU must be between {} and {}",
            MTU_RANGE.start(),
            MTU_RANGE.end()
        )))
    }
}

fn validate_acls(acls: &[String]) -> Result<(), SwarmError> {
    match acls.iter().find(|acl| !is_valid_token(acl)) {
        Some(acl) => Err(SwarmError::Validation(format!("Invalid ACL format: {}", acl))),
        None => Ok(()),
    }
}

/// `attach <unit> <network> [--tags a,b] [--vlan N]`
pub fn attach_args(
    unit_id: &str,
    network: &str,
    tags: Option<&[String]>,
    vlan: Option<i64>,
) -> Result<Vec<String>, SwarmError> {
    let tags = tags.unwrap_or_default();
    validate_tags(tags)?;
    let vlan = vlan.map(validate_vlan).transpose()?;

    let mut args = vec!["attach".to_string(), unit_id.to_string(), network.to_string()];
    if !tags.is_empty() {
        args.push("--tags".to_string());
        args.push(tags.join(","));
    }
    if let Some(vlan) = vlan {
        args.push("--vlan".to_string());
        args.push(vlan.to_string());
    }
    Ok(args)
}

/// `create <name> [--zone z] [--vlan N]`
pub fn create_args(
    name: &str,
    zone: Option<&str>,
    vlan: Option<i64>,
) -> Result<Vec<String>, SwarmError> {
    let vlan = vlan.map(validate_vlan).transpose()?;

    let mut args = vec!["create".to_string(), name.to_string()];
    if let Some(zone) = zone {
        args.push("--zone".to_string());
        args.push(zone.to_string());
    }
    if let Some(vlan) = vlan {
        args.push("--vlan".to_string());
        args.push(vlan.to_string());
    }
    Ok(args)
}

/// `iface <iface> [--ip ip] [--mtu n] [--acl a,b]`
pub fn interface_args(
    iface: &str,
    ip: Option<&str>,
    mtu: Option<u32>,
    acls: Option<&[String]>,
) -> Result<Vec<String>, SwarmError> {
    let acls = acls.unwrap_or_default();
    if let Some(ip) = ip {
        validate_address(ip)?;
    }
    if let Some(mtu) = mtu {
        validate_mtu(mtu)?;
    }
    validate_acls(acls)?;

    let mut args = vec!["iface".to_string(), iface.to_string()];
    if let Some(ip) = ip {
        args.push("--ip".to_string());
        args.push(ip.to_string());
    }
    if let Some(mtu) = mtu {
        args.push("--mtu".to_string());
        args.push(mtu.to_string());
    }
    if !acls.is_empty() {
        args.push("--acl".to_string());
        args.push(acls.join(","));
    }
    Ok(args)
}

/// Network operations against the backend's `sdn` verbs
pub struct NetworkOps {
    backend: Arc<dyn Backend>,
}

impl NetworkOps {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn attach_to_sdn(
        &self,
        credentials: &Credentials,
        unit_id: &str,
        network: &str,
        tags: Option<&[String]>,
        vlan: Option<i64>,
    ) -> Result<i32, SwarmError> {
        let args = attach_args(unit_id, network, tags, vlan)?;
        Ok(self.call(args, credentials).await)
    }

    pub async fn detach_from_sdn(
        &self,
        credentials: &Credentials,
        unit_id: &str,
        network: &str,
    ) -> i32 {
        let args = vec!["detach".to_string(), unit_id.to_string(), network.to_string()];
        self.call(args, credentials).await
    }

    pub async fn create_network(
        &self,
        credentials: &Credentials,
        name: &str,
        zone: Option<&str>,
        vlan: Option<i64>,
    ) -> Result<i32, SwarmError> {
        let args = create_args(name, zone, vlan)?;
        Ok(self.call(args, credentials).await)
    }

    pub async fn delete_network(&self, credentials: &Credentials, name: &str) -> i32 {
        let args = vec!["delete".to_string(), name.to_string()];
        self.call(args, credentials).await
    }

    pub async fn configure_interface(
        &self,
        credentials: &Credentials,
        iface: &str,
        ip: Option<&str>,
        mtu: Option<u32>,
        acls: Option<&[String]>,
    ) -> Result<i32, SwarmError> {
        let args = interface_args(iface, ip, mtu, acls)?;
        Ok(self.call(args, credentials).await)
    }

    async fn call(&self, args: Vec<String>, credentials: &Credentials) -> i32 {
        debug!(?args, "SDN call");
        self.backend.sdn(&args, credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_attach_args_order() {
        let tags = strings(&["a", "b"]);
        let args = attach_args("101", "net", Some(&tags), Some(5)).unwrap();
        assert_eq!(args, strings(&["attach", "101", "net", "--tags", "a,b", "--vlan", "5"]));
    }

    #[test]
    fn test_attach_args_without_extras() {
        let args = attach_args("100", "net", None, None).unwrap();
        assert_eq!(args, strings(&["attach", "100", "net"]));

        let empty: Vec<String> = Vec::new();
        let args = attach_args("100", "net", Some(&empty), None).unwrap();
        assert_eq!(args, strings(&["attach", "100", "net"]));
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let tags = strings(&["ok", "has space", "also bad"]);
        let err = attach_args("100", "net", Some(&tags), None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid tag format: has space");
    }

    #[test]
    fn test_vlan_bounds() {
        assert!(validate_vlan(1).is_ok());
        assert!(validate_vlan(4094).is_ok());
        for bad in [0, -1, 4095, 5000] {
            let err = validate_vlan(bad).unwrap_err();
            assert_eq!(err.to_string(), INVALID_VLAN_MESSAGE);
        }
    }

    #[test]
    fn test_create_args() {
        let args = create_args("overlay", Some("zone1"), Some(42)).unwrap();
        assert_eq!(args, strings(&["create", "overlay", "--zone", "zone1", "--vlan", "42"]));
        assert!(create_args("overlay", None, Some(5000)).is_err());
    }

    #[test]
    fn test_interface_args() {
        let acls = strings(&["allow-ssh", "deny-all"]);
        let args = interface_args("eth0", Some("10.0.0.2/24"), Some(1500), Some(&acls)).unwrap();
        assert_eq!(
            args,
            strings(&["iface", "eth0", "--ip", "10.0.0.2/24", "--mtu", "1500", "--acl", "allow-ssh,deny-all"])
        );
        assert!(interface_args("eth0", Some("10.0.0.300"), None, None).is_err());
        assert!(interface_args("eth0", None, Some(20), None).is_err());
    }
}
