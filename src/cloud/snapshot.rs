//! Serializable snapshot of a cloud account.
//!
//! Backs [`super::MemoryCloud`] and can be read from or written to a JSON file.

use super::{AvailabilityZone, CloudSubnet, CloudVpc, NatGateway, RouteTable, SecurityGroup};
use super::TaggedResource;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a [`super::MemoryCloud`] knows about.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudSnapshot {
    /// Region used when building ARNs.
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub availability_zones: Vec<AvailabilityZone>,
    #[serde(default)]
    pub vpcs: Vec<CloudVpc>,
    #[serde(default)]
    pub subnets: Vec<CloudSubnet>,
    #[serde(default)]
    pub route_tables: Vec<RouteTable>,
    #[serde(default)]
    pub nat_gateways: Vec<NatGateway>,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroup>,
    /// Classic load balancers, by name.
    #[serde(default)]
    pub load_balancers: Vec<TaggedResource>,
    /// Application and network load balancers, by ARN.
    #[serde(default)]
    pub load_balancers_v2: Vec<TaggedResource>,
    /// Target groups, by ARN.
    #[serde(default)]
    pub target_groups: Vec<TaggedResource>,
    /// Counter for generated resource ids.
    #[serde(default)]
    pub next_id: u64,
}

fn default_region() -> String {
    crate::models::FAKE_REGION.to_string()
}

impl CloudSnapshot {
    /// Empty account in `region` with one available zone per name.
    pub fn with_zones(region: &str, zones: &[&str]) -> Self {
        CloudSnapshot {
            region: region.to_string(),
            availability_zones: zones
                .iter()
                .map(|z| AvailabilityZone {
                    zone_name: z.to_string(),
                    state: super::STATE_AVAILABLE.to_string(),
                    zone_type: "availability-zone".to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// Read a snapshot from a JSON file.
///
/// # Returns
/// * `Ok(CloudSnapshot)` - The parsed snapshot
/// * `Err` - If the file is missing or does not parse, with the JSON path of the problem
pub fn read_cloud_snapshot(file: &str) -> Result<CloudSnapshot> {
    if !Path::new(file).exists() {
        return Err(Error::State(format!("Snapshot file does not exist: {file}")));
    }
    log::info!("Reading cloud snapshot: {file}");
    let json = std::fs::read_to_string(file).map_err(|e| Error::io(file, e))?;
    let mut deserializer = serde_json::Deserializer::from_str(&json);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| Error::json(file, e))
}

/// Write a snapshot to a JSON file.
pub fn write_cloud_snapshot(file: &str, snapshot: &CloudSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot).map_err(|e| Error::Json {
        file: file.to_string(),
        path: ".".to_string(),
        source: e,
    })?;
    log::info!("Writing cloud snapshot: {file}");
    std::fs::write(file, json).map_err(|e| Error::io(file, e))
}
