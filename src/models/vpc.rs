//! VPC data model.

use super::tags::{has_owned, Tags};
use super::Ipv4;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of availability zones a cluster spreads over.
pub const DEFAULT_AZ_USAGE_LIMIT: usize = 3;

/// How zones are picked when more are available than the usage limit.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneSelection {
    /// Lexicographically first zones.
    #[default]
    Ordered,
    /// Uniformly random zones.
    Random,
}

impl std::str::FromStr for ZoneSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordered" => Ok(ZoneSelection::Ordered),
            "random" => Ok(ZoneSelection::Random),
            other => Err(format!("unknown zone selection {other:?}")),
        }
    }
}

/// Whether this cluster owns the lifecycle of its network.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagementMode {
    /// Created, configured and deleted by the cluster.
    #[default]
    Managed,
    /// Pre-existing; only used, never created or deleted.
    Unmanaged,
}

impl ManagementMode {
    /// True for [`ManagementMode::Unmanaged`].
    pub fn is_unmanaged(&self) -> bool {
        matches!(self, ManagementMode::Unmanaged)
    }
}

impl fmt::Display for ManagementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagementMode::Managed => f.write_str("managed"),
            ManagementMode::Unmanaged => f.write_str("unmanaged"),
        }
    }
}

/// The cluster's virtual network.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    /// Cloud assigned id; set by the user for an existing VPC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Primary CIDR block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<Ipv4>,
    /// Tags on the VPC.
    #[serde(default)]
    pub tags: Tags,
    /// Maximum number of zones to spread default subnets over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone_usage_limit: Option<usize>,
    /// How zones are picked above the limit.
    #[serde(default)]
    pub availability_zone_selection: ZoneSelection,
    /// Management mode, resolved once when the VPC is reconciled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ManagementMode>,
}

impl VpcSpec {
    /// Classify the VPC from its id and tags.
    ///
    /// A VPC with an id that is not tagged as owned by `cluster_name` was
    /// brought by the user and is unmanaged.
    pub fn management_mode(&self, cluster_name: &str) -> ManagementMode {
        if self.id.is_some() && !has_owned(&self.tags, cluster_name) {
            ManagementMode::Unmanaged
        } else {
            ManagementMode::Managed
        }
    }

    /// Resolved management mode, classifying from tags if not yet resolved.
    pub fn mode_or_classify(&self, cluster_name: &str) -> ManagementMode {
        self.mode
            .unwrap_or_else(|| self.management_mode(cluster_name))
    }

    /// Zone usage limit with the default applied.
    pub fn az_usage_limit(&self) -> usize {
        self.availability_zone_usage_limit
            .unwrap_or(DEFAULT_AZ_USAGE_LIMIT)
    }
}
