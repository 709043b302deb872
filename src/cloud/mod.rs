//! Cloud provider API surface.
//!
//! The reconciler only talks to the cloud through these traits:
//! - [`Ec2Api`] - zones, VPCs, subnets, routing, tags and security groups
//! - [`ElbApi`] - classic and v2 load balancers and target groups
//! - [`TaggingApi`] - the resource tagging API used by garbage collection
//!
//! All calls are blocking. [`MemoryCloud`] implements every trait in memory
//! and can be loaded from and saved to a JSON snapshot.

mod error;
mod memory;
mod snapshot;

pub use error::{
    CloudError, CloudResult, DEPENDENCY_VIOLATION, GROUP_NOT_FOUND, LOAD_BALANCER_NOT_FOUND,
    SUBNET_NOT_FOUND, TARGET_GROUP_NOT_FOUND, VPC_NOT_FOUND,
};
pub use memory::MemoryCloud;
pub use snapshot::{read_cloud_snapshot, write_cloud_snapshot, CloudSnapshot};

use crate::models::{Ipv4, Tags};
use serde::{Deserialize, Serialize};

/// Subnet state while it is being provisioned.
pub const STATE_PENDING: &str = "pending";
/// Subnet, VPC or NAT gateway state once usable.
pub const STATE_AVAILABLE: &str = "available";

/// The provider's API limit on resources per tag description call.
pub const MAX_TAG_DESCRIBE_BATCH: usize = 20;

/// An availability zone in the region.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityZone {
    pub zone_name: String,
    /// "available", "impaired", ...
    pub state: String,
    /// "availability-zone", "local-zone" or "wavelength-zone".
    pub zone_type: String,
}

/// A VPC as returned by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudVpc {
    pub vpc_id: String,
    pub cidr_block: Ipv4,
    pub state: String,
    #[serde(default)]
    pub tags: Tags,
}

/// A subnet as returned by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudSubnet {
    pub subnet_id: String,
    pub vpc_id: String,
    pub cidr_block: Ipv4,
    pub availability_zone: String,
    pub state: String,
    #[serde(default)]
    pub map_public_ip_on_launch: bool,
    #[serde(default)]
    pub tags: Tags,
}

/// Filter for [`Ec2Api::describe_subnets`]; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetFilter {
    pub vpc_id: Option<String>,
    pub subnet_ids: Vec<String>,
    /// Only subnets in one of these states.
    pub states: Vec<String>,
    /// Only subnets carrying this tag key and value.
    pub tag: Option<(String, String)>,
}

/// A route in a route table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub destination_cidr_block: String,
    #[serde(default)]
    pub gateway_id: Option<String>,
    #[serde(default)]
    pub nat_gateway_id: Option<String>,
}

/// Association of a route table with a subnet, or the VPC main marker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableAssociation {
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub main: bool,
}

/// A route table and the subnets it is associated with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    pub route_table_id: String,
    pub vpc_id: String,
    #[serde(default)]
    pub associations: Vec<RouteTableAssociation>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// A NAT gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NatGateway {
    pub nat_gateway_id: String,
    pub subnet_id: String,
    pub vpc_id: String,
    pub state: String,
}

/// A security group.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    pub group_id: String,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

/// A resource identifier (name or ARN) with its tags.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaggedResource {
    pub resource: String,
    #[serde(default)]
    pub tags: Tags,
}

/// Compute API.
pub trait Ec2Api {
    fn describe_availability_zones(&self) -> CloudResult<Vec<AvailabilityZone>>;

    /// Fails with a not-found error if any id is unknown.
    fn describe_vpcs(&self, vpc_ids: &[String]) -> CloudResult<Vec<CloudVpc>>;
    fn create_vpc(&self, cidr_block: &Ipv4, tags: &Tags) -> CloudResult<CloudVpc>;
    fn delete_vpc(&self, vpc_id: &str) -> CloudResult<()>;

    fn describe_subnets(&self, filter: &SubnetFilter) -> CloudResult<Vec<CloudSubnet>>;
    fn create_subnet(
        &self,
        vpc_id: &str,
        cidr_block: &Ipv4,
        availability_zone: &str,
        tags: &Tags,
    ) -> CloudResult<CloudSubnet>;
    fn modify_subnet_map_public_ip(&self, subnet_id: &str, enabled: bool) -> CloudResult<()>;
    fn delete_subnet(&self, subnet_id: &str) -> CloudResult<()>;

    fn describe_route_tables(&self, vpc_id: &str) -> CloudResult<Vec<RouteTable>>;
    fn describe_nat_gateways(&self, vpc_id: &str) -> CloudResult<Vec<NatGateway>>;

    /// Add or overwrite tags on any EC2 resource.
    fn create_tags(&self, resource_id: &str, tags: &Tags) -> CloudResult<()>;

    fn describe_security_groups(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> CloudResult<Vec<SecurityGroup>>;
    fn delete_security_group(&self, group_id: &str) -> CloudResult<()>;
}

/// Load balancing API, classic (by name) and v2 (by ARN).
pub trait ElbApi {
    /// Names of all classic load balancers.
    fn describe_load_balancers(&self) -> CloudResult<Vec<String>>;
    /// Tags of at most [`MAX_TAG_DESCRIBE_BATCH`] classic load balancers.
    fn describe_load_balancer_tags(&self, names: &[String]) -> CloudResult<Vec<TaggedResource>>;
    fn delete_load_balancer(&self, name: &str) -> CloudResult<()>;

    /// ARNs of all v2 (application/network) load balancers.
    fn describe_load_balancers_v2(&self) -> CloudResult<Vec<String>>;
    /// ARNs of all target groups.
    fn describe_target_groups(&self) -> CloudResult<Vec<String>>;
    /// Tags of at most [`MAX_TAG_DESCRIBE_BATCH`] v2 resources.
    fn describe_tags_v2(&self, arns: &[String]) -> CloudResult<Vec<TaggedResource>>;
    fn delete_load_balancer_v2(&self, arn: &str) -> CloudResult<()>;
    fn delete_target_group(&self, arn: &str) -> CloudResult<()>;
}

/// Resource groups tagging API.
pub trait TaggingApi {
    /// ARNs and tags of every resource tagged `tag_key` with one of `tag_values`.
    fn get_resources(&self, tag_key: &str, tag_values: &[String])
        -> CloudResult<Vec<TaggedResource>>;
}
