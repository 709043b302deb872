//! Observed subnet state.
//!
//! Reads subnets, route tables and NAT gateways and folds them into
//! [`SubnetSpec`] values comparable with the desired ones.

use crate::cloud::{
    CloudError, CloudSubnet, Ec2Api, NatGateway, RouteTable, SubnetFilter, STATE_AVAILABLE,
    STATE_PENDING,
};
use crate::error::{Error, Result};
use crate::events::{reasons, EventRecorder};
use crate::models::tags::{cluster_tag_key, has_public_role};
use crate::models::{ResourceLifecycle, SubnetSpec, Subnets};
use std::collections::HashMap;

/// Prefix of internet gateway ids.
pub const INTERNET_GATEWAY_PREFIX: &str = "igw";

/// Describe the subnets of a cluster.
///
/// Subnets are looked up by `vpc_id` when known, otherwise by the cluster
/// ownership tag. Only pending and available subnets are returned.
///
/// # Arguments
/// * `ec2` - Compute API
/// * `recorder` - Receives a `FailedDescribeSubnet` warning on failure
/// * `vpc_id` - VPC to look in, if known
/// * `cluster_name` - Cluster whose ownership tag is used without a VPC id
pub fn describe_vpc_subnets(
    ec2: &dyn Ec2Api,
    recorder: &dyn EventRecorder,
    vpc_id: Option<&str>,
    cluster_name: &str,
) -> Result<Subnets> {
    describe(ec2, vpc_id, cluster_name).map_err(|(resource, e)| {
        recorder.warn(
            reasons::FAILED_DESCRIBE_SUBNET,
            format!("Failed to describe {resource} in VPC {vpc_id:?}: {e}"),
        );
        Error::describe(resource, e)
    })
}

fn describe(
    ec2: &dyn Ec2Api,
    vpc_id: Option<&str>,
    cluster_name: &str,
) -> std::result::Result<Subnets, (&'static str, CloudError)> {
    let mut filter = SubnetFilter {
        states: vec![STATE_PENDING.to_string(), STATE_AVAILABLE.to_string()],
        ..Default::default()
    };
    match vpc_id {
        Some(id) => filter.vpc_id = Some(id.to_string()),
        None => {
            filter.tag = Some((
                cluster_tag_key(cluster_name),
                ResourceLifecycle::Owned.as_str().to_string(),
            ))
        }
    }
    let subnets = ec2.describe_subnets(&filter).map_err(|e| ("subnets", e))?;

    // Route tables and NAT gateways are scoped by VPC; without one there is
    // nothing to attach.
    let (route_tables, nat_gateways) = match vpc_id {
        Some(id) => (
            ec2.describe_route_tables(id).map_err(|e| ("route tables", e))?,
            ec2.describe_nat_gateways(id).map_err(|e| ("NAT gateways", e))?,
        ),
        None => (Vec::new(), Vec::new()),
    };

    let routing = RoutingIndex::new(&route_tables);
    let nat_by_subnet: HashMap<&str, &NatGateway> = nat_gateways
        .iter()
        .filter(|n| n.state == STATE_PENDING || n.state == STATE_AVAILABLE)
        .map(|n| (n.subnet_id.as_str(), n))
        .collect();

    let observed: Vec<SubnetSpec> = subnets
        .iter()
        .map(|s| observed_subnet(s, &routing, &nat_by_subnet))
        .collect();
    log::debug!("described {} subnet(s) in VPC {vpc_id:?}", observed.len());
    Ok(Subnets(observed))
}

/// Route table lookup by subnet, with the VPC main table as fallback.
struct RoutingIndex<'a> {
    by_subnet: HashMap<&'a str, &'a RouteTable>,
    main: Option<&'a RouteTable>,
}

impl<'a> RoutingIndex<'a> {
    fn new(route_tables: &'a [RouteTable]) -> Self {
        let mut by_subnet = HashMap::new();
        let mut main = None;
        for rt in route_tables {
            for assoc in &rt.associations {
                if assoc.main {
                    main = Some(rt);
                }
                if let Some(subnet_id) = &assoc.subnet_id {
                    by_subnet.insert(subnet_id.as_str(), rt);
                }
            }
        }
        RoutingIndex { by_subnet, main }
    }

    fn for_subnet(&self, subnet_id: &str) -> Option<&'a RouteTable> {
        self.by_subnet.get(subnet_id).copied().or(self.main)
    }
}

fn routes_to_internet_gateway(rt: &RouteTable) -> bool {
    rt.routes.iter().any(|r| {
        r.gateway_id
            .as_deref()
            .map(|g| g.starts_with(INTERNET_GATEWAY_PREFIX))
            .unwrap_or(false)
    })
}

fn observed_subnet(
    subnet: &CloudSubnet,
    routing: &RoutingIndex<'_>,
    nat_by_subnet: &HashMap<&str, &NatGateway>,
) -> SubnetSpec {
    let route_table = routing.for_subnet(&subnet.subnet_id);
    let is_public =
        has_public_role(&subnet.tags) || route_table.map(routes_to_internet_gateway).unwrap_or(false);
    SubnetSpec {
        id: Some(subnet.subnet_id.clone()),
        cidr_block: Some(subnet.cidr_block),
        availability_zone: subnet.availability_zone.clone(),
        is_public,
        route_table_id: route_table.map(|rt| rt.route_table_id.clone()),
        nat_gateway_id: nat_by_subnet
            .get(subnet.subnet_id.as_str())
            .map(|n| n.nat_gateway_id.clone()),
        tags: subnet.tags.clone(),
    }
}
