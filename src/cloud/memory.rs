//! In-memory cloud account.
//!
//! Implements every cloud trait on top of a [`CloudSnapshot`]. Calls are
//! recorded in order so callers can check what was done, and failures can be
//! injected per operation to exercise retry and error paths.

use super::error::{
    CloudError, CloudResult, GROUP_NOT_FOUND, LOAD_BALANCER_NOT_FOUND, SUBNET_NOT_FOUND,
    TARGET_GROUP_NOT_FOUND, VPC_NOT_FOUND,
};
use super::{
    AvailabilityZone, CloudSnapshot, CloudSubnet, CloudVpc, Ec2Api, ElbApi, NatGateway,
    RouteTable, SecurityGroup, SubnetFilter, TaggedResource, TaggingApi, MAX_TAG_DESCRIBE_BATCH,
    STATE_AVAILABLE, STATE_PENDING,
};
use crate::models::{Arn, Ipv4, Tags, FAKE_ACCOUNT};
use std::cell::RefCell;
use std::collections::HashMap;

/// Cloud account held in memory.
#[derive(Debug, Default)]
pub struct MemoryCloud {
    state: RefCell<CloudSnapshot>,
    calls: RefCell<Vec<String>>,
    faults: RefCell<HashMap<String, (CloudError, u32)>>,
    /// Describes left before a new subnet leaves the pending state.
    pending: RefCell<HashMap<String, u32>>,
    pending_polls: u32,
}

impl MemoryCloud {
    pub fn new(snapshot: CloudSnapshot) -> Self {
        MemoryCloud {
            state: RefCell::new(snapshot),
            ..Default::default()
        }
    }

    /// New subnets report `pending` for this many describe calls.
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Make the next `times` calls of `operation` fail with `code`.
    pub fn fail_next(&self, operation: &str, code: &str, times: u32) {
        self.faults.borrow_mut().insert(
            operation.to_string(),
            (CloudError::new(code, format!("injected failure for {operation}")), times),
        );
    }

    /// Copy of the current account state.
    pub fn snapshot(&self) -> CloudSnapshot {
        self.state.borrow().clone()
    }

    /// Every recorded call as `"operation target"`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of recorded calls of `operation`.
    pub fn count_calls(&self, operation: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .count()
    }

    /// Recorded calls of the given operations, in order.
    pub fn calls_of(&self, operations: &[&str]) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| {
                c.split(' ')
                    .next()
                    .map(|op| operations.contains(&op))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn record(&self, operation: &str, target: &str) -> CloudResult<()> {
        log::trace!("memory cloud: {operation} {target}");
        self.calls
            .borrow_mut()
            .push(format!("{operation} {target}"));
        let mut faults = self.faults.borrow_mut();
        let fault = faults.get_mut(operation).map(|(err, left)| {
            *left -= 1;
            (err.clone(), *left)
        });
        if let Some((err, left)) = fault {
            if left == 0 {
                faults.remove(operation);
            }
            return Err(err);
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        format!("{prefix}-{:08x}", state.next_id)
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        let region = self.state.borrow().region.clone();
        Arn {
            region,
            account_id: FAKE_ACCOUNT.to_string(),
            ..Arn::synthesize(service, resource)
        }
        .to_string()
    }
}

fn matches_filter(subnet: &CloudSubnet, filter: &SubnetFilter) -> bool {
    if let Some(vpc_id) = &filter.vpc_id {
        if &subnet.vpc_id != vpc_id {
            return false;
        }
    }
    if !filter.subnet_ids.is_empty() && !filter.subnet_ids.contains(&subnet.subnet_id) {
        return false;
    }
    if !filter.states.is_empty() && !filter.states.contains(&subnet.state) {
        return false;
    }
    if let Some((key, value)) = &filter.tag {
        if subnet.tags.get(key) != Some(value) {
            return false;
        }
    }
    true
}

fn describe_tags(
    resources: &[TaggedResource],
    ids: &[String],
    not_found: &str,
) -> CloudResult<Vec<TaggedResource>> {
    if ids.len() > MAX_TAG_DESCRIBE_BATCH {
        return Err(CloudError::new(
            "ValidationError",
            format!(
                "at most {MAX_TAG_DESCRIBE_BATCH} resources per call, got {}",
                ids.len()
            ),
        ));
    }
    ids.iter()
        .map(|id| {
            resources
                .iter()
                .find(|r| &r.resource == id)
                .cloned()
                .ok_or_else(|| CloudError::new(not_found, format!("{id} not found")))
        })
        .collect()
}

fn remove_by<T>(items: &mut Vec<T>, code: &str, id: &str, pred: impl Fn(&T) -> bool) -> CloudResult<()> {
    let before = items.len();
    items.retain(|i| !pred(i));
    if items.len() == before {
        return Err(CloudError::new(code, format!("{id} does not exist")));
    }
    Ok(())
}

impl Ec2Api for MemoryCloud {
    fn describe_availability_zones(&self) -> CloudResult<Vec<AvailabilityZone>> {
        self.record("describe_availability_zones", "")?;
        Ok(self.state.borrow().availability_zones.clone())
    }

    fn describe_vpcs(&self, vpc_ids: &[String]) -> CloudResult<Vec<CloudVpc>> {
        self.record("describe_vpcs", &vpc_ids.join(","))?;
        let state = self.state.borrow();
        vpc_ids
            .iter()
            .map(|id| {
                state
                    .vpcs
                    .iter()
                    .find(|v| &v.vpc_id == id)
                    .cloned()
                    .ok_or_else(|| CloudError::new(VPC_NOT_FOUND, format!("vpc {id} does not exist")))
            })
            .collect()
    }

    fn create_vpc(&self, cidr_block: &Ipv4, tags: &Tags) -> CloudResult<CloudVpc> {
        self.record("create_vpc", &cidr_block.to_string())?;
        let vpc = CloudVpc {
            vpc_id: self.next_id("vpc"),
            cidr_block: *cidr_block,
            state: STATE_AVAILABLE.to_string(),
            tags: tags.clone(),
        };
        self.state.borrow_mut().vpcs.push(vpc.clone());
        Ok(vpc)
    }

    fn delete_vpc(&self, vpc_id: &str) -> CloudResult<()> {
        self.record("delete_vpc", vpc_id)?;
        let mut state = self.state.borrow_mut();
        if state.subnets.iter().any(|s| s.vpc_id == vpc_id) {
            return Err(CloudError::new(
                super::DEPENDENCY_VIOLATION,
                format!("vpc {vpc_id} still has subnets"),
            ));
        }
        remove_by(&mut state.vpcs, VPC_NOT_FOUND, vpc_id, |v| v.vpc_id == vpc_id)
    }

    fn describe_subnets(&self, filter: &SubnetFilter) -> CloudResult<Vec<CloudSubnet>> {
        self.record("describe_subnets", filter.vpc_id.as_deref().unwrap_or(""))?;
        let mut pending = self.pending.borrow_mut();
        let mut state = self.state.borrow_mut();
        for subnet in state.subnets.iter_mut() {
            if let Some(left) = pending.get_mut(&subnet.subnet_id) {
                if *left == 0 {
                    subnet.state = STATE_AVAILABLE.to_string();
                    pending.remove(&subnet.subnet_id);
                } else {
                    *left -= 1;
                }
            }
        }
        Ok(state
            .subnets
            .iter()
            .filter(|s| matches_filter(s, filter))
            .cloned()
            .collect())
    }

    fn create_subnet(
        &self,
        vpc_id: &str,
        cidr_block: &Ipv4,
        availability_zone: &str,
        tags: &Tags,
    ) -> CloudResult<CloudSubnet> {
        self.record("create_subnet", &cidr_block.to_string())?;
        {
            let state = self.state.borrow();
            if !state.vpcs.iter().any(|v| v.vpc_id == vpc_id) {
                return Err(CloudError::new(VPC_NOT_FOUND, format!("vpc {vpc_id} does not exist")));
            }
            if let Some(existing) = state
                .subnets
                .iter()
                .find(|s| s.vpc_id == vpc_id && s.cidr_block.overlaps(cidr_block))
            {
                return Err(CloudError::new(
                    "InvalidSubnet.Conflict",
                    format!("{cidr_block} conflicts with {}", existing.cidr_block),
                ));
            }
        }
        let subnet_id = self.next_id("subnet");
        let state = if self.pending_polls > 0 {
            self.pending
                .borrow_mut()
                .insert(subnet_id.clone(), self.pending_polls);
            STATE_PENDING
        } else {
            STATE_AVAILABLE
        };
        let subnet = CloudSubnet {
            subnet_id,
            vpc_id: vpc_id.to_string(),
            cidr_block: *cidr_block,
            availability_zone: availability_zone.to_string(),
            state: state.to_string(),
            map_public_ip_on_launch: false,
            tags: tags.clone(),
        };
        self.state.borrow_mut().subnets.push(subnet.clone());
        Ok(subnet)
    }

    fn modify_subnet_map_public_ip(&self, subnet_id: &str, enabled: bool) -> CloudResult<()> {
        self.record("modify_subnet_map_public_ip", subnet_id)?;
        let mut state = self.state.borrow_mut();
        let subnet = state
            .subnets
            .iter_mut()
            .find(|s| s.subnet_id == subnet_id)
            .ok_or_else(|| CloudError::new(SUBNET_NOT_FOUND, format!("{subnet_id} does not exist")))?;
        subnet.map_public_ip_on_launch = enabled;
        Ok(())
    }

    fn delete_subnet(&self, subnet_id: &str) -> CloudResult<()> {
        self.record("delete_subnet", subnet_id)?;
        let mut state = self.state.borrow_mut();
        remove_by(&mut state.subnets, SUBNET_NOT_FOUND, subnet_id, |s| {
            s.subnet_id == subnet_id
        })
    }

    fn describe_route_tables(&self, vpc_id: &str) -> CloudResult<Vec<RouteTable>> {
        self.record("describe_route_tables", vpc_id)?;
        Ok(self
            .state
            .borrow()
            .route_tables
            .iter()
            .filter(|rt| rt.vpc_id == vpc_id)
            .cloned()
            .collect())
    }

    fn describe_nat_gateways(&self, vpc_id: &str) -> CloudResult<Vec<NatGateway>> {
        self.record("describe_nat_gateways", vpc_id)?;
        Ok(self
            .state
            .borrow()
            .nat_gateways
            .iter()
            .filter(|n| n.vpc_id == vpc_id)
            .cloned()
            .collect())
    }

    fn create_tags(&self, resource_id: &str, tags: &Tags) -> CloudResult<()> {
        self.record("create_tags", resource_id)?;
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let target = state
            .subnets
            .iter_mut()
            .find(|s| s.subnet_id == resource_id)
            .map(|s| &mut s.tags)
            .or_else(|| {
                state
                    .vpcs
                    .iter_mut()
                    .find(|v| v.vpc_id == resource_id)
                    .map(|v| &mut v.tags)
            })
            .or_else(|| {
                state
                    .security_groups
                    .iter_mut()
                    .find(|g| g.group_id == resource_id)
                    .map(|g| &mut g.tags)
            });
        let Some(target) = target else {
            let code = if resource_id.starts_with("vpc-") {
                VPC_NOT_FOUND
            } else {
                SUBNET_NOT_FOUND
            };
            return Err(CloudError::new(code, format!("{resource_id} does not exist")));
        };
        target.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn describe_security_groups(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> CloudResult<Vec<SecurityGroup>> {
        self.record("describe_security_groups", tag_key)?;
        Ok(self
            .state
            .borrow()
            .security_groups
            .iter()
            .filter(|g| g.tags.get(tag_key).map(String::as_str) == Some(tag_value))
            .cloned()
            .collect())
    }

    fn delete_security_group(&self, group_id: &str) -> CloudResult<()> {
        self.record("delete_security_group", group_id)?;
        let mut state = self.state.borrow_mut();
        remove_by(&mut state.security_groups, GROUP_NOT_FOUND, group_id, |g| {
            g.group_id == group_id
        })
    }
}

impl ElbApi for MemoryCloud {
    fn describe_load_balancers(&self) -> CloudResult<Vec<String>> {
        self.record("describe_load_balancers", "")?;
        Ok(self
            .state
            .borrow()
            .load_balancers
            .iter()
            .map(|lb| lb.resource.clone())
            .collect())
    }

    fn describe_load_balancer_tags(&self, names: &[String]) -> CloudResult<Vec<TaggedResource>> {
        self.record("describe_load_balancer_tags", &names.len().to_string())?;
        describe_tags(&self.state.borrow().load_balancers, names, LOAD_BALANCER_NOT_FOUND)
    }

    fn delete_load_balancer(&self, name: &str) -> CloudResult<()> {
        self.record("delete_load_balancer", name)?;
        let mut state = self.state.borrow_mut();
        remove_by(&mut state.load_balancers, LOAD_BALANCER_NOT_FOUND, name, |lb| {
            lb.resource == name
        })
    }

    fn describe_load_balancers_v2(&self) -> CloudResult<Vec<String>> {
        self.record("describe_load_balancers_v2", "")?;
        Ok(self
            .state
            .borrow()
            .load_balancers_v2
            .iter()
            .map(|lb| lb.resource.clone())
            .collect())
    }

    fn describe_target_groups(&self) -> CloudResult<Vec<String>> {
        self.record("describe_target_groups", "")?;
        Ok(self
            .state
            .borrow()
            .target_groups
            .iter()
            .map(|tg| tg.resource.clone())
            .collect())
    }

    fn describe_tags_v2(&self, arns: &[String]) -> CloudResult<Vec<TaggedResource>> {
        self.record("describe_tags_v2", &arns.len().to_string())?;
        let state = self.state.borrow();
        let all: Vec<TaggedResource> = state
            .load_balancers_v2
            .iter()
            .chain(state.target_groups.iter())
            .cloned()
            .collect();
        describe_tags(&all, arns, LOAD_BALANCER_NOT_FOUND)
    }

    fn delete_load_balancer_v2(&self, arn: &str) -> CloudResult<()> {
        self.record("delete_load_balancer_v2", arn)?;
        let mut state = self.state.borrow_mut();
        remove_by(&mut state.load_balancers_v2, LOAD_BALANCER_NOT_FOUND, arn, |lb| {
            lb.resource == arn
        })
    }

    fn delete_target_group(&self, arn: &str) -> CloudResult<()> {
        self.record("delete_target_group", arn)?;
        let mut state = self.state.borrow_mut();
        remove_by(&mut state.target_groups, TARGET_GROUP_NOT_FOUND, arn, |tg| {
            tg.resource == arn
        })
    }
}

impl TaggingApi for MemoryCloud {
    fn get_resources(
        &self,
        tag_key: &str,
        tag_values: &[String],
    ) -> CloudResult<Vec<TaggedResource>> {
        self.record("get_resources", tag_key)?;
        let state = self.state.borrow();
        let mut all: Vec<TaggedResource> = Vec::new();
        all.extend(state.load_balancers.iter().map(|lb| TaggedResource {
            resource: self.arn("elasticloadbalancing", &format!("loadbalancer/{}", lb.resource)),
            tags: lb.tags.clone(),
        }));
        all.extend(state.load_balancers_v2.iter().cloned());
        all.extend(state.target_groups.iter().cloned());
        all.extend(state.security_groups.iter().map(|g| TaggedResource {
            resource: self.arn("ec2", &format!("security-group/{}", g.group_id)),
            tags: g.tags.clone(),
        }));
        all.extend(state.subnets.iter().map(|s| TaggedResource {
            resource: self.arn("ec2", &format!("subnet/{}", s.subnet_id)),
            tags: s.tags.clone(),
        }));
        all.extend(state.vpcs.iter().map(|v| TaggedResource {
            resource: self.arn("ec2", &format!("vpc/{}", v.vpc_id)),
            tags: v.tags.clone(),
        }));
        Ok(all
            .into_iter()
            .filter(|r| {
                r.tags
                    .get(tag_key)
                    .map(|v| tag_values.contains(v))
                    .unwrap_or(false)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_with_vpc() -> (MemoryCloud, String) {
        let cloud = MemoryCloud::new(CloudSnapshot::with_zones("us-east-1", &["us-east-1a"]));
        let vpc = cloud
            .create_vpc(&Ipv4::new("10.0.0.0/16").unwrap(), &Tags::new())
            .unwrap();
        (cloud, vpc.vpc_id)
    }

    #[test]
    fn test_create_subnet_rejects_overlap() {
        let (cloud, vpc_id) = cloud_with_vpc();
        let cidr = Ipv4::new("10.0.0.0/24").unwrap();
        cloud
            .create_subnet(&vpc_id, &cidr, "us-east-1a", &Tags::new())
            .unwrap();
        let err = cloud
            .create_subnet(&vpc_id, &Ipv4::new("10.0.0.0/16").unwrap(), "us-east-1a", &Tags::new())
            .unwrap_err();
        assert_eq!(err.code, "InvalidSubnet.Conflict");
    }

    #[test]
    fn test_pending_subnet_becomes_available() {
        let (cloud, vpc_id) = cloud_with_vpc();
        let cloud = MemoryCloud::new(cloud.snapshot()).with_pending_polls(2);
        let subnet = cloud
            .create_subnet(&vpc_id, &Ipv4::new("10.0.0.0/24").unwrap(), "us-east-1a", &Tags::new())
            .unwrap();
        assert_eq!(subnet.state, STATE_PENDING);

        let filter = SubnetFilter {
            subnet_ids: vec![subnet.subnet_id.clone()],
            ..Default::default()
        };
        assert_eq!(cloud.describe_subnets(&filter).unwrap()[0].state, STATE_PENDING);
        assert_eq!(cloud.describe_subnets(&filter).unwrap()[0].state, STATE_PENDING);
        assert_eq!(cloud.describe_subnets(&filter).unwrap()[0].state, STATE_AVAILABLE);
    }

    #[test]
    fn test_fail_next_is_consumed() {
        let (cloud, _) = cloud_with_vpc();
        cloud.fail_next("describe_availability_zones", "Throttling", 2);
        assert!(cloud.describe_availability_zones().is_err());
        assert!(cloud.describe_availability_zones().is_err());
        assert!(cloud.describe_availability_zones().is_ok());
        assert_eq!(cloud.count_calls("describe_availability_zones"), 3);
    }

    #[test]
    fn test_create_tags_unknown_subnet() {
        let (cloud, _) = cloud_with_vpc();
        let err = cloud.create_tags("subnet-404", &Tags::new()).unwrap_err();
        assert!(err.is_subnet_not_found());
    }

    #[test]
    fn test_describe_tags_limit() {
        let (cloud, _) = cloud_with_vpc();
        let names: Vec<String> = (0..21).map(|i| format!("lb-{i}")).collect();
        let err = cloud.describe_load_balancer_tags(&names).unwrap_err();
        assert_eq!(err.code, "ValidationError");
    }

    #[test]
    fn test_delete_vpc_with_subnets_is_dependency_violation() {
        let (cloud, vpc_id) = cloud_with_vpc();
        cloud
            .create_subnet(&vpc_id, &Ipv4::new("10.0.0.0/24").unwrap(), "us-east-1a", &Tags::new())
            .unwrap();
        assert!(cloud.delete_vpc(&vpc_id).unwrap_err().is_dependency_violation());
    }
}
