//! VPC and subnet reconciliation.
//!
//! [`NetworkService`] drives the observed network toward the desired
//! [`ClusterNetwork`]. A managed network is created, tagged and deleted by
//! the service. An unmanaged one is only matched and tagged as shared.
//!
//! Every pass persists the record through the [`StateStore`], also when the
//! pass fails, so ids of resources created before the failure are kept.

use super::describe::describe_vpc_subnets;
use super::overlap::{find_overlapping_subnets, log_overlapping_subnets};
use super::synthesize::{default_subnets, secondary_subnets};
use super::tagging::{subnet_tag_params, vpc_tag_params, TEMPORARY_RESOURCE_ID};
use super::zones::{select_zones, usable_zones};
use crate::cloud::{
    CloudError, CloudResult, CloudVpc, Ec2Api, SubnetFilter, STATE_AVAILABLE, STATE_PENDING,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{reasons, EventRecorder};
use crate::models::{ManagementMode, SubnetSpec, Subnets, Tags, VpcSpec};
use crate::retry::{retry_with_backoff, wait_for, Backoff};
use crate::state::{ClusterNetwork, StateStore, SUBNETS_READY, VPC_READY};
use itertools::Itertools;
use std::time::Duration;

/// Condition reason set after the network was torn down.
pub const DELETED_REASON: &str = "Deleted";

/// Reconciles the VPC and subnets of one cluster.
pub struct NetworkService<'a> {
    ec2: &'a dyn Ec2Api,
    recorder: &'a dyn EventRecorder,
    store: &'a dyn StateStore,
    backoff: Backoff,
    wait_timeout: Duration,
    wait_interval: Duration,
}

impl<'a> NetworkService<'a> {
    pub fn new(
        ec2: &'a dyn Ec2Api,
        recorder: &'a dyn EventRecorder,
        store: &'a dyn StateStore,
        config: &Config,
    ) -> Self {
        NetworkService {
            ec2,
            recorder,
            store,
            backoff: config.backoff.clone(),
            wait_timeout: config.wait_timeout,
            wait_interval: config.wait_interval,
        }
    }

    /// Reconcile the VPC, then its subnets.
    pub fn reconcile_network(&self, network: &mut ClusterNetwork) -> Result<()> {
        self.reconcile_vpc(network)?;
        self.reconcile_subnets(network)
    }

    /// Create or adopt the VPC and set the `VpcReady` condition.
    pub fn reconcile_vpc(&self, network: &mut ClusterNetwork) -> Result<()> {
        log::info!("Reconciling VPC of cluster {}", network.cluster_name);
        let result = self.ensure_vpc(network);
        match &result {
            Ok(()) => network.mark_true(VPC_READY),
            Err(e) => network.mark_false(VPC_READY, e.condition_reason()),
        }
        self.persist(network, result)
    }

    /// Bring the subnets in line with the desired list and set `SubnetsReady`.
    ///
    /// On success every desired subnet carries the id, routing and tags of
    /// its cloud counterpart.
    pub fn reconcile_subnets(&self, network: &mut ClusterNetwork) -> Result<()> {
        log::info!("Reconciling subnets of cluster {}", network.cluster_name);
        let result = self.ensure_subnets(network);
        match &result {
            Ok(()) => network.mark_true(SUBNETS_READY),
            Err(e) => network.mark_false(SUBNETS_READY, e.condition_reason()),
        }
        self.persist(network, result)
    }

    /// Delete the subnets and the VPC of a managed network.
    ///
    /// Unmanaged networks are left alone. Resources that are already gone
    /// count as deleted.
    pub fn delete_network(&self, network: &mut ClusterNetwork) -> Result<()> {
        let mode = network.vpc.mode_or_classify(&network.cluster_name);
        if mode.is_unmanaged() {
            log::info!(
                "Skipping deletion of unmanaged VPC {:?}",
                network.vpc.id.as_deref().unwrap_or_default()
            );
            return Ok(());
        }
        let Some(vpc_id) = network.vpc.id.clone() else {
            log::info!("No VPC recorded for cluster {}, nothing to delete", network.cluster_name);
            return Ok(());
        };

        let result = self
            .delete_subnets(&vpc_id, &network.cluster_name)
            .and_then(|()| self.delete_vpc(&vpc_id));
        if result.is_ok() {
            network.vpc.id = None;
            network.vpc.mode = None;
            for subnet in network.subnets.iter_mut() {
                subnet.id = None;
                subnet.route_table_id = None;
                subnet.nat_gateway_id = None;
            }
            network.mark_false(VPC_READY, DELETED_REASON);
            network.mark_false(SUBNETS_READY, DELETED_REASON);
        }
        self.persist(network, result)
    }

    /// Save `network` and combine the outcome with the pass `result`.
    ///
    /// A pass error wins over a save error; both are reported.
    fn persist(&self, network: &ClusterNetwork, result: Result<()>) -> Result<()> {
        let Err(save_err) = self.store.save(network) else {
            return result;
        };
        self.recorder.warn(
            reasons::FAILED_PERSIST_STATE,
            format!("Failed to persist state of cluster {}: {save_err}", network.cluster_name),
        );
        match result {
            Ok(()) => Err(save_err),
            Err(e) => {
                log::error!("Persisting state failed after an earlier error: {save_err}");
                Err(e)
            }
        }
    }

    fn ensure_vpc(&self, network: &mut ClusterNetwork) -> Result<()> {
        let Some(vpc_id) = network.vpc.id.clone() else {
            return self.create_vpc(network);
        };

        let observed = self.describe_vpc(&vpc_id)?;
        if observed.state != STATE_AVAILABLE && observed.state != STATE_PENDING {
            return Err(Error::Config(format!(
                "VPC {vpc_id} is in state {:?}",
                observed.state
            )));
        }

        // Decided once; later passes reuse the recorded mode.
        let mode = match network.vpc.mode {
            Some(mode) => mode,
            None => {
                let classified = VpcSpec {
                    id: Some(vpc_id.clone()),
                    tags: observed.tags.clone(),
                    ..Default::default()
                }
                .management_mode(&network.cluster_name);
                network.vpc.mode = Some(classified);
                classified
            }
        };
        log::debug!("VPC {vpc_id} is {mode}");

        network.vpc.cidr_block = Some(observed.cidr_block);
        if mode.is_unmanaged() {
            network.vpc.tags = observed.tags;
            return Ok(());
        }

        let diff = vpc_tag_params(&network.cluster_name, &vpc_id, &network.vpc.tags)
            .diff(&observed.tags);
        let mut tags = observed.tags;
        if !diff.is_empty() {
            retry_with_backoff(
                &self.backoff,
                "tag VPC",
                || self.ec2.create_tags(&vpc_id, &diff),
                CloudError::is_not_found,
            )
            .map_err(|e| {
                self.recorder.warn(
                    reasons::FAILED_TAG_VPC,
                    format!("Failed to tag managed VPC {vpc_id:?}: {e}"),
                );
                Error::cloud("tag VPC", &vpc_id, e)
            })?;
            tags.extend(diff);
        }
        network.vpc.tags = tags;
        Ok(())
    }

    fn describe_vpc(&self, vpc_id: &str) -> Result<CloudVpc> {
        match self.ec2.describe_vpcs(&[vpc_id.to_string()]) {
            Ok(vpcs) => vpcs
                .into_iter()
                .next()
                .ok_or_else(|| Error::Config(format!("VPC {vpc_id} not found"))),
            Err(e) if e.is_not_found() => {
                self.recorder.warn(
                    reasons::FAILED_DESCRIBE_VPC,
                    format!("VPC {vpc_id:?} does not exist: {e}"),
                );
                Err(Error::Config(format!("VPC {vpc_id} not found: {e}")))
            }
            Err(e) => {
                self.recorder.warn(
                    reasons::FAILED_DESCRIBE_VPC,
                    format!("Failed to describe VPC {vpc_id:?}: {e}"),
                );
                Err(Error::describe("VPC", e))
            }
        }
    }

    fn create_vpc(&self, network: &mut ClusterNetwork) -> Result<()> {
        let Some(cidr) = network.vpc.cidr_block else {
            self.recorder.warn(
                reasons::FAILED_CREATE_VPC,
                "Failed to create new managed VPC: no CIDR block set".to_string(),
            );
            return Err(Error::Config(format!(
                "cluster {} has neither a VPC id nor a CIDR block",
                network.cluster_name
            )));
        };
        let tags =
            vpc_tag_params(&network.cluster_name, TEMPORARY_RESOURCE_ID, &network.vpc.tags).build();

        let vpc = self.ec2.create_vpc(&cidr, &tags).map_err(|e| {
            self.recorder.warn(
                reasons::FAILED_CREATE_VPC,
                format!("Failed to create new managed VPC {cidr}: {e}"),
            );
            Error::cloud("create VPC", cidr.to_string(), e)
        })?;
        self.recorder.event(
            reasons::SUCCESSFUL_CREATE_VPC,
            format!("Created new managed VPC {:?}", vpc.vpc_id),
        );

        network.vpc.id = Some(vpc.vpc_id);
        network.vpc.cidr_block = Some(vpc.cidr_block);
        network.vpc.tags = vpc.tags;
        network.vpc.mode = Some(ManagementMode::Managed);
        Ok(())
    }

    fn ensure_subnets(&self, network: &mut ClusterNetwork) -> Result<()> {
        let cluster = network.cluster_name.clone();
        let mode = network.vpc.mode_or_classify(&cluster);
        let vpc_id = network.vpc.id.clone();
        let existing = describe_vpc_subnets(self.ec2, self.recorder, vpc_id.as_deref(), &cluster)?;

        if network.subnets.is_empty() {
            if mode.is_unmanaged() {
                self.recorder.warn(
                    reasons::FAILED_NO_SUBNETS,
                    "Expected at least 1 subnet but got 0".to_string(),
                );
                return Err(Error::Config(format!(
                    "unmanaged VPC {:?} needs at least one subnet listed",
                    vpc_id.as_deref().unwrap_or_default()
                )));
            }
            let zones = self.select_zones(&network.vpc)?;
            network.subnets = default_subnets(&network.vpc, &zones).map_err(|e| {
                self.recorder.warn(
                    reasons::FAILED_DEFAULT_SUBNETS,
                    format!("Failed to create default subnets: {e}"),
                );
                e
            })?;
            log::info!(
                "Using {} default subnet(s) over zones [{}]",
                network.subnets.len(),
                zones.join(", ")
            );
            // Keep the layout even if a later step fails.
            self.store.save(network).map_err(|e| {
                self.recorder.warn(
                    reasons::FAILED_PERSIST_STATE,
                    format!("Failed to persist default subnets of cluster {cluster}: {e}"),
                );
                e
            })?;
        }

        if let Some(secondary) = network.secondary_cidr_block {
            let added = self
                .secondary_zones(network)
                .and_then(|zones| secondary_subnets(&secondary, &zones, &network.subnets))
                .map_err(|e| {
                    self.recorder.warn(
                        reasons::FAILED_SECONDARY_SUBNETS,
                        format!("Failed to create secondary subnets in {secondary}: {e}"),
                    );
                    e
                })?;
            for subnet in added {
                log::info!("Adding secondary subnet {subnet}");
                network.subnets.push(subnet);
            }
        }

        for desired in network.subnets.iter_mut() {
            let Some(observed) = existing.find_equal(desired) else {
                if mode.is_unmanaged() {
                    self.recorder.warn(
                        reasons::FAILED_MATCH_SUBNET,
                        format!(
                            "Using unmanaged VPC and failed to find existing subnet for specified subnet {}",
                            desired.resource_id()
                        ),
                    );
                    return Err(Error::Config(format!(
                        "subnet {} does not exist in unmanaged VPC",
                        desired.resource_id()
                    )));
                }
                // Gone from the cloud; create it again.
                if let Some(id) = desired.id.take() {
                    log::info!("Subnet {id} no longer exists, recreating {desired}");
                }
                desired.route_table_id = None;
                desired.nat_gateway_id = None;
                continue;
            };

            let mut observed = observed.clone();
            match self.ensure_subnet_tags(&cluster, mode, &observed, &desired.tags) {
                Ok(applied) => observed.tags.extend(applied),
                Err(e) if mode.is_unmanaged() => {
                    self.recorder.warn(
                        reasons::FAILED_TAG_SUBNET,
                        format!(
                            "Failed tagging unmanaged Subnet {:?}: {e}",
                            observed.resource_id()
                        ),
                    );
                }
                Err(e) => {
                    self.recorder.warn(
                        reasons::FAILED_TAG_SUBNET,
                        format!(
                            "Failed tagging managed Subnet {:?}: {e}",
                            observed.resource_id()
                        ),
                    );
                    return Err(Error::cloud("tag subnet", observed.resource_id(), e));
                }
            }
            *desired = observed;
        }

        self.validate_topology(&network.subnets, mode)?;

        if mode.is_unmanaged() || network.subnets.iter().all(|s| s.id.is_some()) {
            log::debug!("Reconciled subnets of cluster {cluster}");
            return Ok(());
        }

        let Some(vpc_id) = vpc_id else {
            self.recorder.warn(
                reasons::FAILED_CREATE_SUBNET,
                "Failed creating new managed Subnets: no VPC id set".to_string(),
            );
            return Err(Error::Config(format!(
                "cluster {cluster} has no VPC to create subnets in"
            )));
        };
        for i in 0..network.subnets.len() {
            if network.subnets.0[i].id.is_some() {
                continue;
            }
            let created = self.create_subnet(&vpc_id, &cluster, &network.subnets.0[i])?;
            network.subnets.0[i] = created;
        }
        log::debug!("Reconciled subnets of cluster {cluster}");
        Ok(())
    }

    /// Zones for secondary subnets: those already used by primary subnets,
    /// in order of first use, so later passes pick the same ones.
    fn secondary_zones(&self, network: &ClusterNetwork) -> Result<Vec<String>> {
        let zones: Vec<String> = network
            .subnets
            .iter()
            .filter(|s| !s.is_secondary() && !s.availability_zone.is_empty())
            .map(|s| s.availability_zone.clone())
            .unique()
            .collect();
        if zones.is_empty() {
            return self.select_zones(&network.vpc);
        }
        Ok(zones)
    }

    fn select_zones(&self, vpc: &VpcSpec) -> Result<Vec<String>> {
        let zones = self.ec2.describe_availability_zones().map_err(|e| {
            self.recorder.warn(
                reasons::FAILED_DESCRIBE_ZONES,
                format!("Failed to describe availability zones: {e}"),
            );
            Error::describe("availability zones", e)
        })?;
        Ok(select_zones(
            &usable_zones(&zones),
            vpc.az_usage_limit(),
            vpc.availability_zone_selection,
        ))
    }

    fn validate_topology(&self, subnets: &Subnets, mode: ManagementMode) -> Result<()> {
        if mode.is_unmanaged() {
            if subnets.is_empty() {
                self.recorder.warn(
                    reasons::FAILED_NO_SUBNETS,
                    "Expected at least 1 subnet but got 0".to_string(),
                );
                return Err(Error::Topology("no subnets in unmanaged VPC".to_string()));
            }
            return Ok(());
        }

        let conflicts = find_overlapping_subnets(subnets);
        if !conflicts.is_empty() {
            log_overlapping_subnets(&conflicts);
            self.recorder.warn(
                reasons::FAILED_OVERLAPPING_SUBNETS,
                format!(
                    "{} overlapping subnet pair(s), first {} and {}",
                    conflicts.len(),
                    conflicts[0].first,
                    conflicts[0].second
                ),
            );
            return Err(Error::Config(format!(
                "subnet {} overlaps {}",
                conflicts[0].first, conflicts[0].second
            )));
        }
        if subnets.filter_private().is_empty() {
            self.recorder.warn(
                reasons::FAILED_NO_PRIVATE_SUBNET,
                "Expected at least 1 private subnet but got 0".to_string(),
            );
            return Err(Error::Topology("no private subnet".to_string()));
        }
        if subnets.filter_public().is_empty() {
            self.recorder.warn(
                reasons::FAILED_NO_PUBLIC_SUBNET,
                "Expected at least 1 public subnet but got 0".to_string(),
            );
            return Err(Error::Topology("no public subnet".to_string()));
        }
        Ok(())
    }

    /// Apply missing subnet tags; returns the tags that were applied.
    fn ensure_subnet_tags(
        &self,
        cluster_name: &str,
        mode: ManagementMode,
        observed: &SubnetSpec,
        manual: &Tags,
    ) -> CloudResult<Tags> {
        let subnet_id = observed.resource_id();
        let diff = subnet_tag_params(
            cluster_name,
            mode,
            &subnet_id,
            observed.is_public,
            &observed.availability_zone,
            manual,
        )
        .diff(&observed.tags);
        if diff.is_empty() {
            return Ok(diff);
        }
        log::debug!("tagging subnet {subnet_id} with {} tag(s)", diff.len());
        retry_with_backoff(
            &self.backoff,
            "tag subnet",
            || self.ec2.create_tags(&subnet_id, &diff),
            CloudError::is_subnet_not_found,
        )?;
        Ok(diff)
    }

    fn create_subnet(&self, vpc_id: &str, cluster_name: &str, spec: &SubnetSpec) -> Result<SubnetSpec> {
        let cidr = spec.cidr_block.ok_or_else(|| {
            Error::Config(format!("subnet {} has no CIDR block", spec.resource_id()))
        })?;
        let zone = spec.availability_zone.as_str();
        let tags = subnet_tag_params(
            cluster_name,
            ManagementMode::Managed,
            TEMPORARY_RESOURCE_ID,
            spec.is_public,
            zone,
            &spec.tags,
        )
        .build();

        let subnet = self.ec2.create_subnet(vpc_id, &cidr, zone, &tags).map_err(|e| {
            self.recorder.warn(
                reasons::FAILED_CREATE_SUBNET,
                format!("Failed creating new managed Subnet {cidr}: {e}"),
            );
            Error::cloud("create subnet", cidr.to_string(), e)
        })?;
        self.recorder.event(
            reasons::SUCCESSFUL_CREATE_SUBNET,
            format!(
                "Created new managed Subnet {:?} with cidr {cidr} in {zone:?}",
                subnet.subnet_id
            ),
        );

        self.wait_until_available(&subnet.subnet_id).map_err(|e| {
            self.recorder.warn(
                reasons::FAILED_WAIT_SUBNET_AVAILABLE,
                format!("Failed waiting for managed Subnet {:?} to become available: {e}", subnet.subnet_id),
            );
            e
        })?;

        if spec.is_public {
            retry_with_backoff(
                &self.backoff,
                "modify subnet attributes",
                || self.ec2.modify_subnet_map_public_ip(&subnet.subnet_id, true),
                CloudError::is_subnet_not_found,
            )
            .map_err(|e| {
                self.recorder.warn(
                    reasons::FAILED_MODIFY_SUBNET_ATTRIBUTES,
                    format!("Failed modifying managed Subnet {:?} attributes: {e}", subnet.subnet_id),
                );
                Error::cloud("modify subnet attributes", &subnet.subnet_id, e)
            })?;
            self.recorder.event(
                reasons::SUCCESSFUL_MODIFY_SUBNET_ATTRIBUTES,
                format!(
                    "Modified managed Subnet {:?} with MapPublicIpOnLaunch",
                    subnet.subnet_id
                ),
            );
        }

        Ok(SubnetSpec {
            id: Some(subnet.subnet_id),
            cidr_block: Some(subnet.cidr_block),
            availability_zone: subnet.availability_zone,
            is_public: spec.is_public,
            route_table_id: None,
            nat_gateway_id: None,
            tags: subnet.tags,
        })
    }

    fn wait_until_available(&self, subnet_id: &str) -> Result<()> {
        let filter = SubnetFilter {
            subnet_ids: vec![subnet_id.to_string()],
            ..Default::default()
        };
        wait_for(
            self.wait_timeout,
            self.wait_interval,
            &format!("subnet {subnet_id} to become available"),
            || match self.ec2.describe_subnets(&filter) {
                Ok(found) => Ok(found.iter().any(|s| s.state == STATE_AVAILABLE)),
                Err(e) if e.is_subnet_not_found() => Ok(false),
                Err(e) => Err(Error::describe("subnets", e)),
            },
        )
    }

    fn delete_subnets(&self, vpc_id: &str, cluster_name: &str) -> Result<()> {
        let existing = describe_vpc_subnets(self.ec2, self.recorder, Some(vpc_id), cluster_name)?;
        for subnet in existing.iter() {
            let subnet_id = subnet.resource_id();
            match self.ec2.delete_subnet(&subnet_id) {
                Ok(()) => self.recorder.event(
                    reasons::SUCCESSFUL_DELETE_SUBNET,
                    format!("Deleted Subnet {subnet_id:?}"),
                ),
                Err(e) if e.is_not_found() => log::debug!("subnet {subnet_id} already deleted"),
                Err(e) => {
                    self.recorder.warn(
                        reasons::FAILED_DELETE_SUBNET,
                        format!("Failed to delete Subnet {subnet_id:?}: {e}"),
                    );
                    return Err(Error::cloud("delete subnet", subnet_id, e));
                }
            }
        }
        Ok(())
    }

    fn delete_vpc(&self, vpc_id: &str) -> Result<()> {
        let deleted = retry_with_backoff(
            &self.backoff,
            "delete VPC",
            || self.ec2.delete_vpc(vpc_id),
            CloudError::is_dependency_violation,
        );
        match deleted {
            Ok(()) => {
                self.recorder.event(
                    reasons::SUCCESSFUL_DELETE_VPC,
                    format!("Deleted managed VPC {vpc_id:?}"),
                );
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                log::debug!("VPC {vpc_id} already deleted");
                Ok(())
            }
            Err(e) => {
                self.recorder.warn(
                    reasons::FAILED_DELETE_VPC,
                    format!("Failed to delete managed VPC {vpc_id:?}: {e}"),
                );
                Err(Error::cloud("delete VPC", vpc_id, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{CloudSnapshot, MemoryCloud, VPC_NOT_FOUND};
    use crate::events::MemoryEventRecorder;
    use crate::models::tags::{cluster_tag_key, NAME_TAG_KEY};
    use crate::models::Ipv4;
    use crate::state::MemoryStore;

    fn config() -> Config {
        Config {
            backoff: Backoff::immediate(3),
            wait_timeout: Duration::from_secs(5),
            wait_interval: Duration::ZERO,
            ..Config::new("test")
        }
    }

    fn cloud() -> MemoryCloud {
        MemoryCloud::new(CloudSnapshot::with_zones(
            "us-east-1",
            &["us-east-1a", "us-east-1b"],
        ))
    }

    fn managed_network() -> ClusterNetwork {
        let mut network = ClusterNetwork::new("test");
        config().apply_defaults(&mut network);
        network
    }

    /// Store whose disk is gone.
    struct ReadOnlyStore;

    impl StateStore for ReadOnlyStore {
        fn load(&self) -> Result<ClusterNetwork> {
            Err(Error::State("read-only store".to_string()))
        }
        fn save(&self, _network: &ClusterNetwork) -> Result<()> {
            Err(Error::State("read-only store".to_string()))
        }
    }

    #[test]
    fn test_create_vpc() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();

        service.reconcile_vpc(&mut network).unwrap();

        let vpc_id = network.vpc.id.clone().unwrap();
        assert_eq!(network.vpc.mode, Some(ManagementMode::Managed));
        assert_eq!(network.vpc.tags[NAME_TAG_KEY], "test-vpc");
        assert!(network.is_true(VPC_READY));
        assert!(recorder.has_reason(reasons::SUCCESSFUL_CREATE_VPC));
        assert_eq!(store.saved().unwrap().vpc.id, Some(vpc_id));

        // A second pass finds the VPC and has nothing to tag.
        service.reconcile_vpc(&mut network).unwrap();
        assert_eq!(cloud.count_calls("create_vpc"), 1);
        assert_eq!(cloud.count_calls("create_tags"), 0);
    }

    #[test]
    fn test_create_vpc_without_cidr() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.vpc.cidr_block = None;

        let err = service.reconcile_vpc(&mut network).unwrap_err();
        assert!(err.is_config(), "{err}");
        assert_eq!(recorder.reasons(), vec![reasons::FAILED_CREATE_VPC]);
        assert_eq!(cloud.count_calls("create_vpc"), 0);
    }

    #[test]
    fn test_missing_vpc_is_config_error() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.vpc.id = Some("vpc-404".to_string());

        let err = service.reconcile_vpc(&mut network).unwrap_err();
        assert!(err.is_config(), "{err}");
        assert!(recorder.has_reason(reasons::FAILED_DESCRIBE_VPC));
        assert!(!network.is_true(VPC_READY));
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn test_vpc_in_bad_state_is_config_error() {
        let cloud = cloud();
        let vpc = cloud
            .create_vpc(&Ipv4::new("10.0.0.0/16").unwrap(), &Tags::new())
            .unwrap();
        let mut snapshot = cloud.snapshot();
        snapshot.vpcs[0].state = "deleting".to_string();
        let cloud = MemoryCloud::new(snapshot);
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.vpc.id = Some(vpc.vpc_id);

        assert!(service.reconcile_vpc(&mut network).unwrap_err().is_config());
    }

    #[test]
    fn test_unmanaged_vpc_is_copied_not_tagged() {
        let cloud = cloud();
        let vpc = cloud
            .create_vpc(
                &Ipv4::new("172.16.0.0/16").unwrap(),
                &Tags::from([("Name".to_string(), "byo".to_string())]),
            )
            .unwrap();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.vpc.id = Some(vpc.vpc_id.clone());

        service.reconcile_vpc(&mut network).unwrap();
        assert_eq!(network.vpc.mode, Some(ManagementMode::Unmanaged));
        assert_eq!(network.vpc.cidr_block.unwrap().to_string(), "172.16.0.0/16");
        assert_eq!(network.vpc.tags["Name"], "byo");
        assert_eq!(cloud.count_calls("create_tags"), 0);
    }

    #[test]
    fn test_owned_vpc_gets_missing_tags() {
        let cloud = cloud();
        let vpc = cloud
            .create_vpc(
                &Ipv4::new("10.0.0.0/16").unwrap(),
                &Tags::from([(cluster_tag_key("test"), "owned".to_string())]),
            )
            .unwrap();
        cloud.fail_next("create_tags", VPC_NOT_FOUND, 1);
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.vpc.id = Some(vpc.vpc_id.clone());

        service.reconcile_vpc(&mut network).unwrap();
        assert_eq!(network.vpc.mode, Some(ManagementMode::Managed));
        assert_eq!(network.vpc.tags[NAME_TAG_KEY], "test-vpc");
        assert_eq!(cloud.count_calls("create_tags"), 2);
        assert_eq!(cloud.snapshot().vpcs[0].tags[NAME_TAG_KEY], "test-vpc");
    }

    #[test]
    fn test_recorded_mode_is_not_reclassified() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        service.reconcile_vpc(&mut network).unwrap();

        // Losing the ownership tag later does not turn the VPC unmanaged.
        network.vpc.tags.clear();
        let mut snapshot = cloud.snapshot();
        snapshot.vpcs[0].tags.clear();
        let cloud = MemoryCloud::new(snapshot);
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        service.reconcile_vpc(&mut network).unwrap();
        assert_eq!(network.vpc.mode, Some(ManagementMode::Managed));
        assert_eq!(cloud.count_calls("create_tags"), 1);
    }

    #[test]
    fn test_zone_limit_applies_to_defaults() {
        let cloud = MemoryCloud::new(CloudSnapshot::with_zones(
            "us-east-1",
            &["us-east-1d", "us-east-1c", "us-east-1b", "us-east-1a"],
        ));
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();

        service.reconcile_network(&mut network).unwrap();
        let zones: Vec<&str> = network
            .subnets
            .iter()
            .map(|s| s.availability_zone.as_str())
            .unique()
            .collect();
        assert_eq!(zones, vec!["us-east-1a", "us-east-1b", "us-east-1c"]);
        assert_eq!(network.subnets.len(), 6);
    }

    #[test]
    fn test_describe_zones_failure() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        service.reconcile_vpc(&mut network).unwrap();

        cloud.fail_next("describe_availability_zones", "RequestLimitExceeded", 1);
        let err = service.reconcile_subnets(&mut network).unwrap_err();
        assert!(matches!(err, Error::Describe { .. }));
        assert!(recorder.has_reason(reasons::FAILED_DESCRIBE_ZONES));
        assert!(network.subnets.is_empty());
    }

    #[test]
    fn test_overlapping_subnets_are_rejected() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        service.reconcile_vpc(&mut network).unwrap();
        network.subnets = Subnets(vec![
            SubnetSpec::new(Ipv4::new("10.0.0.0/20").unwrap(), "us-east-1a", true),
            SubnetSpec::new(Ipv4::new("10.0.8.0/24").unwrap(), "us-east-1a", false),
        ]);

        let err = service.reconcile_subnets(&mut network).unwrap_err();
        assert!(err.is_config());
        assert!(recorder.has_reason(reasons::FAILED_OVERLAPPING_SUBNETS));
        assert_eq!(cloud.count_calls("create_subnet"), 0);
    }

    #[test]
    fn test_no_private_subnet() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        service.reconcile_vpc(&mut network).unwrap();
        network.subnets = Subnets(vec![SubnetSpec::new(
            Ipv4::new("10.0.0.0/20").unwrap(),
            "us-east-1a",
            true,
        )]);

        let err = service.reconcile_subnets(&mut network).unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
        assert!(recorder.has_reason(reasons::FAILED_NO_PRIVATE_SUBNET));
        assert_eq!(
            network.conditions[SUBNETS_READY].reason,
            "InvalidTopology"
        );
    }

    #[test]
    fn test_create_failure_keeps_earlier_subnets() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        service.reconcile_vpc(&mut network).unwrap();
        network.subnets = Subnets(vec![
            SubnetSpec::new(Ipv4::new("10.0.0.0/20").unwrap(), "us-east-1a", true),
            SubnetSpec::new(Ipv4::new("10.0.16.0/20").unwrap(), "us-east-1a", false),
        ]);
        // First create succeeds, the second one is refused.
        let refuse_second = MemoryCloud::new(cloud.snapshot());
        refuse_second
            .create_subnet(
                network.vpc.id.as_deref().unwrap(),
                &Ipv4::new("10.0.16.0/24").unwrap(),
                "us-east-1a",
                &Tags::new(),
            )
            .unwrap();
        let service = NetworkService::new(&refuse_second, &recorder, &store, &config());

        let err = service.reconcile_subnets(&mut network).unwrap_err();
        assert!(matches!(err, Error::Cloud { operation: "create subnet", .. }));
        assert!(recorder.has_reason(reasons::FAILED_CREATE_SUBNET));
        let saved = store.saved().unwrap();
        assert!(saved.subnets.0[0].id.is_some());
        assert!(saved.subnets.0[1].id.is_none());
        assert!(!saved.is_true(SUBNETS_READY));
    }

    #[test]
    fn test_waits_for_pending_subnet() {
        let cloud = cloud().with_pending_polls(2);
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();

        service.reconcile_network(&mut network).unwrap();
        assert!(network.is_true(SUBNETS_READY));
        // One describe for observed state, three per created subnet.
        assert_eq!(cloud.count_calls("describe_subnets"), 1 + 4 * 3);
    }

    #[test]
    fn test_wait_timeout() {
        let cloud = cloud().with_pending_polls(100);
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let config = Config {
            wait_timeout: Duration::ZERO,
            ..config()
        };
        let service = NetworkService::new(&cloud, &recorder, &store, &config);
        let mut network = managed_network();

        let err = service.reconcile_network(&mut network).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "{err}");
        assert_eq!(cloud.count_calls("create_subnet"), 1);
        assert_eq!(network.conditions[SUBNETS_READY].reason, "Timeout");
        assert!(recorder.has_reason(reasons::FAILED_WAIT_SUBNET_AVAILABLE));
    }

    #[test]
    fn test_deleted_subnet_is_recreated() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        service.reconcile_network(&mut network).unwrap();
        let gone = network.subnets.0[1].id.clone().unwrap();
        let gone_cidr = network.subnets.0[1].cidr_block;

        // Removed behind our back.
        cloud.delete_subnet(&gone).unwrap();
        assert_eq!(cloud.snapshot().subnets.len(), 3);

        service.reconcile_network(&mut network).unwrap();
        assert!(network.is_true(SUBNETS_READY));
        assert_eq!(cloud.count_calls("create_subnet"), 5);
        assert_eq!(cloud.snapshot().subnets.len(), 4);
        let recreated = &network.subnets.0[1];
        assert_eq!(recreated.cidr_block, gone_cidr);
        assert_ne!(recreated.id.as_deref(), Some(gone.as_str()));
        assert!(network.subnets.iter().all(|s| s.id.is_some()));
    }

    #[test]
    fn test_subnets_without_vpc_id() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();

        let err = service.reconcile_subnets(&mut network).unwrap_err();
        assert!(err.is_config(), "{err}");
        assert!(recorder.has_reason(reasons::FAILED_CREATE_SUBNET));
        assert_eq!(cloud.count_calls("create_subnet"), 0);
    }

    #[test]
    fn test_default_subnets_not_persisted() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let mut network = managed_network();
        NetworkService::new(&cloud, &recorder, &store, &config())
            .reconcile_vpc(&mut network)
            .unwrap();

        let service = NetworkService::new(&cloud, &recorder, &ReadOnlyStore, &config());
        let err = service.reconcile_subnets(&mut network).unwrap_err();
        assert!(matches!(err, Error::State(_)), "{err}");
        assert!(recorder.has_reason(reasons::FAILED_PERSIST_STATE));
        // Failed before anything was created.
        assert_eq!(cloud.count_calls("create_subnet"), 0);
    }

    #[test]
    fn test_secondary_block_too_small() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.secondary_cidr_block = Some(Ipv4::new("100.64.0.0/32").unwrap());
        service.reconcile_vpc(&mut network).unwrap();

        let err = service.reconcile_subnets(&mut network).unwrap_err();
        assert!(err.is_config(), "{err}");
        assert!(recorder.has_reason(reasons::FAILED_SECONDARY_SUBNETS));
        assert_eq!(cloud.count_calls("create_subnet"), 0);
        assert_eq!(network.subnets.len(), 4);
    }

    #[test]
    fn test_modify_attribute_failure() {
        let cloud = cloud();
        cloud.fail_next("modify_subnet_map_public_ip", "UnauthorizedOperation", 1);
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();

        let err = service.reconcile_network(&mut network).unwrap_err();
        assert!(matches!(
            err,
            Error::Cloud {
                operation: "modify subnet attributes",
                ..
            }
        ));
        assert!(recorder.has_reason(reasons::FAILED_MODIFY_SUBNET_ATTRIBUTES));
    }

    #[test]
    fn test_modify_attribute_retries_not_found() {
        let cloud = cloud();
        cloud.fail_next("modify_subnet_map_public_ip", crate::cloud::SUBNET_NOT_FOUND, 2);
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();

        service.reconcile_network(&mut network).unwrap();
        // Two public subnets, the first needs three attempts.
        assert_eq!(cloud.count_calls("modify_subnet_map_public_ip"), 4);
        assert!(cloud
            .snapshot()
            .subnets
            .iter()
            .filter(|s| s.map_public_ip_on_launch)
            .count()
            == 2);
    }

    #[test]
    fn test_secondary_subnets_added_once() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.secondary_cidr_block = Some(Ipv4::new("100.64.0.0/16").unwrap());
        // The secondary block lives next to the primary one.
        service.reconcile_vpc(&mut network).unwrap();

        service.reconcile_subnets(&mut network).unwrap();
        assert_eq!(network.subnets.len(), 6);
        let secondary: Vec<&SubnetSpec> =
            network.subnets.iter().filter(|s| s.is_secondary()).collect();
        assert_eq!(secondary.len(), 2);
        assert!(secondary.iter().all(|s| !s.is_public && s.id.is_some()));
        assert_eq!(secondary[0].availability_zone, "us-east-1a");
        assert_eq!(secondary[1].availability_zone, "us-east-1b");

        service.reconcile_subnets(&mut network).unwrap();
        assert_eq!(network.subnets.len(), 6);
        assert_eq!(cloud.count_calls("create_subnet"), 6);
    }

    #[test]
    fn test_delete_network() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        service.reconcile_network(&mut network).unwrap();

        service.delete_network(&mut network).unwrap();
        let snapshot = cloud.snapshot();
        assert!(snapshot.subnets.is_empty());
        assert!(snapshot.vpcs.is_empty());
        assert!(network.vpc.id.is_none());
        assert!(network.subnets.iter().all(|s| s.id.is_none()));
        assert_eq!(network.conditions[VPC_READY].reason, DELETED_REASON);
        assert!(recorder.has_reason(reasons::SUCCESSFUL_DELETE_VPC));

        // Nothing left; a second delete is a no-op.
        service.delete_network(&mut network).unwrap();
    }

    #[test]
    fn test_delete_tolerates_missing_vpc() {
        let cloud = cloud();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.vpc.id = Some("vpc-gone".to_string());
        network.vpc.mode = Some(ManagementMode::Managed);

        service.delete_network(&mut network).unwrap();
        assert!(network.vpc.id.is_none());
        assert!(!recorder.has_reason(reasons::FAILED_DELETE_VPC));
    }

    #[test]
    fn test_delete_skips_unmanaged() {
        let cloud = cloud();
        let vpc = cloud
            .create_vpc(&Ipv4::new("10.0.0.0/16").unwrap(), &Tags::new())
            .unwrap();
        let recorder = MemoryEventRecorder::new();
        let store = MemoryStore::default();
        let service = NetworkService::new(&cloud, &recorder, &store, &config());
        let mut network = managed_network();
        network.vpc.id = Some(vpc.vpc_id);

        service.delete_network(&mut network).unwrap();
        assert_eq!(cloud.count_calls("delete_vpc"), 0);
        assert_eq!(cloud.snapshot().vpcs.len(), 1);
        assert_eq!(store.saves(), 0);
    }
}
