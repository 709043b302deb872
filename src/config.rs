//! Configuration constants and environment settings.

use crate::error::{Error, Result};
use crate::gc::GcStrategy;
use crate::models::{Ipv4, ZoneSelection};
use crate::retry::Backoff;
use crate::state::ClusterNetwork;
use std::net::Ipv4Addr;
use std::time::Duration;

/// VPC CIDR block used when none is configured.
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";
/// Annotation that turns garbage collection of external resources on or off.
pub const GC_ANNOTATION: &str = "aws.cluster.x-k8s.io/external-resource-gc";
/// How long to wait for a new subnet to become available.
pub const SUBNET_WAIT_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// How often to poll while waiting.
pub const SUBNET_WAIT_INTERVAL: Duration = Duration::from_secs(15);
/// Default state file for the binary.
pub const DEFAULT_STATE_FILE: &str = "cluster_network.json";
/// Default cloud snapshot file for the binary.
pub const DEFAULT_CLOUD_SNAPSHOT: &str = "cloud_snapshot.json";

/// Settings for one reconciler instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub cluster_name: String,
    pub vpc_cidr: Ipv4,
    pub az_usage_limit: Option<usize>,
    pub az_selection: Option<ZoneSelection>,
    pub secondary_cidr: Option<Ipv4>,
    pub gc_strategy: GcStrategy,
    pub backoff: Backoff,
    pub wait_timeout: Duration,
    pub wait_interval: Duration,
    pub state_file: String,
    pub cloud_snapshot: String,
}

impl Config {
    /// Defaults for `cluster_name`.
    pub fn new(cluster_name: &str) -> Self {
        Config {
            cluster_name: cluster_name.to_string(),
            // DEFAULT_VPC_CIDR
            vpc_cidr: Ipv4 {
                addr: Ipv4Addr::new(10, 0, 0, 0),
                mask: 16,
            },
            az_usage_limit: None,
            az_selection: None,
            secondary_cidr: None,
            gc_strategy: GcStrategy::default(),
            backoff: Backoff::default(),
            wait_timeout: SUBNET_WAIT_TIMEOUT,
            wait_interval: SUBNET_WAIT_INTERVAL,
            state_file: DEFAULT_STATE_FILE.to_string(),
            cloud_snapshot: DEFAULT_CLOUD_SNAPSHOT.to_string(),
        }
    }

    /// Read settings from the environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cluster_name = lookup("CLUSTER_NAME")
            .ok_or_else(|| Error::Config("CLUSTER_NAME is not set".to_string()))?;
        let mut config = Config::new(&cluster_name);

        if let Some(cidr) = lookup("VPC_CIDR") {
            config.vpc_cidr = Ipv4::new(&cidr)?;
        }
        if let Some(limit) = lookup("AZ_USAGE_LIMIT") {
            let limit: usize = limit
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("AZ_USAGE_LIMIT={limit:?} is not a number")))?;
            if limit == 0 {
                return Err(Error::Config("AZ_USAGE_LIMIT must be at least 1".to_string()));
            }
            config.az_usage_limit = Some(limit);
        }
        if let Some(selection) = lookup("AZ_SELECTION") {
            config.az_selection = Some(selection.parse().map_err(Error::Config)?);
        }
        if let Some(cidr) = lookup("SECONDARY_CIDR") {
            config.secondary_cidr = Some(Ipv4::new(&cidr)?);
        }
        if let Some(strategy) = lookup("GC_STRATEGY") {
            config.gc_strategy = strategy.parse().map_err(Error::Config)?;
        }
        if let Some(file) = lookup("STATE_FILE") {
            config.state_file = file;
        }
        if let Some(file) = lookup("CLOUD_SNAPSHOT") {
            config.cloud_snapshot = file;
        }
        Ok(config)
    }

    /// Fill fields of `network` that are not set yet.
    pub fn apply_defaults(&self, network: &mut ClusterNetwork) {
        if network.cluster_name.is_empty() {
            network.cluster_name = self.cluster_name.clone();
        }
        if network.vpc.cidr_block.is_none() {
            network.vpc.cidr_block = Some(self.vpc_cidr);
        }
        if network.vpc.availability_zone_usage_limit.is_none() {
            network.vpc.availability_zone_usage_limit = self.az_usage_limit;
        }
        if let Some(selection) = self.az_selection {
            network.vpc.availability_zone_selection = selection;
        }
        if network.secondary_cidr_block.is_none() {
            network.secondary_cidr_block = self.secondary_cidr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("CLUSTER_NAME", "test")])).unwrap();
        assert_eq!(config.vpc_cidr.to_string(), DEFAULT_VPC_CIDR);
        assert_eq!(config.az_usage_limit, None);
        assert_eq!(config.state_file, DEFAULT_STATE_FILE);
    }

    #[test]
    fn test_all_settings() {
        let config = Config::from_lookup(lookup(&[
            ("CLUSTER_NAME", "test"),
            ("VPC_CIDR", "192.168.0.0/20"),
            ("AZ_USAGE_LIMIT", "2"),
            ("AZ_SELECTION", "Random"),
            ("SECONDARY_CIDR", "100.64.0.0/16"),
            ("GC_STRATEGY", "enumeration"),
        ]))
        .unwrap();
        assert_eq!(config.vpc_cidr.to_string(), "192.168.0.0/20");
        assert_eq!(config.az_usage_limit, Some(2));
        assert_eq!(config.az_selection, Some(ZoneSelection::Random));
        assert_eq!(config.secondary_cidr.unwrap().to_string(), "100.64.0.0/16");
        assert_eq!(config.gc_strategy, GcStrategy::ServiceEnumeration);
    }

    #[test]
    fn test_malformed_settings() {
        assert!(Config::from_lookup(lookup(&[])).unwrap_err().is_config());
        assert!(Config::from_lookup(lookup(&[("CLUSTER_NAME", "t"), ("VPC_CIDR", "x")]))
            .unwrap_err()
            .is_config());
        assert!(Config::from_lookup(lookup(&[("CLUSTER_NAME", "t"), ("AZ_USAGE_LIMIT", "0")]))
            .unwrap_err()
            .is_config());
        assert!(Config::from_lookup(lookup(&[("CLUSTER_NAME", "t"), ("AZ_SELECTION", "up")]))
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn test_apply_defaults_keeps_existing() {
        let config = Config::from_lookup(lookup(&[
            ("CLUSTER_NAME", "test"),
            ("AZ_USAGE_LIMIT", "2"),
        ]))
        .unwrap();
        let mut network = ClusterNetwork::default();
        network.vpc.cidr_block = Some(Ipv4::new("172.16.0.0/16").unwrap());
        config.apply_defaults(&mut network);
        assert_eq!(network.cluster_name, "test");
        assert_eq!(network.vpc.cidr_block.unwrap().to_string(), "172.16.0.0/16");
        assert_eq!(network.vpc.az_usage_limit(), 2);
    }
}
