//! Desired-state record and its persistence.
//!
//! [`ClusterNetwork`] is what the reconciler reads at the start of a pass and
//! writes back at the end. Where it is stored is up to the [`StateStore`].

use crate::error::{Error, Result};
use crate::models::{Ipv4, Subnets, VpcSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;

/// Condition set once the VPC has been reconciled.
pub const VPC_READY: &str = "VpcReady";
/// Condition set once the subnets have been reconciled.
pub const SUBNETS_READY: &str = "SubnetsReady";

/// Status of one aspect of the cluster network.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub status: bool,
    #[serde(default)]
    pub reason: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Desired state of a cluster's network.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    pub cluster_name: String,
    #[serde(default)]
    pub vpc: VpcSpec,
    #[serde(default)]
    pub subnets: Subnets,
    /// Extra block carved into private subnets only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_cidr_block: Option<Ipv4>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: BTreeMap<String, Condition>,
}

impl ClusterNetwork {
    pub fn new(cluster_name: &str) -> Self {
        ClusterNetwork {
            cluster_name: cluster_name.to_string(),
            ..Default::default()
        }
    }

    /// Set a condition true; the transition time only moves when the status changes.
    pub fn mark_true(&mut self, name: &str) {
        self.set_condition(name, true, "");
    }

    /// Set a condition false with a reason.
    pub fn mark_false(&mut self, name: &str, reason: &str) {
        self.set_condition(name, false, reason);
    }

    fn set_condition(&mut self, name: &str, status: bool, reason: &str) {
        let now = Utc::now();
        self.conditions
            .entry(name.to_string())
            .and_modify(|c| {
                if c.status != status {
                    c.last_transition_time = now;
                }
                c.status = status;
                c.reason = reason.to_string();
            })
            .or_insert_with(|| Condition {
                status,
                reason: reason.to_string(),
                last_transition_time: now,
            });
    }

    /// True if the condition exists and is true.
    pub fn is_true(&self, name: &str) -> bool {
        self.conditions.get(name).map(|c| c.status).unwrap_or(false)
    }
}

/// Durable storage for [`ClusterNetwork`].
pub trait StateStore {
    fn load(&self) -> Result<ClusterNetwork>;
    fn save(&self, network: &ClusterNetwork) -> Result<()>;
}

/// Stores the record as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    pub path: String,
}

impl JsonFileStore {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<ClusterNetwork> {
        if !Path::new(&self.path).exists() {
            return Err(Error::State(format!("State file does not exist: {}", self.path)));
        }
        log::info!("Reading state file: {}", self.path);
        let json = std::fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut deserializer = serde_json::Deserializer::from_str(&json);
        serde_path_to_error::deserialize(&mut deserializer).map_err(|e| Error::json(&self.path, e))
    }

    fn save(&self, network: &ClusterNetwork) -> Result<()> {
        let json = serde_json::to_string_pretty(network).map_err(|e| Error::Json {
            file: self.path.clone(),
            path: ".".to_string(),
            source: e,
        })?;
        log::debug!("Writing state file: {}", self.path);
        std::fs::write(&self.path, json).map_err(|e| Error::io(&self.path, e))
    }
}

/// Keeps the last saved record in memory and counts saves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: RefCell<Option<ClusterNetwork>>,
    saves: Cell<usize>,
}

impl MemoryStore {
    pub fn new(network: ClusterNetwork) -> Self {
        Self {
            saved: RefCell::new(Some(network)),
            saves: Cell::new(0),
        }
    }

    /// Number of [`StateStore::save`] calls so far.
    pub fn saves(&self) -> usize {
        self.saves.get()
    }

    /// Last saved record.
    pub fn saved(&self) -> Option<ClusterNetwork> {
        self.saved.borrow().clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<ClusterNetwork> {
        self.saved
            .borrow()
            .clone()
            .ok_or_else(|| Error::State("nothing stored".to_string()))
    }

    fn save(&self, network: &ClusterNetwork) -> Result<()> {
        self.saves.set(self.saves.get() + 1);
        *self.saved.borrow_mut() = Some(network.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_state_fixture() {
        let store = JsonFileStore::new("src/tests/test_data/state_unmanaged_01.json");
        let network = store.load().expect("Error reading state");
        assert_eq!(network.cluster_name, "byo");
        assert_eq!(network.vpc.id.as_deref(), Some("vpc-0byo"));
        assert_eq!(network.subnets.len(), 2);
    }

    #[test]
    fn test_conditions() {
        let mut network = ClusterNetwork::new("test");
        assert!(!network.is_true(SUBNETS_READY));
        network.mark_false(SUBNETS_READY, "Creating");
        assert!(!network.is_true(SUBNETS_READY));
        let first = network.conditions[SUBNETS_READY].last_transition_time;
        network.mark_false(SUBNETS_READY, "StillCreating");
        assert_eq!(network.conditions[SUBNETS_READY].last_transition_time, first);
        assert_eq!(network.conditions[SUBNETS_READY].reason, "StillCreating");
        network.mark_true(SUBNETS_READY);
        assert!(network.is_true(SUBNETS_READY));
    }

    #[test]
    fn test_file_store_save_and_load() {
        let dir = std::env::temp_dir().join(format!("state-rw-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        let store = JsonFileStore::new(path.to_str().unwrap());
        let mut network = ClusterNetwork::new("test");
        network.mark_true(VPC_READY);
        store.save(&network).unwrap();
        assert_eq!(store.load().unwrap(), network);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_reports_json_path() {
        let dir = std::env::temp_dir().join(format!("state-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        std::fs::write(&path, r#"{"clusterName": "test", "secondaryCidrBlock": "100.64.0.0/99"}"#)
            .unwrap();
        let store = JsonFileStore::new(path.to_str().unwrap());

        let err = store.load().unwrap_err();
        assert!(
            matches!(&err, Error::Json { path, .. } if path == "secondaryCidrBlock"),
            "{err}"
        );
        assert_eq!(err.condition_reason(), "StateUnavailable");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryStore::new(ClusterNetwork::new("test"));
        store.save(&ClusterNetwork::new("other")).unwrap();
        assert_eq!(store.saves(), 1);
        assert_eq!(store.load().unwrap().cluster_name, "other");
    }
}
