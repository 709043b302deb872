//! Garbage collection of cloud resources created on behalf of a cluster.
//!
//! Workloads running in the cluster make the cloud provider create load
//! balancers, target groups and security groups that the network reconciler
//! never sees. Before the network is torn down these have to go, or the VPC
//! cannot be deleted.
//!
//! A pass runs the [`ResourceCollector`] stages, then the [`ResourceCleaner`]
//! stages in order. The first failing stage ends the pass; the caller runs it
//! again later.

mod cleanup;
mod collect;

pub use cleanup::{
    default_cleaners, LoadBalancerCleaner, ResourceCleaner, SecurityGroupCleaner,
    TargetGroupCleaner,
};
pub use collect::{
    ClassicLoadBalancerCollector, LoadBalancerV2Collector, ResourceCollector,
    SecurityGroupCollector, TaggingApiCollector, TargetGroupCollector, EC2_SERVICE, ELB_SERVICE,
};

use crate::cloud::{Ec2Api, ElbApi, TaggingApi};
use crate::config::GC_ANNOTATION;
use crate::error::{Error, Result};
use crate::events::{reasons, EventRecorder};
use crate::models::{Arn, Tags};
use crate::state::ClusterNetwork;
use std::collections::BTreeMap;

/// A discovered cloud resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsResource {
    pub arn: Arn,
    pub tags: Tags,
}

/// How resources are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcStrategy {
    /// One query against the resource tagging API.
    #[default]
    TaggingApi,
    /// Enumerate each service and match tags.
    ServiceEnumeration,
}

impl std::str::FromStr for GcStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tagging" | "taggingapi" => Ok(GcStrategy::TaggingApi),
            "enumeration" | "serviceenumeration" => Ok(GcStrategy::ServiceEnumeration),
            other => Err(format!("unknown garbage collection strategy {other:?}")),
        }
    }
}

/// Whether garbage collection is enabled by the cluster's annotations.
///
/// Enabled unless [`GC_ANNOTATION`] says otherwise. Accepts the usual boolean
/// spellings (`true`, `True`, `TRUE`, `t`, `1` and their false forms).
pub fn should_gc(annotations: &BTreeMap<String, String>) -> Result<bool> {
    let Some(value) = annotations.get(GC_ANNOTATION) else {
        return Ok(true);
    };
    match value.as_str() {
        "1" | "t" | "T" | "true" | "True" | "TRUE" => Ok(true),
        "0" | "f" | "F" | "false" | "False" | "FALSE" => Ok(false),
        other => Err(Error::Config(format!(
            "annotation {GC_ANNOTATION}={other:?} is not a boolean"
        ))),
    }
}

/// Runs collection and cleanup stages for one cluster.
pub struct GarbageCollector<'a> {
    recorder: &'a dyn EventRecorder,
    collectors: Vec<Box<dyn ResourceCollector + 'a>>,
    cleaners: Vec<Box<dyn ResourceCleaner + 'a>>,
}

impl<'a> GarbageCollector<'a> {
    /// Custom stages; they run in the given order.
    pub fn new(
        recorder: &'a dyn EventRecorder,
        collectors: Vec<Box<dyn ResourceCollector + 'a>>,
        cleaners: Vec<Box<dyn ResourceCleaner + 'a>>,
    ) -> Self {
        GarbageCollector {
            recorder,
            collectors,
            cleaners,
        }
    }

    /// The stages for `strategy` with the default cleanup order.
    pub fn with_strategy<C>(cloud: &'a C, recorder: &'a dyn EventRecorder, strategy: GcStrategy) -> Self
    where
        C: Ec2Api + ElbApi + TaggingApi,
    {
        let collectors: Vec<Box<dyn ResourceCollector + 'a>> = match strategy {
            GcStrategy::TaggingApi => vec![Box::new(TaggingApiCollector::new(cloud))],
            GcStrategy::ServiceEnumeration => vec![
                Box::new(ClassicLoadBalancerCollector::new(cloud)),
                Box::new(LoadBalancerV2Collector::new(cloud)),
                Box::new(TargetGroupCollector::new(cloud)),
                Box::new(SecurityGroupCollector::new(cloud)),
            ],
        };
        Self::new(recorder, collectors, default_cleaners(cloud, cloud))
    }

    /// Delete everything the cluster's workloads left behind.
    ///
    /// Does nothing when disabled by annotation. A malformed annotation is a
    /// configuration error.
    pub fn reconcile_delete(&self, network: &ClusterNetwork) -> Result<()> {
        let enabled = should_gc(&network.annotations).map_err(|e| {
            self.recorder
                .warn(reasons::FAILED_GC_ANNOTATION, e.to_string());
            e
        })?;
        if !enabled {
            log::info!(
                "Garbage collection disabled for cluster {}",
                network.cluster_name
            );
            return Ok(());
        }

        let resources = self.collect(&network.cluster_name).map_err(|e| {
            self.recorder.warn(
                reasons::FAILED_GC_COLLECT,
                format!("Failed to collect resources for garbage collection: {e}"),
            );
            e
        })?;
        self.cleanup(&resources).map_err(|e| {
            self.recorder.warn(
                reasons::FAILED_GC_CLEANUP,
                format!("Failed to clean up resources: {e}"),
            );
            e
        })?;
        self.recorder.event(
            reasons::SUCCESSFUL_GC,
            format!("Garbage collected {} resource(s)", resources.len()),
        );
        Ok(())
    }

    /// Run every collector, concatenating their results.
    pub fn collect(&self, cluster_name: &str) -> Result<Vec<AwsResource>> {
        let mut resources = Vec::new();
        for collector in &self.collectors {
            let found = collector.run(cluster_name)?;
            log::debug!("gc: {} found {} resource(s)", collector.name(), found.len());
            resources.extend(found);
        }
        Ok(resources)
    }

    /// Run every cleaner in order over `resources`.
    pub fn cleanup(&self, resources: &[AwsResource]) -> Result<()> {
        for cleaner in &self.cleaners {
            log::debug!("gc: running {} cleanup", cleaner.name());
            cleaner.run(resources)?;
        }
        Ok(())
    }
}
