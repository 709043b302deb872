//! Resource tags and the parameters used to build them.
//!
//! Every tag set is built fresh from a [`BuildParams`] value; nothing here
//! holds a shared map that outlives one call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key/value tags on a cloud resource, ordered for stable output.
pub type Tags = BTreeMap<String, String>;

/// Tag key prefix marking cluster ownership of a resource.
pub const CLUSTER_TAG_PREFIX: &str = "sigs.k8s.io/cluster-api-provider-aws/cluster/";
/// Tag key holding the role of a resource ("public", "private", "common").
pub const ROLE_TAG_KEY: &str = "sigs.k8s.io/cluster-api-provider-aws/role";
/// Tag key marking subnets carved out of the secondary CIDR block.
pub const ASSOCIATION_TAG_KEY: &str = "sigs.k8s.io/cluster-api-provider-aws/association";
/// Value of [`ASSOCIATION_TAG_KEY`] for secondary subnets.
pub const SECONDARY_ASSOCIATION_VALUE: &str = "secondary";
/// Tag key prefix used by the Kubernetes cloud provider.
pub const CLOUD_PROVIDER_TAG_PREFIX: &str = "kubernetes.io/cluster/";
/// Subnets eligible for internet facing load balancers.
pub const EXTERNAL_ELB_TAG_KEY: &str = "kubernetes.io/role/elb";
/// Subnets eligible for internal load balancers.
pub const INTERNAL_ELB_TAG_KEY: &str = "kubernetes.io/role/internal-elb";
/// Tag set on resources created for a Kubernetes `Service`.
pub const SERVICE_NAME_TAG_KEY: &str = "kubernetes.io/service-name";
/// Tag set by EKS on security groups it manages.
pub const EKS_CLUSTER_NAME_TAG_KEY: &str = "aws:eks:cluster-name";
/// Human readable name tag.
pub const NAME_TAG_KEY: &str = "Name";

/// Role tag value for public subnets.
pub const PUBLIC_ROLE: &str = "public";
/// Role tag value for private subnets.
pub const PRIVATE_ROLE: &str = "private";
/// Role tag value for shared resources such as the VPC.
pub const COMMON_ROLE: &str = "common";

/// Ownership tag key for the given cluster.
pub fn cluster_tag_key(cluster_name: &str) -> String {
    format!("{CLUSTER_TAG_PREFIX}{cluster_name}")
}

/// Cloud provider tag key for the given cluster.
pub fn cloud_provider_tag_key(cluster_name: &str) -> String {
    format!("{CLOUD_PROVIDER_TAG_PREFIX}{cluster_name}")
}

/// Who owns the lifecycle of a tagged resource.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLifecycle {
    /// Created and deleted by this cluster.
    #[default]
    Owned,
    /// Used by this cluster but owned elsewhere.
    Shared,
}

impl ResourceLifecycle {
    /// Tag value representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceLifecycle::Owned => "owned",
            ResourceLifecycle::Shared => "shared",
        }
    }
}

impl fmt::Display for ResourceLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes how to tag one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParams {
    /// Cluster that owns the resource; no ownership tag when `None`.
    pub cluster_name: Option<String>,
    /// Resource the tags will be applied to.
    pub resource_id: String,
    /// Ownership of the resource.
    pub lifecycle: ResourceLifecycle,
    /// Value for the `Name` tag.
    pub name: Option<String>,
    /// Value for the role tag.
    pub role: Option<String>,
    /// Extra tags, applied first so the fields above win on conflict.
    pub additional: Tags,
}

impl BuildParams {
    /// Build the tag set described by these parameters.
    pub fn build(&self) -> Tags {
        let mut tags = self.additional.clone();
        if let Some(cluster_name) = &self.cluster_name {
            tags.insert(
                cluster_tag_key(cluster_name),
                self.lifecycle.as_str().to_string(),
            );
        }
        if let Some(role) = &self.role {
            tags.insert(ROLE_TAG_KEY.to_string(), role.clone());
        }
        if let Some(name) = &self.name {
            tags.insert(NAME_TAG_KEY.to_string(), name.clone());
        }
        tags
    }

    /// Tags from [`BuildParams::build`] that are missing from or differ in `current`.
    pub fn diff(&self, current: &Tags) -> Tags {
        self.build()
            .into_iter()
            .filter(|(k, v)| current.get(k) != Some(v))
            .collect()
    }
}

/// True if `tags` mark the resource as owned by `cluster_name`.
pub fn has_owned(tags: &Tags, cluster_name: &str) -> bool {
    tags.get(&cluster_tag_key(cluster_name)).map(String::as_str)
        == Some(ResourceLifecycle::Owned.as_str())
}

/// True if `tags` carry the public role.
pub fn has_public_role(tags: &Tags) -> bool {
    tags.get(ROLE_TAG_KEY).map(String::as_str) == Some(PUBLIC_ROLE)
}
