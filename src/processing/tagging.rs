//! Tag parameters for network resources.
//!
//! Each call returns a fresh [`BuildParams`]; the caller decides whether to
//! apply the full set at creation or only the diff against observed tags.

use crate::models::tags::{
    cloud_provider_tag_key, COMMON_ROLE, EXTERNAL_ELB_TAG_KEY, INTERNAL_ELB_TAG_KEY, PRIVATE_ROLE,
    PUBLIC_ROLE,
};
use crate::models::{BuildParams, ManagementMode, ResourceLifecycle, Tags};

/// Resource id used for tags built before the resource exists.
pub const TEMPORARY_RESOURCE_ID: &str = "temporary-resource-id";

/// Tags for a subnet.
///
/// Every subnet gets the load balancer role tag and the shared cloud provider
/// tag. Subnets of a managed network are also tagged as owned, with role and
/// name, and carry the user supplied `manual` tags.
pub fn subnet_tag_params(
    cluster_name: &str,
    mode: ManagementMode,
    subnet_id: &str,
    is_public: bool,
    zone: &str,
    manual: &Tags,
) -> BuildParams {
    let mut additional = match mode {
        ManagementMode::Managed => manual.clone(),
        ManagementMode::Unmanaged => Tags::new(),
    };
    let elb_key = if is_public {
        EXTERNAL_ELB_TAG_KEY
    } else {
        INTERNAL_ELB_TAG_KEY
    };
    additional.insert(elb_key.to_string(), "1".to_string());
    additional.insert(
        cloud_provider_tag_key(cluster_name),
        ResourceLifecycle::Shared.as_str().to_string(),
    );

    if mode.is_unmanaged() {
        return BuildParams {
            resource_id: subnet_id.to_string(),
            additional,
            ..Default::default()
        };
    }

    let role = if is_public { PUBLIC_ROLE } else { PRIVATE_ROLE };
    BuildParams {
        cluster_name: Some(cluster_name.to_string()),
        resource_id: subnet_id.to_string(),
        lifecycle: ResourceLifecycle::Owned,
        name: Some(format!("{cluster_name}-subnet-{role}-{zone}")),
        role: Some(role.to_string()),
        additional,
    }
}

/// Tags for a managed VPC.
pub fn vpc_tag_params(cluster_name: &str, vpc_id: &str, manual: &Tags) -> BuildParams {
    BuildParams {
        cluster_name: Some(cluster_name.to_string()),
        resource_id: vpc_id.to_string(),
        lifecycle: ResourceLifecycle::Owned,
        name: Some(format!("{cluster_name}-vpc")),
        role: Some(COMMON_ROLE.to_string()),
        additional: manual.clone(),
    }
}
