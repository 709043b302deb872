//! Discovery of resources owned by a cluster.

use super::AwsResource;
use crate::cloud::{Ec2Api, ElbApi, TaggedResource, TaggingApi, MAX_TAG_DESCRIBE_BATCH};
use crate::error::{Error, Result};
use crate::models::tags::{cloud_provider_tag_key, SERVICE_NAME_TAG_KEY};
use crate::models::{Arn, ResourceLifecycle, Tags};

/// Service name of load balancers and target groups in ARNs.
pub const ELB_SERVICE: &str = "elasticloadbalancing";
/// Service name of security groups in ARNs.
pub const EC2_SERVICE: &str = "ec2";

/// One collection stage of a garbage collection pass.
pub trait ResourceCollector {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Resources owned by `cluster_name` that this stage knows how to find.
    fn run(&self, cluster_name: &str) -> Result<Vec<AwsResource>>;
}

fn owned_value() -> String {
    ResourceLifecycle::Owned.as_str().to_string()
}

/// True if `tags` mark a resource created for a service of `cluster_name`.
fn is_owned_service_resource(tags: &Tags, cluster_name: &str) -> bool {
    tags.contains_key(SERVICE_NAME_TAG_KEY)
        && tags.get(&cloud_provider_tag_key(cluster_name)) == Some(&owned_value())
}

/// Describe tags of `ids` in batches the provider accepts.
fn describe_tags_batched<F>(ids: &[String], mut describe: F) -> Result<Vec<TaggedResource>>
where
    F: FnMut(&[String]) -> Result<Vec<TaggedResource>>,
{
    let mut tagged = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_TAG_DESCRIBE_BATCH) {
        tagged.extend(describe(chunk)?);
    }
    Ok(tagged)
}

/// Finds everything with a single resource tagging API query.
pub struct TaggingApiCollector<'a> {
    tagging: &'a dyn TaggingApi,
}

impl<'a> TaggingApiCollector<'a> {
    pub fn new(tagging: &'a dyn TaggingApi) -> Self {
        Self { tagging }
    }
}

impl ResourceCollector for TaggingApiCollector<'_> {
    fn name(&self) -> &'static str {
        "tagging API"
    }

    fn run(&self, cluster_name: &str) -> Result<Vec<AwsResource>> {
        let key = cloud_provider_tag_key(cluster_name);
        let tagged = self
            .tagging
            .get_resources(&key, &[owned_value()])
            .map_err(|e| Error::describe("tagged resources", e))?;
        tagged
            .into_iter()
            .map(|r| -> Result<AwsResource> {
                Ok(AwsResource {
                    arn: r.resource.parse()?,
                    tags: r.tags,
                })
            })
            .collect()
    }
}

/// Classic load balancers, matched by tag and named by a synthesized ARN.
pub struct ClassicLoadBalancerCollector<'a> {
    elb: &'a dyn ElbApi,
}

impl<'a> ClassicLoadBalancerCollector<'a> {
    pub fn new(elb: &'a dyn ElbApi) -> Self {
        Self { elb }
    }
}

impl ResourceCollector for ClassicLoadBalancerCollector<'_> {
    fn name(&self) -> &'static str {
        "classic load balancers"
    }

    fn run(&self, cluster_name: &str) -> Result<Vec<AwsResource>> {
        let names = self
            .elb
            .describe_load_balancers()
            .map_err(|e| Error::describe("load balancers", e))?;
        let tagged = describe_tags_batched(&names, |chunk| {
            self.elb
                .describe_load_balancer_tags(chunk)
                .map_err(|e| Error::describe("load balancer tags", e))
        })?;
        Ok(tagged
            .into_iter()
            .filter(|r| is_owned_service_resource(&r.tags, cluster_name))
            .map(|r| AwsResource {
                arn: Arn::synthesize(ELB_SERVICE, &format!("loadbalancer/{}", r.resource)),
                tags: r.tags,
            })
            .collect())
    }
}

/// Application and network load balancers, by their own ARN.
pub struct LoadBalancerV2Collector<'a> {
    elb: &'a dyn ElbApi,
}

impl<'a> LoadBalancerV2Collector<'a> {
    pub fn new(elb: &'a dyn ElbApi) -> Self {
        Self { elb }
    }
}

impl ResourceCollector for LoadBalancerV2Collector<'_> {
    fn name(&self) -> &'static str {
        "v2 load balancers"
    }

    fn run(&self, cluster_name: &str) -> Result<Vec<AwsResource>> {
        let arns = self
            .elb
            .describe_load_balancers_v2()
            .map_err(|e| Error::describe("v2 load balancers", e))?;
        collect_v2(self.elb, &arns, cluster_name)
    }
}

/// Target groups, by their own ARN.
pub struct TargetGroupCollector<'a> {
    elb: &'a dyn ElbApi,
}

impl<'a> TargetGroupCollector<'a> {
    pub fn new(elb: &'a dyn ElbApi) -> Self {
        Self { elb }
    }
}

impl ResourceCollector for TargetGroupCollector<'_> {
    fn name(&self) -> &'static str {
        "target groups"
    }

    fn run(&self, cluster_name: &str) -> Result<Vec<AwsResource>> {
        let arns = self
            .elb
            .describe_target_groups()
            .map_err(|e| Error::describe("target groups", e))?;
        collect_v2(self.elb, &arns, cluster_name)
    }
}

fn collect_v2(elb: &dyn ElbApi, arns: &[String], cluster_name: &str) -> Result<Vec<AwsResource>> {
    let tagged = describe_tags_batched(arns, |chunk| {
        elb.describe_tags_v2(chunk)
            .map_err(|e| Error::describe("v2 resource tags", e))
    })?;
    tagged
        .into_iter()
        .filter(|r| is_owned_service_resource(&r.tags, cluster_name))
        .map(|r| -> Result<AwsResource> {
            Ok(AwsResource {
                arn: r.resource.parse()?,
                tags: r.tags,
            })
        })
        .collect()
}

/// Security groups tagged as owned by the cluster.
pub struct SecurityGroupCollector<'a> {
    ec2: &'a dyn Ec2Api,
}

impl<'a> SecurityGroupCollector<'a> {
    pub fn new(ec2: &'a dyn Ec2Api) -> Self {
        Self { ec2 }
    }
}

impl ResourceCollector for SecurityGroupCollector<'_> {
    fn name(&self) -> &'static str {
        "security groups"
    }

    fn run(&self, cluster_name: &str) -> Result<Vec<AwsResource>> {
        let groups = self
            .ec2
            .describe_security_groups(&cloud_provider_tag_key(cluster_name), &owned_value())
            .map_err(|e| Error::describe("security groups", e))?;
        Ok(groups
            .into_iter()
            .map(|g| AwsResource {
                arn: Arn::synthesize(EC2_SERVICE, &format!("security-group/{}", g.group_id)),
                tags: g.tags,
            })
            .collect())
    }
}
