//! Deletion stages of a garbage collection pass.
//!
//! Every stage sees the full resource set and picks the resources it owns by
//! ARN service and resource type. Stages run in dependency order: load
//! balancers hold target groups and security groups in use.

use super::collect::{EC2_SERVICE, ELB_SERVICE};
use super::AwsResource;
use crate::cloud::{CloudResult, Ec2Api, ElbApi};
use crate::error::{Error, Result};
use crate::models::tags::EKS_CLUSTER_NAME_TAG_KEY;

/// One deletion stage of a garbage collection pass.
pub trait ResourceCleaner {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Delete the resources of `resources` this stage is responsible for.
    ///
    /// Returns on the first error; resources that are already gone are skipped.
    fn run(&self, resources: &[AwsResource]) -> Result<()>;
}

/// Tolerate not-found, wrap everything else.
fn deleted(result: CloudResult<()>, operation: &'static str, id: &str) -> Result<()> {
    match result {
        Ok(()) => {
            log::info!("gc: {operation} {id}");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            log::debug!("gc: {id} already deleted");
            Ok(())
        }
        Err(e) => Err(Error::cloud(operation, id, e)),
    }
}

/// Classic, application and network load balancers.
pub struct LoadBalancerCleaner<'a> {
    elb: &'a dyn ElbApi,
}

impl<'a> LoadBalancerCleaner<'a> {
    pub fn new(elb: &'a dyn ElbApi) -> Self {
        Self { elb }
    }
}

impl ResourceCleaner for LoadBalancerCleaner<'_> {
    fn name(&self) -> &'static str {
        "load balancers"
    }

    fn run(&self, resources: &[AwsResource]) -> Result<()> {
        for r in resources.iter().filter(|r| r.arn.service == ELB_SERVICE) {
            let Some(path) = r.arn.resource.strip_prefix("loadbalancer/") else {
                continue;
            };
            if path.starts_with("app/") || path.starts_with("net/") {
                let arn = r.arn.to_string();
                deleted(
                    self.elb.delete_load_balancer_v2(&arn),
                    "delete load balancer",
                    &arn,
                )?;
            } else {
                deleted(
                    self.elb.delete_load_balancer(path),
                    "delete classic load balancer",
                    path,
                )?;
            }
        }
        Ok(())
    }
}

/// Target groups of v2 load balancers.
pub struct TargetGroupCleaner<'a> {
    elb: &'a dyn ElbApi,
}

impl<'a> TargetGroupCleaner<'a> {
    pub fn new(elb: &'a dyn ElbApi) -> Self {
        Self { elb }
    }
}

impl ResourceCleaner for TargetGroupCleaner<'_> {
    fn name(&self) -> &'static str {
        "target groups"
    }

    fn run(&self, resources: &[AwsResource]) -> Result<()> {
        for r in resources
            .iter()
            .filter(|r| r.arn.service == ELB_SERVICE && r.arn.resource.starts_with("targetgroup/"))
        {
            let arn = r.arn.to_string();
            deleted(self.elb.delete_target_group(&arn), "delete target group", &arn)?;
        }
        Ok(())
    }
}

/// Security groups, except those EKS manages itself.
pub struct SecurityGroupCleaner<'a> {
    ec2: &'a dyn Ec2Api,
}

impl<'a> SecurityGroupCleaner<'a> {
    pub fn new(ec2: &'a dyn Ec2Api) -> Self {
        Self { ec2 }
    }
}

impl ResourceCleaner for SecurityGroupCleaner<'_> {
    fn name(&self) -> &'static str {
        "security groups"
    }

    fn run(&self, resources: &[AwsResource]) -> Result<()> {
        for r in resources.iter().filter(|r| {
            r.arn.service == EC2_SERVICE && r.arn.resource.starts_with("security-group/")
        }) {
            let group_id = r.arn.resource_name();
            if r.tags.contains_key(EKS_CLUSTER_NAME_TAG_KEY) {
                log::debug!("gc: skipping EKS managed security group {group_id}");
                continue;
            }
            deleted(
                self.ec2.delete_security_group(group_id),
                "delete security group",
                group_id,
            )?;
        }
        Ok(())
    }
}

/// The cleanup stages in dependency order.
pub fn default_cleaners<'a>(
    ec2: &'a dyn Ec2Api,
    elb: &'a dyn ElbApi,
) -> Vec<Box<dyn ResourceCleaner + 'a>> {
    vec![
        Box::new(LoadBalancerCleaner::new(elb)),
        Box::new(TargetGroupCleaner::new(elb)),
        Box::new(SecurityGroupCleaner::new(ec2)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{CloudSnapshot, MemoryCloud, SecurityGroup, TaggedResource};
    use crate::models::{Arn, Tags};

    fn resource(arn: &str) -> AwsResource {
        AwsResource {
            arn: arn.parse().unwrap(),
            tags: Tags::new(),
        }
    }

    const ALB: &str =
        "arn:aws:elasticloadbalancing:us-east-1:123456789012:loadbalancer/app/web/50dc6c495c0c9188";
    const TG: &str =
        "arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/web/73e2d6bc24d8a067";

    fn cloud() -> MemoryCloud {
        let mut snapshot = CloudSnapshot::default();
        snapshot.load_balancers.push(TaggedResource {
            resource: "classic".to_string(),
            tags: Tags::new(),
        });
        snapshot.load_balancers_v2.push(TaggedResource {
            resource: ALB.to_string(),
            tags: Tags::new(),
        });
        snapshot.target_groups.push(TaggedResource {
            resource: TG.to_string(),
            tags: Tags::new(),
        });
        snapshot.security_groups.push(SecurityGroup {
            group_id: "sg-1".to_string(),
            vpc_id: None,
            tags: Tags::new(),
        });
        MemoryCloud::new(snapshot)
    }

    #[test]
    fn test_load_balancer_dispatch() {
        let cloud = cloud();
        let resources = vec![
            resource(TG),
            resource(ALB),
            AwsResource {
                arn: Arn::synthesize(ELB_SERVICE, "loadbalancer/classic"),
                tags: Tags::new(),
            },
        ];
        LoadBalancerCleaner::new(&cloud).run(&resources).unwrap();
        assert_eq!(
            cloud.calls(),
            vec![
                format!("delete_load_balancer_v2 {ALB}"),
                "delete_load_balancer classic".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_resources_are_skipped() {
        let cloud = MemoryCloud::new(CloudSnapshot::default());
        let resources = vec![resource(ALB), resource(TG)];
        LoadBalancerCleaner::new(&cloud).run(&resources).unwrap();
        TargetGroupCleaner::new(&cloud).run(&resources).unwrap();
        assert_eq!(cloud.calls().len(), 2);
    }

    #[test]
    fn test_security_group_skips_eks() {
        let cloud = cloud();
        let mut eks = AwsResource {
            arn: Arn::synthesize(EC2_SERVICE, "security-group/sg-eks"),
            tags: Tags::new(),
        };
        eks.tags
            .insert(EKS_CLUSTER_NAME_TAG_KEY.to_string(), "test".to_string());
        let resources = vec![
            eks,
            AwsResource {
                arn: Arn::synthesize(EC2_SERVICE, "security-group/sg-1"),
                tags: Tags::new(),
            },
            AwsResource {
                arn: Arn::synthesize(EC2_SERVICE, "subnet/subnet-1"),
                tags: Tags::new(),
            },
        ];
        SecurityGroupCleaner::new(&cloud).run(&resources).unwrap();
        assert_eq!(cloud.calls(), vec!["delete_security_group sg-1"]);
    }

    #[test]
    fn test_first_error_stops_stage() {
        let cloud = cloud();
        cloud.fail_next("delete_security_group", "DependencyViolation", 1);
        let resources = vec![
            AwsResource {
                arn: Arn::synthesize(EC2_SERVICE, "security-group/sg-1"),
                tags: Tags::new(),
            },
            AwsResource {
                arn: Arn::synthesize(EC2_SERVICE, "security-group/sg-2"),
                tags: Tags::new(),
            },
        ];
        let err = SecurityGroupCleaner::new(&cloud).run(&resources).unwrap_err();
        assert!(matches!(
            err,
            Error::Cloud {
                operation: "delete security group",
                ..
            }
        ));
        assert_eq!(cloud.count_calls("delete_security_group"), 1);
    }

    #[test]
    fn test_default_order() {
        let cloud = cloud();
        let names: Vec<&str> = default_cleaners(&cloud, &cloud)
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(names, vec!["load balancers", "target groups", "security groups"]);
    }
}
