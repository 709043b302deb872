//! Subnet data model.

use super::tags::{Tags, ASSOCIATION_TAG_KEY, SECONDARY_ASSOCIATION_VALUE};
use super::Ipv4;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One subnet, either as desired by the cluster or as observed in the cloud.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Cloud assigned id, `None` until the subnet exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// CIDR block of the subnet (None if only referenced by id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<Ipv4>,
    /// Availability zone the subnet lives in.
    #[serde(default)]
    pub availability_zone: String,
    /// Whether the subnet routes to an internet gateway.
    #[serde(default)]
    pub is_public: bool,
    /// Route table associated with the subnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table_id: Option<String>,
    /// NAT gateway living in the subnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat_gateway_id: Option<String>,
    /// Tags on the subnet; for desired entries these are manual overrides.
    #[serde(default)]
    pub tags: Tags,
}

impl SubnetSpec {
    /// A desired subnet that does not exist yet.
    pub fn new(cidr_block: Ipv4, availability_zone: &str, is_public: bool) -> Self {
        SubnetSpec {
            cidr_block: Some(cidr_block),
            availability_zone: availability_zone.to_string(),
            is_public,
            ..Default::default()
        }
    }

    /// Id if known, otherwise the CIDR block, for messages.
    pub fn resource_id(&self) -> String {
        match (&self.id, &self.cidr_block) {
            (Some(id), _) => id.clone(),
            (None, Some(cidr)) => cidr.to_string(),
            (None, None) => "<unknown>".to_string(),
        }
    }

    /// True if `other` is the same subnet: same id, or same CIDR in the same zone.
    ///
    /// An empty zone on `self` matches any zone.
    pub fn is_equal(&self, other: &SubnetSpec) -> bool {
        if let (Some(id), Some(other_id)) = (&self.id, &other.id) {
            if id == other_id {
                return true;
            }
        }
        match (&self.cidr_block, &other.cidr_block) {
            (Some(cidr), Some(other_cidr)) => {
                cidr == other_cidr
                    && (self.availability_zone.is_empty()
                        || self.availability_zone == other.availability_zone)
            }
            _ => false,
        }
    }

    /// True if the subnet was carved out of the secondary CIDR block.
    pub fn is_secondary(&self) -> bool {
        self.tags.get(ASSOCIATION_TAG_KEY).map(String::as_str) == Some(SECONDARY_ASSOCIATION_VALUE)
    }

    /// Role name used in tags and names.
    pub fn role(&self) -> &'static str {
        if self.is_public {
            super::tags::PUBLIC_ROLE
        } else {
            super::tags::PRIVATE_ROLE
        }
    }
}

impl fmt::Display for SubnetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} ({})",
            self.id.as_deref().unwrap_or("-"),
            self.cidr_block
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.availability_zone,
            self.role()
        )
    }
}

/// Ordered collection of subnets.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Subnets(pub Vec<SubnetSpec>);

impl Subnets {
    /// Create an empty list.
    pub fn new() -> Self {
        Subnets(Vec::new())
    }

    /// Number of subnets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no subnets.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a subnet.
    pub fn push(&mut self, subnet: SubnetSpec) {
        self.0.push(subnet);
    }

    /// Iterate in order.
    pub fn iter(&self) -> std::slice::Iter<'_, SubnetSpec> {
        self.0.iter()
    }

    /// Iterate mutably in order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, SubnetSpec> {
        self.0.iter_mut()
    }

    /// Public subnets in order.
    pub fn filter_public(&self) -> Vec<&SubnetSpec> {
        self.0.iter().filter(|s| s.is_public).collect()
    }

    /// Private subnets in order.
    pub fn filter_private(&self) -> Vec<&SubnetSpec> {
        self.0.iter().filter(|s| !s.is_public).collect()
    }

    /// First subnet equal to `spec`, see [`SubnetSpec::is_equal`].
    pub fn find_equal(&self, spec: &SubnetSpec) -> Option<&SubnetSpec> {
        self.0.iter().find(|x| spec.is_equal(x))
    }

    /// Subnet with the given id.
    pub fn find_by_id(&self, id: &str) -> Option<&SubnetSpec> {
        self.0.iter().find(|x| x.id.as_deref() == Some(id))
    }
}

impl From<Vec<SubnetSpec>> for Subnets {
    fn from(v: Vec<SubnetSpec>) -> Self {
        Subnets(v)
    }
}

impl IntoIterator for Subnets {
    type Item = SubnetSpec;
    type IntoIter = std::vec::IntoIter<SubnetSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Subnets {
    type Item = &'a SubnetSpec;
    type IntoIter = std::slice::Iter<'a, SubnetSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
