//! Default subnet layouts.
//!
//! A managed VPC without explicit subnets gets one public and one private
//! subnet per zone. The VPC block is cut into `zones + 1` equal parts: the
//! first part is shared by all public subnets, every other part becomes one
//! private subnet. Private subnets are therefore much larger than public ones.

use crate::error::{Error, Result};
use crate::models::tags::{ASSOCIATION_TAG_KEY, SECONDARY_ASSOCIATION_VALUE};
use crate::models::{split_into_subnets, Ipv4, SubnetSpec, Subnets, VpcSpec};

/// Default subnets for `vpc` spread over `zones`.
///
/// # Returns
/// Subnets ordered public-a, private-a, public-b, private-b, ...
pub fn default_subnets(vpc: &VpcSpec, zones: &[String]) -> Result<Subnets> {
    let cidr = vpc
        .cidr_block
        .ok_or_else(|| Error::Config("VPC has no CIDR block to carve subnets from".to_string()))?;
    if zones.is_empty() {
        return Err(Error::Config(format!(
            "no availability zones to place subnets of {cidr} in"
        )));
    }

    let blocks = split_into_subnets(&cidr.to_string(), zones.len() + 1)?;
    let public_blocks = split_into_subnets(&blocks[0].to_string(), zones.len())?;
    let private_blocks = &blocks[1..];

    let mut subnets = Subnets::new();
    for (i, zone) in zones.iter().enumerate() {
        subnets.push(SubnetSpec::new(public_blocks[i], zone, true));
        subnets.push(SubnetSpec::new(private_blocks[i], zone, false));
    }
    log::debug!(
        "default layout for {cidr} over {} zone(s): {}",
        zones.len(),
        subnets
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(subnets)
}

/// Private subnets carved from the secondary CIDR block, one per zone.
///
/// Subnets already present in `existing` are left out, so calling this on
/// every pass adds nothing new after the first.
pub fn secondary_subnets(
    secondary: &Ipv4,
    zones: &[String],
    existing: &Subnets,
) -> Result<Vec<SubnetSpec>> {
    if zones.is_empty() {
        return Ok(Vec::new());
    }
    let blocks = split_into_subnets(&secondary.to_string(), zones.len())?;
    Ok(zones
        .iter()
        .zip(blocks)
        .map(|(zone, block)| {
            let mut subnet = SubnetSpec::new(block, zone, false);
            subnet.tags.insert(
                ASSOCIATION_TAG_KEY.to_string(),
                SECONDARY_ASSOCIATION_VALUE.to_string(),
            );
            subnet
        })
        .filter(|s| existing.find_equal(s).is_none())
        .collect())
}
