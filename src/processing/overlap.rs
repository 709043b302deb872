//! Overlapping subnet CIDR detection.
//!
//! Detects desired subnets whose address ranges intersect, which the
//! provider would reject when the second one is created.

use crate::models::{Ipv4, SubnetSpec, Subnets};

/// Two subnets with intersecting CIDR blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapConflict {
    pub first: Ipv4,
    pub first_zone: String,
    pub second: Ipv4,
    pub second_zone: String,
}

impl OverlapConflict {
    fn new(a: (&Ipv4, &SubnetSpec), b: (&Ipv4, &SubnetSpec)) -> Self {
        OverlapConflict {
            first: *a.0,
            first_zone: a.1.availability_zone.clone(),
            second: *b.0,
            second_zone: b.1.availability_zone.clone(),
        }
    }
}

/// Find every pair of subnets whose CIDR blocks overlap.
///
/// Subnets without a CIDR block are ignored.
///
/// # Arguments
/// * `subnets` - The subnets to check
///
/// # Returns
/// Conflicts sorted by the first CIDR, each pair reported once
pub fn find_overlapping_subnets(subnets: &Subnets) -> Vec<OverlapConflict> {
    let with_cidr: Vec<(&Ipv4, &SubnetSpec)> = subnets
        .iter()
        .filter_map(|s| s.cidr_block.as_ref().map(|c| (c, s)))
        .collect();

    let mut conflicts = Vec::new();
    for (i, a) in with_cidr.iter().enumerate() {
        for b in with_cidr.iter().skip(i + 1) {
            if a.0.overlaps(b.0) {
                let (lo, hi) = if a.0 <= b.0 { (*a, *b) } else { (*b, *a) };
                conflicts.push(OverlapConflict::new(lo, hi));
            }
        }
    }

    // Sort by CIDR for consistent output
    conflicts.sort_by_key(|c| (c.first, c.second));
    conflicts
}

/// Log overlapping subnets as warnings.
pub fn log_overlapping_subnets(conflicts: &[OverlapConflict]) {
    if conflicts.is_empty() {
        log::debug!("No overlapping subnet CIDRs found.");
        return;
    }

    log::warn!("Found {} overlapping subnet CIDR pair(s):", conflicts.len());
    for c in conflicts {
        log::warn!(
            "  {} ({}) overlaps {} ({})",
            c.first,
            c.first_zone,
            c.second,
            c.second_zone
        );
    }
}
