//! Availability zone discovery and selection.

use crate::cloud::{AvailabilityZone, STATE_AVAILABLE};
use crate::models::ZoneSelection;
use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;

/// Zone type of regular availability zones (as opposed to local zones).
pub const ZONE_TYPE_AVAILABILITY_ZONE: &str = "availability-zone";

/// Names of zones usable for subnets, sorted.
pub fn usable_zones(zones: &[AvailabilityZone]) -> Vec<String> {
    zones
        .iter()
        .filter(|z| z.state == STATE_AVAILABLE && z.zone_type == ZONE_TYPE_AVAILABILITY_ZONE)
        .map(|z| z.zone_name.clone())
        .sorted()
        .dedup()
        .collect()
}

/// Pick at most `limit` zones from `all_zones`.
///
/// All zones are returned unchanged when there are no more than `limit`.
/// Otherwise [`ZoneSelection::Ordered`] keeps the lexicographically first
/// zones and [`ZoneSelection::Random`] keeps a uniformly random subset.
pub fn select_zones(all_zones: &[String], limit: usize, policy: ZoneSelection) -> Vec<String> {
    select_zones_with_rng(all_zones, limit, policy, &mut rand::thread_rng())
}

/// [`select_zones`] with a caller supplied random source.
pub fn select_zones_with_rng<R: Rng + ?Sized>(
    all_zones: &[String],
    limit: usize,
    policy: ZoneSelection,
    rng: &mut R,
) -> Vec<String> {
    if all_zones.len() <= limit {
        return all_zones.to_vec();
    }
    let mut zones = all_zones.to_vec();
    match policy {
        ZoneSelection::Random => zones.shuffle(rng),
        ZoneSelection::Ordered => zones.sort(),
    }
    zones.truncate(limit);
    log::debug!(
        "selected zones [{}] out of {} with {:?}",
        zones.join(", "),
        all_zones.len(),
        policy
    );
    zones
}
