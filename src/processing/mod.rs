//! Network reconciliation logic.
//!
//! This module contains the business logic that turns a desired network into
//! cloud resources:
//! - [`zones`] - Availability zone filtering and selection
//! - [`synthesize`] - Default and secondary subnet layouts
//! - [`describe`] - Observed subnet state
//! - [`overlap`] - Overlapping subnet detection
//! - [`tagging`] - Tag parameters for subnets and VPCs
//! - [`network`] - The [`NetworkService`] reconciler

mod describe;
mod network;
mod overlap;
mod synthesize;
mod tagging;
mod zones;

// Re-export public functions
pub use describe::{describe_vpc_subnets, INTERNET_GATEWAY_PREFIX};
pub use network::{NetworkService, DELETED_REASON};
pub use overlap::{find_overlapping_subnets, log_overlapping_subnets, OverlapConflict};
pub use synthesize::{default_subnets, secondary_subnets};
pub use tagging::{subnet_tag_params, vpc_tag_params, TEMPORARY_RESOURCE_ID};
pub use zones::{select_zones, select_zones_with_rng, usable_zones, ZONE_TYPE_AVAILABILITY_ZONE};
