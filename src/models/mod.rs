//! Domain models for network reconciliation.
//!
//! This module contains the core data structures used throughout the crate:
//! - [`Ipv4`] - CIDR blocks, address arithmetic and [`split_into_subnets`]
//! - [`SubnetSpec`] and [`Subnets`] - desired and observed subnets
//! - [`VpcSpec`] - the cluster network and its [`ManagementMode`]
//! - [`BuildParams`] and [`Tags`] - resource tagging
//! - [`Arn`] - resource names used by garbage collection

mod arn;
mod ipv4;
mod subnet;
pub mod tags;
mod vpc;

// Re-export public types
pub use arn::{Arn, FAKE_ACCOUNT, FAKE_PARTITION, FAKE_REGION};
pub use ipv4::{
    broadcast_addr, cut_addr, get_cidr_mask, ip_after_subnet, next_subnet_ipv4, num_aws_hosts,
    split_into_subnets, Ipv4, MAX_LENGTH, MIN_AWS_SUBNET_MASK,
};
pub use subnet::{SubnetSpec, Subnets};
pub use tags::{BuildParams, ResourceLifecycle, Tags};
pub use vpc::{ManagementMode, VpcSpec, ZoneSelection, DEFAULT_AZ_USAGE_LIMIT};
