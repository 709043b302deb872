//! Declarative reconciliation of a cluster's VPC and subnets.
//!
//! - [`models`] - CIDR blocks, subnets, VPCs and tags
//! - [`cloud`] - Cloud API traits and the in-memory account
//! - [`processing`] - Zone selection, subnet synthesis and the reconciler
//! - [`gc`] - Garbage collection of resources left by cluster workloads
//! - [`output`] - Terminal rendering of the reconciled subnets

pub mod cloud;
pub mod config;
pub mod error;
pub mod events;
pub mod gc;
pub mod models;
pub mod output;
pub mod processing;
pub mod retry;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use gc::{GarbageCollector, GcStrategy};
pub use processing::NetworkService;
pub use state::{ClusterNetwork, JsonFileStore, MemoryStore, StateStore};
