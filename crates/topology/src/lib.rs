//! vclc-topology: Topology snapshot model for the vclc compiler
//!
//! This crate provides the upstream-resolved input model (node identity and
//! role, routed services with parent assignments, access lists, coalescing
//! thresholds, custom rule fragments) and TOML snapshot loading with
//! validation.

pub mod service;
pub mod snapshot;

pub use service::{Node, NodeRole, ParentEndpoint, RetryPolicy, RoutedService};
pub use snapshot::{AccessConfig, CoalesceConfig, Snapshot, SnapshotError, Snippet};
