//! Topology snapshot parsing and validation
//!
//! A snapshot is the single TOML document handed to one compilation run. It
//! carries only upstream-resolved data: which node this is, which services
//! route through it, the static access lists, and any operator-authored rule
//! fragments. The compiler never re-resolves or filters any of it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::service::{Node, RoutedService};

/// Snapshot error
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Root topology snapshot consumed by one compilation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Control-language version emitted in the artifact header
    #[serde(default = "default_version")]
    pub version: String,

    /// Node being compiled for
    pub node: Node,

    /// Static access-control inputs
    #[serde(default)]
    pub access: AccessConfig,

    /// Routed services assigned to this node
    #[serde(default)]
    pub services: Vec<RoutedService>,

    /// Operator-authored rule fragments, spliced verbatim
    #[serde(default)]
    pub snippets: Vec<Snippet>,
}

/// Static access-control inputs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Addresses/CIDRs allowed to purge in addition to loopback
    #[serde(default)]
    pub purge_allow: Vec<String>,

    /// Child-node interface addresses, used by mid nodes only
    #[serde(default)]
    pub children: Vec<String>,

    /// Per-family thresholds for child-address coalescing
    #[serde(default)]
    pub coalesce: CoalesceConfig,
}

/// Per-family coalescing thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalesceConfig {
    /// Prefix length merged v4 blocks are widened to
    #[serde(default = "default_v4_prefix_len")]
    pub v4_prefix_len: u8,

    /// Minimum v4 members before a merge happens
    #[serde(default = "default_v4_min_members")]
    pub v4_min_members: usize,

    /// Prefix length merged v6 blocks are widened to
    #[serde(default = "default_v6_prefix_len")]
    pub v6_prefix_len: u8,

    /// Minimum v6 members before a merge happens
    #[serde(default = "default_v6_min_members")]
    pub v6_min_members: usize,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            v4_prefix_len: default_v4_prefix_len(),
            v4_min_members: default_v4_min_members(),
            v6_prefix_len: default_v6_prefix_len(),
            v6_min_members: default_v6_min_members(),
        }
    }
}

/// One verbatim rule fragment targeted at a hook subroutine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    /// Hook subroutine the lines are appended to
    pub hook: String,

    /// Originating file in the parameter store, for diagnostics only
    #[serde(default)]
    pub source: String,

    /// Rule lines, inserted without any parsing or rewriting
    #[serde(default)]
    pub lines: Vec<String>,
}

impl Snapshot {
    /// Load a snapshot from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(&path)?;
        let snapshot: Snapshot = toml::from_str(&content)?;
        snapshot.validate()?;
        debug!(
            path = %path.as_ref().display(),
            services = snapshot.services.len(),
            snippets = snapshot.snippets.len(),
            "loaded topology snapshot"
        );
        Ok(snapshot)
    }

    /// Validate the snapshot
    ///
    /// Only upstream data-integrity bugs are rejected here; everything
    /// recoverable is left for the compiler to warn about.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.node.name.is_empty() {
            return Err(SnapshotError::Validation(
                "node has no name".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.is_empty() {
                return Err(SnapshotError::Validation(format!(
                    "service routing '{}' has no name",
                    service.dest_domain
                )));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(SnapshotError::Validation(format!(
                    "duplicate service name '{}'",
                    service.name
                )));
            }
        }

        for snippet in &self.snippets {
            if snippet.hook.is_empty() {
                return Err(SnapshotError::Validation(format!(
                    "snippet from '{}' has no hook name",
                    snippet.source
                )));
            }
        }

        Ok(())
    }
}

fn default_version() -> String {
    "4.1".to_string()
}

fn default_v4_prefix_len() -> u8 {
    24
}

fn default_v4_min_members() -> usize {
    5
}

fn default_v6_prefix_len() -> u8 {
    48
}

fn default_v6_min_members() -> usize {
    5
}
