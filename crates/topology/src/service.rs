//! Routed-service and node model consumed by the configuration compiler

use serde::{Deserialize, Serialize};

/// Role of the cache node a snapshot is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Edge,
    Mid,
}

/// Identity of the cache node being compiled for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Host name of the node
    pub name: String,

    /// Edge or mid tier
    pub role: NodeRole,

    /// Cache group the node belongs to
    #[serde(default)]
    pub cache_group: String,
}

/// Parent failover policy for a routed service
///
/// Unrecognized policy names deserialize to [`RetryPolicy::ConsistentHash`],
/// matching the upstream resolver's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum RetryPolicy {
    RoundRobinIp,
    RoundRobinStrict,
    First,
    Latched,
    #[default]
    ConsistentHash,
}

impl From<String> for RetryPolicy {
    fn from(s: String) -> Self {
        match s.as_str() {
            "round_robin_ip" => RetryPolicy::RoundRobinIp,
            "round_robin_strict" => RetryPolicy::RoundRobinStrict,
            "first" => RetryPolicy::First,
            "latched" => RetryPolicy::Latched,
            _ => RetryPolicy::ConsistentHash,
        }
    }
}

/// A single upstream parent (host:port) a service may forward to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentEndpoint {
    /// Fully qualified host name
    pub fqdn: String,

    /// TCP port, 0 meaning the proxy default
    #[serde(default)]
    pub port: u16,
}

impl ParentEndpoint {
    /// Identity key used for backend deduplication and as the backend name
    /// in the compiled artifact
    pub fn backend_key(&self) -> String {
        let host = self.fqdn.replace('.', "_");
        if self.port > 0 {
            format!("{}_{}", host, self.port)
        } else {
            host
        }
    }
}

/// One delivery service routed through this node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedService {
    /// Unique service name, used as the director identifier
    pub name: String,

    /// Origin domain requests are ultimately forwarded to
    pub dest_domain: String,

    /// Origin port
    #[serde(default = "default_service_port")]
    pub port: u16,

    /// First-choice parents, in failover order
    #[serde(default)]
    pub primary_parents: Vec<ParentEndpoint>,

    /// Second-choice parents, in failover order
    #[serde(default)]
    pub secondary_parents: Vec<ParentEndpoint>,

    /// How the proxy fails over between parents
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Request host names that route to this service
    #[serde(default)]
    pub request_hosts: Vec<String>,

    /// Force responses for this service to be uncacheable
    #[serde(default)]
    pub never_cache: bool,
}

impl RoutedService {
    /// The terminal origin backend every service falls back to
    pub fn origin_endpoint(&self) -> ParentEndpoint {
        ParentEndpoint {
            fqdn: self.dest_domain.clone(),
            port: self.port,
        }
    }
}

fn default_service_port() -> u16 {
    80
}
