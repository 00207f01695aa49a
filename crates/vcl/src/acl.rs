//! Access-control compilation
//!
//! Produces the named ACLs and the request-gating rules for a node:
//! - Edge: one `allow_all` ACL (loopback plus the purge allow list) and a
//!   405 rejection of PUSH/PURGE/DELETE from anyone outside it
//! - Mid: additionally an `allow_all_but_push_purge` ACL holding the
//!   coalesced child-node CIDRs and the RFC-1918 private ranges; children
//!   may fetch but never push or purge, and unknown clients are rejected
//!   outright

use once_cell::sync::Lazy;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use topology::{AccessConfig, CoalesceConfig};
use tracing::warn;

use crate::net::{coalesce, AddrBlock};
use crate::script::{Artifact, RECV_HOOK};

/// ACL every node carries: loopback plus the static purge allow list
pub const ALLOW_ALL_ACL: &str = "allow_all";
/// Mid-only ACL holding child CIDRs and private ranges
pub const ALLOW_CHILDREN_ACL: &str = "allow_all_but_push_purge";

static RFC_1918: Lazy<Vec<AddrBlock>> = Lazy::new(|| {
    ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"]
        .iter()
        .filter_map(|s| AddrBlock::parse(s))
        .collect()
});

/// Compile the ACL and gating rules for an edge node
pub fn compile_edge_acl(artifact: &mut Artifact, access: &AccessConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    add_static_allow(artifact, access, &mut warnings);

    artifact.append_hook(
        RECV_HOOK,
        "if ((req.method == \"PUSH\" || req.method == \"PURGE\" || req.method == \"DELETE\") && client.ip !~ allow_all) {",
    );
    artifact.append_hook(RECV_HOOK, "    return (synth(405));");
    artifact.append_hook(RECV_HOOK, "}");
    append_purge_shortcut(artifact);

    warnings
}

/// Compile the ACLs and gating rules for a mid node
///
/// Child addresses are partitioned per family and coalesced with the
/// configured thresholds before landing in the children ACL.
pub fn compile_mid_acl(artifact: &mut Artifact, access: &AccessConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    add_static_allow(artifact, access, &mut warnings);

    let settings = effective_coalesce(&access.coalesce, &mut warnings);

    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for entry in &access.children {
        match AddrBlock::parse(entry.trim()) {
            Some(block) if block.is_v4() => v4.push(block),
            Some(block) => v6.push(block),
            None => {
                warn!(address = %entry, "malformed child address, skipping");
                warnings.push(format!("malformed child address '{}', skipping", entry));
            }
        }
    }

    let (merged_v4, ws) = coalesce(&v4, settings.v4_min_members, settings.v4_prefix_len);
    warnings.extend(ws);
    let (merged_v6, ws) = coalesce(&v6, settings.v6_min_members, settings.v6_prefix_len);
    warnings.extend(ws);

    for block in merged_v4.into_iter().chain(merged_v6) {
        artifact.add_acl_entry(ALLOW_CHILDREN_ACL, block);
    }
    for block in RFC_1918.iter() {
        artifact.add_acl_entry(ALLOW_CHILDREN_ACL, *block);
    }

    // Children may fetch but never push or purge.
    artifact.append_hook(
        RECV_HOOK,
        "if ((req.method == \"PUSH\" || req.method == \"PURGE\") && client.ip ~ allow_all_but_push_purge) {",
    );
    artifact.append_hook(RECV_HOOK, "    return (synth(405));");
    artifact.append_hook(RECV_HOOK, "}");
    // Only known children and the static allow list may reach a mid at all.
    artifact.append_hook(
        RECV_HOOK,
        "if (client.ip !~ allow_all_but_push_purge && client.ip !~ allow_all) {",
    );
    artifact.append_hook(RECV_HOOK, "    return (synth(405));");
    artifact.append_hook(RECV_HOOK, "}");
    append_purge_shortcut(artifact);

    warnings
}

fn append_purge_shortcut(artifact: &mut Artifact) {
    artifact.append_hook(RECV_HOOK, "if (req.method == \"PURGE\") {");
    artifact.append_hook(RECV_HOOK, "    return (purge);");
    artifact.append_hook(RECV_HOOK, "}");
}

// localhost is trusted, always first, then the operator's purge allows.
fn add_static_allow(artifact: &mut Artifact, access: &AccessConfig, warnings: &mut Vec<String>) {
    artifact.add_acl_entry(ALLOW_ALL_ACL, AddrBlock::host(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    artifact.add_acl_entry(ALLOW_ALL_ACL, AddrBlock::host(IpAddr::V6(Ipv6Addr::LOCALHOST)));

    for entry in &access.purge_allow {
        match AddrBlock::parse(entry.trim()) {
            Some(block) => artifact.add_acl_entry(ALLOW_ALL_ACL, block),
            None => {
                warn!(address = %entry, "malformed purge allow address, skipping");
                warnings.push(format!(
                    "malformed purge allow address '{}', skipping",
                    entry
                ));
            }
        }
    }
}

// Out-of-range thresholds fall back to their defaults so one bad knob
// cannot take the node's access control with it.
fn effective_coalesce(config: &CoalesceConfig, warnings: &mut Vec<String>) -> CoalesceConfig {
    let defaults = CoalesceConfig::default();
    let mut settings = *config;

    if settings.v4_prefix_len == 0 || settings.v4_prefix_len > 32 {
        warnings.push(format!(
            "coalesce v4 prefix length {} out of range, using {}",
            settings.v4_prefix_len, defaults.v4_prefix_len
        ));
        settings.v4_prefix_len = defaults.v4_prefix_len;
    }
    if settings.v6_prefix_len == 0 || settings.v6_prefix_len > 128 {
        warnings.push(format!(
            "coalesce v6 prefix length {} out of range, using {}",
            settings.v6_prefix_len, defaults.v6_prefix_len
        ));
        settings.v6_prefix_len = defaults.v6_prefix_len;
    }

    settings
}
