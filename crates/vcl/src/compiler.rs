//! Compilation pipeline
//!
//! Sequences the phases over one artifact: build the backend/director
//! topology, compile access control for the node's role, compile
//! per-service routing, cache overrides, splice custom rules, then
//! serialize. Each run is independent; nothing is kept between calls.

use topology::{NodeRole, Snapshot};

use crate::acl::{compile_edge_acl, compile_mid_acl};
use crate::cacheability::compile_uncacheable;
use crate::directors::build_topology;
use crate::error::{Result, VclError};
use crate::routing::compile_routing;
use crate::script::Artifact;
use crate::snippets::inject_snippets;

/// Generation options for one compilation
#[derive(Debug, Clone, Default)]
pub struct CompileOpts {
    /// Header comment, without comment syntax; empty omits the header
    pub hdr_comment: String,
}

/// Result of one compilation: the script text and non-fatal warnings
#[derive(Debug, Clone)]
pub struct Compilation {
    pub text: String,
    pub warnings: Vec<String>,
}

/// Compile one snapshot into a proxy control script
///
/// Warnings accumulate across phases and come back alongside the text;
/// a hard error means the snapshot violates the caller contract and no
/// partial artifact is produced.
pub fn compile(snapshot: &Snapshot, opts: &CompileOpts) -> Result<Compilation> {
    if snapshot.node.name.is_empty() {
        return Err(VclError::InvalidNode("node has no name".to_string()));
    }
    for service in &snapshot.services {
        if service.name.is_empty() {
            return Err(VclError::InvalidService(format!(
                "service routing '{}' has no name",
                service.dest_domain
            )));
        }
    }

    let mut artifact = Artifact::new(&snapshot.version);
    artifact.set_comment(&opts.hdr_comment);
    let mut warnings = Vec::new();

    warnings.extend(build_topology(&mut artifact, &snapshot.services));

    match snapshot.node.role {
        NodeRole::Edge => warnings.extend(compile_edge_acl(&mut artifact, &snapshot.access)),
        NodeRole::Mid => warnings.extend(compile_mid_acl(&mut artifact, &snapshot.access)),
    }

    for service in &snapshot.services {
        compile_routing(&mut artifact, service);
    }

    warnings.extend(compile_uncacheable(&mut artifact, &snapshot.services));
    inject_snippets(&mut artifact, &snapshot.snippets)?;

    Ok(Compilation {
        text: artifact.serialize(),
        warnings,
    })
}
