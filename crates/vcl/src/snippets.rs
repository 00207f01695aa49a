//! Operator-authored rule splicing
//!
//! Fragments from the parameter store land in their hook bucket exactly as
//! written. Nothing here parses, reindents, or reorders a line; provenance
//! is logged and otherwise ignored.

use topology::Snippet;
use tracing::debug;

use crate::error::{Result, VclError};
use crate::script::Artifact;

/// Splice every fragment into its hook, in input order
pub fn inject_snippets(artifact: &mut Artifact, snippets: &[Snippet]) -> Result<()> {
    for snippet in snippets {
        if snippet.hook.is_empty() {
            return Err(VclError::InvalidSnippet(format!(
                "snippet from '{}' has no hook name",
                snippet.source
            )));
        }
        debug!(
            hook = %snippet.hook,
            source = %snippet.source,
            lines = snippet.lines.len(),
            "splicing custom rules"
        );
        for line in &snippet.lines {
            artifact.append_hook(&snippet.hook, line.clone());
        }
    }
    Ok(())
}
