//! Cache-control overrides
//!
//! Services flagged never-cache get one response-phase rule forcing
//! uncacheable treatment, keyed on the origin host the outbound request
//! was rewritten to.

use topology::RoutedService;
use tracing::warn;

use crate::routing::host_disjunction;
use crate::script::{Artifact, RESPONSE_HOOK};

/// Emit the uncacheable rule covering every qualifying service
pub fn compile_uncacheable(artifact: &mut Artifact, services: &[RoutedService]) -> Vec<String> {
    let mut warnings = Vec::new();

    let mut origin_hosts = Vec::new();
    for service in services {
        if !service.never_cache {
            continue;
        }
        if service.dest_domain.is_empty() {
            warn!(service = %service.name, "never-cache service has no origin host, skipping");
            warnings.push(format!(
                "never-cache service '{}' has no origin host, skipping",
                service.name
            ));
            continue;
        }
        origin_hosts.push(service.dest_domain.clone());
    }

    if origin_hosts.is_empty() {
        return warnings;
    }

    let disjunction = host_disjunction("bereq.http.host", &origin_hosts);
    artifact.append_hook(RESPONSE_HOOK, format!("if ({}) {{", disjunction));
    artifact.append_hook(RESPONSE_HOOK, "    set beresp.uncacheable = true;");
    artifact.append_hook(RESPONSE_HOOK, "}");

    warnings
}
