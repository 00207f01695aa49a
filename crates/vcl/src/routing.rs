//! Per-service request routing
//!
//! Binds inbound request hosts to the service's director and, when the
//! request host is not already the origin domain, rewrites the outbound
//! host header on the backend-fetch side.

use topology::RoutedService;
use tracing::debug;

use crate::script::{Artifact, FETCH_HOOK, RECV_HOOK};

/// Emit the host-match and rewrite rules for one service
///
/// Services without request hosts or without a destination domain emit
/// nothing; the latter never got a director, so a rule would reference an
/// object the init hook never constructs.
pub fn compile_routing(artifact: &mut Artifact, service: &RoutedService) {
    if service.request_hosts.is_empty() || service.dest_domain.is_empty() {
        debug!(service = %service.name, "no routable hosts, skipping");
        return;
    }

    let inbound = host_disjunction("req.http.host", &service.request_hosts);
    artifact.append_hook(RECV_HOOK, format!("if ({}) {{", inbound));
    artifact.append_hook(
        RECV_HOOK,
        format!("    set req.backend_hint = {}.backend();", service.name),
    );
    artifact.append_hook(RECV_HOOK, "}");

    // A single request host equal to the origin domain needs no rewrite;
    // that is the usual mid-tier case.
    let needs_rewrite =
        service.request_hosts.len() > 1 || service.request_hosts[0] != service.dest_domain;
    if needs_rewrite {
        let outbound = host_disjunction("bereq.http.host", &service.request_hosts);
        artifact.append_hook(FETCH_HOOK, format!("if ({}) {{", outbound));
        artifact.append_hook(
            FETCH_HOOK,
            format!("    set bereq.http.host = \"{}\";", service.dest_domain),
        );
        artifact.append_hook(FETCH_HOOK, "}");
    }
}

/// `field == "host"` terms joined with `||`, in the given host order
pub(crate) fn host_disjunction(field: &str, hosts: &[String]) -> String {
    hosts
        .iter()
        .map(|host| format!("{} == \"{}\"", field, host))
        .collect::<Vec<_>>()
        .join(" || ")
}
