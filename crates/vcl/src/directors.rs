//! Backend and director topology construction
//!
//! Builds the deduplicated backend set and the per-service director chain:
//! an optional primary and secondary sub-director whose kind follows the
//! service retry policy, tied together by a top-level fallback director
//! whose last member is always the terminal origin backend.

use topology::{ParentEndpoint, RetryPolicy, RoutedService};
use tracing::warn;

use crate::script::{Artifact, Backend, INIT_HOOK};

/// Director flavor the proxy should instantiate for a parent group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorKind {
    RoundRobin,
    Fallback { sticky: bool },
    Shard,
}

impl DirectorKind {
    /// Map a service retry policy onto a director kind
    pub fn from_policy(policy: RetryPolicy) -> Self {
        match policy {
            RetryPolicy::RoundRobinIp | RetryPolicy::RoundRobinStrict => DirectorKind::RoundRobin,
            RetryPolicy::First => DirectorKind::Fallback { sticky: false },
            RetryPolicy::Latched => DirectorKind::Fallback { sticky: true },
            RetryPolicy::ConsistentHash => DirectorKind::Shard,
        }
    }

    /// Constructor expression in the control language
    fn constructor(&self) -> &'static str {
        match self {
            DirectorKind::RoundRobin => "round_robin()",
            DirectorKind::Fallback { sticky: false } => "fallback()",
            DirectorKind::Fallback { sticky: true } => "fallback(sticky = true)",
            DirectorKind::Shard => "shard()",
        }
    }
}

/// Register backends and director-init statements for every service
///
/// Output order is fixed by the caller's service order; nothing is sorted.
pub fn build_topology(artifact: &mut Artifact, services: &[RoutedService]) -> Vec<String> {
    let mut warnings = Vec::new();
    for service in services {
        if service.dest_domain.is_empty() {
            warn!(service = %service.name, "service has no destination domain, skipping");
            warnings.push(format!(
                "service '{}' has no destination domain, skipping",
                service.name
            ));
            continue;
        }
        build_service(artifact, service);
    }
    warnings
}

fn build_service(artifact: &mut Artifact, service: &RoutedService) {
    artifact.add_import("directors");

    for parent in service
        .primary_parents
        .iter()
        .chain(&service.secondary_parents)
    {
        artifact.add_backend(backend_for(parent));
    }
    let origin = service.origin_endpoint();
    artifact.add_backend(backend_for(&origin));

    let kind = DirectorKind::from_policy(service.retry_policy);

    // Top-level fallback chain: primary, secondary, then the origin.
    let mut chain = Vec::new();
    if !service.primary_parents.is_empty() {
        let name = format!("{}_primary", service.name);
        emit_director(artifact, &name, kind, &service.primary_parents);
        chain.push(format!("{}.backend()", name));
    }
    if !service.secondary_parents.is_empty() {
        let name = format!("{}_secondary", service.name);
        emit_director(artifact, &name, kind, &service.secondary_parents);
        chain.push(format!("{}.backend()", name));
    }
    chain.push(origin.backend_key());

    artifact.append_hook(
        INIT_HOOK,
        format!("new {} = directors.fallback();", service.name),
    );
    for member in chain {
        artifact.append_hook(
            INIT_HOOK,
            format!("{}.add_backend({});", service.name, member),
        );
    }
}

fn emit_director(
    artifact: &mut Artifact,
    name: &str,
    kind: DirectorKind,
    parents: &[ParentEndpoint],
) {
    artifact.append_hook(
        INIT_HOOK,
        format!("new {} = directors.{};", name, kind.constructor()),
    );
    for parent in parents {
        artifact.append_hook(
            INIT_HOOK,
            format!("{}.add_backend({});", name, parent.backend_key()),
        );
    }
    // A shard director serves from its hash ring, which has to be rebuilt
    // after the backends are attached.
    if kind == DirectorKind::Shard {
        artifact.append_hook(INIT_HOOK, format!("{}.reconfigure();", name));
    }
}

fn backend_for(parent: &ParentEndpoint) -> Backend {
    Backend {
        name: parent.backend_key(),
        host: parent.fqdn.clone(),
        port: parent.port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(fqdn: &str, port: u16) -> ParentEndpoint {
        ParentEndpoint {
            fqdn: fqdn.to_string(),
            port,
        }
    }

    fn make_service(name: &str, policy: RetryPolicy) -> RoutedService {
        RoutedService {
            name: name.to_string(),
            dest_domain: "origin.example.com".to_string(),
            port: 80,
            primary_parents: vec![
                parent("mid-den-01.example.net", 8080),
                parent("mid-den-02.example.net", 8080),
            ],
            secondary_parents: vec![parent("mid-pdx-01.example.net", 8080)],
            retry_policy: policy,
            request_hosts: vec![],
            never_cache: false,
        }
    }

    #[test]
    fn test_kind_from_policy() {
        assert_eq!(
            DirectorKind::from_policy(RetryPolicy::RoundRobinIp),
            DirectorKind::RoundRobin
        );
        assert_eq!(
            DirectorKind::from_policy(RetryPolicy::RoundRobinStrict),
            DirectorKind::RoundRobin
        );
        assert_eq!(
            DirectorKind::from_policy(RetryPolicy::First),
            DirectorKind::Fallback { sticky: false }
        );
        assert_eq!(
            DirectorKind::from_policy(RetryPolicy::Latched),
            DirectorKind::Fallback { sticky: true }
        );
        assert_eq!(
            DirectorKind::from_policy(RetryPolicy::ConsistentHash),
            DirectorKind::Shard
        );
    }

    #[test]
    fn test_fallback_chain_order() {
        let mut artifact = Artifact::new("4.1");
        let warnings = build_topology(&mut artifact, &[make_service("ds1", RetryPolicy::First)]);

        assert!(warnings.is_empty());
        let lines = artifact.hook_lines(INIT_HOOK).unwrap();
        assert_eq!(
            lines,
            [
                "new ds1_primary = directors.fallback();",
                "ds1_primary.add_backend(mid-den-01_example_net_8080);",
                "ds1_primary.add_backend(mid-den-02_example_net_8080);",
                "new ds1_secondary = directors.fallback();",
                "ds1_secondary.add_backend(mid-pdx-01_example_net_8080);",
                "new ds1 = directors.fallback();",
                "ds1.add_backend(ds1_primary.backend());",
                "ds1.add_backend(ds1_secondary.backend());",
                "ds1.add_backend(origin_example_com_80);",
            ]
        );
    }

    #[test]
    fn test_latched_sets_sticky_on_sub_directors_only() {
        let mut artifact = Artifact::new("4.1");
        build_topology(&mut artifact, &[make_service("ds1", RetryPolicy::Latched)]);

        let lines = artifact.hook_lines(INIT_HOOK).unwrap();
        assert_eq!(lines[0], "new ds1_primary = directors.fallback(sticky = true);");
        assert!(lines.contains(&"new ds1 = directors.fallback();".to_string()));
    }

    #[test]
    fn test_shard_director_reconfigures() {
        let mut artifact = Artifact::new("4.1");
        build_topology(
            &mut artifact,
            &[make_service("ds1", RetryPolicy::ConsistentHash)],
        );

        let lines = artifact.hook_lines(INIT_HOOK).unwrap();
        assert_eq!(lines[0], "new ds1_primary = directors.shard();");
        assert_eq!(lines[3], "ds1_primary.reconfigure();");
    }

    #[test]
    fn test_zero_parent_service_points_at_origin() {
        let service = RoutedService {
            primary_parents: vec![],
            secondary_parents: vec![],
            ..make_service("ds1", RetryPolicy::ConsistentHash)
        };
        let mut artifact = Artifact::new("4.1");
        build_topology(&mut artifact, &[service]);

        assert_eq!(artifact.backends().len(), 1);
        assert_eq!(artifact.backends()[0].name, "origin_example_com_80");
        assert_eq!(
            artifact.hook_lines(INIT_HOOK).unwrap(),
            [
                "new ds1 = directors.fallback();",
                "ds1.add_backend(origin_example_com_80);",
            ]
        );
    }

    #[test]
    fn test_backend_dedup_across_services() {
        let mut artifact = Artifact::new("4.1");
        let first = make_service("ds1", RetryPolicy::First);
        let second = make_service("ds2", RetryPolicy::First);
        build_topology(&mut artifact, &[first, second]);

        // Both services share every parent and the origin: four distinct keys.
        assert_eq!(artifact.backends().len(), 4);
    }

    #[test]
    fn test_backend_dedup_duplicate_parent_entry() {
        let mut service = make_service("ds1", RetryPolicy::First);
        service.primary_parents.push(parent("mid-den-01.example.net", 8080));
        let mut artifact = Artifact::new("4.1");
        build_topology(&mut artifact, &[service]);

        let names: Vec<_> = artifact.backends().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "mid-den-01_example_net_8080",
                "mid-den-02_example_net_8080",
                "mid-pdx-01_example_net_8080",
                "origin_example_com_80",
            ]
        );
    }

    #[test]
    fn test_origin_matching_parent_registers_once() {
        let mut service = make_service("ds1", RetryPolicy::First);
        service.primary_parents = vec![parent("origin.example.com", 80)];
        service.secondary_parents = vec![];
        let mut artifact = Artifact::new("4.1");
        build_topology(&mut artifact, &[service]);

        assert_eq!(artifact.backends().len(), 1);
    }

    #[test]
    fn test_missing_dest_domain_warns_and_skips() {
        let mut service = make_service("ds1", RetryPolicy::First);
        service.dest_domain = String::new();
        let mut artifact = Artifact::new("4.1");
        let warnings = build_topology(&mut artifact, &[service]);

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ds1"));
        assert!(artifact.backends().is_empty());
        assert!(artifact.hook_lines(INIT_HOOK).is_none());
    }

    #[test]
    fn test_directors_import_registered() {
        let mut artifact = Artifact::new("4.1");
        build_topology(&mut artifact, &[make_service("ds1", RetryPolicy::First)]);
        assert_eq!(artifact.imports(), ["directors"]);

        let mut empty = Artifact::new("4.1");
        build_topology(&mut empty, &[]);
        assert!(empty.imports().is_empty());
    }
}
