//! In-memory artifact and final script serialization
//!
//! The [`Artifact`] is the builder value every compiler phase appends into:
//! imports, named backends, named ACLs, and hook subroutine bodies. It is
//! created empty at the start of a compilation, populated in phase order,
//! and serialized exactly once. Serialization enforces the layout the proxy
//! parser requires: version header, imports, backends (with an explicit
//! placeholder when there are none), ACLs, then hooks with the
//! initialization hook ahead of all others so every director referenced by
//! a routing rule already exists when the rule runs.

use tracing::debug;

use crate::net::AddrBlock;

/// Initialization hook, always serialized before the other hooks
pub const INIT_HOOK: &str = "vcl_init";
/// Request-receive hook
pub const RECV_HOOK: &str = "vcl_recv";
/// Backend-fetch hook, where the outbound request is shaped
pub const FETCH_HOOK: &str = "vcl_backend_fetch";
/// Backend-response hook, where cacheability is decided
pub const RESPONSE_HOOK: &str = "vcl_backend_response";

/// A single upstream backend definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Identifier in the artifact, unique per compilation
    pub name: String,
    /// Host the proxy connects to
    pub host: String,
    /// Port, 0 meaning the proxy default
    pub port: u16,
}

/// A named ACL with entries in insertion order
#[derive(Debug, Clone)]
pub struct Acl {
    pub name: String,
    pub entries: Vec<AddrBlock>,
}

#[derive(Debug, Clone)]
struct Hook {
    name: String,
    lines: Vec<String>,
}

/// The in-memory artifact populated by each compiler phase
#[derive(Debug, Clone)]
pub struct Artifact {
    version: String,
    comment: String,
    imports: Vec<String>,
    backends: Vec<Backend>,
    acls: Vec<Acl>,
    hooks: Vec<Hook>,
}

impl Artifact {
    /// Create an empty artifact for one compilation run
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            comment: String::new(),
            imports: Vec::new(),
            backends: Vec::new(),
            acls: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Set the header comment emitted above the version line
    pub fn set_comment(&mut self, comment: &str) {
        self.comment = comment.to_string();
    }

    /// Register an import; duplicates are ignored
    pub fn add_import(&mut self, name: &str) {
        if !self.imports.iter().any(|i| i == name) {
            self.imports.push(name.to_string());
        }
    }

    /// Register a backend; the first writer wins and a duplicate insert is
    /// a no-op, reported by the return value
    pub fn add_backend(&mut self, backend: Backend) -> bool {
        if self.backends.iter().any(|b| b.name == backend.name) {
            debug!(backend = %backend.name, "duplicate backend insert ignored");
            return false;
        }
        self.backends.push(backend);
        true
    }

    /// Append an entry to a named ACL, creating the ACL on first use
    pub fn add_acl_entry(&mut self, acl: &str, entry: AddrBlock) {
        match self.acls.iter_mut().find(|a| a.name == acl) {
            Some(existing) => existing.entries.push(entry),
            None => self.acls.push(Acl {
                name: acl.to_string(),
                entries: vec![entry],
            }),
        }
    }

    /// Append one rule line to a hook, creating the hook on first use
    pub fn append_hook(&mut self, hook: &str, line: impl Into<String>) {
        let line = line.into();
        match self.hooks.iter_mut().find(|h| h.name == hook) {
            Some(existing) => existing.lines.push(line),
            None => self.hooks.push(Hook {
                name: hook.to_string(),
                lines: vec![line],
            }),
        }
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn acls(&self) -> &[Acl] {
        &self.acls
    }

    /// Rule lines of a hook, if the hook has been written to
    pub fn hook_lines(&self, hook: &str) -> Option<&[String]> {
        self.hooks
            .iter()
            .find(|h| h.name == hook)
            .map(|h| h.lines.as_slice())
    }

    /// Render the final script text, consuming the artifact
    pub fn serialize(self) -> String {
        let mut blocks = Vec::new();

        if !self.comment.is_empty() {
            blocks.push(format!("# {}", self.comment));
        }
        blocks.push(format!("vcl {};", self.version));

        if !self.imports.is_empty() {
            let imports: Vec<String> = self
                .imports
                .iter()
                .map(|name| format!("import {};", name))
                .collect();
            blocks.push(imports.join("\n"));
        }

        // The proxy parser rejects a script with zero backend definitions.
        if self.backends.is_empty() {
            blocks.push("backend default none;".to_string());
        } else {
            for backend in &self.backends {
                blocks.push(render_backend(backend));
            }
        }

        for acl in &self.acls {
            blocks.push(render_acl(acl));
        }

        for hook in self.ordered_hooks() {
            blocks.push(render_hook(hook));
        }

        let mut text = blocks.join("\n\n");
        text.push('\n');
        text
    }

    /// Hooks in emission order: init first, then the request lifecycle,
    /// then anything else in first-use order
    fn ordered_hooks(&self) -> Vec<&Hook> {
        const LIFECYCLE: [&str; 3] = [RECV_HOOK, FETCH_HOOK, RESPONSE_HOOK];

        let mut ordered = Vec::with_capacity(self.hooks.len());
        if let Some(init) = self.hooks.iter().find(|h| h.name == INIT_HOOK) {
            ordered.push(init);
        }
        for name in LIFECYCLE {
            if let Some(hook) = self.hooks.iter().find(|h| h.name == name) {
                ordered.push(hook);
            }
        }
        for hook in &self.hooks {
            if hook.name != INIT_HOOK && !LIFECYCLE.contains(&hook.name.as_str()) {
                ordered.push(hook);
            }
        }
        ordered
    }
}

fn render_backend(backend: &Backend) -> String {
    let mut lines = vec![format!("backend {} {{", backend.name)];
    lines.push(format!("    .host = \"{}\";", backend.host));
    if backend.port > 0 {
        lines.push(format!("    .port = \"{}\";", backend.port));
    }
    lines.push("}".to_string());
    lines.join("\n")
}

fn render_acl(acl: &Acl) -> String {
    let mut lines = vec![format!("acl {} {{", acl.name)];
    for entry in &acl.entries {
        if entry.is_host() {
            lines.push(format!("    \"{}\";", entry.network()));
        } else {
            lines.push(format!("    \"{}\"/{};", entry.network(), entry.prefix_len()));
        }
    }
    lines.push("}".to_string());
    lines.join("\n")
}

fn render_hook(hook: &Hook) -> String {
    let mut lines = vec![format!("sub {} {{", hook.name)];
    for line in &hook.lines {
        lines.push(format!("    {}", line));
    }
    lines.push("}".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(s: &str) -> AddrBlock {
        AddrBlock::parse(s).unwrap()
    }

    #[test]
    fn test_empty_artifact_has_placeholder_backend() {
        let text = Artifact::new("4.1").serialize();
        assert_eq!(text, "vcl 4.1;\n\nbackend default none;\n");
    }

    #[test]
    fn test_comment_precedes_version() {
        let mut artifact = Artifact::new("4.1");
        artifact.set_comment("generated for edge-den-01");
        let text = artifact.serialize();
        assert!(text.starts_with("# generated for edge-den-01\n\nvcl 4.1;\n"));
    }

    #[test]
    fn test_backend_render() {
        let mut artifact = Artifact::new("4.1");
        artifact.add_backend(Backend {
            name: "origin_example_com_80".to_string(),
            host: "origin.example.com".to_string(),
            port: 80,
        });
        let text = artifact.serialize();

        assert!(text.contains(
            "backend origin_example_com_80 {\n    .host = \"origin.example.com\";\n    .port = \"80\";\n}"
        ));
        assert!(!text.contains("backend default none;"));
    }

    #[test]
    fn test_backend_render_default_port() {
        let mut artifact = Artifact::new("4.1");
        artifact.add_backend(Backend {
            name: "origin_example_com".to_string(),
            host: "origin.example.com".to_string(),
            port: 0,
        });
        let text = artifact.serialize();

        assert!(text.contains("backend origin_example_com {\n    .host = \"origin.example.com\";\n}"));
        assert!(!text.contains(".port"));
    }

    #[test]
    fn test_backend_duplicate_insert_is_noop() {
        let mut artifact = Artifact::new("4.1");
        let backend = Backend {
            name: "origin_example_com_80".to_string(),
            host: "origin.example.com".to_string(),
            port: 80,
        };
        assert!(artifact.add_backend(backend.clone()));
        assert!(!artifact.add_backend(backend));
        assert_eq!(artifact.backends().len(), 1);
    }

    #[test]
    fn test_import_dedup() {
        let mut artifact = Artifact::new("4.1");
        artifact.add_import("directors");
        artifact.add_import("std");
        artifact.add_import("directors");
        assert_eq!(artifact.imports(), ["directors", "std"]);
    }

    #[test]
    fn test_acl_render_entry_order() {
        let mut artifact = Artifact::new("4.1");
        artifact.add_acl_entry("allow_all", block("127.0.0.1"));
        artifact.add_acl_entry("allow_all", block("::1"));
        artifact.add_acl_entry("allow_all", block("10.0.0.0/8"));
        let text = artifact.serialize();

        assert!(text.contains(
            "acl allow_all {\n    \"127.0.0.1\";\n    \"::1\";\n    \"10.0.0.0\"/8;\n}"
        ));
    }

    #[test]
    fn test_init_hook_serialized_first() {
        let mut artifact = Artifact::new("4.1");
        artifact.append_hook(RECV_HOOK, "return (pass);");
        artifact.append_hook("vcl_deliver", "unset resp.http.via;");
        artifact.append_hook(INIT_HOOK, "new ds1 = directors.fallback();");
        let text = artifact.serialize();

        let init_at = text.find("sub vcl_init").unwrap();
        let recv_at = text.find("sub vcl_recv").unwrap();
        let deliver_at = text.find("sub vcl_deliver").unwrap();
        assert!(init_at < recv_at);
        assert!(init_at < deliver_at);
    }

    #[test]
    fn test_lifecycle_hooks_in_canonical_order() {
        let mut artifact = Artifact::new("4.1");
        artifact.append_hook(RESPONSE_HOOK, "set beresp.uncacheable = true;");
        artifact.append_hook(FETCH_HOOK, "set bereq.http.host = \"o.example.com\";");
        artifact.append_hook(RECV_HOOK, "return (pass);");
        let text = artifact.serialize();

        let recv_at = text.find("sub vcl_recv").unwrap();
        let fetch_at = text.find("sub vcl_backend_fetch").unwrap();
        let response_at = text.find("sub vcl_backend_response").unwrap();
        assert!(recv_at < fetch_at);
        assert!(fetch_at < response_at);
    }

    #[test]
    fn test_hook_lines_appended_in_order() {
        let mut artifact = Artifact::new("4.1");
        artifact.append_hook(RECV_HOOK, "first");
        artifact.append_hook(RECV_HOOK, "second");
        assert_eq!(
            artifact.hook_lines(RECV_HOOK).unwrap(),
            ["first", "second"]
        );
        assert!(artifact.hook_lines(FETCH_HOOK).is_none());
    }

    #[test]
    fn test_full_layout() {
        let mut artifact = Artifact::new("4.1");
        artifact.add_import("directors");
        artifact.add_backend(Backend {
            name: "origin_example_com_80".to_string(),
            host: "origin.example.com".to_string(),
            port: 80,
        });
        artifact.add_acl_entry("allow_all", block("127.0.0.1"));
        artifact.append_hook(INIT_HOOK, "new ds1 = directors.fallback();");
        artifact.append_hook(INIT_HOOK, "ds1.add_backend(origin_example_com_80);");
        artifact.append_hook(RECV_HOOK, "set req.backend_hint = ds1.backend();");

        let expected = "\
vcl 4.1;

import directors;

backend origin_example_com_80 {
    .host = \"origin.example.com\";
    .port = \"80\";
}

acl allow_all {
    \"127.0.0.1\";
}

sub vcl_init {
    new ds1 = directors.fallback();
    ds1.add_backend(origin_example_com_80);
}

sub vcl_recv {
    set req.backend_hint = ds1.backend();
}
";
        assert_eq!(artifact.serialize(), expected);
    }
}
