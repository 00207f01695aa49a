//! vclc-vcl: Proxy control-script compilation for vclc
//!
//! This crate turns one topology snapshot into a deterministic VCL
//! artifact: it coalesces child addresses into access-control lists,
//! builds the deduplicated backend/director topology per service, compiles
//! host routing and cache overrides, splices operator-authored rules, and
//! serializes everything in the order the proxy parser requires.

pub mod acl;
pub mod cacheability;
pub mod compiler;
pub mod directors;
pub mod error;
pub mod net;
pub mod routing;
pub mod script;
pub mod snippets;

pub use acl::{compile_edge_acl, compile_mid_acl, ALLOW_ALL_ACL, ALLOW_CHILDREN_ACL};
pub use cacheability::compile_uncacheable;
pub use compiler::{compile, Compilation, CompileOpts};
pub use directors::{build_topology, DirectorKind};
pub use error::*;
pub use net::{coalesce, AddrBlock};
pub use routing::compile_routing;
pub use script::{Acl, Artifact, Backend, FETCH_HOOK, INIT_HOOK, RECV_HOOK, RESPONSE_HOOK};
pub use snippets::inject_snippets;
