//! vclc: A deterministic VCL configuration compiler for CDN cache nodes
//!
//! Loads a topology snapshot (node identity, routed services, access
//! lists, custom rules) and compiles the control script the node deploys.
//! The artifact goes to stdout or a file; diagnostics go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use topology::{NodeRole, Snapshot};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vcl::CompileOpts;

#[derive(Parser)]
#[command(name = "vclc")]
#[command(author, version, about = "A deterministic VCL configuration compiler for CDN cache nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a snapshot into a control script
    Compile {
        /// Topology snapshot path
        snapshot: PathBuf,

        /// Output path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Header comment for the artifact; pass an empty string to omit
        #[arg(long)]
        comment: Option<String>,
    },
    /// Validate a snapshot and print a summary
    Validate {
        /// Topology snapshot path
        snapshot: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the artifact, so all logging goes to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Compile {
            snapshot,
            output,
            comment,
        } => compile_snapshot(snapshot, output, comment),
        Commands::Validate { snapshot, json } => validate_snapshot(snapshot, json),
    }
}

fn compile_snapshot(
    snapshot_path: PathBuf,
    output: Option<PathBuf>,
    comment: Option<String>,
) -> Result<()> {
    let snapshot = Snapshot::load(&snapshot_path)
        .with_context(|| format!("Failed to load snapshot from {:?}", snapshot_path))?;

    info!(
        node = %snapshot.node.name,
        services = snapshot.services.len(),
        "Snapshot loaded"
    );

    let hdr_comment = comment.unwrap_or_else(|| {
        format!("DO NOT EDIT - generated for {} by vclc", snapshot.node.name)
    });
    let opts = CompileOpts { hdr_comment };
    let compilation = vcl::compile(&snapshot, &opts)
        .with_context(|| format!("Failed to compile snapshot for '{}'", snapshot.node.name))?;

    info!(
        bytes = compilation.text.len(),
        warnings = compilation.warnings.len(),
        "Artifact compiled"
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &compilation.text)
                .with_context(|| format!("Failed to write artifact to {:?}", path))?;
            info!(path = ?path, "Artifact written");
        }
        None => print!("{}", compilation.text),
    }

    Ok(())
}

fn validate_snapshot(snapshot_path: PathBuf, json: bool) -> Result<()> {
    let snapshot = Snapshot::load(&snapshot_path)
        .with_context(|| format!("Failed to load snapshot from {:?}", snapshot_path))?;

    let role = match snapshot.node.role {
        NodeRole::Edge => "edge",
        NodeRole::Mid => "mid",
    };

    if json {
        let summary = serde_json::json!({
            "node": snapshot.node.name,
            "role": role,
            "cache_group": snapshot.node.cache_group,
            "services": snapshot.services.len(),
            "purge_allow": snapshot.access.purge_allow.len(),
            "children": snapshot.access.children.len(),
            "snippets": snapshot.snippets.len(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Snapshot is valid!");
    println!("  Node: {} ({})", snapshot.node.name, role);
    println!("  Services: {}", snapshot.services.len());

    for service in &snapshot.services {
        println!(
            "  - {}: {} parents, {} request hosts -> {}",
            service.name,
            service.primary_parents.len() + service.secondary_parents.len(),
            service.request_hosts.len(),
            service.dest_domain
        );
    }

    if !snapshot.access.children.is_empty() {
        println!("  Child addresses: {}", snapshot.access.children.len());
    }
    if !snapshot.snippets.is_empty() {
        println!("  Custom snippets: {}", snapshot.snippets.len());
    }

    Ok(())
}
