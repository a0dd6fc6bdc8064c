//! Node Agent CLI
//!
//! The `nodeagent` command drives the reconcile core from a fleet manifest.
//!
//! ## Commands
//!
//! - `resolve`: Print the effective configuration of each instance
//! - `plan`: Print the desired objects of one instance without submitting them
//! - `reconcile`: Run passes against an in-memory control plane until quiet
//! - `factories`: List the factory sequence and the kinds it owns

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use nodeagent_core::fakes::{MemoryReconciler, StaticReplicaCount};
use nodeagent_core::{
    config_render, resolve, CombinedResult, FactoryContext, FactoryOutput, FactorySequence,
    FleetLoggingContext, FleetReconciler, InstanceNames, InstanceStatus, NamedAgentSpec,
    VariantKind,
};

#[derive(Parser)]
#[command(name = "nodeagent")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-node logging agent resolver and reconciler", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Fleet manifest (JSON) with `fleet` and `agents`
    #[arg(short, long, global = true, env = "NODEAGENT_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Aggregator replica count used when rendering forwarder configs
    #[arg(long, global = true, default_value = "1")]
    aggregator_replicas: i32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration of each instance
    Resolve {
        /// Only this instance (default: all)
        instance: Option<String>,
    },

    /// Print the desired objects of one instance in sequence order
    Plan {
        /// Instance name
        instance: String,
    },

    /// Reconcile the fleet against an in-memory control plane
    Reconcile {
        /// Stop after this many passes even if changes remain
        #[arg(long, default_value = "20")]
        max_passes: usize,
    },

    /// List the factory sequence and the kinds it owns
    Factories,
}

/// On-disk fleet description.
#[derive(Debug, Deserialize)]
struct FleetManifest {
    fleet: FleetLoggingContext,
    #[serde(default)]
    agents: NamedAgentSpec,
}

#[derive(Serialize)]
struct PassSummary<'a> {
    pass: usize,
    pass_id: &'a str,
    instances: &'a BTreeMap<String, InstanceStatus>,
    failures: BTreeMap<&'a str, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    nodeagent_core::telemetry::init_tracing(cli.json, level);

    if let Commands::Factories = cli.command {
        return cmd_factories();
    }

    let path = cli
        .manifest
        .context("No fleet manifest given (use --manifest or NODEAGENT_MANIFEST)")?;
    let manifest = load_manifest(&path)?;

    match cli.command {
        Commands::Resolve { instance } => cmd_resolve(&manifest, instance.as_deref()),
        Commands::Plan { instance } => cmd_plan(&manifest, &instance, cli.aggregator_replicas),
        Commands::Reconcile { max_passes } => {
            cmd_reconcile(manifest, cli.aggregator_replicas, max_passes).await
        }
        Commands::Factories => cmd_factories(),
    }
}

fn load_manifest(path: &Path) -> Result<FleetManifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fleet manifest: {:?}", path))?;
    let manifest: FleetManifest = serde_json::from_str(&raw)
        .with_context(|| format!("Fleet manifest is not valid: {:?}", path))?;
    info!(
        fleet = %manifest.fleet.name,
        agents = manifest.agents.len(),
        "loaded fleet manifest"
    );
    Ok(manifest)
}

fn resolve_all(manifest: &FleetManifest, only: Option<&str>) -> Result<BTreeMap<String, Value>> {
    if let Some(name) = only {
        if !manifest.agents.contains_key(name) {
            anyhow::bail!("Instance not found in manifest: {}", name);
        }
    }

    let mut resolved = BTreeMap::new();
    for (name, raw) in &manifest.agents {
        if only.is_some_and(|o| o != name) {
            continue;
        }
        let entry = match resolve(raw, &manifest.fleet) {
            Ok(effective) => serde_json::to_value(&effective)?,
            Err(e) => json!({ "error": e.to_string() }),
        };
        resolved.insert(name.clone(), entry);
    }
    Ok(resolved)
}

/// Print the effective configuration of each instance
fn cmd_resolve(manifest: &FleetManifest, instance: Option<&str>) -> Result<()> {
    let resolved = resolve_all(manifest, instance)?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

fn plan_instance(manifest: &FleetManifest, instance: &str, replicas: i32) -> Result<Vec<Value>> {
    let raw = manifest
        .agents
        .get(instance)
        .with_context(|| format!("Instance not found in manifest: {}", instance))?;
    let effective = resolve(raw, &manifest.fleet)
        .with_context(|| format!("Failed to resolve instance {}", instance))?;

    let replicas = match effective.kind() {
        VariantKind::Fluentbit => replicas,
        VariantKind::SyslogNg => 1,
    };
    let names = InstanceNames::new(&manifest.fleet, instance);
    let config = config_render::render(&effective, &names, &manifest.fleet, replicas);
    let ctx = FactoryContext::new(&manifest.fleet, instance, &effective, &config);

    let planned = FactorySequence::builtin()
        .plan(&ctx)
        .with_context(|| format!("Failed to plan instance {}", instance))?;
    Ok(planned
        .into_iter()
        .map(|(factory, output)| match output {
            FactoryOutput::Desired(descriptor) => json!({
                "factory": factory,
                "kind": descriptor.kind,
                "state": descriptor.state,
                "object": descriptor.object,
            }),
            FactoryOutput::NotApplicable => json!({
                "factory": factory,
                "state": "not_applicable",
            }),
        })
        .collect())
}

/// Print the desired objects of one instance in sequence order
fn cmd_plan(manifest: &FleetManifest, instance: &str, replicas: i32) -> Result<()> {
    let planned = plan_instance(manifest, instance, replicas)?;
    println!("{}", serde_json::to_string_pretty(&planned)?);
    Ok(())
}

fn summarize(pass: usize, result: &CombinedResult) -> PassSummary<'_> {
    PassSummary {
        pass,
        pass_id: &result.pass_id,
        instances: &result.instances,
        failures: result
            .failures
            .iter()
            .map(|f| (f.instance.as_str(), f.error.to_string()))
            .collect(),
    }
}

/// Run passes until no instance requeues or the limit is hit. Failed
/// instances do not stop the loop; their siblings keep converging.
async fn reconcile_until_quiet(
    reconciler: &FleetReconciler,
    max_passes: usize,
) -> Result<(usize, CombinedResult)> {
    let mut pass = 0;
    loop {
        pass += 1;
        let result = reconciler.reconcile().await;
        println!("{}", serde_json::to_string(&summarize(pass, &result))?);
        if result.requeue.is_none() || pass >= max_passes {
            return Ok((pass, result));
        }
    }
}

/// Reconcile the fleet against an in-memory control plane
async fn cmd_reconcile(manifest: FleetManifest, replicas: i32, max_passes: usize) -> Result<()> {
    if max_passes == 0 {
        anyhow::bail!("--max-passes must be at least 1");
    }
    let store = Arc::new(MemoryReconciler::new());
    let reconciler = FleetReconciler::new(
        manifest.fleet,
        manifest.agents,
        store.clone(),
        Arc::new(StaticReplicaCount::new(Some(replicas))),
    );

    let (passes, last) = reconcile_until_quiet(&reconciler, max_passes).await?;
    if last.is_converged() {
        println!("Converged after {} pass(es); {} object(s)", passes, store.len());
    } else {
        println!(
            "Not converged after {} pass(es); {} object(s)",
            passes,
            store.len()
        );
    }
    for (kind, identity, _) in store.objects() {
        println!("  {} {}", kind, identity);
    }

    last.into_result()?;
    Ok(())
}

/// List the factory sequence and the kinds it owns
fn cmd_factories() -> Result<()> {
    let sequence = FactorySequence::builtin();
    println!("Factories (in order):");
    for (i, factory) in sequence.iter().enumerate() {
        println!("  {:>2}. {:<26} {}", i + 1, factory.name(), factory.kind());
    }
    let owned: Vec<String> = sequence.owned_kinds().iter().map(|k| k.to_string()).collect();
    println!("Owned kinds: {}", owned.join(", "));
    Ok(())
}
