use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flowengine::logging::LoggingConfig;
use flowengine::{
    load_flow_from_file, EngineConfig, ExecutionArchive, FlowExecutor, LocalObjectStorage,
    RunnerRegistry, RunnerServices, TriggerData,
};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "flowengine", version, about = "Flow execution engine CLI", author)]
struct Cli {
    /// Engine configuration file (JSON); `FLOWENGINE_*` variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Checks a flow file the way publishing does.
    Validate { flow: PathBuf },
    /// Runs a flow file once and prints the result.
    Run {
        flow: PathBuf,
        /// Trigger payload as JSON.
        #[arg(long, default_value = "{}")]
        input: String,
        #[arg(long)]
        org: Option<String>,
        /// Where traces are archived.
        #[arg(long, default_value = "flow-archive")]
        archive_dir: PathBuf,
    },
    /// Lists registered node runners.
    Runners,
    /// Prints an archived run trace.
    Trace {
        execution_id: String,
        #[arg(long, default_value = "flow-archive")]
        archive_dir: PathBuf,
        #[arg(long, default_value = "")]
        org: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    LoggingConfig::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    }
    .apply_env()?;
    let registry = RunnerRegistry::with_builtins(RunnerServices::default());

    match cli.command {
        Command::Validate { flow } => handle_validate(flow, &registry)?,
        Command::Run {
            flow,
            input,
            org,
            archive_dir,
        } => handle_run(flow, input, org, archive_dir, registry, config).await?,
        Command::Runners => handle_runners(&registry),
        Command::Trace {
            execution_id,
            archive_dir,
            org,
        } => handle_trace(execution_id, archive_dir, org, config).await?,
    }
    Ok(())
}

fn handle_validate(path: PathBuf, registry: &RunnerRegistry) -> anyhow::Result<()> {
    let flow = load_flow_from_file(&path)?;
    flowengine::validate_flow(&flow, registry)?;
    println!("Flow `{}` v{} is valid ({} nodes)", flow.code, flow.version, flow.nodes().len());
    Ok(())
}

async fn handle_run(
    path: PathBuf,
    input: String,
    org: Option<String>,
    archive_dir: PathBuf,
    registry: RunnerRegistry,
    config: EngineConfig,
) -> anyhow::Result<()> {
    let flow = load_flow_from_file(&path)?;
    flowengine::validate_flow(&flow, &registry)?;
    let payload: Value = serde_json::from_str(&input)?;
    let mut trigger = TriggerData::manual(payload);
    trigger.organization_code = org;

    let archive_config = flowengine::ArchiveConfig {
        inline_limit_bytes: 0,
        ..config.archive.clone()
    };
    let archive = ExecutionArchive::new(Arc::new(LocalObjectStorage::new(archive_dir)), archive_config);
    let executor = FlowExecutor::new(registry, config).with_archive(Arc::new(archive));

    let execution = executor.run(flow, trigger).await?;
    let summary = json!({
        "execution_id": execution.execution_id,
        "status": execution.status,
        "end_node_id": execution.end_node_id,
        "output": execution.output,
        "error": execution.error.as_ref().map(ToString::to_string),
        "archive": execution.archive.as_ref().map(|record| record.reference()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn handle_runners(registry: &RunnerRegistry) {
    println!("{:<16} {:<8} {}", "Type", "Version", "Description");
    for manifest in registry.manifests() {
        println!(
            "{:<16} {:<8} {}",
            manifest.node_type,
            manifest.version,
            manifest.description.as_deref().unwrap_or("")
        );
    }
}

async fn handle_trace(
    execution_id: String,
    archive_dir: PathBuf,
    org: String,
    config: EngineConfig,
) -> anyhow::Result<()> {
    let archive = ExecutionArchive::new(Arc::new(LocalObjectStorage::new(archive_dir)), config.archive);
    let trace = archive.get(&org, &execution_id).await?;
    println!("{}", serde_json::to_string_pretty(&trace)?);
    Ok(())
}
