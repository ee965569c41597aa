//! Stagehand CLI - packages a module set layer by layer.

use anyhow::Result;
use clap::{Parser, Subcommand};
use stagehand_core::{ModuleManifest, RunEventKind};
use stagehand_execution::{
    modules_for_environment, EngineConfig, EventLog, ExecutionEngine, Plan, Reporters, TracingReporter,
};
use stagehand_storage::{load_answers, load_manifest, FsObjectStore, MemoryObjectStore, ObjectStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Dependency-layered module packaging", long_about = None)]
struct Cli {
    /// Module manifest
    #[arg(long, global = true, default_value = "modules.json")]
    modules: PathBuf,

    /// Directory backing the object store
    #[arg(long, global = true, default_value = ".stagehand/store")]
    store_root: PathBuf,

    /// Key prefix of the tags parameters file
    #[arg(long, global = true, default_value = "cloudformation")]
    tags_prefix: String,

    /// Lay out every module of the manifest, not only the expanded set
    #[arg(long, global = true)]
    include_optional: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package the selected modules
    Package {
        /// Answers file
        answers: PathBuf,
    },
    /// Show the layers a package run would execute
    Plan {
        /// Answers file
        answers: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = EngineConfig {
        tags_prefix: cli.tags_prefix,
        include_optional: cli.include_optional,
    };
    let manifest = load_manifest(&cli.modules).await?;

    match cli.command {
        Commands::Package { answers } => {
            let answers = Arc::new(load_answers(&answers).await?);
            let fs_store = FsObjectStore::new(&cli.store_root).await?;
            info!("Object store at {}", fs_store.root().display());
            let store: Arc<dyn ObjectStore> = Arc::new(fs_store);
            let modules = modules_for_environment(&manifest, &answers.environment, Arc::clone(&store));
            info!("{} modules in environment '{}'", modules.len(), answers.environment);

            let log = EventLog::new();
            let reporters = Reporters::new()
                .with(Arc::new(TracingReporter))
                .with(Arc::new(log.clone()));
            let engine = ExecutionEngine::new()
                .with_config(config)
                .with_reporter(Arc::new(reporters));
            info!("Tags file prefix: {}", engine.config().tags_prefix);

            let outcome = engine.package(&modules, answers, store).await;
            print_tasks(&log);
            let report = outcome?;

            println!(
                "Run {} started {}",
                report.run_id,
                report.run_id.created_at().format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Packaging complete! ({:.2}s)", report.elapsed.as_secs_f64());
        }
        Commands::Plan { answers } => {
            let plan = plan_run(&manifest, &answers, config).await?;
            print_plan(&plan);
        }
    }

    Ok(())
}

/// Lay out a run without executing it. Never touches the store root.
async fn plan_run(manifest: &ModuleManifest, answers: &Path, config: EngineConfig) -> Result<Plan> {
    let answers = load_answers(answers).await?;
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
    let modules = modules_for_environment(manifest, &answers.environment, store);
    Ok(ExecutionEngine::new().with_config(config).plan(&modules, &answers)?)
}

fn print_tasks(log: &EventLog) {
    for kind in log.kinds() {
        match kind {
            RunEventKind::TaskCompleted { layer, module, elapsed_ms } => {
                println!("  [ok]   layer {layer} {module} ({elapsed_ms}ms)")
            }
            RunEventKind::ModuleEmpty { layer, module } => println!("  [--]   layer {layer} {module} (nothing to upload)"),
            RunEventKind::TaskFailed { layer, module, error } => println!("  [fail] layer {layer} {module}: {error}"),
            RunEventKind::PreStepFailed { title, error } => println!("  [fail] {title}: {error}"),
            _ => {}
        }
    }
}

fn print_plan(plan: &Plan) {
    println!("Plan ({} modules, {} layers)", plan.graph.len(), plan.layers.len());
    for (index, layer) in plan.layers.iter().enumerate() {
        println!("  Layer {index}");
        for name in layer {
            let mark = if plan.policy.includes(name) { "*" } else { " " };
            let after = plan
                .graph
                .dependencies_of(name)
                .filter(|deps| !deps.is_empty())
                .map(|deps| format!(" (after {})", deps.iter().cloned().collect::<Vec<_>>().join(", ")))
                .unwrap_or_default();
            println!("    [{mark}] {name}{after}");
        }
    }
}
