use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::mpsc;

use crest::config::Config;
use crest::context::Fragment;
use crest::core::{organize_waves, ExecutionPlan};
use crest::orchestration::{CompositeResult, Coordinator, RunnerEvent};
use crest::worker::{GoalEchoWorker, StaticWorker, WorkerRegistry};
use crest::Result;

/// Crest - dependency-aware parallel executor for multi-agent plans
#[derive(Parser, Debug)]
#[command(name = "crest")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CREST_DEBUG=1   Enable debug logging (alternative to --debug)")]
struct Cli {
    /// Enable debug logging (writes to ~/.crest/crest.log)
    #[arg(short = 'd', long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Execute a plan file against its fixture workers
    Run {
        /// Path to the plan JSON file
        plan: PathBuf,

        /// Goal text seeded into the shared context
        #[arg(short, long, default_value = "run the plan")]
        goal: String,

        /// Print the composite result as JSON instead of a report
        #[arg(long)]
        headless: bool,

        /// Override the wave deadline in seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Show the computed waves for a plan without executing it
    Validate {
        /// Path to the plan JSON file
        plan: PathBuf,
    },
}

/// Plan file accepted by the demo binary: an execution plan plus static
/// fragments standing in for real workers. The `fixtures` section maps a
/// worker name to the fragment it should produce; it is a convenience of
/// this binary, not part of the library boundary.
#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(flatten)]
    plan: ExecutionPlan,
    #[serde(default)]
    fixtures: BTreeMap<String, Fragment>,
}

fn load_plan_file(path: &Path) -> Result<PlanFile> {
    let text = std::fs::read_to_string(path)?;
    let file: PlanFile = serde_json::from_str(&text)?;
    file.plan.validate()?;
    Ok(file)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    crest::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Run {
            plan,
            goal,
            headless,
            deadline_secs,
        } => run_plan(&plan, &goal, headless, deadline_secs).await,
        Command::Validate { plan } => validate_plan(&plan),
    }
}

async fn run_plan(
    path: &Path,
    goal: &str,
    headless: bool,
    deadline_secs: Option<u64>,
) -> Result<()> {
    let file = load_plan_file(path)?;

    let mut config = Config::load().unwrap_or_default().coordinator();
    if let Some(secs) = deadline_secs {
        config.wave_deadline = Duration::from_secs(secs);
    }
    let summary_key = config.summary_key.clone();

    let mut registry = WorkerRegistry::new();
    registry.register("echo", Arc::new(GoalEchoWorker::new("echo")));
    for (name, fragment) in &file.fixtures {
        registry.register(name.clone(), Arc::new(StaticWorker::new(fragment.clone())));
    }

    let (event_tx, mut event_rx) = mpsc::channel(100);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if headless {
                continue;
            }
            match event {
                RunnerEvent::TaskStarted { task_id, worker } => {
                    println!("  -> {} [{}] started", task_id, worker)
                }
                RunnerEvent::TaskCompleted { task_id } => {
                    println!("  ok {} completed", task_id)
                }
                RunnerEvent::TaskFailed { task_id, error } => {
                    println!("  !! {} failed: {}", task_id, error)
                }
                RunnerEvent::TaskTimedOut { task_id } => {
                    println!("  .. {} timed out", task_id)
                }
                RunnerEvent::WaveCompleted { wave, settled } => {
                    println!("wave {} finished ({} settled)", wave + 1, settled)
                }
            }
        }
    });

    let coordinator = Coordinator::new(Arc::new(registry), config, event_tx);
    let result = coordinator.run(file.plan, goal).await;
    drop(coordinator);
    let _ = printer.await;

    if headless {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(&result, &summary_key);
    }
    Ok(())
}

fn print_report(result: &CompositeResult, summary_key: &str) {
    println!();
    if !result.forced_tasks.is_empty() {
        let forced: Vec<&str> = result
            .forced_tasks
            .iter()
            .map(|id| id.as_str())
            .collect();
        println!(
            "warning: unresolved dependencies forced into a final wave: {}",
            forced.join(", ")
        );
    }

    println!("tasks:");
    for id in result.status_log.task_ids() {
        if let Some(state) = result.status_log.terminal_state(&id) {
            println!("  {:<12} {}", id.to_string(), state);
        }
    }

    if let Some(summary) = result.context.get(summary_key).and_then(|v| v.as_str()) {
        println!();
        println!("summary: {}", summary);
    }
}

fn validate_plan(path: &Path) -> Result<()> {
    let file = load_plan_file(path)?;
    let waves = organize_waves(&file.plan);

    println!(
        "{} task(s) in {} wave(s)",
        file.plan.len(),
        waves.wave_count()
    );
    for (index, wave) in waves.waves().iter().enumerate() {
        let ids: Vec<&str> = wave.iter().map(|t| t.id.as_str()).collect();
        println!("  wave {}: {}", index + 1, ids.join(", "));
    }

    for (task, missing) in file.plan.dangling_dependencies() {
        println!("warning: {} depends on unknown task {}", task, missing);
    }
    if let Some(reason) = waves.forced_reason() {
        let forced: Vec<&str> = waves.forced_tasks().iter().map(|id| id.as_str()).collect();
        println!(
            "warning: final wave forced ({}): {}",
            reason,
            forced.join(", ")
        );
    }

    let unfixtured: Vec<&str> = file
        .plan
        .sub_tasks
        .iter()
        .flat_map(|t| t.workers.iter())
        .filter(|w| w.as_str() != "echo" && !file.fixtures.contains_key(w.as_str()))
        .map(|w| w.as_str())
        .collect();
    if !unfixtured.is_empty() {
        println!("warning: workers without fixtures: {}", unfixtured.join(", "));
    }

    Ok(())
}
