use clap::{ArgGroup, Parser, Subcommand};
use ps_controls::Registry;
use ps_graph::{GraphError, build_graph, circuits, resolve};
use ps_project::{LoadPolicy, ProjectConfig, ProjectError, analyze_config_diff, build_store};
use ps_runtime::{RuntimeError, Scheduler, SchedulerOptions};
use ps_snapshot::{SnapshotError, SnapshotManager};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid --duration: {value}")]
    Duration { value: f64 },
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "ps-cli")]
#[command(about = "PlcSim CLI - cyclic controller simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration file
    Validate {
        /// Path to the configuration (YAML or JSON)
        config_path: PathBuf,
        /// Prune dangling connections and stale orders instead of failing
        #[arg(long)]
        lenient: bool,
    },
    /// Show the execution order and circuits
    Order {
        /// Path to the configuration (YAML or JSON)
        config_path: PathBuf,
    },
    /// Run the scheduler
    #[command(group(ArgGroup::new("limit").required(true).args(["cycles", "duration"])))]
    Run {
        /// Path to the configuration (YAML or JSON)
        config_path: PathBuf,
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,
        /// Snapshot file to restore from and save to
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Save a snapshot every N cycles
        #[arg(long, default_value_t = 10)]
        snapshot_every: u64,
        /// Re-save the configuration here after every accepted diff
        #[arg(long)]
        persist_config: Option<PathBuf>,
        #[arg(long)]
        lenient: bool,
    },
    /// Print the diff that turns one configuration into another
    Diff {
        old_path: PathBuf,
        new_path: PathBuf,
    },
    /// Inspect or clear a snapshot file
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// Print the saved record
    Show { path: PathBuf },
    /// Remove the saved record
    Clear { path: PathBuf },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            config_path,
            lenient,
        } => cmd_validate(&config_path, policy(lenient)),
        Commands::Order { config_path } => cmd_order(&config_path),
        Commands::Run {
            config_path,
            cycles,
            duration,
            snapshot,
            snapshot_every,
            persist_config,
            lenient,
        } => {
            let options = SchedulerOptions {
                snapshot_every,
                persist_config_to: persist_config,
                load_policy: policy(lenient),
                max_cycles: cycles,
                ..SchedulerOptions::default()
            };
            cmd_run(&config_path, snapshot.as_deref(), options, duration)
        }
        Commands::Diff { old_path, new_path } => cmd_diff(&old_path, &new_path),
        Commands::Snapshot(SnapshotCommands::Show { path }) => cmd_snapshot_show(&path),
        Commands::Snapshot(SnapshotCommands::Clear { path }) => cmd_snapshot_clear(&path),
    }
}

fn policy(lenient: bool) -> LoadPolicy {
    if lenient {
        LoadPolicy::Lenient
    } else {
        LoadPolicy::Strict
    }
}

fn cmd_validate(config_path: &Path, policy: LoadPolicy) -> CliResult<()> {
    println!("Validating configuration: {}", config_path.display());
    let config = ps_project::load(config_path)?;
    let (mut store, report) = build_store(&config, &Registry::with_builtins(), policy)?;

    for (conn, reason) in &report.pruned_connections {
        println!("  pruned {} -> {}: {}", conn.from, conn.to, reason);
    }
    if let Some(reason) = &report.dropped_order {
        println!("  dropped execution order: {}", reason);
    }

    let manual = store.execution_order()?.is_manual();
    println!("✓ Configuration is valid");
    println!(
        "  {} instances, {} connections, cycle time {} s, {} order",
        store.len(),
        store.connections().len(),
        store.cycle_time_s(),
        if manual { "manual" } else { "automatic" }
    );
    Ok(())
}

fn cmd_order(config_path: &Path) -> CliResult<()> {
    let config = ps_project::load(config_path)?;
    let graph = build_graph(
        config.instances().map(|(_, name, _)| name),
        &config.connections,
    )
    .map_err(ProjectError::from)?;

    match resolve(&graph, config.execution_order.as_deref()) {
        Ok(order) => {
            let label = if order.is_manual() { "manual" } else { "automatic" };
            println!("Execution order ({label}):");
            for (i, name) in order.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, name);
            }
        }
        Err(GraphError::Cyclic(report)) => {
            println!("No execution order: {report}");
        }
        Err(e) => return Err(e.into()),
    }

    println!("Circuits:");
    for circuit in circuits(&graph) {
        println!("  {}: {}", circuit.name, circuit.members.join(", "));
    }
    Ok(())
}

fn cmd_run(
    config_path: &Path,
    snapshot: Option<&Path>,
    options: SchedulerOptions,
    duration: Option<f64>,
) -> CliResult<()> {
    let window = duration.map(run_window).transpose()?;
    let config = ps_project::load(config_path)?;
    let snapshots = match snapshot {
        Some(path) => SnapshotManager::file(path)?,
        None => SnapshotManager::in_memory(),
    };

    println!(
        "Running {} at {} s per cycle",
        config_path.display(),
        config.cycle_time_s
    );
    let handle = Scheduler::start(&config, Registry::with_builtins(), snapshots, options)?;
    let report = match window {
        Some(window) => {
            std::thread::sleep(window);
            handle.shutdown()?
        }
        None => handle.wait()?,
    };
    info!(cycles = report.cycles, "run finished");

    println!(
        "✓ {} cycles, {} overruns, snapshot at cycle {}",
        report.cycles, report.overruns, report.final_snapshot.cycle
    );
    if let Some(frame) = &report.last_frame {
        print_values(&frame.values);
    }
    Ok(())
}

/// Wall-clock run length; refuses values a `Duration` cannot hold.
fn run_window(secs: f64) -> CliResult<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| CliError::Duration { value: secs })
}

fn cmd_diff(old_path: &Path, new_path: &Path) -> CliResult<()> {
    let old: ProjectConfig = ps_project::load(old_path)?;
    let new: ProjectConfig = ps_project::load(new_path)?;
    let mut diff = analyze_config_diff(&old, &new);
    if diff.is_empty() {
        println!("No changes");
        return Ok(());
    }
    diff.full_config = None;
    print!("{}", serde_yaml::to_string(&diff)?);
    Ok(())
}

fn cmd_snapshot_show(path: &Path) -> CliResult<()> {
    let Some(record) = SnapshotManager::file(path)?.load()? else {
        println!("No snapshot at {}", path.display());
        return Ok(());
    };
    println!("Snapshot taken {} after cycle {}", record.timestamp, record.cycle);
    print_values(&record.values);
    if !record.states.is_empty() {
        println!("States:");
        for (name, state) in &record.states {
            println!("  {}: {}", name, serde_json::to_string(state)?);
        }
    }
    Ok(())
}

fn cmd_snapshot_clear(path: &Path) -> CliResult<()> {
    SnapshotManager::file(path)?.clear()?;
    println!("✓ Cleared {}", path.display());
    Ok(())
}

fn print_values(values: &ps_core::ValueMap) {
    let mut keys: Vec<&String> = values.keys().collect();
    keys.sort();
    println!("Values:");
    for key in keys {
        println!("  {} = {}", key, values[key.as_str()]);
    }
}
