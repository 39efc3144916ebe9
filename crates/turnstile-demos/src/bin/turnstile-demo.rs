//! Run the sample programs under the exploration engine.
//!
//! # Usage
//!
//! ```bash
//! # List the demos
//! turnstile-demo list
//!
//! # Search for a bug with the default random strategy
//! turnstile-demo run lost-update
//!
//! # Bounded DFS, saving the first bug
//! turnstile-demo run deadlock --strategy dfs:40 --iterations 5000 --output bugs/
//!
//! # Reproduce a saved bug
//! turnstile-demo replay deadlock --trace bugs/bug.json
//! ```
//!
//! `run` exits with status 1 when a bug is found; `replay` exits with
//! status 1 when the recorded outcome is not reproduced.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use turnstile_demos::{find, Demo, DEMOS};
use turnstile_explore::{
    format_report, load_bug, replay, replay_artifact, EngineConfig, StrategyKind, TestingEngine,
};
use turnstile_runtime::{LivenessConfig, Outcome, RunReport, RuntimeConfig};
use turnstile_trace::TraceLog;

#[derive(Parser)]
#[command(name = "turnstile-demo")]
#[command(about = "Systematic testing of sample turnstile programs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore a demo until a bug is found or the budget runs out.
    Run {
        /// Demo name (see `list`).
        demo: String,

        /// Strategy: random, priority[:CHANGE_POINTS] or dfs[:MAX_DEPTH].
        #[arg(long, default_value = "random")]
        strategy: String,

        /// Iterations to run.
        #[arg(short, long, default_value = "100")]
        iterations: u64,

        /// Random seed for reproducibility.
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Scheduling steps allowed per iteration.
        #[arg(long, default_value = "10000")]
        max_steps: u64,

        /// Report hitting the step bound as a liveness violation.
        #[arg(long)]
        strict: bool,

        /// Disable the repeated-state liveness monitor.
        #[arg(long)]
        no_liveness: bool,

        /// Output directory for bug.json, trace.json and report.txt.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Replay a saved bug (bug.json) or a bare trace file against a demo.
    Replay {
        /// Demo name (see `list`).
        demo: String,

        /// Path to bug.json or trace.json.
        #[arg(short, long)]
        trace: String,
    },

    /// List available demos.
    List,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            demo,
            strategy,
            iterations,
            seed,
            max_steps,
            strict,
            no_liveness,
            output,
        } => {
            let strategy = match strategy.parse::<StrategyKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            let liveness = if no_liveness {
                LivenessConfig::disabled()
            } else {
                LivenessConfig::default()
            };
            let config = EngineConfig {
                iterations,
                seed,
                strategy,
                runtime: RuntimeConfig {
                    max_steps,
                    strict_step_bound: strict,
                    liveness,
                },
                output_dir: output.map(PathBuf::from),
            };
            cmd_run(demo_or_exit(&demo), config);
        }
        Commands::Replay { demo, trace } => cmd_replay(demo_or_exit(&demo), Path::new(&trace)),
        Commands::List => cmd_list(),
    }
}

fn demo_or_exit(name: &str) -> &'static Demo {
    match find(name) {
        Some(demo) => demo,
        None => {
            eprintln!("Unknown demo '{}'. Run `turnstile-demo list`.", name);
            std::process::exit(1);
        }
    }
}

fn cmd_run(demo: &Demo, config: EngineConfig) {
    log::info!("running demo {}", demo.name);
    let engine = TestingEngine::new(config, demo.program);
    let report = match engine.run() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", format_report(&report));

    if let Some(bug) = &report.bug {
        if demo.expected != Some(bug.outcome) {
            println!("Note: {} was not expected to report {}", demo.name, bug.outcome);
        }
        std::process::exit(1);
    }
    if let Some(expected) = demo.expected {
        println!(
            "Note: {} hides a {}; try more iterations or another strategy",
            demo.name, expected
        );
    }
}

fn cmd_replay(demo: &Demo, path: &Path) {
    let (expected, run) = match load_bug(path) {
        Ok(artifact) => {
            println!(
                "Replaying {} entries recorded in iteration {} ({})",
                artifact.trace.len(),
                artifact.iteration,
                artifact.outcome
            );
            (Some(artifact.outcome), replay_artifact(demo.program, &artifact))
        }
        Err(e) => {
            log::debug!("{} is not a bug artifact ({}); reading it as a trace", path.display(), e);
            let trace = match TraceLog::load(path) {
                Ok(trace) => trace,
                Err(e) => {
                    eprintln!("Failed to load {}: {}", path.display(), e);
                    std::process::exit(1);
                }
            };
            println!("Replaying {} trace entries", trace.len());
            (None, replay(demo.program, &RuntimeConfig::default(), trace))
        }
    };

    let run = match run {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    print_run(&run);

    let reproduced = run.outcome != Outcome::ReplayDivergence
        && expected.map_or(true, |outcome| outcome == run.outcome);
    if reproduced {
        println!("✅ Replay reproduced the recorded run");
    } else {
        println!("❌ Replay did not reproduce the recorded run");
        std::process::exit(1);
    }
}

fn print_run(run: &RunReport) {
    println!("Outcome: {} after {} steps", run.outcome, run.steps);
    if let Some(detail) = &run.detail {
        println!("Detail:  {}", detail);
    }
    for machine in &run.machines {
        println!(
            "  {:<5} {:<14} {:<12} {:?}",
            machine.id.to_string(),
            machine.machine_type,
            machine.state,
            machine.status
        );
    }
}

fn cmd_list() {
    println!("Available demos:");
    for demo in DEMOS {
        let expected = match demo.expected {
            Some(outcome) => outcome.label(),
            None => "no bug",
        };
        println!("  {:<12} [{}] {}", demo.name, expected, demo.summary);
    }
}
