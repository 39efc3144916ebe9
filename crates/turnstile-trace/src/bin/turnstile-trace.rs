//! Inspect and compare turnstile trace files.
//!
//! # Usage
//!
//! ```bash
//! # Print every decision in a trace
//! turnstile-trace show --trace bugs/trace.json
//!
//! # Per-kind counts only
//! turnstile-trace summary --trace bugs/trace.json
//!
//! # Compare two runs for determinism
//! turnstile-trace verify --trace-a run1.json --trace-b run2.json
//! ```

use clap::{Parser, Subcommand};
use turnstile_trace::{DeterminismVerifier, TraceLog};

#[derive(Parser)]
#[command(name = "turnstile-trace")]
#[command(about = "Inspect and compare turnstile scheduling traces")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the decisions recorded in a trace file.
    Show {
        /// Path to trace file (JSON).
        #[arg(short, long)]
        trace: String,

        /// Only print the first N entries (0 = all).
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Show per-kind counts for a trace file.
    Summary {
        /// Path to trace file (JSON).
        #[arg(short, long)]
        trace: String,
    },

    /// Compare two traces for deterministic equivalence.
    Verify {
        /// Path to first trace file (JSON).
        #[arg(long)]
        trace_a: String,

        /// Path to second trace file (JSON).
        #[arg(long)]
        trace_b: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Show { trace, limit } => cmd_show(&trace, limit),
        Commands::Summary { trace } => cmd_summary(&trace),
        Commands::Verify { trace_a, trace_b } => cmd_verify(&trace_a, &trace_b),
    }
}

fn load_or_exit(path: &str) -> TraceLog {
    match TraceLog::load(path) {
        Ok(trace) => {
            log::debug!("loaded {} entries from {}", trace.len(), path);
            trace
        }
        Err(e) => {
            eprintln!("Failed to load {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

fn cmd_show(path: &str, limit: usize) {
    let trace = load_or_exit(path);
    let shown = if limit == 0 { trace.len() } else { limit.min(trace.len()) };
    for (i, entry) in trace.iter().take(shown).enumerate() {
        println!("[{:>6}] {}", i, entry);
    }
    if shown < trace.len() {
        println!("... {} more", trace.len() - shown);
    }
}

fn cmd_summary(path: &str) {
    let trace = load_or_exit(path);
    println!("Trace: {}", path);
    println!("Total entries: {}", trace.len());
    println!();
    println!("  {:>12} {:>10}", "Kind", "Count");
    println!("  {:>12} {:>10}", "────", "─────");
    for (kind, count) in trace.summary() {
        println!("  {:>12} {:>10}", kind.label(), count);
    }
}

fn cmd_verify(path_a: &str, path_b: &str) {
    let trace_a = load_or_exit(path_a);
    let trace_b = load_or_exit(path_b);

    eprintln!(
        "Comparing {} ({} entries) vs {} ({} entries)",
        path_a,
        trace_a.len(),
        path_b,
        trace_b.len()
    );

    let result = DeterminismVerifier::compare(&trace_a, &trace_b);
    println!("{}", result);

    if !result.is_deterministic {
        std::process::exit(1);
    }
}
