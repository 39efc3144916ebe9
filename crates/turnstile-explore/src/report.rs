//! Format engine reports for human consumption.

use crate::engine::{BugReport, EngineReport};
use turnstile_model::Status;
use turnstile_runtime::CoverageGraph;

const BANNER: &str = "═══════════════════════════════════════════════════════════════════════\n";

/// Maximum trace entries shown inline in a bug report.
const TRACE_TAIL: usize = 20;

/// Format an engine report for human consumption.
pub fn format_report(report: &EngineReport) -> String {
    let mut output = String::new();

    output.push_str(BANNER);
    output.push_str("  Turnstile Exploration Report\n");
    output.push_str(BANNER);
    output.push('\n');

    output.push_str(&format!("Strategy:               {}\n", report.strategy));
    output.push_str(&format!("Iterations run:         {}\n", report.iterations_run));
    if report.exhausted {
        output.push_str("Search space:           exhausted\n");
    }
    match &report.bug {
        Some(bug) => output.push_str(&format!(
            "Result:                 bug found with reproducible trace ({})\n",
            bug.outcome
        )),
        None => output.push_str(&format!(
            "Result:                 no bug found in {} iterations\n",
            report.iterations_run
        )),
    }
    output.push('\n');

    let stats = &report.stats;
    output.push_str("─── Run Statistics ────────────────────────────────────────────────────\n");
    output.push_str(&format!("Total steps:            {}\n", stats.total_steps));
    output.push_str(&format!("Avg steps/run:          {:.2}\n", stats.mean_steps()));
    output.push_str(&format!("Longest run:            {}\n", stats.max_steps));
    output.push_str(&format!("Elapsed:                {} ms\n", stats.elapsed_ms));
    for (outcome, count) in &stats.outcomes {
        output.push_str(&format!("  {:<22}{}\n", format!("{}:", outcome), count));
    }
    output.push('\n');

    output.push_str(&format_coverage(&report.coverage));

    if let Some(bug) = &report.bug {
        output.push('\n');
        output.push_str(&format_bug(bug));
    }

    output
}

/// Format one bug with its final machine states and the tail of its trace.
pub fn format_bug(bug: &BugReport) -> String {
    let mut output = String::new();

    output.push_str("─── Bug ───────────────────────────────────────────────────────────────\n");
    output.push_str(&format!("Outcome:                {}\n", bug.outcome));
    output.push_str(&format!("Iteration:              {}\n", bug.iteration));
    output.push_str(&format!("Steps:                  {}\n", bug.steps));
    output.push_str(&format!("Trace entries:          {}\n", bug.trace.len()));
    if let Some(detail) = &bug.detail {
        output.push_str(&format!("Detail:                 {}\n", detail));
    }
    if let Some(path) = &bug.artifact {
        output.push_str(&format!("Artifact:               {}\n", path.display()));
    }
    output.push('\n');

    if !bug.machines.is_empty() {
        output.push_str("─── Machines ──────────────────────────────────────────────────────────\n");
        for machine in &bug.machines {
            let status = match machine.status {
                Status::Active => "",
                Status::Halted => " [halted]",
            };
            let receiving = if machine.receiving { " [receiving]" } else { "" };
            output.push_str(&format!(
                "  {:<5} {:<18} {}{}{}  stack={}  pending={}\n",
                machine.id.to_string(),
                machine.machine_type,
                machine.state,
                status,
                receiving,
                machine.stack.join(">"),
                machine.pending
            ));
        }
        output.push('\n');
    }

    output.push_str("─── Trace (tail) ──────────────────────────────────────────────────────\n");
    let skip = bug.trace.len().saturating_sub(TRACE_TAIL);
    if skip > 0 {
        output.push_str(&format!("  ... {} earlier entries\n", skip));
    }
    for (index, entry) in bug.trace.iter().enumerate().skip(skip) {
        output.push_str(&format!("  {:>5}  {}\n", index, entry));
    }

    output
}

/// Per-machine and per-state event coverage.
pub fn format_coverage(coverage: &CoverageGraph) -> String {
    let mut output = String::new();

    output.push_str("─── Coverage ──────────────────────────────────────────────────────────\n");
    let machines = coverage.machine_coverage();
    if machines.is_empty() {
        output.push_str("  (no machines)\n");
        return output;
    }
    for machine in &machines {
        output.push_str(&format!(
            "  {:<24} states {}/{}  events {}/{} ({:.1}%)\n",
            machine.machine,
            machine.states_discovered,
            machine.states_declared,
            machine.exercised,
            machine.registered,
            machine.percent()
        ));
    }
    let gaps: Vec<_> = coverage
        .state_coverage()
        .into_iter()
        .filter(|s| s.exercised < s.registered)
        .collect();
    if !gaps.is_empty() {
        output.push_str("  Partially covered states:\n");
        for state in gaps {
            output.push_str(&format!(
                "    {}.{}: {}/{}\n",
                state.machine, state.state, state.exercised, state.registered
            ));
        }
    }
    output.push_str(&format!("  Edges observed:        {}\n", coverage.edges().count()));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineStats;
    use turnstile_model::MachineId;
    use turnstile_runtime::{MachineSummary, Outcome};
    use turnstile_trace::{PointKind, TraceLog};

    fn report(bug: Option<BugReport>) -> EngineReport {
        EngineReport {
            strategy: "random".into(),
            iterations_run: 12,
            exhausted: false,
            bug,
            stats: EngineStats::default(),
            coverage: CoverageGraph::new(),
        }
    }

    fn bug(entries: u64) -> BugReport {
        let mut trace = TraceLog::new();
        for i in 0..entries {
            trace.record(PointKind::Schedule, i % 2);
        }
        BugReport {
            strategy: "random".into(),
            iteration: 11,
            outcome: Outcome::Deadlock,
            detail: Some("no machine is enabled".into()),
            steps: entries,
            machines: vec![MachineSummary {
                id: MachineId(0),
                machine_type: "Client".into(),
                state: "Waiting".into(),
                stack: vec!["Waiting".into()],
                status: Status::Active,
                pending: 0,
                receiving: true,
            }],
            trace,
            artifact: None,
        }
    }

    #[test]
    fn clean_run_says_so() {
        let text = format_report(&report(None));
        assert!(text.contains("no bug found in 12 iterations"));
        assert!(text.contains("(no machines)"));
        assert!(!text.contains("─── Bug"));
    }

    #[test]
    fn bug_report_includes_machines_and_trace() {
        let text = format_report(&report(Some(bug(3))));
        assert!(text.contains("bug found with reproducible trace (deadlock)"));
        assert!(text.contains("Client"));
        assert!(text.contains("[receiving]"));
        assert!(!text.contains("earlier entries"));
    }

    #[test]
    fn long_traces_are_cut_to_the_tail() {
        let text = format_bug(&bug(50));
        assert!(text.contains("... 30 earlier entries"));
        assert!(text.contains("   49  "));
        assert!(!text.contains("   29  "));
    }
}
