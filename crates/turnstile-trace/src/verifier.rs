//! Determinism verification by comparing two trace logs.
//!
//! Two runs of the same program with the same strategy seed must produce
//! identical logs. [`DeterminismVerifier::compare`] reports the first
//! point where they differ, with a few preceding entries for context.

use crate::trace::{PointKind, TraceEntry, TraceLog};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const CONTEXT_WINDOW: usize = 5;

// ═══════════════════════════════════════════════════════════════════════
//  Divergence
// ═══════════════════════════════════════════════════════════════════════

/// A point where two traces diverged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Divergence {
    /// Index of the first differing entry.
    pub index: usize,
    pub description: String,
    /// Entry from trace A, `None` if A ended first.
    pub trace_a_entry: Option<TraceEntry>,
    /// Entry from trace B, `None` if B ended first.
    pub trace_b_entry: Option<TraceEntry>,
    /// Matching entries just before the divergence.
    pub context_before: Vec<TraceEntry>,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DIVERGENCE at entry {}:", self.index)?;
        writeln!(f, "  {}", self.description)?;
        match self.trace_a_entry {
            Some(entry) => writeln!(f, "  Trace A: {}", entry)?,
            None => writeln!(f, "  Trace A: <ended>")?,
        }
        match self.trace_b_entry {
            Some(entry) => writeln!(f, "  Trace B: {}", entry)?,
            None => writeln!(f, "  Trace B: <ended>")?,
        }
        if !self.context_before.is_empty() {
            writeln!(f, "  Context (preceding entries):")?;
            let first = self.index - self.context_before.len();
            for (i, entry) in self.context_before.iter().enumerate() {
                writeln!(f, "    [{:>6}] ✓ {}", first + i, entry)?;
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Verification result
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_deterministic: bool,
    pub trace_a_len: usize,
    pub trace_b_len: usize,
    /// Entries that matched before the first divergence.
    pub matching_entries: usize,
    pub first_divergence: Option<Divergence>,
    pub trace_a_summary: BTreeMap<PointKind, usize>,
    pub trace_b_summary: BTreeMap<PointKind, usize>,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_deterministic {
            writeln!(
                f,
                "✅ DETERMINISTIC: {} entries matched",
                self.matching_entries
            )?;
        } else {
            writeln!(f, "❌ NON-DETERMINISTIC")?;
            writeln!(
                f,
                "   Trace A: {} entries, Trace B: {} entries",
                self.trace_a_len, self.trace_b_len
            )?;
            writeln!(
                f,
                "   Matched {} entries before divergence",
                self.matching_entries
            )?;
        }

        if let Some(ref div) = self.first_divergence {
            writeln!(f)?;
            write!(f, "{}", div)?;
        }

        writeln!(f, "\nPoint kind summary:")?;
        let kinds: BTreeSet<PointKind> = self
            .trace_a_summary
            .keys()
            .chain(self.trace_b_summary.keys())
            .copied()
            .collect();
        writeln!(f, "  {:>12} {:>10} {:>10} {:>10}", "Kind", "Trace A", "Trace B", "Delta")?;
        for kind in kinds {
            let a = self.trace_a_summary.get(&kind).copied().unwrap_or(0);
            let b = self.trace_b_summary.get(&kind).copied().unwrap_or(0);
            let delta = b as i64 - a as i64;
            let marker = if delta != 0 { " ⚠" } else { "" };
            writeln!(f, "  {:>12} {:>10} {:>10} {:>+10}{}", kind.label(), a, b, delta, marker)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Verifier
// ═══════════════════════════════════════════════════════════════════════

/// Compares two trace logs entry by entry.
///
/// ```no_run
/// use turnstile_trace::{DeterminismVerifier, TraceLog};
///
/// let a = TraceLog::load("run1.json").unwrap();
/// let b = TraceLog::load("run2.json").unwrap();
/// let result = DeterminismVerifier::compare(&a, &b);
/// println!("{}", result);
/// ```
pub struct DeterminismVerifier;

impl DeterminismVerifier {
    pub fn compare(trace_a: &TraceLog, trace_b: &TraceLog) -> VerificationResult {
        let a = trace_a.entries();
        let b = trace_b.entries();
        let common = a.len().min(b.len());
        let mismatch = (0..common).find(|&i| a[i] != b[i]);

        let first_divergence = match mismatch {
            Some(i) => Some(Divergence {
                index: i,
                description: describe(&a[i], &b[i]),
                trace_a_entry: Some(a[i]),
                trace_b_entry: Some(b[i]),
                context_before: context(a, i),
            }),
            None if a.len() != b.len() => Some(Divergence {
                index: common,
                description: format!(
                    "Trace length mismatch: A has {} entries, B has {} entries (delta: {})",
                    a.len(),
                    b.len(),
                    b.len() as i64 - a.len() as i64
                ),
                trace_a_entry: a.get(common).copied(),
                trace_b_entry: b.get(common).copied(),
                context_before: context(a, common),
            }),
            None => None,
        };

        VerificationResult {
            is_deterministic: first_divergence.is_none(),
            trace_a_len: a.len(),
            trace_b_len: b.len(),
            matching_entries: mismatch.unwrap_or(common),
            first_divergence,
            trace_a_summary: trace_a.summary(),
            trace_b_summary: trace_b.summary(),
        }
    }
}

fn context(entries: &[TraceEntry], index: usize) -> Vec<TraceEntry> {
    entries[index.saturating_sub(CONTEXT_WINDOW)..index].to_vec()
}

fn describe(a: &TraceEntry, b: &TraceEntry) -> String {
    if a.kind != b.kind {
        format!("Point kind differs: {} vs {}", a.kind, b.kind)
    } else {
        format!("{} value differs: {} vs {}", a.kind, a.value, b.value)
    }
}
