//! Approximate non-progress detection.

use crate::config::LivenessConfig;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use turnstile_model::DynMachine;

/// Structural hash of the global state: for every machine, its id,
/// status, state stack, mailbox contents as a multiset of types, whether
/// it is suspended in a receive, and its progress hash.
pub fn fingerprint<'a>(machines: impl IntoIterator<Item = &'a (dyn DynMachine + 'static)>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for machine in machines {
        machine.id().hash(&mut hasher);
        machine.status().hash(&mut hasher);
        machine.stack().hash(&mut hasher);
        let mut kinds = machine.mailbox_kinds();
        kinds.sort();
        kinds.hash(&mut hasher);
        machine.is_receiving().hash(&mut hasher);
        machine.progress_hash().hash(&mut hasher);
    }
    hasher.finish()
}

/// A fingerprint that reached the repeat threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeat {
    pub seen: usize,
    pub step: u64,
}

/// Sliding window of recent fingerprints.
///
/// A repeat only marks the run as suspect. The controller turns it into a
/// violation when the run later hits its step bound; a run that goes on to
/// terminate was never livelocked.
#[derive(Debug)]
pub struct LivenessMonitor {
    config: LivenessConfig,
    recent: VecDeque<u64>,
    suspect: Option<Repeat>,
}

impl LivenessMonitor {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.window),
            suspect: None,
            config,
        }
    }

    /// Should the controller sample after `step` steps?
    pub fn due(&self, step: u64) -> bool {
        self.config.enabled && self.config.sample_interval > 0 && step % self.config.sample_interval == 0
    }

    /// Record the sample taken at `step`. Returns the repeat when this
    /// fingerprint reaches the threshold within the window.
    pub fn observe(&mut self, fingerprint: u64, step: u64) -> Option<Repeat> {
        self.recent.push_back(fingerprint);
        while self.recent.len() > self.config.window.max(1) {
            self.recent.pop_front();
        }
        let seen = self.recent.iter().filter(|&&f| f == fingerprint).count();
        if seen < self.config.repeats.max(2) {
            return None;
        }
        let repeat = Repeat { seen, step };
        if self.suspect.is_none() {
            log::debug!("global state repeated {} times at step {}", seen, step);
            self.suspect = Some(repeat);
        }
        Some(repeat)
    }

    /// First repeat seen during the run, if any.
    pub fn suspect(&self) -> Option<Repeat> {
        self.suspect
    }

    pub fn samples(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(window: usize, repeats: usize) -> LivenessConfig {
        LivenessConfig {
            enabled: true,
            sample_interval: 1,
            window,
            repeats,
        }
    }

    #[test]
    fn distinct_samples_never_trigger() {
        let mut monitor = LivenessMonitor::new(config(8, 2));
        for fp in 0..100 {
            assert_eq!(monitor.observe(fp, fp), None);
        }
        assert_eq!(monitor.samples(), 8);
        assert_eq!(monitor.suspect(), None);
    }

    #[test]
    fn repeated_sample_triggers_at_threshold() {
        let mut monitor = LivenessMonitor::new(config(8, 3));
        assert_eq!(monitor.observe(7, 1), None);
        assert_eq!(monitor.observe(1, 2), None);
        assert_eq!(monitor.observe(7, 3), None);
        let first = Repeat { seen: 3, step: 4 };
        assert_eq!(monitor.observe(7, 4), Some(first));
        assert_eq!(monitor.observe(7, 5), Some(Repeat { seen: 4, step: 5 }));
        assert_eq!(monitor.suspect(), Some(first));
    }

    #[test]
    fn repeats_outside_window_are_forgotten() {
        let mut monitor = LivenessMonitor::new(config(2, 2));
        assert_eq!(monitor.observe(5, 1), None);
        assert_eq!(monitor.observe(6, 2), None);
        assert_eq!(monitor.observe(7, 3), None);
        assert_eq!(monitor.observe(5, 4), None);
        assert_eq!(monitor.suspect(), None);
    }

    #[test]
    fn disabled_monitor_is_never_due() {
        let monitor = LivenessMonitor::new(LivenessConfig::disabled());
        assert!(!monitor.due(16));
        let monitor = LivenessMonitor::new(LivenessConfig::default());
        assert!(monitor.due(16));
        assert!(!monitor.due(17));
    }
}
