//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Non-progress detection parameters.
///
/// Every `sample_interval` steps the controller fingerprints the global
/// state. If one fingerprint shows up `repeats` times among the last
/// `window` samples the run becomes suspect, and a suspect run that
/// reaches `max_steps` is reported as a liveness violation. Runs that
/// terminate are never flagged. This is a heuristic: it can miss
/// livelocks whose states never repeat exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessConfig {
    pub enabled: bool,
    pub sample_interval: u64,
    pub window: usize,
    pub repeats: usize,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval: 16,
            window: 64,
            repeats: 4,
        }
    }
}

impl LivenessConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Scheduling steps allowed per run.
    pub max_steps: u64,
    /// Report hitting `max_steps` as a liveness violation even when no
    /// repeated state was seen.
    pub strict_step_bound: bool,
    pub liveness: LivenessConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            strict_step_bound: false,
            liveness: LivenessConfig::default(),
        }
    }
}
