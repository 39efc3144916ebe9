//! Strategy selection for the engine.

use crate::dfs::{DfsConfig, DfsStrategy};
use crate::priority::{PriorityConfig, PriorityStrategy};
use crate::random::RandomStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use turnstile_runtime::SchedulingStrategy;

/// Which exploration policy an engine uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Random,
    Priority { change_points: usize },
    Dfs { max_depth: usize },
}

impl StrategyKind {
    pub fn build(&self, seed: u64) -> Box<dyn SchedulingStrategy> {
        match self {
            StrategyKind::Random => Box::new(RandomStrategy::new(seed)),
            StrategyKind::Priority { change_points } => Box::new(PriorityStrategy::new(
                seed,
                PriorityConfig {
                    change_points: *change_points,
                    ..PriorityConfig::default()
                },
            )),
            StrategyKind::Dfs { max_depth } => Box::new(DfsStrategy::new(DfsConfig {
                max_depth: *max_depth,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Random => "random",
            StrategyKind::Priority { .. } => "priority",
            StrategyKind::Dfs { .. } => "dfs",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Random => write!(f, "random"),
            StrategyKind::Priority { change_points } => {
                write!(f, "priority ({} change points)", change_points)
            }
            StrategyKind::Dfs { max_depth } => write!(f, "dfs (depth {})", max_depth),
        }
    }
}

/// Parses `random`, `priority`, `priority:N`, `dfs` and `dfs:N`.
impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let number = |default: usize| -> Result<usize, String> {
            match arg {
                None => Ok(default),
                Some(arg) => arg
                    .parse()
                    .map_err(|_| format!("invalid number '{}' in strategy '{}'", arg, s)),
            }
        };
        match name {
            "random" if arg.is_none() => Ok(StrategyKind::Random),
            "priority" | "pct" => Ok(StrategyKind::Priority {
                change_points: number(PriorityConfig::default().change_points)?,
            }),
            "dfs" => Ok(StrategyKind::Dfs {
                max_depth: number(DfsConfig::default().max_depth)?,
            }),
            _ => Err(format!(
                "unknown strategy '{}' (expected random, priority[:N] or dfs[:N])",
                s
            )),
        }
    }
}
