//! Sample turnstile programs.
//!
//! Each demo is a program function that sets up a fresh controller. Most
//! contain a bug that only some schedules expose; the catalog records
//! which outcome exploration is expected to report.

pub mod deadlock;
pub mod livelock;
pub mod lost_update;
pub mod ping_pong;
pub mod session;
pub mod unhandled;

use turnstile_runtime::{Controller, Outcome, RuntimeError};

/// Sets up the initial machines of one run.
pub type Program = fn(&mut Controller<'_>) -> Result<(), RuntimeError>;

pub struct Demo {
    pub name: &'static str,
    pub summary: &'static str,
    pub program: Program,
    /// The bug exploration should find, `None` for correct programs.
    pub expected: Option<Outcome>,
}

pub static DEMOS: &[Demo] = &[
    Demo {
        name: "ping-pong",
        summary: "two machines trade messages for a fixed number of rounds, then halt",
        program: ping_pong::program,
        expected: None,
    },
    Demo {
        name: "lost-update",
        summary: "clients read-modify-write a store when a coin flip says so",
        program: lost_update::program,
        expected: Some(Outcome::AssertionFailure),
    },
    Demo {
        name: "deadlock",
        summary: "two philosophers pick up shared forks in opposite order",
        program: deadlock::program,
        expected: Some(Outcome::Deadlock),
    },
    Demo {
        name: "livelock",
        summary: "two players return a ball forever",
        program: livelock::program,
        expected: Some(Outcome::LivenessViolation),
    },
    Demo {
        name: "unhandled",
        summary: "a status probe can reach a server in a state that does not expect it",
        program: unhandled::program,
        expected: Some(Outcome::UnhandledEvent),
    },
    Demo {
        name: "session",
        summary: "pushed session states with deferred opens and fall-through keepalives",
        program: session::program,
        expected: None,
    },
];

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|demo| demo.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_explore::{replay, EngineConfig, StrategyKind, TestingEngine};

    #[test]
    fn names_are_unique() {
        for (i, demo) in DEMOS.iter().enumerate() {
            assert!(DEMOS[i + 1..].iter().all(|other| other.name != demo.name));
            assert_eq!(find(demo.name).map(|d| d.summary), Some(demo.summary));
        }
        assert!(find("nope").is_none());
    }

    #[test]
    fn every_demo_behaves_as_catalogued() {
        for demo in DEMOS {
            let config = EngineConfig {
                iterations: 300,
                seed: 3,
                strategy: StrategyKind::Random,
                ..EngineConfig::default()
            };
            let report = TestingEngine::new(config.clone(), demo.program)
                .run()
                .unwrap();
            let found = report.bug.as_ref().map(|bug| bug.outcome);
            assert_eq!(found, demo.expected, "demo {}", demo.name);

            if let Some(bug) = report.bug {
                let replayed = replay(demo.program, &config.runtime, bug.trace.clone()).unwrap();
                assert_eq!(replayed.outcome, bug.outcome, "replay of {}", demo.name);
                assert_eq!(replayed.trace, bug.trace, "replay of {}", demo.name);
            }
        }
    }
}
