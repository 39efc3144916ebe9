//! Two machines return a ball to each other forever.
//!
//! Every step is enabled and nothing changes, so the run never reaches a
//! quiescent state. The liveness monitor sees the same global fingerprint
//! repeat, and when the step bound runs out the run is reported as a
//! violation.

use turnstile_model::{
    ActionError, ActionResult, Context, Event, EventType, Machine, MachineId, State, StateTable,
};
use turnstile_runtime::{Controller, RuntimeError};

pub const BALL: EventType = EventType("ball");

pub struct Player;

impl Player {
    fn ball(&mut self, ctx: &mut Context<'_, Self>, event: &Event) -> ActionResult {
        let from = event
            .payload::<MachineId>()
            .copied()
            .ok_or_else(|| ActionError::Other("ball without thrower".into()))?;
        let me = ctx.id();
        ctx.send(from, Event::with_payload(BALL, me));
        Ok(())
    }
}

impl Machine for Player {
    fn states() -> StateTable<Self> {
        StateTable::new("Player", "Playing")
            .state(State::new("Playing").on_event(BALL, Player::ball))
    }
}

pub fn program(c: &mut Controller<'_>) -> Result<(), RuntimeError> {
    let a = c.create(Player, None)?;
    let b = c.create(Player, None)?;
    c.send(a, Event::with_payload(BALL, b));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_runtime::{FirstEnabled, LivenessConfig, Outcome, RuntimeConfig};

    fn run(config: RuntimeConfig) -> turnstile_runtime::RunReport {
        let mut strategy = FirstEnabled;
        let mut controller = Controller::new(&mut strategy, config);
        program(&mut controller).unwrap();
        controller.run()
    }

    #[test]
    fn repeated_state_is_a_liveness_violation() {
        let config = RuntimeConfig {
            max_steps: 1_000,
            ..RuntimeConfig::default()
        };
        let report = run(config);
        assert_eq!(report.outcome, Outcome::LivenessViolation);
        assert_eq!(report.steps, 1_000);
        assert!(report.detail.unwrap().contains("repeated"));
    }

    #[test]
    fn without_the_monitor_only_the_bound_stops_it() {
        let config = RuntimeConfig {
            max_steps: 300,
            liveness: LivenessConfig::disabled(),
            ..RuntimeConfig::default()
        };
        assert_eq!(run(config.clone()).outcome, Outcome::BoundReached);

        let strict = RuntimeConfig {
            strict_step_bound: true,
            ..config
        };
        assert_eq!(run(strict).outcome, Outcome::LivenessViolation);
    }
}
