//! Two philosophers, two forks, opposite acquisition order.
//!
//! A philosopher takes its left fork, then its right, then eats and
//! releases both. A held fork defers further requests. If each
//! philosopher gets its first fork before the other asks, both wait in
//! `receive` forever while the forks sit on deferred requests.

use turnstile_model::{
    ActionError, ActionResult, Context, Event, EventType, Machine, MachineId, State, StateTable,
};
use turnstile_runtime::{Controller, RuntimeError};

pub const THINK: EventType = EventType("think");
pub const ACQUIRE: EventType = EventType("acquire");
pub const GRANTED: EventType = EventType("granted");
pub const RELEASE: EventType = EventType("release");

pub struct Fork;

impl Fork {
    fn acquire(&mut self, ctx: &mut Context<'_, Self>, event: &Event) -> ActionResult {
        let requester = event
            .payload::<MachineId>()
            .copied()
            .ok_or_else(|| ActionError::Other("acquire without requester".into()))?;
        ctx.send(requester, GRANTED);
        ctx.goto("Held");
        Ok(())
    }
}

impl Machine for Fork {
    fn states() -> StateTable<Self> {
        StateTable::new("Fork", "Free")
            .state(State::new("Free").on_event(ACQUIRE, Fork::acquire))
            .state(State::new("Held").defer(ACQUIRE).goto(RELEASE, "Free"))
    }
}

pub struct Philosopher {
    left: MachineId,
    right: MachineId,
}

impl Philosopher {
    fn wake(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
        let me = ctx.id();
        ctx.send(me, THINK);
        Ok(())
    }

    fn hungry(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        let me = ctx.id();
        ctx.send(self.left, Event::with_payload(ACQUIRE, me));
        ctx.receive(&[GRANTED], Philosopher::got_left);
        Ok(())
    }

    fn got_left(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        let me = ctx.id();
        ctx.send(self.right, Event::with_payload(ACQUIRE, me));
        ctx.receive(&[GRANTED], Philosopher::got_right);
        Ok(())
    }

    fn got_right(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        ctx.send(self.left, RELEASE);
        ctx.send(self.right, RELEASE);
        ctx.halt();
        Ok(())
    }
}

impl Machine for Philosopher {
    fn states() -> StateTable<Self> {
        StateTable::new("Philosopher", "Thinking").state(
            State::new("Thinking")
                .on_entry(Philosopher::wake)
                .on_event(THINK, Philosopher::hungry),
        )
    }
}

pub fn program(c: &mut Controller<'_>) -> Result<(), RuntimeError> {
    let a = c.create(Fork, None)?;
    let b = c.create(Fork, None)?;
    c.create(Philosopher { left: a, right: b }, None)?;
    c.create(Philosopher { left: b, right: a }, None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_explore::{EngineConfig, StrategyKind, TestingEngine};
    use turnstile_runtime::{FirstEnabled, Outcome, RuntimeConfig};

    #[test]
    fn sequential_meal_completes() {
        // Forks have lower ids, so the first philosopher finishes before
        // the second one starts.
        let mut strategy = FirstEnabled;
        let mut controller = Controller::new(&mut strategy, RuntimeConfig::default());
        program(&mut controller).unwrap();
        let report = controller.run();
        assert_eq!(report.outcome, Outcome::Completed, "{:?}", report.detail);
    }

    #[test]
    fn exploration_finds_the_deadlock() {
        let config = EngineConfig {
            iterations: 500,
            strategy: StrategyKind::Random,
            ..EngineConfig::default()
        };
        let report = TestingEngine::new(config, program).run().unwrap();
        let bug = report.bug.expect("deadlock should be found");
        assert_eq!(bug.outcome, Outcome::Deadlock);
        let detail = bug.detail.unwrap_or_default();
        assert!(detail.contains("Philosopher"), "{}", detail);
        assert!(detail.contains("receive"), "{}", detail);
    }
}
