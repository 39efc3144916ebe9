//! Terminating ping-pong.
//!
//! The pinger creates its ponger from an action, plays a fixed number of
//! rounds, then halts both sides with the reserved halt event. Both
//! machines expose their round counters through `progress_hash`, so a long
//! game is not mistaken for a livelock.

use turnstile_model::{
    ActionResult, Context, Event, EventType, Machine, MachineId, State, StateTable,
};
use turnstile_runtime::{Controller, RuntimeError};

pub const PING: EventType = EventType("ping");
pub const PONG: EventType = EventType("pong");

pub const ROUNDS: u32 = 50;

pub struct Pinger {
    rounds: u32,
    played: u32,
    ponger: Option<MachineId>,
}

impl Pinger {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds,
            played: 0,
            ponger: None,
        }
    }

    fn serve(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
        let me = ctx.id();
        let ponger = ctx.create(Ponger { pinger: me, returned: 0 }, None)?;
        self.ponger = Some(ponger);
        ctx.send(ponger, PING);
        Ok(())
    }

    fn pong(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        self.played += 1;
        let Some(ponger) = self.ponger else {
            return ctx.assert(false, "pong before the ponger exists");
        };
        if self.played == self.rounds {
            ctx.send(ponger, Event::halt());
            ctx.halt();
        } else {
            ctx.send(ponger, PING);
        }
        Ok(())
    }
}

impl Machine for Pinger {
    fn states() -> StateTable<Self> {
        StateTable::new("Pinger", "Playing").state(
            State::new("Playing")
                .on_entry(Pinger::serve)
                .on_event(PONG, Pinger::pong),
        )
    }

    fn progress_hash(&self) -> Option<u64> {
        Some(u64::from(self.played))
    }
}

pub struct Ponger {
    pinger: MachineId,
    returned: u32,
}

impl Ponger {
    fn ping(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        self.returned += 1;
        ctx.send(self.pinger, PONG);
        Ok(())
    }
}

impl Machine for Ponger {
    fn states() -> StateTable<Self> {
        StateTable::new("Ponger", "Returning")
            .state(State::new("Returning").on_event(PING, Ponger::ping))
    }

    fn progress_hash(&self) -> Option<u64> {
        Some(u64::from(self.returned))
    }
}

pub fn program(c: &mut Controller<'_>) -> Result<(), RuntimeError> {
    c.create(Pinger::new(ROUNDS), None)?;
    Ok(())
}
