//! A hierarchical session protocol.
//!
//! `Idle` pushes `Open` when a session starts. Events `Open` does not
//! declare fall through to the frame beneath: keepalives are ignored by
//! `Idle` whether or not a session is open. A second `open` while one is
//! active is deferred until the current session closes. `close` pops back
//! to `Idle`, and the reserved halt event, unhandled anywhere, stops the
//! machine once the driver is done.

use turnstile_model::{
    ActionError, ActionResult, Context, Event, EventType, Machine, MachineId, State, StateTable,
};
use turnstile_runtime::{Controller, RuntimeError};

pub const OPEN: EventType = EventType("open");
pub const DATA: EventType = EventType("data");
pub const CLOSE: EventType = EventType("close");
pub const KEEPALIVE: EventType = EventType("keepalive");
pub const TICK: EventType = EventType("tick");

#[derive(Default)]
pub struct Session {
    received: u64,
    closed: u64,
}

impl Session {
    fn opened(&mut self, _: &mut Context<'_, Self>) -> ActionResult {
        self.received = 0;
        Ok(())
    }

    fn data(&mut self, _: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        self.received += 1;
        Ok(())
    }

    fn close(&mut self, ctx: &mut Context<'_, Self>, event: &Event) -> ActionResult {
        let expected = event
            .payload::<u64>()
            .copied()
            .ok_or_else(|| ActionError::Other("close without a count".into()))?;
        ctx.assert(
            self.received == expected,
            format!("session saw {} data events, sender sent {}", self.received, expected),
        )?;
        ctx.pop();
        Ok(())
    }

    fn left(&mut self, _: &mut Context<'_, Self>) -> ActionResult {
        self.closed += 1;
        Ok(())
    }
}

impl Machine for Session {
    fn states() -> StateTable<Self> {
        StateTable::new("Session", "Idle")
            .state(State::new("Idle").push(OPEN, "Open").ignore(KEEPALIVE))
            .state(
                State::new("Open")
                    .on_entry(Session::opened)
                    .on_exit(Session::left)
                    .on_event(DATA, Session::data)
                    .on_event(CLOSE, Session::close)
                    .defer(OPEN),
            )
    }

    fn progress_hash(&self) -> Option<u64> {
        Some(self.received ^ (self.closed << 32))
    }
}

/// Runs two sessions back to back, then halts the session machine.
pub struct Driver {
    session: MachineId,
}

impl Driver {
    fn drive(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
        for sent in [2u64, 1] {
            ctx.send(self.session, OPEN);
            for _ in 0..sent {
                ctx.send(self.session, DATA);
            }
            ctx.send(self.session, Event::with_payload(CLOSE, sent));
        }
        ctx.send(self.session, Event::halt());
        ctx.halt();
        Ok(())
    }
}

impl Machine for Driver {
    fn states() -> StateTable<Self> {
        StateTable::new("Driver", "Driving").state(State::new("Driving").on_entry(Driver::drive))
    }
}

/// Sends a few keepalives at arbitrary points of the conversation.
pub struct Heartbeat {
    session: MachineId,
    left: u32,
}

impl Heartbeat {
    fn arm(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
        let me = ctx.id();
        ctx.send(me, TICK);
        Ok(())
    }

    fn tick(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        ctx.send(self.session, KEEPALIVE);
        self.left = self.left.saturating_sub(1);
        if self.left == 0 {
            ctx.halt();
        } else {
            let me = ctx.id();
            ctx.send(me, TICK);
        }
        Ok(())
    }
}

impl Machine for Heartbeat {
    fn states() -> StateTable<Self> {
        StateTable::new("Heartbeat", "Beating").state(
            State::new("Beating")
                .on_entry(Heartbeat::arm)
                .on_event(TICK, Heartbeat::tick),
        )
    }
}

pub fn program(c: &mut Controller<'_>) -> Result<(), RuntimeError> {
    let session = c.create(Session::default(), None)?;
    c.create(Heartbeat { session, left: 3 }, None)?;
    c.create(Driver { session }, None)?;
    Ok(())
}
