//! A status probe that sometimes lands while the server is busy.
//!
//! The server ignores `status` when ready but forgot to declare it for
//! its busy state. Whether the probe arrives before or after the server
//! finishes its work depends on the schedule.

use turnstile_model::{
    ActionError, ActionResult, Context, Event, EventType, Machine, MachineId, State, StateTable,
};
use turnstile_runtime::{Controller, RuntimeError};

pub const REQUEST: EventType = EventType("request");
pub const WORK: EventType = EventType("work");
pub const RESPONSE: EventType = EventType("response");
pub const STATUS: EventType = EventType("status");
pub const TICK: EventType = EventType("tick");

#[derive(Default)]
pub struct Server {
    client: Option<MachineId>,
}

impl Server {
    fn request(&mut self, ctx: &mut Context<'_, Self>, event: &Event) -> ActionResult {
        self.client = event.payload::<MachineId>().copied();
        ctx.goto("Busy");
        Ok(())
    }

    fn start_work(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
        let me = ctx.id();
        ctx.send(me, WORK);
        Ok(())
    }

    fn work(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        let client = self
            .client
            .take()
            .ok_or_else(|| ActionError::Other("work without a client".into()))?;
        ctx.send(client, RESPONSE);
        ctx.goto("Ready");
        Ok(())
    }
}

impl Machine for Server {
    fn states() -> StateTable<Self> {
        StateTable::new("Server", "Ready")
            .state(
                State::new("Ready")
                    .on_event(REQUEST, Server::request)
                    .ignore(STATUS),
            )
            .state(
                State::new("Busy")
                    .on_entry(Server::start_work)
                    .on_event(WORK, Server::work),
            )
    }
}

pub struct Caller {
    server: MachineId,
}

impl Caller {
    fn call(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
        let me = ctx.id();
        ctx.send(self.server, Event::with_payload(REQUEST, me));
        Ok(())
    }
}

impl Machine for Caller {
    fn states() -> StateTable<Self> {
        StateTable::new("Caller", "Waiting")
            .state(State::new("Waiting").on_entry(Caller::call).goto(RESPONSE, "Served"))
            .state(State::new("Served"))
    }
}

pub struct Probe {
    server: MachineId,
}

impl Probe {
    fn arm(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
        let me = ctx.id();
        ctx.send(me, TICK);
        Ok(())
    }

    fn tick(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        ctx.send(self.server, STATUS);
        ctx.halt();
        Ok(())
    }
}

impl Machine for Probe {
    fn states() -> StateTable<Self> {
        StateTable::new("Probe", "Armed")
            .state(State::new("Armed").on_entry(Probe::arm).on_event(TICK, Probe::tick))
    }
}

pub fn program(c: &mut Controller<'_>) -> Result<(), RuntimeError> {
    let server = c.create(Server::default(), None)?;
    c.create(Caller { server }, None)?;
    c.create(Probe { server }, None)?;
    Ok(())
}
