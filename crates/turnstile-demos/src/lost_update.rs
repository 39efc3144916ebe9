//! Lost update behind a nondeterministic choice.
//!
//! Each client either asks the store to increment atomically or, on its
//! "fast path", reads the value and writes back value + 1. When both
//! clients take the fast path their reads can interleave, and one
//! increment is lost. The store checks the total once every client is
//! done.

use turnstile_model::{
    ActionError, ActionResult, Context, Event, EventType, Machine, MachineId, State, StateTable,
};
use turnstile_runtime::{Controller, RuntimeError};

pub const READ: EventType = EventType("read");
pub const VALUE: EventType = EventType("value");
pub const WRITE: EventType = EventType("write");
pub const INCREMENT: EventType = EventType("increment");
pub const DONE: EventType = EventType("done");

pub const CLIENTS: u64 = 2;

fn payload<T: Copy + 'static>(event: &Event) -> Result<T, ActionError> {
    event
        .payload::<T>()
        .copied()
        .ok_or_else(|| ActionError::Other(format!("'{}' without payload", event.kind())))
}

#[derive(Default)]
pub struct Store {
    value: u64,
    finished: u64,
}

impl Store {
    fn read(&mut self, ctx: &mut Context<'_, Self>, event: &Event) -> ActionResult {
        let requester: MachineId = payload(event)?;
        ctx.send(requester, Event::with_payload(VALUE, self.value));
        Ok(())
    }

    fn write(&mut self, _: &mut Context<'_, Self>, event: &Event) -> ActionResult {
        self.value = payload(event)?;
        Ok(())
    }

    fn increment(&mut self, _: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        self.value += 1;
        Ok(())
    }

    fn done(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
        self.finished += 1;
        if self.finished == CLIENTS {
            ctx.assert(
                self.value == CLIENTS,
                format!("lost update: {} increments, value {}", CLIENTS, self.value),
            )?;
        }
        Ok(())
    }
}

impl Machine for Store {
    fn states() -> StateTable<Self> {
        StateTable::new("Store", "Serving").state(
            State::new("Serving")
                .on_event(READ, Store::read)
                .on_event(WRITE, Store::write)
                .on_event(INCREMENT, Store::increment)
                .on_event(DONE, Store::done),
        )
    }
}

pub struct Client {
    store: MachineId,
}

impl Client {
    fn begin(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
        if ctx.random_bool()? {
            let me = ctx.id();
            ctx.send(self.store, Event::with_payload(READ, me));
            ctx.goto("Reading");
        } else {
            ctx.send(self.store, INCREMENT);
            ctx.send(self.store, DONE);
            ctx.halt();
        }
        Ok(())
    }

    fn value(&mut self, ctx: &mut Context<'_, Self>, event: &Event) -> ActionResult {
        let value: u64 = payload(event)?;
        ctx.send(self.store, Event::with_payload(WRITE, value + 1));
        ctx.send(self.store, DONE);
        ctx.halt();
        Ok(())
    }
}

impl Machine for Client {
    fn states() -> StateTable<Self> {
        StateTable::new("Client", "Choosing")
            .state(State::new("Choosing").on_entry(Client::begin))
            .state(State::new("Reading").on_event(VALUE, Client::value))
    }
}

pub fn program(c: &mut Controller<'_>) -> Result<(), RuntimeError> {
    let store = c.create(Store::default(), None)?;
    for _ in 0..CLIENTS {
        c.create(Client { store }, None)?;
    }
    Ok(())
}
