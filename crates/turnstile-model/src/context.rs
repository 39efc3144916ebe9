//! The handle user actions receive.
//!
//! Actions never touch the runtime directly. Sends and creations are
//! buffered as [`Effect`]s and applied by the runtime after the action
//! returns, nondeterministic choices are forwarded to the [`Host`], and
//! at most one transition command is recorded per action.

use crate::event::{Event, EventType, MachineId};
use crate::instance::{Effect, MachineInstance};
use crate::machine::Machine;
use crate::registry::Registry;
use crate::state::ModelError;
use thiserror::Error;

pub type ActionResult = Result<(), ActionError>;

/// Handler bound to an event type.
pub type Action<M> = fn(&mut M, &mut Context<'_, M>, &Event) -> ActionResult;

/// Entry or exit action of a state.
pub type EntryAction<M> = fn(&mut M, &mut Context<'_, M>) -> ActionResult;

/// Errors returned from user actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// The runtime refused a request (for example a replayed choice no
    /// longer matches). The runtime already knows the cause.
    #[error("interrupted by runtime: {0}")]
    Interrupted(String),

    #[error("{0}")]
    Other(String),
}

/// Services a runtime provides to machines while they run.
pub trait Host {
    fn registry(&self) -> &Registry;

    /// Reserve an identifier for a new machine of `machine_type`.
    fn allocate(
        &mut self,
        creator: Option<MachineId>,
        machine_type: &'static str,
    ) -> Result<MachineId, ActionError>;

    fn random_bool(&mut self, caller: MachineId) -> Result<bool, ActionError>;

    /// A value in `0..bound`.
    fn random_integer(&mut self, caller: MachineId, bound: u64) -> Result<u64, ActionError>;
}

/// Transition requested by an action.
pub(crate) enum Command<M> {
    Goto(&'static str),
    Push(&'static str),
    Pop,
    Raise(Event),
    Halt,
    Receive {
        patterns: Vec<EventType>,
        then: Action<M>,
    },
}

impl<M> Command<M> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Goto(_) => "goto",
            Command::Push(_) => "push",
            Command::Pop => "pop",
            Command::Raise(_) => "raise",
            Command::Halt => "halt",
            Command::Receive { .. } => "receive",
        }
    }
}

pub struct Context<'a, M> {
    id: MachineId,
    state: &'static str,
    received: Option<Event>,
    host: &'a mut dyn Host,
    pub(crate) effects: Vec<Effect>,
    pub(crate) command: Option<Command<M>>,
    pub(crate) conflict: Option<(&'static str, &'static str)>,
}

impl<'a, M: Machine> Context<'a, M> {
    pub(crate) fn new(
        id: MachineId,
        state: &'static str,
        received: Option<Event>,
        host: &'a mut dyn Host,
    ) -> Self {
        Self {
            id,
            state,
            received,
            host,
            effects: Vec::new(),
            command: None,
            conflict: None,
        }
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    /// Name of the state whose action is running.
    pub fn state(&self) -> &'static str {
        self.state
    }

    /// The event that led to this action. For the start state's entry
    /// action this is the creation payload, if any.
    pub fn received(&self) -> Option<&Event> {
        self.received.as_ref()
    }

    /// Enqueue `event` on `target`. Never blocks.
    pub fn send(&mut self, target: MachineId, event: impl Into<Event>) {
        self.effects.push(Effect::Send {
            target,
            event: event.into(),
        });
    }

    /// Create a machine. Its start state is entered after the current
    /// action completes; `initial` is visible to that entry action.
    pub fn create<N: Machine>(
        &mut self,
        machine: N,
        initial: Option<Event>,
    ) -> Result<MachineId, ActionError> {
        let table = self.host.registry().table::<N>()?;
        let id = self.host.allocate(Some(self.id), table.machine_name())?;
        let instance = MachineInstance::new(id, machine, table, initial);
        self.effects.push(Effect::Create {
            machine: Box::new(instance),
        });
        Ok(id)
    }

    pub fn random_bool(&mut self) -> Result<bool, ActionError> {
        self.host.random_bool(self.id)
    }

    pub fn random_integer(&mut self, bound: u64) -> Result<u64, ActionError> {
        self.host.random_integer(self.id, bound)
    }

    pub fn assert(&self, condition: bool, message: impl Into<String>) -> ActionResult {
        if condition {
            Ok(())
        } else {
            Err(ActionError::Assertion(message.into()))
        }
    }

    pub fn goto(&mut self, state: &'static str) {
        self.issue(Command::Goto(state));
    }

    pub fn push(&mut self, state: &'static str) {
        self.issue(Command::Push(state));
    }

    pub fn pop(&mut self) {
        self.issue(Command::Pop);
    }

    /// Handle `event` immediately, before anything in the mailbox.
    pub fn raise(&mut self, event: impl Into<Event>) {
        self.issue(Command::Raise(event.into()));
    }

    pub fn halt(&mut self) {
        self.issue(Command::Halt);
    }

    /// Suspend until an event matching one of `patterns` arrives, then run
    /// `then` with it. Other events stay queued meanwhile.
    pub fn receive(&mut self, patterns: &[EventType], then: Action<M>) {
        self.issue(Command::Receive {
            patterns: patterns.to_vec(),
            then,
        });
    }

    fn issue(&mut self, command: Command<M>) {
        match &self.command {
            Some(existing) => {
                if self.conflict.is_none() {
                    self.conflict = Some((existing.name(), command.name()));
                }
            }
            None => self.command = Some(command),
        }
    }
}
