//! A running machine: data, state stack and mailbox.
//!
//! [`MachineInstance`] executes one scheduling step at a time. It never
//! applies its own side effects; sends and creations come back to the
//! runtime in a [`StepReport`] and are applied in program order.

use crate::context::{Action, ActionError, Command, Context, EntryAction, Host};
use crate::event::{Event, EventType, MachineId};
use crate::machine::{Machine, Status};
use crate::mailbox::Mailbox;
use crate::state::{Disposition, ModelError, StateTable, Transition, TransitionKind};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Where a fault happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultSite {
    pub machine: MachineId,
    pub machine_type: &'static str,
    pub state: &'static str,
}

impl fmt::Display for FaultSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) in state '{}'",
            self.machine, self.machine_type, self.state
        )
    }
}

/// A fault raised while a machine was stepping. Fatal to the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineFault {
    #[error("{site}: unhandled event '{event}'")]
    UnhandledEvent { site: FaultSite, event: EventType },

    #[error("{site}: assertion failed: {message}")]
    Assertion { site: FaultSite, message: String },

    #[error("{site}: action failed: {message}")]
    Action { site: FaultSite, message: String },

    #[error("{site}: {error}")]
    Model { site: FaultSite, error: ModelError },

    #[error("{site}: pop would empty the state stack")]
    StackUnderflow { site: FaultSite },

    #[error("{site}: no state named '{target}'")]
    UnknownState {
        site: FaultSite,
        target: &'static str,
    },

    #[error("{site}: action issued both '{first}' and '{second}'")]
    ConflictingCommands {
        site: FaultSite,
        first: &'static str,
        second: &'static str,
    },

    #[error("{site}: '{command}' is not allowed in an exit action")]
    CommandInExit {
        site: FaultSite,
        command: &'static str,
    },

    #[error("{site}: interrupted: {message}")]
    Interrupted { site: FaultSite, message: String },

    #[error("{site}: stepped while not enabled")]
    NotEnabled { site: FaultSite },
}

impl MachineFault {
    pub fn site(&self) -> &FaultSite {
        match self {
            MachineFault::UnhandledEvent { site, .. }
            | MachineFault::Assertion { site, .. }
            | MachineFault::Action { site, .. }
            | MachineFault::Model { site, .. }
            | MachineFault::StackUnderflow { site }
            | MachineFault::UnknownState { site, .. }
            | MachineFault::ConflictingCommands { site, .. }
            | MachineFault::CommandInExit { site, .. }
            | MachineFault::Interrupted { site, .. }
            | MachineFault::NotEnabled { site } => site,
        }
    }
}

/// Side effect produced by an action, applied by the runtime.
pub enum Effect {
    Send { target: MachineId, event: Event },
    Create { machine: Box<dyn DynMachine> },
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Send { target, event } => f
                .debug_struct("Send")
                .field("target", target)
                .field("event", event)
                .finish(),
            Effect::Create { machine } => f
                .debug_struct("Create")
                .field("id", &machine.id())
                .field("type", &machine.type_name())
                .finish(),
        }
    }
}

/// A state change observed during a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub from: &'static str,
    pub to: &'static str,
    pub kind: TransitionKind,
    pub event: Option<EventType>,
}

/// An event that reached a declared handler or ignore entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledEvent {
    /// State whose declaration matched (may sit below the top of stack).
    pub state: &'static str,
    pub event: EventType,
}

/// Everything observable about one step.
#[derive(Debug, Default)]
pub struct StepReport {
    /// Event taken from the mailbox, if the step dequeued one.
    pub event: Option<EventType>,
    pub effects: Vec<Effect>,
    pub transitions: Vec<TransitionRecord>,
    pub handled: Vec<HandledEvent>,
    pub halted: bool,
    /// Events discarded when the machine halted.
    pub dropped: usize,
}

/// Object-safe view of a machine instance, used by runtimes.
pub trait DynMachine: Send {
    fn id(&self) -> MachineId;
    fn type_name(&self) -> &'static str;
    fn status(&self) -> Status;
    fn is_started(&self) -> bool;

    /// Enter the start state.
    fn start(&mut self, host: &mut dyn Host) -> Result<StepReport, MachineFault>;

    /// Queue an event. Returns false if the machine has halted and the
    /// event was dropped.
    fn enqueue(&mut self, event: Event) -> bool;

    /// Dequeue one event and run it to completion.
    fn step(&mut self, host: &mut dyn Host) -> Result<StepReport, MachineFault>;

    /// Can [`DynMachine::step`] make progress right now?
    fn is_enabled(&self) -> bool;

    /// Suspended in a selective receive.
    fn is_receiving(&self) -> bool;

    /// Active, not enabled, but waiting on something: a receive, or a
    /// mailbox holding only deferred events.
    fn is_blocked(&self) -> bool;

    fn current_state(&self) -> &'static str;
    fn stack(&self) -> Vec<&'static str>;
    fn mailbox_kinds(&self) -> Vec<EventType>;
    fn progress_hash(&self) -> Option<u64>;
}

struct Waiting<M> {
    patterns: Vec<EventType>,
    then: Action<M>,
}

pub struct MachineInstance<M: Machine> {
    id: MachineId,
    machine: M,
    table: Arc<StateTable<M>>,
    stack: Vec<&'static str>,
    mailbox: Mailbox,
    status: Status,
    started: bool,
    initial: Option<Event>,
    waiting: Option<Waiting<M>>,
}

impl<M: Machine> MachineInstance<M> {
    pub fn new(
        id: MachineId,
        machine: M,
        table: Arc<StateTable<M>>,
        initial: Option<Event>,
    ) -> Self {
        let start = table.start();
        Self {
            id,
            machine,
            table,
            stack: vec![start],
            mailbox: Mailbox::new(),
            status: Status::Active,
            started: false,
            initial,
            waiting: None,
        }
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    fn top(&self) -> &'static str {
        self.stack.last().copied().unwrap_or_else(|| self.table.start())
    }

    fn site(&self) -> FaultSite {
        FaultSite {
            machine: self.id,
            machine_type: self.table.machine_name(),
            state: self.top(),
        }
    }

    fn action_fault(&self, error: ActionError) -> MachineFault {
        let site = self.site();
        match error {
            ActionError::Assertion(message) => MachineFault::Assertion { site, message },
            ActionError::Model(error) => MachineFault::Model { site, error },
            ActionError::Interrupted(message) => MachineFault::Interrupted { site, message },
            ActionError::Other(message) => MachineFault::Action { site, message },
        }
    }

    /// Run one user action and collect what it asked for.
    fn invoke(
        &mut self,
        host: &mut dyn Host,
        received: Option<Event>,
        report: &mut StepReport,
        action: impl FnOnce(&mut M, &mut Context<'_, M>) -> Result<(), ActionError>,
    ) -> Result<Option<Command<M>>, MachineFault> {
        let mut ctx = Context::new(self.id, self.top(), received, host);
        let result = action(&mut self.machine, &mut ctx);
        report.effects.append(&mut ctx.effects);
        let command = ctx.command.take();
        let conflict = ctx.conflict;
        result.map_err(|e| self.action_fault(e))?;
        if let Some((first, second)) = conflict {
            return Err(MachineFault::ConflictingCommands {
                site: self.site(),
                first,
                second,
            });
        }
        Ok(command)
    }

    fn run_entry(
        &mut self,
        host: &mut dyn Host,
        received: Option<Event>,
        report: &mut StepReport,
    ) -> Result<Option<Command<M>>, MachineFault> {
        let entry: Option<EntryAction<M>> = self.table.get(self.top()).and_then(|s| s.entry());
        match entry {
            Some(entry) => self.invoke(host, received, report, entry),
            None => Ok(None),
        }
    }

    fn run_exit(&mut self, host: &mut dyn Host, report: &mut StepReport) -> Result<(), MachineFault> {
        let exit: Option<EntryAction<M>> = self.table.get(self.top()).and_then(|s| s.exit());
        if let Some(exit) = exit {
            if let Some(command) = self.invoke(host, None, report, exit)? {
                return Err(MachineFault::CommandInExit {
                    site: self.site(),
                    command: command.name(),
                });
            }
        }
        Ok(())
    }

    fn check_target(&self, target: &'static str) -> Result<(), MachineFault> {
        if self.table.contains(target) {
            Ok(())
        } else {
            Err(MachineFault::UnknownState {
                site: self.site(),
                target,
            })
        }
    }

    /// Execute commands until an action finishes without issuing one.
    fn follow(
        &mut self,
        host: &mut dyn Host,
        mut command: Option<Command<M>>,
        trigger: Option<Event>,
        report: &mut StepReport,
    ) -> Result<(), MachineFault> {
        let label = trigger.as_ref().map(Event::kind);
        while let Some(next) = command.take() {
            if self.status == Status::Halted {
                break;
            }
            command = match next {
                Command::Goto(target) => {
                    self.check_target(target)?;
                    let from = self.top();
                    self.run_exit(host, report)?;
                    self.stack.clear();
                    self.stack.push(target);
                    report.transitions.push(TransitionRecord {
                        from,
                        to: target,
                        kind: TransitionKind::Goto,
                        event: label,
                    });
                    self.run_entry(host, trigger.clone(), report)?
                }
                Command::Push(target) => {
                    self.check_target(target)?;
                    let from = self.top();
                    self.stack.push(target);
                    report.transitions.push(TransitionRecord {
                        from,
                        to: target,
                        kind: TransitionKind::Push,
                        event: label,
                    });
                    self.run_entry(host, trigger.clone(), report)?
                }
                Command::Pop => {
                    if self.stack.len() <= 1 {
                        return Err(MachineFault::StackUnderflow { site: self.site() });
                    }
                    let from = self.top();
                    self.run_exit(host, report)?;
                    self.stack.pop();
                    report.transitions.push(TransitionRecord {
                        from,
                        to: self.top(),
                        kind: TransitionKind::Pop,
                        event: label,
                    });
                    None
                }
                Command::Raise(event) => {
                    self.dispatch(host, event, report)?;
                    None
                }
                Command::Halt => {
                    self.halt_now(report);
                    None
                }
                Command::Receive { patterns, then } => {
                    self.waiting = Some(Waiting { patterns, then });
                    None
                }
            };
        }
        Ok(())
    }

    /// Resolve an event against the stack and run its handler.
    fn dispatch(
        &mut self,
        host: &mut dyn Host,
        event: Event,
        report: &mut StepReport,
    ) -> Result<(), MachineFault> {
        let kind = event.kind();
        match self.table.resolve(&self.stack, kind) {
            Disposition::Handle { state, transition } => {
                report.handled.push(HandledEvent { state, event: kind });
                let command = match transition {
                    Transition::Goto(target) => Some(Command::Goto(target)),
                    Transition::Push(target) => Some(Command::Push(target)),
                    Transition::Do(action) => self.invoke(
                        host,
                        Some(event.clone()),
                        report,
                        |machine, ctx| action(machine, ctx, &event),
                    )?,
                };
                self.follow(host, command, Some(event), report)
            }
            Disposition::Ignore { state } => {
                log::trace!("{} ignored '{}' in {}", self.id, kind, state);
                report.handled.push(HandledEvent { state, event: kind });
                Ok(())
            }
            Disposition::Defer { .. } => {
                // Only a raised event can get here; park it for later.
                self.mailbox.push_front(event);
                Ok(())
            }
            Disposition::Unhandled if kind == EventType::HALT => {
                self.halt_now(report);
                Ok(())
            }
            Disposition::Unhandled => Err(MachineFault::UnhandledEvent {
                site: self.site(),
                event: kind,
            }),
        }
    }

    fn halt_now(&mut self, report: &mut StepReport) {
        self.status = Status::Halted;
        self.waiting = None;
        report.dropped += self.mailbox.clear();
        report.halted = true;
        log::debug!("{} halted in {}", self.id, self.top());
    }

    /// A pending halt request also wakes a receiving machine.
    fn waiting_matches(&self) -> bool {
        match &self.waiting {
            Some(w) => self.mailbox.contains(|kind| {
                kind == EventType::HALT || w.patterns.iter().any(|p| p.matches(kind))
            }),
            None => false,
        }
    }

    fn has_deliverable(&self) -> bool {
        let table = &self.table;
        let stack = &self.stack;
        self.mailbox
            .contains(|kind| !table.resolve(stack, kind).is_defer())
    }
}

impl<M: Machine> DynMachine for MachineInstance<M> {
    fn id(&self) -> MachineId {
        self.id
    }

    fn type_name(&self) -> &'static str {
        self.table.machine_name()
    }

    fn status(&self) -> Status {
        self.status
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn start(&mut self, host: &mut dyn Host) -> Result<StepReport, MachineFault> {
        let mut report = StepReport::default();
        if self.started {
            return Ok(report);
        }
        self.started = true;
        let initial = self.initial.take();
        let command = self.run_entry(host, initial.clone(), &mut report)?;
        self.follow(host, command, initial, &mut report)?;
        Ok(report)
    }

    fn enqueue(&mut self, event: Event) -> bool {
        if self.status == Status::Halted {
            return false;
        }
        self.mailbox.push(event);
        true
    }

    fn step(&mut self, host: &mut dyn Host) -> Result<StepReport, MachineFault> {
        let mut report = StepReport::default();
        if !self.is_enabled() {
            return Err(MachineFault::NotEnabled { site: self.site() });
        }

        if let Some(waiting) = self.waiting.take() {
            let event = self.mailbox.dequeue_first(|kind| {
                kind == EventType::HALT || waiting.patterns.iter().any(|p| p.matches(kind))
            });
            let Some(event) = event else {
                self.waiting = Some(waiting);
                return Err(MachineFault::NotEnabled { site: self.site() });
            };
            report.event = Some(event.kind());
            if !waiting.patterns.iter().any(|p| p.matches(event.kind())) {
                self.halt_now(&mut report);
                return Ok(report);
            }
            let then = waiting.then;
            let command = self.invoke(host, Some(event.clone()), &mut report, |machine, ctx| {
                then(machine, ctx, &event)
            })?;
            self.follow(host, command, Some(event), &mut report)?;
        } else {
            let table = &self.table;
            let stack = &self.stack;
            let event = self
                .mailbox
                .dequeue_first(|kind| !table.resolve(stack, kind).is_defer());
            let Some(event) = event else {
                return Err(MachineFault::NotEnabled { site: self.site() });
            };
            report.event = Some(event.kind());
            self.dispatch(host, event, &mut report)?;
        }

        report.halted = self.status == Status::Halted;
        Ok(report)
    }

    fn is_enabled(&self) -> bool {
        if self.status != Status::Active || !self.started {
            return false;
        }
        if self.waiting.is_some() {
            self.waiting_matches()
        } else {
            self.has_deliverable()
        }
    }

    fn is_receiving(&self) -> bool {
        self.status == Status::Active && self.waiting.is_some()
    }

    fn is_blocked(&self) -> bool {
        self.status == Status::Active
            && self.started
            && !self.is_enabled()
            && (self.waiting.is_some() || !self.mailbox.is_empty())
    }

    fn current_state(&self) -> &'static str {
        self.top()
    }

    fn stack(&self) -> Vec<&'static str> {
        self.stack.clone()
    }

    fn mailbox_kinds(&self) -> Vec<EventType> {
        self.mailbox.kinds()
    }

    fn progress_hash(&self) -> Option<u64> {
        self.machine.progress_hash()
    }
}
