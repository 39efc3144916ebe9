//! Declarative state tables.
//!
//! A machine type declares its states once, as a [`StateTable`]. Each
//! [`State`] maps event types to a [`Transition`] and lists the types it
//! ignores or defers. At runtime a machine keeps a stack of state names;
//! handler lookup walks that stack top-down through [`StateTable::resolve`].

use crate::context::{Action, EntryAction};
use crate::event::EventType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors detected when a state table is registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("machine {machine}: start state '{state}' is not declared")]
    UnknownStartState {
        machine: &'static str,
        state: &'static str,
    },

    #[error("machine {machine}: state '{state}' on '{event}' targets undeclared state '{target}'")]
    UnknownTarget {
        machine: &'static str,
        state: &'static str,
        event: EventType,
        target: &'static str,
    },

    #[error("machine {machine}: state '{state}' declared more than once")]
    DuplicateState {
        machine: &'static str,
        state: &'static str,
    },

    #[error("machine {machine}: state '{state}' declares '{event}' with conflicting dispositions")]
    ConflictingDeclaration {
        machine: &'static str,
        state: &'static str,
        event: EventType,
    },

    #[error("registry holds a table of a different type for {machine}")]
    TypeMismatch { machine: &'static str },
}

/// What a handled event does.
pub enum Transition<M> {
    /// Exit the current state, clear the stack, enter the target.
    Goto(&'static str),
    /// Enter the target on top of the current stack.
    Push(&'static str),
    /// Run an action; the action may itself request a transition.
    Do(Action<M>),
}

impl<M> Clone for Transition<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Transition<M> {}

impl<M> std::fmt::Debug for Transition<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Goto(s) => write!(f, "Goto({s})"),
            Transition::Push(s) => write!(f, "Push({s})"),
            Transition::Do(_) => f.write_str("Do(..)"),
        }
    }
}

/// Result of resolving an event type against a state stack.
#[derive(Debug)]
pub enum Disposition<M> {
    Handle {
        /// State whose declaration matched.
        state: &'static str,
        transition: Transition<M>,
    },
    Ignore {
        state: &'static str,
    },
    Defer {
        state: &'static str,
    },
    Unhandled,
}

impl<M> Disposition<M> {
    pub fn is_defer(&self) -> bool {
        matches!(self, Disposition::Defer { .. })
    }
}

/// One state of a machine type.
pub struct State<M> {
    name: &'static str,
    entry: Option<EntryAction<M>>,
    exit: Option<EntryAction<M>>,
    transitions: BTreeMap<EventType, Transition<M>>,
    ignored: BTreeSet<EventType>,
    deferred: BTreeSet<EventType>,
    conflicts: Vec<EventType>,
}

impl<M> State<M> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entry: None,
            exit: None,
            transitions: BTreeMap::new(),
            ignored: BTreeSet::new(),
            deferred: BTreeSet::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn on_entry(mut self, action: EntryAction<M>) -> Self {
        self.entry = Some(action);
        self
    }

    pub fn on_exit(mut self, action: EntryAction<M>) -> Self {
        self.exit = Some(action);
        self
    }

    pub fn goto(self, event: EventType, target: &'static str) -> Self {
        self.bind(event, Transition::Goto(target))
    }

    pub fn push(self, event: EventType, target: &'static str) -> Self {
        self.bind(event, Transition::Push(target))
    }

    pub fn on_event(self, event: EventType, action: Action<M>) -> Self {
        self.bind(event, Transition::Do(action))
    }

    pub fn ignore(mut self, event: EventType) -> Self {
        if self.declares(event) {
            self.conflicts.push(event);
        }
        self.ignored.insert(event);
        self
    }

    pub fn defer(mut self, event: EventType) -> Self {
        if self.declares(event) {
            self.conflicts.push(event);
        }
        self.deferred.insert(event);
        self
    }

    fn bind(mut self, event: EventType, transition: Transition<M>) -> Self {
        if self.declares(event) {
            self.conflicts.push(event);
        }
        self.transitions.insert(event, transition);
        self
    }

    fn declares(&self, event: EventType) -> bool {
        self.transitions.contains_key(&event)
            || self.ignored.contains(&event)
            || self.deferred.contains(&event)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entry(&self) -> Option<EntryAction<M>> {
        self.entry
    }

    pub fn exit(&self) -> Option<EntryAction<M>> {
        self.exit
    }

    /// Disposition declared by this frame alone. Exact types win over the
    /// wildcard.
    fn lookup(&self, event: EventType) -> Option<Disposition<M>> {
        self.lookup_exact(event)
            .or_else(|| self.lookup_exact(EventType::WILDCARD))
    }

    fn lookup_exact(&self, event: EventType) -> Option<Disposition<M>> {
        let state = self.name;
        if let Some(transition) = self.transitions.get(&event) {
            Some(Disposition::Handle {
                state,
                transition: *transition,
            })
        } else if self.ignored.contains(&event) {
            Some(Disposition::Ignore { state })
        } else if self.deferred.contains(&event) {
            Some(Disposition::Defer { state })
        } else {
            None
        }
    }

    /// Every event type this state mentions.
    pub fn declared_events(&self) -> impl Iterator<Item = EventType> + '_ {
        self.transitions
            .keys()
            .chain(self.ignored.iter())
            .chain(self.deferred.iter())
            .copied()
    }
}

/// The full set of states of one machine type.
pub struct StateTable<M> {
    machine: &'static str,
    start: &'static str,
    states: BTreeMap<&'static str, State<M>>,
    duplicates: Vec<&'static str>,
}

impl<M> StateTable<M> {
    pub fn new(machine: &'static str, start: &'static str) -> Self {
        Self {
            machine,
            start,
            states: BTreeMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn state(mut self, state: State<M>) -> Self {
        if self.states.contains_key(state.name) {
            self.duplicates.push(state.name);
        }
        self.states.insert(state.name, state);
        self
    }

    pub fn machine_name(&self) -> &'static str {
        self.machine
    }

    pub fn start(&self) -> &'static str {
        self.start
    }

    pub fn get(&self, name: &str) -> Option<&State<M>> {
        self.states.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn states(&self) -> impl Iterator<Item = &State<M>> {
        self.states.values()
    }

    /// Check that every name the table refers to is declared.
    pub fn validate(&self) -> Result<(), ModelError> {
        let machine = self.machine;
        if let Some(&state) = self.duplicates.first() {
            return Err(ModelError::DuplicateState { machine, state });
        }
        if !self.states.contains_key(self.start) {
            return Err(ModelError::UnknownStartState {
                machine,
                state: self.start,
            });
        }
        for state in self.states.values() {
            if let Some(&event) = state.conflicts.first() {
                return Err(ModelError::ConflictingDeclaration {
                    machine,
                    state: state.name,
                    event,
                });
            }
            for (&event, transition) in &state.transitions {
                let target = match transition {
                    Transition::Goto(t) | Transition::Push(t) => *t,
                    Transition::Do(_) => continue,
                };
                if !self.states.contains_key(target) {
                    return Err(ModelError::UnknownTarget {
                        machine,
                        state: state.name,
                        event,
                        target,
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve `event` against a stack of state names, top of stack last.
    /// The first frame that declares the type decides.
    pub fn resolve(&self, stack: &[&'static str], event: EventType) -> Disposition<M> {
        stack
            .iter()
            .rev()
            .filter_map(|name| self.states.get(name))
            .find_map(|state| state.lookup(event))
            .unwrap_or(Disposition::Unhandled)
    }

    /// Read-only description of this table for analysis tools.
    pub fn declaration(&self) -> MachineDeclaration {
        let states = self
            .states
            .values()
            .map(|state| {
                let mut transitions = Vec::new();
                let mut actions = Vec::new();
                for (event, transition) in &state.transitions {
                    match transition {
                        Transition::Goto(t) => transitions.push(TransitionDeclaration {
                            event: event.0.to_string(),
                            kind: TransitionKind::Goto,
                            target: t.to_string(),
                        }),
                        Transition::Push(t) => transitions.push(TransitionDeclaration {
                            event: event.0.to_string(),
                            kind: TransitionKind::Push,
                            target: t.to_string(),
                        }),
                        Transition::Do(_) => actions.push(event.0.to_string()),
                    }
                }
                StateDeclaration {
                    name: state.name.to_string(),
                    has_entry: state.entry.is_some(),
                    has_exit: state.exit.is_some(),
                    transitions,
                    actions,
                    ignored: state.ignored.iter().map(|e| e.0.to_string()).collect(),
                    deferred: state.deferred.iter().map(|e| e.0.to_string()).collect(),
                }
            })
            .collect();
        MachineDeclaration {
            machine: self.machine.to_string(),
            start: self.start.to_string(),
            states,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Goto,
    Push,
    /// Only produced at runtime; tables cannot declare a pop.
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDeclaration {
    pub event: String,
    pub kind: TransitionKind,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDeclaration {
    pub name: String,
    pub has_entry: bool,
    pub has_exit: bool,
    pub transitions: Vec<TransitionDeclaration>,
    /// Event types bound to a do-action.
    pub actions: Vec<String>,
    pub ignored: Vec<String>,
    pub deferred: Vec<String>,
}

/// Serializable snapshot of a registered machine type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDeclaration {
    pub machine: String,
    pub start: String,
    pub states: Vec<StateDeclaration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ActionResult, Context};
    use crate::event::Event;

    const GO: EventType = EventType("go");
    const NEST: EventType = EventType("nest");
    const PING: EventType = EventType("ping");
    const LATER: EventType = EventType("later");

    struct Dummy;

    fn noop(_: &mut Dummy, _: &mut Context<'_, Dummy>, _: &Event) -> ActionResult {
        Ok(())
    }

    fn table() -> StateTable<Dummy> {
        StateTable::new("Dummy", "Outer")
            .state(
                State::new("Outer")
                    .goto(GO, "Done")
                    .push(NEST, "Inner")
                    .on_event(PING, noop),
            )
            .state(State::new("Inner").defer(LATER).ignore(EventType::WILDCARD))
            .state(State::new("Done"))
    }

    #[test]
    fn valid_table_passes() {
        assert_eq!(table().validate(), Ok(()));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let t = StateTable::<Dummy>::new("Dummy", "A").state(State::new("A").goto(GO, "Missing"));
        assert_eq!(
            t.validate(),
            Err(ModelError::UnknownTarget {
                machine: "Dummy",
                state: "A",
                event: GO,
                target: "Missing",
            })
        );
    }

    #[test]
    fn unknown_start_is_rejected() {
        let t = StateTable::<Dummy>::new("Dummy", "Nope").state(State::new("A"));
        assert!(matches!(
            t.validate(),
            Err(ModelError::UnknownStartState { .. })
        ));
    }

    #[test]
    fn duplicate_state_is_rejected() {
        let t = StateTable::<Dummy>::new("Dummy", "A")
            .state(State::new("A"))
            .state(State::new("A"));
        assert!(matches!(t.validate(), Err(ModelError::DuplicateState { .. })));
    }

    #[test]
    fn handle_and_ignore_of_same_type_conflict() {
        let t = StateTable::<Dummy>::new("Dummy", "A").state(State::new("A").goto(GO, "A").ignore(GO));
        assert!(matches!(
            t.validate(),
            Err(ModelError::ConflictingDeclaration { .. })
        ));
    }

    #[test]
    fn resolve_walks_stack_top_down() {
        let t = table();
        // Inner's wildcard ignore shadows Outer's handlers once pushed.
        let d = t.resolve(&["Outer", "Inner"], PING);
        assert!(matches!(d, Disposition::Ignore { state: "Inner" }));
        let d = t.resolve(&["Outer"], PING);
        assert!(matches!(d, Disposition::Handle { state: "Outer", .. }));
    }

    #[test]
    fn exact_beats_wildcard_in_same_frame() {
        let t = table();
        let d = t.resolve(&["Outer", "Inner"], LATER);
        assert!(d.is_defer());
    }

    #[test]
    fn undeclared_event_is_unhandled() {
        let t = table();
        assert!(matches!(t.resolve(&["Done"], GO), Disposition::Unhandled));
    }

    #[test]
    fn declaration_lists_transitions_and_sets() {
        let decl = table().declaration();
        assert_eq!(decl.machine, "Dummy");
        assert_eq!(decl.start, "Outer");
        let outer = decl.states.iter().find(|s| s.name == "Outer").unwrap();
        assert_eq!(outer.transitions.len(), 2);
        assert_eq!(outer.actions, vec!["ping".to_string()]);
        let inner = decl.states.iter().find(|s| s.name == "Inner").unwrap();
        assert_eq!(inner.deferred, vec!["later".to_string()]);
        assert_eq!(inner.ignored, vec!["*".to_string()]);

        let json = serde_json::to_string(&decl).unwrap();
        let back: MachineDeclaration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decl);
    }
}
