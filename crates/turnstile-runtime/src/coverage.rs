//! Coverage graph for visualizers.
//!
//! Collects the (machine, state) pairs a run discovered, the events each
//! state registers, which of those were actually exercised, and the
//! edges between states: transitions inside a machine and sends between
//! machines. Graphs from several runs can be merged.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use turnstile_model::{EventType, MachineDeclaration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Goto,
    Push,
    Pop,
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub origin_machine: String,
    pub origin_state: String,
    pub target_machine: String,
    pub target_state: String,
    pub label: String,
    pub kind: EdgeKind,
}

/// Per-state event coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCoverage {
    pub machine: String,
    pub state: String,
    pub registered: usize,
    pub exercised: usize,
}

impl StateCoverage {
    pub fn percent(&self) -> f64 {
        percent(self.exercised, self.registered)
    }
}

/// Per-machine-type event coverage, summed over its states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineCoverage {
    pub machine: String,
    pub states_discovered: usize,
    pub states_declared: usize,
    pub registered: usize,
    pub exercised: usize,
}

impl MachineCoverage {
    pub fn percent(&self) -> f64 {
        percent(self.exercised, self.registered)
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        100.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

type StateKey = (String, String);
type EventKey = (String, String, String);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGraph {
    declared_states: BTreeSet<StateKey>,
    discovered: BTreeSet<StateKey>,
    registered: BTreeSet<EventKey>,
    exercised: BTreeSet<EventKey>,
    edges: BTreeSet<Edge>,
}

impl CoverageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the registered (state, event) pairs of a machine type. Deferred
    /// events and wildcard entries are not counted.
    pub fn declare(&mut self, declaration: &MachineDeclaration) {
        let machine = &declaration.machine;
        for state in &declaration.states {
            self.declared_states
                .insert((machine.clone(), state.name.clone()));
            let events = state
                .transitions
                .iter()
                .map(|t| &t.event)
                .chain(state.actions.iter())
                .chain(state.ignored.iter());
            for event in events {
                if event != EventType::WILDCARD.name() {
                    self.registered
                        .insert((machine.clone(), state.name.clone(), event.clone()));
                }
            }
        }
    }

    pub fn discover(&mut self, machine: &str, state: &str) {
        self.discovered.insert((machine.to_string(), state.to_string()));
    }

    pub fn exercise(&mut self, machine: &str, state: &str, event: EventType) {
        self.exercised
            .insert((machine.to_string(), state.to_string(), event.name().to_string()));
    }

    pub fn edge(&mut self, edge: Edge) {
        self.edges.insert(edge);
    }

    pub fn merge(&mut self, other: &CoverageGraph) {
        self.declared_states
            .extend(other.declared_states.iter().cloned());
        self.discovered.extend(other.discovered.iter().cloned());
        self.registered.extend(other.registered.iter().cloned());
        self.exercised.extend(other.exercised.iter().cloned());
        self.edges.extend(other.edges.iter().cloned());
    }

    /// Discovered (machine, state) pairs.
    pub fn states(&self) -> impl Iterator<Item = (&str, &str)> {
        self.discovered.iter().map(|(m, s)| (m.as_str(), s.as_str()))
    }

    /// Registered (machine, state, event) triples.
    pub fn registered_events(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.registered
            .iter()
            .map(|(m, s, e)| (m.as_str(), s.as_str(), e.as_str()))
    }

    pub fn is_exercised(&self, machine: &str, state: &str, event: &str) -> bool {
        self.exercised
            .contains(&(machine.to_string(), state.to_string(), event.to_string()))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn state_coverage(&self) -> Vec<StateCoverage> {
        let mut per_state: BTreeMap<&StateKey, (usize, usize)> = BTreeMap::new();
        for key in &self.declared_states {
            per_state.entry(key).or_default();
        }
        for key in &self.registered {
            let (machine, state_name, _) = key;
            let Some(state) = self
                .declared_states
                .get(&(machine.clone(), state_name.clone()))
            else {
                continue;
            };
            let counts = per_state.entry(state).or_default();
            counts.0 += 1;
            if self.exercised.contains(key) {
                counts.1 += 1;
            }
        }
        per_state
            .into_iter()
            .map(|((machine, state), (registered, exercised))| StateCoverage {
                machine: machine.clone(),
                state: state.clone(),
                registered,
                exercised,
            })
            .collect()
    }

    pub fn machine_coverage(&self) -> Vec<MachineCoverage> {
        let mut per_machine: BTreeMap<String, MachineCoverage> = BTreeMap::new();
        for state in self.state_coverage() {
            let entry = per_machine
                .entry(state.machine.clone())
                .or_insert_with(|| MachineCoverage {
                    machine: state.machine.clone(),
                    states_discovered: 0,
                    states_declared: 0,
                    registered: 0,
                    exercised: 0,
                });
            entry.states_declared += 1;
            if self
                .discovered
                .contains(&(state.machine.clone(), state.state.clone()))
            {
                entry.states_discovered += 1;
            }
            entry.registered += state.registered;
            entry.exercised += state.exercised;
        }
        per_machine.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_model::{StateDeclaration, TransitionDeclaration, TransitionKind};

    fn declaration() -> MachineDeclaration {
        MachineDeclaration {
            machine: "Door".into(),
            start: "Closed".into(),
            states: vec![
                StateDeclaration {
                    name: "Closed".into(),
                    has_entry: false,
                    has_exit: false,
                    transitions: vec![TransitionDeclaration {
                        event: "open".into(),
                        kind: TransitionKind::Goto,
                        target: "Open".into(),
                    }],
                    actions: vec!["knock".into()],
                    ignored: vec!["*".into()],
                    deferred: vec!["close".into()],
                },
                StateDeclaration {
                    name: "Open".into(),
                    has_entry: true,
                    has_exit: false,
                    transitions: vec![TransitionDeclaration {
                        event: "close".into(),
                        kind: TransitionKind::Goto,
                        target: "Closed".into(),
                    }],
                    actions: vec![],
                    ignored: vec![],
                    deferred: vec![],
                },
            ],
        }
    }

    #[test]
    fn declare_skips_wildcard_and_deferred() {
        let mut graph = CoverageGraph::new();
        graph.declare(&declaration());
        let events: Vec<_> = graph.registered_events().collect();
        assert_eq!(
            events,
            vec![
                ("Door", "Closed", "knock"),
                ("Door", "Closed", "open"),
                ("Door", "Open", "close"),
            ]
        );
    }

    #[test]
    fn coverage_percentages() {
        let mut graph = CoverageGraph::new();
        graph.declare(&declaration());
        graph.discover("Door", "Closed");
        graph.exercise("Door", "Closed", EventType("open"));

        let states = graph.state_coverage();
        let closed = states.iter().find(|s| s.state == "Closed").unwrap();
        assert_eq!((closed.registered, closed.exercised), (2, 1));
        assert!((closed.percent() - 50.0).abs() < f64::EPSILON);

        let machines = graph.machine_coverage();
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].states_declared, 2);
        assert_eq!(machines[0].states_discovered, 1);
        assert!((machines[0].percent() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn merge_unions_everything() {
        let mut a = CoverageGraph::new();
        a.discover("Door", "Closed");
        a.edge(Edge {
            origin_machine: "Door".into(),
            origin_state: "Closed".into(),
            target_machine: "Door".into(),
            target_state: "Open".into(),
            label: "open".into(),
            kind: EdgeKind::Goto,
        });
        let mut b = CoverageGraph::new();
        b.discover("Door", "Open");
        b.merge(&a);
        assert_eq!(b.states().count(), 2);
        assert_eq!(b.edges().count(), 1);
    }

    #[test]
    fn serializes_to_json() {
        let mut graph = CoverageGraph::new();
        graph.declare(&declaration());
        graph.discover("Door", "Closed");
        let json = serde_json::to_string(&graph).unwrap();
        let back: CoverageGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);
    }
}
