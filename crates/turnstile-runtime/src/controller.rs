//! Controlled execution.
//!
//! The [`Controller`] owns every machine of one run and lets exactly one
//! of them execute between consecutive scheduling points. At each point
//! it asks the [`SchedulingStrategy`] for a decision, appends the
//! decision to the [`TraceLog`] and enacts it.
//!
//! ```text
//!   start pending machines
//!          │
//!          ▼
//!   enabled set ──empty──▶ blocked? ──yes──▶ Deadlock
//!          │                   └─────no────▶ Completed
//!          ▼
//!   step bound? ──repeat seen──▶ LivenessViolation
//!          │         └──otherwise──▶ BoundReached
//!          │
//!          ▼
//!   strategy.next_machine ─▶ record Schedule ─▶ step ─▶ apply effects
//!          ▲                                              │
//!          └──────────── liveness sample ◀────────────────┘
//! ```

use crate::config::RuntimeConfig;
use crate::coverage::{CoverageGraph, Edge, EdgeKind};
use crate::error::RuntimeError;
use crate::liveness::{self, LivenessMonitor};
use crate::outcome::{MachineSummary, Outcome, RunReport};
use crate::strategy::{SchedulingStrategy, StrategyError};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use turnstile_model::{
    ActionError, DynMachine, Effect, Event, Host, Machine, MachineFault, MachineId,
    MachineInstance, Registry, Status, StepReport, TransitionKind,
};
use turnstile_trace::{PointKind, TraceLog};

/// Strategy, trace and id allocation: everything machines reach through
/// [`Host`] while they hold the turn.
struct Gate<'s> {
    strategy: &'s mut dyn SchedulingStrategy,
    registry: Registry,
    trace: TraceLog,
    next_id: u64,
    error: Option<StrategyError>,
    internal: Option<String>,
}

impl Gate<'_> {
    fn interrupt(&mut self, error: StrategyError) -> ActionError {
        let message = error.to_string();
        self.error.get_or_insert(error);
        ActionError::Interrupted(message)
    }

    /// Record a point the program forces and let the strategy check it.
    fn forced(&mut self, kind: PointKind, value: u64) {
        self.trace.record(kind, value);
        if let Err(error) = self.strategy.observe(kind, value) {
            self.error.get_or_insert(error);
        }
    }

    fn allocate_id(&mut self, creator: Option<MachineId>, machine_type: &'static str) -> MachineId {
        let id = MachineId(self.next_id);
        self.next_id += 1;
        match creator {
            Some(creator) => log::debug!("{} creates {} ({})", creator, id, machine_type),
            None => log::debug!("harness creates {} ({})", id, machine_type),
        }
        self.forced(PointKind::Create, id.0);
        id
    }
}

impl Host for Gate<'_> {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn allocate(
        &mut self,
        creator: Option<MachineId>,
        machine_type: &'static str,
    ) -> Result<MachineId, ActionError> {
        let id = self.allocate_id(creator, machine_type);
        match &self.error {
            Some(error) => Err(ActionError::Interrupted(error.to_string())),
            None => Ok(id),
        }
    }

    fn random_bool(&mut self, caller: MachineId) -> Result<bool, ActionError> {
        let value = self
            .strategy
            .next_bool(caller)
            .map_err(|e| self.interrupt(e))?;
        self.trace.record(PointKind::Bool, u64::from(value));
        Ok(value)
    }

    fn random_integer(&mut self, caller: MachineId, bound: u64) -> Result<u64, ActionError> {
        if bound == 0 {
            return Err(ActionError::Other(
                "random_integer needs a positive bound".to_string(),
            ));
        }
        let value = self
            .strategy
            .next_integer(caller, bound)
            .map_err(|e| self.interrupt(e))?;
        if value >= bound {
            let message = format!(
                "strategy {} answered {} for a choice below {}",
                self.strategy.name(),
                value,
                bound
            );
            self.internal.get_or_insert(message.clone());
            return Err(ActionError::Interrupted(message));
        }
        self.trace.record(PointKind::Integer, value);
        Ok(value)
    }
}

/// Why the run loop stopped.
struct Stop {
    outcome: Outcome,
    detail: Option<String>,
    fault: Option<MachineFault>,
}

impl Stop {
    fn new(outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: Some(detail.into()),
            fault: None,
        }
    }

    fn completed() -> Self {
        Self {
            outcome: Outcome::Completed,
            detail: None,
            fault: None,
        }
    }

    fn strategy(error: StrategyError) -> Self {
        let outcome = if error.is_divergence() {
            Outcome::ReplayDivergence
        } else {
            Outcome::Internal
        };
        Self::new(outcome, error.to_string())
    }
}

/// One controlled run. Create the initial machines, then call
/// [`Controller::run`].
pub struct Controller<'s> {
    gate: Gate<'s>,
    config: RuntimeConfig,
    machines: BTreeMap<MachineId, Box<dyn DynMachine>>,
    pending_start: VecDeque<MachineId>,
    current: Option<MachineId>,
    steps: u64,
    coverage: CoverageGraph,
    liveness: LivenessMonitor,
}

impl<'s> Controller<'s> {
    pub fn new(strategy: &'s mut dyn SchedulingStrategy, config: RuntimeConfig) -> Self {
        Self::with_registry(strategy, config, Registry::new())
    }

    /// Share a registry across runs so tables are validated once.
    pub fn with_registry(
        strategy: &'s mut dyn SchedulingStrategy,
        config: RuntimeConfig,
        registry: Registry,
    ) -> Self {
        Self {
            gate: Gate {
                strategy,
                registry,
                trace: TraceLog::new(),
                next_id: 0,
                error: None,
                internal: None,
            },
            liveness: LivenessMonitor::new(config.liveness.clone()),
            config,
            machines: BTreeMap::new(),
            pending_start: VecDeque::new(),
            current: None,
            steps: 0,
            coverage: CoverageGraph::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.gate.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Create a machine from the harness. This is a scheduling point; the
    /// machine's start state is entered when the run begins.
    pub fn create<M: Machine>(
        &mut self,
        machine: M,
        initial: Option<Event>,
    ) -> Result<MachineId, RuntimeError> {
        let table = self.gate.registry.table::<M>()?;
        let id = self.gate.allocate_id(None, table.machine_name());
        self.adopt(Box::new(MachineInstance::new(id, machine, table, initial)));
        Ok(id)
    }

    /// Send from the harness.
    pub fn send(&mut self, target: MachineId, event: impl Into<Event>) {
        self.deliver(None, target, event.into());
    }

    pub fn state_of(&self, id: MachineId) -> Option<&'static str> {
        self.machines.get(&id).map(|m| m.current_state())
    }

    pub fn stack_of(&self, id: MachineId) -> Option<Vec<&'static str>> {
        self.machines.get(&id).map(|m| m.stack())
    }

    pub fn status_of(&self, id: MachineId) -> Option<Status> {
        self.machines.get(&id).map(|m| m.status())
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn trace(&self) -> &TraceLog {
        &self.gate.trace
    }

    pub fn run(mut self) -> RunReport {
        let stop = self.drive();
        match stop.outcome {
            Outcome::Completed | Outcome::BoundReached => {
                log::debug!("run {} after {} steps", stop.outcome, self.steps)
            }
            Outcome::Internal => log::error!(
                "internal error after {} steps: {}",
                self.steps,
                stop.detail.as_deref().unwrap_or("")
            ),
            outcome => log::info!(
                "{} after {} steps: {}",
                outcome,
                self.steps,
                stop.detail.as_deref().unwrap_or("")
            ),
        }
        let machines = self
            .machines
            .values()
            .map(|m| summarize(m.as_ref()))
            .collect();
        RunReport {
            outcome: stop.outcome,
            detail: stop.detail,
            fault: stop.fault,
            trace: self.gate.trace,
            steps: self.steps,
            machines,
            coverage: self.coverage,
        }
    }

    fn drive(&mut self) -> Stop {
        loop {
            if let Some(stop) = self.start_pending() {
                return stop;
            }
            if let Some(stop) = self.gate_stop() {
                return stop;
            }

            let enabled = self.enabled();
            if enabled.is_empty() {
                return self.quiescent();
            }
            if self.steps >= self.config.max_steps {
                return self.bound_reached();
            }

            let chosen = match self
                .gate
                .strategy
                .next_machine(&enabled, self.current, self.steps)
            {
                Ok(id) => id,
                Err(error) => return Stop::strategy(error),
            };
            if enabled.binary_search(&chosen).is_err() {
                return Stop::new(
                    Outcome::Internal,
                    format!(
                        "strategy {} chose {}, which is not enabled",
                        self.gate.strategy.name(),
                        chosen
                    ),
                );
            }
            self.gate.trace.record(PointKind::Schedule, chosen.0);
            self.steps += 1;
            self.current = Some(chosen);
            log::trace!("step {}: {} of {:?}", self.steps, chosen, enabled);

            if let Some(stop) = self.step_machine(chosen) {
                return stop;
            }

            if self.liveness.due(self.steps) {
                let fp = liveness::fingerprint(self.machines.values().map(|m| m.as_ref()));
                self.liveness.observe(fp, self.steps);
            }
        }
    }

    /// A run that exhausts its steps after the monitor saw a repeated
    /// global state is a livelock. Without a repeat it is a plain bound
    /// unless the config is strict.
    fn bound_reached(&self) -> Stop {
        let bound = format!("step bound of {} reached", self.config.max_steps);
        if let Some(repeat) = self.liveness.suspect() {
            return Stop::new(
                Outcome::LivenessViolation,
                format!(
                    "{} after global state repeated {} times within {} samples at step {}",
                    bound, repeat.seen, self.config.liveness.window, repeat.step
                ),
            );
        }
        if self.config.strict_step_bound {
            Stop::new(
                Outcome::LivenessViolation,
                format!("{} with no repeated state observed", bound),
            )
        } else {
            Stop::new(Outcome::BoundReached, bound)
        }
    }

    fn enabled(&self) -> Vec<MachineId> {
        self.machines
            .iter()
            .filter(|(_, m)| m.is_enabled())
            .map(|(id, _)| *id)
            .collect()
    }

    fn quiescent(&self) -> Stop {
        let blocked: Vec<String> = self
            .machines
            .values()
            .filter(|m| m.is_blocked())
            .map(|m| {
                let waiting = if m.is_receiving() { "receive" } else { "deferred" };
                format!(
                    "{} ({}) in '{}' on {} with mailbox {:?}",
                    m.id(),
                    m.type_name(),
                    m.current_state(),
                    waiting,
                    m.mailbox_kinds().iter().map(|k| k.name()).collect::<Vec<_>>()
                )
            })
            .collect();
        if blocked.is_empty() {
            Stop::completed()
        } else {
            Stop::new(
                Outcome::Deadlock,
                format!("no machine is enabled; blocked: {}", blocked.join("; ")),
            )
        }
    }

    fn gate_stop(&mut self) -> Option<Stop> {
        if let Some(message) = self.gate.internal.take() {
            return Some(Stop::new(Outcome::Internal, message));
        }
        self.gate.error.take().map(Stop::strategy)
    }

    fn start_pending(&mut self) -> Option<Stop> {
        while let Some(id) = self.pending_start.pop_front() {
            let Some(machine) = self.machines.get_mut(&id) else {
                continue;
            };
            let machine_type = machine.type_name();
            let state = machine.current_state();
            self.coverage.discover(machine_type, state);
            let gate = &mut self.gate;
            let result = panic::catch_unwind(AssertUnwindSafe(|| machine.start(gate)));
            if let Some(stop) = self.finish_step(id, machine_type, state, result) {
                return Some(stop);
            }
        }
        None
    }

    fn step_machine(&mut self, id: MachineId) -> Option<Stop> {
        let Some(machine) = self.machines.get_mut(&id) else {
            return Some(Stop::new(
                Outcome::Internal,
                format!("scheduled unknown machine {}", id),
            ));
        };
        let machine_type = machine.type_name();
        let state = machine.current_state();
        let gate = &mut self.gate;
        let result = panic::catch_unwind(AssertUnwindSafe(|| machine.step(gate)));
        self.finish_step(id, machine_type, state, result)
    }

    fn finish_step(
        &mut self,
        id: MachineId,
        machine_type: &'static str,
        state: &'static str,
        result: std::thread::Result<Result<StepReport, MachineFault>>,
    ) -> Option<Stop> {
        match result {
            Err(payload) => Some(self.gate_stop().unwrap_or_else(|| {
                Stop::new(
                    Outcome::Exception,
                    format!(
                        "{} ({}) in state '{}' panicked: {}",
                        id,
                        machine_type,
                        state,
                        panic_message(payload.as_ref())
                    ),
                )
            })),
            Ok(Err(fault)) => Some(self.gate_stop().unwrap_or_else(|| classify(fault))),
            Ok(Ok(report)) => {
                self.apply(id, machine_type, state, report);
                self.gate_stop()
            }
        }
    }

    fn adopt(&mut self, machine: Box<dyn DynMachine>) {
        if let Some(declaration) = self.gate.registry.declaration(machine.type_name()) {
            self.coverage.declare(&declaration);
        }
        let id = machine.id();
        self.machines.insert(id, machine);
        self.pending_start.push_back(id);
    }

    fn deliver(&mut self, origin: Option<(&'static str, &'static str)>, target: MachineId, event: Event) {
        let kind = event.kind();
        let Some(machine) = self.machines.get_mut(&target) else {
            log::warn!("dropped '{}' sent to unknown machine {}", kind, target);
            return;
        };
        if let Some((origin_machine, origin_state)) = origin {
            self.coverage.edge(Edge {
                origin_machine: origin_machine.to_string(),
                origin_state: origin_state.to_string(),
                target_machine: machine.type_name().to_string(),
                target_state: machine.current_state().to_string(),
                label: kind.name().to_string(),
                kind: EdgeKind::Send,
            });
        }
        if !machine.enqueue(event) {
            log::debug!("dropped '{}' sent to halted {}", kind, target);
        }
    }

    /// Apply a step's side effects in program order.
    fn apply(
        &mut self,
        id: MachineId,
        machine_type: &'static str,
        state: &'static str,
        report: StepReport,
    ) {
        for handled in &report.handled {
            self.coverage
                .exercise(machine_type, handled.state, handled.event);
        }
        for transition in &report.transitions {
            self.coverage.discover(machine_type, transition.to);
            let kind = match transition.kind {
                TransitionKind::Goto => EdgeKind::Goto,
                TransitionKind::Push => EdgeKind::Push,
                TransitionKind::Pop => EdgeKind::Pop,
            };
            let label = match transition.event {
                Some(event) => event.name().to_string(),
                None => "entry".to_string(),
            };
            self.coverage.edge(Edge {
                origin_machine: machine_type.to_string(),
                origin_state: transition.from.to_string(),
                target_machine: machine_type.to_string(),
                target_state: transition.to.to_string(),
                label,
                kind,
            });
        }
        for effect in report.effects {
            match effect {
                Effect::Send { target, event } => {
                    self.deliver(Some((machine_type, state)), target, event)
                }
                Effect::Create { machine } => self.adopt(machine),
            }
        }
        if report.dropped > 0 {
            log::debug!("{} dropped {} pending events on halt", id, report.dropped);
        }
        if report.halted {
            self.gate.forced(PointKind::Completed, id.0);
        }
    }
}

fn classify(fault: MachineFault) -> Stop {
    let outcome = match &fault {
        MachineFault::UnhandledEvent { .. } => Outcome::UnhandledEvent,
        MachineFault::Assertion { .. } => Outcome::AssertionFailure,
        MachineFault::Interrupted { .. } | MachineFault::NotEnabled { .. } => Outcome::Internal,
        _ => Outcome::Exception,
    };
    Stop {
        outcome,
        detail: Some(fault.to_string()),
        fault: Some(fault),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn summarize(machine: &dyn DynMachine) -> MachineSummary {
    MachineSummary {
        id: machine.id(),
        machine_type: machine.type_name().to_string(),
        state: machine.current_state().to_string(),
        stack: machine.stack().iter().map(|s| s.to_string()).collect(),
        status: machine.status(),
        pending: machine.mailbox_kinds().len(),
        receiving: machine.is_receiving(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LivenessConfig;
    use crate::strategy::FirstEnabled;
    use turnstile_model::{ActionResult, Context, EventType, FaultSite, State, StateTable};
    use turnstile_trace::TraceEntry;

    const X: EventType = EventType("x");
    const Y: EventType = EventType("y");
    const INIT: EventType = EventType("init");
    const PING: EventType = EventType("ping");
    const PONG: EventType = EventType("pong");
    const PEER: EventType = EventType("peer");
    const BALL: EventType = EventType("ball");
    const TOKEN: EventType = EventType("token");
    const ITEM: EventType = EventType("item");

    fn run_with(config: RuntimeConfig, setup: impl FnOnce(&mut Controller<'_>)) -> RunReport {
        let mut strategy = FirstEnabled;
        let mut controller = Controller::new(&mut strategy, config);
        setup(&mut controller);
        controller.run()
    }

    fn payload_id(event: Option<&Event>) -> Result<MachineId, ActionError> {
        event
            .and_then(|e| e.payload::<MachineId>())
            .copied()
            .ok_or_else(|| ActionError::Other("missing machine id payload".into()))
    }

    // ─── Machines ───

    struct SelfSender;

    impl SelfSender {
        fn enter(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
            let me = ctx.id();
            ctx.send(me, X);
            Ok(())
        }
    }

    impl Machine for SelfSender {
        fn states() -> StateTable<Self> {
            StateTable::new("SelfSender", "A")
                .state(State::new("A").on_entry(SelfSender::enter).goto(X, "B"))
                .state(State::new("B"))
        }
    }

    struct Idle;

    impl Machine for Idle {
        fn states() -> StateTable<Self> {
            StateTable::new("Idle", "Waiting").state(State::new("Waiting").ignore(X))
        }
    }

    struct Waiter;

    impl Waiter {
        fn enter(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
            ctx.receive(&[TOKEN], Waiter::got_token);
            Ok(())
        }

        fn got_token(&mut self, _: &mut Context<'_, Self>, _: &Event) -> ActionResult {
            Ok(())
        }
    }

    impl Machine for Waiter {
        fn states() -> StateTable<Self> {
            StateTable::new("Waiter", "Init").state(State::new("Init").on_entry(Waiter::enter))
        }
    }

    #[derive(Default)]
    struct Sink {
        next: u32,
        saw_y: bool,
    }

    impl Sink {
        fn enter(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
            ctx.receive(&[Y], Sink::got_y);
            Ok(())
        }

        fn got_y(&mut self, _: &mut Context<'_, Self>, _: &Event) -> ActionResult {
            self.saw_y = true;
            Ok(())
        }

        fn item(&mut self, ctx: &mut Context<'_, Self>, event: &Event) -> ActionResult {
            ctx.assert(self.saw_y, "item delivered before the awaited event")?;
            let n = event
                .payload::<u32>()
                .copied()
                .ok_or_else(|| ActionError::Other("item without payload".into()))?;
            ctx.assert(n == self.next, format!("expected item {}, got {}", self.next, n))?;
            self.next += 1;
            Ok(())
        }
    }

    impl Machine for Sink {
        fn states() -> StateTable<Self> {
            StateTable::new("Sink", "Open").state(
                State::new("Open")
                    .on_entry(Sink::enter)
                    .on_event(ITEM, Sink::item),
            )
        }
    }

    struct Pinger {
        rounds: u32,
        limit: u32,
        ponger: Option<MachineId>,
    }

    impl Pinger {
        fn enter(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
            let me = ctx.id();
            let ponger = ctx.create(Ponger { pinger: None }, Some(Event::with_payload(INIT, me)))?;
            self.ponger = Some(ponger);
            ctx.send(ponger, PING);
            Ok(())
        }

        fn pong(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
            let ponger = self.ponger.ok_or_else(|| ActionError::Other("no ponger".into()))?;
            self.rounds += 1;
            if self.rounds == self.limit {
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
                    .on_entry(Pinger::enter)
                    .on_event(PONG, Pinger::pong),
            )
        }

        fn progress_hash(&self) -> Option<u64> {
            Some(u64::from(self.rounds))
        }
    }

    struct Ponger {
        pinger: Option<MachineId>,
    }

    impl Ponger {
        fn enter(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
            self.pinger = Some(payload_id(ctx.received())?);
            Ok(())
        }

        fn ping(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
            let pinger = self.pinger.ok_or_else(|| ActionError::Other("no pinger".into()))?;
            ctx.send(pinger, PONG);
            Ok(())
        }
    }

    impl Machine for Ponger {
        fn states() -> StateTable<Self> {
            StateTable::new("Ponger", "Serving").state(
                State::new("Serving")
                    .on_entry(Ponger::enter)
                    .on_event(PING, Ponger::ping),
            )
        }
    }

    struct Bouncer {
        peer: Option<MachineId>,
    }

    impl Bouncer {
        fn peer(&mut self, _: &mut Context<'_, Self>, event: &Event) -> ActionResult {
            self.peer = Some(payload_id(Some(event))?);
            Ok(())
        }

        fn ball(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
            let peer = self.peer.ok_or_else(|| ActionError::Other("no peer".into()))?;
            ctx.send(peer, BALL);
            Ok(())
        }
    }

    impl Machine for Bouncer {
        fn states() -> StateTable<Self> {
            StateTable::new("Bouncer", "Bouncing").state(
                State::new("Bouncing")
                    .on_event(PEER, Bouncer::peer)
                    .on_event(BALL, Bouncer::ball),
            )
        }
    }

    struct Chooser;

    impl Chooser {
        fn enter(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
            let flip = ctx.random_bool()?;
            let n = ctx.random_integer(5)?;
            ctx.assert(n < 5, "integer out of range")?;
            if !flip {
                ctx.halt();
            }
            Ok(())
        }
    }

    impl Machine for Chooser {
        fn states() -> StateTable<Self> {
            StateTable::new("Chooser", "Choose").state(State::new("Choose").on_entry(Chooser::enter))
        }
    }

    struct Panicker;

    impl Panicker {
        fn boom(&mut self, _: &mut Context<'_, Self>, _: &Event) -> ActionResult {
            panic!("boom");
        }
    }

    impl Machine for Panicker {
        fn states() -> StateTable<Self> {
            StateTable::new("Panicker", "Armed").state(State::new("Armed").on_event(X, Panicker::boom))
        }
    }

    struct Broken;

    impl Machine for Broken {
        fn states() -> StateTable<Self> {
            StateTable::new("Broken", "A").state(State::new("A").goto(X, "Nowhere"))
        }
    }

    const TICK: EventType = EventType("tick");

    /// Counts down in a field the fingerprint cannot see.
    struct Countdown {
        left: u32,
    }

    impl Countdown {
        fn enter(&mut self, ctx: &mut Context<'_, Self>) -> ActionResult {
            let me = ctx.id();
            ctx.send(me, TICK);
            Ok(())
        }

        fn tick(&mut self, ctx: &mut Context<'_, Self>, _: &Event) -> ActionResult {
            self.left -= 1;
            if self.left == 0 {
                ctx.halt();
            } else {
                let me = ctx.id();
                ctx.send(me, TICK);
            }
            Ok(())
        }
    }

    impl Machine for Countdown {
        fn states() -> StateTable<Self> {
            StateTable::new("Countdown", "Counting").state(
                State::new("Counting")
                    .on_entry(Countdown::enter)
                    .on_event(TICK, Countdown::tick),
            )
        }
    }

    fn bouncing_pair(c: &mut Controller<'_>) {
        let a = c.create(Bouncer { peer: None }, None).unwrap();
        let b = c.create(Bouncer { peer: None }, None).unwrap();
        c.send(a, Event::with_payload(PEER, b));
        c.send(b, Event::with_payload(PEER, a));
        c.send(a, BALL);
    }

    // ─── Scenarios ───

    #[test]
    fn self_send_then_goto_records_create_and_dequeue() {
        let mut id = None;
        let report = run_with(RuntimeConfig::default(), |c| {
            id = Some(c.create(SelfSender, None).unwrap());
        });
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(
            report.trace.entries(),
            &[
                TraceEntry::new(PointKind::Create, 0),
                TraceEntry::new(PointKind::Schedule, 0),
            ]
        );
        let summary = report.machine(id.unwrap()).unwrap();
        assert_eq!(summary.state, "B");
        assert_eq!(summary.stack, vec!["B".to_string()]);
    }

    #[test]
    fn unhandled_event_names_machine_state_and_event() {
        let mut id = None;
        let report = run_with(RuntimeConfig::default(), |c| {
            let m = c.create(Idle, None).unwrap();
            c.send(m, X);
            c.send(m, Y);
            id = Some(m);
        });
        assert_eq!(report.outcome, Outcome::UnhandledEvent);
        assert_eq!(
            report.fault,
            Some(MachineFault::UnhandledEvent {
                site: FaultSite {
                    machine: id.unwrap(),
                    machine_type: "Idle",
                    state: "Waiting",
                },
                event: Y,
            })
        );
        assert!(report.is_bug());
    }

    #[test]
    fn mutual_receive_is_deadlock() {
        let report = run_with(RuntimeConfig::default(), |c| {
            c.create(Waiter, None).unwrap();
            c.create(Waiter, None).unwrap();
        });
        assert_eq!(report.outcome, Outcome::Deadlock);
        let detail = report.detail.unwrap();
        assert!(detail.contains("m0"));
        assert!(detail.contains("m1"));
        assert!(detail.contains("receive"));
    }

    #[test]
    fn halt_request_reaches_a_receiving_machine() {
        let report = run_with(RuntimeConfig::default(), |c| {
            let waiter = c.create(Waiter, None).unwrap();
            c.send(waiter, Event::halt());
        });
        assert_eq!(report.outcome, Outcome::Completed, "{:?}", report.detail);
        assert_eq!(report.steps, 1);
        assert_eq!(report.machines[0].status, Status::Halted);
    }

    #[test]
    fn delivery_follows_send_order_around_selective_receive() {
        let report = run_with(RuntimeConfig::default(), |c| {
            let sink = c.create(Sink::default(), None).unwrap();
            for i in 0..3u32 {
                c.send(sink, Event::with_payload(ITEM, i));
            }
            c.send(sink, Y);
            for i in 3..20u32 {
                c.send(sink, Event::with_payload(ITEM, i));
            }
        });
        assert_eq!(report.outcome, Outcome::Completed, "{:?}", report.detail);
        assert_eq!(report.steps, 21);
    }

    #[test]
    fn terminating_ping_pong_completes_without_liveness_report() {
        let report = run_with(RuntimeConfig::default(), |c| {
            c.create(
                Pinger {
                    rounds: 0,
                    limit: 100,
                    ponger: None,
                },
                None,
            )
            .unwrap();
        });
        assert_eq!(report.outcome, Outcome::Completed, "{:?}", report.detail);
        assert!(report.machines.iter().all(|m| m.status == Status::Halted));
        let completed = report.trace.summary()[&PointKind::Completed];
        assert_eq!(completed, 2);
        assert_eq!(report.trace.summary()[&PointKind::Create], 2);
    }

    #[test]
    fn endless_bouncing_is_a_liveness_violation() {
        let config = RuntimeConfig {
            max_steps: 1_000,
            ..Default::default()
        };
        let report = run_with(config, bouncing_pair);
        assert_eq!(report.outcome, Outcome::LivenessViolation);
        assert_eq!(report.steps, 1_000);
        let detail = report.detail.unwrap();
        assert!(detail.contains("step bound of 1000 reached"), "{}", detail);
        assert!(detail.contains("repeated 4 times"), "{}", detail);
    }

    #[test]
    fn repeated_fingerprint_in_a_terminating_run_is_not_reported() {
        let report = run_with(RuntimeConfig::default(), |c| {
            c.create(Countdown { left: 200 }, None).unwrap();
        });
        assert_eq!(report.outcome, Outcome::Completed, "{:?}", report.detail);
        assert_eq!(report.steps, 200);
        assert_eq!(report.machines[0].status, Status::Halted);
    }

    #[test]
    fn step_bound_without_liveness_sampling() {
        let config = RuntimeConfig {
            max_steps: 500,
            liveness: LivenessConfig::disabled(),
            ..Default::default()
        };
        let report = run_with(config.clone(), bouncing_pair);
        assert_eq!(report.outcome, Outcome::BoundReached);
        assert_eq!(report.steps, 500);
        assert!(!report.is_bug());

        let strict = RuntimeConfig {
            strict_step_bound: true,
            ..config
        };
        let report = run_with(strict, bouncing_pair);
        assert_eq!(report.outcome, Outcome::LivenessViolation);
        assert!(report.detail.unwrap().contains("no repeated state"));
    }

    #[test]
    fn step_bound_before_enough_samples_is_a_plain_bound() {
        let config = RuntimeConfig {
            max_steps: 50,
            ..Default::default()
        };
        let report = run_with(config, |c| {
            c.create(Countdown { left: 1_000 }, None).unwrap();
        });
        assert_eq!(report.outcome, Outcome::BoundReached, "{:?}", report.detail);
    }

    #[test]
    fn choices_are_recorded_in_trace() {
        let report = run_with(RuntimeConfig::default(), |c| {
            c.create(Chooser, None).unwrap();
        });
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(
            report.trace.entries(),
            &[
                TraceEntry::new(PointKind::Create, 0),
                TraceEntry::new(PointKind::Bool, 0),
                TraceEntry::new(PointKind::Integer, 0),
                TraceEntry::new(PointKind::Completed, 0),
            ]
        );
    }

    #[test]
    fn mail_to_halting_machine_is_discarded() {
        let report = run_with(RuntimeConfig::default(), |c| {
            let m = c.create(Chooser, None).unwrap();
            c.send(m, Y);
        });
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.machines[0].pending, 0);
    }

    #[test]
    fn panic_in_action_is_exception() {
        let report = run_with(RuntimeConfig::default(), |c| {
            let m = c.create(Panicker, None).unwrap();
            c.send(m, X);
        });
        assert_eq!(report.outcome, Outcome::Exception);
        assert!(report.detail.unwrap().contains("boom"));
    }

    #[test]
    fn invalid_table_is_rejected_at_creation() {
        let mut strategy = FirstEnabled;
        let mut controller = Controller::new(&mut strategy, RuntimeConfig::default());
        let err = controller.create(Broken, None).unwrap_err();
        assert!(matches!(err, RuntimeError::Model(_)));
        assert_eq!(controller.machine_count(), 0);
    }

    struct Rogue;

    impl SchedulingStrategy for Rogue {
        fn name(&self) -> &str {
            "rogue"
        }
        fn prepare(&mut self, _: u64) -> bool {
            true
        }
        fn next_machine(
            &mut self,
            _: &[MachineId],
            _: Option<MachineId>,
            _: u64,
        ) -> Result<MachineId, StrategyError> {
            Ok(MachineId(99))
        }
        fn next_bool(&mut self, _: MachineId) -> Result<bool, StrategyError> {
            Ok(true)
        }
        fn next_integer(&mut self, _: MachineId, bound: u64) -> Result<u64, StrategyError> {
            Ok(bound)
        }
    }

    #[test]
    fn strategy_choosing_disabled_machine_is_internal() {
        let mut strategy = Rogue;
        let mut controller = Controller::new(&mut strategy, RuntimeConfig::default());
        let m = controller.create(SelfSender, None).unwrap();
        controller.send(m, X);
        let report = controller.run();
        assert_eq!(report.outcome, Outcome::Internal);
        assert!(!report.is_bug());
    }

    #[test]
    fn out_of_range_integer_is_internal() {
        let mut strategy = Rogue;
        let mut controller = Controller::new(&mut strategy, RuntimeConfig::default());
        controller.create(Chooser, None).unwrap();
        assert_eq!(controller.run().outcome, Outcome::Internal);
    }

    #[test]
    fn coverage_records_states_events_and_edges() {
        let report = run_with(RuntimeConfig::default(), |c| {
            c.create(SelfSender, None).unwrap();
        });
        let states: Vec<_> = report.coverage.states().collect();
        assert_eq!(states, vec![("SelfSender", "A"), ("SelfSender", "B")]);
        assert!(report.coverage.is_exercised("SelfSender", "A", "x"));
        let kinds: Vec<_> = report.coverage.edges().map(|e| e.kind).collect();
        assert!(kinds.contains(&EdgeKind::Goto));
        assert!(kinds.contains(&EdgeKind::Send));
        let machines = report.coverage.machine_coverage();
        assert_eq!(machines[0].registered, 1);
        assert_eq!(machines[0].exercised, 1);
    }

    #[test]
    fn harness_inspection_before_run() {
        let mut strategy = FirstEnabled;
        let mut controller = Controller::new(&mut strategy, RuntimeConfig::default());
        let m = controller.create(SelfSender, None).unwrap();
        assert_eq!(controller.state_of(m), Some("A"));
        assert_eq!(controller.stack_of(m), Some(vec!["A"]));
        assert_eq!(controller.status_of(m), Some(Status::Active));
        assert_eq!(controller.trace().len(), 1);
        assert!(controller.registry().declaration("SelfSender").is_some());
    }
}
