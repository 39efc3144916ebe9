//! Production runtime: one OS thread per machine.
//!
//! Machines run concurrently and choices come from a real random source,
//! so runs are not reproducible. Each thread feeds its channel into the
//! machine's own mailbox, so selective receive and deferral behave as in
//! the controlled runtime.

use crate::error::RuntimeError;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use turnstile_model::{
    ActionError, DynMachine, Effect, Event, Host, Machine, MachineFault, MachineId,
    MachineInstance, Registry, Status, StepReport,
};

/// A fault that stopped one machine thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadFault {
    Machine(MachineFault),
    Panic { machine: MachineId, message: String },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    registry: Registry,
    next_id: AtomicU64,
    closed: AtomicBool,
    senders: Mutex<HashMap<MachineId, Sender<Event>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    faults: Mutex<Vec<ThreadFault>>,
    halted: Mutex<BTreeSet<MachineId>>,
    /// Events sent but not yet settled, plus machines still starting.
    busy: Mutex<usize>,
    idle: Condvar,
}

impl Shared {
    fn add_busy(&self, n: usize) {
        *lock(&self.busy) += n;
    }

    fn settle(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut busy = lock(&self.busy);
        *busy = busy.saturating_sub(n);
        if *busy == 0 {
            self.idle.notify_all();
        }
    }

    fn send(&self, target: MachineId, event: Event) -> bool {
        let senders = lock(&self.senders);
        let Some(tx) = senders.get(&target) else {
            log::debug!("dropped '{}' sent to {} (halted or unknown)", event.kind(), target);
            return false;
        };
        self.add_busy(1);
        if tx.send(event).is_err() {
            self.settle(1);
            return false;
        }
        true
    }

    fn record_fault(&self, fault: ThreadFault) {
        log::error!("machine fault: {:?}", fault);
        lock(&self.faults).push(fault);
    }
}

/// Host for one machine thread.
struct ThreadHost {
    shared: Arc<Shared>,
}

impl Host for ThreadHost {
    fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    fn allocate(
        &mut self,
        _creator: Option<MachineId>,
        _machine_type: &'static str,
    ) -> Result<MachineId, ActionError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ActionError::Interrupted("runtime has shut down".to_string()));
        }
        Ok(MachineId(self.shared.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn random_bool(&mut self, _caller: MachineId) -> Result<bool, ActionError> {
        Ok(rand::thread_rng().gen_bool(0.5))
    }

    fn random_integer(&mut self, _caller: MachineId, bound: u64) -> Result<u64, ActionError> {
        if bound == 0 {
            return Err(ActionError::Other(
                "random_integer needs a positive bound".to_string(),
            ));
        }
        Ok(rand::thread_rng().gen_range(0..bound))
    }
}

fn spawn(shared: &Arc<Shared>, machine: Box<dyn DynMachine>) -> Result<(), RuntimeError> {
    let id = machine.id();
    let (tx, rx) = mpsc::channel();
    {
        let mut senders = lock(&shared.senders);
        if shared.closed.load(Ordering::SeqCst) {
            return Err(RuntimeError::ShutDown);
        }
        senders.insert(id, tx);
    }
    // The start counts as pending work until it finishes.
    shared.add_busy(1);
    let thread_shared = Arc::clone(shared);
    let handle = thread::Builder::new()
        .name(format!("{}-{}", machine.type_name(), id))
        .spawn(move || machine_loop(thread_shared, machine, rx));
    match handle {
        Ok(handle) => {
            lock(&shared.handles).push(handle);
            Ok(())
        }
        Err(e) => {
            lock(&shared.senders).remove(&id);
            shared.settle(1);
            Err(RuntimeError::Spawn(e))
        }
    }
}

/// Run one start or step, apply its effects, and report whether the
/// machine may continue.
fn guarded(
    shared: &Arc<Shared>,
    id: MachineId,
    run: impl FnOnce() -> Result<StepReport, MachineFault>,
) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(report)) => {
            for effect in report.effects {
                match effect {
                    Effect::Send { target, event } => {
                        shared.send(target, event);
                    }
                    Effect::Create { machine } => {
                        let child = machine.id();
                        if let Err(e) = spawn(shared, machine) {
                            log::warn!("could not start {}: {}", child, e);
                        }
                    }
                }
            }
            true
        }
        Ok(Err(fault)) => {
            shared.record_fault(ThreadFault::Machine(fault));
            false
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            shared.record_fault(ThreadFault::Panic {
                machine: id,
                message,
            });
            false
        }
    }
}

fn machine_loop(shared: Arc<Shared>, mut machine: Box<dyn DynMachine>, rx: Receiver<Event>) {
    let id = machine.id();
    let mut host = ThreadHost {
        shared: Arc::clone(&shared),
    };
    // Work taken on (the start, then channel events) but not yet settled.
    let mut taken = 1usize;
    let mut alive = guarded(&shared, id, || machine.start(&mut host));

    while alive && machine.status() == Status::Active {
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    taken += 1;
                    machine.enqueue(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        if machine.is_enabled() {
            alive = guarded(&shared, id, || machine.step(&mut host));
            continue;
        }

        shared.settle(taken);
        taken = 0;
        if disconnected {
            break;
        }
        match rx.recv() {
            Ok(event) => {
                taken += 1;
                machine.enqueue(event);
            }
            Err(_) => break,
        }
    }

    lock(&shared.senders).remove(&id);
    if machine.status() == Status::Halted {
        lock(&shared.halted).insert(id);
    }
    let leftover = rx.try_iter().count();
    shared.settle(taken + leftover);
    log::debug!("{} thread exiting in state {}", id, machine.current_state());
}

/// Runs machines on their own threads.
pub struct ThreadedRuntime {
    shared: Arc<Shared>,
}

impl Default for ThreadedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadedRuntime {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                next_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                senders: Mutex::new(HashMap::new()),
                handles: Mutex::new(Vec::new()),
                faults: Mutex::new(Vec::new()),
                halted: Mutex::new(BTreeSet::new()),
                busy: Mutex::new(0),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub fn create<M: Machine>(
        &self,
        machine: M,
        initial: Option<Event>,
    ) -> Result<MachineId, RuntimeError> {
        let table = self.shared.registry.table::<M>()?;
        let id = MachineId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        spawn(
            &self.shared,
            Box::new(MachineInstance::new(id, machine, table, initial)),
        )?;
        Ok(id)
    }

    /// Returns false if the target is unknown or has halted.
    pub fn send(&self, target: MachineId, event: impl Into<Event>) -> bool {
        self.shared.send(target, event.into())
    }

    /// Block until no events are in flight and no machine is running, or
    /// until `timeout` passes. Returns true if the runtime went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut busy = lock(&self.shared.busy);
        while *busy > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            busy = match self.shared.idle.wait_timeout(busy, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    pub fn faults(&self) -> Vec<ThreadFault> {
        lock(&self.shared.faults).clone()
    }

    pub fn halted(&self) -> Vec<MachineId> {
        lock(&self.shared.halted).iter().copied().collect()
    }

    pub fn is_running(&self, id: MachineId) -> bool {
        lock(&self.shared.senders).contains_key(&id)
    }

    /// Stop accepting work, disconnect every machine and join the threads.
    pub fn shutdown(self) {
        {
            let mut senders = lock(&self.shared.senders);
            self.shared.closed.store(true, Ordering::SeqCst);
            senders.clear();
        }
        loop {
            let handle = lock(&self.shared.handles).pop();
            let Some(handle) = handle else { break };
            if handle.join().is_err() {
                log::warn!("machine thread panicked outside of a step");
            }
        }
    }
}
