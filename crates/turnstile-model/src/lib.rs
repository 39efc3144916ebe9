//! Machine model for turnstile actor programs.
//!
//! A program is a set of machine types. Each type implements [`Machine`]
//! and declares a [`StateTable`]; each running instance owns one
//! [`Mailbox`] and a stack of active states. Runtimes drive instances
//! through the object-safe [`DynMachine`] trait and supply scheduling
//! services through [`Host`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────┐      ┌──────────────────────┐
//! │ Machine (user type)    │      │ Registry             │
//! │   fn states() ─────────┼─────▶│   validated tables   │
//! └────────────────────────┘      │   declarations()     │
//!                                 └──────────┬───────────┘
//!                                            │ Arc<StateTable>
//! ┌──────────────────────────────────────────▼───────────┐
//! │ MachineInstance                                       │
//! │   Mailbox ─▶ resolve(stack, event) ─▶ action(ctx)     │
//! │                                        │              │
//! │          goto / push / pop / raise ◀───┤              │
//! │          send / create ──▶ Effects ────┼──▶ runtime   │
//! │          random_* ─────────────────────┴──▶ Host      │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Determinism
//!
//! Instances never apply their own side effects and never consult a
//! random source directly. Given the same sequence of steps and the same
//! answers from the [`Host`], a machine produces the same effects.

pub mod context;
pub mod event;
pub mod instance;
pub mod machine;
pub mod mailbox;
pub mod registry;
pub mod state;

pub use context::{Action, ActionError, ActionResult, Context, EntryAction, Host};
pub use event::{Event, EventType, MachineId};
pub use instance::{
    DynMachine, Effect, FaultSite, HandledEvent, MachineFault, MachineInstance, StepReport,
    TransitionRecord,
};
pub use machine::{Machine, Status};
pub use mailbox::Mailbox;
pub use registry::Registry;
pub use state::{
    Disposition, MachineDeclaration, ModelError, State, StateDeclaration, StateTable, Transition,
    TransitionDeclaration, TransitionKind,
};
