//! The trait user machine types implement.

use crate::state::StateTable;
use serde::{Deserialize, Serialize};

/// A machine type: its fields are the machine's private data, its
/// [`StateTable`] describes behavior.
///
/// ```ignore
/// struct Door { opened: u32 }
///
/// impl Machine for Door {
///     fn states() -> StateTable<Self> {
///         StateTable::new("Door", "Closed")
///             .state(State::new("Closed").goto(OPEN, "Open"))
///             .state(State::new("Open").on_entry(Door::count).goto(CLOSE, "Closed"))
///     }
/// }
/// ```
pub trait Machine: Sized + Send + 'static {
    /// Build the state table. Called once per runtime, when the type is
    /// first registered.
    fn states() -> StateTable<Self>;

    /// Digest of the data that distinguishes progress, folded into the
    /// liveness fingerprint. Machines whose progress lives only in their
    /// state and mailbox can leave this as `None`.
    fn progress_hash(&self) -> Option<u64> {
        None
    }
}

/// Lifecycle status. Halting is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Active,
    Halted,
}
