//! Events and machine identifiers.
//!
//! An [`Event`] is a type tag plus an optional immutable payload. Handler
//! tables are keyed by [`EventType`], so dispatch is a map lookup rather
//! than reflection. The reserved [`EventType::WILDCARD`] tag matches any
//! concrete type.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type tag of an event.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventType(pub &'static str);

impl EventType {
    /// Matches any concrete event type.
    pub const WILDCARD: EventType = EventType("*");

    /// Halts the receiving machine unless one of its states handles it.
    pub const HALT: EventType = EventType("halt");

    pub fn name(self) -> &'static str {
        self.0
    }

    pub fn is_wildcard(self) -> bool {
        self == Self::WILDCARD
    }

    /// True if `self` (a pattern) accepts a concrete event of type `other`.
    pub fn matches(self, other: EventType) -> bool {
        self.is_wildcard() || self == other
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self.0)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A message. Cloning is cheap; the payload is shared, never copied.
#[derive(Clone)]
pub struct Event {
    kind: EventType,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Event {
    pub fn new(kind: EventType) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    pub fn with_payload<T: Any + Send + Sync>(kind: EventType, payload: T) -> Self {
        Self {
            kind,
            payload: Some(Arc::new(payload)),
        }
    }

    pub fn halt() -> Self {
        Self::new(EventType::HALT)
    }

    pub fn kind(&self) -> EventType {
        self.kind
    }

    /// Borrow the payload as `T`, if one is attached and has that type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }
}

impl From<EventType> for Event {
    fn from(kind: EventType) -> Self {
        Event::new(kind)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind.0)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// Identifier of a machine within one runtime.
///
/// Assigned sequentially at creation and never reused for the lifetime of
/// the runtime that issued it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MachineId(pub u64);

impl MachineId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}
