//! Trace logs for turnstile runs.
//!
//! Every scheduling point a controlled run reaches is appended to a
//! [`TraceLog`] as a `(kind, value)` pair. Logs are saved as JSON when a
//! run fails and fed back to the replay strategy to reproduce it.
//! [`DeterminismVerifier`] compares two logs and locates the first
//! divergence.

pub mod trace;
pub mod verifier;

pub use crate::trace::{PointKind, SerializeError, TraceEntry, TraceLog};
pub use verifier::{DeterminismVerifier, Divergence, VerificationResult};
