//! Exchange State Machine
//!
//! The core of the sealed reveal protocol. Everything in this module is
//! synchronous, in-memory, and free of external I/O; the transport edge in
//! `network/` drives it and performs effects afterwards.
//!
//! ## Module Structure
//!
//! - `state`: per-match record, identifiers, error kinds
//! - `registry`: the shared channel -> match table
//! - `submit`: submission validation and slot writes
//! - `reveal`: readiness check and exactly-once disclosure
//! - `expiry`: one-shot deadline per match

pub mod state;
pub mod registry;
pub mod submit;
pub mod reveal;
pub mod expiry;

// Re-export key types
pub use state::{ChannelKey, MatchError, MatchState, MatchSummary, ParticipantId};
pub use registry::MatchRegistry;
pub use submit::SubmissionGate;
pub use reveal::{Disclosure, RevealGate};
pub use expiry::{ExpiryHandle, ExpiryScheduler};
