//! # Sealswap Server
//!
//! Coordinator for a two-party simultaneous-reveal protocol. Two participants
//! each submit a sealed value inside an ephemeral private channel; the server
//! withholds both values until both are in, then discloses them together in a
//! single atomic step.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SEALSWAP SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  exchange/        - Match state machine (no I/O)             │
//! │  ├── state.rs     - Match record, ids, error kinds           │
//! │  ├── registry.rs  - Channel -> match table                   │
//! │  ├── submit.rs    - Submission gate                          │
//! │  ├── reveal.rs    - Reveal gate (exactly-once disclosure)    │
//! │  └── expiry.rs    - One-shot expiry timers                   │
//! │                                                              │
//! │  network/         - Transport edge (non-deterministic)       │
//! │  ├── protocol.rs  - Wire message types                       │
//! │  ├── auth.rs      - JWT validation                           │
//! │  ├── channel.rs   - Channel lifecycle provider               │
//! │  ├── router.rs    - Command routing and external effects     │
//! │  └── server.rs    - WebSocket ingress                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Secrecy Guarantee
//!
//! The `exchange/` module never emits a submitted value through any path
//! other than a successful reveal. Submission acknowledgments carry identity
//! only. The guarantee rests on access control and timing, not on hashing
//! or commitment schemes.
//!
//! Every registry mutation happens inside a single lock scope, so the
//! reveal-vs-expiry race always resolves to exactly one terminal owner.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod exchange;
pub mod network;

// Re-export commonly used types
pub use exchange::state::{ChannelKey, MatchError, MatchState, MatchSummary, ParticipantId};
pub use exchange::registry::MatchRegistry;
pub use exchange::reveal::{Disclosure, RevealGate};
pub use exchange::submit::SubmissionGate;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default match lifetime in seconds. When it elapses the private channel is
/// torn down and the match retired regardless of submission progress.
pub const DEFAULT_EXPIRY_SECS: u64 = 600;
