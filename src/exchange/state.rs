//! Match State Definitions
//!
//! The per-match record: two fixed participants, one optional submission
//! slot per participant, and the creation instant that anchors expiry.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque identifier of the isolated channel hosting a match.
///
/// Primary key into [`crate::exchange::registry::MatchRegistry`]; unique for
/// the lifetime of the match. Implements Ord for deterministic BTreeMap
/// ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelKey(pub [u8; 16]);

impl ChannelKey {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Mint a fresh random key.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Parse from a hex string (32 hex chars).
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Render as a hex string for logging and the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Unique participant identifier (16 bytes, derived from the auth subject).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub [u8; 16]);

impl ParticipantId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse from a hex string (32 hex chars).
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Render as a hex string for logging and the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

// =============================================================================
// ERROR KINDS
// =============================================================================

/// Expected, recoverable failures of the exchange state machine.
///
/// All of these are reported back to the immediate caller; none crash the
/// process or leave the registry inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// A match already exists for this channel key.
    #[error("a match already exists for this channel")]
    AlreadyExists,

    /// The channel has no active match (never created, revealed, or expired).
    #[error("no active match for this channel")]
    NoSuchMatch,

    /// The submitter is not one of the match's two participants.
    #[error("not a participant in this match")]
    NotAParticipant,

    /// Reveal was requested before both slots were filled. Carries the
    /// identities still owing a submission. Presence only, never values.
    #[error("still awaiting {} submission(s)", awaiting.len())]
    Incomplete {
        /// Participants whose slot is still unset.
        awaiting: Vec<ParticipantId>,
    },

    /// A match needs two distinct participant identities.
    #[error("participants must be two distinct identities")]
    IdenticalParticipants,
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// One in-progress reveal match.
///
/// The participant pair is fixed at creation and immutable thereafter; its
/// order defines slot A / slot B for display only. Slots start genuinely
/// unset; a submitted empty string is distinguishable from "not submitted".
#[derive(Debug)]
pub struct MatchState {
    /// Hosting channel, primary key into the registry.
    pub channel: ChannelKey,
    participants: [ParticipantId; 2],
    submissions: [Option<String>; 2],
    created_at: Instant,
}

impl MatchState {
    /// Create a fresh record with both slots unset.
    pub(crate) fn new(channel: ChannelKey, participants: [ParticipantId; 2]) -> Self {
        Self {
            channel,
            participants,
            submissions: [None, None],
            created_at: Instant::now(),
        }
    }

    /// The fixed participant pair, in slot order.
    pub fn participants(&self) -> &[ParticipantId; 2] {
        &self.participants
    }

    /// Resolve a participant to their slot index, if they are in this match.
    pub fn slot_of(&self, id: &ParticipantId) -> Option<usize> {
        self.participants.iter().position(|p| p == id)
    }

    /// Write a value into a slot, returning the previous value if any.
    /// Last write before reveal or expiry wins.
    pub(crate) fn record(&mut self, slot: usize, value: String) -> Option<String> {
        self.submissions[slot].replace(value)
    }

    /// Whether both slots hold a value.
    pub fn is_complete(&self) -> bool {
        self.submissions.iter().all(Option::is_some)
    }

    /// Per-slot presence flags, in participant order.
    pub fn filled(&self) -> [bool; 2] {
        [self.submissions[0].is_some(), self.submissions[1].is_some()]
    }

    /// Participants whose slot is still unset.
    pub fn awaiting(&self) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .zip(self.submissions.iter())
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Time elapsed since creation.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Consume the record into its disclosure payload. Returns `None` if
    /// either slot is still unset.
    pub(crate) fn take_values(self) -> Option<([ParticipantId; 2], [String; 2])> {
        match self.submissions {
            [Some(a), Some(b)] => Some((self.participants, [a, b])),
            _ => None,
        }
    }

    /// Presence-only view of this record.
    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            channel: self.channel,
            participants: self.participants,
            filled: self.filled(),
        }
    }
}

/// Presence-only snapshot of a match: who is in it and which slots are
/// filled. Safe to hand to formatting and messaging code: carries no values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    /// Hosting channel.
    pub channel: ChannelKey,
    /// The fixed participant pair, in slot order.
    pub participants: [ParticipantId; 2],
    /// Per-slot presence flags, in participant order.
    pub filled: [bool; 2],
}

impl MatchSummary {
    /// Participants whose slot is still unset.
    pub fn awaiting(&self) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .zip(self.filled.iter())
            .filter(|(_, filled)| !**filled)
            .map(|(id, _)| *id)
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
