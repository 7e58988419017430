//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. All messages
//! are JSON; identifiers travel as hex strings for readability in logs and
//! debugging tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exchange::state::ParticipantId;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with the server.
    Auth(AuthRequest),

    /// Start a match against an opponent. The server creates the isolated
    /// channel and arms the expiry deadline.
    StartMatch {
        /// Opponent's participant id (hex string).
        opponent: String,
    },

    /// Submit a sealed value (explicit command path).
    Submit {
        /// Hosting channel key (hex string).
        channel: String,
        /// The value to seal. Overwrites any prior submission by the sender.
        value: String,
    },

    /// Request the simultaneous reveal.
    Reveal {
        /// Hosting channel key (hex string).
        channel: String,
    },

    /// Raw content observed in the private channel (implicit submission
    /// path, relayed by the platform adapter). Routed through the same
    /// submission contract as `Submit`; the source message is scrubbed from
    /// the channel after capture, best effort.
    ChannelMessage {
        /// Hosting channel key (hex string).
        channel: String,
        /// Platform message id, used for scrubbing.
        message_id: u64,
        /// The observed content, captured as the sender's submission.
        content: String,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Authentication request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Authentication token (JWT from an external provider).
    pub token: String,
    /// Client version for compatibility check.
    pub client_version: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// A match was created for the requester.
    MatchCreated(MatchCreatedInfo),

    /// A submission was recorded. Identity only, never the value.
    SubmissionAck {
        /// Hosting channel key (hex string).
        channel: String,
        /// Who submitted (hex participant id).
        participant: String,
    },

    /// Both values, disclosed together.
    Disclosure(DisclosureInfo),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall-clock time (Unix seconds).
        server_time: u64,
    },

    /// Error message, delivered privately to the requester.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Authenticated participant id (hex string) if successful.
    pub participant: Option<String>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Details of a freshly created match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCreatedInfo {
    /// Hosting channel key (hex string).
    pub channel: String,
    /// Participant pair in slot order (hex strings).
    pub participants: [String; 2],
    /// When the match expires and the channel is torn down.
    pub expires_at: DateTime<Utc>,
}

/// Disclosure payload: both participants and both values, index-matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisclosureInfo {
    /// Hosting channel key (hex string).
    pub channel: String,
    /// Participant pair in slot order (hex strings).
    pub participants: [String; 2],
    /// Submitted values, index-matched to `participants`.
    pub values: [String; 2],
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A match already exists for the channel.
    AlreadyExists,
    /// The channel has no active match.
    NoSuchMatch,
    /// The sender is not a participant of the match.
    NotAParticipant,
    /// Reveal requested before both submissions are in.
    Incomplete,
    /// The request requires authentication.
    NotAuthenticated,
    /// Malformed request.
    InvalidInput,
    /// Unexpected server-side failure.
    Internal,
}

// =============================================================================
// HELPERS
// =============================================================================

impl ClientMessage {
    /// Parse from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Render a participant pair as hex strings for the wire.
pub fn participants_hex(pair: &[ParticipantId; 2]) -> [String; 2] {
    [pair[0].to_hex(), pair[1].to_hex()]
}

// =============================================================================
// TESTS
// =============================================================================
