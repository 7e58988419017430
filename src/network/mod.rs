//! Network Layer
//!
//! Transport edge of the server. Everything non-deterministic lives here:
//! the WebSocket ingress, JWT validation, the channel lifecycle provider,
//! and the command router that bridges wire messages to the exchange gates.

pub mod auth;
pub mod channel;
pub mod protocol;
pub mod router;
pub mod server;

pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use channel::{ChannelError, ChannelProvider, InMemoryChannels};
pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use router::{CommandReply, Coordinator, MatchCommand};
pub use server::{ExchangeServer, ServeError, ServerConfig};
