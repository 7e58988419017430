//! WebSocket Ingress
//!
//! Async WebSocket front door for the exchange. Handles authentication and
//! routes wire messages to the coordinator; per-match work (channel
//! creation, expiry, effects) all happens behind [`Coordinator`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::exchange::state::{ChannelKey, MatchError, ParticipantId};
use crate::network::auth::{validate_token, AuthConfig};
use crate::network::channel::ChannelProvider;
use crate::network::protocol::{
    participants_hex, AuthResult, ClientMessage, DisclosureInfo, ErrorCode, MatchCreatedInfo,
    ServerError, ServerMessage,
};
use crate::network::router::{CommandReply, Coordinator, MatchCommand};
use crate::DEFAULT_EXPIRY_SECS;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Drop clients idle longer than this.
    pub idle_timeout: Duration,
    /// Match lifetime; the channel is torn down when it elapses.
    pub expiry: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            expiry: Duration::from_secs(DEFAULT_EXPIRY_SECS),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    /// Authenticated participant identity, if any.
    participant: Option<ParticipantId>,
    /// Connection time.
    #[allow(dead_code)]
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Message sender (for direct messaging to the client).
    #[allow(dead_code)]
    sender: mpsc::Sender<ServerMessage>,
}

/// The exchange server.
pub struct ExchangeServer<P: ChannelProvider> {
    config: ServerConfig,
    auth: AuthConfig,
    coordinator: Arc<Coordinator<P>>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<P: ChannelProvider + 'static> ExchangeServer<P> {
    /// Create a server over the given channel provider.
    pub fn new(config: ServerConfig, auth: AuthConfig, channels: Arc<P>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let coordinator = Arc::new(Coordinator::new(channels, config.expiry));

        Self {
            config,
            auth,
            coordinator,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// The command coordinator (for observability and tests).
    pub fn coordinator(&self) -> &Arc<Coordinator<P>> {
        &self.coordinator
    }

    /// Signal every connection task and the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the server until shutdown.
    pub async fn run(&self) -> Result<(), ServeError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Exchange server listening on {}", self.config.bind_addr);

        let cleanup_clients = self.clients.clone();
        let idle_timeout = self.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let client_count = self.clients.read().await.len();
                            if client_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let coordinator = self.coordinator.clone();
        let auth = self.auth.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(
                    addr,
                    ConnectedClient {
                        participant: None,
                        connected_at: Instant::now(),
                        last_activity: Instant::now(),
                        sender: msg_tx.clone(),
                    },
                );
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(error_message(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                // Update activity
                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &coordinator,
                                    &auth,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: unix_now(),
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            sender_task.abort();
            clients.write().await.remove(&addr);
            debug!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        coordinator: &Arc<Coordinator<P>>,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Auth(request) => {
                Self::handle_auth(addr, &request.token, clients, auth, config, sender).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender
                    .send(ServerMessage::Pong {
                        timestamp,
                        server_time: unix_now(),
                    })
                    .await;
            }
            other => {
                // Everything else requires an authenticated identity.
                let participant = {
                    let clients = clients.read().await;
                    clients.get(&addr).and_then(|c| c.participant)
                };
                let participant = match participant {
                    Some(id) => id,
                    None => {
                        let _ = sender
                            .send(error_message(
                                ErrorCode::NotAuthenticated,
                                "Must authenticate first",
                            ))
                            .await;
                        return;
                    }
                };

                let command = match Self::to_command(other, participant) {
                    Ok(command) => command,
                    Err(reason) => {
                        let _ = sender
                            .send(error_message(ErrorCode::InvalidInput, reason))
                            .await;
                        return;
                    }
                };

                let reply = coordinator.handle(command).await;
                let _ = sender.send(reply_message(reply)).await;
            }
        }
    }

    /// Handle authentication.
    async fn handle_auth(
        addr: SocketAddr,
        token: &str,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match validate_token(token, auth) {
            Ok(claims) => {
                let participant = claims.participant_id();
                {
                    let mut clients = clients.write().await;
                    if let Some(client) = clients.get_mut(&addr) {
                        client.participant = Some(participant);
                    }
                }
                debug!("Client {} authenticated as {}", addr, participant.short_hex());

                let _ = sender
                    .send(ServerMessage::AuthResult(AuthResult {
                        success: true,
                        participant: Some(participant.to_hex()),
                        error: None,
                        server_version: config.version.clone(),
                    }))
                    .await;
            }
            Err(e) => {
                debug!("Auth failed for {}: {}", addr, e);
                let _ = sender
                    .send(ServerMessage::AuthResult(AuthResult {
                        success: false,
                        participant: None,
                        error: Some(e.to_string()),
                        server_version: config.version.clone(),
                    }))
                    .await;
            }
        }
    }

    /// Map a wire message onto a match command.
    fn to_command(
        msg: ClientMessage,
        participant: ParticipantId,
    ) -> Result<MatchCommand, &'static str> {
        match msg {
            ClientMessage::StartMatch { opponent } => {
                let opponent =
                    ParticipantId::from_hex(&opponent).ok_or("malformed opponent id")?;
                Ok(MatchCommand::Start {
                    initiator: participant,
                    opponent,
                })
            }
            ClientMessage::Submit { channel, value } => {
                let channel = parse_channel_key(&channel)?;
                Ok(MatchCommand::Submit {
                    channel,
                    submitter: participant,
                    value,
                })
            }
            ClientMessage::Reveal { channel } => {
                let channel = parse_channel_key(&channel)?;
                Ok(MatchCommand::Reveal { channel })
            }
            ClientMessage::ChannelMessage {
                channel,
                message_id,
                content,
            } => {
                let channel = parse_channel_key(&channel)?;
                Ok(MatchCommand::RawMessage {
                    channel,
                    author: participant,
                    message_id,
                    content,
                })
            }
            ClientMessage::Auth(_) | ClientMessage::Ping { .. } => Err("unexpected message"),
        }
    }

    /// Periodically drop clients that have gone idle.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        idle_timeout: Duration,
    ) {
        let mut tick = interval(Duration::from_secs(30));
        loop {
            tick.tick().await;

            let mut clients = clients.write().await;
            let before = clients.len();
            clients.retain(|_, client| client.last_activity.elapsed() < idle_timeout);
            let dropped = before - clients.len();
            if dropped > 0 {
                debug!("Dropped {} idle client(s)", dropped);
            }
        }
    }
}

fn parse_channel_key(s: &str) -> Result<ChannelKey, &'static str> {
    ChannelKey::from_hex(s).ok_or("malformed channel key")
}

/// Translate a coordinator reply into its wire form.
fn reply_message(reply: CommandReply) -> ServerMessage {
    match reply {
        CommandReply::MatchCreated {
            channel,
            participants,
            expires_at,
        } => ServerMessage::MatchCreated(MatchCreatedInfo {
            channel: channel.to_hex(),
            participants: participants_hex(&participants),
            expires_at,
        }),
        CommandReply::SubmissionRecorded {
            channel,
            participant,
        } => ServerMessage::SubmissionAck {
            channel: channel.to_hex(),
            participant: participant.to_hex(),
        },
        CommandReply::Revealed(disclosure) => ServerMessage::Disclosure(DisclosureInfo {
            channel: disclosure.channel.to_hex(),
            participants: participants_hex(&disclosure.participants),
            values: disclosure.values,
        }),
        CommandReply::Rejected(error) => {
            let message = error.to_string();
            error_message(error_code(&error), &message)
        }
        CommandReply::Failed { message } => error_message(ErrorCode::Internal, &message),
    }
}

fn error_code(error: &MatchError) -> ErrorCode {
    match error {
        MatchError::AlreadyExists => ErrorCode::AlreadyExists,
        MatchError::NoSuchMatch => ErrorCode::NoSuchMatch,
        MatchError::NotAParticipant => ErrorCode::NotAParticipant,
        MatchError::Incomplete { .. } => ErrorCode::Incomplete,
        MatchError::IdenticalParticipants => ErrorCode::InvalidInput,
    }
}

fn error_message(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error(ServerError {
        code,
        message: message.to_string(),
    })
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::channel::InMemoryChannels;

    fn participant() -> ParticipantId {
        ParticipantId::new([1; 16])
    }

    #[test]
    fn test_to_command_parses_hex_ids() {
        let msg = ClientMessage::StartMatch {
            opponent: "02".repeat(16),
        };
        let command =
            ExchangeServer::<InMemoryChannels>::to_command(msg, participant()).unwrap();
        match command {
            MatchCommand::Start {
                initiator,
                opponent,
            } => {
                assert_eq!(initiator, participant());
                assert_eq!(opponent, ParticipantId::new([2; 16]));
            }
            other => panic!("expected Start, got {:?}", other),
        }
    }

    #[test]
    fn test_to_command_rejects_malformed_keys() {
        let msg = ClientMessage::Reveal {
            channel: "zz-not-hex".into(),
        };
        let result = ExchangeServer::<InMemoryChannels>::to_command(msg, participant());
        assert!(result.is_err());
    }

    #[test]
    fn test_reply_message_never_carries_values_on_failure() {
        let reply = CommandReply::Rejected(MatchError::Incomplete {
            awaiting: vec![participant()],
        });
        match reply_message(reply) {
            ServerMessage::Error(err) => {
                assert_eq!(err.code, ErrorCode::Incomplete);
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(error_code(&MatchError::NoSuchMatch), ErrorCode::NoSuchMatch);
        assert_eq!(
            error_code(&MatchError::NotAParticipant),
            ErrorCode::NotAParticipant
        );
        assert_eq!(
            error_code(&MatchError::IdenticalParticipants),
            ErrorCode::InvalidInput
        );
    }

    #[tokio::test]
    async fn test_server_construction_and_shutdown_signal() {
        let server = ExchangeServer::new(
            ServerConfig::default(),
            AuthConfig::default(),
            Arc::new(InMemoryChannels::new()),
        );
        assert_eq!(server.coordinator().registry().active_matches(), 0);
        // No subscribers yet; send just reports zero receivers.
        server.shutdown();
    }
}
