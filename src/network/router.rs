//! Command Routing
//!
//! Bridges the transport edge to the exchange gates through a closed command
//! type. The coordinator is the only place external effects happen, and the
//! ordering discipline is fixed: commit the in-memory state transition
//! first, then perform provider I/O. A provider failure is logged and
//! degrades gracefully; it can never leave match state inconsistent.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::exchange::expiry::ExpiryScheduler;
use crate::exchange::registry::MatchRegistry;
use crate::exchange::reveal::{Disclosure, RevealGate};
use crate::exchange::state::{ChannelKey, MatchError, ParticipantId};
use crate::exchange::submit::SubmissionGate;
use crate::network::channel::ChannelProvider;
use crate::DEFAULT_EXPIRY_SECS;

/// The closed set of operations a transport can request.
#[derive(Debug, Clone)]
pub enum MatchCommand {
    /// Start a match: create the isolated channel, register the record, arm
    /// the expiry deadline.
    Start {
        /// The requesting participant, slot A.
        initiator: ParticipantId,
        /// The opposing participant, slot B.
        opponent: ParticipantId,
    },
    /// Explicit submission command.
    Submit {
        /// Hosting channel.
        channel: ChannelKey,
        /// Who is submitting.
        submitter: ParticipantId,
        /// The sealed value.
        value: String,
    },
    /// Explicit reveal request.
    Reveal {
        /// Hosting channel.
        channel: ChannelKey,
    },
    /// Raw content observed in-channel, the implicit submission path. Goes
    /// through the identical submit contract, then the source message is
    /// scrubbed from the channel, best effort.
    RawMessage {
        /// Hosting channel.
        channel: ChannelKey,
        /// Author of the observed message.
        author: ParticipantId,
        /// Platform message id, for scrubbing.
        message_id: u64,
        /// The observed content.
        content: String,
    },
}

/// What the coordinator hands back to the requesting transport. Failure
/// variants are for the requester's eyes only; the shared channel sees at
/// most identity acknowledgments and the final disclosure.
#[derive(Debug, Clone)]
pub enum CommandReply {
    /// A match is up and its expiry deadline armed.
    MatchCreated {
        /// The freshly created channel.
        channel: ChannelKey,
        /// Participant pair in slot order.
        participants: [ParticipantId; 2],
        /// When the match expires.
        expires_at: DateTime<Utc>,
    },
    /// A submission was recorded (possibly overwriting a prior one).
    SubmissionRecorded {
        /// Hosting channel.
        channel: ChannelKey,
        /// Who submitted.
        participant: ParticipantId,
    },
    /// The reveal succeeded; the disclosure was also posted to the channel.
    Revealed(Disclosure),
    /// The state machine rejected the command.
    Rejected(MatchError),
    /// A collaborator failed before the state machine was reached.
    Failed {
        /// Requester-safe description.
        message: String,
    },
}

/// Routes commands to the gates and performs external effects afterwards.
pub struct Coordinator<P: ChannelProvider> {
    registry: Arc<MatchRegistry>,
    submissions: SubmissionGate,
    reveals: RevealGate,
    scheduler: ExpiryScheduler,
    channels: Arc<P>,
    expiry: Duration,
}

impl<P: ChannelProvider + 'static> Coordinator<P> {
    /// Create a coordinator over `channels` with the given match lifetime.
    pub fn new(channels: Arc<P>, expiry: Duration) -> Self {
        let registry = Arc::new(MatchRegistry::new());
        Self {
            submissions: SubmissionGate::new(registry.clone()),
            reveals: RevealGate::new(registry.clone()),
            scheduler: ExpiryScheduler::new(),
            registry,
            channels,
            expiry,
        }
    }

    /// The shared registry (for observability and tests).
    pub fn registry(&self) -> &Arc<MatchRegistry> {
        &self.registry
    }

    /// Route one command.
    pub async fn handle(&self, command: MatchCommand) -> CommandReply {
        match command {
            MatchCommand::Start {
                initiator,
                opponent,
            } => self.start(initiator, opponent).await,
            MatchCommand::Submit {
                channel,
                submitter,
                value,
            } => self.submit(channel, submitter, value).await,
            MatchCommand::Reveal { channel } => self.reveal(channel).await,
            MatchCommand::RawMessage {
                channel,
                author,
                message_id,
                content,
            } => self.raw_message(channel, author, message_id, content).await,
        }
    }

    async fn start(&self, initiator: ParticipantId, opponent: ParticipantId) -> CommandReply {
        if initiator == opponent {
            return CommandReply::Rejected(MatchError::IdenticalParticipants);
        }
        let pair = [initiator, opponent];

        let channel = match self.channels.create_isolated_channel(pair).await {
            Ok(channel) => channel,
            Err(e) => {
                error!("Failed to create match channel: {}", e);
                return CommandReply::Failed {
                    message: "could not create the match channel".into(),
                };
            }
        };

        if let Err(e) = self.registry.create(channel, pair) {
            // Fresh key collided with a live match; undo the channel.
            if let Err(del) = self.channels.delete_channel(&channel).await {
                warn!("Failed to delete orphaned channel {}: {}", channel.to_hex(), del);
            }
            return CommandReply::Rejected(e);
        }

        info!(
            "Match created in channel {} for {} vs {}",
            channel.to_hex(),
            initiator.short_hex(),
            opponent.short_hex()
        );

        // Expiry runs to completion even if the match is revealed first;
        // retire is idempotent and the channel teardown is unconditional.
        let registry = self.registry.clone();
        let channels = self.channels.clone();
        self.scheduler.arm(channel, self.expiry, move || async move {
            if registry.retire(&channel) {
                info!("Match in channel {} expired before reveal", channel.to_hex());
            }
            if let Err(e) = channels.delete_channel(&channel).await {
                warn!("Failed to delete expired channel {}: {}", channel.to_hex(), e);
            }
        });

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.expiry)
                .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_EXPIRY_SECS as i64));

        let welcome = format!(
            "Sealed exchange between {} and {}. Each of you submits one value; \
             nothing is shown until both are in. This channel closes in {}s.",
            initiator.short_hex(),
            opponent.short_hex(),
            self.expiry.as_secs()
        );
        if let Err(e) = self.channels.post_message(&channel, &welcome).await {
            warn!("Failed to post welcome to {}: {}", channel.to_hex(), e);
        }

        CommandReply::MatchCreated {
            channel,
            participants: pair,
            expires_at,
        }
    }

    async fn submit(
        &self,
        channel: ChannelKey,
        submitter: ParticipantId,
        value: String,
    ) -> CommandReply {
        match self.submissions.submit(&channel, &submitter, value) {
            Ok(()) => {
                self.acknowledge(&channel, &submitter).await;
                CommandReply::SubmissionRecorded {
                    channel,
                    participant: submitter,
                }
            }
            Err(e) => CommandReply::Rejected(e),
        }
    }

    async fn reveal(&self, channel: ChannelKey) -> CommandReply {
        match self.reveals.reveal(&channel) {
            Ok(disclosure) => {
                // The record is already gone; a posting failure here is
                // reported but the disclosure still reaches the requester.
                let text = format_disclosure(&disclosure);
                if let Err(e) = self.channels.post_message(&channel, &text).await {
                    error!("Failed to post disclosure to {}: {}", channel.to_hex(), e);
                }
                CommandReply::Revealed(disclosure)
            }
            Err(e) => CommandReply::Rejected(e),
        }
    }

    async fn raw_message(
        &self,
        channel: ChannelKey,
        author: ParticipantId,
        message_id: u64,
        content: String,
    ) -> CommandReply {
        match self.submissions.submit(&channel, &author, content) {
            Ok(()) => {
                // Capture committed; scrubbing is best effort and its
                // failure is reported to the channel, never to the capture.
                if let Err(e) = self.channels.scrub_message(&channel, message_id).await {
                    warn!(
                        "Failed to scrub message {} in {}: {}",
                        message_id,
                        channel.to_hex(),
                        e
                    );
                    let notice =
                        "Captured your submission but could not remove the message. \
                         Please delete it yourself.";
                    if let Err(e) = self.channels.post_message(&channel, notice).await {
                        warn!("Failed to post scrub notice to {}: {}", channel.to_hex(), e);
                    }
                }
                self.acknowledge(&channel, &author).await;
                CommandReply::SubmissionRecorded {
                    channel,
                    participant: author,
                }
            }
            Err(e) => CommandReply::Rejected(e),
        }
    }

    /// Post the identity-only acknowledgment into the shared channel.
    async fn acknowledge(&self, channel: &ChannelKey, participant: &ParticipantId) {
        let ack = format!("{} has submitted.", participant.short_hex());
        if let Err(e) = self.channels.post_message(channel, &ack).await {
            debug!("Failed to post ack to {}: {}", channel.to_hex(), e);
        }
    }
}

/// Render a disclosure for the shared channel.
fn format_disclosure(disclosure: &Disclosure) -> String {
    format!(
        "Simultaneous reveal!\n{}: {}\n{}: {}",
        disclosure.participants[0].short_hex(),
        disclosure.values[0],
        disclosure.participants[1].short_hex(),
        disclosure.values[1],
    )
}

// =============================================================================
// TESTS
// =============================================================================
