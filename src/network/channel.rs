//! Channel Lifecycle Provider
//!
//! The platform collaborator that owns isolated channels: creating them
//! with access granted to exactly the two participants, posting into them,
//! scrubbing captured messages, and deleting them at teardown. The exchange
//! core never talks to this directly; only the router does, and only after
//! the in-memory state transition has committed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::exchange::state::{ChannelKey, ParticipantId};

/// Channel provider errors. All of these are caught at the boundary and
/// logged. They never corrupt exchange state, which commits first.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The channel does not exist on the platform.
    #[error("channel not found")]
    NotFound,

    /// The message to scrub is gone or inaccessible.
    #[error("message not found")]
    MessageNotFound,

    /// Platform-side failure (rate limit, permissions, outage).
    #[error("platform error: {0}")]
    Platform(String),
}

/// Platform operations the router needs. Implementations are expected to be
/// cheap to call concurrently; the router never invokes them while holding
/// the registry lock.
pub trait ChannelProvider: Send + Sync {
    /// Create an isolated channel visible to exactly `pair`, returning its key.
    fn create_isolated_channel(
        &self,
        pair: [ParticipantId; 2],
    ) -> impl std::future::Future<Output = Result<ChannelKey, ChannelError>> + Send;

    /// Delete a channel. Invoked by the expiry path after the match retired.
    fn delete_channel(
        &self,
        channel: &ChannelKey,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;

    /// Post a message into the channel (acknowledgments, disclosure).
    fn post_message(
        &self,
        channel: &ChannelKey,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;

    /// Remove a captured message from the channel's visible history.
    fn scrub_message(
        &self,
        channel: &ChannelKey,
        message_id: u64,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;
}

// =============================================================================
// IN-MEMORY PROVIDER
// =============================================================================

#[derive(Debug)]
struct ChannelRecord {
    participants: [ParticipantId; 2],
    messages: Vec<(u64, String)>,
}

/// In-memory [`ChannelProvider`] used by the binary and the tests. Mints
/// UUID-backed channel keys and keeps a per-channel message log so tests can
/// assert on what became visible where.
#[derive(Debug, Default)]
pub struct InMemoryChannels {
    channels: Mutex<BTreeMap<ChannelKey, ChannelRecord>>,
    deleted: Mutex<Vec<ChannelKey>>,
    next_message_id: AtomicU64,
    fail_scrubs: AtomicBool,
}

impl InMemoryChannels {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `scrub_message` call fail, to exercise the best-effort
    /// scrub path.
    pub fn set_fail_scrubs(&self, fail: bool) {
        self.fail_scrubs.store(fail, Ordering::Relaxed);
    }

    /// Messages currently visible in a channel, oldest first.
    pub fn visible_messages(&self, channel: &ChannelKey) -> Vec<String> {
        self.table()
            .get(channel)
            .map(|record| record.messages.iter().map(|(_, text)| text.clone()).collect())
            .unwrap_or_default()
    }

    /// Participants granted access to a channel.
    pub fn members(&self, channel: &ChannelKey) -> Option<[ParticipantId; 2]> {
        self.table().get(channel).map(|record| record.participants)
    }

    /// Channels that have been deleted, in deletion order.
    pub fn deleted_channels(&self) -> Vec<ChannelKey> {
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Simulate a participant posting into the channel, returning the
    /// platform message id (the raw ingress path needs it for scrubbing).
    pub fn simulate_message(&self, channel: &ChannelKey, text: &str) -> Option<u64> {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let mut table = self.table();
        let record = table.get_mut(channel)?;
        record.messages.push((id, text.to_string()));
        Some(id)
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<ChannelKey, ChannelRecord>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ChannelProvider for InMemoryChannels {
    async fn create_isolated_channel(
        &self,
        pair: [ParticipantId; 2],
    ) -> Result<ChannelKey, ChannelError> {
        let key = ChannelKey::random();
        self.table().insert(
            key,
            ChannelRecord {
                participants: pair,
                messages: Vec::new(),
            },
        );
        Ok(key)
    }

    async fn delete_channel(&self, channel: &ChannelKey) -> Result<(), ChannelError> {
        if self.table().remove(channel).is_none() {
            return Err(ChannelError::NotFound);
        }
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*channel);
        Ok(())
    }

    async fn post_message(&self, channel: &ChannelKey, text: &str) -> Result<(), ChannelError> {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let mut table = self.table();
        let record = table.get_mut(channel).ok_or(ChannelError::NotFound)?;
        record.messages.push((id, text.to_string()));
        Ok(())
    }

    async fn scrub_message(&self, channel: &ChannelKey, message_id: u64) -> Result<(), ChannelError> {
        if self.fail_scrubs.load(Ordering::Relaxed) {
            return Err(ChannelError::Platform("scrub rejected".into()));
        }
        let mut table = self.table();
        let record = table.get_mut(channel).ok_or(ChannelError::NotFound)?;
        let before = record.messages.len();
        record.messages.retain(|(id, _)| *id != message_id);
        if record.messages.len() == before {
            return Err(ChannelError::MessageNotFound);
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> [ParticipantId; 2] {
        [ParticipantId::new([1; 16]), ParticipantId::new([2; 16])]
    }

    #[tokio::test]
    async fn test_create_post_delete() {
        let channels = InMemoryChannels::new();
        let key = channels.create_isolated_channel(pair()).await.unwrap();
        assert_eq!(channels.members(&key), Some(pair()));

        channels.post_message(&key, "hello").await.unwrap();
        assert_eq!(channels.visible_messages(&key), vec!["hello".to_string()]);

        channels.delete_channel(&key).await.unwrap();
        assert_eq!(channels.deleted_channels(), vec![key]);
        assert!(matches!(
            channels.post_message(&key, "late").await,
            Err(ChannelError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_scrub_removes_only_target() {
        let channels = InMemoryChannels::new();
        let key = channels.create_isolated_channel(pair()).await.unwrap();

        let first = channels.simulate_message(&key, "my secret").unwrap();
        channels.simulate_message(&key, "chatter").unwrap();

        channels.scrub_message(&key, first).await.unwrap();
        assert_eq!(channels.visible_messages(&key), vec!["chatter".to_string()]);

        assert!(matches!(
            channels.scrub_message(&key, first).await,
            Err(ChannelError::MessageNotFound)
        ));
    }

    #[tokio::test]
    async fn test_forced_scrub_failure() {
        let channels = InMemoryChannels::new();
        let key = channels.create_isolated_channel(pair()).await.unwrap();
        let id = channels.simulate_message(&key, "secret").unwrap();

        channels.set_fail_scrubs(true);
        assert!(channels.scrub_message(&key, id).await.is_err());
        // Message stays visible; the router reports this to the channel.
        assert_eq!(channels.visible_messages(&key), vec!["secret".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_unknown_channel() {
        let channels = InMemoryChannels::new();
        let result = channels.delete_channel(&ChannelKey::new([9; 16])).await;
        assert!(matches!(result, Err(ChannelError::NotFound)));
    }
}
