//! Match Registry
//!
//! The process-wide channel -> match table. This is the only shared mutable
//! state in the system; every operation on it runs inside a single lock
//! scope so that create, slot writes, and the read-values-then-retire step
//! of a reveal are each atomic with respect to concurrently firing expiry
//! timers. No external I/O ever happens while the lock is held.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::exchange::state::{ChannelKey, MatchError, MatchState, MatchSummary, ParticipantId};

/// Outcome of a conditional removal, see [`MatchRegistry::remove_if`].
#[derive(Debug)]
pub(crate) enum RemoveOutcome {
    /// The predicate held; the record was removed and is handed to the
    /// caller. The removal is the retire; no second step needed.
    Removed(MatchState),
    /// The record exists but the predicate rejected it. Carries a
    /// presence-only snapshot taken under the same lock.
    Kept(MatchSummary),
    /// No record under this key.
    Absent,
}

/// Shared table of active matches, keyed by hosting channel.
///
/// A record exists in the table if and only if its match has neither been
/// revealed nor expired. Removal ([`retire`](Self::retire)) is idempotent:
/// the first caller observes `true`, every later caller `false`, which is
/// what lets the reveal and expiry paths race safely.
#[derive(Debug, Default)]
pub struct MatchRegistry {
    matches: Mutex<BTreeMap<ChannelKey, MatchState>>,
}

impl MatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh match under `channel` with both slots unset.
    ///
    /// Fails with [`MatchError::AlreadyExists`] if the key is taken and
    /// [`MatchError::IdenticalParticipants`] if the pair is not distinct.
    pub fn create(
        &self,
        channel: ChannelKey,
        participants: [ParticipantId; 2],
    ) -> Result<(), MatchError> {
        if participants[0] == participants[1] {
            return Err(MatchError::IdenticalParticipants);
        }

        let mut table = self.table();
        if table.contains_key(&channel) {
            return Err(MatchError::AlreadyExists);
        }
        table.insert(channel, MatchState::new(channel, participants));
        Ok(())
    }

    /// Presence-only lookup. No side effect, never exposes values.
    pub fn get(&self, channel: &ChannelKey) -> Option<MatchSummary> {
        self.table().get(channel).map(MatchState::summary)
    }

    /// Remove the record if present. Returns whether it was present, which
    /// makes a double retire from the reveal/expiry race a silent no-op.
    pub fn retire(&self, channel: &ChannelKey) -> bool {
        self.table().remove(channel).is_some()
    }

    /// Number of active matches.
    pub fn active_matches(&self) -> usize {
        self.table().len()
    }

    /// Run `f` against the match under `channel` inside the lock scope.
    /// Returns `None` if there is no such match.
    pub(crate) fn with_state<R>(
        &self,
        channel: &ChannelKey,
        f: impl FnOnce(&mut MatchState) -> R,
    ) -> Option<R> {
        self.table().get_mut(channel).map(f)
    }

    /// Atomically remove the record under `channel` if `pred` accepts it.
    ///
    /// This is the single atomic step behind a reveal: the readiness check
    /// and the retire happen under one lock acquisition, so a concurrently
    /// firing expiry can never interleave between them.
    pub(crate) fn remove_if(
        &self,
        channel: &ChannelKey,
        pred: impl FnOnce(&MatchState) -> bool,
    ) -> RemoveOutcome {
        let mut table = self.table();
        match table.get(channel) {
            None => return RemoveOutcome::Absent,
            Some(state) if !pred(state) => return RemoveOutcome::Kept(state.summary()),
            Some(_) => {}
        }
        match table.remove(channel) {
            Some(state) => RemoveOutcome::Removed(state),
            None => RemoveOutcome::Absent,
        }
    }

    /// Lock the table, recovering from poisoning. A poisoned lock only means
    /// a holder panicked; the table itself is always in a consistent state
    /// because every mutation completes within its critical section.
    fn table(&self) -> MutexGuard<'_, BTreeMap<ChannelKey, MatchState>> {
        self.matches.lock().unwrap_or_else(|e| e.into_inner())
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

    #[test]
    fn test_create_and_get() {
        let registry = MatchRegistry::new();
        let channel = ChannelKey::new([5; 16]);

        registry.create(channel, pair()).unwrap();
        assert_eq!(registry.active_matches(), 1);

        let summary = registry.get(&channel).unwrap();
        assert_eq!(summary.participants, pair());
        assert_eq!(summary.filled, [false, false]);
    }

    #[test]
    fn test_create_duplicate_key_rejected() {
        let registry = MatchRegistry::new();
        let channel = ChannelKey::new([5; 16]);

        registry.create(channel, pair()).unwrap();
        let result = registry.create(channel, pair());
        assert_eq!(result, Err(MatchError::AlreadyExists));
        assert_eq!(registry.active_matches(), 1);
    }

    #[test]
    fn test_create_identical_participants_rejected() {
        let registry = MatchRegistry::new();
        let same = ParticipantId::new([1; 16]);
        let result = registry.create(ChannelKey::new([5; 16]), [same, same]);
        assert_eq!(result, Err(MatchError::IdenticalParticipants));
        assert_eq!(registry.active_matches(), 0);
    }

    #[test]
    fn test_retire_is_idempotent() {
        let registry = MatchRegistry::new();
        let channel = ChannelKey::new([5; 16]);
        registry.create(channel, pair()).unwrap();

        assert!(registry.retire(&channel));
        assert!(!registry.retire(&channel));
        assert!(registry.get(&channel).is_none());
    }

    #[test]
    fn test_matches_are_isolated_by_channel() {
        let registry = MatchRegistry::new();
        let chan1 = ChannelKey::new([5; 16]);
        let chan2 = ChannelKey::new([6; 16]);
        registry.create(chan1, pair()).unwrap();
        registry.create(chan2, pair()).unwrap();

        registry
            .with_state(&chan1, |m| m.record(0, "only chan1".into()))
            .unwrap();

        assert_eq!(registry.get(&chan1).unwrap().filled, [true, false]);
        assert_eq!(registry.get(&chan2).unwrap().filled, [false, false]);

        registry.retire(&chan1);
        assert!(registry.get(&chan2).is_some());
    }

    #[test]
    fn test_remove_if_respects_predicate() {
        let registry = MatchRegistry::new();
        let channel = ChannelKey::new([5; 16]);
        registry.create(channel, pair()).unwrap();

        match registry.remove_if(&channel, MatchState::is_complete) {
            RemoveOutcome::Kept(summary) => assert_eq!(summary.filled, [false, false]),
            other => panic!("expected Kept, got {:?}", other),
        }
        assert_eq!(registry.active_matches(), 1);

        registry.with_state(&channel, |m| {
            m.record(0, "a".into());
            m.record(1, "b".into());
        });

        match registry.remove_if(&channel, MatchState::is_complete) {
            RemoveOutcome::Removed(state) => assert!(state.is_complete()),
            other => panic!("expected Removed, got {:?}", other),
        }
        assert_eq!(registry.active_matches(), 0);

        assert!(matches!(
            registry.remove_if(&channel, MatchState::is_complete),
            RemoveOutcome::Absent
        ));
    }
}
