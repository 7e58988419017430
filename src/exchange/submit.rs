//! Submission Gate
//!
//! Validates and applies a submission against the match hosted in a channel.
//! Both ingress paths (the explicit command and the raw in-channel message)
//! funnel through [`SubmissionGate::submit`] with an identical contract.

use std::sync::Arc;

use crate::exchange::registry::MatchRegistry;
use crate::exchange::state::{ChannelKey, MatchError, ParticipantId};

/// Applies submissions to the registry.
///
/// A submission never discloses anything: the stored value is invisible to
/// the other participant and to third parties until a successful reveal.
/// The only signal a caller may forward is the submitter's identity.
#[derive(Debug, Clone)]
pub struct SubmissionGate {
    registry: Arc<MatchRegistry>,
}

impl SubmissionGate {
    /// Create a gate over the shared registry.
    pub fn new(registry: Arc<MatchRegistry>) -> Self {
        Self { registry }
    }

    /// Record `value` in the submitter's slot.
    ///
    /// Overwrites any prior value for that slot: the last write before
    /// reveal or expiry wins. Submitting is independent per slot and never
    /// triggers a reveal; that is always a separate, explicit request.
    ///
    /// Fails with [`MatchError::NoSuchMatch`] if the channel has no active
    /// match and [`MatchError::NotAParticipant`] if the submitter is not one
    /// of the two fixed participants (in which case neither slot is touched).
    pub fn submit(
        &self,
        channel: &ChannelKey,
        submitter: &ParticipantId,
        value: String,
    ) -> Result<(), MatchError> {
        self.registry
            .with_state(channel, |state| match state.slot_of(submitter) {
                Some(slot) => {
                    state.record(slot, value);
                    Ok(())
                }
                None => Err(MatchError::NotAParticipant),
            })
            .unwrap_or(Err(MatchError::NoSuchMatch))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn setup() -> (Arc<MatchRegistry>, SubmissionGate, ChannelKey) {
        let registry = Arc::new(MatchRegistry::new());
        let gate = SubmissionGate::new(registry.clone());
        let channel = ChannelKey::new([5; 16]);
        registry
            .create(channel, [ParticipantId::new([1; 16]), ParticipantId::new([2; 16])])
            .unwrap();
        (registry, gate, channel)
    }

    #[test]
    fn test_submit_unknown_channel() {
        let registry = Arc::new(MatchRegistry::new());
        let gate = SubmissionGate::new(registry);
        let result = gate.submit(
            &ChannelKey::new([9; 16]),
            &ParticipantId::new([1; 16]),
            "x".into(),
        );
        assert_eq!(result, Err(MatchError::NoSuchMatch));
    }

    #[test]
    fn test_submit_records_value() {
        let (registry, gate, channel) = setup();
        gate.submit(&channel, &ParticipantId::new([1; 16]), "rock".into())
            .unwrap();
        assert_eq!(registry.get(&channel).unwrap().filled, [true, false]);
    }

    #[test]
    fn test_outsider_rejected_without_mutation() {
        let (registry, gate, channel) = setup();
        let result = gate.submit(&channel, &ParticipantId::new([9; 16]), "spy".into());
        assert_eq!(result, Err(MatchError::NotAParticipant));
        assert_eq!(registry.get(&channel).unwrap().filled, [false, false]);
    }

    #[test]
    fn test_submit_after_retire_fails() {
        let (registry, gate, channel) = setup();
        registry.retire(&channel);
        let result = gate.submit(&channel, &ParticipantId::new([1; 16]), "late".into());
        assert_eq!(result, Err(MatchError::NoSuchMatch));
    }

    #[test]
    fn test_repeated_submits_overwrite() {
        let (registry, gate, channel) = setup();
        let submitter = ParticipantId::new([1; 16]);

        let mut rng = rand::thread_rng();
        let mut last = String::new();
        for _ in 0..20 {
            last = format!("value-{}", rng.gen::<u32>());
            gate.submit(&channel, &submitter, last.clone()).unwrap();
        }

        // Only slot A is filled, and it holds the last write.
        let held = registry
            .with_state(&channel, |m| m.record(0, "probe".into()))
            .unwrap();
        assert_eq!(held, Some(last));
        assert_eq!(registry.get(&channel).unwrap().filled, [true, false]);
    }
}
