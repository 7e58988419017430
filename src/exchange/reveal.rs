//! Reveal Gate
//!
//! Readiness check and exactly-once disclosure. The readiness check and the
//! retire are one atomic registry step, so a reveal can never interleave
//! with a concurrently firing expiry: whichever removes the record first
//! owns termination, and the loser observes the record already gone.

use std::sync::Arc;

use crate::exchange::registry::{MatchRegistry, RemoveOutcome};
use crate::exchange::state::{ChannelKey, MatchError, MatchState, ParticipantId};

/// The payload of a successful reveal: both participants in slot order and
/// their submitted values in matching order. Handed to the transport edge
/// for formatting and disclosure in the shared channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disclosure {
    /// The channel whose match was revealed.
    pub channel: ChannelKey,
    /// Participant pair in slot order.
    pub participants: [ParticipantId; 2],
    /// Submitted values, index-matched to `participants`.
    pub values: [String; 2],
}

/// Produces disclosures from the registry.
#[derive(Debug, Clone)]
pub struct RevealGate {
    registry: Arc<MatchRegistry>,
}

impl RevealGate {
    /// Create a gate over the shared registry.
    pub fn new(registry: Arc<MatchRegistry>) -> Self {
        Self { registry }
    }

    /// Disclose both values and retire the match, exactly once.
    ///
    /// Fails with [`MatchError::NoSuchMatch`] if the channel has no active
    /// match (including the case where a reveal or expiry retired it a
    /// moment earlier) and with [`MatchError::Incomplete`] if either slot
    /// is still unset. An incomplete reveal leaves the record in place and
    /// reports only *who* has not submitted, never any value.
    pub fn reveal(&self, channel: &ChannelKey) -> Result<Disclosure, MatchError> {
        match self.registry.remove_if(channel, MatchState::is_complete) {
            RemoveOutcome::Removed(state) => {
                let channel = state.channel;
                // take_values cannot miss here: completeness was checked
                // under the same lock that removed the record.
                let (participants, values) =
                    state.take_values().ok_or(MatchError::NoSuchMatch)?;
                Ok(Disclosure {
                    channel,
                    participants,
                    values,
                })
            }
            RemoveOutcome::Kept(summary) => Err(MatchError::Incomplete {
                awaiting: summary.awaiting(),
            }),
            RemoveOutcome::Absent => Err(MatchError::NoSuchMatch),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::submit::SubmissionGate;

    fn p1() -> ParticipantId {
        ParticipantId::new([1; 16])
    }

    fn p2() -> ParticipantId {
        ParticipantId::new([2; 16])
    }

    fn setup() -> (Arc<MatchRegistry>, SubmissionGate, RevealGate, ChannelKey) {
        let registry = Arc::new(MatchRegistry::new());
        let submit = SubmissionGate::new(registry.clone());
        let reveal = RevealGate::new(registry.clone());
        let channel = ChannelKey::new([5; 16]);
        registry.create(channel, [p1(), p2()]).unwrap();
        (registry, submit, reveal, channel)
    }

    #[test]
    fn test_reveal_unknown_channel() {
        let registry = Arc::new(MatchRegistry::new());
        let gate = RevealGate::new(registry);
        let result = gate.reveal(&ChannelKey::new([9; 16]));
        assert_eq!(result, Err(MatchError::NoSuchMatch));
    }

    #[test]
    fn test_reveal_with_no_submissions_reports_both() {
        let (_registry, _submit, reveal, channel) = setup();
        let result = reveal.reveal(&channel);
        assert_eq!(
            result,
            Err(MatchError::Incomplete {
                awaiting: vec![p1(), p2()]
            })
        );
    }

    #[test]
    fn test_incomplete_reveal_keeps_the_record() {
        let (registry, submit, reveal, channel) = setup();
        submit.submit(&channel, &p1(), "x".into()).unwrap();

        let result = reveal.reveal(&channel);
        assert_eq!(
            result,
            Err(MatchError::Incomplete {
                awaiting: vec![p2()]
            })
        );
        assert!(registry.get(&channel).is_some());

        // Completing afterwards still succeeds.
        submit.submit(&channel, &p2(), "y".into()).unwrap();
        assert!(reveal.reveal(&channel).is_ok());
    }

    #[test]
    fn test_reveal_is_exactly_once() {
        let (registry, submit, reveal, channel) = setup();
        submit.submit(&channel, &p1(), "x".into()).unwrap();
        submit.submit(&channel, &p2(), "y".into()).unwrap();

        let disclosure = reveal.reveal(&channel).unwrap();
        assert_eq!(disclosure.participants, [p1(), p2()]);
        assert_eq!(disclosure.values, ["x".to_string(), "y".to_string()]);
        assert!(registry.get(&channel).is_none());

        assert_eq!(reveal.reveal(&channel), Err(MatchError::NoSuchMatch));
    }

    #[test]
    fn test_overwrite_then_reveal_discloses_last_write() {
        let (_registry, submit, reveal, channel) = setup();
        submit.submit(&channel, &p1(), "rock".into()).unwrap();
        submit.submit(&channel, &p1(), "paper".into()).unwrap();
        submit.submit(&channel, &p2(), "scissors".into()).unwrap();

        let disclosure = reveal.reveal(&channel).unwrap();
        assert_eq!(
            disclosure.values,
            ["paper".to_string(), "scissors".to_string()]
        );
    }

    #[test]
    fn test_end_to_end_scenario() {
        let (_registry, submit, reveal, channel) = setup();

        submit.submit(&channel, &p1(), "X".into()).unwrap();
        assert!(matches!(
            reveal.reveal(&channel),
            Err(MatchError::Incomplete { .. })
        ));

        submit.submit(&channel, &p2(), "Y".into()).unwrap();
        let disclosure = reveal.reveal(&channel).unwrap();
        assert_eq!(disclosure.values, ["X".to_string(), "Y".to_string()]);

        assert_eq!(reveal.reveal(&channel), Err(MatchError::NoSuchMatch));
    }

    #[test]
    fn test_reveal_vs_concurrent_retire() {
        // Many threads race a reveal against a retire on a complete match.
        // Exactly one side may own termination each round.
        for _ in 0..50 {
            let (registry, submit, reveal, channel) = setup();
            submit.submit(&channel, &p1(), "x".into()).unwrap();
            submit.submit(&channel, &p2(), "y".into()).unwrap();

            let revealer = {
                let reveal = reveal.clone();
                std::thread::spawn(move || reveal.reveal(&channel).is_ok())
            };
            let expirer = {
                let registry = registry.clone();
                std::thread::spawn(move || registry.retire(&channel))
            };

            let revealed = revealer.join().unwrap();
            let expired = expirer.join().unwrap();
            assert!(
                revealed != expired,
                "exactly one of reveal/expiry may remove the record"
            );
            assert!(registry.get(&channel).is_none());
        }
    }
}
