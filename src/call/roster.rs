//! Diffing of roster snapshots and the negotiation role tie-break.

use std::collections::HashSet;

use crate::signalling::{CallFlags, SessionId};

/// Difference between two sets of in-call sessions.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RosterDiff {
    /// Sessions present only in the new set, in their order there.
    pub joined: Vec<SessionId>,

    /// Sessions present only in the old set, in their order there.
    pub left: Vec<SessionId>,
}

impl RosterDiff {
    /// Computes `joined = new - old` and `left = old - new`.
    pub fn between(old: &[SessionId], new: &[SessionId]) -> Self {
        let old_set: HashSet<_> = old.iter().collect();
        let new_set: HashSet<_> = new.iter().collect();
        Self {
            joined: new
                .iter()
                .filter(|s| !old_set.contains(s))
                .cloned()
                .collect(),
            left: old
                .iter()
                .filter(|s| !new_set.contains(s))
                .cloned()
                .collect(),
        }
    }

    /// Indicates whether nothing changed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// What the local session does about a remote session which joined the call
/// without a relay.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Initiation {
    /// Local session sends an offer right away.
    Offer,

    /// Local session waits to be called, and calls itself if no offer
    /// arrives in time.
    AwaitOffer,

    /// No connection is needed until one of the sessions gains media.
    None,
}

/// Decides which side of a mesh connection sends the offer.
///
/// The larger session ID calls the smaller one, so the session joining a
/// room isn't flooded with offers. A session without media is always called
/// by a session with media.
pub fn initiation(
    local: &SessionId,
    local_flags: CallFlags,
    remote: &SessionId,
    remote_flags: CallFlags,
) -> Initiation {
    if !local_flags.has_media() {
        return Initiation::None;
    }
    if !remote_flags.has_media() || remote < local {
        Initiation::Offer
    } else {
        Initiation::AwaitOffer
    }
}

#[cfg(test)]
mod spec {
    use crate::signalling::{CallFlags, SessionId};

    use super::{initiation, Initiation, RosterDiff};

    fn ids(ids: &[&str]) -> Vec<SessionId> {
        ids.iter().map(|s| SessionId::from(*s)).collect()
    }

    #[test]
    fn joined_and_left_are_disjoint() {
        let diff =
            RosterDiff::between(&ids(&["a", "b", "c"]), &ids(&["c", "d"]));

        assert_eq!(diff.joined, ids(&["d"]));
        assert_eq!(diff.left, ids(&["a", "b"]));
        assert!(diff.joined.iter().all(|s| !diff.left.contains(s)));
    }

    #[test]
    fn same_sets_give_empty_diff() {
        assert!(RosterDiff::between(&ids(&["a", "b"]), &ids(&["b", "a"]))
            .is_empty());
        assert!(RosterDiff::between(&[], &[]).is_empty());
    }

    #[test]
    fn larger_session_initiates() {
        let media = CallFlags::IN_CALL | CallFlags::WITH_AUDIO;
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        assert_eq!(initiation(&b, media, &a, media), Initiation::Offer);
        assert_eq!(initiation(&a, media, &b, media), Initiation::AwaitOffer);
    }

    #[test]
    fn session_without_media_is_called() {
        let media = CallFlags::IN_CALL | CallFlags::WITH_VIDEO;
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        assert_eq!(
            initiation(&a, media, &b, CallFlags::IN_CALL),
            Initiation::Offer,
        );
        assert_eq!(
            initiation(&b, CallFlags::IN_CALL, &a, media),
            Initiation::None,
        );
        assert_eq!(
            initiation(&a, CallFlags::IN_CALL, &b, CallFlags::IN_CALL),
            Initiation::None,
        );
    }
}
