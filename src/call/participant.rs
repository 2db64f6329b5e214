//! Models of the remote participants of a call.

use std::{collections::HashMap, rc::Rc, time::Duration};

use chrono::{DateTime, Utc};
use futures::stream::LocalBoxStream;
use medea_reactive::ObservableCell;

use crate::{
    media::MediaStream,
    peer::{ExtendedIceConnectionState, PeerId},
    signalling::{SessionId, UserId},
    utils::Clock,
};

use super::video_blocker::RemoteVideoBlocker;

/// Raised hand of a participant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RaisedHand {
    /// Whether the hand is raised.
    pub state: bool,

    /// When the hand was raised or lowered.
    pub timestamp: DateTime<Utc>,
}

/// Remote participant of a call, as seen by the UI.
///
/// Every attribute is observable: its `subscribe_*` stream yields every
/// change.
#[derive(Debug)]
pub struct CallParticipant {
    session_id: SessionId,
    user_id: ObservableCell<Option<UserId>>,
    internal: ObservableCell<bool>,
    name: ObservableCell<Option<String>>,

    /// Connection carrying the device media of this participant.
    peer: ObservableCell<Option<PeerId>>,

    /// Connection carrying the screen of this participant.
    screen_peer: ObservableCell<Option<PeerId>>,

    connection_state: ObservableCell<Option<ExtendedIceConnectionState>>,
    stream: ObservableCell<Option<MediaStream>>,
    screen: ObservableCell<Option<MediaStream>>,

    /// [`None`] while unknown.
    audio_available: ObservableCell<Option<bool>>,

    /// [`None`] while unknown.
    video_available: ObservableCell<Option<bool>>,

    speaking: ObservableCell<bool>,
    raised_hand: ObservableCell<RaisedHand>,
    video_blocked: ObservableCell<bool>,
}

impl CallParticipant {
    /// Creates new [`CallParticipant`] of the provided session.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            user_id: ObservableCell::new(None),
            internal: ObservableCell::new(false),
            name: ObservableCell::new(None),
            peer: ObservableCell::new(None),
            screen_peer: ObservableCell::new(None),
            connection_state: ObservableCell::new(None),
            stream: ObservableCell::new(None),
            screen: ObservableCell::new(None),
            audio_available: ObservableCell::new(None),
            video_available: ObservableCell::new(None),
            speaking: ObservableCell::new(false),
            raised_hand: ObservableCell::new(RaisedHand {
                state: false,
                timestamp: Utc::now(),
            }),
            video_blocked: ObservableCell::new(false),
        }
    }

    #[inline]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[inline]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id.get()
    }

    #[inline]
    pub fn set_user_id(&self, user_id: Option<UserId>) {
        self.user_id.set(user_id);
    }

    /// Indicates whether this participant is an internal client.
    #[inline]
    pub fn is_internal(&self) -> bool {
        self.internal.get()
    }

    #[inline]
    pub fn set_internal(&self, internal: bool) {
        self.internal.set(internal);
    }

    /// Returns the display name of this participant.
    #[inline]
    pub fn name(&self) -> Option<String> {
        self.name.get()
    }

    #[inline]
    pub fn set_name(&self, name: Option<String>) {
        self.name.set(name);
    }

    #[inline]
    pub fn subscribe_name(&self) -> LocalBoxStream<'static, Option<String>> {
        self.name.subscribe()
    }

    /// Returns [`PeerId`] of the device media connection.
    #[inline]
    pub fn peer(&self) -> Option<PeerId> {
        self.peer.get()
    }

    /// Sets the device media connection.
    ///
    /// Without a connection no media is received from this participant, so
    /// its media is marked unavailable.
    pub fn set_peer(&self, peer: Option<PeerId>) {
        if peer.is_none() {
            self.connection_state.set(None);
            self.stream.set(None);
            self.audio_available.set(Some(false));
            self.video_available.set(Some(false));
            self.speaking.set(false);
        } else {
            self.audio_available.set(None);
            self.video_available.set(None);
        }
        self.peer.set(peer);
    }

    /// Returns [`PeerId`] of the screen connection.
    #[inline]
    pub fn screen_peer(&self) -> Option<PeerId> {
        self.screen_peer.get()
    }

    /// Sets the screen connection.
    pub fn set_screen_peer(&self, peer: Option<PeerId>) {
        if peer.is_none() {
            self.screen.set(None);
        }
        self.screen_peer.set(peer);
    }

    /// Forgets the provided connection if it's one of this participant.
    pub(super) fn peer_ended(&self, id: &PeerId) {
        if self.peer.borrow().as_ref() == Some(id) {
            self.peer.set(None);
            self.connection_state.set(None);
            self.stream.set(None);
        }
        if self.screen_peer.borrow().as_ref() == Some(id) {
            self.set_screen_peer(None);
        }
    }

    #[inline]
    pub fn connection_state(&self) -> Option<ExtendedIceConnectionState> {
        self.connection_state.get()
    }

    #[inline]
    pub fn set_connection_state(&self, state: ExtendedIceConnectionState) {
        self.connection_state.set(Some(state));
    }

    #[inline]
    pub fn subscribe_connection_state(
        &self,
    ) -> LocalBoxStream<'static, Option<ExtendedIceConnectionState>> {
        self.connection_state.subscribe()
    }

    /// Returns the received device media.
    #[inline]
    pub fn stream(&self) -> Option<MediaStream> {
        self.stream.get()
    }

    #[inline]
    pub fn set_stream(&self, stream: Option<MediaStream>) {
        self.stream.set(stream);
    }

    /// Returns the received screen.
    #[inline]
    pub fn screen(&self) -> Option<MediaStream> {
        self.screen.get()
    }

    #[inline]
    pub fn set_screen(&self, screen: Option<MediaStream>) {
        self.screen.set(screen);
    }

    #[inline]
    pub fn subscribe_screen(
        &self,
    ) -> LocalBoxStream<'static, Option<MediaStream>> {
        self.screen.subscribe()
    }

    #[inline]
    pub fn audio_available(&self) -> Option<bool> {
        self.audio_available.get()
    }

    #[inline]
    pub fn set_audio_available(&self, available: bool) {
        self.audio_available.set(Some(available));
    }

    #[inline]
    pub fn subscribe_audio_available(
        &self,
    ) -> LocalBoxStream<'static, Option<bool>> {
        self.audio_available.subscribe()
    }

    #[inline]
    pub fn video_available(&self) -> Option<bool> {
        self.video_available.get()
    }

    #[inline]
    pub fn set_video_available(&self, available: bool) {
        self.video_available.set(Some(available));
    }

    #[inline]
    pub fn subscribe_video_available(
        &self,
    ) -> LocalBoxStream<'static, Option<bool>> {
        self.video_available.subscribe()
    }

    #[inline]
    pub fn is_speaking(&self) -> bool {
        self.speaking.get()
    }

    #[inline]
    pub fn set_speaking(&self, speaking: bool) {
        self.speaking.set(speaking);
    }

    #[inline]
    pub fn subscribe_speaking(&self) -> LocalBoxStream<'static, bool> {
        self.speaking.subscribe()
    }

    #[inline]
    pub fn raised_hand(&self) -> RaisedHand {
        self.raised_hand.get()
    }

    #[inline]
    pub fn set_raised_hand(&self, raised: RaisedHand) {
        self.raised_hand.set(raised);
    }

    #[inline]
    pub fn subscribe_raised_hand(&self) -> LocalBoxStream<'static, RaisedHand> {
        self.raised_hand.subscribe()
    }

    /// Indicates whether the video of this participant should not be
    /// received.
    #[inline]
    pub fn is_video_blocked(&self) -> bool {
        self.video_blocked.get()
    }

    #[inline]
    pub fn set_video_blocked(&self, blocked: bool) {
        self.video_blocked.set(blocked);
    }

    #[inline]
    pub fn subscribe_video_blocked(&self) -> LocalBoxStream<'static, bool> {
        self.video_blocked.subscribe()
    }
}

/// [`CallParticipant`] with its [`RemoteVideoBlocker`].
#[derive(Debug)]
struct Entry {
    participant: Rc<CallParticipant>,
    blocker: Rc<RemoteVideoBlocker>,
}

/// Collection of the remote [`CallParticipant`]s of a call.
pub struct CallParticipantCollection {
    participants: HashMap<SessionId, Entry>,

    /// [`Clock`] of the [`RemoteVideoBlocker`]s.
    clock: Rc<dyn Clock>,

    /// Grace period of the [`RemoteVideoBlocker`]s.
    block_delay: Duration,
}

impl_debug_by_struct_name!(CallParticipantCollection);

impl CallParticipantCollection {
    /// Creates new empty [`CallParticipantCollection`].
    pub fn new(clock: Rc<dyn Clock>, block_delay: Duration) -> Self {
        Self {
            participants: HashMap::new(),
            clock,
            block_delay,
        }
    }

    /// Returns [`CallParticipant`] of the provided session.
    pub fn get(&self, session_id: &SessionId) -> Option<Rc<CallParticipant>> {
        self.participants
            .get(session_id)
            .map(|e| Rc::clone(&e.participant))
    }

    /// Returns [`RemoteVideoBlocker`] of the provided session.
    pub fn video_blocker(
        &self,
        session_id: &SessionId,
    ) -> Option<Rc<RemoteVideoBlocker>> {
        self.participants
            .get(session_id)
            .map(|e| Rc::clone(&e.blocker))
    }

    /// Returns [`CallParticipant`] of the provided session creating it if
    /// there is none.
    ///
    /// The boolean is `true` if the [`CallParticipant`] was created.
    pub fn get_or_add(
        &mut self,
        session_id: &SessionId,
    ) -> (Rc<CallParticipant>, bool) {
        if let Some(existing) = self.get(session_id) {
            return (existing, false);
        }
        let participant = Rc::new(CallParticipant::new(session_id.clone()));
        let blocker = Rc::new(RemoteVideoBlocker::new(
            Rc::clone(&participant),
            Rc::clone(&self.clock),
            self.block_delay,
        ));
        drop(self.participants.insert(
            session_id.clone(),
            Entry {
                participant: Rc::clone(&participant),
                blocker,
            },
        ));
        (participant, true)
    }

    /// Removes [`CallParticipant`] of the provided session.
    pub fn remove(
        &mut self,
        session_id: &SessionId,
    ) -> Option<Rc<CallParticipant>> {
        self.participants.remove(session_id).map(|e| e.participant)
    }

    /// Returns the sessions of all the [`CallParticipant`]s, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.participants.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Iterates over all the [`CallParticipant`]s.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<CallParticipant>> {
        self.participants.values().map(|e| &e.participant)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Returns the earliest moment some [`RemoteVideoBlocker`] should be
    /// polled at.
    pub fn next_deadline(&self) -> Option<std::time::Instant> {
        self.participants
            .values()
            .filter_map(|e| e.blocker.next_deadline())
            .min()
    }

    /// Polls every [`RemoteVideoBlocker`].
    pub fn poll(&self) {
        for entry in self.participants.values() {
            entry.blocker.poll();
        }
    }
}

#[cfg(test)]
mod spec {
    use std::{rc::Rc, time::Duration};

    use futures::{executor, StreamExt as _};

    use crate::{
        peer::PeerId,
        signalling::SessionId,
        utils::ManualClock,
    };

    use super::{CallParticipant, CallParticipantCollection};

    #[test]
    fn no_peer_means_no_media() {
        let participant = CallParticipant::new("a".into());
        assert_eq!(participant.audio_available(), None);

        participant.set_peer(None);

        assert_eq!(participant.audio_available(), Some(false));
        assert_eq!(participant.video_available(), Some(false));
    }

    #[test]
    fn ended_peer_is_forgotten() {
        let participant = CallParticipant::new("a".into());
        let video = PeerId::video("a".into());
        let screen = PeerId::screen("a".into());
        participant.set_peer(Some(video.clone()));
        participant.set_screen_peer(Some(screen.clone()));

        participant.peer_ended(&screen);
        assert_eq!(participant.peer(), Some(video.clone()));
        assert_eq!(participant.screen_peer(), None);

        participant.peer_ended(&video);
        assert_eq!(participant.peer(), None);
    }

    #[test]
    fn speaking_is_observable() {
        let participant = CallParticipant::new("a".into());
        let speaking = participant.subscribe_speaking();

        participant.set_speaking(true);
        participant.set_speaking(false);

        assert_eq!(
            executor::block_on(speaking.take(3).collect::<Vec<_>>()),
            vec![false, true, false],
        );
    }

    #[test]
    fn collection_adds_once() {
        let mut participants = CallParticipantCollection::new(
            Rc::new(ManualClock::new()),
            Duration::from_secs(5),
        );
        let session = SessionId::from("a");

        let (first, created) = participants.get_or_add(&session);
        assert!(created);
        let (second, created) = participants.get_or_add(&session);
        assert!(!created);
        assert!(Rc::ptr_eq(&first, &second));
        assert!(participants.video_blocker(&session).is_some());

        assert!(participants.remove(&session).is_some());
        assert!(participants.remove(&session).is_none());
        assert!(participants.is_empty());
        assert_eq!(participants.next_deadline(), None);
    }

    #[test]
    fn collection_is_debug_by_name() {
        let participants = CallParticipantCollection::new(
            Rc::new(ManualClock::new()),
            Duration::from_secs(5),
        );

        assert_eq!(
            format!("{:?}", participants),
            "CallParticipantCollection",
        );
    }
}
