//! Reconciliation of the peer connections against the room roster.

use std::{
    collections::{HashMap, HashSet},
    mem,
    rc::Rc,
    time::{Duration, Instant},
};

use chrono::Utc;
use futures::stream::LocalBoxStream;
use serde_json::{json, Value};

use crate::{
    analyzer::{CallAnalyzer, ParticipantAnalyzer},
    conf::Conf,
    log::prelude::*,
    media::{
        pipeline::SpeakingEvent, LocalMediaError, LocalMediaEvent,
        LocalMediaState, MediaKind, MediaStream, Track,
    },
    peer::{
        DisconnectedCheck, PeerAction, PeerEvent, PeerEventKind, PeerId,
        PeerConnection, PeerRepository,
    },
    platform::{NegotiationRole, PeerConnectionFactory, PeerOptions},
    signalling::{
        nick_from_payload, CallFlags, Feature, Message, MessageKind, PeerKind,
        Permissions, RosterEntry, SessionId, Signalling, SignallingEvent,
        SipFlags,
    },
    utils::{Clock, EventEmitter, TimerId, Timers},
};

use super::{
    initiation, CallEvent, CallParticipant, CallParticipantCollection,
    Initiation, MediaErrorReason, RaisedHand, RosterDiff, SessionInput,
};

/// Period of probing whether the media of a relay connection flows.
const MEDIA_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Amount of video bytes a relay sends for an empty frame.
const MIN_VIDEO_BYTES: u64 = 2000;

/// Label of the data channel carrying status messages.
const STATUS_CHANNEL: &str = "status";

/// Label of the data channel carrying status messages forwarded by a relay.
const RELAY_STATUS_CHANNEL: &str = "JanusDataChannel";

/// Timers of a [`CallSession`].
#[derive(Clone, Debug, PartialEq)]
enum Timer {
    /// Checks whether a connection is still disconnected.
    DisconnectedCheck(DisconnectedCheck),

    /// No offer nor answer came from the session, so it's called again.
    OfferRetry(SessionId),

    /// No offer came from the relay for the session, so it's requested
    /// again.
    RequestOfferRetry(SessionId),

    /// Relay didn't answer the publishing connection, so it's offered again.
    OwnPeerRetry,

    /// Sends the local media state and nick once more, the value is the
    /// delay it was scheduled with.
    StateRepetition(Duration),

    /// Checks whether the media of the relay connection flows.
    MediaCheck(PeerId, MediaKind),

    /// Local media is requested for too long.
    LocalStreamRequestTimeout,
}

impl From<DisconnectedCheck> for Timer {
    #[inline]
    fn from(check: DisconnectedCheck) -> Self {
        Self::DisconnectedCheck(check)
    }
}

/// Session of the local participant in a call.
///
/// Keeps a [`PeerConnection`] per remote session (or a single publishing
/// one plus a receiving one per remote session, when media is forwarded by a
/// relay) in line with the room roster reported by [`Signalling`].
///
/// Everything is driven from outside: [`SessionInput`]s are fed with
/// [`CallSession::handle`], and [`CallSession::poll_timers`] must be called
/// at [`CallSession::next_deadline`].
pub struct CallSession {
    conf: Conf,
    signalling: Rc<dyn Signalling>,
    factory: Rc<dyn PeerConnectionFactory>,
    local_media: Rc<dyn LocalMediaState>,

    timers: Timers<Timer>,
    peers: PeerRepository,

    /// Connection publishing the local media to the relay.
    own_peer: Option<PeerId>,

    /// Connection publishing the local screen to the relay.
    own_screen_peer: Option<PeerId>,

    /// Offer and answer retries by session.
    delayed: HashMap<SessionId, TimerId>,

    /// Last known roster of the room.
    roster: HashMap<SessionId, RosterEntry>,

    /// Remote sessions considered in the call.
    previous_in_call: Vec<SessionId>,

    /// Call flags of the local session.
    self_in_call: CallFlags,

    /// Whether the call was joined with media, [`None`] while unknown.
    started_with_media: Option<bool>,

    state_repetition: Option<TimerId>,
    media_checks: HashMap<(PeerId, MediaKind), TimerId>,
    local_stream_request: Option<TimerId>,
    showed_turn_warning: bool,

    /// Whether the call must be joined again once local media starts.
    pending_permissions_reconnect: bool,

    participants: CallParticipantCollection,
    analyzer: CallAnalyzer,
    events: EventEmitter<CallEvent>,
}

impl_debug_by_struct_name!(CallSession);

impl CallSession {
    /// Creates new [`CallSession`] outside of the call.
    pub fn new(
        conf: &Conf,
        signalling: Rc<dyn Signalling>,
        factory: Rc<dyn PeerConnectionFactory>,
        local_media: Rc<dyn LocalMediaState>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let local =
            ParticipantAnalyzer::new(conf.quality.clone(), Rc::clone(&clock));
        Self {
            conf: conf.clone(),
            signalling,
            factory,
            local_media,
            timers: Timers::new(Rc::clone(&clock)),
            peers: PeerRepository::new(),
            own_peer: None,
            own_screen_peer: None,
            delayed: HashMap::new(),
            roster: HashMap::new(),
            previous_in_call: Vec::new(),
            self_in_call: CallFlags::DISCONNECTED,
            started_with_media: None,
            state_repetition: None,
            media_checks: HashMap::new(),
            local_stream_request: None,
            showed_turn_warning: false,
            pending_permissions_reconnect: false,
            participants: CallParticipantCollection::new(
                clock,
                conf.media.remote_video_block_delay,
            ),
            analyzer: CallAnalyzer::new(Some(local)),
            events: EventEmitter::new(),
        }
    }

    /// Returns the remote participants of the call.
    #[inline]
    pub fn participants(&self) -> &CallParticipantCollection {
        &self.participants
    }

    /// Returns the current peer connections.
    #[inline]
    pub fn peers(&self) -> &PeerRepository {
        &self.peers
    }

    /// Returns the quality analyzer of the call.
    #[inline]
    pub fn analyzer(&self) -> &CallAnalyzer {
        &self.analyzer
    }

    /// Returns the call flags of the local session.
    #[inline]
    pub fn self_in_call(&self) -> CallFlags {
        self.self_in_call
    }

    /// Indicates whether the call was joined with media, [`None`] while
    /// unknown.
    #[inline]
    pub fn started_with_media(&self) -> Option<bool> {
        self.started_with_media
    }

    /// Returns [`EventEmitter`] of this [`CallSession`].
    #[inline]
    pub fn events(&self) -> &EventEmitter<CallEvent> {
        &self.events
    }

    /// Subscribes to the [`CallEvent`]s.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, CallEvent> {
        self.events.subscribe()
    }

    /// Returns count of the pending timers of the connections and their
    /// retries.
    #[inline]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Returns the moment [`CallSession::poll_timers`] should be called at.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.timers.next_deadline(),
            self.analyzer.next_deadline(),
            self.participants.next_deadline(),
        ]
        .iter()
        .flatten()
        .min()
        .copied()
    }

    /// Fires all the timers which deadline has passed.
    pub fn poll_timers(&mut self) {
        while let Some(timer) = self.timers.pop_expired() {
            self.on_timer(timer);
        }
        self.analyzer.poll();
        self.participants.poll();
    }

    /// Handles the provided [`SessionInput`].
    pub fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Signalling(event) => {
                self.handle_signalling_event(event);
            }
            SessionInput::Peer(event) => self.handle_peer_event(event),
            SessionInput::LocalMedia(event) => {
                self.handle_local_media_event(event);
            }
        }
    }

    /// Handles the provided [`SignallingEvent`].
    pub fn handle_signalling_event(&mut self, event: SignallingEvent) {
        match event {
            SignallingEvent::UsersInRoom(users) => {
                self.roster = users
                    .iter()
                    .map(|u| (u.session_id.clone(), u.clone()))
                    .collect();
                self.users_in_call_changed();
                self.reconnect_on_permissions_change(&users);
            }
            SignallingEvent::UsersJoined(users) => {
                self.upsert_users(&users);
                self.users_in_call_changed();
            }
            SignallingEvent::UsersChanged(users) => {
                self.upsert_users(&users);
                self.users_in_call_changed();
                self.reconnect_on_permissions_change(&users);
            }
            SignallingEvent::UsersLeft(session_ids) => {
                for session_id in &session_ids {
                    self.roster.remove(session_id);
                }
                self.users_changed(&[], &session_ids);
            }
            SignallingEvent::ParticipantFlagsChanged { session_id, flags } => {
                if let Some(participant) = self.participants.get(&session_id) {
                    participant
                        .set_speaking(flags.contains(SipFlags::SPEAKING));
                    participant.set_audio_available(
                        !flags.contains(SipFlags::MUTE_MICROPHONE),
                    );
                    participant.set_raised_hand(RaisedHand {
                        state: flags.contains(SipFlags::RAISE_HAND),
                        timestamp: Utc::now(),
                    });
                }
            }
            SignallingEvent::Message(message) => self.handle_message(message),
            SignallingEvent::LeaveCall { reconnect } => {
                if !reconnect {
                    self.leave_call();
                }
            }
            SignallingEvent::PullMessagesStoppedOnFail => self.leave_call(),
            SignallingEvent::Disconnected => self.disconnected(),
        }
    }

    /// Handles the provided [`PeerEvent`].
    ///
    /// Events of the connections replaced or ended since are ignored.
    pub fn handle_peer_event(&mut self, event: PeerEvent) {
        let PeerEvent { peer_id, sid, kind } = event;
        let is_current = self
            .peers
            .get(&peer_id)
            .map_or(false, |p| p.sid() == sid && !p.is_ended());
        if !is_current {
            debug!("Ignoring event of stale peer {}", peer_id);
            return;
        }

        let current_flags = self.signalling.current_call_flags();
        let actions = match kind {
            PeerEventKind::StreamAdded(stream) => {
                self.stream_added(&peer_id, stream);
                return;
            }
            PeerEventKind::StreamRemoved => {
                self.stream_removed(&peer_id);
                return;
            }
            PeerEventKind::ChannelMessage {
                label,
                kind,
                payload,
            } => {
                self.handle_channel_message(&peer_id, &label, &kind, &payload);
                return;
            }
            PeerEventKind::IceConnectionStateChanged(state) => {
                match self.peers.get_mut(&peer_id) {
                    Some(peer) => {
                        peer.on_ice_connection_state(state, &mut self.timers)
                    }
                    None => return,
                }
            }
            PeerEventKind::ConnectionStateChanged(state) => {
                match self.peers.get_mut(&peer_id) {
                    Some(peer) => peer.on_connection_state(state),
                    None => return,
                }
            }
            PeerEventKind::NegotiationNeeded => match self.peers.get(&peer_id) {
                Some(peer) => peer.on_negotiation_needed(current_flags),
                None => return,
            },
        };
        self.apply_actions(&peer_id, actions);
    }

    /// Handles the provided [`LocalMediaEvent`].
    pub fn handle_local_media_event(&mut self, event: LocalMediaEvent) {
        match event {
            LocalMediaEvent::StreamRequested => {
                self.clear_local_stream_request();
                self.local_stream_request = Some(self.timers.schedule(
                    self.conf.media.local_stream_request_timeout,
                    Timer::LocalStreamRequestTimeout,
                ));
            }
            LocalMediaEvent::Stream(Some(stream)) => {
                self.local_media_started(&stream);
            }
            LocalMediaEvent::Stream(None) => {
                self.started_with_media = Some(false);
                self.pending_permissions_reconnect = false;
                self.clear_local_stream_request();
            }
            LocalMediaEvent::StreamRequestFailed(err) => {
                self.local_media_failed(&err);
            }
            LocalMediaEvent::TrackReplaced { new, old, .. } => {
                self.local_track_replaced(new.as_ref(), old.as_ref());
            }
            LocalMediaEvent::AudioOn => {
                self.broadcast_media_state(MediaKind::Audio, true);
            }
            LocalMediaEvent::AudioOff => {
                self.broadcast_media_state(MediaKind::Audio, false);
            }
            LocalMediaEvent::VideoOn => {
                self.broadcast_media_state(MediaKind::Video, true);
                self.local_video_resumed();
            }
            LocalMediaEvent::VideoOff => {
                self.broadcast_media_state(MediaKind::Video, false);
            }
            LocalMediaEvent::Speaking(SpeakingEvent::Speaking) => {
                self.send_data_channel_to_all("speaking", Value::Null);
            }
            LocalMediaEvent::Speaking(SpeakingEvent::StoppedSpeaking) => {
                self.send_data_channel_to_all("stoppedSpeaking", Value::Null);
            }
            LocalMediaEvent::Screen(_) => self.local_screen_added(),
            LocalMediaEvent::ScreenStopped(_) => self.local_screen_stopped(),
            LocalMediaEvent::StreamRequestFailedRetryNoVideo(_)
            | LocalMediaEvent::StreamChanged(_)
            | LocalMediaEvent::StreamStopped(_)
            | LocalMediaEvent::TrackEnabledChanged { .. }
            | LocalMediaEvent::ScreenRequested
            | LocalMediaEvent::ScreenRequestFailed
            | LocalMediaEvent::AudioAllowed
            | LocalMediaEvent::AudioDisallowed
            | LocalMediaEvent::VideoAllowed
            | LocalMediaEvent::VideoDisallowed
            | LocalMediaEvent::VirtualBackgroundOn
            | LocalMediaEvent::VirtualBackgroundOff
            | LocalMediaEvent::VirtualBackgroundLoadFailed
            | LocalMediaEvent::Speaking(_) => (),
        }
    }

    /// Announces the new display name of the local participant.
    ///
    /// Guests send the bare name through the data channels while users send
    /// it along with their ID. Signalling always carries an object with the
    /// name.
    pub fn nick_changed(&mut self, name: &str) {
        let payload = match self.signalling.user_id() {
            None => Value::String(name.to_owned()),
            Some(user_id) => json!({ "name": name, "userid": user_id }),
        };
        self.send_data_channel_to_all("nickChanged", payload);
        self.send_to_all(MessageKind::NickChanged, &json!({ "name": name }));
    }

    fn use_mcu(&self) -> bool {
        self.signalling.has_feature(Feature::Mcu)
    }

    fn upsert_users(&mut self, users: &[RosterEntry]) {
        for user in users {
            self.roster.insert(user.session_id.clone(), user.clone());
        }
    }

    /// Returns [`CallParticipant`] of the session creating it if needed.
    fn participant(&mut self, session_id: &SessionId) -> Rc<CallParticipant> {
        let (participant, created) = self.participants.get_or_add(session_id);
        if created {
            self.events
                .emit(CallEvent::ParticipantAdded(session_id.clone()));
        }
        participant
    }

    /// Diffs the in-call sessions of the roster against the previous ones.
    fn users_in_call_changed(&mut self) {
        let previous_self = self.self_in_call;
        let me = self.signalling.session_id();

        let mut in_call: Vec<_> = self
            .roster
            .values()
            .filter(|u| u.in_call.is_in_call())
            .collect();
        in_call.sort_by(|a, b| a.session_id.cmp(&b.session_id));

        self.self_in_call = CallFlags::DISCONNECTED;
        let mut current = Vec::new();
        let mut users = HashMap::new();
        for user in in_call {
            if user.session_id == me {
                self.self_in_call = user.in_call;
                continue;
            }
            current.push(user.session_id.clone());
            users.insert(user.session_id.clone(), user.clone());
        }

        if !previous_self.is_in_call() && self.self_in_call.is_in_call() {
            self.play_join_sound(true);
        } else if previous_self.is_in_call() && !self.self_in_call.is_in_call()
        {
            self.play_leave_sound(true);
        }

        if !self.self_in_call.is_in_call() {
            let previous = self.previous_in_call.clone();
            self.users_changed(&[], &previous);
            return;
        }

        let diff = RosterDiff::between(&self.previous_in_call, &current);
        if diff.is_empty() {
            return;
        }
        let joined: Vec<_> = diff
            .joined
            .iter()
            .filter_map(|s| users.remove(s))
            .collect();
        self.users_changed(&joined, &diff.left);
    }

    /// Tears down the sessions which left and connects to the joined ones.
    fn users_changed(&mut self, joined: &[RosterEntry], left: &[SessionId]) {
        let me = self.signalling.session_id();
        let use_mcu = self.use_mcu();

        let mut play_leave_sound = false;
        for session_id in left {
            debug!("Removing disconnected session {}", session_id);
            self.remove_peers_of(session_id);
            if self.participants.remove(session_id).is_some() {
                self.events
                    .emit(CallEvent::ParticipantRemoved(session_id.clone()));
                play_leave_sound = true;
            }
            if self.cancel_delayed(session_id) {
                play_leave_sound = true;
            }
        }
        self.previous_in_call.retain(|s| !left.contains(s));

        if use_mcu && !joined.is_empty() {
            self.check_start_publish_own_peer();
        }

        let mut play_join_sound = false;
        for user in joined {
            let session_id = &user.session_id;
            if !user.in_call.is_in_call()
                || *session_id == me
                || self.previous_in_call.contains(session_id)
            {
                continue;
            }
            self.previous_in_call.push(session_id.clone());

            let participant = self.participant(session_id);
            participant.set_user_id(user.user_id.clone());
            if user.internal {
                participant.set_internal(true);
            }

            let has_media = user.in_call.has_media();
            if !has_media
                && (use_mcu || self.local_media.local_stream().is_none())
            {
                participant.set_peer(None);
                if use_mcu {
                    self.send_current_state_with_repetition();
                } else {
                    self.send_current_nick();
                }
            }
            play_join_sound = true;

            if !self.peers.contains(&PeerId::video(session_id.clone())) {
                if use_mcu {
                    if has_media {
                        self.request_offer(session_id);
                    }
                } else {
                    match initiation(
                        &me,
                        self.self_in_call,
                        session_id,
                        user.in_call,
                    ) {
                        Initiation::Offer => {
                            debug!("Starting call with {}", session_id);
                            self.create_video_peer(session_id);
                        }
                        Initiation::AwaitOffer => {
                            self.schedule_delayed(
                                session_id,
                                Timer::OfferRetry(session_id.clone()),
                            );
                        }
                        Initiation::None => {
                            debug!(
                                "{} has no media, not sending an offer",
                                session_id,
                            );
                        }
                    }
                }
            }

            if self.local_media.local_screen().is_some() {
                self.create_screensharing_peer(session_id);
            }
        }

        if self.self_in_call.is_in_call() {
            if play_join_sound {
                self.play_join_sound(false);
            } else if play_leave_sound {
                self.play_leave_sound(false);
            }
        }
    }

    /// Leaves the call tearing down every connection.
    fn leave_call(&mut self) {
        info!("Leaving the call");
        self.play_leave_sound(true);
        self.own_peer = None;
        self.own_screen_peer = None;
        for peer in self.peers.end_all(&mut self.timers) {
            self.peer_ended(peer.id());
        }
        self.local_media.stop();

        for (_, timer) in self.delayed.drain() {
            self.timers.cancel(timer);
        }
        if let Some(timer) = self.state_repetition.take() {
            self.timers.cancel(timer);
        }
        self.clear_local_stream_request();

        self.self_in_call = CallFlags::DISCONNECTED;
        let previous = mem::take(&mut self.previous_in_call);
        self.users_changed(&[], &previous);
        for session_id in self.participants.ids() {
            drop(self.participants.remove(&session_id));
            self.events.emit(CallEvent::ParticipantRemoved(session_id));
        }
        self.roster.clear();
    }

    /// Tears down every connection after signalling was lost.
    fn disconnected(&mut self) {
        info!("Signalling disconnected");
        if let Some(id) = self.own_peer.clone() {
            self.cancel_delayed(&id.session_id);
            self.end_peer(&id);
        }
        if let Some(id) = self.own_screen_peer.clone() {
            self.end_peer(&id);
        }

        self.self_in_call = CallFlags::DISCONNECTED;
        let previous = mem::take(&mut self.previous_in_call);
        self.users_changed(&[], &previous);
        self.roster.clear();
    }

    /// Joins the call again with the provided flags, or with the current
    /// ones if [`None`].
    fn force_reconnect(&mut self, flags: Option<CallFlags>) {
        if let Some(id) = self.own_peer.clone() {
            self.cancel_delayed(&id.session_id);
            self.end_peer(&id);
        }

        let previous = mem::take(&mut self.previous_in_call);
        self.users_changed(&[], &previous);
        self.roster.clear();

        info!("Forcing reconnection with flags {:?}", flags);
        self.events.emit(CallEvent::ForcedReconnect(flags));
        self.signalling.force_reconnect(flags);
    }

    /// Reconnects if the publishing permissions of the local session
    /// changed.
    fn reconnect_on_permissions_change(&mut self, users: &[RosterEntry]) {
        let me = self.signalling.session_id();
        let current = match users.iter().find(|u| u.session_id == me) {
            Some(user) if user.in_call.is_in_call() => user,
            _ => return,
        };
        let permissions = match current.permissions {
            Some(permissions) => permissions,
            None => return,
        };

        let can_publish_all = permissions
            .contains(Permissions::PUBLISH_AUDIO | Permissions::PUBLISH_VIDEO);
        let is_active = self.local_media.is_active();
        if (can_publish_all && is_active)
            || (!permissions.can_publish_media() && !is_active)
        {
            return;
        }

        if !permissions.can_publish_media() {
            info!("Publishing media is no longer allowed");
            self.started_with_media = None;
            self.pending_permissions_reconnect = false;
            self.local_media.stop();
            if !self.use_mcu() || self.own_peer.is_some() {
                self.force_reconnect(Some(CallFlags::IN_CALL));
            }
            return;
        }

        info!("Publishing media is allowed, starting local media");
        self.started_with_media = None;
        self.pending_permissions_reconnect = true;
        self.events.emit(CallEvent::LocalMediaStartRequested);
    }

    fn local_media_started(&mut self, stream: &MediaStream) {
        info!("Local media started");
        self.started_with_media = Some(true);
        self.clear_local_stream_request();

        if self.use_mcu() {
            self.check_start_publish_own_peer();
        }

        if mem::take(&mut self.pending_permissions_reconnect) {
            let mut flags = CallFlags::IN_CALL;
            if !stream.tracks_of(MediaKind::Audio).is_empty() {
                flags |= CallFlags::WITH_AUDIO;
            }
            if !stream.tracks_of(MediaKind::Video).is_empty()
                && self.signalling.send_video_if_available()
            {
                flags |= CallFlags::WITH_VIDEO;
            }
            self.force_reconnect(Some(flags));
        }
    }

    fn local_media_failed(&mut self, err: &LocalMediaError) {
        warn!("Access to microphone & camera failed: {}", err);
        self.started_with_media = Some(false);
        self.pending_permissions_reconnect = false;
        self.clear_local_stream_request();

        match err {
            LocalMediaError::NothingRequested => (),
            LocalMediaError::CouldNotGetLocalMedia(e) => {
                self.events.emit(CallEvent::LocalMediaError(
                    MediaErrorReason::from(e),
                ));
            }
        }
    }

    /// Updates the call flags after a local device was added, removed or
    /// switched.
    fn local_track_replaced(
        &mut self,
        new: Option<&Track>,
        old: Option<&Track>,
    ) {
        let flags = self.signalling.current_call_flags();
        let new = match new {
            Some(track) => track,
            None => {
                if let Some(old) = old {
                    self.signalling
                        .update_current_call_flags(flags - media_flag(old));
                }
                return;
            }
        };

        match self.started_with_media {
            Some(true) => {
                if old.is_none() {
                    self.signalling
                        .update_current_call_flags(flags | media_flag(new));
                }
            }
            Some(false) => {
                self.started_with_media = Some(true);
                self.force_reconnect(Some(flags | media_flag(new)));
            }
            None => (),
        }
    }

    /// Starts sending the video if it wasn't sent at all.
    fn local_video_resumed(&mut self) {
        if self.signalling.send_video_if_available() {
            return;
        }
        self.signalling.set_send_video_if_available(true);
        self.started_with_media = Some(true);
        let flags =
            self.signalling.current_call_flags() | CallFlags::WITH_VIDEO;
        self.force_reconnect(Some(flags));
    }

    fn local_screen_added(&mut self) {
        let me = self.signalling.session_id();
        let mut sessions: Vec<_> = self
            .roster
            .values()
            .filter(|u| u.in_call.is_in_call() && u.session_id != me)
            .map(|u| u.session_id.clone())
            .collect();
        sessions.sort();
        for session_id in &sessions {
            self.create_screensharing_peer(session_id);
        }
    }

    fn local_screen_stopped(&mut self) {
        let me = self.signalling.session_id();
        if self.use_mcu() {
            if let Some(id) = self.own_screen_peer.clone() {
                self.end_peer(&id);
                self.signalling.send_message(Message {
                    from: me,
                    to: None,
                    room_type: PeerKind::Screen,
                    sid: None,
                    kind: MessageKind::UnshareScreen,
                    payload: Value::Null,
                });
            }
            return;
        }

        for id in self.peers.ids() {
            if id.kind != PeerKind::Screen || !id.share_my_screen {
                continue;
            }
            let sid = self.peers.get(&id).map(|p| p.sid().to_owned());
            self.signalling.send_message(Message {
                from: me.clone(),
                to: Some(id.session_id.clone()),
                room_type: PeerKind::Screen,
                sid,
                kind: MessageKind::UnshareScreen,
                payload: Value::Null,
            });
            self.end_peer(&id);
        }
    }

    /// Starts publishing the local media to the relay unless it's published
    /// already.
    fn check_start_publish_own_peer(&mut self) {
        let me = self.signalling.session_id();
        if self.local_media.local_stream().is_none()
            || self.peers.contains(&PeerId::video(me.clone()))
        {
            return;
        }

        if let Some(id) = self.own_peer.clone() {
            self.cancel_delayed(&id.session_id);
            self.end_peer(&id);
        }
        self.create_own_peer();
        self.schedule_delayed(&me, Timer::OwnPeerRetry);
    }

    fn create_own_peer(&mut self) {
        let me = self.signalling.session_id();
        let mut options = self.video_peer_options(me, NegotiationRole::Offerer);
        options.receive_audio = false;
        options.receive_video = false;
        let id = self.create_peer(options);
        self.own_peer = Some(id);
        self.analyze_own_peer();
    }

    fn create_video_peer(&mut self, session_id: &SessionId) {
        let options = self
            .video_peer_options(session_id.clone(), NegotiationRole::Offerer);
        self.create_peer(options);
    }

    /// Sends the local screen to the provided session.
    fn create_screensharing_peer(&mut self, session_id: &SessionId) {
        let me = self.signalling.session_id();
        if self.use_mcu() {
            if !self.peers.contains(&PeerId::shared_screen(me.clone())) {
                let options = self.screen_peer_options(me.clone());
                self.own_screen_peer = Some(self.create_peer(options));
                self.analyze_own_screen_peer();
            }
            if *session_id != me {
                self.signalling.send_offer(session_id, PeerKind::Screen);
            }
        } else if *session_id != me
            && !self.peers.contains(&PeerId::shared_screen(session_id.clone()))
        {
            let options = self.screen_peer_options(session_id.clone());
            self.create_peer(options);
        }
    }

    fn video_peer_options(
        &self,
        session_id: SessionId,
        role: NegotiationRole,
    ) -> PeerOptions {
        PeerOptions {
            session_id,
            kind: PeerKind::Video,
            role,
            sid: None,
            receive_audio: true,
            receive_video: true,
            send_video_if_available: self.signalling.send_video_if_available(),
            enable_simulcast: self.signalling.has_feature(Feature::Simulcast),
            enable_data_channels: true,
            share_my_screen: false,
            broadcaster: None,
            stream: self.local_media.local_stream(),
        }
    }

    fn screen_peer_options(&self, session_id: SessionId) -> PeerOptions {
        PeerOptions {
            session_id,
            kind: PeerKind::Screen,
            role: NegotiationRole::Offerer,
            sid: None,
            receive_audio: false,
            receive_video: false,
            send_video_if_available: false,
            enable_simulcast: self.signalling.has_feature(Feature::Simulcast),
            enable_data_channels: false,
            share_my_screen: true,
            broadcaster: Some(self.signalling.session_id()),
            stream: self.local_media.local_screen(),
        }
    }

    /// Creates new [`PeerConnection`] ending the one it replaces.
    fn create_peer(&mut self, options: PeerOptions) -> PeerId {
        let id = PeerId::from(&options);
        let own = options.session_id == self.signalling.session_id();
        let role = options.role;
        let conn = self.factory.create(options);
        let peer = PeerConnection::new(
            id.clone(),
            role,
            own,
            self.use_mcu(),
            Rc::clone(&conn),
            &self.conf.peer,
        );
        if self.peers.insert(peer, &mut self.timers).is_some() {
            self.peer_ended(&id);
        }

        if !own && !id.share_my_screen {
            let participant = self.participant(&id.session_id);
            match id.kind {
                PeerKind::Video => participant.set_peer(Some(id.clone())),
                PeerKind::Screen => {
                    participant.set_screen_peer(Some(id.clone()));
                }
            }
        }

        debug!("Peer {} created", id);
        self.events.emit(CallEvent::PeerCreated(id.clone()));
        if role == NegotiationRole::Offerer {
            conn.start();
        }
        id
    }

    /// Ends the [`PeerConnection`] if it exists.
    fn end_peer(&mut self, id: &PeerId) {
        if self.peers.remove(id, &mut self.timers).is_some() {
            self.peer_ended(id);
        }
    }

    fn remove_peers_of(&mut self, session_id: &SessionId) {
        for peer in self.peers.remove_session(session_id, &mut self.timers) {
            self.peer_ended(peer.id());
        }
    }

    /// Forgets the ended [`PeerConnection`] everywhere.
    fn peer_ended(&mut self, id: &PeerId) {
        self.stop_media_checks(id);
        if let Some(participant) = self.participants.get(&id.session_id) {
            participant.peer_ended(id);
        }
        if self.own_peer.as_ref() == Some(id) {
            self.own_peer = None;
            self.analyze_own_peer();
        }
        if self.own_screen_peer.as_ref() == Some(id) {
            self.own_screen_peer = None;
            self.analyze_own_screen_peer();
        }
        debug!("Peer {} ended", id);
        self.events.emit(CallEvent::PeerEnded(id.clone()));
    }

    fn analyze_own_peer(&mut self) {
        let conn = self
            .own_peer
            .as_ref()
            .and_then(|id| self.peers.get(id))
            .map(|p| Rc::clone(p.conn()));
        if let Some(local) = self.analyzer.local_mut() {
            local.set_sender_connection(conn);
        }
    }

    fn analyze_own_screen_peer(&mut self) {
        let conn = self
            .own_screen_peer
            .as_ref()
            .and_then(|id| self.peers.get(id))
            .map(|p| Rc::clone(p.conn()));
        if let Some(local) = self.analyzer.local_mut() {
            local.set_sender_screen_connection(conn);
        }
    }

    fn handle_message(&mut self, message: Message) {
        if message.kind == MessageKind::Answer
            && message.room_type == PeerKind::Video
        {
            self.cancel_delayed(&message.from);
        }

        match message.kind {
            MessageKind::Offer => self.handle_offer(&message),
            MessageKind::UnshareScreen => {
                self.end_peer(&PeerId::screen(message.from));
            }
            MessageKind::Mute | MessageKind::Unmute => {
                if let Some(kind) = message.media_name() {
                    self.remote_media_changed(
                        &message.from,
                        kind,
                        message.kind == MessageKind::Unmute,
                    );
                }
            }
            MessageKind::NickChanged => {
                if let Some(participant) = self.participants.get(&message.from)
                {
                    participant.set_name(message.nick());
                }
            }
            MessageKind::Answer
            | MessageKind::Candidate
            | MessageKind::Unknown => self.route_message(&message),
        }
    }

    fn handle_offer(&mut self, message: &Message) {
        let from = &message.from;
        let stale = self.peers.ids().into_iter().find(|id| {
            !id.share_my_screen
                && id.session_id == *from
                && id.kind == message.room_type
                && self
                    .peers
                    .get(id)
                    .map_or(false, |p| Some(p.sid()) != message.sid.as_deref())
        });
        if let Some(id) = stale {
            debug!("Ending stale peer {}", id);
            self.end_peer(&id);
        }

        if message.room_type == PeerKind::Video {
            self.cancel_delayed(from);
        }

        if !self.self_in_call.is_in_call() {
            debug!("Offer received when not in the call, ignoring");
            return;
        }

        let id = match message.room_type {
            PeerKind::Video => PeerId::video(from.clone()),
            PeerKind::Screen => PeerId::screen(from.clone()),
        };
        if !self.peers.contains(&id) {
            let use_mcu = self.use_mcu();
            let is_video = message.room_type == PeerKind::Video;
            let options = PeerOptions {
                session_id: from.clone(),
                kind: message.room_type,
                role: NegotiationRole::Answerer,
                sid: message.sid.clone(),
                receive_audio: true,
                receive_video: true,
                send_video_if_available: self
                    .signalling
                    .send_video_if_available(),
                enable_simulcast: false,
                enable_data_channels: is_video,
                share_my_screen: false,
                broadcaster: if is_video { None } else { Some(from.clone()) },
                stream: if is_video && !use_mcu {
                    self.local_media.local_stream()
                } else {
                    None
                },
            };
            self.create_peer(options);
        }
        if let Some(peer) = self.peers.get(&id) {
            peer.conn().handle_message(message);
        }
    }

    /// Passes the message to the [`PeerConnection`]s it belongs to.
    ///
    /// Without a relay, messages of other negotiations are dropped.
    fn route_message(&self, message: &Message) {
        let use_mcu = self.use_mcu();
        for peer in self.peers.iter() {
            let id = peer.id();
            if id.session_id != message.from || id.kind != message.room_type {
                continue;
            }
            if let Some(sid) = message.sid.as_deref() {
                if !use_mcu && peer.sid() != sid {
                    continue;
                }
            }
            peer.conn().handle_message(message);
        }
    }

    fn handle_channel_message(
        &mut self,
        peer_id: &PeerId,
        label: &str,
        kind: &str,
        payload: &Value,
    ) {
        if label != STATUS_CHANNEL && label != RELAY_STATUS_CHANNEL {
            debug!("Unknown message from {} datachannel", label);
            return;
        }
        let session_id = &peer_id.session_id;
        match kind {
            "audioOn" => {
                self.remote_media_changed(session_id, MediaKind::Audio, true);
            }
            "audioOff" => {
                self.remote_media_changed(session_id, MediaKind::Audio, false);
            }
            "videoOn" => {
                self.remote_media_changed(session_id, MediaKind::Video, true);
            }
            "videoOff" => {
                self.remote_media_changed(session_id, MediaKind::Video, false);
            }
            "nickChanged" => {
                if let Some(participant) = self.participants.get(session_id) {
                    participant.set_name(nick_from_payload(payload));
                }
            }
            "speaking" | "stoppedSpeaking" => {
                if let Some(participant) = self.participants.get(session_id) {
                    participant.set_speaking(kind == "speaking");
                }
            }
            _ => {
                debug!(
                    "Unknown message type {} from {} datachannel",
                    kind, label,
                );
            }
        }
    }

    /// Applies the media state announced by the remote session.
    fn remote_media_changed(
        &mut self,
        session_id: &SessionId,
        kind: MediaKind,
        available: bool,
    ) {
        if let Some(participant) = self.participants.get(session_id) {
            match kind {
                MediaKind::Audio => {
                    participant.set_audio_available(available);
                    if !available {
                        participant.set_speaking(false);
                    }
                }
                MediaKind::Video => participant.set_video_available(available),
            }
        }
        if self.use_mcu() {
            self.stop_media_check(&PeerId::video(session_id.clone()), kind);
        }
    }

    fn stream_added(&mut self, peer_id: &PeerId, stream: MediaStream) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.set_remote_stream(Some(stream.clone()));
        }
        if let Some(participant) = self.participants.get(&peer_id.session_id) {
            match peer_id.kind {
                PeerKind::Video => participant.set_stream(Some(stream.clone())),
                PeerKind::Screen => {
                    participant.set_screen(Some(stream.clone()));
                }
            }
        }

        // Relay doesn't announce the state of the media already published,
        // so it's detected from the received bytes.
        if !self.use_mcu() || peer_id.kind == PeerKind::Screen {
            return;
        }
        self.stop_media_checks(peer_id);
        for kind in &[MediaKind::Audio, MediaKind::Video] {
            if stream.tracks_of(*kind).is_empty() {
                continue;
            }
            let timer = self.timers.schedule(
                MEDIA_CHECK_INTERVAL,
                Timer::MediaCheck(peer_id.clone(), *kind),
            );
            self.media_checks.insert((peer_id.clone(), *kind), timer);
        }
    }

    fn stream_removed(&mut self, peer_id: &PeerId) {
        self.stop_media_checks(peer_id);
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.set_remote_stream(None);
        }
        if let Some(participant) = self.participants.get(&peer_id.session_id) {
            match peer_id.kind {
                PeerKind::Video => participant.set_stream(None),
                PeerKind::Screen => participant.set_screen(None),
            }
        }
    }

    fn stop_media_check(&mut self, peer_id: &PeerId, kind: MediaKind) {
        if let Some(timer) = self.media_checks.remove(&(peer_id.clone(), kind))
        {
            self.timers.cancel(timer);
        }
    }

    fn stop_media_checks(&mut self, peer_id: &PeerId) {
        self.stop_media_check(peer_id, MediaKind::Audio);
        self.stop_media_check(peer_id, MediaKind::Video);
    }

    fn check_media(&mut self, peer_id: PeerId, kind: MediaKind) {
        if self.media_checks.remove(&(peer_id.clone(), kind)).is_none() {
            return;
        }
        let bytes = match self.peers.get(&peer_id) {
            Some(peer) => peer
                .conn()
                .get_stats()
                .inbound(kind)
                .map_or(0, |s| s.bytes_received),
            None => return,
        };

        if bytes == 0 {
            let timer = self.timers.schedule(
                MEDIA_CHECK_INTERVAL,
                Timer::MediaCheck(peer_id.clone(), kind),
            );
            self.media_checks.insert((peer_id, kind), timer);
            return;
        }
        // Fewer video bytes are the single empty frame sent by the relay
        // while the video is disabled.
        if kind == MediaKind::Audio || bytes >= MIN_VIDEO_BYTES {
            self.remote_media_changed(&peer_id.session_id, kind, true);
        }
    }

    fn apply_actions(&mut self, peer_id: &PeerId, actions: Vec<PeerAction>) {
        for action in actions {
            match action {
                PeerAction::Extended(state) => {
                    if let Some(participant) =
                        self.participants.get(&peer_id.session_id)
                    {
                        if participant.peer().as_ref() == Some(peer_id) {
                            participant.set_connection_state(state);
                        }
                    }
                    self.events.emit(CallEvent::ExtendedIceConnectionState {
                        peer_id: peer_id.clone(),
                        state,
                    });
                }
                PeerAction::SendCurrentState => {
                    if self.use_mcu() {
                        self.send_current_state_with_repetition();
                    } else {
                        self.send_current_media_state();
                        self.send_current_nick();
                    }
                }
                PeerAction::IceFailed => self.recommend_turn_server(),
                PeerAction::RequestOffer => {
                    self.request_offer(&peer_id.session_id);
                }
                PeerAction::ForceReconnect(flags) => {
                    self.force_reconnect(flags);
                }
            }
        }
    }

    fn on_timer(&mut self, timer: Timer) {
        match timer {
            Timer::DisconnectedCheck(check) => {
                let actions = match self.peers.get_mut(&check.peer_id) {
                    Some(peer) if peer.sid() == check.sid => {
                        peer.on_disconnected_check()
                    }
                    _ => return,
                };
                self.apply_actions(&check.peer_id, actions);
            }
            Timer::OfferRetry(session_id) => {
                self.delayed.remove(&session_id);
                debug!(
                    "No offer nor answer received from {}, sending offer again",
                    session_id,
                );
                self.end_peer(&PeerId::video(session_id.clone()));
                self.create_video_peer(&session_id);
                self.schedule_delayed(
                    &session_id,
                    Timer::OfferRetry(session_id.clone()),
                );
            }
            Timer::RequestOfferRetry(session_id) => {
                self.delayed.remove(&session_id);
                debug!(
                    "No offer received from {}, requesting it again",
                    session_id,
                );
                self.request_offer(&session_id);
            }
            Timer::OwnPeerRetry => {
                let me = self.signalling.session_id();
                self.delayed.remove(&me);
                debug!("No answer received for own peer, sending offer again");
                if let Some(id) = self.own_peer.clone() {
                    self.end_peer(&id);
                }
                self.create_own_peer();
                self.schedule_delayed(&me, Timer::OwnPeerRetry);
            }
            Timer::StateRepetition(delay) => {
                self.state_repetition = None;
                self.send_current_media_state();
                self.send_current_nick();

                let next = if delay == Duration::from_secs(0) {
                    Duration::from_secs(1)
                } else {
                    delay * 2
                };
                if next <= self.conf.peer.state_repetition_max {
                    self.state_repetition = Some(
                        self.timers
                            .schedule(next, Timer::StateRepetition(next)),
                    );
                }
            }
            Timer::MediaCheck(peer_id, kind) => self.check_media(peer_id, kind),
            Timer::LocalStreamRequestTimeout => {
                self.local_stream_request = None;
                warn!("Local media is requested for too long");
                self.events.emit(CallEvent::LocalStreamRequestTimedOut);
            }
        }
    }

    /// Asks the relay for an offer of the session media, repeating until it
    /// comes.
    fn request_offer(&mut self, session_id: &SessionId) {
        self.signalling.request_offer(session_id, PeerKind::Video);
        self.schedule_delayed(
            session_id,
            Timer::RequestOfferRetry(session_id.clone()),
        );
    }

    /// Schedules the retry of the session replacing its pending one.
    fn schedule_delayed(&mut self, session_id: &SessionId, timer: Timer) {
        self.cancel_delayed(session_id);
        let id = self
            .timers
            .schedule(self.conf.peer.offer_retry_interval, timer);
        self.delayed.insert(session_id.clone(), id);
    }

    /// Cancels the pending retry of the session.
    ///
    /// Returns `false` if there was none.
    fn cancel_delayed(&mut self, session_id: &SessionId) -> bool {
        match self.delayed.remove(session_id) {
            Some(timer) => {
                self.timers.cancel(timer);
                true
            }
            None => false,
        }
    }

    fn clear_local_stream_request(&mut self) {
        if let Some(timer) = self.local_stream_request.take() {
            self.timers.cancel(timer);
        }
    }

    fn recommend_turn_server(&mut self) {
        if self.showed_turn_warning || self.signalling.has_turn_servers() {
            return;
        }
        self.showed_turn_warning = true;
        warn!("Connection failed and no TURN server is configured");
        self.events.emit(CallEvent::TurnServerRecommended);
    }

    fn play_join_sound(&self, own: bool) {
        if self.conf.call.play_sounds {
            self.events.emit(CallEvent::PlayJoinSound { own });
        }
    }

    fn play_leave_sound(&self, own: bool) {
        if self.conf.call.play_sounds {
            self.events.emit(CallEvent::PlayLeaveSound { own });
        }
    }

    /// Sends the media state and nick now and then again after growing
    /// delays, as the relay may drop the first messages.
    fn send_current_state_with_repetition(&mut self) {
        if let Some(timer) = self.state_repetition.take() {
            self.timers.cancel(timer);
        }
        self.state_repetition = Some(self.timers.schedule(
            Duration::from_secs(0),
            Timer::StateRepetition(Duration::from_secs(0)),
        ));
    }

    fn send_current_media_state(&mut self) {
        let video = self.local_media.is_video_enabled();
        let audio = self.local_media.is_audio_enabled();
        self.broadcast_media_state(MediaKind::Video, video);
        self.broadcast_media_state(MediaKind::Audio, audio);
    }

    fn send_current_nick(&mut self) {
        let name = self.signalling.display_name();
        self.nick_changed(&name);
    }

    /// Tells everyone whether the local media of the provided kind is
    /// enabled.
    fn broadcast_media_state(&self, kind: MediaKind, enabled: bool) {
        let status = match (kind, enabled) {
            (MediaKind::Audio, true) => "audioOn",
            (MediaKind::Audio, false) => "audioOff",
            (MediaKind::Video, true) => "videoOn",
            (MediaKind::Video, false) => "videoOff",
        };
        self.send_data_channel_to_all(status, Value::Null);

        let message = if enabled {
            MessageKind::Unmute
        } else {
            MessageKind::Mute
        };
        self.send_to_all(message, &json!({ "name": kind.to_string() }));
    }

    /// Sends the status message through the data channels.
    ///
    /// With a relay it's sent only through the publishing connection, and
    /// the relay distributes it.
    fn send_data_channel_to_all(&self, kind: &str, payload: Value) {
        if self.use_mcu() {
            let own = self.own_peer.as_ref().and_then(|id| self.peers.get(id));
            if let Some(peer) = own {
                peer.conn().send_directly(STATUS_CHANNEL, kind, payload);
                return;
            }
        }
        for id in self.peers.ids() {
            if id.kind != PeerKind::Video {
                continue;
            }
            if let Some(peer) = self.peers.get(&id) {
                peer.conn().send_directly(
                    STATUS_CHANNEL,
                    kind,
                    payload.clone(),
                );
            }
        }
    }

    /// Sends the message by signalling to every connected session and to
    /// every in-call session without a connection.
    fn send_to_all(&self, kind: MessageKind, payload: &Value) {
        let me = self.signalling.session_id();
        let mut connected = HashSet::new();
        for id in self.peers.ids() {
            connected.insert(id.session_id.clone());
            if id.session_id == me {
                continue;
            }
            let sid = self.peers.get(&id).map(|p| p.sid().to_owned());
            self.signalling.send_message(Message {
                from: me.clone(),
                to: Some(id.session_id.clone()),
                room_type: id.kind,
                sid,
                kind,
                payload: payload.clone(),
            });
        }

        let mut unconnected: Vec<_> = self
            .roster
            .values()
            .filter(|u| {
                u.in_call.is_in_call()
                    && u.session_id != me
                    && !connected.contains(&u.session_id)
            })
            .map(|u| u.session_id.clone())
            .collect();
        unconnected.sort();
        for session_id in unconnected {
            self.signalling.send_message(Message {
                from: me.clone(),
                to: Some(session_id),
                room_type: PeerKind::Video,
                sid: None,
                kind,
                payload: payload.clone(),
            });
        }
    }
}

/// Returns the [`CallFlags`] announcing media of the [`Track`] kind.
fn media_flag(track: &Track) -> CallFlags {
    match track.kind() {
        MediaKind::Audio => CallFlags::WITH_AUDIO,
        MediaKind::Video => CallFlags::WITH_VIDEO,
    }
}
