//! Recording fakes of the collaborators of a call session.

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use async_trait::async_trait;
use futures::{executor, StreamExt as _};
use serde_json::Value;

use medea_call::{
    call::CallEvent,
    media::{LocalMediaState, MediaKind, MediaStream, Track},
    platform::{
        IceConnectionState, MediaDeviceError, MediaDevices,
        MediaStreamConstraints, PeerConnectionFactory, PeerConnectionState,
        PeerOptions, RtcInboundStats, RtcPeerConnection, RtcStats, SdpType,
        SignalingState,
    },
    signalling::{
        CallFlags, Feature, Message, MessageKind, PeerKind, SessionId,
        Signalling, UserId,
    },
    CallSession,
};

/// [`Signalling`] recording everything sent through it.
#[derive(Debug)]
pub struct FakeSignalling {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
    pub mcu: bool,
    pub turn_servers: bool,
    pub call_flags: Cell<CallFlags>,
    pub send_video: Cell<bool>,
    pub sent: RefCell<Vec<Message>>,
    pub offer_requests: RefCell<Vec<(SessionId, PeerKind)>>,
    pub offers_sent: RefCell<Vec<(SessionId, PeerKind)>>,
    pub reconnects: RefCell<Vec<Option<CallFlags>>>,
}

impl FakeSignalling {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            mcu: false,
            turn_servers: false,
            call_flags: Cell::new(
                CallFlags::IN_CALL | CallFlags::WITH_AUDIO,
            ),
            send_video: Cell::new(true),
            sent: RefCell::new(Vec::new()),
            offer_requests: RefCell::new(Vec::new()),
            offers_sent: RefCell::new(Vec::new()),
            reconnects: RefCell::new(Vec::new()),
        }
    }

    pub fn with_mcu(mut self) -> Self {
        self.mcu = true;
        self
    }

    /// Returns the sent messages of the provided type.
    pub fn sent_of(&self, kind: MessageKind) -> Vec<Message> {
        self.sent
            .borrow()
            .iter()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }
}

impl Signalling for FakeSignalling {
    fn session_id(&self) -> SessionId {
        self.session_id.clone()
    }

    fn user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }

    fn display_name(&self) -> String {
        "Me".into()
    }

    fn has_feature(&self, feature: Feature) -> bool {
        match feature {
            Feature::Mcu => self.mcu,
            Feature::Simulcast => false,
        }
    }

    fn has_turn_servers(&self) -> bool {
        self.turn_servers
    }

    fn send_message(&self, message: Message) {
        self.sent.borrow_mut().push(message);
    }

    fn request_offer(&self, session_id: &SessionId, kind: PeerKind) {
        self.offer_requests
            .borrow_mut()
            .push((session_id.clone(), kind));
    }

    fn send_offer(&self, session_id: &SessionId, kind: PeerKind) {
        self.offers_sent.borrow_mut().push((session_id.clone(), kind));
    }

    fn current_call_flags(&self) -> CallFlags {
        self.call_flags.get()
    }

    fn update_current_call_flags(&self, flags: CallFlags) {
        self.call_flags.set(flags);
    }

    fn send_video_if_available(&self) -> bool {
        self.send_video.get()
    }

    fn set_send_video_if_available(&self, send: bool) {
        self.send_video.set(send);
    }

    fn force_reconnect(&self, flags: Option<CallFlags>) {
        self.reconnects.borrow_mut().push(flags);
    }
}

/// [`RtcPeerConnection`] recording the calls made on it.
#[derive(Debug)]
pub struct FakeConnection {
    pub options: PeerOptions,
    pub sid: String,
    pub started: Cell<u32>,
    pub ice_restarts: Cell<u32>,
    pub ended: Cell<bool>,
    pub ice_state: Cell<IceConnectionState>,
    pub handled: RefCell<Vec<Message>>,
    pub sent_directly: RefCell<Vec<(String, String, Value)>>,
    pub stats: RefCell<RtcStats>,
}

impl FakeConnection {
    /// Makes the connection report the provided received bytes.
    pub fn set_bytes_received(&self, kind: MediaKind, bytes: u64) {
        let mut stats = self.stats.borrow_mut();
        stats.inbound.retain(|s| s.kind != kind);
        stats.inbound.push(RtcInboundStats {
            kind,
            bytes_received: bytes,
            packets_received: 0,
            packets_lost: 0,
            jitter: None,
        });
    }

    /// Returns the kinds of the messages sent through the data channels.
    pub fn sent_statuses(&self) -> Vec<String> {
        self.sent_directly
            .borrow()
            .iter()
            .map(|(_, kind, _)| kind.clone())
            .collect()
    }
}

impl RtcPeerConnection for FakeConnection {
    fn sid(&self) -> String {
        self.sid.clone()
    }

    fn start(&self) {
        self.started.set(self.started.get() + 1);
    }

    fn handle_message(&self, message: &Message) {
        self.handled.borrow_mut().push(message.clone());
    }

    fn ice_restart(&self) {
        self.ice_restarts.set(self.ice_restarts.get() + 1);
    }

    fn end(&self) {
        self.ended.set(true);
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.ice_state.get()
    }

    fn connection_state(&self) -> PeerConnectionState {
        PeerConnectionState::New
    }

    fn signaling_state(&self) -> SignalingState {
        SignalingState::Stable
    }

    fn local_description_type(&self) -> Option<SdpType> {
        None
    }

    fn sending_kinds(&self) -> Vec<MediaKind> {
        self.options
            .stream
            .as_ref()
            .map(|s| s.tracks().iter().map(Track::kind).collect())
            .unwrap_or_default()
    }

    fn send_directly(&self, channel: &str, kind: &str, payload: Value) {
        self.sent_directly.borrow_mut().push((
            channel.to_owned(),
            kind.to_owned(),
            payload,
        ));
    }

    fn get_stats(&self) -> RtcStats {
        self.stats.borrow().clone()
    }
}

/// [`PeerConnectionFactory`] keeping every created [`FakeConnection`].
#[derive(Debug, Default)]
pub struct FakeFactory {
    next_sid: Cell<u32>,
    pub created: RefCell<Vec<Rc<FakeConnection>>>,
}

impl FakeFactory {
    /// Returns the connections created for the provided session and kind,
    /// oldest first.
    pub fn created_for(
        &self,
        session_id: &str,
        kind: PeerKind,
    ) -> Vec<Rc<FakeConnection>> {
        self.created
            .borrow()
            .iter()
            .filter(|c| {
                c.options.session_id.0 == session_id && c.options.kind == kind
            })
            .cloned()
            .collect()
    }

    /// Returns the last created connection.
    pub fn last(&self) -> Option<Rc<FakeConnection>> {
        self.created.borrow().last().cloned()
    }
}

impl PeerConnectionFactory for FakeFactory {
    fn create(&self, options: PeerOptions) -> Rc<dyn RtcPeerConnection> {
        let sid = options.sid.clone().unwrap_or_else(|| {
            self.next_sid.set(self.next_sid.get() + 1);
            format!("sid-{}", self.next_sid.get())
        });
        let conn = Rc::new(FakeConnection {
            options,
            sid,
            started: Cell::new(0),
            ice_restarts: Cell::new(0),
            ended: Cell::new(false),
            ice_state: Cell::new(IceConnectionState::New),
            handled: RefCell::new(Vec::new()),
            sent_directly: RefCell::new(Vec::new()),
            stats: RefCell::new(RtcStats::default()),
        });
        self.created.borrow_mut().push(Rc::clone(&conn));
        conn
    }
}

/// [`LocalMediaState`] set up directly by tests.
#[derive(Debug, Default)]
pub struct FakeLocalMedia {
    pub active: Cell<bool>,
    pub stream: RefCell<Option<MediaStream>>,
    pub screen: RefCell<Option<MediaStream>>,
    pub audio_enabled: Cell<bool>,
    pub video_enabled: Cell<bool>,
    pub stops: Cell<u32>,
}

impl FakeLocalMedia {
    /// Creates [`FakeLocalMedia`] with an active audio and video stream.
    pub fn with_stream() -> Self {
        let this = Self::default();
        *this.stream.borrow_mut() = Some(MediaStream::with_tracks(vec![
            Track::new("mic", MediaKind::Audio),
            Track::new("cam", MediaKind::Video),
        ]));
        this.active.set(true);
        this.audio_enabled.set(true);
        this.video_enabled.set(true);
        this
    }
}

impl LocalMediaState for FakeLocalMedia {
    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn local_stream(&self) -> Option<MediaStream> {
        self.stream.borrow().clone()
    }

    fn local_screen(&self) -> Option<MediaStream> {
        self.screen.borrow().clone()
    }

    fn is_audio_enabled(&self) -> bool {
        self.audio_enabled.get()
    }

    fn is_video_enabled(&self) -> bool {
        self.video_enabled.get()
    }

    fn stop(&self) {
        self.stops.set(self.stops.get() + 1);
        self.active.set(false);
        *self.stream.borrow_mut() = None;
        *self.screen.borrow_mut() = None;
    }

    fn stop_screen_share(&self) {
        *self.screen.borrow_mut() = None;
    }
}

/// [`MediaDevices`] answering with the queued results.
#[derive(Debug, Default)]
pub struct FakeMediaDevices {
    pub unsupported: bool,
    pub user_media: RefCell<VecDeque<Result<Vec<Track>, MediaDeviceError>>>,
    pub requests: RefCell<Vec<MediaStreamConstraints>>,
}

impl FakeMediaDevices {
    /// Queues the result of the next capture.
    pub fn push(&self, result: Result<Vec<Track>, MediaDeviceError>) {
        self.user_media.borrow_mut().push_back(result);
    }
}

#[async_trait(?Send)]
impl MediaDevices for FakeMediaDevices {
    fn is_supported(&self) -> bool {
        !self.unsupported
    }

    async fn get_user_media(
        &self,
        constraints: MediaStreamConstraints,
    ) -> Result<Vec<Track>, MediaDeviceError> {
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(Track::new("mic", MediaKind::Audio));
        }
        if constraints.video {
            tracks.push(Track::new("cam", MediaKind::Video));
        }
        self.requests.borrow_mut().push(constraints);
        self.user_media
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(tracks))
    }

    async fn get_display_media(&self) -> Result<Vec<Track>, MediaDeviceError> {
        Ok(vec![Track::new("screen", MediaKind::Video)])
    }
}

/// Collects the [`CallEvent`]s emitted so far.
///
/// Events are buffered by the subscription, so draining it with
/// `now_or_never` returns everything emitted since subscribing.
pub fn drain_events(
    events: &mut futures::stream::LocalBoxStream<'static, CallEvent>,
) -> Vec<CallEvent> {
    let mut out = Vec::new();
    while let Some(Some(event)) =
        futures::FutureExt::now_or_never(events.next())
    {
        out.push(event);
    }
    out
}

/// Builds a [`CallSession`] over the provided fakes.
pub fn session(
    signalling: &Rc<FakeSignalling>,
    factory: &Rc<FakeFactory>,
    local_media: &Rc<FakeLocalMedia>,
    clock: Rc<dyn medea_call::utils::Clock>,
) -> CallSession {
    CallSession::new(
        &medea_call::Conf::default(),
        Rc::clone(signalling) as Rc<dyn Signalling>,
        Rc::clone(factory) as Rc<dyn PeerConnectionFactory>,
        Rc::clone(local_media) as Rc<dyn LocalMediaState>,
        clock,
    )
}

/// Runs the future to completion on the current thread.
pub fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    executor::block_on(fut)
}
