//! Lifecycle of a single peer connection.

use std::{rc::Rc, time::Duration};

use derive_more::Display;

use crate::{
    conf,
    log::prelude::*,
    media::{MediaKind, MediaStream},
    platform::{
        IceConnectionState, NegotiationRole, PeerConnectionState,
        RtcPeerConnection, SdpType, SignalingState,
    },
    signalling::{CallFlags, PeerKind},
    utils::{TimerId, Timers},
};

use super::PeerId;

/// [`IceConnectionState`] extended with the states derived by a
/// [`PeerConnection`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ExtendedIceConnectionState {
    /// State reported by the connection.
    #[display(fmt = "{}", _0)]
    Ice(IceConnectionState),

    /// Connection failed according to its [`PeerConnectionState`], while its
    /// [`IceConnectionState`] never reached `failed`.
    #[display(fmt = "failed")]
    ConnectionFailed,

    /// Connection stays `disconnected` longer than expected.
    #[display(fmt = "disconnected-long")]
    DisconnectedLong,

    /// Connection failed and no more ICE restarts will be tried.
    #[display(fmt = "failed-no-restart")]
    FailedNoRestart,
}

/// Reaction of a [`PeerConnection`] to a state change, performed by the call
/// session owning it.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerAction {
    /// Publish the new [`ExtendedIceConnectionState`].
    Extended(ExtendedIceConnectionState),

    /// Send the current local media state and display name to the remote
    /// session.
    SendCurrentState,

    /// Connection failed (used to recommend TURN servers).
    IceFailed,

    /// Ask the relay for a new offer of the remote media.
    RequestOffer,

    /// Tear down every connection and join the call again with the provided
    /// flags, or with the current ones if [`None`].
    ForceReconnect(Option<CallFlags>),
}

/// Timer checking whether a [`PeerConnection`] is still disconnected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DisconnectedCheck {
    /// Checked [`PeerConnection`].
    pub peer_id: PeerId,

    /// Negotiation ID of the checked connection.
    pub sid: String,
}

/// Lifecycle manager of one [`RtcPeerConnection`].
///
/// Reacts to the connectivity changes of the connection restarting ICE when
/// possible, and reports everything the call session must do as
/// [`PeerAction`]s.
pub struct PeerConnection {
    /// Key of this [`PeerConnection`].
    id: PeerId,

    /// Negotiation ID of the underlying connection.
    sid: String,

    /// Whether the local side sent the initial offer.
    role: NegotiationRole,

    /// Whether this is the local publishing connection to the relay.
    own: bool,

    /// Whether media is forwarded by a relay.
    relay: bool,

    /// Underlying connection.
    conn: Rc<dyn RtcPeerConnection>,

    /// ICE restarts tried since the connection was last established.
    ice_restarts: u32,

    /// Maximum count of ICE restarts in a row.
    max_ice_restarts: u32,

    /// Delay after which a `disconnected` connection is considered
    /// disconnected for long.
    disconnected_timeout: Duration,

    /// Pending [`DisconnectedCheck`].
    disconnected_timer: Option<TimerId>,

    /// Stream received from the remote session.
    remote_stream: Option<MediaStream>,

    /// Whether [`PeerConnection::end`] was called.
    ended: bool,
}

impl_debug_by_struct_name!(PeerConnection);

impl PeerConnection {
    /// Creates new [`PeerConnection`] managing the provided connection.
    pub fn new(
        id: PeerId,
        role: NegotiationRole,
        own: bool,
        relay: bool,
        conn: Rc<dyn RtcPeerConnection>,
        conf: &conf::Peer,
    ) -> Self {
        Self {
            sid: conn.sid(),
            id,
            role,
            own,
            relay,
            conn,
            ice_restarts: 0,
            max_ice_restarts: conf.ice_restart_attempts,
            disconnected_timeout: conf.disconnected_timeout,
            disconnected_timer: None,
            remote_stream: None,
            ended: false,
        }
    }

    /// Returns [`PeerId`] of this [`PeerConnection`].
    #[inline]
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Returns negotiation ID of the underlying connection.
    #[inline]
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Returns [`NegotiationRole`] of the local side.
    #[inline]
    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    /// Indicates whether this is the local publishing connection.
    #[inline]
    pub fn is_own(&self) -> bool {
        self.own
    }

    /// Returns the underlying connection.
    #[inline]
    pub fn conn(&self) -> &Rc<dyn RtcPeerConnection> {
        &self.conn
    }

    /// Returns count of ICE restarts tried since the connection was last
    /// established.
    #[inline]
    pub fn ice_restarts(&self) -> u32 {
        self.ice_restarts
    }

    /// Returns the stream received from the remote session.
    #[inline]
    pub fn remote_stream(&self) -> Option<&MediaStream> {
        self.remote_stream.as_ref()
    }

    /// Sets the stream received from the remote session.
    #[inline]
    pub fn set_remote_stream(&mut self, stream: Option<MediaStream>) {
        self.remote_stream = stream;
    }

    /// Indicates whether this [`PeerConnection`] was ended.
    #[inline]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Handles [`IceConnectionState`] change of the underlying connection.
    pub fn on_ice_connection_state<K>(
        &mut self,
        state: IceConnectionState,
        timers: &mut Timers<K>,
    ) -> Vec<PeerAction>
    where
        K: From<DisconnectedCheck>,
    {
        let mut actions = vec![PeerAction::Extended(
            ExtendedIceConnectionState::Ice(state),
        )];
        if self.id.kind == PeerKind::Screen {
            return actions;
        }

        match state {
            IceConnectionState::Checking => {
                debug!("Connecting to peer {}", self.id);
            }
            IceConnectionState::Connected | IceConnectionState::Completed => {
                debug!("Connection established with peer {}", self.id);
                if !self.own {
                    actions.push(PeerAction::SendCurrentState);
                    self.ice_restarts = 0;
                }
            }
            IceConnectionState::Disconnected => {
                debug!("Peer {} disconnected", self.id);
                self.schedule_disconnected_check(timers);
            }
            IceConnectionState::Failed => {
                debug!("Connection with peer {} failed", self.id);
                actions.extend(self.on_failed());
            }
            IceConnectionState::Closed => {
                debug!("Connection with peer {} closed", self.id);
            }
            IceConnectionState::New => (),
        }
        actions
    }

    /// Handles [`PeerConnectionState`] change of the underlying connection.
    ///
    /// Some platforms report a failed connection without ever moving its
    /// [`IceConnectionState`] to `failed`, so such a failure is handled here
    /// as an ICE failure.
    pub fn on_connection_state(
        &mut self,
        state: PeerConnectionState,
    ) -> Vec<PeerAction> {
        if state != PeerConnectionState::Failed
            || self.conn.ice_connection_state() == IceConnectionState::Failed
            || self.own
            || self.id.kind == PeerKind::Screen
        {
            return Vec::new();
        }
        let mut actions = vec![PeerAction::Extended(
            ExtendedIceConnectionState::ConnectionFailed,
        )];
        actions.extend(self.on_failed());
        actions
    }

    /// Handles the fired [`DisconnectedCheck`] of this [`PeerConnection`].
    pub fn on_disconnected_check(&mut self) -> Vec<PeerAction> {
        self.disconnected_timer = None;
        if self.ended
            || self.conn.ice_connection_state()
                != IceConnectionState::Disconnected
        {
            return Vec::new();
        }

        let actions = vec![PeerAction::Extended(
            ExtendedIceConnectionState::DisconnectedLong,
        )];
        if !self.own && !self.relay && self.ice_restarts < self.max_ice_restarts
        {
            self.try_ice_restart("disconnect");
        }
        actions
    }

    /// Handles the need of a new negotiation caused by the changed local
    /// tracks.
    ///
    /// An established connection is never renegotiated: the call is joined
    /// again with the [`CallFlags`] matching the tracks sent now.
    pub fn on_negotiation_needed(
        &self,
        current_flags: CallFlags,
    ) -> Vec<PeerAction> {
        if self.id.kind == PeerKind::Screen {
            return Vec::new();
        }
        match self.conn.ice_connection_state() {
            IceConnectionState::New | IceConnectionState::Checking => {
                return Vec::new();
            }
            _ => (),
        }

        let sending = self.conn.sending_kinds();
        let mut flags = current_flags;
        flags.set(CallFlags::WITH_AUDIO, sending.contains(&MediaKind::Audio));
        flags.set(CallFlags::WITH_VIDEO, sending.contains(&MediaKind::Video));
        info!(
            "Negotiation needed for peer {}, reconnecting with flags {:?}",
            self.id, flags,
        );
        vec![PeerAction::ForceReconnect(Some(flags))]
    }

    /// Ends this [`PeerConnection`] cancelling its timers first.
    ///
    /// Ending an already ended [`PeerConnection`] does nothing.
    pub fn end<K>(&mut self, timers: &mut Timers<K>) {
        if self.ended {
            return;
        }
        if let Some(timer) = self.disconnected_timer.take() {
            timers.cancel(timer);
        }
        self.ended = true;
        self.remote_stream = None;
        self.conn.end();
    }

    /// Handles the failure of the connection.
    fn on_failed(&mut self) -> Vec<PeerAction> {
        if self.own {
            if self.relay {
                warn!("Own peer failed, reconnecting to the relay");
                return vec![PeerAction::ForceReconnect(None)];
            }
            return Vec::new();
        }

        let mut actions = vec![PeerAction::IceFailed];
        if self.relay {
            debug!("Requesting a new offer for peer {}", self.id);
            actions.push(PeerAction::RequestOffer);
        } else if self.ice_restarts < self.max_ice_restarts {
            self.try_ice_restart("failure");
        } else {
            error!(
                "ICE of peer {} failed after {} restarts",
                self.id, self.ice_restarts,
            );
            actions.push(PeerAction::Extended(
                ExtendedIceConnectionState::FailedNoRestart,
            ));
        }
        actions
    }

    /// Restarts ICE if the local side offered and no negotiation is in
    /// progress.
    fn try_ice_restart(&mut self, reason: &str) {
        if self.conn.local_description_type() != Some(SdpType::Offer)
            || self.conn.signaling_state() != SignalingState::Stable
        {
            return;
        }
        self.ice_restarts += 1;
        debug!(
            "ICE restart {} of peer {} after {}",
            self.ice_restarts, self.id, reason,
        );
        self.conn.ice_restart();
    }

    /// Schedules [`DisconnectedCheck`] replacing the pending one.
    fn schedule_disconnected_check<K>(&mut self, timers: &mut Timers<K>)
    where
        K: From<DisconnectedCheck>,
    {
        if let Some(timer) = self.disconnected_timer.take() {
            timers.cancel(timer);
        }
        let check = DisconnectedCheck {
            peer_id: self.id.clone(),
            sid: self.sid.clone(),
        };
        self.disconnected_timer =
            Some(timers.schedule(self.disconnected_timeout, check.into()));
    }
}
