//! Peer connections of a call session and their lifecycle.

mod connection;
mod repo;

use std::fmt;

use serde_json::Value;

use crate::{
    media::MediaStream,
    platform::{IceConnectionState, PeerConnectionState, PeerOptions},
    signalling::{PeerKind, SessionId},
};

#[doc(inline)]
pub use self::{
    connection::{
        DisconnectedCheck, ExtendedIceConnectionState, PeerAction,
        PeerConnection,
    },
    repo::PeerRepository,
};

/// Key of a [`PeerConnection`].
///
/// Besides the remote session and the [`PeerKind`] it tells apart the
/// connection sending the local screen to a session from the one receiving
/// the screen of that session.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PeerId {
    /// Remote session of the connection.
    pub session_id: SessionId,

    /// [`PeerKind`] of the connection.
    pub kind: PeerKind,

    /// Whether the connection sends the local screen.
    pub share_my_screen: bool,
}

impl PeerId {
    /// [`PeerId`] of the device media connection with the provided session.
    #[inline]
    pub fn video(session_id: SessionId) -> Self {
        Self {
            session_id,
            kind: PeerKind::Video,
            share_my_screen: false,
        }
    }

    /// [`PeerId`] of the connection receiving the screen of the provided
    /// session.
    #[inline]
    pub fn screen(session_id: SessionId) -> Self {
        Self {
            session_id,
            kind: PeerKind::Screen,
            share_my_screen: false,
        }
    }

    /// [`PeerId`] of the connection sending the local screen to the provided
    /// session.
    #[inline]
    pub fn shared_screen(session_id: SessionId) -> Self {
        Self {
            session_id,
            kind: PeerKind::Screen,
            share_my_screen: true,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.kind)?;
        if self.share_my_screen {
            write!(f, "/sending")?;
        }
        Ok(())
    }
}

impl From<&PeerOptions> for PeerId {
    #[inline]
    fn from(options: &PeerOptions) -> Self {
        Self {
            session_id: options.session_id.clone(),
            kind: options.kind,
            share_my_screen: options.share_my_screen,
        }
    }
}

/// Event reported by an [`RtcPeerConnection`].
///
/// [`RtcPeerConnection`]: crate::platform::RtcPeerConnection
#[derive(Clone, Debug, PartialEq)]
pub struct PeerEvent {
    /// [`PeerConnection`] the event belongs to.
    pub peer_id: PeerId,

    /// Negotiation ID of the reporting connection.
    ///
    /// Events of a connection replaced since then are ignored.
    pub sid: String,

    /// What happened.
    pub kind: PeerEventKind,
}

/// Kinds of [`PeerEvent`]s.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerEventKind {
    /// [`IceConnectionState`] changed.
    IceConnectionStateChanged(IceConnectionState),

    /// [`PeerConnectionState`] changed.
    ConnectionStateChanged(PeerConnectionState),

    /// Tracks changed and the connection needs a new negotiation.
    NegotiationNeeded,

    /// Remote stream was added.
    StreamAdded(MediaStream),

    /// Remote stream was removed.
    StreamRemoved,

    /// Message received through a data channel.
    ChannelMessage {
        /// Label of the data channel.
        label: String,

        /// Type of the message.
        kind: String,

        /// Payload of the message.
        payload: Value,
    },
}
