//! Call session reconciling peer connections against the room roster.

mod participant;
mod roster;
mod session;
mod video_blocker;

use derive_more::{Display, From};

use crate::{
    media::LocalMediaEvent,
    peer::{ExtendedIceConnectionState, PeerEvent, PeerId},
    platform::MediaDeviceError,
    signalling::{CallFlags, SessionId, SignallingEvent},
};

#[doc(inline)]
pub use self::{
    participant::{CallParticipant, CallParticipantCollection, RaisedHand},
    roster::{initiation, Initiation, RosterDiff},
    session::CallSession,
    video_blocker::RemoteVideoBlocker,
};

/// User displayable reason of a local media capture failure.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum MediaErrorReason {
    /// Capture is only possible from a secure origin.
    #[display(fmt = "Access to microphone & camera is only possible with HTTPS")]
    HttpsRequired,

    /// User or platform denied the access.
    #[display(fmt = "Access to microphone & camera was denied")]
    AccessDenied,

    /// Platform lacks the required media capabilities.
    #[display(fmt = "WebRTC is not supported in your browser")]
    WebRtcUnsupported,

    /// Any other device failure.
    #[display(fmt = "Error while accessing microphone & camera: {}", _0)]
    DeviceError(String),
}

impl From<&MediaDeviceError> for MediaErrorReason {
    fn from(err: &MediaDeviceError) -> Self {
        match err {
            MediaDeviceError::InsecureContext => Self::HttpsRequired,
            MediaDeviceError::NotAllowed => Self::AccessDenied,
            MediaDeviceError::NotSupported => Self::WebRtcUnsupported,
            MediaDeviceError::NotFound | MediaDeviceError::Other(_) => {
                Self::DeviceError(err.to_string())
            }
        }
    }
}

/// Events of a [`CallSession`].
#[derive(Clone, Debug, PartialEq)]
pub enum CallEvent {
    /// [`CallParticipant`] of the session was created.
    ParticipantAdded(SessionId),

    /// [`CallParticipant`] of the session was removed.
    ParticipantRemoved(SessionId),

    /// Peer connection was created.
    PeerCreated(PeerId),

    /// Peer connection was ended.
    PeerEnded(PeerId),

    /// Connectivity of a peer connection changed.
    ExtendedIceConnectionState {
        /// Changed peer connection.
        peer_id: PeerId,

        /// New state.
        state: ExtendedIceConnectionState,
    },

    /// Someone joined the call.
    PlayJoinSound {
        /// Whether the local session joined.
        own: bool,
    },

    /// Someone left the call.
    PlayLeaveSound {
        /// Whether the local session left.
        own: bool,
    },

    /// Local media could not be captured.
    LocalMediaError(MediaErrorReason),

    /// Local media was requested a while ago and is still not captured,
    /// likely awaiting the permission of the user.
    LocalStreamRequestTimedOut,

    /// Connection failed and no TURN server is configured.
    TurnServerRecommended,

    /// Call is joined again with the provided flags, or with the current
    /// ones if [`None`].
    ForcedReconnect(Option<CallFlags>),

    /// Local media must be started by the embedder, as publishing it was
    /// allowed.
    LocalMediaStartRequested,
}

/// Input driving a [`CallSession`].
#[derive(Clone, Debug, From, PartialEq)]
pub enum SessionInput {
    /// Event of signalling.
    Signalling(SignallingEvent),

    /// Event of a peer connection.
    Peer(PeerEvent),

    /// Event of the local media.
    LocalMedia(LocalMediaEvent),
}
