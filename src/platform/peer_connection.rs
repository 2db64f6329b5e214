//! Peer connection transport.

use std::rc::Rc;

use derive_more::Display;
use serde_json::Value;

use crate::{
    media::{MediaKind, MediaStream},
    signalling::{Message, PeerKind, SessionId},
};

use super::RtcStats;

/// ICE connection state of a peer connection.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum IceConnectionState {
    /// ICE agent is gathering addresses or is waiting to be given remote
    /// candidates.
    #[display(fmt = "new")]
    New,

    /// ICE agent has been given one or more remote candidates and is checking
    /// pairs of local and remote candidates against one another, but hasn't
    /// yet found a usable pair.
    #[display(fmt = "checking")]
    Checking,

    /// Usable pairing of local and remote candidates has been found for all
    /// components of the connection, and the connection has been established.
    #[display(fmt = "connected")]
    Connected,

    /// ICE agent has finished gathering candidates, has checked all pairs
    /// against one another, and has found a connection for all components.
    #[display(fmt = "completed")]
    Completed,

    /// Checks to ensure that components are still connected failed for at
    /// least one component. May resolve just as spontaneously on less
    /// reliable networks.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// ICE agent has checked all candidates pairs against one another and
    /// has failed to find compatible matches for all components of the
    /// connection.
    #[display(fmt = "failed")]
    Failed,

    /// ICE agent has shut down and is no longer handling requests.
    #[display(fmt = "closed")]
    Closed,
}

/// Aggregated connection state of a peer connection.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PeerConnectionState {
    /// Transports haven't started connecting yet.
    #[display(fmt = "new")]
    New,

    /// Transports are establishing a connection.
    #[display(fmt = "connecting")]
    Connecting,

    /// Every transport is either connected or closed.
    #[display(fmt = "connected")]
    Connected,

    /// At least one transport is disconnected.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// At least one transport has failed.
    #[display(fmt = "failed")]
    Failed,

    /// Connection is closed.
    #[display(fmt = "closed")]
    Closed,
}

/// State of the offer/answer negotiation of a peer connection.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SignalingState {
    /// No negotiation is in progress.
    #[display(fmt = "stable")]
    Stable,

    /// Local offer is applied, answer is awaited.
    #[display(fmt = "have-local-offer")]
    HaveLocalOffer,

    /// Remote offer is applied, local answer is not yet.
    #[display(fmt = "have-remote-offer")]
    HaveRemoteOffer,

    /// Connection is closed.
    #[display(fmt = "closed")]
    Closed,
}

/// Type of a session description.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SdpType {
    /// Offer.
    #[display(fmt = "offer")]
    Offer,

    /// Answer.
    #[display(fmt = "answer")]
    Answer,
}

/// Side of a peer connection sending the initial offer.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum NegotiationRole {
    /// Local side sends the offer.
    Offerer,

    /// Local side answers the remote offer.
    Answerer,
}

/// Options of a new peer connection.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerOptions {
    /// Remote session of the connection.
    pub session_id: SessionId,

    /// [`PeerKind`] of the connection.
    pub kind: PeerKind,

    /// Whether the local side offers.
    pub role: NegotiationRole,

    /// Negotiation ID of the received offer, a new one is generated if
    /// [`None`].
    pub sid: Option<String>,

    /// Whether remote audio should be received.
    pub receive_audio: bool,

    /// Whether remote video should be received.
    pub receive_video: bool,

    /// Whether local video should be sent once available.
    pub send_video_if_available: bool,

    /// Whether simulcast should be used for the local video.
    pub enable_simulcast: bool,

    /// Whether data channels should be opened.
    pub enable_data_channels: bool,

    /// Whether the connection sends the local screen.
    pub share_my_screen: bool,

    /// Session which media this connection carries, if it differs from the
    /// remote one (a relay forwarding a screen).
    pub broadcaster: Option<SessionId>,

    /// Local [`MediaStream`] to send.
    pub stream: Option<MediaStream>,
}

/// Transport of a single peer connection.
///
/// The implementation reports its state changes back to the call session as
/// [`PeerEvent`]s.
///
/// [`PeerEvent`]: crate::peer::PeerEvent
pub trait RtcPeerConnection {
    /// Returns the negotiation ID of this connection.
    fn sid(&self) -> String;

    /// Creates a local offer and sends it to the remote session.
    fn start(&self);

    /// Applies an offer, answer or candidate received from the remote session.
    fn handle_message(&self, message: &Message);

    /// Restarts ICE by creating and sending a new local offer.
    fn ice_restart(&self);

    /// Closes this connection.
    fn end(&self);

    /// Returns current [`IceConnectionState`].
    fn ice_connection_state(&self) -> IceConnectionState;

    /// Returns current [`PeerConnectionState`].
    fn connection_state(&self) -> PeerConnectionState;

    /// Returns current [`SignalingState`].
    fn signaling_state(&self) -> SignalingState;

    /// Returns [`SdpType`] of the current local description.
    fn local_description_type(&self) -> Option<SdpType>;

    /// Returns kinds of the tracks currently sent.
    fn sending_kinds(&self) -> Vec<MediaKind>;

    /// Sends the message through the data channel with the provided label.
    fn send_directly(&self, channel: &str, kind: &str, payload: Value);

    /// Returns a snapshot of the connection statistics.
    fn get_stats(&self) -> RtcStats;
}

/// Factory of [`RtcPeerConnection`]s.
pub trait PeerConnectionFactory {
    /// Creates new [`RtcPeerConnection`] with the provided [`PeerOptions`].
    fn create(&self, options: PeerOptions) -> Rc<dyn RtcPeerConnection>;
}
