//! Interface of the signalling collaborator.
//!
//! Signalling transports roster changes and negotiation messages between
//! sessions. Its wire format is not a concern of this crate: it is consumed
//! as [`SignallingEvent`]s and driven through the [`Signalling`] trait.

mod flags;
mod message;
mod roster;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

#[doc(inline)]
pub use self::{
    flags::{CallFlags, Permissions, SipFlags},
    message::{nick_from_payload, Message, MessageKind, MessageParseError},
    roster::RosterEntry,
};

/// ID of a single live connection of a participant.
#[derive(
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[from(forward)]
pub struct SessionId(pub String);

/// Persistent identity of a participant.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
pub struct UserId(pub String);

/// Kind of a peer connection between two sessions.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    /// Connection carrying device audio and video.
    #[display(fmt = "video")]
    Video,

    /// Connection carrying a shared screen.
    #[display(fmt = "screen")]
    Screen,
}

/// Optional capability of signalling.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Feature {
    /// Media is forwarded by a relay instead of a mesh of direct connections.
    #[display(fmt = "mcu")]
    Mcu,

    /// Relay accepts simulcast streams.
    #[display(fmt = "simulcast")]
    Simulcast,
}

/// Events delivered by signalling.
#[derive(Clone, Debug, PartialEq)]
pub enum SignallingEvent {
    /// Full snapshot of the room roster.
    UsersInRoom(Vec<RosterEntry>),

    /// Sessions joined the room.
    UsersJoined(Vec<RosterEntry>),

    /// Sessions changed their state.
    UsersChanged(Vec<RosterEntry>),

    /// Sessions left the room.
    UsersLeft(Vec<SessionId>),

    /// State of a session connected through a SIP gateway changed.
    ParticipantFlagsChanged {
        /// Session which state changed.
        session_id: SessionId,

        /// New state of the session.
        flags: SipFlags,
    },

    /// Message from another session.
    Message(Message),

    /// Local session leaves the call.
    LeaveCall {
        /// Whether the call is left only to join it again immediately.
        reconnect: bool,
    },

    /// Signalling gave up receiving messages.
    PullMessagesStoppedOnFail,

    /// Signalling connection was closed.
    Disconnected,
}

/// Operations of signalling used by a call session.
pub trait Signalling {
    /// Returns [`SessionId`] of the local session.
    fn session_id(&self) -> SessionId;

    /// Returns persistent identity of the local user, [`None`] for guests.
    fn user_id(&self) -> Option<UserId>;

    /// Returns the display name of the local participant.
    fn display_name(&self) -> String;

    /// Indicates whether signalling supports the provided [`Feature`].
    fn has_feature(&self, feature: Feature) -> bool;

    /// Indicates whether TURN servers were provided for peer connections.
    fn has_turn_servers(&self) -> bool;

    /// Sends the provided [`Message`] to the session it's addressed to.
    fn send_message(&self, message: Message);

    /// Asks the relay to send an offer of the media published by the provided
    /// session.
    fn request_offer(&self, session_id: &SessionId, kind: PeerKind);

    /// Asks the relay to send an offer of the locally published media of the
    /// provided [`PeerKind`] to the provided session.
    fn send_offer(&self, session_id: &SessionId, kind: PeerKind);

    /// Returns [`CallFlags`] the local session joined the call with.
    fn current_call_flags(&self) -> CallFlags;

    /// Updates [`CallFlags`] declared by the local session.
    fn update_current_call_flags(&self, flags: CallFlags);

    /// Indicates whether video should be sent once available.
    fn send_video_if_available(&self) -> bool;

    /// Sets whether video should be sent once available.
    fn set_send_video_if_available(&self, send: bool);

    /// Leaves the call and joins it again with the provided [`CallFlags`], or
    /// with the current ones if [`None`].
    fn force_reconnect(&self, flags: Option<CallFlags>);
}
