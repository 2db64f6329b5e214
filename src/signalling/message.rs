//! Messages exchanged with remote sessions through signalling.

use std::rc::Rc;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracerr::Traced;

use crate::media::MediaKind;

use super::{PeerKind, SessionId};

/// Errors which can occur while decoding a signalling [`Message`].
#[derive(Clone, Debug, Display, From)]
pub enum MessageParseError {
    /// Message has unexpected shape.
    #[display(fmt = "Failed to deserialize signalling message: {}", _0)]
    Malformed(Rc<serde_json::Error>),
}

impl From<serde_json::Error> for MessageParseError {
    #[inline]
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(Rc::new(err))
    }
}

/// Type of a signalling [`Message`].
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    /// SDP offer.
    #[display(fmt = "offer")]
    Offer,

    /// SDP answer.
    #[display(fmt = "answer")]
    Answer,

    /// ICE candidate.
    #[display(fmt = "candidate")]
    Candidate,

    /// Sender stopped sharing its screen.
    #[display(fmt = "unshareScreen")]
    UnshareScreen,

    /// Sender disabled the media named in the payload.
    #[display(fmt = "mute")]
    Mute,

    /// Sender enabled the media named in the payload.
    #[display(fmt = "unmute")]
    Unmute,

    /// Sender changed its display name.
    #[display(fmt = "nickChanged")]
    NickChanged,

    /// Message of a type this crate doesn't handle.
    #[display(fmt = "unknown")]
    #[serde(other)]
    Unknown,
}

/// Message routed between sessions by signalling.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Sender session.
    pub from: SessionId,

    /// Receiver session, [`None`] if sent to the whole room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<SessionId>,

    /// Kind of the peer connection this message belongs to.
    pub room_type: PeerKind,

    /// Negotiation ID of the peer connection this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Type of this message.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Type specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    /// Decodes [`Message`] from the provided JSON value.
    ///
    /// # Errors
    ///
    /// With [`MessageParseError::Malformed`] if the value is not a valid
    /// [`Message`].
    pub fn parse(value: Value) -> Result<Self, Traced<MessageParseError>> {
        serde_json::from_value(value).map_err(tracerr::from_and_wrap!())
    }

    /// Returns [`MediaKind`] named in the payload of [`MessageKind::Mute`]
    /// and [`MessageKind::Unmute`] messages.
    pub fn media_name(&self) -> Option<MediaKind> {
        match self.payload.get("name").and_then(Value::as_str)? {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    /// Returns the display name carried by a [`MessageKind::NickChanged`]
    /// message.
    ///
    /// Guests send the bare name, while users send an object with a `name`
    /// field.
    pub fn nick(&self) -> Option<String> {
        nick_from_payload(&self.payload)
    }
}

/// Extracts the display name out of a `nickChanged` payload.
pub fn nick_from_payload(payload: &Value) -> Option<String> {
    match payload {
        Value::String(name) => Some(name.clone()),
        Value::Object(obj) => {
            obj.get("name").and_then(Value::as_str).map(ToOwned::to_owned)
        }
        _ => None,
    }
}
