//! Bit flags describing participants state.

use bitflags::bitflags;

bitflags! {
    /// Declared call participation state of a session.
    pub struct CallFlags: u8 {
        /// Session is not in the call.
        const DISCONNECTED = 0;

        /// Session is in the call.
        const IN_CALL = 0b0001;

        /// Session publishes audio.
        const WITH_AUDIO = 0b0010;

        /// Session publishes video.
        const WITH_VIDEO = 0b0100;

        /// Session is connected by phone.
        const WITH_PHONE = 0b1000;
    }
}

impl CallFlags {
    /// Indicates whether session is in the call at all.
    #[inline]
    pub fn is_in_call(self) -> bool {
        !self.is_empty()
    }

    /// Indicates whether session publishes any media.
    #[inline]
    pub fn has_media(self) -> bool {
        self.intersects(Self::WITH_AUDIO | Self::WITH_VIDEO)
    }
}

impl Default for CallFlags {
    #[inline]
    fn default() -> Self {
        Self::DISCONNECTED
    }
}

bitflags! {
    /// State of a participant connected through a SIP gateway.
    pub struct SipFlags: u8 {
        /// Microphone is muted.
        const MUTE_MICROPHONE = 0b0001;

        /// Speaker is muted.
        const MUTE_SPEAKER = 0b0010;

        /// Participant is speaking.
        const SPEAKING = 0b0100;

        /// Participant raised hand.
        const RAISE_HAND = 0b1000;
    }
}

bitflags! {
    /// Permissions of a participant in the room.
    pub struct Permissions: u32 {
        /// Permissions are not customized.
        const DEFAULT = 0;

        /// Permissions are customized.
        const CUSTOM = 1;

        /// Participant may start a call.
        const CALL_START = 2;

        /// Participant may join a call.
        const CALL_JOIN = 4;

        /// Participant bypasses the lobby.
        const LOBBY_IGNORE = 8;

        /// Participant may publish audio.
        const PUBLISH_AUDIO = 16;

        /// Participant may publish video.
        const PUBLISH_VIDEO = 32;

        /// Participant may share the screen.
        const PUBLISH_SCREEN = 64;
    }
}

impl Permissions {
    /// Indicates whether any kind of device media may be published.
    #[inline]
    pub fn can_publish_media(self) -> bool {
        self.intersects(Self::PUBLISH_AUDIO | Self::PUBLISH_VIDEO)
    }
}
