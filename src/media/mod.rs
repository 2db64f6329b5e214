//! Local and remote media: tracks, streams and the local track pipeline.

mod local;
pub mod pipeline;
mod speaking_while_muted;
mod stream;
mod track;

#[doc(inline)]
pub use self::{
    local::{LocalMedia, LocalMediaError, LocalMediaEvent, LocalMediaState},
    speaking_while_muted::{
        NotificationRefused, SpeakingWhileMutedWarner, WarningView,
        SPEAKING_WHILE_MUTED_WARNING,
    },
    stream::MediaStream,
    track::{MediaKind, Track, TrackConstraints},
};
