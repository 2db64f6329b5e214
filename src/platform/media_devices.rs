//! Capture of local media devices.

use async_trait::async_trait;
use derive_more::Display;

use crate::media::Track;

/// Local media requested from [`MediaDevices`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MediaStreamConstraints {
    /// Whether an audio track is requested.
    pub audio: bool,

    /// Whether a video track is requested.
    pub video: bool,

    /// ID of the audio input device to use, the default one if [`None`].
    pub audio_device_id: Option<String>,

    /// ID of the video input device to use, the default one if [`None`].
    pub video_device_id: Option<String>,
}

impl MediaStreamConstraints {
    /// Indicates whether nothing is requested.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

/// Errors of local media capture.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum MediaDeviceError {
    /// User or platform denied access to the devices.
    #[display(fmt = "Access to media devices was denied")]
    NotAllowed,

    /// Platform can't capture media at all.
    #[display(fmt = "Media capture is not supported")]
    NotSupported,

    /// Capture is only allowed from a secure context.
    #[display(fmt = "Media capture requires a secure context")]
    InsecureContext,

    /// Requested devices are not present.
    #[display(fmt = "Requested media devices were not found")]
    NotFound,

    /// Any other capture error.
    #[display(fmt = "Failed to capture media: {}", _0)]
    Other(String),
}

/// Media devices of the platform.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// Indicates whether the platform allows capturing media at all.
    fn is_supported(&self) -> bool;

    /// Captures device media satisfying the provided
    /// [`MediaStreamConstraints`].
    async fn get_user_media(
        &self,
        constraints: MediaStreamConstraints,
    ) -> Result<Vec<Track>, MediaDeviceError>;

    /// Captures a display (screen or window) chosen by the user.
    async fn get_display_media(&self) -> Result<Vec<Track>, MediaDeviceError>;
}
