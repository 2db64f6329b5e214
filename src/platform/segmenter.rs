//! Segmentation of video frames for background substitution.

use derive_more::Display;

use crate::media::Track;

/// Error of loading a segmentation model.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "Failed to load segmentation model: {}", _0)]
pub struct SegmenterLoadError(pub String);

/// Replaces the background of video frames.
pub trait BackgroundSegmenter {
    /// Loads the segmentation model.
    ///
    /// Called once, before the first [`BackgroundSegmenter::process`] call.
    ///
    /// # Errors
    ///
    /// If the model can't be used on this platform.
    fn load(&self) -> Result<(), SegmenterLoadError>;

    /// Returns [`Track`] producing the frames of the provided one with its
    /// background substituted.
    fn process(&self, track: &Track) -> Track;
}
