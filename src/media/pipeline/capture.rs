//! Source node capturing media of the local devices.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use futures::stream::LocalBoxStream;
use tracerr::Traced;

use crate::{
    log::prelude::*,
    media::{LocalMediaError, MediaKind, Track},
    platform::{MediaDeviceError, MediaDevices, MediaStreamConstraints},
    utils::EventEmitter,
};

use super::{OutputSinks, TrackSource};

/// Output carrying the captured audio track.
const AUDIO: &str = "audio";

/// Output carrying the captured video track.
const VIDEO: &str = "video";

/// Events of a [`MediaDevicesSource`].
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    /// Capturing audio and video together failed, so audio alone is requested.
    RequestFailedRetryNoVideo(MediaDeviceError),
}

/// Source node exposing the captured audio and video tracks on its `audio`
/// and `video` outputs.
pub struct MediaDevicesSource {
    /// Platform devices.
    devices: Rc<dyn MediaDevices>,

    /// `audio` and `video` outputs.
    outputs: OutputSinks,

    /// Whether audio may be captured.
    audio_allowed: Cell<bool>,

    /// Whether video may be captured.
    video_allowed: Cell<bool>,

    /// Audio input device to capture, the default one if [`None`].
    audio_device_id: RefCell<Option<String>>,

    /// Video input device to capture, the default one if [`None`].
    video_device_id: RefCell<Option<String>>,

    /// Events of this node.
    events: EventEmitter<CaptureEvent>,
}

impl_debug_by_struct_name!(MediaDevicesSource);

impl MediaDevicesSource {
    /// Creates new [`MediaDevicesSource`] allowing both audio and video.
    pub fn new(devices: Rc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            outputs: OutputSinks::new(&[AUDIO, VIDEO]),
            audio_allowed: Cell::new(true),
            video_allowed: Cell::new(true),
            audio_device_id: RefCell::new(None),
            video_device_id: RefCell::new(None),
            events: EventEmitter::new(),
        }
    }

    /// Returns name of the output carrying tracks of the provided
    /// [`MediaKind`].
    #[inline]
    pub fn output_of(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Audio => AUDIO,
            MediaKind::Video => VIDEO,
        }
    }

    /// Indicates whether audio may be captured.
    #[inline]
    pub fn is_audio_allowed(&self) -> bool {
        self.audio_allowed.get()
    }

    /// Indicates whether video may be captured.
    #[inline]
    pub fn is_video_allowed(&self) -> bool {
        self.video_allowed.get()
    }

    /// Allows or disallows capturing audio.
    ///
    /// Disallowing stops the captured audio track.
    pub fn set_audio_allowed(&self, allowed: bool) {
        self.audio_allowed.set(allowed);
        if !allowed {
            self.stop_output(AUDIO);
        }
    }

    /// Allows or disallows capturing video.
    ///
    /// Disallowing stops the captured video track.
    pub fn set_video_allowed(&self, allowed: bool) {
        self.video_allowed.set(allowed);
        if !allowed {
            self.stop_output(VIDEO);
        }
    }

    /// Selects the devices used by the next [`MediaDevicesSource::start`].
    pub fn set_device_ids(
        &self,
        audio: Option<String>,
        video: Option<String>,
    ) {
        *self.audio_device_id.borrow_mut() = audio;
        *self.video_device_id.borrow_mut() = video;
    }

    /// Returns [`EventEmitter`] of this node.
    #[inline]
    pub fn events(&self) -> &EventEmitter<CaptureEvent> {
        &self.events
    }

    /// Subscribes to the [`CaptureEvent`]s of this node.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, CaptureEvent> {
        self.events.subscribe()
    }

    /// Captures the allowed media and sets the captured tracks on the
    /// outputs.
    ///
    /// If capturing audio and video together fails, audio alone is requested
    /// once more.
    ///
    /// Returns [`MediaStreamConstraints`] describing what was actually
    /// captured.
    ///
    /// # Errors
    ///
    /// With [`LocalMediaError::NothingRequested`] if neither audio nor video
    /// is allowed.
    ///
    /// With [`LocalMediaError::CouldNotGetLocalMedia`] if the platform failed
    /// to capture the media.
    pub async fn start(
        &self,
    ) -> Result<MediaStreamConstraints, Traced<LocalMediaError>> {
        let constraints = self.constraints();
        if constraints.is_empty() {
            return Err(tracerr::new!(LocalMediaError::NothingRequested));
        }

        let devices = Rc::clone(&self.devices);
        let tracks = match devices.get_user_media(constraints.clone()).await {
            Ok(tracks) => tracks,
            Err(e) if constraints.audio && constraints.video => {
                warn!(
                    "Failed to capture audio and video, retrying without \
                     video: {}",
                    e,
                );
                self.events.emit(CaptureEvent::RequestFailedRetryNoVideo(e));
                let audio_only = MediaStreamConstraints {
                    video: false,
                    video_device_id: None,
                    ..constraints
                };
                devices.get_user_media(audio_only).await.map_err(|e| {
                    tracerr::new!(LocalMediaError::CouldNotGetLocalMedia(e))
                })?
            }
            Err(e) => {
                return Err(tracerr::new!(
                    LocalMediaError::CouldNotGetLocalMedia(e)
                ))
            }
        };

        self.set_captured(tracks);
        Ok(MediaStreamConstraints {
            audio: self.outputs.track(AUDIO).is_some(),
            video: self.outputs.track(VIDEO).is_some(),
            audio_device_id: self.audio_device_id.borrow().clone(),
            video_device_id: self.video_device_id.borrow().clone(),
        })
    }

    /// Stops every captured track and empties the outputs.
    pub fn stop(&self) {
        self.stop_output(AUDIO);
        self.stop_output(VIDEO);
    }

    /// Builds [`MediaStreamConstraints`] out of the allowed media.
    fn constraints(&self) -> MediaStreamConstraints {
        MediaStreamConstraints {
            audio: self.audio_allowed.get(),
            video: self.video_allowed.get(),
            audio_device_id: self.audio_device_id.borrow().clone(),
            video_device_id: self.video_device_id.borrow().clone(),
        }
    }

    /// Replaces the output tracks with the captured ones.
    fn set_captured(&self, tracks: Vec<Track>) {
        for kind in [MediaKind::Audio, MediaKind::Video].iter().copied() {
            let output = Self::output_of(kind);
            let captured = tracks.iter().find(|t| t.kind() == kind).cloned();
            let previous = self.outputs.track(output);
            self.outputs.set_track(output, captured.clone());
            if let Some(previous) = previous {
                if Some(&previous) != captured.as_ref() {
                    previous.stop();
                }
            }
        }
        for extra in tracks.iter().filter(|t| {
            self.outputs.track(Self::output_of(t.kind())).as_ref() != Some(*t)
        }) {
            debug!("Stopping extra captured track {}", extra.id());
            extra.stop();
        }
    }

    /// Stops the track of the provided output and empties it.
    fn stop_output(&self, output: &str) {
        if let Some(track) = self.outputs.track(output) {
            track.stop();
            self.outputs.set_track(output, None);
        }
    }
}

impl TrackSource for MediaDevicesSource {
    #[inline]
    fn outputs(&self) -> &OutputSinks {
        &self.outputs
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::RefCell, rc::Rc};

    use async_trait::async_trait;
    use futures::executor::block_on;

    use crate::{
        media::{pipeline::TrackSource as _, LocalMediaError, MediaKind, Track},
        platform::{MediaDeviceError, MediaDevices, MediaStreamConstraints},
    };

    use super::{CaptureEvent, MediaDevicesSource};

    /// Devices failing any request including video.
    #[derive(Default)]
    struct NoCamera {
        requests: RefCell<Vec<MediaStreamConstraints>>,
    }

    #[async_trait(?Send)]
    impl MediaDevices for NoCamera {
        fn is_supported(&self) -> bool {
            true
        }

        async fn get_user_media(
            &self,
            constraints: MediaStreamConstraints,
        ) -> Result<Vec<Track>, MediaDeviceError> {
            self.requests.borrow_mut().push(constraints.clone());
            if constraints.video {
                Err(MediaDeviceError::NotFound)
            } else {
                Ok(vec![Track::new("mic", MediaKind::Audio)])
            }
        }

        async fn get_display_media(
            &self,
        ) -> Result<Vec<Track>, MediaDeviceError> {
            Err(MediaDeviceError::NotSupported)
        }
    }

    #[test]
    fn retries_without_video() {
        let devices = Rc::new(NoCamera::default());
        let source = MediaDevicesSource::new(devices.clone());
        let events = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&events);
        source.events().on(move |e| recorded.borrow_mut().push(e.clone()));

        let captured = block_on(source.start()).unwrap();

        assert!(captured.audio);
        assert!(!captured.video);
        assert_eq!(devices.requests.borrow().len(), 2);
        assert_eq!(
            *events.borrow(),
            vec![CaptureEvent::RequestFailedRetryNoVideo(
                MediaDeviceError::NotFound
            )],
        );
        assert_eq!(source.output_track("audio").unwrap().id(), "mic");
        assert_eq!(source.output_track("video"), None);
    }

    #[test]
    fn fails_without_retry_when_only_video_requested() {
        let devices = Rc::new(NoCamera::default());
        let source = MediaDevicesSource::new(devices.clone());
        source.set_audio_allowed(false);

        let err = block_on(source.start()).unwrap_err();

        assert_eq!(
            *err.as_ref(),
            LocalMediaError::CouldNotGetLocalMedia(MediaDeviceError::NotFound),
        );
        assert_eq!(devices.requests.borrow().len(), 1);
    }

    #[test]
    fn nothing_requested() {
        let source = MediaDevicesSource::new(Rc::new(NoCamera::default()));
        source.set_audio_allowed(false);
        source.set_video_allowed(false);

        let err = block_on(source.start()).unwrap_err();

        assert_eq!(*err.as_ref(), LocalMediaError::NothingRequested);
    }

    #[test]
    fn stop_ends_tracks() {
        let source = MediaDevicesSource::new(Rc::new(NoCamera::default()));
        source.set_video_allowed(false);
        block_on(source.start()).unwrap();
        let mic = source.output_track("audio").unwrap();

        source.stop();

        assert!(mic.is_ended());
        assert_eq!(source.output_track("audio"), None);
    }
}
