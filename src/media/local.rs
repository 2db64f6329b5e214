//! Local media of the call: captured devices and shared screens.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use derive_more::Display;
use futures::stream::LocalBoxStream;
use tracerr::Traced;

use crate::{
    log::prelude::*,
    platform::{
        BackgroundSegmenter, MediaDeviceError, MediaDevices,
        MediaStreamConstraints,
    },
    utils::EventEmitter,
};

use super::{
    pipeline::{
        CaptureEvent, MediaDevicesSource, SpeakingEvent, SpeakingMonitor,
        TrackConstrainer, TrackEnabler, TrackEvent, TrackSource as _,
        TrackToStream, VirtualBackground, DEFAULT_SLOT,
    },
    MediaKind, MediaStream, Track, TrackConstraints,
};

/// Errors of starting local media.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum LocalMediaError {
    /// Platform failed to capture the requested media.
    #[display(fmt = "Failed to get local media: {}", _0)]
    CouldNotGetLocalMedia(MediaDeviceError),

    /// Neither audio nor video is allowed.
    #[display(fmt = "Neither audio nor video was requested")]
    NothingRequested,
}

/// Events of [`LocalMedia`].
#[derive(Clone, Debug, PartialEq)]
pub enum LocalMediaEvent {
    /// Capture of the devices was requested.
    StreamRequested,

    /// Capturing audio and video together failed, so audio alone is
    /// requested.
    StreamRequestFailedRetryNoVideo(MediaDeviceError),

    /// Capture of the devices failed.
    StreamRequestFailed(LocalMediaError),

    /// Local media was started, [`None`] if it was started without media.
    Stream(Option<MediaStream>),

    /// Tracks of the local stream changed.
    StreamChanged(Option<MediaStream>),

    /// Local stream is no longer used.
    StreamStopped(MediaStream),

    /// Track of the local stream was replaced.
    TrackReplaced {
        /// New track.
        new: Option<Track>,

        /// Previous track.
        old: Option<Track>,

        /// Local stream after the replacement.
        stream: Option<MediaStream>,
    },

    /// Track of the local stream was enabled or disabled.
    TrackEnabledChanged {
        /// Changed track.
        track: Track,

        /// Local stream of the track.
        stream: Option<MediaStream>,
    },

    /// Screen capture was requested.
    ScreenRequested,

    /// Screen is shared.
    Screen(MediaStream),

    /// Screen capture failed.
    ScreenRequestFailed,

    /// Shared screen is no longer used.
    ScreenStopped(MediaStream),

    /// Audio capture was allowed.
    AudioAllowed,

    /// Audio capture was disallowed.
    AudioDisallowed,

    /// Video capture was allowed.
    VideoAllowed,

    /// Video capture was disallowed.
    VideoDisallowed,

    /// Microphone was unmuted.
    AudioOn,

    /// Microphone was muted.
    AudioOff,

    /// Camera was resumed.
    VideoOn,

    /// Camera was paused.
    VideoOff,

    /// Virtual background was enabled.
    VirtualBackgroundOn,

    /// Virtual background was disabled.
    VirtualBackgroundOff,

    /// Virtual background model failed to load.
    VirtualBackgroundLoadFailed,

    /// Local speaking detection event.
    Speaking(SpeakingEvent),
}

/// Read-only view of the local media used by a call session.
pub trait LocalMediaState {
    /// Indicates whether local media was started and not stopped yet.
    fn is_active(&self) -> bool;

    /// Returns the local device stream.
    fn local_stream(&self) -> Option<MediaStream>;

    /// Returns the shared screen.
    fn local_screen(&self) -> Option<MediaStream>;

    /// Indicates whether the local audio is sent unmuted.
    fn is_audio_enabled(&self) -> bool;

    /// Indicates whether the local video is sent unpaused.
    fn is_video_enabled(&self) -> bool;

    /// Stops local media including the shared screen.
    fn stop(&self);

    /// Stops sharing the screen.
    fn stop_screen_share(&self);
}

/// Local media of the call.
///
/// Captured tracks flow through the pipeline:
/// ```text
/// audio: capture -> enabler -> { speaking monitor, stream sink }
/// video: capture -> enabler -> constrainer -> virtual background -> sink
/// ```
#[derive(Clone, Debug)]
pub struct LocalMedia(Rc<Inner>);

struct Inner {
    /// Platform devices.
    devices: Rc<dyn MediaDevices>,

    /// Capture of the devices.
    source: Rc<MediaDevicesSource>,

    /// Mute gate of the audio.
    audio_enabler: Rc<TrackEnabler>,

    /// Pause gate of the video.
    video_enabler: Rc<TrackEnabler>,

    /// Constraints of the video.
    video_constrainer: Rc<TrackConstrainer>,

    /// Background substitution of the video.
    virtual_background: Rc<VirtualBackground>,

    /// Speaking detection of the audio.
    speaking_monitor: Rc<SpeakingMonitor>,

    /// Output of the pipeline.
    sink: Rc<TrackToStream>,

    /// Whether local media was started and not stopped yet.
    active: Cell<bool>,

    /// Whether changes of the output stream are relayed.
    relaying: Cell<bool>,

    /// Local device streams in use.
    streams: RefCell<Vec<MediaStream>>,

    /// Shared screens in use.
    screens: RefCell<Vec<MediaStream>>,

    /// Events of the local media.
    events: EventEmitter<LocalMediaEvent>,
}

impl_debug_by_struct_name!(Inner);

impl LocalMedia {
    /// Builds the local media pipeline.
    pub fn new(
        devices: Rc<dyn MediaDevices>,
        segmenter: Option<Rc<dyn BackgroundSegmenter>>,
        speaking_threshold: f64,
        speaking_history: usize,
    ) -> Self {
        if !devices.is_supported() {
            error!("Platform does not support local media capture");
        }

        let inner = Rc::new(Inner {
            source: Rc::new(MediaDevicesSource::new(Rc::clone(&devices))),
            devices,
            audio_enabler: Rc::new(TrackEnabler::new(true)),
            video_enabler: Rc::new(TrackEnabler::new(true)),
            video_constrainer: Rc::new(TrackConstrainer::new()),
            virtual_background: Rc::new(VirtualBackground::new(segmenter)),
            speaking_monitor: Rc::new(SpeakingMonitor::new(
                speaking_threshold,
                speaking_history,
            )),
            sink: Rc::new(TrackToStream::new(&["audio", "video"])),
            active: Cell::new(false),
            relaying: Cell::new(false),
            streams: RefCell::new(Vec::new()),
            screens: RefCell::new(Vec::new()),
            events: EventEmitter::new(),
        });

        inner.source.connect_track_sink(
            MediaDevicesSource::output_of(MediaKind::Audio),
            inner.audio_enabler.clone(),
            DEFAULT_SLOT,
        );
        inner.source.connect_track_sink(
            MediaDevicesSource::output_of(MediaKind::Video),
            inner.video_enabler.clone(),
            DEFAULT_SLOT,
        );
        inner.audio_enabler.connect_track_sink(
            DEFAULT_SLOT,
            inner.speaking_monitor.clone(),
            DEFAULT_SLOT,
        );
        inner.audio_enabler.connect_track_sink(
            DEFAULT_SLOT,
            inner.sink.clone(),
            "audio",
        );
        inner.video_enabler.connect_track_sink(
            DEFAULT_SLOT,
            inner.video_constrainer.clone(),
            DEFAULT_SLOT,
        );
        inner.video_constrainer.connect_track_sink(
            DEFAULT_SLOT,
            inner.virtual_background.clone(),
            DEFAULT_SLOT,
        );
        inner.virtual_background.connect_track_sink(
            DEFAULT_SLOT,
            inner.sink.clone(),
            "video",
        );

        Inner::relay_events(&inner);

        Self(inner)
    }

    /// Returns [`EventEmitter`] of this [`LocalMedia`].
    #[inline]
    pub fn events(&self) -> &EventEmitter<LocalMediaEvent> {
        &self.0.events
    }

    /// Subscribes to the [`LocalMediaEvent`]s.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, LocalMediaEvent> {
        self.0.events.subscribe()
    }

    /// Starts capturing the requested devices.
    ///
    /// Starting with nothing requested succeeds without media and without
    /// activating the local media. A failed capture still activates it, so
    /// devices allowed later can be captured without a new start.
    ///
    /// Returns [`MediaStreamConstraints`] describing what was actually
    /// captured.
    ///
    /// # Errors
    ///
    /// With [`LocalMediaError::CouldNotGetLocalMedia`] if the platform
    /// doesn't support capturing or failed to capture the media.
    pub async fn start(
        &self,
        constraints: MediaStreamConstraints,
    ) -> Result<MediaStreamConstraints, Traced<LocalMediaError>> {
        let inner = &self.0;
        self.set_audio_allowed(constraints.audio);
        self.set_video_allowed(constraints.video);
        inner.source.set_device_ids(
            constraints.audio_device_id.clone(),
            constraints.video_device_id.clone(),
        );

        if constraints.is_empty() {
            inner.events.emit(LocalMediaEvent::Stream(None));
            return Ok(constraints);
        }
        if !inner.devices.is_supported() {
            let err = LocalMediaError::CouldNotGetLocalMedia(
                MediaDeviceError::NotSupported,
            );
            inner
                .events
                .emit(LocalMediaEvent::StreamRequestFailed(err.clone()));
            return Err(tracerr::new!(err));
        }

        inner.events.emit(LocalMediaEvent::StreamRequested);
        let result = inner.source.start().await;
        inner.relaying.set(true);
        inner.active.set(true);

        match result {
            Ok(captured) => {
                let stream = inner.sink.stream();
                if let Some(stream) = &stream {
                    inner.streams.borrow_mut().push(stream.clone());
                }
                inner.events.emit(LocalMediaEvent::Stream(stream));
                Ok(captured)
            }
            Err(e) => {
                warn!("Failed to start local media: {}", e.as_ref());
                inner.events.emit(LocalMediaEvent::StreamRequestFailed(
                    e.as_ref().clone(),
                ));
                Err(e)
            }
        }
    }

    /// Stops capturing the devices.
    pub fn stop_stream(&self) {
        let stream = self.0.sink.stream();
        self.0.source.stop();
        if let Some(stream) = stream {
            self.0.remove_stream(&stream);
        }
    }

    /// Starts sharing a screen chosen by the user.
    ///
    /// # Errors
    ///
    /// With [`LocalMediaError::CouldNotGetLocalMedia`] if the platform failed
    /// to capture the screen.
    pub async fn start_screen_share(
        &self,
    ) -> Result<MediaStream, Traced<LocalMediaError>> {
        let inner = &self.0;
        inner.events.emit(LocalMediaEvent::ScreenRequested);
        let devices = Rc::clone(&inner.devices);
        match devices.get_display_media().await {
            Ok(tracks) => {
                let stream = MediaStream::with_tracks(tracks);
                inner.screens.borrow_mut().push(stream.clone());
                inner.events.emit(LocalMediaEvent::Screen(stream.clone()));
                Ok(stream)
            }
            Err(e) => {
                inner.events.emit(LocalMediaEvent::ScreenRequestFailed);
                Err(tracerr::new!(LocalMediaError::CouldNotGetLocalMedia(e)))
            }
        }
    }

    /// Releases the shared screens which tracks all ended.
    pub fn remove_ended_screens(&self) {
        let ended: Vec<_> = self
            .0
            .screens
            .borrow()
            .iter()
            .filter(|s| s.tracks().iter().all(Track::is_ended))
            .cloned()
            .collect();
        for stream in ended {
            self.0.remove_stream(&stream);
        }
    }

    /// Indicates whether audio capture is allowed.
    #[inline]
    pub fn is_audio_allowed(&self) -> bool {
        self.0.source.is_audio_allowed()
    }

    /// Allows or disallows audio capture.
    pub fn set_audio_allowed(&self, allowed: bool) {
        self.0.source.set_audio_allowed(allowed);
        self.0.events.emit(if allowed {
            LocalMediaEvent::AudioAllowed
        } else {
            LocalMediaEvent::AudioDisallowed
        });
    }

    /// Indicates whether video capture is allowed.
    #[inline]
    pub fn is_video_allowed(&self) -> bool {
        self.0.source.is_video_allowed()
    }

    /// Allows or disallows video capture.
    pub fn set_video_allowed(&self, allowed: bool) {
        self.0.source.set_video_allowed(allowed);
        self.0.events.emit(if allowed {
            LocalMediaEvent::VideoAllowed
        } else {
            LocalMediaEvent::VideoDisallowed
        });
    }

    /// Mutes the microphone.
    pub fn mute(&self) {
        self.0.audio_enabler.set_enabled(false);
        self.0.events.emit(LocalMediaEvent::AudioOff);
    }

    /// Unmutes the microphone.
    pub fn unmute(&self) {
        self.0.audio_enabler.set_enabled(true);
        self.0.events.emit(LocalMediaEvent::AudioOn);
    }

    /// Pauses the camera.
    pub fn pause_video(&self) {
        self.0.video_enabler.set_enabled(false);
        self.0.events.emit(LocalMediaEvent::VideoOff);
    }

    /// Resumes the camera.
    pub fn resume_video(&self) {
        self.0.video_enabler.set_enabled(true);
        self.0.events.emit(LocalMediaEvent::VideoOn);
    }

    /// Mutes the microphone and pauses the camera.
    pub fn pause(&self) {
        self.mute();
        self.pause_video();
    }

    /// Unmutes the microphone and resumes the camera.
    pub fn resume(&self) {
        self.unmute();
        self.resume_video();
    }

    /// Applies [`TrackConstraints`] to the local video.
    #[inline]
    pub fn apply_video_constraints(&self, constraints: TrackConstraints) {
        self.0.video_constrainer.apply_constraints(constraints);
    }

    /// Enables the virtual background.
    pub fn enable_virtual_background(&self) {
        self.0.virtual_background.set_enabled(true);
        self.0.events.emit(LocalMediaEvent::VirtualBackgroundOn);
    }

    /// Disables the virtual background.
    pub fn disable_virtual_background(&self) {
        self.0.virtual_background.set_enabled(false);
        self.0.events.emit(LocalMediaEvent::VirtualBackgroundOff);
    }

    /// Indicates whether the virtual background can be used.
    #[inline]
    pub fn is_virtual_background_available(&self) -> bool {
        self.0.virtual_background.is_available()
    }

    /// Indicates whether the virtual background is enabled.
    #[inline]
    pub fn is_virtual_background_enabled(&self) -> bool {
        self.0.virtual_background.is_enabled()
    }

    /// Feeds a volume sample of the local audio to speaking detection.
    #[inline]
    pub fn add_volume_sample(&self, volume: f64) {
        self.0.speaking_monitor.add_volume_sample(volume);
    }

    /// Indicates whether local speech is detected.
    #[inline]
    pub fn is_speaking(&self) -> bool {
        self.0.speaking_monitor.is_speaking()
    }
}

impl LocalMediaState for LocalMedia {
    #[inline]
    fn is_active(&self) -> bool {
        self.0.active.get()
    }

    fn local_stream(&self) -> Option<MediaStream> {
        self.0.streams.borrow().first().cloned()
    }

    fn local_screen(&self) -> Option<MediaStream> {
        self.0.screens.borrow().first().cloned()
    }

    #[inline]
    fn is_audio_enabled(&self) -> bool {
        self.0.all_enabled(MediaKind::Audio)
    }

    #[inline]
    fn is_video_enabled(&self) -> bool {
        self.0.all_enabled(MediaKind::Video)
    }

    fn stop(&self) {
        self.0.relaying.set(false);
        self.stop_stream();
        self.stop_screen_share();
        self.0.active.set(false);
    }

    fn stop_screen_share(&self) {
        let screens: Vec<_> = self.0.screens.borrow().clone();
        for stream in screens {
            for track in stream.tracks() {
                track.stop();
            }
            self.0.remove_stream(&stream);
        }
    }
}

impl Inner {
    /// Relays the events of the pipeline nodes as [`LocalMediaEvent`]s.
    fn relay_events(this: &Rc<Self>) {
        let weak = Rc::downgrade(this);
        this.source.events().on(move |e| {
            if let Some(inner) = weak.upgrade() {
                let CaptureEvent::RequestFailedRetryNoVideo(err) = e;
                inner.events.emit(
                    LocalMediaEvent::StreamRequestFailedRetryNoVideo(
                        err.clone(),
                    ),
                );
            }
        });

        let weak = Rc::downgrade(this);
        this.virtual_background.outputs().events().on(move |e| {
            if let (Some(inner), TrackEvent::LoadFailed) = (weak.upgrade(), e)
            {
                inner
                    .events
                    .emit(LocalMediaEvent::VirtualBackgroundLoadFailed);
            }
        });

        let weak = Rc::downgrade(this);
        this.speaking_monitor.events().on(move |e| {
            if let Some(inner) = weak.upgrade() {
                inner.events.emit(LocalMediaEvent::Speaking(e.clone()));
            }
        });

        let weak: Weak<Self> = Rc::downgrade(this);
        this.sink.events().on(move |e| {
            if let Some(inner) = weak.upgrade() {
                inner.on_sink_event(e);
            }
        });
    }

    /// Handles [`TrackEvent`] of the pipeline output.
    fn on_sink_event(&self, event: &TrackEvent) {
        if !self.relaying.get() {
            return;
        }
        match event {
            TrackEvent::StreamSet { new, old } => {
                if let Some(old) = old {
                    self.remove_stream(old);
                }
                if let Some(new) = new {
                    self.streams.borrow_mut().push(new.clone());
                }
            }
            TrackEvent::TrackReplaced { new, old, .. } => {
                let stream = self.sink.stream();
                self.events
                    .emit(LocalMediaEvent::StreamChanged(stream.clone()));
                self.events.emit(LocalMediaEvent::TrackReplaced {
                    new: new.clone(),
                    old: old.clone(),
                    stream,
                });
            }
            TrackEvent::TrackEnabled { track, .. } => {
                self.events.emit(LocalMediaEvent::TrackEnabledChanged {
                    track: track.clone(),
                    stream: self.sink.stream(),
                });
            }
            TrackEvent::LoadFailed => (),
        }
    }

    /// Releases the provided local stream or shared screen.
    fn remove_stream(&self, stream: &MediaStream) {
        let removed_stream = {
            let mut streams = self.streams.borrow_mut();
            let len = streams.len();
            streams.retain(|s| s != stream);
            streams.len() != len
        };
        if removed_stream {
            self.events.emit(LocalMediaEvent::StreamStopped(stream.clone()));
            return;
        }

        let removed_screen = {
            let mut screens = self.screens.borrow_mut();
            let len = screens.len();
            screens.retain(|s| s != stream);
            screens.len() != len
        };
        if removed_screen {
            self.events.emit(LocalMediaEvent::ScreenStopped(stream.clone()));
        }
    }

    /// Indicates whether the local streams have tracks of the provided
    /// [`MediaKind`], all of them enabled.
    fn all_enabled(&self, kind: MediaKind) -> bool {
        let tracks: Vec<_> = self
            .streams
            .borrow()
            .iter()
            .flat_map(|s| s.tracks_of(kind))
            .collect();
        !tracks.is_empty() && tracks.iter().all(Track::enabled)
    }
}
