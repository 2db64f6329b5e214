//! Substitution of the background of a video track.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{log::prelude::*, media::Track, platform::BackgroundSegmenter};

use super::{
    InputChange, InputSlots, OutputSinks, TrackEvent, TrackSink, TrackSource,
    DEFAULT_SLOT,
};

/// State of the segmentation model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ModelState {
    /// Loading hasn't been attempted yet.
    NotLoaded,

    /// Model is ready.
    Loaded,

    /// Model can't be loaded.
    Failed,
}

/// Node substituting the background of the video track passing through it.
///
/// Can be toggled without recapturing the device. While disabled, or if the
/// segmentation model can't be loaded, the track passes through unmodified.
pub struct VirtualBackground {
    /// Single input slot.
    inputs: InputSlots,

    /// Single output.
    outputs: OutputSinks,

    /// Platform segmenter, [`None`] if the platform has none.
    segmenter: Option<Rc<dyn BackgroundSegmenter>>,

    /// Whether substitution is requested.
    enabled: Cell<bool>,

    /// State of the segmentation model.
    model: Cell<ModelState>,

    /// Input track and the track produced out of it.
    processed: RefCell<Option<(Track, Track)>>,
}

impl_debug_by_struct_name!(VirtualBackground);

impl VirtualBackground {
    /// Creates new disabled [`VirtualBackground`].
    pub fn new(segmenter: Option<Rc<dyn BackgroundSegmenter>>) -> Self {
        Self {
            inputs: InputSlots::new(&[DEFAULT_SLOT]),
            outputs: OutputSinks::new(&[DEFAULT_SLOT]),
            segmenter,
            enabled: Cell::new(false),
            model: Cell::new(ModelState::NotLoaded),
            processed: RefCell::new(None),
        }
    }

    /// Indicates whether substitution can be used at all.
    pub fn is_available(&self) -> bool {
        self.segmenter.is_some() && self.model.get() != ModelState::Failed
    }

    /// Indicates whether substitution is requested.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Enables or disables substitution.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.replace(enabled) == enabled {
            return;
        }
        self.refresh_output();
    }

    /// Loads the segmentation model unless already tried.
    ///
    /// Returns whether the model is ready.
    fn ensure_loaded(&self) -> bool {
        match self.model.get() {
            ModelState::Loaded => return true,
            ModelState::Failed => return false,
            ModelState::NotLoaded => (),
        }
        let segmenter = if let Some(segmenter) = &self.segmenter {
            segmenter
        } else {
            return false;
        };
        match segmenter.load() {
            Ok(()) => {
                self.model.set(ModelState::Loaded);
                true
            }
            Err(e) => {
                warn!("Virtual background is not available: {}", e);
                self.model.set(ModelState::Failed);
                self.outputs.events().emit(TrackEvent::LoadFailed);
                false
            }
        }
    }

    /// Recomputes the output track out of the input one.
    fn refresh_output(&self) {
        let input = self.inputs.track(DEFAULT_SLOT);
        let output = match input {
            Some(input) if self.enabled.get() && self.ensure_loaded() => {
                Some(self.processed_for(&input))
            }
            other => {
                if let Some((_, processed)) = self.processed.borrow_mut().take()
                {
                    processed.stop();
                }
                other
            }
        };
        self.outputs.set_track(DEFAULT_SLOT, output);
    }

    /// Returns the track with substituted background produced out of the
    /// provided one.
    fn processed_for(&self, input: &Track) -> Track {
        if let Some((source, processed)) = self.processed.borrow().as_ref() {
            if source == input {
                return processed.clone();
            }
        }
        let processed = match &self.segmenter {
            Some(segmenter) => segmenter.process(input),
            None => input.clone(),
        };
        processed.set_enabled(input.enabled());
        let previous = self
            .processed
            .borrow_mut()
            .replace((input.clone(), processed.clone()));
        if let Some((_, previous)) = previous {
            previous.stop();
        }
        processed
    }
}

impl TrackSource for VirtualBackground {
    #[inline]
    fn outputs(&self) -> &OutputSinks {
        &self.outputs
    }
}

impl TrackSink for VirtualBackground {
    fn set_input_track(&self, slot: &str, track: Option<Track>) {
        match self.inputs.set(slot, track) {
            InputChange::Replaced { .. } => self.refresh_output(),
            InputChange::EnabledChanged(_, enabled) => {
                self.propagate_enabled(enabled);
            }
            InputChange::Unchanged => (),
        }
    }

    fn set_input_track_enabled(&self, slot: &str, enabled: bool) {
        if self.inputs.set_enabled(slot, enabled).is_some() {
            self.propagate_enabled(enabled);
        }
    }
}

impl VirtualBackground {
    /// Mirrors the enabled state of the input track on the output one.
    fn propagate_enabled(&self, enabled: bool) {
        if let Some((_, processed)) = self.processed.borrow().as_ref() {
            processed.set_enabled(enabled);
        }
        self.outputs.set_track_enabled(DEFAULT_SLOT, enabled);
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::Cell, rc::Rc};

    use crate::{
        media::{
            pipeline::{TrackEvent, TrackSource as _},
            MediaKind, Track,
        },
        platform::{BackgroundSegmenter, SegmenterLoadError},
    };

    use super::{TrackSink as _, VirtualBackground, DEFAULT_SLOT};

    /// Segmenter counting its calls.
    struct CountingSegmenter {
        fail: bool,
        loads: Cell<u32>,
        processed: Cell<u32>,
    }

    impl CountingSegmenter {
        fn new(fail: bool) -> Rc<Self> {
            Rc::new(Self {
                fail,
                loads: Cell::new(0),
                processed: Cell::new(0),
            })
        }
    }

    impl BackgroundSegmenter for CountingSegmenter {
        fn load(&self) -> Result<(), SegmenterLoadError> {
            self.loads.set(self.loads.get() + 1);
            if self.fail {
                Err(SegmenterLoadError("no WebGL".to_owned()))
            } else {
                Ok(())
            }
        }

        fn process(&self, track: &Track) -> Track {
            self.processed.set(self.processed.get() + 1);
            Track::new(format!("{}-blurred", track.id()), track.kind())
        }
    }

    #[test]
    fn toggles_without_new_input() {
        let segmenter = CountingSegmenter::new(false);
        let node = VirtualBackground::new(Some(segmenter.clone()));
        let camera = Track::new("camera", MediaKind::Video);
        node.set_input_track(DEFAULT_SLOT, Some(camera.clone()));
        assert_eq!(node.output_track(DEFAULT_SLOT), Some(camera.clone()));

        node.set_enabled(true);
        let blurred = node.output_track(DEFAULT_SLOT).unwrap();
        assert_eq!(blurred.id(), "camera-blurred");

        node.set_enabled(false);
        assert_eq!(node.output_track(DEFAULT_SLOT), Some(camera));
        assert!(blurred.is_ended());

        node.set_enabled(true);
        assert_eq!(segmenter.loads.get(), 1);
        assert_eq!(segmenter.processed.get(), 2);
    }

    #[test]
    fn passes_through_when_model_fails() {
        let segmenter = CountingSegmenter::new(true);
        let node = VirtualBackground::new(Some(segmenter.clone()));
        let failures = Rc::new(Cell::new(0));
        let counter = Rc::clone(&failures);
        node.outputs.events().on(move |e| {
            if *e == TrackEvent::LoadFailed {
                counter.set(counter.get() + 1);
            }
        });

        let camera = Track::new("camera", MediaKind::Video);
        node.set_input_track(DEFAULT_SLOT, Some(camera.clone()));
        node.set_enabled(true);

        assert_eq!(node.output_track(DEFAULT_SLOT), Some(camera));
        assert_eq!(failures.get(), 1);
        assert!(!node.is_available());

        node.set_enabled(false);
        node.set_enabled(true);
        assert_eq!(segmenter.loads.get(), 1);
        assert_eq!(failures.get(), 1);
    }

    #[test]
    fn unavailable_without_segmenter() {
        let node = VirtualBackground::new(None);
        let camera = Track::new("camera", MediaKind::Video);
        node.set_input_track(DEFAULT_SLOT, Some(camera.clone()));
        node.set_enabled(true);

        assert!(!node.is_available());
        assert_eq!(node.output_track(DEFAULT_SLOT), Some(camera));
    }
}
