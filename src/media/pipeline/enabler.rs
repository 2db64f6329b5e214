//! Gate muting and unmuting a track.

use std::cell::Cell;

use crate::media::Track;

use super::{
    InputChange, InputSlots, OutputSinks, TrackSink, TrackSource, DEFAULT_SLOT,
};

/// Node enabling or disabling the track passing through it.
///
/// The track is forwarded as is, so disabling it here disables it for every
/// node downstream.
#[derive(Debug)]
pub struct TrackEnabler {
    /// Single input slot.
    inputs: InputSlots,

    /// Single output.
    outputs: OutputSinks,

    /// State forced on the passing track.
    enabled: Cell<bool>,
}

impl TrackEnabler {
    /// Creates new [`TrackEnabler`] in the provided state.
    pub fn new(enabled: bool) -> Self {
        Self {
            inputs: InputSlots::new(&[DEFAULT_SLOT]),
            outputs: OutputSinks::new(&[DEFAULT_SLOT]),
            enabled: Cell::new(enabled),
        }
    }

    /// Indicates whether the passing track is enabled.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Enables or disables the passing track.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.replace(enabled) == enabled {
            return;
        }
        if let Some(track) = self.inputs.track(DEFAULT_SLOT) {
            track.set_enabled(enabled);
            self.inputs.set_enabled(DEFAULT_SLOT, enabled);
            self.outputs.set_track_enabled(DEFAULT_SLOT, enabled);
        }
    }
}

impl TrackSource for TrackEnabler {
    #[inline]
    fn outputs(&self) -> &OutputSinks {
        &self.outputs
    }
}

impl TrackSink for TrackEnabler {
    fn set_input_track(&self, slot: &str, track: Option<Track>) {
        if let Some(track) = &track {
            track.set_enabled(self.enabled.get());
        }
        if let InputChange::Replaced { new, .. } = self.inputs.set(slot, track)
        {
            self.outputs.set_track(DEFAULT_SLOT, new);
        }
    }

    fn set_input_track_enabled(&self, _: &str, _: bool) {
        if let Some(track) = self.inputs.track(DEFAULT_SLOT) {
            track.set_enabled(self.enabled.get());
        }
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::RefCell, rc::Rc};

    use crate::media::{
        pipeline::{TrackEvent, TrackSource as _, TrackToStream},
        MediaKind, Track,
    };

    use super::{TrackEnabler, TrackSink as _, DEFAULT_SLOT};

    #[test]
    fn forces_its_state_on_new_tracks() {
        let enabler = TrackEnabler::new(false);
        let track = Track::new("a", MediaKind::Audio);

        enabler.set_input_track(DEFAULT_SLOT, Some(track.clone()));

        assert!(!track.enabled());
        assert_eq!(enabler.output_track(DEFAULT_SLOT), Some(track));
    }

    #[test]
    fn toggling_notifies_downstream() {
        let enabler = TrackEnabler::new(true);
        let sink = Rc::new(TrackToStream::new(&["audio"]));
        enabler.connect_track_sink(DEFAULT_SLOT, sink.clone(), "audio");

        let events = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&events);
        sink.events().on(move |e| recorded.borrow_mut().push(e.clone()));

        let track = Track::new("a", MediaKind::Audio);
        enabler.set_input_track(DEFAULT_SLOT, Some(track.clone()));
        events.borrow_mut().clear();

        enabler.set_enabled(false);
        enabler.set_enabled(false);

        assert!(!track.enabled());
        assert_eq!(
            *events.borrow(),
            vec![TrackEvent::TrackEnabled {
                slot: "audio".to_owned(),
                track,
                enabled: false,
            }],
        );
    }
}
