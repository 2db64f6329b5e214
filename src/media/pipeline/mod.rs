//! Directed graph of nodes processing local media tracks.
//!
//! Every node has named input slots and named outputs. An output may be
//! connected to any count of `(node, slot)` pairs, and every change of the
//! output track (or of its enabled state) is pushed to all of them.
//!
//! Setting an input slot is an atomic replace. Setting the same track again is
//! a no-op unless its enabled state changed since it was last seen by the
//! slot, in which case only the enabled change is propagated.

mod capture;
mod constrainer;
mod enabler;
mod speaking;
mod stream_sink;
mod virtual_background;

use std::{cell::RefCell, collections::HashMap, fmt, mem, rc::Rc};

use futures::stream::LocalBoxStream;

use crate::{log::prelude::*, utils::EventEmitter};

use super::{MediaStream, Track};

#[doc(inline)]
pub use self::{
    capture::{CaptureEvent, MediaDevicesSource},
    constrainer::TrackConstrainer,
    enabler::TrackEnabler,
    speaking::{SpeakingEvent, SpeakingMonitor},
    stream_sink::TrackToStream,
    virtual_background::VirtualBackground,
};

/// Name of the single slot (or output) of one-to-one nodes.
pub const DEFAULT_SLOT: &str = "default";

/// Node consuming tracks.
pub trait TrackSink {
    /// Sets the track of the provided input slot, [`None`] empties it.
    fn set_input_track(&self, slot: &str, track: Option<Track>);

    /// Notifies about the enabled state change of the track in the provided
    /// input slot.
    fn set_input_track_enabled(&self, slot: &str, enabled: bool);
}

/// Node producing tracks on its named outputs.
pub trait TrackSource {
    /// Returns [`OutputSinks`] of this node.
    fn outputs(&self) -> &OutputSinks;

    /// Connects the provided output of this node to the provided input slot
    /// of the provided sink.
    fn connect_track_sink(
        &self,
        output: &str,
        sink: Rc<dyn TrackSink>,
        slot: &str,
    ) {
        self.outputs().connect(output, sink, slot);
    }

    /// Returns the current track of the provided output.
    fn output_track(&self, output: &str) -> Option<Track> {
        self.outputs().track(output)
    }

    /// Subscribes to the [`TrackEvent`]s of this node outputs.
    fn subscribe_track_events(&self) -> LocalBoxStream<'static, TrackEvent> {
        self.outputs().subscribe()
    }
}

/// Events of pipeline nodes.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackEvent {
    /// Output stream of a [`TrackToStream`] was replaced.
    StreamSet {
        /// New stream, [`None`] if no input track remains.
        new: Option<MediaStream>,

        /// Previous stream.
        old: Option<MediaStream>,
    },

    /// Track of a node slot was replaced.
    TrackReplaced {
        /// Slot (or output) name.
        slot: String,

        /// New track.
        new: Option<Track>,

        /// Previous track.
        old: Option<Track>,
    },

    /// Track of a node slot was enabled or disabled.
    TrackEnabled {
        /// Slot (or output) name.
        slot: String,

        /// Track which state changed.
        track: Track,

        /// New enabled state.
        enabled: bool,
    },

    /// Substitution model of a [`VirtualBackground`] failed to load.
    LoadFailed,
}

/// Outcome of setting an input slot.
#[derive(Clone, Debug, PartialEq)]
pub enum InputChange {
    /// Same track with the same enabled state.
    Unchanged,

    /// Same track, but its enabled state changed.
    EnabledChanged(Track, bool),

    /// Track was replaced, added or removed.
    Replaced {
        /// New track.
        new: Option<Track>,

        /// Previous track.
        old: Option<Track>,
    },
}

/// Content of an input slot.
#[derive(Debug, Default)]
struct Slot {
    /// Current track.
    track: Option<Track>,

    /// Enabled state of the track when it was last seen by the slot.
    enabled: bool,
}

/// Named input slots of a node.
#[derive(Debug, Default)]
pub struct InputSlots(RefCell<HashMap<String, Slot>>);

impl InputSlots {
    /// Creates new [`InputSlots`] with the provided empty slots.
    pub fn new(names: &[&str]) -> Self {
        Self(RefCell::new(
            names
                .iter()
                .map(|name| ((*name).to_owned(), Slot::default()))
                .collect(),
        ))
    }

    /// Returns the current track of the provided slot.
    pub fn track(&self, slot: &str) -> Option<Track> {
        self.0.borrow().get(slot).and_then(|s| s.track.clone())
    }

    /// Returns the current tracks of all the slots.
    pub fn tracks(&self) -> Vec<Track> {
        self.0.borrow().values().filter_map(|s| s.track.clone()).collect()
    }

    /// Sets the track of the provided slot, describing what has changed.
    ///
    /// Unknown slots are reported and left untouched.
    pub fn set(&self, slot: &str, track: Option<Track>) -> InputChange {
        let mut slots = self.0.borrow_mut();
        let state = if let Some(state) = slots.get_mut(slot) {
            state
        } else {
            error!("Cannot set track of unknown input slot '{}'", slot);
            return InputChange::Unchanged;
        };

        match (&state.track, &track) {
            (None, None) => return InputChange::Unchanged,
            (Some(current), Some(new)) if current == new => {
                let enabled = new.enabled();
                if enabled == state.enabled {
                    return InputChange::Unchanged;
                }
                state.enabled = enabled;
                return InputChange::EnabledChanged(new.clone(), enabled);
            }
            _ => (),
        }

        state.enabled = track.as_ref().map_or(false, Track::enabled);
        let old = mem::replace(&mut state.track, track.clone());
        InputChange::Replaced { new: track, old }
    }

    /// Updates the enabled state of the provided slot track.
    ///
    /// Returns the track if the state has changed.
    pub fn set_enabled(&self, slot: &str, enabled: bool) -> Option<Track> {
        let mut slots = self.0.borrow_mut();
        let state = slots.get_mut(slot)?;
        let track = state.track.clone()?;
        if state.enabled == enabled {
            return None;
        }
        state.enabled = enabled;
        Some(track)
    }
}

/// Output of a node.
#[derive(Default)]
struct Output {
    /// Current track of the output.
    track: Option<Track>,

    /// Connected `(node, slot)` pairs.
    sinks: Vec<(Rc<dyn TrackSink>, String)>,
}

/// Named outputs of a node together with the events of the node.
pub struct OutputSinks {
    /// Outputs by their names.
    outputs: RefCell<HashMap<String, Output>>,

    /// Events of the node.
    events: EventEmitter<TrackEvent>,
}

impl fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outputs = self.outputs.borrow();
        let mut names: Vec<_> = outputs.keys().collect();
        names.sort();
        f.debug_struct("OutputSinks").field("outputs", &names).finish()
    }
}

impl OutputSinks {
    /// Creates new [`OutputSinks`] with the provided unconnected outputs.
    pub fn new(names: &[&str]) -> Self {
        Self {
            outputs: RefCell::new(
                names
                    .iter()
                    .map(|name| ((*name).to_owned(), Output::default()))
                    .collect(),
            ),
            events: EventEmitter::new(),
        }
    }

    /// Returns the current track of the provided output.
    pub fn track(&self, output: &str) -> Option<Track> {
        self.outputs.borrow().get(output).and_then(|o| o.track.clone())
    }

    /// Connects the provided output to the provided `(sink, slot)` pair.
    ///
    /// The sink immediately receives the current output track.
    pub fn connect(&self, output: &str, sink: Rc<dyn TrackSink>, slot: &str) {
        let current = {
            let mut outputs = self.outputs.borrow_mut();
            let out = if let Some(out) = outputs.get_mut(output) {
                out
            } else {
                error!("Cannot connect unknown output '{}'", output);
                return;
            };
            out.sinks.push((Rc::clone(&sink), slot.to_owned()));
            out.track.clone()
        };
        if current.is_some() {
            sink.set_input_track(slot, current);
        }
    }

    /// Disconnects every sink of the provided output, emptying their slots.
    pub fn disconnect_all(&self, output: &str) {
        let sinks = self
            .outputs
            .borrow_mut()
            .get_mut(output)
            .map(|o| mem::take(&mut o.sinks))
            .unwrap_or_default();
        for (sink, slot) in sinks {
            sink.set_input_track(&slot, None);
        }
    }

    /// Sets the track of the provided output and pushes it to the connected
    /// sinks.
    pub fn set_track(&self, output: &str, track: Option<Track>) {
        let (old, sinks) = {
            let mut outputs = self.outputs.borrow_mut();
            let out = if let Some(out) = outputs.get_mut(output) {
                out
            } else {
                error!("Cannot set track of unknown output '{}'", output);
                return;
            };
            let unchanged = match (&out.track, &track) {
                (Some(current), Some(new)) => current == new,
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return;
            }
            let old = mem::replace(&mut out.track, track.clone());
            (old, out.sinks.clone())
        };

        self.events.emit(TrackEvent::TrackReplaced {
            slot: output.to_owned(),
            new: track.clone(),
            old,
        });
        for (sink, slot) in sinks {
            sink.set_input_track(&slot, track.clone());
        }
    }

    /// Pushes the enabled state of the provided output track to the
    /// connected sinks.
    pub fn set_track_enabled(&self, output: &str, enabled: bool) {
        let (track, sinks) = {
            let outputs = self.outputs.borrow();
            match outputs.get(output) {
                Some(Output {
                    track: Some(track),
                    sinks,
                }) => (track.clone(), sinks.clone()),
                _ => return,
            }
        };

        self.events.emit(TrackEvent::TrackEnabled {
            slot: output.to_owned(),
            track,
            enabled,
        });
        for (sink, slot) in sinks {
            sink.set_input_track_enabled(&slot, enabled);
        }
    }

    /// Returns [`EventEmitter`] of the node owning these [`OutputSinks`].
    #[inline]
    pub fn events(&self) -> &EventEmitter<TrackEvent> {
        &self.events
    }

    /// Subscribes to the [`TrackEvent`]s of the node.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, TrackEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::RefCell, rc::Rc};

    use crate::media::{MediaKind, Track};

    use super::{InputChange, InputSlots, OutputSinks, TrackSink};

    /// Records every call it receives.
    #[derive(Default)]
    struct RecordingSink(RefCell<Vec<(String, Option<Track>, Option<bool>)>>);

    impl TrackSink for RecordingSink {
        fn set_input_track(&self, slot: &str, track: Option<Track>) {
            self.0.borrow_mut().push((slot.to_owned(), track, None));
        }

        fn set_input_track_enabled(&self, slot: &str, enabled: bool) {
            self.0.borrow_mut().push((slot.to_owned(), None, Some(enabled)));
        }
    }

    #[test]
    fn same_track_twice_is_unchanged() {
        let slots = InputSlots::new(&["audio"]);
        let track = Track::new("a", MediaKind::Audio);

        assert!(matches!(
            slots.set("audio", Some(track.clone())),
            InputChange::Replaced { old: None, .. }
        ));
        assert_eq!(slots.set("audio", Some(track)), InputChange::Unchanged);
    }

    #[test]
    fn same_track_with_other_enabled_state() {
        let slots = InputSlots::new(&["audio"]);
        let track = Track::new("a", MediaKind::Audio);
        slots.set("audio", Some(track.clone()));

        track.set_enabled(false);

        assert_eq!(
            slots.set("audio", Some(track.clone())),
            InputChange::EnabledChanged(track.clone(), false),
        );
        assert_eq!(slots.set_enabled("audio", false), None);
        assert_eq!(slots.set_enabled("audio", true), Some(track));
    }

    #[test]
    fn unknown_slot_is_ignored() {
        let slots = InputSlots::new(&["audio"]);
        let track = Track::new("v", MediaKind::Video);

        assert_eq!(slots.set("video", Some(track)), InputChange::Unchanged);
        assert!(slots.tracks().is_empty());
    }

    #[test]
    fn connecting_feeds_current_track() {
        let outputs = OutputSinks::new(&["default"]);
        let track = Track::new("a", MediaKind::Audio);
        outputs.set_track("default", Some(track.clone()));

        let sink = Rc::new(RecordingSink::default());
        outputs.connect("default", sink.clone(), "input");

        assert_eq!(
            *sink.0.borrow(),
            vec![("input".to_owned(), Some(track), None)],
        );
    }

    #[test]
    fn propagates_changes_to_every_sink() {
        let outputs = OutputSinks::new(&["default"]);
        let first = Rc::new(RecordingSink::default());
        let second = Rc::new(RecordingSink::default());
        outputs.connect("default", first.clone(), "one");
        outputs.connect("default", second.clone(), "two");

        let track = Track::new("a", MediaKind::Audio);
        outputs.set_track("default", Some(track.clone()));
        outputs.set_track_enabled("default", false);
        outputs.disconnect_all("default");

        assert_eq!(
            *second.0.borrow(),
            vec![
                ("two".to_owned(), Some(track), None),
                ("two".to_owned(), None, Some(false)),
                ("two".to_owned(), None, None),
            ],
        );
        assert_eq!(first.0.borrow().len(), 3);
    }
}
