//! Detection of speech on an audio track.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use futures::stream::LocalBoxStream;

use crate::{media::Track, utils::EventEmitter};

use super::{InputChange, InputSlots, TrackSink, DEFAULT_SLOT};

/// Events of a [`SpeakingMonitor`].
#[derive(Clone, Debug, PartialEq)]
pub enum SpeakingEvent {
    /// Speech started on the enabled track.
    Speaking,

    /// Speech stopped on the enabled track.
    StoppedSpeaking,

    /// Speech started on the disabled track.
    SpeakingWhileMuted,

    /// Speech stopped on the disabled track.
    StoppedSpeakingWhileMuted,

    /// New volume sample was analyzed.
    VolumeChange {
        /// Volume of the sample, in dBFS.
        volume: f64,

        /// Threshold the volume is compared to, in dBFS.
        threshold: f64,
    },
}

/// Side-channel node detecting speech on the audio track it's connected to.
///
/// Doesn't produce tracks. Volume samples of the current track are provided by
/// the platform audio analyser through [`SpeakingMonitor::add_volume_sample`].
#[derive(Debug)]
pub struct SpeakingMonitor {
    /// Single input slot.
    inputs: InputSlots,

    /// Volume above which a sample is considered speech.
    threshold: f64,

    /// Whether each of the latest samples was above the threshold, oldest
    /// first.
    history: RefCell<VecDeque<bool>>,

    /// Whether speech is currently detected.
    speaking: Cell<bool>,

    /// Whether the current track is disabled.
    muted: Cell<bool>,

    /// Events of this node.
    events: EventEmitter<SpeakingEvent>,
}

impl SpeakingMonitor {
    /// Creates new [`SpeakingMonitor`] with the provided threshold (in dBFS)
    /// and count of the samples looked at.
    pub fn new(threshold: f64, history_len: usize) -> Self {
        Self {
            inputs: InputSlots::new(&[DEFAULT_SLOT]),
            threshold,
            history: RefCell::new(
                std::iter::repeat(false).take(history_len.max(3)).collect(),
            ),
            speaking: Cell::new(false),
            muted: Cell::new(false),
            events: EventEmitter::new(),
        }
    }

    /// Indicates whether speech is currently detected.
    #[inline]
    pub fn is_speaking(&self) -> bool {
        self.speaking.get()
    }

    /// Returns [`EventEmitter`] of this node.
    #[inline]
    pub fn events(&self) -> &EventEmitter<SpeakingEvent> {
        &self.events
    }

    /// Subscribes to the [`SpeakingEvent`]s of this node.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, SpeakingEvent> {
        self.events.subscribe()
    }

    /// Analyzes the provided volume sample of the current track.
    ///
    /// Speech starts when the sample and at least two of the three previous
    /// ones are above the threshold, and stops once the whole history is
    /// below it.
    pub fn add_volume_sample(&self, volume: f64) {
        if self.inputs.track(DEFAULT_SLOT).is_none() {
            return;
        }
        self.events.emit(SpeakingEvent::VolumeChange {
            volume,
            threshold: self.threshold,
        });

        let above = volume > self.threshold;
        let transition = {
            let mut history = self.history.borrow_mut();
            let transition = if above && !self.speaking.get() {
                history.iter().rev().take(3).filter(|s| **s).count() >= 2
            } else if !above && self.speaking.get() {
                history.iter().all(|s| !*s)
            } else {
                false
            };
            history.pop_front();
            history.push_back(above);
            transition
        };

        if transition {
            let speaking = !self.speaking.get();
            self.speaking.set(speaking);
            self.events.emit(self.speech_event(speaking, self.muted.get()));
        }
    }

    /// Returns the event describing the provided speech state.
    fn speech_event(&self, speaking: bool, muted: bool) -> SpeakingEvent {
        match (speaking, muted) {
            (true, false) => SpeakingEvent::Speaking,
            (false, false) => SpeakingEvent::StoppedSpeaking,
            (true, true) => SpeakingEvent::SpeakingWhileMuted,
            (false, true) => SpeakingEvent::StoppedSpeakingWhileMuted,
        }
    }

    /// Handles the mute state change of the current track.
    fn set_muted(&self, muted: bool) {
        if self.muted.replace(muted) == muted || !self.speaking.get() {
            return;
        }
        self.events.emit(self.speech_event(false, !muted));
        self.events.emit(self.speech_event(true, muted));
    }

    /// Forgets the speech detected on the previous track.
    fn reset(&self) {
        if self.speaking.replace(false) {
            self.events.emit(self.speech_event(false, self.muted.get()));
        }
        for sample in self.history.borrow_mut().iter_mut() {
            *sample = false;
        }
    }
}

impl TrackSink for SpeakingMonitor {
    fn set_input_track(&self, slot: &str, track: Option<Track>) {
        match self.inputs.set(slot, track) {
            InputChange::Replaced { new, .. } => {
                self.reset();
                self.muted.set(new.map_or(false, |t| !t.enabled()));
            }
            InputChange::EnabledChanged(_, enabled) => self.set_muted(!enabled),
            InputChange::Unchanged => (),
        }
    }

    fn set_input_track_enabled(&self, slot: &str, enabled: bool) {
        if self.inputs.set_enabled(slot, enabled).is_some() {
            self.set_muted(!enabled);
        }
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::RefCell, rc::Rc};

    use crate::media::{MediaKind, Track};

    use super::{SpeakingEvent, SpeakingMonitor, TrackSink as _, DEFAULT_SLOT};

    fn monitor() -> (SpeakingMonitor, Track, Rc<RefCell<Vec<SpeakingEvent>>>)
    {
        let monitor = SpeakingMonitor::new(-50.0, 10);
        let events = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&events);
        monitor.events().on(move |e| {
            if !matches!(e, SpeakingEvent::VolumeChange { .. }) {
                recorded.borrow_mut().push(e.clone());
            }
        });
        let track = Track::new("mic", MediaKind::Audio);
        monitor.set_input_track(DEFAULT_SLOT, Some(track.clone()));
        (monitor, track, events)
    }

    #[test]
    fn ignores_single_loud_sample() {
        let (monitor, _, events) = monitor();

        monitor.add_volume_sample(-10.0);
        monitor.add_volume_sample(-90.0);
        monitor.add_volume_sample(-10.0);

        assert!(!monitor.is_speaking());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn detects_speech_with_hysteresis() {
        let (monitor, _, events) = monitor();

        for _ in 0..3 {
            monitor.add_volume_sample(-10.0);
        }
        assert!(monitor.is_speaking());

        for _ in 0..10 {
            monitor.add_volume_sample(-90.0);
        }
        assert!(monitor.is_speaking());

        monitor.add_volume_sample(-90.0);
        assert!(!monitor.is_speaking());
        assert_eq!(
            *events.borrow(),
            vec![SpeakingEvent::Speaking, SpeakingEvent::StoppedSpeaking],
        );
    }

    #[test]
    fn reports_speaking_while_muted() {
        let (monitor, track, events) = monitor();
        for _ in 0..3 {
            monitor.add_volume_sample(-10.0);
        }

        track.set_enabled(false);
        monitor.set_input_track_enabled(DEFAULT_SLOT, false);
        track.set_enabled(true);
        monitor.set_input_track(DEFAULT_SLOT, Some(track));

        assert_eq!(
            *events.borrow(),
            vec![
                SpeakingEvent::Speaking,
                SpeakingEvent::StoppedSpeaking,
                SpeakingEvent::SpeakingWhileMuted,
                SpeakingEvent::StoppedSpeakingWhileMuted,
                SpeakingEvent::Speaking,
            ],
        );
    }

    #[test]
    fn stops_when_track_removed() {
        let (monitor, _, events) = monitor();
        for _ in 0..3 {
            monitor.add_volume_sample(-10.0);
        }

        monitor.set_input_track(DEFAULT_SLOT, None);
        monitor.add_volume_sample(-10.0);

        assert!(!monitor.is_speaking());
        assert_eq!(
            *events.borrow(),
            vec![SpeakingEvent::Speaking, SpeakingEvent::StoppedSpeaking],
        );
    }
}
