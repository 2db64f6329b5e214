//! Terminal node aggregating tracks into a stream.

use std::cell::RefCell;

use futures::stream::LocalBoxStream;

use crate::{
    media::{MediaStream, Track},
    utils::EventEmitter,
};

use super::{InputChange, InputSlots, TrackEvent, TrackSink};

/// Terminal node exposing the tracks of its input slots as a single
/// [`MediaStream`].
///
/// The stream exists only while at least one slot holds a track. Once every
/// slot is emptied the stream is dropped, and the next track gets a new
/// stream, so consumers must not rely on the stream identity across empty
/// periods.
#[derive(Debug)]
pub struct TrackToStream {
    /// Input slots.
    inputs: InputSlots,

    /// Current output stream.
    stream: RefCell<Option<MediaStream>>,

    /// Events of this node.
    events: EventEmitter<TrackEvent>,
}

impl TrackToStream {
    /// Creates new [`TrackToStream`] with the provided input slots.
    pub fn new(slots: &[&str]) -> Self {
        Self {
            inputs: InputSlots::new(slots),
            stream: RefCell::new(None),
            events: EventEmitter::new(),
        }
    }

    /// Returns the current output [`MediaStream`].
    pub fn stream(&self) -> Option<MediaStream> {
        self.stream.borrow().clone()
    }

    /// Returns the current track of the provided slot.
    pub fn input_track(&self, slot: &str) -> Option<Track> {
        self.inputs.track(slot)
    }

    /// Returns [`EventEmitter`] of this node.
    #[inline]
    pub fn events(&self) -> &EventEmitter<TrackEvent> {
        &self.events
    }

    /// Subscribes to the [`TrackEvent`]s of this node.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, TrackEvent> {
        self.events.subscribe()
    }

    /// Moves the output stream from the `old` track to the `new` one.
    ///
    /// Returns `(new, old)` streams if the stream itself was replaced.
    fn replace_in_stream(
        &self,
        new: Option<&Track>,
        old: Option<&Track>,
    ) -> Option<(Option<MediaStream>, Option<MediaStream>)> {
        let mut stream = self.stream.borrow_mut();
        let previous = stream.clone();

        if let (Some(current), Some(old)) = (stream.as_ref(), old) {
            current.remove_track(old);
        }
        if let Some(new) = new {
            stream.get_or_insert_with(MediaStream::new).add_track(new.clone());
        }
        if stream.as_ref().map_or(false, MediaStream::is_empty) {
            *stream = None;
        }

        let replaced = match (&previous, &*stream) {
            (Some(prev), Some(cur)) => prev != cur,
            (None, None) => false,
            _ => true,
        };
        if replaced {
            Some((stream.clone(), previous))
        } else {
            None
        }
    }
}

impl TrackSink for TrackToStream {
    fn set_input_track(&self, slot: &str, track: Option<Track>) {
        match self.inputs.set(slot, track) {
            InputChange::Unchanged => (),
            InputChange::EnabledChanged(track, enabled) => {
                self.events.emit(TrackEvent::TrackEnabled {
                    slot: slot.to_owned(),
                    track,
                    enabled,
                });
            }
            InputChange::Replaced { new, old } => {
                if let Some((new, old)) =
                    self.replace_in_stream(new.as_ref(), old.as_ref())
                {
                    self.events.emit(TrackEvent::StreamSet { new, old });
                }
                self.events.emit(TrackEvent::TrackReplaced {
                    slot: slot.to_owned(),
                    new,
                    old,
                });
            }
        }
    }

    fn set_input_track_enabled(&self, slot: &str, enabled: bool) {
        if let Some(track) = self.inputs.set_enabled(slot, enabled) {
            self.events.emit(TrackEvent::TrackEnabled {
                slot: slot.to_owned(),
                track,
                enabled,
            });
        }
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::RefCell, rc::Rc};

    use crate::media::{pipeline::TrackEvent, MediaKind, Track};

    use super::{TrackSink as _, TrackToStream};

    fn sink() -> (TrackToStream, Rc<RefCell<Vec<TrackEvent>>>) {
        let sink = TrackToStream::new(&["audio", "video"]);
        let events = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&events);
        sink.events().on(move |e| recorded.borrow_mut().push(e.clone()));
        (sink, events)
    }

    #[test]
    fn first_track_creates_stream() {
        let (sink, events) = sink();
        let audio = Track::new("a", MediaKind::Audio);

        sink.set_input_track("audio", Some(audio.clone()));

        let stream = sink.stream().unwrap();
        assert_eq!(stream.tracks(), vec![audio.clone()]);
        assert_eq!(
            *events.borrow(),
            vec![
                TrackEvent::StreamSet {
                    new: Some(stream),
                    old: None,
                },
                TrackEvent::TrackReplaced {
                    slot: "audio".to_owned(),
                    new: Some(audio),
                    old: None,
                },
            ],
        );
    }

    #[test]
    fn second_track_joins_same_stream() {
        let (sink, events) = sink();
        let audio = Track::new("a", MediaKind::Audio);
        let video = Track::new("v", MediaKind::Video);

        sink.set_input_track("audio", Some(audio));
        let stream = sink.stream().unwrap();
        events.borrow_mut().clear();
        sink.set_input_track("video", Some(video.clone()));

        assert_eq!(sink.stream(), Some(stream.clone()));
        assert_eq!(stream.tracks().len(), 2);
        assert_eq!(
            *events.borrow(),
            vec![TrackEvent::TrackReplaced {
                slot: "video".to_owned(),
                new: Some(video),
                old: None,
            }],
        );
    }

    #[test]
    fn same_track_twice_fires_nothing() {
        let (sink, events) = sink();
        let audio = Track::new("a", MediaKind::Audio);
        sink.set_input_track("audio", Some(audio.clone()));
        events.borrow_mut().clear();

        sink.set_input_track("audio", Some(audio));

        assert!(events.borrow().is_empty());
    }

    #[test]
    fn same_track_with_other_enabled_state_fires_enabled_only() {
        let (sink, events) = sink();
        let audio = Track::new("a", MediaKind::Audio);
        sink.set_input_track("audio", Some(audio.clone()));
        let stream = sink.stream();
        events.borrow_mut().clear();

        audio.set_enabled(false);
        sink.set_input_track("audio", Some(audio.clone()));

        assert_eq!(sink.stream(), stream);
        assert_eq!(
            *events.borrow(),
            vec![TrackEvent::TrackEnabled {
                slot: "audio".to_owned(),
                track: audio,
                enabled: false,
            }],
        );
    }

    #[test]
    fn replacing_track_keeps_stream() {
        let (sink, events) = sink();
        let first = Track::new("a1", MediaKind::Audio);
        let second = Track::new("a2", MediaKind::Audio);
        sink.set_input_track("audio", Some(first.clone()));
        let stream = sink.stream().unwrap();
        events.borrow_mut().clear();

        sink.set_input_track("audio", Some(second.clone()));

        assert_eq!(sink.stream(), Some(stream.clone()));
        assert_eq!(stream.tracks(), vec![second.clone()]);
        assert_eq!(
            *events.borrow(),
            vec![TrackEvent::TrackReplaced {
                slot: "audio".to_owned(),
                new: Some(second),
                old: Some(first),
            }],
        );
    }

    #[test]
    fn removing_last_track_drops_stream_once() {
        let (sink, events) = sink();
        let audio = Track::new("a", MediaKind::Audio);
        let video = Track::new("v", MediaKind::Video);
        sink.set_input_track("audio", Some(audio.clone()));
        sink.set_input_track("video", Some(video));
        let stream = sink.stream().unwrap();
        events.borrow_mut().clear();

        sink.set_input_track("video", None);
        sink.set_input_track("audio", None);
        sink.set_input_track("audio", None);

        assert_eq!(sink.stream(), None);
        let stream_sets: Vec<_> = events
            .borrow()
            .iter()
            .filter(|e| matches!(e, TrackEvent::StreamSet { .. }))
            .cloned()
            .collect();
        assert_eq!(
            stream_sets,
            vec![TrackEvent::StreamSet {
                new: None,
                old: Some(stream),
            }],
        );
    }

    #[test]
    fn readding_after_removal_creates_new_stream() {
        let (sink, _) = sink();
        let audio = Track::new("a", MediaKind::Audio);
        sink.set_input_track("audio", Some(audio.clone()));
        let first = sink.stream().unwrap();
        sink.set_input_track("audio", None);

        sink.set_input_track("audio", Some(audio.clone()));

        let second = sink.stream().unwrap();
        assert_ne!(first, second);
        assert_eq!(second.tracks(), vec![audio]);
    }
}
