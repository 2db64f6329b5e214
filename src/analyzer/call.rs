//! Quality analysis of a whole call.

use std::{cell::RefCell, collections::HashMap, rc::Rc, time::Instant};

use futures::stream::LocalBoxStream;

use crate::utils::EventEmitter;

use super::{
    participant::{AnalyzedKind, ParticipantAnalyzer, ParticipantAnalyzerEvent},
    quality::ConnectionQuality,
};

/// Events of a [`CallAnalyzer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallAnalyzerEvent {
    /// Sending quality of the local media changed.
    SenderConnectionQualityChanged {
        /// Media which quality changed.
        kind: AnalyzedKind,

        /// New quality, [`None`] if unknown.
        quality: Option<ConnectionQuality>,
    },
}

/// Published qualities and their subscribers.
#[derive(Debug, Default)]
struct State {
    qualities: RefCell<HashMap<AnalyzedKind, Option<ConnectionQuality>>>,
    events: EventEmitter<CallAnalyzerEvent>,
}

/// Analyzer republishing the sending quality of the local participant.
#[derive(Debug)]
pub struct CallAnalyzer {
    /// Analyzer of the local participant, if it participates with media.
    local: Option<ParticipantAnalyzer>,

    state: Rc<State>,
}

impl CallAnalyzer {
    /// Creates new [`CallAnalyzer`] republishing the changes of the provided
    /// local [`ParticipantAnalyzer`].
    pub fn new(local: Option<ParticipantAnalyzer>) -> Self {
        let state = Rc::new(State::default());
        if let Some(local) = &local {
            let weak = Rc::downgrade(&state);
            local.events().on(move |event| {
                let state = match weak.upgrade() {
                    Some(state) => state,
                    None => return,
                };
                let ParticipantAnalyzerEvent::SenderConnectionQualityChanged {
                    kind,
                    quality,
                } = *event;
                let _ = state.qualities.borrow_mut().insert(kind, quality);
                state.events.emit(
                    CallAnalyzerEvent::SenderConnectionQualityChanged {
                        kind,
                        quality,
                    },
                );
            });
        }
        Self { local, state }
    }

    /// Returns the last published sending quality of the provided media.
    pub fn get(&self, kind: AnalyzedKind) -> Option<ConnectionQuality> {
        self.state.qualities.borrow().get(&kind).copied().flatten()
    }

    /// Returns the analyzer of the local participant.
    #[inline]
    pub fn local_mut(&mut self) -> Option<&mut ParticipantAnalyzer> {
        self.local.as_mut()
    }

    /// Returns [`EventEmitter`] of this [`CallAnalyzer`].
    #[inline]
    pub fn events(&self) -> &EventEmitter<CallAnalyzerEvent> {
        &self.state.events
    }

    /// Subscribes to the [`CallAnalyzerEvent`]s.
    #[inline]
    pub fn subscribe(&self) -> LocalBoxStream<'static, CallAnalyzerEvent> {
        self.state.events.subscribe()
    }

    /// Returns the moment the [`CallAnalyzer`] should be polled at.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.local.as_ref().and_then(ParticipantAnalyzer::next_deadline)
    }

    /// Drives the analysis.
    pub fn poll(&mut self) {
        if let Some(local) = &mut self.local {
            local.poll();
        }
    }
}

#[cfg(test)]
mod spec {
    use std::rc::Rc;

    use futures::{executor, StreamExt as _};

    use crate::{
        analyzer::{
            AnalyzedKind, ConnectionQuality, ParticipantAnalyzer,
            ParticipantAnalyzerEvent,
        },
        conf,
        utils::ManualClock,
    };

    use super::{CallAnalyzer, CallAnalyzerEvent};

    #[test]
    fn without_local_participant_nothing_is_known() {
        let mut analyzer = CallAnalyzer::new(None);
        analyzer.poll();

        assert_eq!(analyzer.get(AnalyzedKind::Audio), None);
        assert_eq!(analyzer.next_deadline(), None);
        assert!(analyzer.local_mut().is_none());
    }

    #[test]
    fn stream_ends_with_analyzer() {
        let clock = Rc::new(ManualClock::new());
        let local =
            ParticipantAnalyzer::new(conf::Quality::default(), clock);
        let analyzer = CallAnalyzer::new(Some(local));
        let events = analyzer.subscribe();

        assert_eq!(analyzer.next_deadline(), None);
        drop(analyzer);

        assert_eq!(executor::block_on(events.collect::<Vec<_>>()), vec![]);
    }

    #[test]
    fn republishes_local_quality() {
        let clock = Rc::new(ManualClock::new());
        let local =
            ParticipantAnalyzer::new(conf::Quality::default(), clock);
        let analyzer = CallAnalyzer::new(Some(local));
        let mut events = analyzer.subscribe();

        let local = analyzer.local.as_ref().unwrap();
        local.events().emit(
            ParticipantAnalyzerEvent::SenderConnectionQualityChanged {
                kind: AnalyzedKind::Video,
                quality: Some(ConnectionQuality::Bad),
            },
        );
        local.events().emit(
            ParticipantAnalyzerEvent::SenderConnectionQualityChanged {
                kind: AnalyzedKind::Audio,
                quality: None,
            },
        );

        assert_eq!(
            analyzer.get(AnalyzedKind::Video),
            Some(ConnectionQuality::Bad),
        );
        assert_eq!(analyzer.get(AnalyzedKind::Audio), None);
        assert_eq!(
            executor::block_on(events.next()),
            Some(CallAnalyzerEvent::SenderConnectionQualityChanged {
                kind: AnalyzedKind::Video,
                quality: Some(ConnectionQuality::Bad),
            }),
        );
    }
}
