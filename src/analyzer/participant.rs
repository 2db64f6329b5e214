//! Quality analysis of the connections of a single participant.

use std::{
    collections::HashMap,
    rc::Rc,
    time::{Duration, Instant},
};

use derive_more::Display;
use futures::stream::LocalBoxStream;

use crate::{
    conf,
    log::prelude::*,
    media::MediaKind,
    platform::{RtcOutboundStats, RtcPeerConnection},
    utils::{Clock, EventEmitter},
};

use super::{
    average::{AverageStatValue, StatValueKind},
    quality::{ConnectionQuality, Metrics},
};

/// Kind of the media which sending quality is analyzed.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AnalyzedKind {
    /// Device audio.
    #[display(fmt = "audio")]
    Audio,

    /// Device video.
    #[display(fmt = "video")]
    Video,

    /// Shared screen.
    #[display(fmt = "screen")]
    Screen,
}

impl AnalyzedKind {
    /// All the [`AnalyzedKind`]s.
    pub const ALL: [Self; 3] = [Self::Audio, Self::Video, Self::Screen];

    /// Returns [`MediaKind`] of the track this [`AnalyzedKind`] is sent with.
    #[inline]
    pub fn media_kind(self) -> MediaKind {
        match self {
            Self::Audio => MediaKind::Audio,
            Self::Video | Self::Screen => MediaKind::Video,
        }
    }
}

/// Events of a [`ParticipantAnalyzer`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParticipantAnalyzerEvent {
    /// Sending quality of some media changed.
    SenderConnectionQualityChanged {
        /// Media which quality changed.
        kind: AnalyzedKind,

        /// New quality, [`None`] if unknown.
        quality: Option<ConnectionQuality>,
    },
}

/// Averaged statistics of one sent media.
#[derive(Debug)]
struct SenderStats {
    packets_sent: AverageStatValue,
    packets_lost: AverageStatValue,
    jitter: AverageStatValue,
    round_trip_time: AverageStatValue,
    quality: Option<ConnectionQuality>,
}

impl SenderStats {
    fn new(conf: &conf::Quality) -> Self {
        let avg = |kind| {
            AverageStatValue::new(conf.window, kind, conf.last_value_weight)
        };
        Self {
            packets_sent: avg(StatValueKind::Cumulative),
            packets_lost: avg(StatValueKind::Cumulative),
            jitter: avg(StatValueKind::Instantaneous),
            round_trip_time: avg(StatValueKind::Instantaneous),
            quality: None,
        }
    }

    fn reset(&mut self) {
        self.packets_sent.reset();
        self.packets_lost.reset();
        self.jitter.reset();
        self.round_trip_time.reset();
    }

    /// Adds a statistics sample returning the [`Metrics`] once enough
    /// samples were collected.
    #[allow(clippy::cast_precision_loss)]
    fn add(&mut self, stats: &RtcOutboundStats) -> Option<Metrics> {
        let restarted = self
            .packets_sent
            .last_raw_value()
            .map_or(false, |last| (stats.packets_sent as f64) < last);
        if restarted {
            self.reset();
        }

        self.packets_sent.add(stats.packets_sent as f64);
        self.packets_lost.add(stats.packets_lost as f64);
        if let Some(jitter) = stats.jitter {
            self.jitter.add(jitter);
        }
        if let Some(rtt) = stats.round_trip_time {
            self.round_trip_time.add(rtt);
        }

        if !self.packets_sent.has_enough_data()
            || !self.packets_lost.has_enough_data()
        {
            return None;
        }
        let packets = self.packets_sent.weighted_average()?;
        let lost = self.packets_lost.weighted_average()?;
        let packet_loss = if packets > 0.0 {
            (lost / packets).max(0.0)
        } else {
            0.0
        };
        Some(Metrics {
            packets,
            packet_loss,
            jitter: duration_average(&self.jitter),
            round_trip_time: duration_average(&self.round_trip_time),
        })
    }
}

/// Returns the average of the provided seconds values once it can be
/// trusted.
fn duration_average(avg: &AverageStatValue) -> Option<Duration> {
    if !avg.has_enough_data() {
        return None;
    }
    avg.weighted_average()
        .map(|secs| Duration::from_secs_f64(secs.max(0.0)))
}

/// Analyzer of the quality of the media sent by a participant.
///
/// Statistics of the sending connections are sampled every
/// [`conf::Quality::sampling_interval`] once [`ParticipantAnalyzer::poll`]
/// is called past the [`ParticipantAnalyzer::next_deadline`].
pub struct ParticipantAnalyzer {
    conf: conf::Quality,
    clock: Rc<dyn Clock>,

    /// Connection sending the device audio and video.
    connection: Option<Rc<dyn RtcPeerConnection>>,

    /// Connection sending the screen.
    screen_connection: Option<Rc<dyn RtcPeerConnection>>,

    stats: HashMap<AnalyzedKind, SenderStats>,

    /// Moment of the next statistics sampling.
    next_sample: Option<Instant>,

    events: EventEmitter<ParticipantAnalyzerEvent>,
}

impl_debug_by_struct_name!(ParticipantAnalyzer);

impl ParticipantAnalyzer {
    /// Creates new [`ParticipantAnalyzer`] without connections.
    pub fn new(conf: conf::Quality, clock: Rc<dyn Clock>) -> Self {
        let stats = AnalyzedKind::ALL
            .iter()
            .map(|kind| (*kind, SenderStats::new(&conf)))
            .collect();
        Self {
            conf,
            clock,
            connection: None,
            screen_connection: None,
            stats,
            next_sample: None,
            events: EventEmitter::new(),
        }
    }

    /// Returns [`EventEmitter`] of this [`ParticipantAnalyzer`].
    #[inline]
    pub fn events(&self) -> &EventEmitter<ParticipantAnalyzerEvent> {
        &self.events
    }

    /// Subscribes to the [`ParticipantAnalyzerEvent`]s.
    #[inline]
    pub fn subscribe(
        &self,
    ) -> LocalBoxStream<'static, ParticipantAnalyzerEvent> {
        self.events.subscribe()
    }

    /// Sets the connection sending the device audio and video.
    pub fn set_sender_connection(
        &mut self,
        conn: Option<Rc<dyn RtcPeerConnection>>,
    ) {
        self.connection = conn;
        self.reset(AnalyzedKind::Audio);
        self.reset(AnalyzedKind::Video);
        self.reschedule();
    }

    /// Sets the connection sending the screen.
    pub fn set_sender_screen_connection(
        &mut self,
        conn: Option<Rc<dyn RtcPeerConnection>>,
    ) {
        self.screen_connection = conn;
        self.reset(AnalyzedKind::Screen);
        self.reschedule();
    }

    /// Returns the current sending quality of the provided media.
    pub fn sender_connection_quality(
        &self,
        kind: AnalyzedKind,
    ) -> Option<ConnectionQuality> {
        self.stats.get(&kind).and_then(|s| s.quality)
    }

    /// Returns the moment of the next statistics sampling.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_sample
    }

    /// Samples the statistics if the sampling interval passed.
    pub fn poll(&mut self) {
        match self.next_sample {
            Some(at) if at <= self.clock.now() => {
                self.next_sample =
                    Some(self.clock.now() + self.conf.sampling_interval);
                self.sample();
            }
            _ => (),
        }
    }

    /// Samples the statistics of every connection right away.
    pub fn sample(&mut self) {
        for kind in &AnalyzedKind::ALL {
            let conn = match kind {
                AnalyzedKind::Screen => self.screen_connection.as_ref(),
                _ => self.connection.as_ref(),
            };
            let stats = match conn {
                Some(conn) => conn.get_stats(),
                None => continue,
            };
            match stats.outbound(kind.media_kind()) {
                Some(outbound) => self.add_sample(*kind, outbound),
                None => self.reset(*kind),
            }
        }
    }

    fn add_sample(&mut self, kind: AnalyzedKind, outbound: &RtcOutboundStats) {
        let conf = &self.conf;
        let quality = match self.stats.get_mut(&kind) {
            Some(stats) => match stats.add(outbound) {
                Some(metrics) => metrics.classify(conf),
                None => return,
            },
            None => return,
        };
        self.set_quality(kind, Some(quality));
    }

    fn reset(&mut self, kind: AnalyzedKind) {
        if let Some(stats) = self.stats.get_mut(&kind) {
            stats.reset();
        }
        self.set_quality(kind, None);
    }

    fn set_quality(
        &mut self,
        kind: AnalyzedKind,
        quality: Option<ConnectionQuality>,
    ) {
        let changed = match self.stats.get_mut(&kind) {
            Some(stats) if stats.quality != quality => {
                stats.quality = quality;
                true
            }
            _ => false,
        };
        if changed {
            debug!(
                "Sender connection quality of {} changed to {:?}",
                kind, quality,
            );
            self.events.emit(
                ParticipantAnalyzerEvent::SenderConnectionQualityChanged {
                    kind,
                    quality,
                },
            );
        }
    }

    fn reschedule(&mut self) {
        self.next_sample =
            if self.connection.is_some() || self.screen_connection.is_some() {
                Some(self.clock.now() + self.conf.sampling_interval)
            } else {
                None
            };
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use futures::{executor, StreamExt as _};
    use serde_json::Value;

    use crate::{
        conf,
        media::MediaKind,
        platform::{
            IceConnectionState, PeerConnectionState, RtcOutboundStats,
            RtcPeerConnection, RtcStats, SdpType, SignalingState,
        },
        signalling::Message,
        utils::ManualClock,
    };

    use super::{
        super::ConnectionQuality, AnalyzedKind, ParticipantAnalyzer,
        ParticipantAnalyzerEvent,
    };

    /// Connection reporting the statistics pushed into it.
    #[derive(Default)]
    struct Stats(RefCell<RtcStats>);

    impl Stats {
        fn send_audio(&self, sent: u64, lost: u64, rtt: f64) {
            self.0.borrow_mut().outbound = vec![RtcOutboundStats {
                kind: MediaKind::Audio,
                packets_sent: sent,
                packets_lost: lost,
                jitter: Some(0.005),
                round_trip_time: Some(rtt),
            }];
        }
    }

    impl RtcPeerConnection for Stats {
        fn sid(&self) -> String {
            String::new()
        }
        fn start(&self) {}
        fn handle_message(&self, _: &Message) {}
        fn ice_restart(&self) {}
        fn end(&self) {}
        fn ice_connection_state(&self) -> IceConnectionState {
            IceConnectionState::Connected
        }
        fn connection_state(&self) -> PeerConnectionState {
            PeerConnectionState::Connected
        }
        fn signaling_state(&self) -> SignalingState {
            SignalingState::Stable
        }
        fn local_description_type(&self) -> Option<SdpType> {
            Some(SdpType::Offer)
        }
        fn sending_kinds(&self) -> Vec<MediaKind> {
            vec![MediaKind::Audio]
        }
        fn send_directly(&self, _: &str, _: &str, _: Value) {}
        fn get_stats(&self) -> RtcStats {
            self.0.borrow().clone()
        }
    }

    fn analyzer() -> (ParticipantAnalyzer, Rc<Stats>, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new());
        let conn = Rc::new(Stats::default());
        let mut analyzer =
            ParticipantAnalyzer::new(conf::Quality::default(), clock.clone());
        analyzer.set_sender_connection(Some(conn.clone()));
        (analyzer, conn, clock)
    }

    #[test]
    fn classifies_once_window_is_full() {
        let (mut analyzer, conn, _) = analyzer();

        for i in 0..4 {
            conn.send_audio(i * 50, 0, 0.05);
            analyzer.sample();
            assert_eq!(
                analyzer.sender_connection_quality(AnalyzedKind::Audio),
                None,
            );
        }
        conn.send_audio(200, 0, 0.05);
        analyzer.sample();

        assert_eq!(
            analyzer.sender_connection_quality(AnalyzedKind::Audio),
            Some(ConnectionQuality::Good),
        );
        assert_eq!(
            analyzer.sender_connection_quality(AnalyzedKind::Video),
            None,
        );
    }

    #[test]
    fn emits_quality_changes() {
        let (mut analyzer, conn, _) = analyzer();
        let mut events = analyzer.subscribe();

        for i in 0..5 {
            conn.send_audio(i * 50, i * 25, 0.05);
            analyzer.sample();
        }

        assert_eq!(
            executor::block_on(events.next()),
            Some(ParticipantAnalyzerEvent::SenderConnectionQualityChanged {
                kind: AnalyzedKind::Audio,
                quality: Some(ConnectionQuality::VeryBad),
            }),
        );
    }

    #[test]
    fn nothing_sent_is_reported() {
        let (mut analyzer, conn, _) = analyzer();

        for _ in 0..5 {
            conn.send_audio(10, 0, 0.05);
            analyzer.sample();
        }

        assert_eq!(
            analyzer.sender_connection_quality(AnalyzedKind::Audio),
            Some(ConnectionQuality::NoTransmittedData),
        );
    }

    #[test]
    fn samples_on_interval() {
        let (mut analyzer, conn, clock) = analyzer();
        conn.send_audio(0, 0, 0.05);
        let first = analyzer.next_deadline().unwrap();

        analyzer.poll();
        assert_eq!(analyzer.next_deadline(), Some(first));

        clock.advance(Duration::from_secs(1));
        analyzer.poll();
        assert_eq!(
            analyzer.next_deadline(),
            Some(first + Duration::from_secs(1)),
        );

        analyzer.set_sender_connection(None);
        assert_eq!(analyzer.next_deadline(), None);
    }
}
