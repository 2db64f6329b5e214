//! Classification of a connection quality.

use std::time::Duration;

use derive_more::Display;

use crate::conf;

/// Estimated quality of a connection, from the worst to the best.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ConnectionQuality {
    /// Nothing is transmitted.
    #[display(fmt = "no-transmitted-data")]
    NoTransmittedData,

    /// Media is barely usable.
    #[display(fmt = "very-bad")]
    VeryBad,

    /// Media is noticeably degraded.
    #[display(fmt = "bad")]
    Bad,

    /// Media is slightly degraded.
    #[display(fmt = "medium")]
    Medium,

    /// Media is not degraded.
    #[display(fmt = "good")]
    Good,
}

/// Averaged metrics of a connection classified into a
/// [`ConnectionQuality`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Metrics {
    /// Average count of packets sent per sample.
    pub packets: f64,

    /// Ratio of the lost packets to the sent ones.
    pub packet_loss: f64,

    /// Average jitter, if known.
    pub jitter: Option<Duration>,

    /// Average round trip time, if known.
    pub round_trip_time: Option<Duration>,
}

impl Metrics {
    /// Classifies these [`Metrics`] with the provided thresholds.
    ///
    /// The resulting [`ConnectionQuality`] is the worst one among the
    /// metrics.
    pub fn classify(&self, conf: &conf::Quality) -> ConnectionQuality {
        #[allow(clippy::cast_precision_loss)]
        let min_packets = conf.min_packets_per_sample as f64;
        if self.packets < min_packets {
            return ConnectionQuality::NoTransmittedData;
        }

        let loss = &conf.packet_loss;
        let mut quality =
            level(self.packet_loss, loss.medium, loss.bad, loss.very_bad);
        if let Some(jitter) = self.jitter {
            let t = &conf.jitter;
            quality =
                quality.min(level_of(jitter, t.medium, t.bad, t.very_bad));
        }
        if let Some(rtt) = self.round_trip_time {
            let t = &conf.round_trip_time;
            quality = quality.min(level_of(rtt, t.medium, t.bad, t.very_bad));
        }
        quality
    }
}

/// Returns [`ConnectionQuality`] of a metric which grows as the quality
/// drops.
fn level(
    value: f64,
    medium: f64,
    bad: f64,
    very_bad: f64,
) -> ConnectionQuality {
    if value >= very_bad {
        ConnectionQuality::VeryBad
    } else if value >= bad {
        ConnectionQuality::Bad
    } else if value >= medium {
        ConnectionQuality::Medium
    } else {
        ConnectionQuality::Good
    }
}

/// [`level()`] of a [`Duration`] metric.
fn level_of(
    value: Duration,
    medium: Duration,
    bad: Duration,
    very_bad: Duration,
) -> ConnectionQuality {
    level(
        value.as_secs_f64(),
        medium.as_secs_f64(),
        bad.as_secs_f64(),
        very_bad.as_secs_f64(),
    )
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use crate::conf;

    use super::{ConnectionQuality, Metrics};

    fn metrics(packet_loss: f64, jitter_ms: u64, rtt_ms: u64) -> Metrics {
        Metrics {
            packets: 50.0,
            packet_loss,
            jitter: Some(Duration::from_millis(jitter_ms)),
            round_trip_time: Some(Duration::from_millis(rtt_ms)),
        }
    }

    #[test]
    fn worst_metric_wins() {
        let conf = conf::Quality::default();

        assert_eq!(
            metrics(0.0, 5, 50).classify(&conf),
            ConnectionQuality::Good,
        );
        assert_eq!(
            metrics(0.15, 5, 50).classify(&conf),
            ConnectionQuality::Medium,
        );
        assert_eq!(
            metrics(0.15, 60, 50).classify(&conf),
            ConnectionQuality::Bad,
        );
        assert_eq!(
            metrics(0.0, 5, 2000).classify(&conf),
            ConnectionQuality::VeryBad,
        );
    }

    #[test]
    fn unknown_metrics_are_ignored() {
        let conf = conf::Quality::default();
        let m = Metrics {
            packets: 50.0,
            packet_loss: 0.0,
            jitter: None,
            round_trip_time: None,
        };

        assert_eq!(m.classify(&conf), ConnectionQuality::Good);
    }

    #[test]
    fn nothing_sent() {
        let conf = conf::Quality::default();

        assert_eq!(
            Metrics::default().classify(&conf),
            ConnectionQuality::NoTransmittedData,
        );
    }

    #[test]
    fn quality_is_ordered() {
        assert!(
            ConnectionQuality::NoTransmittedData < ConnectionQuality::VeryBad
        );
        assert!(ConnectionQuality::Medium < ConnectionQuality::Good);
    }
}
