//! Connection quality analysis settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Connection quality analysis settings.
///
/// Every metric threshold is the value starting from which the quality drops
/// to the corresponding level.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Quality {
    /// Interval of pulling statistics from a peer connection.
    #[default(Duration::from_secs(1))]
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Count of samples averaged for every metric.
    #[default = 5]
    pub window: usize,

    /// Weight of the latest sample, relative to the weight `1` of the oldest
    /// one.
    #[default(3.0)]
    pub last_value_weight: f64,

    /// Packets count per sample below which nothing is considered being
    /// transmitted.
    #[default = 1]
    pub min_packets_per_sample: u64,

    /// Packet loss ratio thresholds.
    pub packet_loss: PacketLoss,

    /// Jitter thresholds.
    pub jitter: Jitter,

    /// Round trip time thresholds.
    pub round_trip_time: RoundTripTime,
}

/// Packet loss ratio (lost to sent) thresholds.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct PacketLoss {
    /// Ratio starting from which the quality is medium.
    #[default(0.1)]
    pub medium: f64,

    /// Ratio starting from which the quality is bad.
    #[default(0.2)]
    pub bad: f64,

    /// Ratio starting from which the quality is very bad.
    #[default(0.3)]
    pub very_bad: f64,
}

/// Jitter thresholds.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Jitter {
    /// Jitter starting from which the quality is medium.
    #[default(Duration::from_millis(30))]
    #[serde(with = "humantime_serde")]
    pub medium: Duration,

    /// Jitter starting from which the quality is bad.
    #[default(Duration::from_millis(50))]
    #[serde(with = "humantime_serde")]
    pub bad: Duration,

    /// Jitter starting from which the quality is very bad.
    #[default(Duration::from_millis(100))]
    #[serde(with = "humantime_serde")]
    pub very_bad: Duration,
}

/// Round trip time thresholds.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct RoundTripTime {
    /// Round trip time starting from which the quality is medium.
    #[default(Duration::from_millis(400))]
    #[serde(with = "humantime_serde")]
    pub medium: Duration,

    /// Round trip time starting from which the quality is bad.
    #[default(Duration::from_millis(800))]
    #[serde(with = "humantime_serde")]
    pub bad: Duration,

    /// Round trip time starting from which the quality is very bad.
    #[default(Duration::from_millis(1500))]
    #[serde(with = "humantime_serde")]
    pub very_bad: Duration,
}

#[cfg(test)]
mod spec {
    use std::time::Duration;

    use serial_test::serial;

    use crate::{conf::Conf, overrided_by_env_conf};

    #[test]
    #[serial]
    fn overrides_defaults() {
        let default_conf = Conf::default();
        let env_conf = overrided_by_env_conf!(
            "MEDEA_CALL_QUALITY__WINDOW" => "7",
            "MEDEA_CALL_QUALITY__JITTER__BAD" => "70ms",
            "MEDEA_CALL_QUALITY__PACKET_LOSS__VERY_BAD" => "0.5",
        );

        assert_ne!(default_conf.quality.window, env_conf.quality.window);
        assert_eq!(env_conf.quality.window, 7);

        assert_eq!(env_conf.quality.jitter.bad, Duration::from_millis(70));
        assert_eq!(
            env_conf.quality.jitter.medium,
            default_conf.quality.jitter.medium,
        );

        assert!((env_conf.quality.packet_loss.very_bad - 0.5).abs() < 1e-9);
    }

    #[test]
    fn thresholds_are_ascending() {
        let quality = Conf::default().quality;

        assert!(quality.packet_loss.medium < quality.packet_loss.bad);
        assert!(quality.packet_loss.bad < quality.packet_loss.very_bad);
        assert!(quality.jitter.medium < quality.jitter.bad);
        assert!(quality.jitter.bad < quality.jitter.very_bad);
        assert!(quality.round_trip_time.medium < quality.round_trip_time.bad);
        assert!(
            quality.round_trip_time.bad < quality.round_trip_time.very_bad
        );
    }
}
