//! Peer connections lifecycle settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Peer connections lifecycle settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Peer {
    /// Maximum count of ICE restarts performed by a single peer connection
    /// before it gives up and reports `failed-no-restart`.
    ///
    /// Counter is reset once the connection gets `connected`.
    #[default = 5]
    pub ice_restart_attempts: u32,

    /// Duration of the `disconnected` ICE state after which the connection is
    /// considered `disconnected-long` and its negotiation is restarted.
    #[default(Duration::from_secs(5))]
    #[serde(with = "humantime_serde")]
    pub disconnected_timeout: Duration,

    /// Period of resending an offer (or requesting one from a relay) while
    /// no answer (or offer) arrives.
    #[default(Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub offer_retry_interval: Duration,

    /// Largest delay of the exponential resend of the local media state when
    /// a relay is used.
    ///
    /// Resends happen `0s`, `1s`, `2s`, `4s` and so on after connecting,
    /// until this delay is exceeded.
    #[default(Duration::from_secs(16))]
    #[serde(with = "humantime_serde")]
    pub state_repetition_max: Duration,
}
