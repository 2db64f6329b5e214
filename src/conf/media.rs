//! Local media settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Local media settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Media {
    /// Duration of a pending local media request after which the user is
    /// told that the request takes longer than expected.
    #[default(Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub local_stream_request_timeout: Duration,

    /// Delay before warning about speaking while muted.
    #[default(Duration::from_secs(3))]
    #[serde(with = "humantime_serde")]
    pub speaking_while_muted_delay: Duration,

    /// Grace period before blocking remote video which is not rendered
    /// anywhere.
    #[default(Duration::from_secs(5))]
    #[serde(with = "humantime_serde")]
    pub remote_video_block_delay: Duration,

    /// Volume (in dBFS) above which an audio sample is considered speech.
    #[default(-50.0)]
    pub speaking_threshold: f64,

    /// Count of the latest volume samples the speaking detection looks at.
    #[default = 10]
    pub speaking_history: usize,
}
