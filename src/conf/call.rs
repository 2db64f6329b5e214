//! Call session settings.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Call session settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Call {
    /// Whether join and leave sounds should be requested.
    #[default = true]
    pub play_sounds: bool,
}
