//! Capabilities provided by the host platform.
//!
//! Media capture, the peer connection transport and background segmentation
//! are not implemented by this crate: embedders provide them by implementing
//! the traits of this module.

mod media_devices;
mod peer_connection;
mod rtc_stats;
mod segmenter;

#[doc(inline)]
pub use self::{
    media_devices::{MediaDeviceError, MediaDevices, MediaStreamConstraints},
    peer_connection::{
        IceConnectionState, NegotiationRole, PeerConnectionFactory,
        PeerConnectionState, PeerOptions, RtcPeerConnection, SdpType,
        SignalingState,
    },
    rtc_stats::{RtcInboundStats, RtcOutboundStats, RtcStats},
    segmenter::{BackgroundSegmenter, SegmenterLoadError},
};
