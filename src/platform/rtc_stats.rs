//! Statistics reported by a peer connection.

use crate::media::MediaKind;

/// Statistics of an outbound RTP stream, combined with the statistics the
/// remote side reports about it.
#[derive(Clone, Debug, PartialEq)]
pub struct RtcOutboundStats {
    /// [`MediaKind`] of the sent track.
    pub kind: MediaKind,

    /// Total count of the sent packets.
    pub packets_sent: u64,

    /// Total count of the packets reported lost by the remote side.
    pub packets_lost: u64,

    /// Jitter reported by the remote side, in seconds.
    pub jitter: Option<f64>,

    /// Round trip time reported by the remote side, in seconds.
    pub round_trip_time: Option<f64>,
}

/// Statistics of an inbound RTP stream.
#[derive(Clone, Debug, PartialEq)]
pub struct RtcInboundStats {
    /// [`MediaKind`] of the received track.
    pub kind: MediaKind,

    /// Total count of the received bytes.
    pub bytes_received: u64,

    /// Total count of the received packets.
    pub packets_received: u64,

    /// Total count of the lost packets.
    pub packets_lost: u64,

    /// Jitter, in seconds.
    pub jitter: Option<f64>,
}

/// Statistics snapshot of a peer connection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RtcStats {
    /// Outbound streams.
    pub outbound: Vec<RtcOutboundStats>,

    /// Inbound streams.
    pub inbound: Vec<RtcInboundStats>,
}

impl RtcStats {
    /// Returns [`RtcOutboundStats`] of the provided [`MediaKind`].
    pub fn outbound(&self, kind: MediaKind) -> Option<&RtcOutboundStats> {
        self.outbound.iter().find(|s| s.kind == kind)
    }

    /// Returns [`RtcInboundStats`] of the provided [`MediaKind`].
    pub fn inbound(&self, kind: MediaKind) -> Option<&RtcInboundStats> {
        self.inbound.iter().find(|s| s.kind == kind)
    }
}
