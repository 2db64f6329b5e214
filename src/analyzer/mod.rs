//! Connection quality analysis.

mod average;
mod call;
mod participant;
mod quality;

#[doc(inline)]
pub use self::{
    average::{AverageStatValue, StatValueKind},
    call::{CallAnalyzer, CallAnalyzerEvent},
    participant::{AnalyzedKind, ParticipantAnalyzer, ParticipantAnalyzerEvent},
    quality::{ConnectionQuality, Metrics},
};
