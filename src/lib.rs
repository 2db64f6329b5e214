//! Core of a group call client.
//!
//! Reconciles a mesh (or relay-mediated star) of peer connections against a
//! dynamically changing participant roster, drives each connection through its
//! lifecycle with retry and ICE restart, runs locally captured media through a
//! processing pipeline and classifies connection quality.

#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

#[macro_use]
pub mod utils;
pub mod analyzer;
pub mod call;
pub mod conf;
pub mod driver;
pub mod log;
pub mod media;
pub mod peer;
pub mod platform;
pub mod signalling;

#[doc(inline)]
pub use self::{
    call::{CallEvent, CallSession},
    conf::Conf,
};
