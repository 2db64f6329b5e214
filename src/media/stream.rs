//! Streams grouping media tracks.

use std::{
    cell::RefCell,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::log::prelude::*;

use super::{MediaKind, Track};

/// Source of [`MediaStream`] IDs.
static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct InnerStream {
    /// Unique ID of the stream.
    id: u64,

    /// Tracks of the stream.
    tracks: RefCell<Vec<Track>>,
}

/// Shared handle to a group of [`Track`]s sent or rendered together.
///
/// Equality compares identity: two streams holding the same tracks are still
/// different streams.
#[derive(Clone, Debug)]
pub struct MediaStream(Rc<InnerStream>);

impl MediaStream {
    /// Creates new empty [`MediaStream`].
    pub fn new() -> Self {
        Self(Rc::new(InnerStream {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            tracks: RefCell::new(Vec::new()),
        }))
    }

    /// Creates new [`MediaStream`] with the provided [`Track`]s.
    pub fn with_tracks<I: IntoIterator<Item = Track>>(tracks: I) -> Self {
        let stream = Self::new();
        for track in tracks {
            stream.add_track(track);
        }
        stream
    }

    /// Returns unique ID of this [`MediaStream`].
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Adds the provided [`Track`] to this [`MediaStream`].
    pub fn add_track(&self, track: Track) {
        let mut tracks = self.0.tracks.borrow_mut();
        if tracks.contains(&track) {
            warn!("Track {} is already in stream {}", track.id(), self.0.id);
            return;
        }
        tracks.push(track);
    }

    /// Removes the provided [`Track`] from this [`MediaStream`].
    ///
    /// Returns `false` if it wasn't there.
    pub fn remove_track(&self, track: &Track) -> bool {
        let mut tracks = self.0.tracks.borrow_mut();
        let len = tracks.len();
        tracks.retain(|t| t != track);
        tracks.len() != len
    }

    /// Returns all [`Track`]s of this [`MediaStream`].
    pub fn tracks(&self) -> Vec<Track> {
        self.0.tracks.borrow().clone()
    }

    /// Returns [`Track`]s of the provided [`MediaKind`].
    pub fn tracks_of(&self, kind: MediaKind) -> Vec<Track> {
        self.0
            .tracks
            .borrow()
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }

    /// Indicates whether this [`MediaStream`] has no [`Track`]s.
    pub fn is_empty(&self) -> bool {
        self.0.tracks.borrow().is_empty()
    }

    /// Indicates whether both handles refer to the same [`MediaStream`].
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for MediaStream {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MediaStream {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for MediaStream {}
