//! Handles to media tracks provided by the platform.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use derive_more::Display;

/// Kind of a media track.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MediaKind {
    /// Audio track.
    #[display(fmt = "audio")]
    Audio,

    /// Video track.
    #[display(fmt = "video")]
    Video,
}

/// Constraints applied to a video track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackConstraints {
    /// Ideal width of the frames.
    pub width: Option<u32>,

    /// Ideal height of the frames.
    pub height: Option<u32>,

    /// Ideal frame rate.
    pub frame_rate: Option<f64>,
}

#[derive(Debug)]
struct InnerTrack {
    /// Platform ID of the track.
    id: String,

    /// [`MediaKind`] of the track.
    kind: MediaKind,

    /// Whether the track produces media.
    enabled: Cell<bool>,

    /// Whether the track was stopped and won't produce media anymore.
    ended: Cell<bool>,

    /// Constraints currently applied to the track.
    constraints: RefCell<TrackConstraints>,
}

/// Shared handle to a media track.
///
/// Clones refer to the same track, and equality compares identity rather
/// than contents.
#[derive(Clone, Debug)]
pub struct Track(Rc<InnerTrack>);

impl Track {
    /// Creates new enabled [`Track`].
    pub fn new<S: Into<String>>(id: S, kind: MediaKind) -> Self {
        Self(Rc::new(InnerTrack {
            id: id.into(),
            kind,
            enabled: Cell::new(true),
            ended: Cell::new(false),
            constraints: RefCell::new(TrackConstraints::default()),
        }))
    }

    /// Returns platform ID of this [`Track`].
    #[inline]
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Returns [`MediaKind`] of this [`Track`].
    #[inline]
    pub fn kind(&self) -> MediaKind {
        self.0.kind
    }

    /// Indicates whether this [`Track`] produces media.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.0.enabled.get()
    }

    /// Enables or disables this [`Track`].
    #[inline]
    pub fn set_enabled(&self, enabled: bool) {
        self.0.enabled.set(enabled);
    }

    /// Stops this [`Track`] releasing its source.
    #[inline]
    pub fn stop(&self) {
        self.0.ended.set(true);
    }

    /// Indicates whether this [`Track`] has been stopped.
    #[inline]
    pub fn is_ended(&self) -> bool {
        self.0.ended.get()
    }

    /// Returns [`TrackConstraints`] applied to this [`Track`].
    pub fn constraints(&self) -> TrackConstraints {
        self.0.constraints.borrow().clone()
    }

    /// Applies the provided [`TrackConstraints`] to this [`Track`].
    pub fn apply_constraints(&self, constraints: TrackConstraints) {
        *self.0.constraints.borrow_mut() = constraints;
    }

    /// Indicates whether both handles refer to the same [`Track`].
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Track {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Track {}
