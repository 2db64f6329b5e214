//! Application of constraints to a video track.

use std::cell::RefCell;

use crate::media::{Track, TrackConstraints};

use super::{
    InputChange, InputSlots, OutputSinks, TrackSink, TrackSource, DEFAULT_SLOT,
};

/// Node applying [`TrackConstraints`] to the track passing through it.
#[derive(Debug)]
pub struct TrackConstrainer {
    /// Single input slot.
    inputs: InputSlots,

    /// Single output.
    outputs: OutputSinks,

    /// Constraints applied to every passing track.
    constraints: RefCell<Option<TrackConstraints>>,
}

impl TrackConstrainer {
    /// Creates new [`TrackConstrainer`] without constraints.
    pub fn new() -> Self {
        Self {
            inputs: InputSlots::new(&[DEFAULT_SLOT]),
            outputs: OutputSinks::new(&[DEFAULT_SLOT]),
            constraints: RefCell::new(None),
        }
    }

    /// Applies the provided [`TrackConstraints`] to the current and all the
    /// following tracks.
    pub fn apply_constraints(&self, constraints: TrackConstraints) {
        if let Some(track) = self.inputs.track(DEFAULT_SLOT) {
            track.apply_constraints(constraints.clone());
        }
        *self.constraints.borrow_mut() = Some(constraints);
    }
}

impl Default for TrackConstrainer {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl TrackSource for TrackConstrainer {
    #[inline]
    fn outputs(&self) -> &OutputSinks {
        &self.outputs
    }
}

impl TrackSink for TrackConstrainer {
    fn set_input_track(&self, slot: &str, track: Option<Track>) {
        match self.inputs.set(slot, track) {
            InputChange::Replaced { new, .. } => {
                if let (Some(track), Some(constraints)) =
                    (&new, self.constraints.borrow().as_ref())
                {
                    track.apply_constraints(constraints.clone());
                }
                self.outputs.set_track(DEFAULT_SLOT, new);
            }
            InputChange::EnabledChanged(_, enabled) => {
                self.outputs.set_track_enabled(DEFAULT_SLOT, enabled);
            }
            InputChange::Unchanged => (),
        }
    }

    fn set_input_track_enabled(&self, slot: &str, enabled: bool) {
        if self.inputs.set_enabled(slot, enabled).is_some() {
            self.outputs.set_track_enabled(DEFAULT_SLOT, enabled);
        }
    }
}

#[cfg(test)]
mod spec {
    use crate::media::{MediaKind, Track, TrackConstraints};

    use super::{
        TrackConstrainer, TrackSink as _, TrackSource as _, DEFAULT_SLOT,
    };

    #[test]
    fn constrains_current_and_following_tracks() {
        let constrainer = TrackConstrainer::new();
        let first = Track::new("v1", MediaKind::Video);
        constrainer.set_input_track(DEFAULT_SLOT, Some(first.clone()));

        let constraints = TrackConstraints {
            width: Some(320),
            height: Some(240),
            frame_rate: None,
        };
        constrainer.apply_constraints(constraints.clone());
        assert_eq!(first.constraints(), constraints);

        let second = Track::new("v2", MediaKind::Video);
        constrainer.set_input_track(DEFAULT_SLOT, Some(second.clone()));

        assert_eq!(second.constraints(), constraints);
        assert_eq!(constrainer.output_track(DEFAULT_SLOT), Some(second));
    }
}
