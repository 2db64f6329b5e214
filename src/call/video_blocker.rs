//! Gate deciding whether the video of a remote participant is received.

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::{log::prelude::*, utils::Clock};

use super::participant::CallParticipant;

/// Blocks the video of a [`CallParticipant`] when it's not needed.
///
/// Video is not needed if the local user disabled it or if no view renders
/// it. Views call [`RemoteVideoBlocker::increase_visible_counter`] once each
/// and [`RemoteVideoBlocker::decrease_visible_counter`] once on teardown.
///
/// Becoming invisible blocks the video only after a grace period, so the
/// video survives layout changes. [`RemoteVideoBlocker::poll`] must be called
/// at [`RemoteVideoBlocker::next_deadline`] for the block to happen.
///
/// Must be the only writer of [`CallParticipant::set_video_blocked`].
pub struct RemoteVideoBlocker {
    participant: Rc<CallParticipant>,
    clock: Rc<dyn Clock>,
    delay: Duration,

    /// Last block state written to the [`CallParticipant`].
    blocked: Cell<bool>,

    enabled: Cell<bool>,
    visible_counter: Cell<u32>,

    /// Moment the pending block happens at.
    block_deadline: Cell<Option<Instant>>,
}

impl_debug_by_struct_name!(RemoteVideoBlocker);

impl RemoteVideoBlocker {
    /// Creates new [`RemoteVideoBlocker`] of the provided
    /// [`CallParticipant`].
    ///
    /// The video gets blocked after `delay` unless some view shows it.
    pub fn new(
        participant: Rc<CallParticipant>,
        clock: Rc<dyn Clock>,
        delay: Duration,
    ) -> Self {
        let this = Self {
            participant,
            clock,
            delay,
            blocked: Cell::new(false),
            enabled: Cell::new(true),
            visible_counter: Cell::new(1),
            block_deadline: Cell::new(None),
        };
        this.decrease_visible_counter();
        this
    }

    /// Indicates whether the video of the [`CallParticipant`] is enabled.
    #[inline]
    pub fn is_video_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Indicates whether the video is currently blocked.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.blocked.get()
    }

    /// Enables or disables the video regardless of its visibility.
    ///
    /// Cancels the pending block, if any.
    pub fn set_video_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);

        let had_pending_block = self.block_deadline.take().is_some();
        if self.visible_counter.get() == 0 && !had_pending_block {
            return;
        }

        self.set_blocked(!enabled);
    }

    /// Notes that one more view renders the video.
    pub fn increase_visible_counter(&self) {
        self.visible_counter.set(self.visible_counter.get() + 1);
        self.block_deadline.set(None);

        if self.enabled.get() {
            self.set_blocked(false);
        }
    }

    /// Notes that one view stopped rendering the video.
    ///
    /// Calling it more times than
    /// [`RemoteVideoBlocker::increase_visible_counter`] is logged and
    /// ignored.
    pub fn decrease_visible_counter(&self) {
        let counter = self.visible_counter.get();
        if counter == 0 {
            error!(
                "Visible counter of {} decreased when not visible",
                self.participant.session_id(),
            );
            return;
        }

        self.visible_counter.set(counter - 1);
        if counter > 1 || !self.enabled.get() {
            return;
        }

        self.block_deadline.set(Some(self.clock.now() + self.delay));
    }

    /// Returns the moment the pending block happens at.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.block_deadline.get()
    }

    /// Blocks the video if the grace period has passed.
    pub fn poll(&self) {
        match self.block_deadline.get() {
            Some(deadline) if deadline <= self.clock.now() => {
                self.block_deadline.set(None);
                self.set_blocked(true);
            }
            _ => {}
        }
    }

    fn set_blocked(&self, blocked: bool) {
        if self.blocked.get() == blocked {
            return;
        }
        self.blocked.set(blocked);
        self.participant.set_video_blocked(blocked);
    }
}
