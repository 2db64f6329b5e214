//! Warning about speaking with the microphone muted.

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use derive_more::Display;

use crate::{log::prelude::*, utils::Clock};

use super::pipeline::SpeakingEvent;

/// Text of the warning.
pub const SPEAKING_WHILE_MUTED_WARNING: &str =
    "You seem to be talking while muted, please unmute yourself for others \
     to hear you";

/// Platform refused to show a notification.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "Notification was refused: {}", _0)]
pub struct NotificationRefused(pub String);

/// View showing the warning.
#[cfg_attr(test, mockall::automock)]
pub trait WarningView {
    /// Indicates whether the view is currently visible to the user.
    fn is_visible(&self) -> bool;

    /// Shows the provided in-view warning, [`None`] hides it.
    fn set_speaking_while_muted_notification(&self, message: Option<String>);

    /// Shows a platform notification outside of the view.
    ///
    /// # Errors
    ///
    /// If the platform refused to show it.
    fn show_platform_notification(
        &self,
        message: &str,
    ) -> Result<(), NotificationRefused>;

    /// Closes the platform notification shown before.
    fn close_platform_notification(&self);
}

/// Shows a warning once the user has been speaking while muted for a while,
/// and hides it as soon as they stop.
pub struct SpeakingWhileMutedWarner {
    /// View showing the warning.
    view: Rc<dyn WarningView>,

    /// Clock the deadline is measured with.
    clock: Rc<dyn Clock>,

    /// Delay before the warning is shown.
    delay: Duration,

    /// Moment the warning should be shown at.
    deadline: Cell<Option<Instant>>,

    /// Whether the in-view warning is shown.
    in_view: Cell<bool>,

    /// Whether a platform notification is shown.
    platform: Cell<bool>,
}

impl_debug_by_struct_name!(SpeakingWhileMutedWarner);

impl SpeakingWhileMutedWarner {
    /// Creates new [`SpeakingWhileMutedWarner`] showing the warning after the
    /// provided delay.
    pub fn new(
        view: Rc<dyn WarningView>,
        clock: Rc<dyn Clock>,
        delay: Duration,
    ) -> Self {
        Self {
            view,
            clock,
            delay,
            deadline: Cell::new(None),
            in_view: Cell::new(false),
            platform: Cell::new(false),
        }
    }

    /// Handles [`SpeakingEvent`] of the local audio.
    pub fn handle(&self, event: &SpeakingEvent) {
        match event {
            SpeakingEvent::SpeakingWhileMuted => {
                if self.deadline.get().is_none() {
                    self.deadline.set(Some(self.clock.now() + self.delay));
                }
            }
            SpeakingEvent::StoppedSpeakingWhileMuted => {
                self.deadline.set(None);
                self.hide();
            }
            _ => (),
        }
    }

    /// Returns the moment the warning should be shown at.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    /// Shows the warning if the delay has passed.
    pub fn poll(&self) {
        match self.deadline.get() {
            Some(deadline) if deadline <= self.clock.now() => {
                self.deadline.set(None);
                self.show();
            }
            _ => (),
        }
    }

    /// Shows the warning in the view, or as a platform notification if the
    /// view is hidden.
    fn show(&self) {
        if self.view.is_visible() {
            self.show_in_view();
            return;
        }
        if self.platform.get() {
            return;
        }
        match self
            .view
            .show_platform_notification(SPEAKING_WHILE_MUTED_WARNING)
        {
            Ok(()) => self.platform.set(true),
            Err(e) => {
                debug!("{}, showing the warning in the view", e);
                self.show_in_view();
            }
        }
    }

    /// Shows the in-view warning unless already shown.
    fn show_in_view(&self) {
        if self.in_view.replace(true) {
            return;
        }
        self.view.set_speaking_while_muted_notification(Some(
            SPEAKING_WHILE_MUTED_WARNING.to_owned(),
        ));
    }

    /// Hides every shown warning.
    fn hide(&self) {
        if self.in_view.replace(false) {
            self.view.set_speaking_while_muted_notification(None);
        }
        if self.platform.replace(false) {
            self.view.close_platform_notification();
        }
    }
}

#[cfg(test)]
mod spec {
    use std::{rc::Rc, time::Duration};

    use mockall::predicate::eq;

    use crate::{
        media::pipeline::SpeakingEvent,
        utils::ManualClock,
    };

    use super::{
        MockWarningView, NotificationRefused, SpeakingWhileMutedWarner,
        SPEAKING_WHILE_MUTED_WARNING,
    };

    fn warner(
        view: MockWarningView,
    ) -> (SpeakingWhileMutedWarner, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new());
        let warner = SpeakingWhileMutedWarner::new(
            Rc::new(view),
            clock.clone(),
            Duration::from_secs(3),
        );
        (warner, clock)
    }

    #[test]
    fn warns_in_view_after_delay() {
        let mut view = MockWarningView::new();
        view.expect_is_visible().return_const(true);
        view.expect_set_speaking_while_muted_notification()
            .with(eq(Some(SPEAKING_WHILE_MUTED_WARNING.to_owned())))
            .times(1)
            .return_const(());
        view.expect_set_speaking_while_muted_notification()
            .with(eq(None))
            .times(1)
            .return_const(());
        let (warner, clock) = warner(view);

        warner.handle(&SpeakingEvent::SpeakingWhileMuted);
        clock.advance(Duration::from_millis(2900));
        warner.poll();
        clock.advance(Duration::from_millis(200));
        warner.poll();
        warner.poll();
        warner.handle(&SpeakingEvent::StoppedSpeakingWhileMuted);
    }

    #[test]
    fn stopping_before_delay_shows_nothing() {
        let mut view = MockWarningView::new();
        view.expect_set_speaking_while_muted_notification().never();
        view.expect_show_platform_notification().never();
        let (warner, clock) = warner(view);

        warner.handle(&SpeakingEvent::SpeakingWhileMuted);
        clock.advance(Duration::from_secs(2));
        warner.handle(&SpeakingEvent::StoppedSpeakingWhileMuted);
        clock.advance(Duration::from_secs(2));
        warner.poll();

        assert_eq!(warner.next_deadline(), None);
    }

    #[test]
    fn uses_platform_notification_when_hidden() {
        let mut view = MockWarningView::new();
        view.expect_is_visible().return_const(false);
        view.expect_show_platform_notification()
            .times(1)
            .returning(|_| Ok(()));
        view.expect_close_platform_notification()
            .times(1)
            .return_const(());
        view.expect_set_speaking_while_muted_notification().never();
        let (warner, clock) = warner(view);

        warner.handle(&SpeakingEvent::SpeakingWhileMuted);
        clock.advance(Duration::from_secs(3));
        warner.poll();
        warner.handle(&SpeakingEvent::StoppedSpeakingWhileMuted);
    }

    #[test]
    fn falls_back_to_view_when_notification_refused() {
        let mut view = MockWarningView::new();
        view.expect_is_visible().return_const(false);
        view.expect_show_platform_notification()
            .times(1)
            .returning(|_| Err(NotificationRefused("denied".to_owned())));
        view.expect_set_speaking_while_muted_notification()
            .with(eq(Some(SPEAKING_WHILE_MUTED_WARNING.to_owned())))
            .times(1)
            .return_const(());
        let (warner, clock) = warner(view);

        warner.handle(&SpeakingEvent::SpeakingWhileMuted);
        clock.advance(Duration::from_secs(3));
        warner.poll();
    }
}
