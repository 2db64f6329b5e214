//! [tokio]-based event loop driving a [`CallSession`].
//!
//! [tokio]: https://docs.rs/tokio

use std::time::Instant;

use futures::{future, Stream, StreamExt as _};
use tokio::time;

use crate::{
    call::{CallSession, SessionInput},
    log::prelude::*,
    utils::Clock,
};

/// [`Clock`] backed by [`tokio::time::Instant`].
///
/// Follows the paused time of the [tokio] runtime, so timers of a
/// [`CallSession`] are fired by [`tokio::time::advance()`] in tests.
///
/// [tokio]: https://docs.rs/tokio
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    #[inline]
    fn now(&self) -> Instant {
        time::Instant::now().into_std()
    }
}

/// Feeds the provided [`SessionInput`]s into the [`CallSession`] and fires
/// its timers at their deadlines, until the inputs end.
///
/// [`CallSession`] must be created with [`TokioClock`].
pub async fn run<S>(session: &mut CallSession, inputs: S)
where
    S: Stream<Item = SessionInput> + Unpin,
{
    let mut inputs = inputs.fuse();
    loop {
        let deadline = session.next_deadline();
        tokio::select! {
            input = inputs.next() => match input {
                Some(input) => session.handle(input),
                None => {
                    debug!("Call session inputs ended");
                    break;
                }
            },
            _ = sleep_until(deadline) => (),
        }
        session.poll_timers();
    }
}

/// Sleeps until the provided deadline, or forever if there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            time::sleep_until(time::Instant::from_std(deadline)).await;
        }
        None => future::pending().await,
    }
}
