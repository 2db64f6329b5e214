mod common;

use std::{rc::Rc, time::Duration};

use futures::{stream, StreamExt as _};

use medea_call::{
    call::SessionInput,
    driver::{self, TokioClock},
    platform::NegotiationRole,
    signalling::{CallFlags, PeerKind, RosterEntry, SignallingEvent},
};

use self::common::{session, FakeFactory, FakeLocalMedia, FakeSignalling};

#[tokio::test]
async fn fires_retries_in_paused_time() {
    tokio::time::pause();
    let signalling = Rc::new(FakeSignalling::new("a"));
    let factory = Rc::new(FakeFactory::default());
    let local_media = Rc::new(FakeLocalMedia::with_stream());
    let mut session =
        session(&signalling, &factory, &local_media, Rc::new(TokioClock));

    let flags = CallFlags::IN_CALL | CallFlags::WITH_AUDIO;
    let joined = stream::iter(vec![
        SignallingEvent::UsersInRoom(vec![RosterEntry::new("a", flags)]),
        SignallingEvent::UsersJoined(vec![RosterEntry::new("b", flags)]),
    ]);
    let left = stream::once(async {
        tokio::time::sleep(Duration::from_secs(11)).await;
        SignallingEvent::UsersLeft(vec!["b".into()])
    });
    let inputs = joined.chain(left).map(SessionInput::from).boxed_local();

    driver::run(&mut session, inputs).await;

    let offers = factory.created_for("b", PeerKind::Video);
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].options.role, NegotiationRole::Offerer);
    assert!(offers[0].ended.get());
    assert!(session.participants().is_empty());
    assert_eq!(session.pending_timers(), 0);
}
