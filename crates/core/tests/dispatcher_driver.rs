//! Cross-thread driving of the supervisor through a real dispatch thread:
//! the test thread only ever submits work; every callback runs on the
//! dispatcher.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use mc::protocol::Fragment;
use mc::runtime::Dispatcher;
use mc::testing::MockClient;
use mc::{Session, Snapshot, Supervisor};

const TIMEOUT: Duration = Duration::from_secs(5);

fn create_session(dispatcher: &Dispatcher, supervisor: &Arc<Supervisor>) -> Session {
    let (tx, rx) = mpsc::channel();
    let owner = Arc::clone(supervisor);
    dispatcher.schedule(move || {
        owner.create_session(move |session| {
            let _ = tx.send(session.expect("session create failed"));
        });
    });
    rx.recv_timeout(TIMEOUT).expect("session callback never ran")
}

fn browse_root(dispatcher: &Dispatcher, session: &Session) -> Snapshot {
    let (tx, rx) = mpsc::channel();
    let handle = session.clone();
    dispatcher.schedule(move || {
        handle
            .browse(None, move |snapshot| {
                let _ = tx.send(snapshot.expect("browse failed"));
            })
            .expect("browse on closed session");
    });
    rx.recv_timeout(TIMEOUT).expect("browse callback never ran")
}

fn read_fragment(
    dispatcher: &Dispatcher,
    snapshot: &Snapshot,
    index: u32,
    count: u32,
) -> Fragment {
    let (tx, rx) = mpsc::channel();
    let handle = snapshot.clone();
    dispatcher.schedule(move || {
        handle
            .read(index, count, move |fragment| {
                let _ = tx.send(fragment.expect("read failed"));
            })
            .expect("read on closed session");
    });
    rx.recv_timeout(TIMEOUT).expect("read callback never ran")
}

#[test]
fn full_lifecycle_from_a_foreign_thread() {
    let dispatcher = Dispatcher::new("media-dispatch");
    let client = Arc::new(MockClient::new(64));
    let supervisor = Arc::new(Supervisor::new(client.clone()));

    let session = create_session(&dispatcher, &supervisor);
    let snapshot = browse_root(&dispatcher, &session);
    assert_eq!(snapshot.total(), 64);

    let fragment = read_fragment(&dispatcher, &snapshot, 60, 10);
    assert_eq!(fragment.index(), 60);
    assert_eq!(fragment.len(), 4);

    let handle = session.clone();
    dispatcher.execute(move || handle.dispose());

    // The remote destroy runs as follow-through on the dispatcher; wait for
    // it before cancelling, or the destroy would be moot.
    let deadline = std::time::Instant::now() + TIMEOUT;
    while client.sessions_destroyed() == 0 {
        assert!(std::time::Instant::now() < deadline, "destroy never ran");
        std::thread::sleep(Duration::from_millis(5));
    }

    supervisor.cancel();
    supervisor.dispose();

    assert_eq!(client.sessions_created(), 1);
    assert_eq!(client.sessions_destroyed(), 1);
    assert_eq!(supervisor.live_sessions(), 0);
}

#[test]
fn cancel_from_foreign_thread_abandons_in_flight_query() {
    let dispatcher = Dispatcher::new("media-dispatch");
    let client = Arc::new(MockClient::new(64));
    let supervisor = Arc::new(Supervisor::new(client.clone()));

    let session = create_session(&dispatcher, &supervisor);

    client.pause();
    let (tx, rx) = mpsc::channel();
    let handle = session.clone();
    dispatcher.execute(move || {
        handle
            .browse(None, move |snapshot| {
                let _ = tx.send(snapshot.map(|snapshot| snapshot.total()));
            })
            .expect("browse on closed session");
    });

    supervisor.cancel();
    client.resume();

    // The cancelled browse never completes into its callback.
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    let handle = session.clone();
    dispatcher.execute(move || handle.dispose());
    supervisor.dispose();

    assert_eq!(supervisor.live_sessions(), 0);
}
