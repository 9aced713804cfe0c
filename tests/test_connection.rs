use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use mio::Token;

use hearth::server::{Connection, Lifecycle};

/// Builds a connection backed by a real accepted socket. The client half is
/// returned so it stays open for the duration of the test.
fn connected_pair() -> (Connection, std::net::TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (accepted, peer) = listener.accept().unwrap();
    accepted.set_nonblocking(true).unwrap();
    let stream = mio::net::TcpStream::from_std(accepted);
    (Connection::new(Token(2), stream, peer), client)
}

#[test]
fn test_new_connection_starts_idle() {
    let (connection, _client) = connected_pair();
    assert_eq!(connection.state(), Lifecycle::Idle);
    assert!(connection.keep_alive());
    assert!(!connection.is_closed());
}

#[test]
fn test_transition_requires_expected_state() {
    let (connection, _client) = connected_pair();

    assert!(connection.try_transition(Lifecycle::Idle, Lifecycle::Running));
    assert_eq!(connection.state(), Lifecycle::Running);

    // A second claim from Idle must lose.
    assert!(!connection.try_transition(Lifecycle::Idle, Lifecycle::Running));

    assert!(connection.try_transition(Lifecycle::Running, Lifecycle::Ready));
    assert!(connection.try_transition(Lifecycle::Ready, Lifecycle::Idle));
    assert_eq!(connection.state(), Lifecycle::Idle);
}

#[test]
fn test_concurrent_claims_are_exclusive() {
    let (connection, _client) = connected_pair();
    let connection = Arc::new(connection);

    for _ in 0..100 {
        let owned = Arc::new(AtomicBool::new(false));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let connection = connection.clone();
                let owned = owned.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if connection.try_transition(Lifecycle::Idle, Lifecycle::Running) {
                        // Winning the CAS must confer sole ownership.
                        assert!(!owned.swap(true, Ordering::SeqCst));
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(connection.try_transition(Lifecycle::Running, Lifecycle::Idle));
    }
}

#[test]
fn test_close_is_idempotent_and_terminal() {
    let (connection, _client) = connected_pair();
    let connection = Arc::new(connection);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let connection = connection.clone();
            std::thread::spawn(move || connection.close())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(connection.is_closed());
    assert_eq!(connection.state(), Lifecycle::Closed);
    // No lifecycle transition can resurrect a closed connection.
    assert!(!connection.try_transition(Lifecycle::Idle, Lifecycle::Running));
    assert!(!connection.try_transition(Lifecycle::Ready, Lifecycle::Idle));
}

#[test]
fn test_touch_advances_last_activity() {
    let (connection, _client) = connected_pair();
    let before = connection.last_activity();

    std::thread::sleep(std::time::Duration::from_millis(5));
    connection.touch();

    assert!(connection.last_activity() > before);
}
