use std::{thread, time::Duration};

use dendrite::{Error, Protocol, Socket, SocketOptions};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn open(protocol: Protocol, recv_timeout: Duration) -> Socket {
    Socket::with_options(
        protocol,
        SocketOptions::builder()
            .recv_timeout(recv_timeout)
            .reconnect_min(Duration::from_millis(20))
            .reconnect_max(Duration::from_millis(100))
            .build(),
    )
}

fn wait_for_pipes(socket: &Socket, expected: usize) {
    for _ in 0..500 {
        if socket.pipe_count() == expected {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("socket {} never reached {} pipes", socket.id(), expected);
}

/// Receives until the socket stays quiet for its receive timeout.
fn drain(socket: &Socket) -> Vec<Vec<u8>> {
    let mut received = Vec::new();
    loop {
        match socket.recv_bytes() {
            Ok(data) => received.push(data),
            Err(Error::TimedOut) => return received,
            Err(e) => panic!("unexpected receive error: {}", e),
        }
    }
}

#[test]
fn pair_talks_both_ways() {
    init_tracing();
    let a = open(Protocol::Pair, Duration::from_secs(5));
    let b = open(Protocol::Pair, Duration::from_secs(5));
    let _listener = a.listen("inproc://pipeline-pair").unwrap();
    let _dialer = b.dial("inproc://pipeline-pair").unwrap();
    wait_for_pipes(&a, 1);

    a.send_bytes(b"ping").unwrap();
    assert_eq!(b.recv_bytes().unwrap(), b"ping");
    b.send_bytes(b"pong").unwrap();
    assert_eq!(a.recv_bytes().unwrap(), b"pong");
}

#[test]
fn pair_holds_messages_until_a_peer_arrives() {
    init_tracing();
    let a = open(Protocol::Pair, Duration::from_secs(5));
    let _listener = a.listen("inproc://pipeline-pair-early").unwrap();
    a.send_bytes(b"first").unwrap();
    a.send_bytes(b"second").unwrap();

    let b = open(Protocol::Pair, Duration::from_secs(5));
    let _dialer = b.dial("inproc://pipeline-pair-early").unwrap();
    assert_eq!(b.recv_bytes().unwrap(), b"first");
    assert_eq!(b.recv_bytes().unwrap(), b"second");
}

#[test]
fn pair_keeps_its_first_peer() {
    init_tracing();
    let a = open(Protocol::Pair, Duration::from_secs(5));
    let b = open(Protocol::Pair, Duration::from_secs(5));
    let intruder = open(Protocol::Pair, Duration::from_millis(200));
    let _listener = a.listen("inproc://pipeline-pair-single").unwrap();
    let _dialer = b.dial("inproc://pipeline-pair-single").unwrap();
    wait_for_pipes(&a, 1);

    // the second dialer keeps retrying and keeps being turned away
    let _ = intruder.dial("inproc://pipeline-pair-single");
    for _ in 0..20 {
        assert_eq!(a.pipe_count(), 1);
        thread::sleep(Duration::from_millis(10));
    }
    a.send_bytes(b"only for b").unwrap();
    assert_eq!(b.recv_bytes().unwrap(), b"only for b");
    assert!(drain(&intruder).is_empty());
}

#[test]
fn push_spreads_work_over_pullers() {
    init_tracing();
    let push = open(Protocol::Push, Duration::from_secs(5));
    let _listener = push.listen("inproc://pipeline-spread").unwrap();
    let workers: Vec<Socket> = (0..2)
        .map(|_| {
            let pull = open(Protocol::Pull, Duration::from_millis(300));
            pull.dial("inproc://pipeline-spread").unwrap();
            pull
        })
        .collect();
    wait_for_pipes(&push, 2);

    for i in 0..10u8 {
        push.send_bytes(&[i]).unwrap();
    }
    let shares: Vec<Vec<Vec<u8>>> = workers.iter().map(drain).collect();
    assert!(shares.iter().all(|share| !share.is_empty()));
    let mut all: Vec<u8> = shares.into_iter().flatten().flatten().collect();
    all.sort_unstable();
    assert_eq!(all, (0..10).collect::<Vec<u8>>());
}

#[test]
fn pipeline_ends_are_one_way() {
    let push = Socket::push();
    let pull = Socket::pull();
    assert_eq!(push.recv().err(), Some(Error::NotSupported("push")));
    assert_eq!(pull.send_bytes(b"upstream"), Err(Error::NotSupported("pull")));
}

#[test]
fn push_only_connects_to_pull() {
    init_tracing();
    let bus = Socket::bus();
    let _listener = bus.listen("inproc://pipeline-wrong-peer").unwrap();
    let push = Socket::push();
    assert!(matches!(
        push.dial("inproc://pipeline-wrong-peer"),
        Err(Error::ProtocolViolation(_))
    ));
}
