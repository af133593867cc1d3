use std::{thread, time::Duration};

use dendrite::{Error, Protocol, Socket, SocketOptions};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn bus() -> Socket {
    Socket::with_options(
        Protocol::Bus,
        SocketOptions::builder()
            .recv_timeout(Duration::from_secs(5))
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

#[test]
fn broadcast_reaches_every_direct_peer() {
    init_tracing();
    let hub = bus();
    let _listener = hub.listen("inproc://bus-star").unwrap();
    let spokes: Vec<Socket> = (0..3).map(|_| bus()).collect();
    for spoke in &spokes {
        spoke.dial("inproc://bus-star").unwrap();
    }
    wait_for_pipes(&hub, 3);

    hub.send_bytes(b"hello spokes").unwrap();
    for spoke in &spokes {
        assert_eq!(spoke.recv_bytes().unwrap(), b"hello spokes");
    }

    // spokes only reach the hub, never each other
    spokes[0].send_bytes(b"from spoke").unwrap();
    assert_eq!(hub.recv_bytes().unwrap(), b"from spoke");
    spokes[1]
        .set_recv_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    assert_eq!(spokes[1].recv().err(), Some(Error::TimedOut));
}

#[test]
fn raw_bus_forwards_without_echo() {
    init_tracing();
    let relay = Socket::with_options(
        Protocol::Bus,
        SocketOptions::builder()
            .raw(true)
            .recv_timeout(Duration::from_secs(5))
            .build(),
    );
    let _listener = relay.listen("inproc://bus-relay").unwrap();
    let left = bus();
    let right = bus();
    left.dial("inproc://bus-relay").unwrap();
    right.dial("inproc://bus-relay").unwrap();
    wait_for_pipes(&relay, 2);

    left.send_bytes(b"across").unwrap();
    let msg = relay.recv().unwrap();
    relay.send(msg).unwrap();
    assert_eq!(right.recv_bytes().unwrap(), b"across");
    left.set_recv_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    assert_eq!(left.recv().err(), Some(Error::TimedOut));
}

#[test]
fn bus_refuses_request_reply_peers() {
    init_tracing();
    let rep = Socket::rep();
    let _listener = rep.listen("inproc://bus-wrong-peer").unwrap();
    let node = bus();
    assert!(matches!(
        node.dial("inproc://bus-wrong-peer"),
        Err(Error::ProtocolViolation(_))
    ));
}
