//! Lives in its own test binary: closing every socket in the process would
//! pull the rug from under tests running alongside it.

use std::{sync::mpsc, time::Duration};

use dendrite::{Aio, Error, Socket};

#[test]
fn close_all_shuts_every_open_socket() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let a = Socket::bus();
    let b = Socket::bus();
    let _listener = a.listen("inproc://close-all").unwrap();
    let _dialer = b.dial("inproc://close-all").unwrap();
    let reqs: Vec<Socket> = (0..3).map(|_| Socket::req()).collect();
    let already_closed = Socket::rep();
    already_closed.close().unwrap();

    let (tx, rx) = mpsc::channel();
    let aio = Aio::new(move |aio| tx.send(aio.result()).unwrap());
    a.recv_aio(&aio).unwrap();

    assert_eq!(Socket::close_all(), 5);
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        Err(Error::Closed)
    );
    assert!(a.is_closed() && b.is_closed());
    assert!(reqs.iter().all(Socket::is_closed));
    assert_eq!(a.send_bytes(b"late"), Err(Error::Closed));

    // names held by closed sockets are free again
    let c = Socket::bus();
    assert!(c.listen("inproc://close-all").is_ok());
    assert_eq!(Socket::close_all(), 1);
}
