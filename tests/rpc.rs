#![cfg(feature = "rpc")]

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use dendrite::{
    rpc::{delay_handler, RpcClient, RpcServer},
    Error,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Twenty requests costing 1000ms, 950ms, ... 50ms run at once. Replies come
/// back out of order and each must land with the caller that sent it.
#[test]
fn concurrent_requests_are_matched_to_their_callers() {
    init_tracing();
    let server = RpcServer::listen("inproc://rpc-concurrent", delay_handler).unwrap();
    let client = Arc::new(RpcClient::dial(server.address()).unwrap());

    let started = Instant::now();
    let workers: Vec<_> = (0..20u32)
        .map(|i| {
            let client = client.clone();
            thread::spawn(move || {
                let delay = 1000 - i * 50;
                let mut body = delay.to_be_bytes().to_vec();
                body.extend_from_slice(&i.to_be_bytes());
                let mut reply = client.issue(&body, Duration::from_secs(30)).unwrap();
                assert_eq!(reply.trim_u32().unwrap(), i);
                assert!(reply.is_empty());
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    let elapsed = started.elapsed();

    // serially this would take 10.5s
    assert!(elapsed < Duration::from_secs(8), "took {:?}", elapsed);
    assert_eq!(client.in_flight(), 0);
    assert_eq!(client.protocol_violations(), 0);

    client.close().unwrap();
    server.close().unwrap();
}

#[test]
fn issue_times_out_when_the_server_is_slow() {
    init_tracing();
    let server = RpcServer::listen("inproc://rpc-timeout", delay_handler).unwrap();
    let client = RpcClient::dial("inproc://rpc-timeout").unwrap();

    let result = client.issue(&500u32.to_be_bytes(), Duration::from_millis(50));
    assert_eq!(result.err(), Some(Error::TimedOut));
    assert_eq!(client.in_flight(), 0);

    // the late reply matches nobody
    for _ in 0..200 {
        if client.protocol_violations() == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(client.protocol_violations(), 1);

    client.close().unwrap();
    server.close().unwrap();
}

#[test]
fn handler_errors_leave_the_caller_to_its_timeout() {
    init_tracing();
    let server = RpcServer::listen("inproc://rpc-handler-error", delay_handler).unwrap();
    let client = RpcClient::dial("inproc://rpc-handler-error").unwrap();

    // too short to hold the delay
    let result = client.issue(&[1, 2], Duration::from_millis(200));
    assert_eq!(result.err(), Some(Error::TimedOut));

    let reply = client
        .issue(&0u32.to_be_bytes(), Duration::from_secs(5))
        .unwrap();
    assert!(reply.is_empty());

    client.close().unwrap();
    server.close().unwrap();
}

#[test]
fn dial_without_a_server_fails() {
    init_tracing();
    assert!(matches!(
        RpcClient::dial("inproc://rpc-nobody"),
        Err(Error::ConnectionRefused(_))
    ));
}

#[test]
fn dropping_the_endpoints_releases_the_address() {
    init_tracing();
    let server = RpcServer::listen("inproc://rpc-drop", delay_handler).unwrap();
    let client = RpcClient::dial("inproc://rpc-drop").unwrap();
    let reply = client
        .issue(&0u32.to_be_bytes(), Duration::from_secs(5))
        .unwrap();
    assert!(reply.is_empty());
    drop(client);
    drop(server);

    let server = RpcServer::listen("inproc://rpc-drop", delay_handler).unwrap();
    let client = RpcClient::dial("inproc://rpc-drop").unwrap();
    assert!(client
        .issue(&0u32.to_be_bytes(), Duration::from_secs(5))
        .is_ok());
}
