//! Integration tests for the socket layer.
//!
//! These exercise real sockets end to end: stream handshakes, datagram
//! exchanges, Unix-domain paths, timeouts, and readiness polling.

use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use unisock::{
    read_ready_sockets, Address, BoolOption, Condition, Domain, Error, OptionLevel, Socket,
    SocketType, DEFAULT_BACKLOG,
};

fn loopback_stream_listener() -> Socket {
    let mut listener = Socket::new(Domain::Ipv4, SocketType::Stream, 0).expect("create listener");
    let any = Address::parse("127.0.0.1:0", Some(Domain::Ipv4)).expect("parse loopback");
    listener.bind(&any).expect("bind listener");
    listener.listen(DEFAULT_BACKLOG).expect("listen");
    listener
}

fn bound_datagram_socket() -> Socket {
    let mut sock = Socket::new(Domain::Ipv4, SocketType::Datagram, 0).expect("create datagram");
    let any = Address::parse("127.0.0.1:0", Some(Domain::Ipv4)).expect("parse loopback");
    sock.bind(&any).expect("bind datagram");
    sock
}

#[test]
fn test_stream_handshake_addresses_match() {
    let listener = loopback_stream_listener();
    let listen_addr = listener.local_address().expect("listener address");
    println!("listening on {}", listen_addr);

    let mut client = Socket::new(Domain::Ipv4, SocketType::Stream, 0).expect("create client");
    client.connect(&listen_addr).expect("connect");

    let accepted = listener.accept().expect("accept");
    assert_eq!(
        accepted.connected_address().expect("peer of accepted"),
        client.local_address().expect("local of client")
    );
    assert_eq!(
        accepted.local_address().expect("local of accepted"),
        client.connected_address().expect("peer of client")
    );
}

#[test]
fn test_stream_exchange_both_ways() {
    let listener = loopback_stream_listener();
    let mut client = Socket::new(Domain::Ipv4, SocketType::Stream, 0).expect("create client");
    client
        .connect(&listener.local_address().expect("listener address"))
        .expect("connect");
    let server = listener.accept().expect("accept");

    client.send(b"Hey server, just saying hello!").expect("client send");
    let got = server.receive(0x10000).expect("server receive");
    assert_eq!(got, b"Hey server, just saying hello!".to_vec());

    server.send(b"You have reached the server.").expect("server send");
    let got = client.receive(0x10000).expect("client receive");
    assert_eq!(got, b"You have reached the server.".to_vec());
}

#[test]
fn test_byte_fidelity_one_byte_and_64k() {
    let listener = loopback_stream_listener();
    let mut client = Socket::new(Domain::Ipv4, SocketType::Stream, 0).expect("create client");
    client
        .connect(&listener.local_address().expect("listener address"))
        .expect("connect");
    let server = listener.accept().expect("accept");

    // single byte
    client.send(&[0xA5]).expect("send 1 byte");
    assert_eq!(server.receive(16).expect("receive 1 byte"), vec![0xA5]);

    // 65536 bytes; the sender thread lets the receiver drain in parallel
    let payload: Vec<u8> = (0..65536usize).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();
    let sender = std::thread::spawn(move || {
        client.send(&payload).expect("send 64k");
        client
    });

    let mut received = Vec::with_capacity(expected.len());
    while received.len() < expected.len() {
        let chunk = server.receive(8192).expect("receive chunk");
        assert!(!chunk.is_empty(), "stream closed before payload completed");
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, expected);

    sender.join().expect("sender thread");
}

#[test]
fn test_datagram_exchange_reports_source() {
    let a = bound_datagram_socket();
    let b = bound_datagram_socket();
    let b_addr = b.local_address().expect("b address");

    a.send_to(b"Check", &b_addr).expect("send_to");
    let (data, source) = b.receive_from(0x10000).expect("receive_from");
    assert_eq!(data, b"Check".to_vec());
    assert_eq!(source, a.local_address().expect("a address"));
}

#[test]
fn test_unix_stream_socket_and_path_cleanup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("echo.sock");
    let path_str = path.to_str().expect("utf-8 path");
    let addr = Address::parse(path_str, Some(Domain::Unix)).expect("parse unix path");

    let mut listener = Socket::new(Domain::Unix, SocketType::Stream, 0).expect("create listener");
    listener.bind(&addr).expect("bind unix");
    listener.listen(DEFAULT_BACKLOG).expect("listen unix");
    assert!(path.exists(), "bind must create the socket file");
    assert_eq!(listener.local_address().expect("local address"), addr);

    let mut client = Socket::new(Domain::Unix, SocketType::Stream, 0).expect("create client");
    client.connect(&addr).expect("connect unix");
    let server = listener.accept().expect("accept unix");

    client.send(b"over the filesystem").expect("send");
    assert_eq!(
        server.receive(64).expect("receive"),
        b"over the filesystem".to_vec()
    );

    drop(client);
    drop(server);
    drop(listener);
    assert!(!path.exists(), "dropping the bound listener must unlink its path");
}

#[test]
fn test_unix_pair_exchanges_both_ways() {
    let (first, second) = Socket::unix_pair(SocketType::Stream, 0).expect("socketpair");

    first.send(b"first to second").expect("send");
    assert_eq!(second.receive(64).expect("receive"), b"first to second".to_vec());

    second.send(b"second to first").expect("send");
    assert_eq!(first.receive(64).expect("receive"), b"second to first".to_vec());
}

#[test]
fn test_receive_times_out_within_bounds() {
    let sock = bound_datagram_socket();
    let timeout = Duration::from_millis(100);
    sock.set_receive_timeout(timeout).expect("set timeout");

    // The OS may round the stored value a little.
    let read_back = sock.receive_timeout().expect("read timeout back");
    assert!(read_back >= Duration::from_millis(90));
    assert!(read_back <= Duration::from_millis(150));

    let started = Instant::now();
    let result = sock.receive(0x10000);
    let elapsed = started.elapsed();

    match result {
        Err(Error::Os(os)) => assert_eq!(os.condition(), Condition::TimedOut),
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(90), "timed out early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(800), "timed out late: {:?}", elapsed);
}

#[test]
fn test_read_ready_times_out_and_wakes() {
    let receiver = bound_datagram_socket();
    let sender = bound_datagram_socket();

    let timeout = Duration::from_millis(150);
    let started = Instant::now();
    let ready = receiver.read_ready(timeout).expect("read_ready idle");
    let elapsed = started.elapsed();
    assert!(!ready, "no data was sent, socket must not be ready");
    assert!(elapsed >= Duration::from_millis(140), "returned early: {:?}", elapsed);
    assert!(elapsed <= Duration::from_millis(800), "returned late: {:?}", elapsed);

    sender
        .send_to(b"Check", &receiver.local_address().expect("receiver address"))
        .expect("send_to");
    let started = Instant::now();
    assert!(receiver.read_ready(timeout).expect("read_ready with data"));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_orderly_close_is_observable() {
    let listener = loopback_stream_listener();
    let mut client = Socket::new(Domain::Ipv4, SocketType::Stream, 0).expect("create client");
    client
        .connect(&listener.local_address().expect("listener address"))
        .expect("connect");
    let server = listener.accept().expect("accept");

    drop(server);

    // The hangup must show up as read-ready, and the following receive
    // as the zero-byte close signal rather than an error.
    assert!(client
        .read_ready(Duration::from_secs(2))
        .expect("read_ready after close"));
    let bytes = client.receive(1024).expect("receive after close");
    assert!(bytes.is_empty(), "orderly close must read as zero bytes");
}

#[test]
fn test_batch_readiness_selects_the_ready_socket() {
    let first = bound_datagram_socket();
    let second = bound_datagram_socket();
    let third = bound_datagram_socket();
    let sender = bound_datagram_socket();

    sender
        .send_to(b"Check", &second.local_address().expect("second address"))
        .expect("send_to");

    let set = [&first, &second, &third];
    let ready = read_ready_sockets(&set, Duration::from_millis(500)).expect("poll set");
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].as_raw_fd(), second.as_raw_fd());
}

#[test]
fn test_bytes_ready_counts_pending_data() {
    let receiver = bound_datagram_socket();
    let sender = bound_datagram_socket();

    assert_eq!(receiver.bytes_ready().expect("bytes_ready empty"), 0);

    sender
        .send_to(b"Check", &receiver.local_address().expect("receiver address"))
        .expect("send_to");
    assert!(receiver
        .read_ready(Duration::from_millis(500))
        .expect("wait for datagram"));
    assert_eq!(receiver.bytes_ready().expect("bytes_ready full"), 5);

    receiver.receive(16).expect("drain");
    assert_eq!(receiver.bytes_ready().expect("bytes_ready drained"), 0);
}

#[test]
fn test_socket_options_on_a_live_socket() {
    let sock = bound_datagram_socket();

    sock.set_option(OptionLevel::Socket, BoolOption::Broadcast, true)
        .expect("enable broadcast");
    assert!(sock
        .option(OptionLevel::Socket, BoolOption::Broadcast)
        .expect("read broadcast"));

    sock.set_option(OptionLevel::Socket, BoolOption::KeepAlive, true)
        .expect("enable keepalive");
    assert!(sock
        .option(OptionLevel::Socket, BoolOption::KeepAlive)
        .expect("read keepalive"));
}

#[test]
fn test_ipv6_stream_if_available() {
    // Not every environment has ::1 configured; skip quietly if not.
    let mut listener = match Socket::new(Domain::Ipv6, SocketType::Stream, 0) {
        Ok(sock) => sock,
        Err(_) => {
            println!("skipping IPv6 test - socket creation failed");
            return;
        }
    };
    let any = Address::parse("[::1]:0", Some(Domain::Ipv6)).expect("parse ::1");
    if listener.bind(&any).is_err() {
        println!("skipping IPv6 test - cannot bind ::1");
        return;
    }
    listener.listen(DEFAULT_BACKLOG).expect("listen");
    let addr = listener.local_address().expect("listener address");

    let mut client = Socket::new(Domain::Ipv6, SocketType::Stream, 0).expect("create client");
    client.connect(&addr).expect("connect");
    let server = listener.accept().expect("accept");

    client.send(b"six").expect("send");
    assert_eq!(server.receive(16).expect("receive"), b"six".to_vec());
    assert_eq!(
        server.connected_address().expect("peer").domain(),
        Some(Domain::Ipv6)
    );
}
