mod support;

use sockstun::tunnel::{handle_connection, serve};
use sockstun::{Command, HandshakeMessage, RequestType, Session, SessionState, TunnelError};
use std::net::SocketAddr;
use std::time::Duration;
use support::{init_tracing, session_config, MockRelay};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const BOUND: &str = "10.0.0.5:54321";
const SUCCESS_REPLY: [u8; 10] = [0x05, 0x00, 0x00, 0x01, 10, 0, 0, 5, 212, 49];

fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

fn domain_connect(domain: &str, port: u16) -> Vec<u8> {
    let mut frame = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    frame.extend_from_slice(domain.as_bytes());
    frame.extend_from_slice(&port.to_be_bytes());
    frame
}

async fn greet<S: AsyncRead + AsyncWrite + Unpin>(app: &mut S) {
    app.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    app.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
}

#[tokio::test]
async fn domain_connect_is_tunneled_and_echoed() {
    init_tracing();
    let relay = MockRelay::new(BOUND);
    let session = Session::new(session_config(Duration::from_secs(3600)), relay.dialer());
    session.login().await.unwrap();

    let (mut app, local) = tokio::io::duplex(4096);
    let handler = tokio::spawn(handle_connection(session.clone(), local, peer()));

    greet(&mut app).await;
    app.write_all(&domain_connect("test.local", 80)).await.unwrap();

    let mut reply = [0u8; 10];
    app.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, SUCCESS_REPLY);

    let handshakes = relay.handshakes();
    assert_eq!(handshakes.len(), 2);
    assert_eq!(handshakes[0], HandshakeMessage::login("test-key"));
    assert_eq!(
        handshakes[1],
        HandshakeMessage::connection(RequestType::Tcp, "test.local:80")
    );

    app.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    app.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");

    drop(app);
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn payload_pipelined_after_command_reaches_the_tunnel() {
    init_tracing();
    let relay = MockRelay::new(BOUND);
    let session = Session::new(session_config(Duration::from_secs(3600)), relay.dialer());
    session.login().await.unwrap();

    let (mut app, local) = tokio::io::duplex(4096);
    let handler = tokio::spawn(handle_connection(session.clone(), local, peer()));

    greet(&mut app).await;
    let mut frame = vec![0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x01, 0xbb];
    frame.extend_from_slice(b"early");
    app.write_all(&frame).await.unwrap();

    let mut reply = [0u8; 10];
    app.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, SUCCESS_REPLY);

    let mut echoed = [0u8; 5];
    app.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"early");
    assert_eq!(
        relay.handshakes()[1],
        HandshakeMessage::connection(RequestType::Tcp, "93.184.216.34:443")
    );

    drop(app);
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn udp_associate_uses_udp_request_type() {
    init_tracing();
    let relay = MockRelay::new(BOUND);
    let session = Session::new(session_config(Duration::from_secs(3600)), relay.dialer());
    session.login().await.unwrap();

    let (mut app, local) = tokio::io::duplex(4096);
    let handler = tokio::spawn(handle_connection(session.clone(), local, peer()));

    greet(&mut app).await;
    let mut frame = vec![0x05, 0x03, 0x00, 0x04];
    frame.extend_from_slice(&[0u8; 15]);
    frame.push(1);
    frame.extend_from_slice(&53u16.to_be_bytes());
    app.write_all(&frame).await.unwrap();

    let mut reply = [0u8; 10];
    app.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, SUCCESS_REPLY);
    assert_eq!(
        relay.handshakes()[1],
        HandshakeMessage::connection(RequestType::Udp, "[::1]:53")
    );

    drop(app);
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn bind_closes_without_reply_or_handshake() {
    init_tracing();
    let relay = MockRelay::new(BOUND);
    let session = Session::new(session_config(Duration::from_secs(3600)), relay.dialer());
    session.login().await.unwrap();

    let (mut app, local) = tokio::io::duplex(4096);
    let handler = tokio::spawn(handle_connection(session.clone(), local, peer()));

    greet(&mut app).await;
    app.write_all(&[0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
        .await
        .unwrap();

    let err = handler.await.unwrap().unwrap_err();
    assert!(
        matches!(err, TunnelError::UnsupportedCommand(Command::Bind)),
        "{err:?}"
    );

    let mut rest = Vec::new();
    app.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
    assert_eq!(relay.handshakes().len(), 1);
}

#[tokio::test]
async fn rejected_connection_closes_local_and_relogs_in() {
    init_tracing();
    let relay = MockRelay::new(BOUND);
    relay.set_connect_status(1);
    let session = Session::new(session_config(Duration::from_secs(3600)), relay.dialer());
    assert_eq!(session.login().await.unwrap(), 1);

    let (mut app, local) = tokio::io::duplex(4096);
    let handler = tokio::spawn(handle_connection(session.clone(), local, peer()));

    greet(&mut app).await;
    app.write_all(&domain_connect("test.local", 80)).await.unwrap();

    let err = handler.await.unwrap().unwrap_err();
    match err {
        TunnelError::ConnectionRejected { url, status } => {
            assert_eq!(url, "test.local:80");
            assert_eq!(status, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let mut rest = Vec::new();
    app.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    assert!(relay.wait_for_logins(2, Duration::from_secs(2)).await);
    for _ in 0..200 {
        if session.epoch().await == 2 && session.state().await == SessionState::Connected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session never re-logged in");
}

#[tokio::test]
async fn accept_loop_survives_a_bad_client() {
    init_tracing();
    let relay = MockRelay::new(BOUND);
    let session = Session::new(session_config(Duration::from_secs(3600)), relay.dialer());
    session.login().await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(session.clone(), listener));

    let mut bad = TcpStream::connect(addr).await.unwrap();
    greet(&mut bad).await;
    bad.write_all(&[0x05, 0x01, 0x00, 0x07, 0, 0]).await.unwrap();
    let mut rest = Vec::new();
    let _ = bad.read_to_end(&mut rest).await;
    assert!(rest.is_empty());

    let mut good = TcpStream::connect(addr).await.unwrap();
    greet(&mut good).await;
    good.write_all(&domain_connect("example.com", 443))
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    good.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, SUCCESS_REPLY);

    good.write_all(b"hello over tcp").await.unwrap();
    let mut echoed = [0u8; 14];
    good.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello over tcp");

    server.abort();
}
