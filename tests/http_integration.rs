//! Integration tests for the HTTP layer
//!
//! These drive `HttpConnection` over the real `TcpTransport` against small
//! blocking servers on `std::net::TcpListener`.

use pollhttp::http::chunked::encode_chunked_body;
use pollhttp::http::{CompletedResponse, ConnectionConfig, HttpConnection, HttpRequest, OutboundRequest};
use pollhttp::net::tls::TlsConfig;
use pollhttp::net::{TcpTransport, TcpTransportConfig};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

fn client() -> (TcpTransport, Arc<HttpConnection<u32>>) {
    init_tracing();

    let transport = TcpTransport::new(
        TcpTransportConfig::builder()
            .poll_interval(Duration::from_millis(10))
            .build(),
    );
    let client = Arc::new(HttpConnection::new(
        Arc::new(transport.clone()),
        ConnectionConfig::default(),
    ));
    transport.set_listener(&client);

    (transport, client)
}

fn wait_for_response(client: &HttpConnection<u32>) -> CompletedResponse<u32> {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        if let Some(response) = client.try_take_completed() {
            return response;
        }
        assert!(Instant::now() < deadline, "timed out waiting for a response");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Read one request head (these tests never send bodies)
fn read_request<S: Read>(stream: &mut S) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).unwrap();
        assert!(n > 0, "client closed before sending a full request");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Reply to one request with `fragments`, pausing between writes
fn write_fragments<S: Write>(stream: &mut S, fragments: &[&[u8]]) {
    for fragment in fragments {
        stream.write_all(fragment).unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(20));
    }
}

fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn get(port: u16, uri: &str, tag: u32) -> OutboundRequest<u32> {
    let payload = HttpRequest::get("127.0.0.1", uri).to_wire();
    OutboundRequest::new(payload, "127.0.0.1", port, tag)
}

#[test]
fn test_content_length_response() {
    let (listener, port) = listener();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        assert!(request.starts_with("GET /hello HTTP/1.1\r\nHost: 127.0.0.1\r\n"));

        write_fragments(
            &mut stream,
            &[b"HTTP/1.1 200 OK\r\nContent-Le", b"ngth: 11\r\n\r\nhello", b" world"],
        );
        // Hold the connection open until the client is done
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let (transport, client) = client();
    client.submit(get(port, "/hello", 7)).unwrap();

    let response = wait_for_response(&client);
    assert_eq!(*response.user_context(), 7);
    assert_eq!(response.host(), "127.0.0.1");
    assert_eq!(response.address().port(), port);
    assert_eq!(response.status().map(|s| s.code()), Some(200));
    assert_eq!(response.body(), b"hello world");
    assert!(!client.is_busy());

    transport.shutdown();
    server.join().unwrap();
}

#[test]
fn test_chunked_response() {
    let (listener, port) = listener();
    let body: Vec<u8> = (0..2000u32).map(|i| b'a' + (i % 26) as u8).collect();
    let expected = body.clone();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);

        let mut raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        raw.extend(encode_chunked_body(&body, 300).unwrap());
        let fragments: Vec<&[u8]> = raw.chunks(257).collect();
        write_fragments(&mut stream, &fragments);

        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let (transport, client) = client();
    client.submit(get(port, "/chunked", 1)).unwrap();

    let response = wait_for_response(&client);
    assert!(response.is_chunked());
    assert_eq!(response.body(), &expected[..]);

    transport.shutdown();
    server.join().unwrap();
}

#[test]
fn test_close_mid_response_delivers_partial_body() {
    let (listener, port) = listener();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);
        write_fragments(
            &mut stream,
            &[b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n", b"partial"],
        );
        // Dropping the stream closes the connection
    });

    let (_transport, client) = client();
    client.submit(get(port, "/truncated", 3)).unwrap();

    let response = wait_for_response(&client);
    assert_eq!(*response.user_context(), 3);
    assert_eq!(response.body(), b"partial");
    assert_eq!(response.headers().and_then(|h| h.content_length()), Some(100));

    server.join().unwrap();
}

#[test]
fn test_requests_share_one_connection() {
    let (listener, port) = listener();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut uris = Vec::new();
        for _ in 0..3 {
            let request = read_request(&mut stream);
            let uri = request.split(' ').nth(1).unwrap().to_string();
            let body = format!("you asked for {}", uri);
            let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
            stream.write_all(response.as_bytes()).unwrap();
            uris.push(uri);
        }
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        uris
    });

    let (transport, client) = client();
    for tag in 1..=3 {
        client.submit(get(port, &format!("/{}", tag), tag)).unwrap();
    }

    for tag in 1..=3 {
        let response = wait_for_response(&client);
        assert_eq!(*response.user_context(), tag);
        assert_eq!(response.body(), format!("you asked for /{}", tag).as_bytes());
    }

    transport.shutdown();
    assert_eq!(server.join().unwrap(), vec!["/1", "/2", "/3"]);
}

#[test]
fn test_close_dispatches_request_waiting_for_idle_connection() {
    let (listener_a, port_a) = listener();
    let (listener_b, port_b) = listener();
    let (received_tx, received_rx) = mpsc::channel();
    let (close_tx, close_rx) = mpsc::channel::<()>();

    let server_a = thread::spawn(move || {
        let (mut stream, _) = listener_a.accept().unwrap();
        read_request(&mut stream);
        received_tx.send(()).unwrap();
        // Close without answering once told to
        let _ = close_rx.recv();
    });
    let server_b = thread::spawn(move || {
        let (mut stream, _) = listener_b.accept().unwrap();
        for body in ["first", "second"] {
            read_request(&mut stream);
            let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
            stream.write_all(response.as_bytes()).unwrap();
        }
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let (transport, client) = client();

    // Leave the connection to B open and idle
    client.submit(get(port_b, "/b0", 1)).unwrap();
    assert_eq!(wait_for_response(&client).body(), b"first");

    client.submit(get(port_a, "/a1", 2)).unwrap();
    received_rx.recv_timeout(TIMEOUT).unwrap();

    // A1 is in flight, so B1 waits in pending despite B being open
    client.submit(get(port_b, "/b1", 3)).unwrap();
    assert_eq!(client.pending_count(), 1);

    close_tx.send(()).unwrap();
    server_a.join().unwrap();

    let a1 = wait_for_response(&client);
    assert_eq!(*a1.user_context(), 2);
    assert!(a1.body().is_empty());

    let b1 = wait_for_response(&client);
    assert_eq!(*b1.user_context(), 3);
    assert_eq!(b1.body(), b"second");
    assert!(!client.is_busy());

    transport.shutdown();
    server_b.join().unwrap();
}

#[test]
fn test_failed_connect_drops_request() {
    // Bind and release a port so nothing listens on it
    let (listener, port) = listener();
    drop(listener);

    let (_transport, client) = client();
    client.submit(get(port, "/", 1)).unwrap();

    let deadline = Instant::now() + TIMEOUT;
    while client.is_busy() {
        assert!(Instant::now() < deadline, "request was not dropped");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!client.has_response());
}

#[test]
fn test_tls_request() {
    let (listener, port) = listener();
    let tls = TlsConfig::server_self_signed("localhost").unwrap();

    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let mut stream = tls.accept(tcp).unwrap();
        let request = read_request(&mut stream);
        assert!(request.starts_with("GET /secure HTTP/1.1\r\n"));

        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nsecret")
            .unwrap();
        stream.flush().unwrap();

        let mut buf = [0u8; 64];
        let _ = stream.read(&mut buf);
    });

    let (transport, client) = client();
    client.submit(get(port, "/secure", 9).use_tls(true)).unwrap();

    let response = wait_for_response(&client);
    assert_eq!(*response.user_context(), 9);
    assert_eq!(response.body(), b"secret");

    transport.shutdown();
    server.join().unwrap();
}
