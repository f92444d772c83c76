use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use painter_remote::script::extract_request;
use painter_remote::{
    wait_until_ready, Dispatch, DispatchRequest, HttpTransport, ReadinessConfig, ReadinessPhase,
    ScriptDispatcher, ScriptLanguage, Transport, TransportError,
};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

struct Recorded {
    path: String,
    body: Value,
}

fn read_request(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    let header_end = loop {
        let n = stream.read(&mut buf).expect("read request");
        assert!(n > 0, "client closed before headers");
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    while data.len() < header_end + content_length {
        let n = stream.read(&mut buf).expect("read body");
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    (head, data[header_end..].to_vec())
}

/// Serves `responses` in order, one connection each, and reports what it saw.
fn spawn_remote(
    responses: Vec<(u16, String)>,
) -> (u16, mpsc::Receiver<Recorded>, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().expect("accept");
            let (head, payload) = read_request(&mut stream);
            let path = head
                .lines()
                .next()
                .unwrap_or_default()
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string();
            let body_json = serde_json::from_slice(&payload).unwrap_or(Value::Null);
            let _ = tx.send(Recorded {
                path,
                body: body_json,
            });
            let reason = if status == 200 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).expect("write response");
        }
    });
    (port, rx, handle)
}

/// Accepts connections and holds them open without ever answering.
fn spawn_silent_remote() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => held.push(stream),
                Err(_) => break,
            }
        }
    });
    port
}

#[test]
fn execute_posts_base64_payload_and_returns_text() {
    let (port, rx, handle) = spawn_remote(vec![(200, "2".to_string())]);
    let transport = HttpTransport::new("127.0.0.1", port).expect("transport");

    let text = transport
        .execute(ScriptLanguage::Python, "1+1", Duration::from_secs(5))
        .expect("execute");
    handle.join().expect("server");

    assert_eq!(text, "2");
    let seen = rx.recv().expect("request recorded");
    assert_eq!(seen.path, "/run.json");
    let object = seen.body.as_object().expect("json body");
    assert_eq!(object.len(), 1);
    let encoded = object.get("python").and_then(Value::as_str).expect("python key");
    assert_eq!(STANDARD.decode(encoded).expect("b64"), b"1+1");
}

#[test]
fn check_alive_uses_secondary_language_with_empty_payload() {
    let (port, rx, handle) = spawn_remote(vec![(200, String::new())]);
    let transport = HttpTransport::new("127.0.0.1", port).expect("transport");

    transport.check_alive().expect("alive");
    handle.join().expect("server");

    let seen = rx.recv().expect("request recorded");
    assert_eq!(seen.body, json!({ "js": "" }));
}

#[test]
fn non_success_status_is_a_transport_error() {
    let (port, _rx, handle) = spawn_remote(vec![(500, "boom".to_string())]);
    let transport = HttpTransport::new("127.0.0.1", port).expect("transport");

    let err = transport
        .execute(ScriptLanguage::JavaScript, "x", Duration::from_secs(5))
        .expect_err("status error");
    handle.join().expect("server");

    match err {
        TransportError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn refused_connection_is_a_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let transport = HttpTransport::new("127.0.0.1", port).expect("transport");
    let err = transport.check_alive().expect_err("nothing listening");
    assert!(matches!(err, TransportError::Request { .. }), "got {err}");
}

#[test]
fn readiness_passes_both_phases_against_live_endpoint() {
    let (port, _rx, handle) = spawn_remote(vec![(200, String::new()), (200, "2".to_string())]);
    let transport = HttpTransport::new("127.0.0.1", port).expect("transport");
    let config = ReadinessConfig {
        transport_budget: Duration::from_secs(5),
        execution_budget: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        execution_timeout: Duration::from_secs(5),
    };

    let report = wait_until_ready(&transport, &config).expect("ready");
    handle.join().expect("server");

    assert_eq!(report.transport.attempts, 1);
    assert_eq!(report.execution.attempts, 1);
}

#[test]
fn dispatcher_round_trip_decodes_double_encoded_reply() {
    let reply = json!({ "ok": true, "op": "job_poll", "result": { "status": "running" } });
    let double_encoded = serde_json::to_string(&reply.to_string()).expect("encode");
    let (port, rx, handle) = spawn_remote(vec![(200, double_encoded)]);
    let dispatcher =
        ScriptDispatcher::new(HttpTransport::new("127.0.0.1", port).expect("transport"));

    let request = DispatchRequest::new("job_poll", json!({ "job_id": "job-1" }));
    let reply = dispatcher
        .dispatch(&request, Duration::from_secs(5))
        .expect("dispatch");
    handle.join().expect("server");

    let result = reply.into_result().expect("remote ok");
    assert_eq!(result["status"], "running");

    let seen = rx.recv().expect("request recorded");
    let encoded = seen.body["python"].as_str().expect("python payload");
    let script = String::from_utf8(STANDARD.decode(encoded).expect("b64")).expect("utf8");
    assert_eq!(extract_request(&script), Some(request));
}

#[test]
fn silent_endpoint_is_classified_as_timeout() {
    let port = spawn_silent_remote();
    let transport = HttpTransport::new("127.0.0.1", port).expect("transport");

    let start = Instant::now();
    let err = transport
        .check_alive_within(Duration::from_millis(200))
        .expect_err("no reply");

    assert!(err.is_timeout(), "got {err}");
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn readiness_against_silent_endpoint_respects_budget() {
    let port = spawn_silent_remote();
    let transport = HttpTransport::new("127.0.0.1", port).expect("transport");
    let budget = Duration::from_millis(200);
    let interval = Duration::from_millis(50);
    let config = ReadinessConfig {
        transport_budget: budget,
        execution_budget: budget,
        poll_interval: interval,
        execution_timeout: Duration::from_secs(15),
    };

    let start = Instant::now();
    let err = wait_until_ready(&transport, &config).expect_err("never ready");
    let elapsed = start.elapsed();

    assert_eq!(err.phase(), ReadinessPhase::Transport);
    assert!(
        elapsed <= budget + interval + Duration::from_millis(500),
        "took {elapsed:?}"
    );
}
