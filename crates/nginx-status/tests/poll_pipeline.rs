//! End-to-end poller tests.
//!
//! Runs a real `StatusInput` against a throwaway HTTP server on
//! `127.0.0.1` and checks what reaches the sink.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use nginx_status::{EventTime, LifecycleError, LifecycleState, MemorySink, Record, Sink, StatusInput};

const BODY: &str =
    "Active connections: 3 \naccepted handled total \n5 5 10 \nReading: 0 Writing: 1 Waiting: 2";

struct StubServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    accepted: mpsc::Receiver<()>,
}

/// Serve `BODY` with the given status line, pausing `delay` before each reply.
fn start_stub(status: &'static str, delay: Duration) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to random port");
    let addr = listener.local_addr().expect("local addr");
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let (tx, accepted) = mpsc::channel();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
            std::thread::sleep(delay);
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{BODY}",
                BODY.len()
            );
            let _ = stream.write_all(reply.as_bytes());
        }
    });

    StubServer {
        addr,
        hits,
        accepted,
    }
}

fn raw_config(addr: SocketAddr, extra: &str) -> toml::Table {
    let src = format!(
        "host = \"{}\"\nport = {}\ninterval = 0.05\nserver_name = \"host1\"\n{extra}",
        addr.ip(),
        addr.port()
    );
    toml::from_str(&src).unwrap()
}

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn combined_record_reaches_sink() {
    let server = start_stub("200 OK", Duration::ZERO);
    let sink = Arc::new(MemorySink::new());
    let mut input = StatusInput::configure(&raw_config(server.addr, ""), sink.clone()).unwrap();

    input.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || !sink.is_empty()));
    input.shutdown().unwrap();

    let events = sink.events();
    let first = &events[0];
    assert_eq!(first.tag, "nginx.status");
    assert_eq!(
        serde_json::to_value(&first.record).unwrap(),
        serde_json::json!({
            "active": 3, "accepted": 5, "handled": 5, "total": 10,
            "reading": 0, "writing": 1, "waiting": 2,
            "tag": "nginx.status", "server": "host1",
        })
    );
    // One record per tick, nothing batched.
    assert_eq!(sink.batches(), 0);
}

#[test]
fn multi_events_emit_seven_records_per_tick() {
    let server = start_stub("200 OK", Duration::ZERO);
    let sink = Arc::new(MemorySink::new());
    let mut input =
        StatusInput::configure(&raw_config(server.addr, "multi_events = true"), sink.clone()).unwrap();

    input.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || sink.len() >= 7));
    input.shutdown().unwrap();

    let events = sink.events();
    assert_eq!(events.len() % 7, 0, "partial batch emitted");
    let first_tick = &events[..7];
    let names: Vec<&str> = first_tick
        .iter()
        .map(|e| e.record.metrics()[0].0.name())
        .collect();
    assert_eq!(
        names,
        ["active", "accepted", "handled", "total", "reading", "writing", "waiting"]
    );
    assert!(first_tick.iter().all(|e| e.time == first_tick[0].time));
}

#[test]
fn ticks_emit_in_order() {
    let server = start_stub("200 OK", Duration::ZERO);
    let sink = Arc::new(MemorySink::new());
    let mut input =
        StatusInput::configure(&raw_config(server.addr, "multi_events = true"), sink.clone()).unwrap();

    input.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || sink.len() >= 21));
    input.shutdown().unwrap();

    // Every tick lands as one contiguous active..waiting run; no two ticks interleave.
    let events = sink.events();
    assert_eq!(events.len() % 7, 0, "partial tick in {} records", events.len());
    assert_eq!(sink.batches(), events.len() / 7);
    for (n, tick) in events.chunks(7).enumerate() {
        let names: Vec<&str> = tick
            .iter()
            .map(|e| {
                assert_eq!(e.record.metrics().len(), 1);
                e.record.metrics()[0].0.name()
            })
            .collect();
        assert_eq!(
            names,
            ["active", "accepted", "handled", "total", "reading", "writing", "waiting"],
            "tick {n}"
        );
        assert!(tick.iter().all(|e| e.time == tick[0].time), "tick {n} spans two timestamps");
    }
    assert!(events.windows(2).all(|w| w[0].time <= w[1].time));
}

#[test]
fn non_200_status_emits_nothing_and_keeps_polling() {
    let server = start_stub("503 Service Unavailable", Duration::ZERO);
    let sink = Arc::new(MemorySink::new());
    let mut input = StatusInput::configure(&raw_config(server.addr, ""), sink.clone()).unwrap();

    input.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || server.hits.load(Ordering::SeqCst) >= 3));
    assert!(input.is_running());
    input.shutdown().unwrap();

    assert!(sink.is_empty());
}

#[test]
fn shutdown_waits_for_in_flight_tick() {
    let server = start_stub("200 OK", Duration::from_millis(300));
    let sink = Arc::new(MemorySink::new());
    let mut input = StatusInput::configure(&raw_config(server.addr, ""), sink.clone()).unwrap();

    input.start().unwrap();
    server
        .accepted
        .recv_timeout(Duration::from_secs(5))
        .expect("first tick reached the server");

    let started = Instant::now();
    input.shutdown().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200), "shutdown did not wait");
    assert_eq!(input.state(), LifecycleState::Stopped);

    // The in-flight tick completed and emitted before shutdown returned.
    assert_eq!(sink.len(), 1);
    let hits = server.hits.load(Ordering::SeqCst);
    assert_eq!(hits, 1);

    // No tick starts afterwards.
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(server.hits.load(Ordering::SeqCst), hits);
    assert_eq!(sink.len(), 1);
}

struct PanickingSink;

impl Sink for PanickingSink {
    fn emit(&self, _tag: &str, _time: EventTime, _record: Record) {
        panic!("sink exploded");
    }

    fn emit_stream(&self, _tag: &str, _events: Vec<(EventTime, Record)>) {
        panic!("sink exploded");
    }
}

#[test]
fn dead_poller_thread_is_reported() {
    let server = start_stub("200 OK", Duration::ZERO);
    let mut input =
        StatusInput::configure(&raw_config(server.addr, ""), Arc::new(PanickingSink)).unwrap();

    input.start().unwrap();
    assert!(wait_for(Duration::from_secs(5), || !input.is_running()));
    assert_eq!(input.state(), LifecycleState::Running);

    match input.shutdown() {
        Err(LifecycleError::Panicked(reason)) => assert!(reason.contains("sink exploded")),
        other => panic!("expected panicked thread, got {other:?}"),
    }
    assert_eq!(input.state(), LifecycleState::Stopped);
}
