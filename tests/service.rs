use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};

use tempfile::TempDir;
use tkvs::engine::{check_seed, MAX_SEED_QUANTITY, MAX_SEED_VALUE_SIZE};
use tkvs::{
    KvsEngine, KvsServer, Request, Response, SamplingAction, Service, ShardedKvStore,
    StripedKvStore, ThroughputLog,
};

fn service<E: KvsEngine>(engine: E, dir: &TempDir) -> Service<E> {
    let log = ThroughputLog::open(dir.path().join("throughput.log")).unwrap();
    Service::new(engine, log)
}

#[test]
fn store_operations_are_counted() {
    let dir = TempDir::new().unwrap();
    let service = service(StripedKvStore::new(), &dir);
    service.put(1, "a".to_owned());
    service.get(1);
    service.get(2);
    service.delete(1);
    service.delete(1);
    assert_eq!(service.counter().current(), 5);

    // seeding is not throughput
    service.seed(10, 4).unwrap();
    assert_eq!(service.counter().current(), 5);
    assert_eq!(service.engine().len(), 9);
}

#[test]
fn sampling_window_counts_every_operation() {
    let dir = TempDir::new().unwrap();
    let service = service(ShardedKvStore::new(), &dir);
    let path = dir.path().join("samples.log");

    service.start_sampling();
    for key in 0..37 {
        service.put(key, "v".to_owned());
    }
    for key in 0..5 {
        service.get(key);
    }
    assert_eq!(service.stop_sampling(Some(&path), None).unwrap(), 1);

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);
    let (timestamp, count) = lines[0].split_once(',').unwrap();
    assert!(timestamp.parse::<i64>().unwrap() > 0);
    assert_eq!(count, "42");
}

#[test]
fn stop_without_path_writes_throughput_log() {
    let dir = TempDir::new().unwrap();
    let service = service(StripedKvStore::new(), &dir);
    service.start_sampling();
    service.put(1, "a".to_owned());
    service.monitor().tick_at(77);
    service.stop_sampling(None, None).unwrap();
    service.release(Duration::from_secs(1)).unwrap();

    let contents = fs::read_to_string(dir.path().join("throughput.log")).unwrap();
    assert_eq!(contents, "77,1\n");
}

#[test]
fn stop_with_dump_writes_json_mapping() {
    let dir = TempDir::new().unwrap();
    let service = service(StripedKvStore::new(), &dir);
    let samples = dir.path().join("samples.log");
    let dump = dir.path().join("memory.json");

    service.put(2, "two".to_owned());
    service.put(10, "ten".to_owned());
    service.put(1, "one".to_owned());
    service.start_sampling();
    service.stop_sampling(Some(&samples), Some(&dump)).unwrap();

    let json = fs::read_to_string(&dump).unwrap();
    assert_eq!(json, r#"{"1":"one","2":"two","10":"ten"}"#);
    let parsed: BTreeMap<i64, String> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, service.snapshot());
}

#[test]
fn dump_keeps_sampling_running() {
    let dir = TempDir::new().unwrap();
    let service = service(ShardedKvStore::new(), &dir);
    let samples = dir.path().join("samples.log");
    let dump = dir.path().join("memory.json");

    service.start_sampling();
    service.put(1, "one".to_owned());
    service.monitor().tick_at(3);
    assert_eq!(service.dump(&dump, Some(&samples)).unwrap(), 1);

    assert!(service.monitor().is_sampling());
    assert_eq!(fs::read_to_string(&samples).unwrap(), "3,1\n");
    assert_eq!(fs::read_to_string(&dump).unwrap(), r#"{"1":"one"}"#);
}

#[test]
fn unopenable_sink_is_reported_and_store_unaffected() {
    let dir = TempDir::new().unwrap();
    let service = service(StripedKvStore::new(), &dir);
    let missing = dir.path().join("no-such-dir").join("samples.log");

    service.put(1, "a".to_owned());
    service.start_sampling();
    assert!(service.stop_sampling(Some(&missing), None).is_err());
    assert!(service.dump(&missing, None).is_err());

    assert!(service.monitor().is_sampling());
    assert_eq!(service.get(1), Some("a".to_owned()));
}

#[test]
fn writes_after_release_fail() {
    let dir = TempDir::new().unwrap();
    let service = service(StripedKvStore::new(), &dir);
    service.release(Duration::from_secs(1)).unwrap();
    service.release(Duration::from_secs(1)).unwrap();
    service.start_sampling();
    assert!(service.stop_sampling(None, None).is_err());
}

// a log writer that reports when a write starts and then blocks until the gate closes
struct StuckWriter {
    entered: Sender<()>,
    gate: Receiver<()>,
}

impl Write for StuckWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn release_gives_up_on_a_stuck_flush() {
    let (entered_tx, entered) = channel::unbounded();
    let (opener, gate) = channel::bounded::<()>(0);
    let log = ThroughputLog::from_writer(
        "stuck.log",
        StuckWriter {
            entered: entered_tx,
            gate,
        },
    );
    let service = Service::new(StripedKvStore::new(), log);
    service.start_sampling();
    service.put(1, "a".to_owned());

    let flusher = {
        let service = service.clone();
        thread::spawn(move || service.stop_sampling(None, None))
    };
    entered.recv().unwrap();

    let started = Instant::now();
    assert!(service.release(Duration::from_millis(100)).is_err());
    assert!(started.elapsed() < Duration::from_secs(5));

    drop(opener);
    assert_eq!(flusher.join().unwrap().unwrap(), 1);
    service.release(Duration::from_secs(1)).unwrap();
}

#[test]
fn throughput_log_is_truncated_at_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("throughput.log");
    fs::write(&path, "old contents\n").unwrap();
    let log = ThroughputLog::open(&path).unwrap();
    assert_eq!(log.path(), path.as_path());
    assert_eq!(fs::read_to_string(&path).unwrap(), "");
}

#[test]
fn unopenable_throughput_log_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(ThroughputLog::open(dir.path().join("missing").join("t.log")).is_err());
}

#[test]
fn dispatch_requests() {
    let dir = TempDir::new().unwrap();
    let server = KvsServer::new(service(StripedKvStore::new(), &dir));

    assert_eq!(
        server.execute(Request::Get { key: 1 }),
        Response::NotFound
    );
    assert_eq!(
        server.execute(Request::Put {
            key: 1,
            value: "a".to_owned()
        }),
        Response::Ok(None)
    );
    assert_eq!(
        server.execute(Request::Get { key: 1 }),
        Response::Ok(Some("a".to_owned()))
    );
    assert_eq!(server.execute(Request::Delete { key: 1 }), Response::Ok(None));
    assert_eq!(server.execute(Request::Delete { key: 1 }), Response::Ok(None));
    assert_eq!(
        server.execute(Request::Seed {
            quantity: 5,
            size: 3
        }),
        Response::Ok(None)
    );
    assert_eq!(server.service().engine().len(), 4);
    assert_eq!(
        server.execute(Request::Sampling(SamplingAction::Start)),
        Response::Ok(None)
    );

    let bad = dir.path().join("missing").join("samples.log");
    match server.execute(Request::Sampling(SamplingAction::Stop {
        path: Some(bad),
        dump_memory: None,
    })) {
        Response::Err(msg) => assert!(msg.contains("samples.log"), "{}", msg),
        other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn oversized_seed_is_rejected() {
    let dir = TempDir::new().unwrap();
    let server = KvsServer::new(service(StripedKvStore::new(), &dir));

    for line in &[
        r#"{"Seed":{"quantity":2,"size":1000000000000000000}}"#,
        r#"{"Seed":{"quantity":9223372036854775807,"size":1}}"#,
        r#"{"Seed":{"quantity":5000000,"size":1000}}"#,
    ] {
        match server.execute_line(line) {
            Response::Err(msg) => assert!(msg.starts_with("invalid request"), "{}", msg),
            other => panic!("unexpected response {:?} for {}", other, line),
        }
    }
    assert!(server.service().engine().is_empty());
    assert_eq!(server.service().counter().current(), 0);

    // the server keeps serving after a rejected seed
    assert_eq!(
        server.execute_line(r#"{"Seed":{"quantity":3,"size":2}}"#),
        Response::Ok(None)
    );
    assert_eq!(server.service().engine().len(), 2);
}

#[test]
fn seed_limits() {
    assert!(check_seed(MAX_SEED_QUANTITY, 1).is_ok());
    assert!(check_seed(MAX_SEED_QUANTITY + 1, 1).is_err());
    assert!(check_seed(2, MAX_SEED_VALUE_SIZE).is_ok());
    assert!(check_seed(2, MAX_SEED_VALUE_SIZE + 1).is_err());
    assert!(check_seed(-5, MAX_SEED_VALUE_SIZE).is_ok());
    assert!(check_seed(2_000, MAX_SEED_VALUE_SIZE).is_err());
}

#[test]
fn malformed_lines_are_rejected_but_counted() {
    let dir = TempDir::new().unwrap();
    let server = KvsServer::new(service(StripedKvStore::new(), &dir));

    for line in &[
        "not json",
        r#"{"Get":{"key":"abc"}}"#,
        r#"{"Put":{"key":1}}"#,
        r#"{"Nope":{}}"#,
    ] {
        match server.execute_line(line) {
            Response::Err(msg) => assert!(msg.starts_with("invalid request"), "{}", msg),
            other => panic!("unexpected response {:?} for {}", other, line),
        }
    }
    assert_eq!(server.service().counter().current(), 4);
    assert!(server.service().engine().is_empty());

    assert_eq!(
        server.execute_line(r#"{"Put":{"key":3,"value":"x"}}"#),
        Response::Ok(None)
    );
    assert_eq!(server.service().counter().current(), 5);
}
