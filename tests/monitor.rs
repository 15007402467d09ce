use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_utils::thread::scope;
use tkvs::sink::write_samples;
use tkvs::{OpCounter, Sample, ThroughputMonitor};

fn lines(buf: &[u8]) -> Vec<String> {
    String::from_utf8(buf.to_vec())
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn idle_ticks_do_not_drain() {
    let monitor = ThroughputMonitor::new(OpCounter::new());
    for _ in 0..5 {
        monitor.counter().record();
    }
    assert_eq!(monitor.tick_at(100), None);
    assert_eq!(monitor.counter().current(), 5);
    assert!(monitor.samples().is_empty());
}

#[test]
fn start_discards_idle_operations_and_history() {
    let monitor = ThroughputMonitor::new(OpCounter::new());
    monitor.start();
    monitor.counter().record();
    monitor.tick_at(1);
    let mut out = Vec::new();
    monitor.stop(&mut out).unwrap();

    monitor.counter().record();
    monitor.counter().record();
    monitor.start();
    assert_eq!(monitor.counter().current(), 0);
    assert!(monitor.samples().is_empty());
    assert!(monitor.is_sampling());
}

#[test]
fn ticks_drain_the_counter() {
    let monitor = ThroughputMonitor::new(OpCounter::new());
    monitor.start();
    for _ in 0..3 {
        monitor.counter().record();
    }
    assert_eq!(monitor.tick_at(10), Some(Sample { timestamp: 10, count: 3 }));
    assert_eq!(monitor.tick_at(11), Some(Sample { timestamp: 11, count: 0 }));
    monitor.counter().record();
    assert_eq!(monitor.tick_at(12), Some(Sample { timestamp: 12, count: 1 }));
    assert_eq!(monitor.samples().len(), 3);
    assert_eq!(monitor.counter().current(), 0);
}

#[test]
fn stop_writes_timestamp_count_lines() {
    let monitor = ThroughputMonitor::new(OpCounter::new());
    monitor.start();
    monitor.counter().record();
    monitor.tick_at(1_600_000_000);
    monitor.counter().record();
    monitor.counter().record();
    monitor.tick_at(1_600_000_001);

    let mut out = Vec::new();
    assert_eq!(monitor.stop(&mut out).unwrap(), 2);
    assert_eq!(lines(&out), vec!["1600000000,1", "1600000001,2"]);
    assert!(!monitor.is_sampling());
    assert!(monitor.samples().is_empty());

    // stopping again flushes nothing
    let mut again = Vec::new();
    assert_eq!(monitor.stop(&mut again).unwrap(), 0);
    assert!(again.is_empty());
}

#[test]
fn stop_flushes_operations_since_last_tick() {
    let monitor = ThroughputMonitor::new(OpCounter::new());
    monitor.start();
    for _ in 0..37 {
        monitor.counter().record();
    }
    for _ in 0..5 {
        monitor.counter().record();
    }
    let mut out = Vec::new();
    assert_eq!(monitor.stop(&mut out).unwrap(), 1);
    let lines = lines(&out);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with(",42"), "{}", lines[0]);
}

#[test]
fn drain_to_keeps_sampling() {
    let monitor = ThroughputMonitor::new(OpCounter::new());
    monitor.start();
    monitor.counter().record();
    monitor.tick_at(5);
    let mut out = Vec::new();
    assert_eq!(monitor.drain_to(&mut out).unwrap(), 1);
    assert_eq!(lines(&out), vec!["5,1"]);
    assert!(monitor.is_sampling());
    assert!(monitor.samples().is_empty());
}

// accepts `accepted` writes in full, then fails every write after that
struct FailingSink {
    accepted: usize,
    written: Vec<u8>,
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.accepted == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.accepted -= 1;
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn failed_flush_is_reported_and_not_retried() {
    let monitor = ThroughputMonitor::new(OpCounter::new());
    monitor.start();
    for ts in 0..3 {
        monitor.counter().record();
        monitor.tick_at(ts);
    }
    let mut sink = FailingSink {
        accepted: 1,
        written: Vec::new(),
    };
    assert!(monitor.stop(&mut sink).is_err());
    // what made it out stays written, as whole lines
    assert_eq!(lines(&sink.written), vec!["0,1"]);
    assert!(sink.written.ends_with(b"\n"));
    assert!(monitor.samples().is_empty());
    assert!(!monitor.is_sampling());
}

// every operation recorded while sampling ends up in exactly one flushed sample
#[test]
fn counts_add_up_with_a_running_ticker() {
    let monitor = Arc::new(ThroughputMonitor::new(OpCounter::new()));
    let handle = monitor.spawn(Duration::from_millis(5)).unwrap();
    monitor.start();

    let threads = 8;
    let per_thread = 2_000;
    scope(|s| {
        for _ in 0..threads {
            let counter = monitor.counter().clone();
            s.spawn(move |_| {
                for i in 0..per_thread {
                    counter.record();
                    if i % 500 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            });
        }
    })
    .unwrap();

    let mut out = Vec::new();
    monitor.stop(&mut out).unwrap();
    handle.shutdown();

    let total: u64 = lines(&out)
        .iter()
        .map(|line| line.split(',').nth(1).unwrap().parse::<u64>().unwrap())
        .sum();
    assert_eq!(total, threads * per_thread);
}

#[test]
fn ticker_produces_samples_only_while_sampling() {
    let monitor = Arc::new(ThroughputMonitor::new(OpCounter::new()));
    let handle = monitor.spawn(Duration::from_millis(10)).unwrap();
    thread::sleep(Duration::from_millis(60));
    assert!(monitor.samples().is_empty());

    monitor.start();
    thread::sleep(Duration::from_millis(100));
    assert!(!monitor.samples().is_empty());
    drop(handle);

    let ticked = monitor.samples().len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(monitor.samples().len(), ticked);
}

#[test]
fn each_sample_line_is_written_in_one_piece() {
    let samples = [
        Sample { timestamp: 10, count: 1 },
        Sample { timestamp: 11, count: 22 },
    ];
    let mut sink = FailingSink {
        accepted: samples.len(),
        written: Vec::new(),
    };
    write_samples(&mut sink, &samples).unwrap();
    assert_eq!(lines(&sink.written), vec!["10,1", "11,22"]);
}
