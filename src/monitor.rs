//! Operation rate sampling.
//!
//! Request handlers bump an [`OpCounter`] once per completed operation. A background thread
//! ticks once per period and, while sampling is enabled, drains the counter into a timestamped
//! [`Sample`]. The request path only ever touches atomics; the sample sequence has its own
//! mutex that is shared by the ticking thread and the start/stop control calls.
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam::channel::{self, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::Result;

/// the production sampling period
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// A count of completed operations, shared by every request handler and the monitor
#[derive(Clone, Debug, Default)]
pub struct OpCounter(Arc<AtomicU64>);

impl OpCounter {
    /// creates a counter starting at zero
    pub fn new() -> Self {
        OpCounter::default()
    }

    /// records one completed operation
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// reads the current count and resets it to zero in one atomic step
    pub fn drain(&self) -> u64 {
        self.0.swap(0, Ordering::AcqRel)
    }

    /// the current count, without resetting it
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// the number of operations counted during one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// seconds since the unix epoch at the time of the tick
    pub timestamp: i64,
    /// operations drained from the counter at that tick
    pub count: u64,
}

/// Samples the throughput of an [`OpCounter`].
///
/// The monitor is `Idle` until [`start`](ThroughputMonitor::start) is called and returns to
/// `Idle` on [`stop`](ThroughputMonitor::stop). Ticks that happen while idle leave the counter
/// untouched.
#[derive(Debug)]
pub struct ThroughputMonitor {
    counter: OpCounter,
    sampling: AtomicBool,
    samples: Mutex<Vec<Sample>>,
}

impl ThroughputMonitor {
    /// creates an idle monitor over `counter`
    pub fn new(counter: OpCounter) -> Self {
        ThroughputMonitor {
            counter,
            sampling: AtomicBool::new(false),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// the counter this monitor drains
    pub fn counter(&self) -> &OpCounter {
        &self.counter
    }

    /// `true` while sampling is enabled
    pub fn is_sampling(&self) -> bool {
        self.sampling.load(Ordering::Acquire)
    }

    /// clears previously collected samples, discards whatever the counter accumulated while
    /// idle and enables sampling
    pub fn start(&self) {
        let mut samples = self.samples.lock();
        samples.clear();
        let discarded = self.counter.drain();
        self.sampling.store(true, Ordering::Release);
        info!(discarded, "throughput sampling started");
    }

    /// the body of one tick, stamped with `timestamp`.
    ///
    /// Returns the sample that was recorded, or `None` if sampling is disabled.
    pub fn tick_at(&self, timestamp: i64) -> Option<Sample> {
        let mut samples = self.samples.lock();
        if !self.is_sampling() {
            return None;
        }
        let sample = Sample {
            timestamp,
            count: self.counter.drain(),
        };
        samples.push(sample);
        Some(sample)
    }

    /// one tick stamped with the current wall clock time
    pub fn tick(&self) -> Option<Sample> {
        self.tick_at(Utc::now().timestamp())
    }

    /// a copy of the samples collected so far
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }

    /// Disables sampling and flushes every collected sample to `sink`, one `timestamp,count`
    /// line each.
    ///
    /// Operations counted since the last tick are appended as a final sample so that the
    /// flushed counts add up to every operation recorded while sampling. The sequence is
    /// cleared whether or not the write succeeds; a failed write is not retried.
    ///
    /// Returns the number of samples flushed.
    pub fn stop<W: Write>(&self, sink: &mut W) -> Result<usize> {
        let mut samples = self.samples.lock();
        let was_sampling = self.sampling.swap(false, Ordering::AcqRel);
        if was_sampling {
            let count = self.counter.drain();
            if count > 0 {
                samples.push(Sample {
                    timestamp: Utc::now().timestamp(),
                    count,
                });
            }
        }
        let flushed = std::mem::take(&mut *samples);
        drop(samples);

        info!(samples = flushed.len(), "throughput sampling stopped");
        crate::sink::write_samples(sink, &flushed)?;
        Ok(flushed.len())
    }

    /// Flushes and clears the collected samples without changing whether sampling is enabled.
    ///
    /// Returns the number of samples flushed.
    pub fn drain_to<W: Write>(&self, sink: &mut W) -> Result<usize> {
        let flushed = std::mem::take(&mut *self.samples.lock());
        crate::sink::write_samples(sink, &flushed)?;
        Ok(flushed.len())
    }

    /// Spawns the ticking thread. It ticks every `period` until the returned handle is shut
    /// down or dropped.
    pub fn spawn(self: &Arc<Self>, period: Duration) -> Result<MonitorHandle> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let monitor = Arc::clone(self);
        let thread = thread::Builder::new()
            .name("throughput-monitor".into())
            .spawn(move || {
                let ticker = channel::tick(period);
                run_ticks(&monitor, &ticker, &stop_rx);
            })?;
        debug!(?period, "throughput monitor spawned");
        Ok(MonitorHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

#[instrument(skip_all)]
fn run_ticks(
    monitor: &ThroughputMonitor,
    ticker: &channel::Receiver<std::time::Instant>,
    stop: &channel::Receiver<()>,
) {
    loop {
        select! {
            recv(ticker) -> _ => {
                if let Some(sample) = monitor.tick() {
                    debug!(timestamp = sample.timestamp, count = sample.count, "tick");
                }
            }
            recv(stop) -> _ => {
                debug!("throughput monitor exiting");
                return;
            }
        }
    }
}

/// Owns the monitor's ticking thread
#[derive(Debug)]
pub struct MonitorHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// stops the ticking thread and waits for it to exit
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        // dropping the sender disconnects the channel, which wakes the select
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("throughput monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.halt();
    }
}
