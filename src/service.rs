use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::engine::check_seed;
use crate::monitor::{MonitorHandle, OpCounter, ThroughputMonitor};
use crate::sink::{dump_to_path, open_sink};
use crate::{KvsEngine, KvsError, Result};

/// The throughput log the server flushes samples into when a request names no other file.
///
/// The file is opened (and truncated) once, at startup, and stays open until it is released
/// at shutdown.
pub struct ThroughputLog {
    path: PathBuf,
    writer: Mutex<Option<LogWriter>>,
}

type LogWriter = Box<dyn Write + Send>;

impl fmt::Debug for ThroughputLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThroughputLog")
            .field("path", &self.path)
            .finish()
    }
}

impl ThroughputLog {
    /// opens the log at `path`
    ///
    /// # Errors
    /// returns [`KvsError::Sink`] if the file cannot be created
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let writer = open_sink(&path)?;
        Ok(ThroughputLog::from_writer(path, writer))
    }

    /// a log that writes into `writer`, reporting errors against `path`
    pub fn from_writer(path: impl Into<PathBuf>, writer: impl Write + Send + 'static) -> Self {
        ThroughputLog {
            path: path.into(),
            writer: Mutex::new(Some(Box::new(writer))),
        }
    }

    /// where the log lives
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// runs `f` against the open log file
    fn with_writer<T>(&self, f: impl FnOnce(&mut LogWriter) -> Result<T>) -> Result<T> {
        let mut writer = self.writer.lock();
        match writer.as_mut() {
            Some(writer) => f(writer).map_err(|e| with_path(&self.path, e)),
            None => Err(KvsError::sink(
                &self.path,
                io::Error::new(io::ErrorKind::Other, "throughput log already closed"),
            )),
        }
    }

    /// Flushes and closes the log. Releasing twice is harmless.
    ///
    /// # Errors
    /// returns [`KvsError::Sink`] if the log is still busy with a flush after `timeout`, in which
    /// case it stays open
    pub fn release(&self, timeout: Duration) -> Result<()> {
        let mut writer = self.writer.try_lock_for(timeout).ok_or_else(|| {
            KvsError::sink(
                &self.path,
                io::Error::new(io::ErrorKind::TimedOut, "throughput log still busy"),
            )
        })?;
        if let Some(mut writer) = writer.take() {
            writer.flush().map_err(|e| KvsError::sink(&self.path, e))?;
            debug!("closed throughput log {:?}", self.path);
        }
        Ok(())
    }
}

/// The service context shared by every connection handler.
///
/// It is built once at startup and cloned into each handler. It holds the store, the operation
/// counter and monitor that measure it, and the throughput log the monitor flushes into.
/// Nothing in it is process global.
#[derive(Debug)]
pub struct Service<E: KvsEngine> {
    engine: E,
    monitor: Arc<ThroughputMonitor>,
    log: Arc<ThroughputLog>,
}

impl<E: KvsEngine> Clone for Service<E> {
    fn clone(&self) -> Self {
        Service {
            engine: self.engine.clone(),
            monitor: Arc::clone(&self.monitor),
            log: Arc::clone(&self.log),
        }
    }
}

impl<E: KvsEngine> Service<E> {
    /// creates a service over `engine`, with a fresh counter and an idle monitor
    pub fn new(engine: E, log: ThroughputLog) -> Self {
        Service {
            engine,
            monitor: Arc::new(ThroughputMonitor::new(OpCounter::new())),
            log: Arc::new(log),
        }
    }

    /// the underlying storage engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// the throughput monitor measuring this service
    pub fn monitor(&self) -> &Arc<ThroughputMonitor> {
        &self.monitor
    }

    /// the counter every store operation is recorded in
    pub fn counter(&self) -> &OpCounter {
        self.monitor.counter()
    }

    /// starts the monitor's ticking thread
    pub fn spawn_monitor(&self, period: Duration) -> Result<MonitorHandle> {
        self.monitor.spawn(period)
    }

    /// reads `key`, recording one operation
    pub fn get(&self, key: i64) -> Option<String> {
        let value = self.engine.get(key);
        self.counter().record();
        value
    }

    /// writes `key`, recording one operation
    pub fn put(&self, key: i64, value: String) {
        self.engine.put(key, value);
        self.counter().record();
    }

    /// deletes `key`, recording one operation
    pub fn delete(&self, key: i64) {
        self.engine.delete(key);
        self.counter().record();
    }

    /// records one operation that was attempted but rejected before reaching the store
    pub fn reject(&self) {
        self.counter().record();
    }

    /// bulk generates entries. Seeding is not counted as throughput
    ///
    /// # Errors
    /// returns [`KvsError::InvalidRequest`] and leaves the store untouched if the seed is larger
    /// than the seed limits allow
    pub fn seed(&self, quantity: i64, size: usize) -> Result<()> {
        check_seed(quantity, size)?;
        self.engine.seed(quantity, size);
        info!(quantity, size, entries = self.engine.len(), "store seeded");
        Ok(())
    }

    /// a point in time copy of the store
    pub fn snapshot(&self) -> BTreeMap<i64, String> {
        self.engine.snapshot()
    }

    /// clears collected samples and starts sampling
    pub fn start_sampling(&self) {
        self.monitor.start();
    }

    /// Stops sampling and flushes the samples to `path`, or to the throughput log if `path` is
    /// `None`. When `dump_memory` is given the store is also dumped there.
    ///
    /// Returns the number of samples flushed.
    ///
    /// # Errors
    /// If `path` cannot be created sampling keeps running and nothing is flushed. Write
    /// failures are returned as they happen and are not retried.
    pub fn stop_sampling(&self, path: Option<&Path>, dump_memory: Option<&Path>) -> Result<usize> {
        let flushed = match path {
            Some(path) => {
                let mut sink = open_sink(path)?;
                self.monitor.stop(&mut sink).map_err(|e| with_path(path, e))?
            }
            None => self.log.with_writer(|log| self.monitor.stop(log))?,
        };
        if let Some(dump_memory) = dump_memory {
            self.dump_memory(dump_memory)?;
        }
        Ok(flushed)
    }

    /// Dumps the store to `dump_memory` and flushes the samples collected so far to `path`, or
    /// to the throughput log if `path` is `None`. Sampling keeps its current state.
    ///
    /// Returns the number of samples flushed.
    pub fn dump(&self, dump_memory: &Path, path: Option<&Path>) -> Result<usize> {
        self.dump_memory(dump_memory)?;
        match path {
            Some(path) => {
                let mut sink = open_sink(path)?;
                self.monitor
                    .drain_to(&mut sink)
                    .map_err(|e| with_path(path, e))
            }
            None => self.log.with_writer(|log| self.monitor.drain_to(log)),
        }
    }

    /// closes the throughput log, waiting at most `timeout` for a flush in progress
    pub fn release(&self, timeout: Duration) -> Result<()> {
        self.log.release(timeout)
    }

    fn dump_memory(&self, path: &Path) -> Result<()> {
        let snapshot = self.engine.snapshot();
        dump_to_path(path, &snapshot)?;
        info!(entries = snapshot.len(), "memory dumped to {:?}", path);
        Ok(())
    }
}

// attaches the sink path to bare IO errors
fn with_path(path: &Path, e: KvsError) -> KvsError {
    match e {
        KvsError::Io(source) => KvsError::sink(path, source),
        other => other,
    }
}
