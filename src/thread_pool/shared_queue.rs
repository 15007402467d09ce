use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, instrument};

use super::ThreadPool;
use crate::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool implemented with a shared job queue (i.e. channel).
///
/// This implementation uses the MPMC [`channel`] provided by the crossbeam crate, with the
/// pool itself as the producer and each worker thread as a consumer.
///
/// If a job panics, the worker thread that ran it is replaced by a new one, so a panicking
/// connection handler never shrinks the pool. Workers exit once the pool is dropped.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
#[derive(Debug)]
pub struct SharedQueueThreadPool {
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        for i in 0..threads {
            let worker = Worker(rx.clone());
            thread::Builder::new()
                .name(format!("tkvs-worker-{}", i))
                .spawn(move || run_jobs(worker))?;
        }
        debug!("created shared queue thread pool with {} threads", threads);
        Ok(SharedQueueThreadPool { tx })
    }

    /// # Panics
    ///
    /// Panics if the thread pool has no thread.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .expect("There are no threads in the pool");
    }
}

/// The receiving end of the job queue held by a single worker thread.
/// Dropping it while the thread is panicking starts a replacement worker.
#[derive(Clone)]
struct Worker(Receiver<Job>);

impl Drop for Worker {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("worker panicked, starting a replacement");
            let worker = self.clone();
            if let Err(e) = thread::Builder::new().spawn(move || run_jobs(worker)) {
                error!("Failed to spawn a thread: {}", e);
            }
        }
    }
}

#[instrument(skip_all)]
fn run_jobs(worker: Worker) {
    while let Ok(job) = worker.0.recv() {
        job();
    }
    debug!("worker exited because the thread pool was dropped");
}
