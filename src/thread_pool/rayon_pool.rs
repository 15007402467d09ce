use std::any::Any;

use super::ThreadPool;
use crate::{KvsError, Result};
use tracing::{debug, error};

/// A thread pool that uses a work stealing strategy as implemented by the [`Rayon`] library.
///
/// [`Rayon`]: https://docs.rs/rayon/latest/rayon/index.html
#[derive(Debug)]
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads as usize)
            .thread_name(|i| format!("tkvs-rayon-{}", i))
            // without a handler rayon aborts the process when a spawned job panics
            .panic_handler(|payload| error!("job panicked: {}", panic_message(&*payload)))
            .build()
            .map_err(|e| KvsError::Config(format!("could not build thread pool: {:?}", &e)))?;
        debug!("created rayon thread pool with {} threads", &threads);

        Ok(Self { pool })
    }

    /// runs `job` on one of the pool's threads without waiting for it to finish.
    /// A panicking job is logged by the pool's panic handler and the worker carries on.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
