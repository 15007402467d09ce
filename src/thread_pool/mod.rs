//! Thread pools that run the server's connection handlers.
//!
//! Connections are handled in parallel on OS threads; the listener's acceptor thread only
//! hands each accepted stream to a pool and goes back to accepting.
use crate::Result;

mod rayon_pool;
mod shared_queue;

pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;

/// A pool of threads that jobs can be spawned onto
pub trait ThreadPool: Send + Sync + 'static {
    /// Creates a new thread pool, immediately spawning the specified number of threads.
    ///
    /// # Errors
    /// returns an error if any thread fails to spawn. All previously-spawned threads are
    /// terminated.
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a function into the thread pool.
    ///
    /// Spawning always succeeds, but if the function panics the thread pool continues to
    /// operate with the same number of threads.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}
