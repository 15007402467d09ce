//! The listener controller owns the server's listening socket.
//!
//! It moves between three states, driven only by [`ControlSignal`]s that arrive out of band:
//!
//! ```text
//!   Accepting --pause--> Paused --resume--> Accepting
//!   Accepting | Paused --shutdown--> ShuttingDown   (terminal)
//! ```
//!
//! Pausing closes the listening socket, so new connection attempts are refused by the OS.
//! Connections that were already accepted keep being served by the thread pool, so requests in
//! flight complete normally. Shutdown closes the socket, waits a bounded grace period for
//! in-flight requests to finish, then releases the handler's resources.
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::thread_pool::ThreadPool;
use crate::{KvsError, Result};

// how long the acceptor sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// The states of a [`ListenerController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// the listening socket is open and connections are being accepted
    Accepting,
    /// the listening socket is closed; accepted connections are still served
    Paused,
    /// the controller has shut down and will not accept again
    ShuttingDown,
}

/// The out of band signals that drive a [`ListenerController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// stop accepting new connections
    Pause,
    /// start accepting new connections again
    Resume,
    /// stop accepting, drain in-flight requests and release resources
    Shutdown,
}

impl FromStr for ControlSignal {
    type Err = KvsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(ControlSignal::Pause),
            "resume" => Ok(ControlSignal::Resume),
            "shutdown" => Ok(ControlSignal::Shutdown),
            other => Err(KvsError::Parsing(format!("unknown control signal: {:?}", other))),
        }
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlSignal::Pause => "pause",
            ControlSignal::Resume => "resume",
            ControlSignal::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Serves the connections a [`ListenerController`] accepts.
///
/// A clone of the handler is moved onto a pool thread for every accepted connection.
pub trait ConnectionHandler: Clone + Send + 'static {
    /// serves every request arriving on `stream`. Each request should be processed while
    /// holding an [`InFlightGuard`] obtained from `in_flight`
    fn handle(&self, stream: TcpStream, in_flight: &InFlight) -> Result<()>;

    /// releases whatever the handler holds open (log files etc.), waiting at most `timeout` for
    /// resources still in use. Called once, at the end of shutdown
    fn release(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Counts the requests currently being processed
#[derive(Debug, Default)]
pub struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    /// creates a counter with nothing in flight
    pub fn new() -> Self {
        InFlight::default()
    }

    /// marks one request as in flight until the returned guard is dropped
    pub fn enter(&self) -> InFlightGuard<'_> {
        *self.count.lock() += 1;
        InFlightGuard { in_flight: self }
    }

    /// number of requests in flight right now
    pub fn current(&self) -> usize {
        *self.count.lock()
    }

    /// Waits until nothing is in flight, or until `timeout` elapses.
    ///
    /// Returns `true` if everything in flight finished in time.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// Keeps one request counted as in flight
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut count = self.in_flight.count.lock();
        *count -= 1;
        if *count == 0 {
            self.in_flight.idle.notify_all();
        }
    }
}

/// The outcome of a shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// `true` if every in-flight request finished within the grace period
    pub drained: bool,
    /// requests still in flight when the grace period ran out
    pub abandoned: usize,
}

/// The acceptor thread together with the flag that stops it. The listening socket lives on
/// that thread and is closed when the thread exits.
struct Acceptor {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Acceptor {
    fn close(self) {
        self.stop.store(true, Ordering::Release);
        if self.thread.join().is_err() {
            error!("acceptor thread panicked");
        }
    }
}

/// Owns the accept side of the server and moves it between [`ControllerState`]s.
///
/// Exactly one controller exists per server; nothing else opens or closes its socket.
pub struct ListenerController<H: ConnectionHandler, P: ThreadPool> {
    addr: SocketAddr,
    handler: H,
    pool: Arc<P>,
    in_flight: Arc<InFlight>,
    grace: Duration,
    state: ControllerState,
    acceptor: Option<Acceptor>,
}

impl<H: ConnectionHandler, P: ThreadPool> ListenerController<H, P> {
    /// Binds `addr` and starts accepting connections, handing each one to `handler` on a thread
    /// from `pool`.
    ///
    /// The address actually bound (e.g. the port picked for port `0`) is the one every later
    /// [`resume`](ListenerController::resume) binds again.
    ///
    /// # Errors
    /// returns an error if `addr` cannot be bound
    pub fn start(addr: SocketAddr, handler: H, pool: P, grace: Duration) -> Result<Self> {
        let mut controller = ListenerController {
            addr,
            handler,
            pool: Arc::new(pool),
            in_flight: Arc::new(InFlight::new()),
            grace,
            state: ControllerState::Paused,
            acceptor: None,
        };
        controller.open()?;
        info!("accepting connections on {}", controller.addr);
        Ok(controller)
    }

    /// the current state
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// the address the controller listens on while accepting
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// the in-flight request counter shared with every connection handler
    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }

    /// Closes the listening socket. Already accepted connections keep being served.
    /// Pausing while paused does nothing.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Paused => Ok(()),
            ControllerState::ShuttingDown => Err(self.terminal(ControlSignal::Pause)),
            ControllerState::Accepting => {
                if let Some(acceptor) = self.acceptor.take() {
                    acceptor.close();
                }
                self.state = ControllerState::Paused;
                info!("paused, no longer accepting on {}", self.addr);
                Ok(())
            }
        }
    }

    /// Opens a fresh listening socket on the controller's address.
    /// Resuming while accepting does nothing.
    ///
    /// # Errors
    /// returns an error, and stays paused, if the address cannot be bound again
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Accepting => Ok(()),
            ControllerState::ShuttingDown => Err(self.terminal(ControlSignal::Resume)),
            ControllerState::Paused => {
                self.open()?;
                info!("resumed, accepting on {}", self.addr);
                Ok(())
            }
        }
    }

    /// Closes the listening socket if open, waits up to the grace period for in-flight requests
    /// and then releases the handler's resources, giving the release another grace period at
    /// most. The controller never leaves `ShuttingDown`.
    ///
    /// # Errors
    /// returns an error if the controller already shut down, or if releasing resources failed
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub fn shutdown(&mut self) -> Result<ShutdownReport> {
        if self.state == ControllerState::ShuttingDown {
            return Err(self.terminal(ControlSignal::Shutdown));
        }
        self.state = ControllerState::ShuttingDown;
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.close();
        }
        info!("listener closed, waiting up to {:?} for in-flight requests", self.grace);

        let drained = self.in_flight.wait_idle(self.grace);
        let report = ShutdownReport {
            drained,
            abandoned: self.in_flight.current(),
        };
        if drained {
            info!("all in-flight requests finished");
        } else {
            warn!(abandoned = report.abandoned, "grace period expired, forcing release");
        }

        self.handler.release(self.grace)?;
        Ok(report)
    }

    /// Applies one control signal.
    ///
    /// Returns the shutdown report when `signal` was [`ControlSignal::Shutdown`].
    pub fn apply(&mut self, signal: ControlSignal) -> Result<Option<ShutdownReport>> {
        match signal {
            ControlSignal::Pause => self.pause().map(|_| None),
            ControlSignal::Resume => self.resume().map(|_| None),
            ControlSignal::Shutdown => self.shutdown().map(Some),
        }
    }

    /// Applies signals from `signals` until a shutdown completes. A disconnected channel is
    /// treated as a shutdown signal. Failed pause/resume transitions are logged and skipped.
    pub fn run(mut self, signals: &Receiver<ControlSignal>) -> Result<ShutdownReport> {
        loop {
            let signal = signals.recv().unwrap_or(ControlSignal::Shutdown);
            info!(%signal, "control signal received");
            match self.apply(signal) {
                Ok(Some(report)) => return Ok(report),
                Ok(None) => {}
                Err(e) if signal == ControlSignal::Shutdown => return Err(e),
                Err(e) => warn!(%signal, "control transition failed: {}", e),
            }
        }
    }

    fn terminal(&self, signal: ControlSignal) -> KvsError {
        KvsError::Transition(format!("cannot {} after shutdown", signal))
    }

    // binds the listener and starts the acceptor thread, leaving the state untouched on error
    fn open(&mut self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)?;
        listener.set_nonblocking(true)?;
        self.addr = listener.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            let handler = self.handler.clone();
            let pool = Arc::clone(&self.pool);
            let in_flight = Arc::clone(&self.in_flight);
            thread::Builder::new()
                .name("tkvs-acceptor".into())
                .spawn(move || accept_loop(listener, &stop, &handler, &pool, &in_flight))?
        };
        self.acceptor = Some(Acceptor { stop, thread });
        self.state = ControllerState::Accepting;
        Ok(())
    }
}

impl<H: ConnectionHandler, P: ThreadPool> Drop for ListenerController<H, P> {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.close();
        }
    }
}

impl<H: ConnectionHandler, P: ThreadPool> fmt::Debug for ListenerController<H, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerController")
            .field("addr", &self.addr)
            .field("state", &self.state)
            .field("in_flight", &self.in_flight.current())
            .finish()
    }
}

fn accept_loop<H: ConnectionHandler, P: ThreadPool>(
    listener: TcpListener,
    stop: &AtomicBool,
    handler: &H,
    pool: &Arc<P>,
    in_flight: &Arc<InFlight>,
) {
    while !stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    error!("could not configure connection from {}: {}", peer, e);
                    continue;
                }
                debug!("accepted connection from {}", peer);
                let handler = handler.clone();
                let in_flight = Arc::clone(in_flight);
                pool.spawn(move || {
                    if let Err(e) = handler.handle(stream, &in_flight) {
                        error!("Error on serving client {}: {}", peer, e);
                    }
                });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                error!("Connection failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("acceptor exiting, closing listener");
}
