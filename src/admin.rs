//! The management port: an out of band channel for [`ControlSignal`]s.
//!
//! Operators connect and write one signal per line (`pause`, `resume` or `shutdown`). Each
//! signal is queued for the [`ListenerController`] and acknowledged with `ok`; anything else is
//! answered with `error: ...` and ignored. Request traffic never passes through here.
//!
//! Every management connection is served on its own thread, so an operator session left open
//! never holds up signals sent over another connection. Idle sessions are dropped after
//! [`IDLE_TIMEOUT`].
//!
//! [`ListenerController`]: ../struct.ListenerController.html
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;
use tracing::{debug, error, info, warn};

use crate::controller::ControlSignal;
use crate::Result;

/// how long a management connection may sit without sending a line
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

// how long the accept loop sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Binds the management port on `addr` and forwards every signal received there to `signals`.
///
/// The returned thread exits after a shutdown signal was forwarded, or once nobody listens on
/// `signals` anymore.
///
/// Returns the bound address together with the thread's handle.
pub fn spawn_admin(
    addr: SocketAddr,
    signals: Sender<ControlSignal>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    let local = listener.local_addr()?;
    let thread = thread::Builder::new()
        .name("tkvs-admin".into())
        .spawn(move || admin_loop(listener, signals))?;
    info!("management port listening on {}", local);
    Ok((local, thread))
}

fn admin_loop(listener: TcpListener, signals: Sender<ControlSignal>) {
    let closed = Arc::new(AtomicBool::new(false));
    while !closed.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let signals = signals.clone();
                let closed = Arc::clone(&closed);
                let spawned = thread::Builder::new()
                    .name("tkvs-admin-conn".into())
                    .spawn(move || match serve_admin(stream, &signals) {
                        Ok(true) => closed.store(true, Ordering::Release),
                        Ok(false) => {}
                        Err(e) => warn!("management connection {} error: {}", peer, e),
                    });
                if let Err(e) = spawned {
                    error!("could not serve management connection {}: {}", peer, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                error!("management connection failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("management port closed");
}

// returns `Ok(true)` once no more signals should be accepted
fn serve_admin(stream: TcpStream, signals: &Sender<ControlSignal>) -> Result<bool> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(IDLE_TIMEOUT))?;
    let peer = stream.peer_addr()?;
    let reader = BufReader::new(&stream);
    let mut writer = BufWriter::new(&stream);

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let signal = match line.parse::<ControlSignal>() {
            Ok(signal) => signal,
            Err(e) => {
                writeln!(writer, "error: {}", e)?;
                writer.flush()?;
                continue;
            }
        };
        info!(%signal, "control signal from {}", peer);
        if signals.send(signal).is_err() {
            writeln!(writer, "error: controller is gone")?;
            writer.flush()?;
            return Ok(true);
        }
        writeln!(writer, "ok")?;
        writer.flush()?;
        if signal == ControlSignal::Shutdown {
            return Ok(true);
        }
    }
    Ok(false)
}
