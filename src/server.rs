use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::command::{Request, Response, SamplingAction};
use crate::controller::{ConnectionHandler, InFlight};
use crate::{KvsEngine, KvsError, Result, Service};

/// The request dispatcher: translates requests arriving on a TCP connection into calls on a
/// [`Service`].
///
/// The server does not own a socket. A [`ListenerController`] accepts connections and hands
/// each one to a clone of the server on a pool thread.
///
/// # Example
/// Serve a striped store on "127.0.0.1:4000" with 4 threads from a shared queue thread pool
/// ```rust
/// use std::time::Duration;
/// use tkvs::{KvsServer, ListenerController, Service, StripedKvStore, ThroughputLog};
/// use tkvs::thread_pool::{SharedQueueThreadPool, ThreadPool};
/// # fn main() -> tkvs::Result<()> {
/// let service = Service::new(StripedKvStore::new(), ThroughputLog::open("throughput.log")?);
/// let pool = SharedQueueThreadPool::new(4)?;
/// let _controller = ListenerController::start(
///     "127.0.0.1:4000".parse().unwrap(),
///     KvsServer::new(service),
///     pool,
///     Duration::from_secs(5),
/// )?;
/// # Ok(())
/// # }
/// ```
///
/// [`ListenerController`]: ./struct.ListenerController.html
#[derive(Debug)]
pub struct KvsServer<E: KvsEngine> {
    service: Service<E>,
}

impl<E: KvsEngine> Clone for KvsServer<E> {
    fn clone(&self) -> Self {
        KvsServer {
            service: self.service.clone(),
        }
    }
}

impl<E: KvsEngine> KvsServer<E> {
    /// Create a new `KvsServer` dispatching to `service`
    pub fn new(service: Service<E>) -> Self {
        KvsServer { service }
    }

    /// the service requests are dispatched to
    pub fn service(&self) -> &Service<E> {
        &self.service
    }

    /// executes a single request against the service.
    /// Failures are turned into [`Response::Err`] and never escape the request
    pub fn execute(&self, req: Request) -> Response {
        let service = &self.service;
        match req {
            Request::Get { key } => match service.get(key) {
                Some(value) => Response::Ok(Some(value)),
                None => Response::NotFound,
            },
            Request::Put { key, value } => {
                service.put(key, value);
                Response::Ok(None)
            }
            Request::Delete { key } => {
                service.delete(key);
                Response::Ok(None)
            }
            Request::Seed { quantity, size } => match service.seed(quantity, size) {
                Ok(()) => Response::Ok(None),
                Err(e) => {
                    warn!("{}", e);
                    Response::Err(e.to_string())
                }
            },
            Request::Sampling(SamplingAction::Start) => {
                service.start_sampling();
                Response::Ok(None)
            }
            Request::Sampling(SamplingAction::Stop { path, dump_memory }) => {
                respond(service.stop_sampling(path.as_deref(), dump_memory.as_deref()))
            }
            Request::Dump { dump_memory, path } => {
                respond(service.dump(&dump_memory, path.as_deref()))
            }
        }
    }

    /// decodes one request line and executes it. A line that does not decode still counts as
    /// one attempted operation
    pub fn execute_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(req) => self.execute(req),
            Err(e) => {
                self.service.reject();
                let err = KvsError::InvalidRequest(e.to_string());
                warn!("{}", err);
                Response::Err(err.to_string())
            }
        }
    }
}

impl<E: KvsEngine> ConnectionHandler for KvsServer<E> {
    /// Reads newline delimited JSON [`Request`]s from `tcp` until the peer closes the
    /// connection, writing one [`Response`] line back for each.
    fn handle(&self, tcp: TcpStream, in_flight: &InFlight) -> Result<()> {
        let peer_addr = tcp.peer_addr()?;
        let reader = BufReader::new(&tcp);
        let mut writer = BufWriter::new(&tcp);

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let _guard = in_flight.enter();
            debug!("Receive request from {}: {}", peer_addr, line);

            let resp = self.execute_line(&line);
            serde_json::to_writer(&mut writer, &resp)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            debug!("Response sent to {}: {:?}", peer_addr, resp);
        }
        debug!("{} disconnected", peer_addr);
        Ok(())
    }

    fn release(&self, timeout: Duration) -> Result<()> {
        self.service.release(timeout)
    }
}

fn respond(result: Result<usize>) -> Response {
    match result {
        Ok(_) => Response::Ok(None),
        Err(e) => {
            error!("control request failed: {}", e);
            Response::Err(e.to_string())
        }
    }
}
