use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;

use crate::command::{Request, Response, SamplingAction};
use crate::controller::ControlSignal;
use crate::{KvsError, Result};

/// `KvsClient` contains the functionality for communication with a [`KvsServer`]
///
/// [`KvsServer`]: ./struct.KvsServer.html
pub struct KvsClient {
    reader: Deserializer<IoRead<BufReader<TcpStream>>>,
    writer: BufWriter<TcpStream>,
}

impl KvsClient {
    /// creates a client and establishes a socket connection to the server at the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;

        Ok(KvsClient {
            reader: Deserializer::from_reader(BufReader::new(tcp_reader)),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// gets the value of the specified `key` from the server
    /// ## Returns
    /// `Ok<Some<String>>` if the value was found for the key.
    /// `Ok<None>` if there is no value associated with the key
    pub fn get(&mut self, key: i64) -> Result<Option<String>> {
        match self.send(&Request::Get { key })? {
            Response::Ok(value) => Ok(value),
            Response::NotFound => Ok(None),
            Response::Err(msg) => Err(KvsError::StringErr(msg)),
        }
    }

    /// sets `key` to `value` on the server
    pub fn put(&mut self, key: i64, value: String) -> Result<()> {
        self.expect_ok(&Request::Put { key, value })
    }

    /// removes a key and its associated value from the store. Removing a missing key succeeds
    pub fn delete(&mut self, key: i64) -> Result<()> {
        self.expect_ok(&Request::Delete { key })
    }

    /// fills keys `1..quantity` with random values of `size` characters
    pub fn seed(&mut self, quantity: i64, size: usize) -> Result<()> {
        self.expect_ok(&Request::Seed { quantity, size })
    }

    /// starts throughput sampling on the server
    pub fn start_sampling(&mut self) -> Result<()> {
        self.expect_ok(&Request::Sampling(SamplingAction::Start))
    }

    /// stops throughput sampling, flushing the samples to `path` (or the server's throughput
    /// log) and optionally dumping the store to `dump_memory`
    pub fn stop_sampling(
        &mut self,
        path: Option<PathBuf>,
        dump_memory: Option<PathBuf>,
    ) -> Result<()> {
        self.expect_ok(&Request::Sampling(SamplingAction::Stop { path, dump_memory }))
    }

    /// dumps the store to `dump_memory` and flushes collected samples to `path` (or the
    /// server's throughput log)
    pub fn dump(&mut self, dump_memory: PathBuf, path: Option<PathBuf>) -> Result<()> {
        self.expect_ok(&Request::Dump { dump_memory, path })
    }

    /// writes a raw line to the server and returns the response, without validating the line
    pub fn send_raw(&mut self, line: &str) -> Result<Response> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(Response::deserialize(&mut self.reader)?)
    }

    /// sends `req` and waits for its response
    pub fn send(&mut self, req: &Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, req)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(Response::deserialize(&mut self.reader)?)
    }

    fn expect_ok(&mut self, req: &Request) -> Result<()> {
        match self.send(req)? {
            Response::Ok(_) => Ok(()),
            Response::NotFound => Err(KvsError::StringErr("Key not found".to_owned())),
            Response::Err(msg) => Err(KvsError::StringErr(msg)), // re-throwing error here
        }
    }
}

/// sends one control signal to a server's management port and waits for the acknowledgement
pub fn send_control<A: ToSocketAddrs>(addr: A, signal: ControlSignal) -> Result<()> {
    let tcp = TcpStream::connect(addr)?;
    let mut writer = BufWriter::new(tcp.try_clone()?);
    writeln!(writer, "{}", signal)?;
    writer.flush()?;

    let mut reply = String::new();
    BufReader::new(tcp).read_line(&mut reply)?;
    match reply.trim() {
        "ok" => Ok(()),
        other => Err(KvsError::StringErr(other.to_owned())),
    }
}
