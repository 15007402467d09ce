//! Server configuration, assembled from command line arguments and environment variables.
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::ArgMatches;

use crate::{KvsError, Result};

/// the throughput log used when none is configured
pub const DEFAULT_LOG_FILE: &str = "throughput.log";
/// number of connection handling threads used when none is configured
pub const DEFAULT_THREADS: u32 = 8;
/// how long shutdown waits for in-flight requests when no grace period is configured
pub const DEFAULT_GRACE_SECS: u64 = 5;

/// the storage engines a server can run
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineKind {
    /// [`StripedKvStore`](crate::StripedKvStore), one lock per key
    Striped,
    /// [`ShardedKvStore`](crate::ShardedKvStore), a sharded concurrent map
    Sharded,
}

impl EngineKind {
    /// the names accepted on the command line
    pub const VARIANTS: [&'static str; 2] = ["striped", "sharded"];
}

impl FromStr for EngineKind {
    type Err = KvsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "striped" => Ok(EngineKind::Striped),
            "sharded" => Ok(EngineKind::Sharded),
            _ => Err(KvsError::Parsing(format!("unknown engine: {}", s))),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Striped => f.write_str("striped"),
            EngineKind::Sharded => f.write_str("sharded"),
        }
    }
}

/// the thread pools a server can dispatch connections on
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PoolKind {
    /// [`SharedQueueThreadPool`](crate::SharedQueueThreadPool)
    Shared,
    /// [`RayonThreadPool`](crate::RayonThreadPool)
    Rayon,
}

impl PoolKind {
    /// the names accepted on the command line
    pub const VARIANTS: [&'static str; 2] = ["shared", "rayon"];
}

impl FromStr for PoolKind {
    type Err = KvsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Ok(PoolKind::Shared),
            "rayon" => Ok(PoolKind::Rayon),
            _ => Err(KvsError::Parsing(format!("unknown thread pool: {}", s))),
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Shared => f.write_str("shared"),
            PoolKind::Rayon => f.write_str("rayon"),
        }
    }
}

/// [`Config`] holds parsed and validated options for a server process
#[derive(Debug, Clone)]
pub struct Config {
    /// the address requests are accepted on
    pub addr: SocketAddr,
    /// the management port for control signals, if any
    pub admin_addr: Option<SocketAddr>,
    /// the storage engine
    pub engine: EngineKind,
    /// the thread pool implementation
    pub pool: PoolKind,
    /// number of connection handling threads
    pub threads: u32,
    /// where samples are flushed when a request names no other file
    pub log_file: PathBuf,
    /// how long shutdown waits for in-flight requests
    pub grace: Duration,
    /// log at debug level
    pub debug: bool,
}

impl Config {
    /// validates the values captured in `matches`. The argument names are the long option
    /// names of the `tkvs-server` binary.
    ///
    /// # Errors
    /// returns [`KvsError::Config`] if no listen address was given, and
    /// [`KvsError::Parsing`] if a value is malformed
    pub fn from_matches(matches: &ArgMatches<'_>) -> Result<Config> {
        let addr = matches.value_of("addr").ok_or_else(|| {
            KvsError::Config("no listen address, set --addr or the PORT variable".to_owned())
        })?;
        let addr = parse_addr(addr)?;
        let admin_addr = matches.value_of("admin-addr").map(parse_addr).transpose()?;

        let engine = matches
            .value_of("engine")
            .map(str::parse)
            .transpose()?
            .unwrap_or(EngineKind::Striped);
        let pool = matches
            .value_of("pool")
            .map(str::parse)
            .transpose()?
            .unwrap_or(PoolKind::Shared);
        let threads = parse_number::<u32>(matches.value_of("threads"), DEFAULT_THREADS)?;
        if threads == 0 {
            return Err(KvsError::Config("at least one thread is required".to_owned()));
        }
        let grace = parse_number::<u64>(matches.value_of("grace-secs"), DEFAULT_GRACE_SECS)?;
        let log_file = matches
            .value_of("log-file")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

        Ok(Config {
            addr,
            admin_addr,
            engine,
            pool,
            threads,
            log_file,
            grace: Duration::from_secs(grace),
            debug: matches.is_present("debug"),
        })
    }
}

/// Parses a listen address. Accepts `IP:PORT`, or `:PORT` to listen on every interface.
pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_owned()
    };
    full.parse()
        .map_err(|_| KvsError::Parsing(format!("could not parse {} into an IP address and port", addr)))
}

fn parse_number<T: FromStr>(value: Option<&str>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| KvsError::Parsing(format!("{} is not a valid number", v))),
    }
}
