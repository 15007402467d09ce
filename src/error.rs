use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// type alias for all operations on a [`Service`] or its components that could fail with a
/// [`KvsError`]
///
/// [`Service`]: ./struct.Service.html
pub type Result<T> = std::result::Result<T, KvsError>;

/// The Error variants used throughout `tkvs`.
/// Lower level errors from third party crates are wrapped with `#[from]` so they can be
/// propagated with `?`
#[derive(Error, Debug)]
pub enum KvsError {
    /// variant for errors caused from socket or file IO
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// a request or response could not be (de)serialized
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// a command line value, address or number could not be parsed
    #[error("parsing error: {0}")]
    Parsing(String),

    /// a client sent a request that could not be decoded
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// the process was started with missing or unusable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// the listener controller refused a state transition
    #[error("illegal transition: {0}")]
    Transition(String),

    /// a throughput log or memory dump could not be opened or written
    #[error("sink {path:?}: {source}")]
    Sink {
        /// the file being written
        path: PathBuf,
        /// the underlying IO failure
        source: io::Error,
    },

    /// error text relayed from a remote server
    #[error("{0}")]
    StringErr(String),
}

impl KvsError {
    /// wraps an IO error with the path of the sink that produced it
    pub fn sink(path: impl Into<PathBuf>, source: io::Error) -> Self {
        KvsError::Sink {
            path: path.into(),
            source,
        }
    }
}
