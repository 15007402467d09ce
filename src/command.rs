use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// These are the requests that can be made to the server.
/// Each request travels as one line of JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// get a value from the store
    Get {
        /// the key to search for
        key: i64,
    },
    /// insert or overwrite a key/value in the store
    Put {
        /// the key to set
        key: i64,
        /// the value to set
        value: String,
    },
    /// remove a key/value from the store, succeeds whether or not the key exists
    Delete {
        /// the key to remove
        key: i64,
    },
    /// fill keys `1..quantity` with random values of `size` characters
    Seed {
        /// one past the last key generated
        quantity: i64,
        /// length of every generated value
        size: usize,
    },
    /// start or stop throughput sampling
    Sampling(SamplingAction),
    /// write the whole store to `dump_memory` and flush the samples collected so far
    Dump {
        /// destination of the JSON memory dump
        dump_memory: PathBuf,
        /// destination of the samples, the server's throughput log if absent
        path: Option<PathBuf>,
    },
}

/// The two sampling controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingAction {
    /// clear collected samples and start sampling
    Start,
    /// stop sampling and flush the samples
    Stop {
        /// destination of the samples, the server's throughput log if absent
        path: Option<PathBuf>,
        /// when present, also write the JSON memory dump here
        dump_memory: Option<PathBuf>,
    },
}

/// The response Types that can be returned for any Request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// this variant is returned when a request was successful, with the value read if any
    Ok(Option<String>),
    /// a `Get` for a key that is not in the store
    NotFound,
    /// this variant is returned if an Error occurs while processing the request
    Err(String),
}
