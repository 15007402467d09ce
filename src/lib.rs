#![deny(missing_docs)]
//! A multithreaded, in-memory key-value store server that maps `i64` keys to [`String`] values
//! and measures its own throughput while it runs.
//!
//! This crate provides the storage engines, the throughput monitor and the listener controller,
//! as well as a [`tkvs-client`] and [`tkvs-server`] executable that can be used to interact with
//! them. Requests are sent between the client and server as newline delimited JSON over TCP.
//!
//! ## Supported Storage Operations
//! - `GET` a value associated with a key from the store
//! - `PUT` a key/value pair into the store, overwriting any previous value
//! - `DELETE` a key/value pair from the store (deleting a missing key is not an error)
//! - `SEED` the store with random values under keys `1..quantity`
//! - `SNAPSHOT` the whole store, e.g. to dump it to a file
//!
//! Every operation on a single key is atomic and operations on different keys never wait on
//! each other. See the [`KvsEngine`] trait and its two implementations, [`StripedKvStore`]
//! (one lock per key) and [`ShardedKvStore`] (a sharded concurrent map).
//!
//! ## Throughput Monitor
//! Each get, put and delete bumps an atomic [`OpCounter`]. While sampling is enabled the
//! [`ThroughputMonitor`] drains the counter once per second into a `(timestamp, count)`
//! [`Sample`]. Stopping the sampling flushes the samples as `timestamp,count` lines into the
//! throughput log, or into a file named by the stop request.
//!
//! ## Listener Controller
//! The [`ListenerController`] owns the listening socket. It can be paused (socket closed,
//! existing connections still served), resumed (socket reopened on the same address) and shut
//! down (socket closed, in-flight requests given a grace period, resources released). It is
//! driven by [`ControlSignal`]s that arrive on the management port, never by request traffic.
//!
//! ## Service
//! All shared state lives in a [`Service`] that is built once at startup and cloned into each
//! connection handler; there is no process global state.
//!
//! [`String`]: https://doc.rust-lang.org/std/string/struct.String.html
//! [`tkvs-server`]: ./bin/tkvs-server.rs
//! [`tkvs-client`]: ./bin/tkvs-client.rs

pub use client::{send_control, KvsClient};
pub use command::{Request, Response, SamplingAction};
pub use controller::{
    ConnectionHandler, ControlSignal, ControllerState, InFlight, InFlightGuard,
    ListenerController, ShutdownReport,
};
pub use engine::{KvsEngine, ShardedKvStore, StripedKvStore};
pub use error::{KvsError, Result};
pub use monitor::{MonitorHandle, OpCounter, Sample, ThroughputMonitor, TICK_PERIOD};
pub use server::KvsServer;
pub use service::{Service, ThroughputLog};
pub use thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};

pub mod admin;
mod client;
mod command;
pub mod config;
mod controller;
pub mod engine;
mod error;
pub mod lock_table;
mod monitor;
mod server;
mod service;
pub mod sink;
pub mod thread_pool;
