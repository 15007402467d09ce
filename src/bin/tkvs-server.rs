//! this binary starts the tkvs server
//! to see the list of options, type: `tkvs-server --help`
//!
//! The listen address is required, either as `--addr` or through the `PORT` environment
//! variable (`IP:PORT` or `:PORT`). The server runs until a `shutdown` signal arrives on the
//! management port (`--admin-addr`), or until that port's channel goes away.

use std::process::exit;

use clap::{crate_version, App, Arg};
use crossbeam::channel;
use tkvs::config::{Config, EngineKind, PoolKind};
use tkvs::{
    admin, KvsEngine, KvsServer, ListenerController, RayonThreadPool, Result, Service,
    ShardedKvStore, SharedQueueThreadPool, StripedKvStore, ThreadPool, ThroughputLog, TICK_PERIOD,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn main() {
    // parse command line args
    let matches = App::new("tkvs-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a multi-threaded key-value store with throughput sampling")
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .env("PORT")
            .help("sets the IP_ADDR:PORT (or :PORT) that the server listens on"))
        .arg(Arg::with_name("admin-addr")
            .long("admin-addr")
            .value_name("IP_ADDR:PORT")
            .env("TKVS_ADMIN_ADDR")
            .help("sets the management port that accepts pause, resume and shutdown"))
        .arg(Arg::with_name("engine")
            .long("engine")
            .value_name("ENGINE_NAME")
            .possible_values(&EngineKind::VARIANTS)
            .help("sets the storage engine to use")
            .default_value("striped"))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL_NAME")
            .possible_values(&PoolKind::VARIANTS)
            .help("sets the thread pool that serves connections")
            .default_value("shared"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .value_name("N")
            .help("sets the number of connection handling threads"))
        .arg(Arg::with_name("log-file")
            .long("log-file")
            .value_name("PATH")
            .env("TKVS_LOG_FILE")
            .help("sets the throughput log, truncated at startup"))
        .arg(Arg::with_name("grace-secs")
            .long("grace-secs")
            .value_name("SECONDS")
            .help("sets how long shutdown waits for in-flight requests"))
        .arg(Arg::with_name("debug")
            .long("debug")
            .help("logs at debug level"))
        .get_matches();

    let config = match Config::from_matches(&matches) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // set up a tracing subscriber to log to STDERR
    subscriber_config(config.debug);

    // start the server
    if let Err(e) = run(config) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(config: Config) -> Result<()> {
    info!("tkvs-server {}", env!("CARGO_PKG_VERSION"));
    info!("Storage engine: {}", config.engine);
    info!("Thread pool: {} with {} threads", config.pool, config.threads);
    info!("Throughput log: {:?}", config.log_file);

    match config.engine {
        EngineKind::Striped => run_with_engine(StripedKvStore::new(), config),
        EngineKind::Sharded => run_with_engine(ShardedKvStore::new(), config),
    }
}

fn run_with_engine<E: KvsEngine>(engine: E, config: Config) -> Result<()> {
    match config.pool {
        PoolKind::Shared => run_with(engine, SharedQueueThreadPool::new(config.threads)?, config),
        PoolKind::Rayon => run_with(engine, RayonThreadPool::new(config.threads)?, config),
    }
}

fn run_with<E: KvsEngine, P: ThreadPool>(engine: E, pool: P, config: Config) -> Result<()> {
    let log = ThroughputLog::open(&config.log_file)?;
    let service = Service::new(engine, log);
    let monitor = service.spawn_monitor(TICK_PERIOD)?;

    let (signal_tx, signal_rx) = channel::unbounded();
    // keep a sender alive when there is no management port, so the controller keeps running
    let _admin = match config.admin_addr {
        Some(addr) => Some(admin::spawn_admin(addr, signal_tx.clone())?),
        None => {
            warn!("no management port configured, the server can only be stopped by killing it");
            None
        }
    };

    let controller =
        ListenerController::start(config.addr, KvsServer::new(service), pool, config.grace)?;
    info!("Listening on {}", controller.local_addr());

    let report = controller.run(&signal_rx)?;
    drop(signal_tx);
    monitor.shutdown();
    info!(
        drained = report.drained,
        abandoned = report.abandoned,
        "tkvs-server stopped"
    );
    Ok(())
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        // completes the builder.
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
