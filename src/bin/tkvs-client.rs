//! The tkvs-client executable supports the following command line arguments:
//!
//! `tkvs-client get <KEY> [--addr IP-PORT]`
//!
//!     Get the string value of a given integer key. Prints "Key not found" if there is none.
//!
//! `tkvs-client put <KEY> <VALUE> [--addr IP-PORT]`
//!
//!     Set the value of an integer key to a string.
//!
//! `tkvs-client rm <KEY> [--addr IP-PORT]`
//!
//!     Remove a given key. Removing a missing key is not an error.
//!
//! `tkvs-client seed <QUANTITY> <SIZE> [--addr IP-PORT]`
//!
//!     Fill keys 1..QUANTITY with random values of SIZE characters.
//!
//! `tkvs-client start [--addr IP-PORT]`
//! `tkvs-client stop [--path PATH] [--dump PATH] [--addr IP-PORT]`
//! `tkvs-client dump --dump PATH [--path PATH] [--addr IP-PORT]`
//!
//!     Start and stop throughput sampling, or dump the store and the samples collected so far.
//!
//! `tkvs-client ctl <pause|resume|shutdown> --admin-addr IP-PORT`
//!
//!     Send a control signal to the server's management port.
//!
//! --addr accepts an IP address, either v4 or v6, and a port number, with the format IP:PORT.
//! If --addr is not specified then connect on 127.0.0.1:4000.
//! Print an error and return a non-zero exit code on server error, or if IP-PORT does not parse
//! as an address.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::exit;

use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use tkvs::config::parse_addr;
use tkvs::{send_control, ControlSignal, KvsClient, KvsError, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDRESS: &str = "127.0.0.1:4000";

fn main() {
    // configure a subscriber that will log messages to STDERR
    subscriber_config();

    let addr_arg = Arg::with_name("addr")
        .long("addr")
        .value_name("IP_ADDR:PORT")
        .help("the server's IP_ADDR:PORT")
        .default_value(DEFAULT_ADDRESS);

    let matches = App::new("tkvs-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("client for the tkvs key-value store")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommands(vec![
            SubCommand::with_name("get")
                .about("Get the string value of a given integer key")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(addr_arg.clone()),
            SubCommand::with_name("put")
                .about("Set the value of an integer key to a string")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(Arg::with_name("VALUE").required(true).index(2))
                .arg(addr_arg.clone()),
            SubCommand::with_name("rm")
                .about("Removes a given key")
                .arg(Arg::with_name("KEY").required(true).index(1))
                .arg(addr_arg.clone()),
            SubCommand::with_name("seed")
                .about("Fills keys 1..QUANTITY with random values")
                .arg(Arg::with_name("QUANTITY").required(true).index(1))
                .arg(Arg::with_name("SIZE").required(true).index(2))
                .arg(addr_arg.clone()),
            SubCommand::with_name("start")
                .about("Starts throughput sampling")
                .arg(addr_arg.clone()),
            SubCommand::with_name("stop")
                .about("Stops throughput sampling and flushes the samples")
                .arg(Arg::with_name("path").long("path").takes_value(true)
                    .help("file to write the samples to, instead of the server's throughput log"))
                .arg(Arg::with_name("dump").long("dump").takes_value(true)
                    .help("file to dump the store to"))
                .arg(addr_arg.clone()),
            SubCommand::with_name("dump")
                .about("Dumps the store and flushes the samples collected so far")
                .arg(Arg::with_name("dump").long("dump").takes_value(true).required(true)
                    .help("file to dump the store to"))
                .arg(Arg::with_name("path").long("path").takes_value(true)
                    .help("file to write the samples to, instead of the server's throughput log"))
                .arg(addr_arg.clone()),
            SubCommand::with_name("ctl")
                .about("Sends a control signal to the management port")
                .arg(Arg::with_name("SIGNAL").required(true).index(1)
                    .possible_values(&["pause", "resume", "shutdown"]))
                .arg(Arg::with_name("admin-addr").long("admin-addr").takes_value(true)
                    .required(true).value_name("IP_ADDR:PORT")),
        ])
        .get_matches();

    if let Err(e) = run(&matches) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(matches: &ArgMatches<'_>) -> Result<()> {
    match matches.subcommand() {
        ("get", Some(args)) => {
            let key = key_arg(args, "KEY")?;
            match connect(args)?.get(key)? {
                Some(value) => println!("{}", value),
                None => println!("Key not found"),
            }
        }
        ("put", Some(args)) => {
            let key = key_arg(args, "KEY")?;
            let value = args.value_of("VALUE").map(String::from).unwrap_or_default();
            connect(args)?.put(key, value)?;
        }
        ("rm", Some(args)) => {
            let key = key_arg(args, "KEY")?;
            connect(args)?.delete(key)?;
        }
        ("seed", Some(args)) => {
            let quantity = key_arg(args, "QUANTITY")?;
            let size = key_arg(args, "SIZE")?;
            if size < 0 {
                return Err(KvsError::Parsing("SIZE must not be negative".to_owned()));
            }
            connect(args)?.seed(quantity, size as usize)?;
        }
        ("start", Some(args)) => connect(args)?.start_sampling()?,
        ("stop", Some(args)) => {
            connect(args)?.stop_sampling(path_arg(args, "path"), path_arg(args, "dump"))?
        }
        ("dump", Some(args)) => {
            let dump = path_arg(args, "dump")
                .ok_or_else(|| KvsError::Parsing("--dump is required".to_owned()))?;
            connect(args)?.dump(dump, path_arg(args, "path"))?
        }
        ("ctl", Some(args)) => {
            let signal: ControlSignal = args.value_of("SIGNAL").unwrap_or_default().parse()?;
            let addr = parse_addr(args.value_of("admin-addr").unwrap_or_default())?;
            send_control(addr, signal)?;
        }
        _ => return Err(KvsError::Parsing("unknown command received".to_owned())),
    }
    Ok(())
}

fn connect(args: &ArgMatches<'_>) -> Result<KvsClient> {
    let addr: SocketAddr = parse_addr(args.value_of("addr").unwrap_or(DEFAULT_ADDRESS))?;
    KvsClient::connect(addr)
}

fn key_arg(args: &ArgMatches<'_>, name: &str) -> Result<i64> {
    let raw = args.value_of(name).unwrap_or_default();
    raw.parse()
        .map_err(|_| KvsError::Parsing(format!("{} is not an integer: {}", name, raw)))
}

fn path_arg(args: &ArgMatches<'_>, name: &str) -> Option<PathBuf> {
    args.value_of(name).map(PathBuf::from)
}

/// configures a tracing subscriber that will log warnings and errors to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
