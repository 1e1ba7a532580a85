//! redis-fanout probe
//!
//! Sends one command to every given server in a single executor round and
//! prints each server's replies.

use anyhow::{bail, Context};
use redis_fanout::{Batch, Engine, ExecuteOutcome, ReplyEntry, ReplyKind};
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Probe configuration
struct Config {
    /// Servers to query, `host[:port]`
    servers: Vec<String>,
    /// Deadline for the whole round
    timeout: Duration,
    /// Command name and arguments
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            timeout: Duration::from_millis(1000),
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--server" | "-s" => {
                    if i + 1 < args.len() {
                        config.servers.push(args[i + 1].clone());
                        i += 2;
                    } else {
                        eprintln!("Error: --server requires a value");
                        std::process::exit(1);
                    }
                }
                "--timeout" | "-t" => {
                    if i + 1 < args.len() {
                        let millis: u64 = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid timeout");
                            std::process::exit(1);
                        });
                        config.timeout = Duration::from_millis(millis);
                        i += 2;
                    } else {
                        eprintln!("Error: --timeout requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("redis-fanout version {}", redis_fanout::VERSION);
                    std::process::exit(0);
                }
                "--" => {
                    config.command.extend(args[i + 1..].iter().cloned());
                    break;
                }
                arg if arg.starts_with('-') && config.command.is_empty() => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
                _ => {
                    config.command.extend(args[i..].iter().cloned());
                    break;
                }
            }
        }

        if config.command.is_empty() {
            eprintln!("Error: no command given");
            print_help();
            std::process::exit(1);
        }
        if config.servers.is_empty() {
            config
                .servers
                .push(format!("127.0.0.1:{}", redis_fanout::DEFAULT_PORT));
        }
        config
    }
}

fn print_help() {
    println!(
        r#"
redis-fanout - send one command to many Redis servers at once

USAGE:
    redis-fanout [OPTIONS] <COMMAND> [ARGS...]

OPTIONS:
    -s, --server <ADDR>    Server to query, host[:port]; repeatable (default: 127.0.0.1:6379)
    -t, --timeout <MS>     Deadline for the whole round in milliseconds (default: 1000)
    -v, --version          Print version information
    -h, --help             Print this help message

EXAMPLES:
    redis-fanout PING
    redis-fanout -s cache1 -s cache2:6380 GET user:101
    redis-fanout -t 50 -s 10.0.0.7 -- MGET a b c

LOGGING:
    RUST_LOG=redis_fanout=trace redis-fanout PING
"#
    );
}

/// Prints one reply line, indented by depth.
fn print_entry(entry: &ReplyEntry<'_>) {
    let indent = "  ".repeat(entry.depth);
    let value = match entry.kind {
        ReplyKind::MultiBulk => format!("({} items)", entry.len),
        ReplyKind::BulkNil | ReplyKind::MultiBulkNil => "(nil)".to_string(),
        _ => match entry.data {
            Some(data) => format!("{:?}", String::from_utf8_lossy(data)),
            None => String::new(),
        },
    };
    println!("{}{} {}", indent, entry.kind, value);
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; stdout is reserved for replies
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let engine = Engine::default();

    let mut connections = config
        .servers
        .iter()
        .map(|addr| {
            engine
                .connection(addr)
                .with_context(|| format!("bad server address {}", addr))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let args: Vec<&[u8]> = config.command.iter().map(|arg| arg.as_bytes()).collect();
    let mut batches: Vec<Batch> = Vec::with_capacity(connections.len());
    for _ in &connections {
        let mut batch = engine.batch();
        batch.write_command(&args)?;
        batches.push(batch);
    }

    let outcome = {
        let mut executor = engine.executor()?;
        for (connection, batch) in connections.iter_mut().zip(batches.iter_mut()) {
            executor.add(connection, batch)?;
        }
        executor.execute(config.timeout)
    };
    debug!(?outcome, servers = connections.len(), "round finished");

    for (connection, batch) in connections.iter().zip(batches.iter_mut()) {
        println!("{}", connection.endpoint());
        while let Some(entry) = batch.next_reply() {
            print_entry(&entry);
        }
    }

    for batch in batches {
        engine.recycle(batch);
    }
    drop(connections);
    let leaked = engine.shutdown();
    if leaked > 0 {
        warn!(bytes = leaked, "buffers still allocated at exit");
    }

    match outcome {
        ExecuteOutcome::Completed => Ok(()),
        ExecuteOutcome::TimedOut => bail!("round timed out after {:?}", config.timeout),
        ExecuteOutcome::Error(detail) => bail!(detail),
    }
}
