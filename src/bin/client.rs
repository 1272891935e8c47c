use std::time::Duration;

use clap::Parser;
use tracing::error;

use pingbench::config::ClientConfig;
use pingbench::{Client, Stats, logging};

#[derive(Parser)]
#[command(about = "Ping-pong throughput client for the pingbench echo server")]
struct Args {
    /// Server host
    host: String,
    /// Server port
    port: u16,
    /// Number of event loops, one thread each
    threads: usize,
    /// Number of concurrent sessions
    sessions: usize,
    /// Bytes per block
    block_size: usize,
    /// Run duration in seconds
    timeout: u64,
    /// Record in-flight ops in a per-session slot instead of the heap
    #[arg(long)]
    handler_memory: bool,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };
    logging::init(args.verbose);

    let config = ClientConfig {
        host: args.host,
        port: args.port,
        threads: args.threads,
        sessions: args.sessions,
        block_size: args.block_size,
        duration: Duration::from_secs(args.timeout),
        handler_memory: args.handler_memory,
    };

    match run(config) {
        Ok(stats) => println!("{stats}"),
        Err(e) => {
            error!(error = %e, "client failed");
        }
    }
}

fn run(config: ClientConfig) -> pingbench::Result<Stats> {
    let mut client = Client::new(config)?;
    client.start()?;
    client.wait()
}
