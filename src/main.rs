use clap::Parser;
use tracing::error;

use pingbench::config::ServerConfig;
use pingbench::{Server, logging, metrics};

#[derive(Parser)]
#[command(about = "Echo server for the pingbench ping-pong throughput test")]
struct Args {
    /// Address to bind
    host: String,
    /// Port to bind (0 picks one)
    port: u16,
    /// Number of event loops, one thread each
    threads: usize,
    /// Bytes per block
    block_size: usize,
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
            std::process::exit(-1);
        }
    };
    logging::init(args.verbose);
    metrics::spawn_reporter();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        threads: args.threads,
        block_size: args.block_size,
        handler_memory: args.handler_memory,
    };

    if let Err(e) = run(&config) {
        error!(error = %e, "server failed");
    }
}

fn run(config: &ServerConfig) -> pingbench::Result<()> {
    let mut server = Server::bind(config)?;
    server.start()?;
    server.wait()
}
