use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Process-level failures. Per-session I/O faults never show up here; they
/// are recorded on the session itself.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {host}:{port}")]
    NoAddress { host: String, port: u16 },

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to set up io_uring: {0}")]
    Ring(#[source] io::Error),

    #[error("failed to create eventfd: {0}")]
    EventFd(#[source] io::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("worker thread for loop {0} panicked")]
    WorkerPanicked(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("client was never started")]
    NotStarted,
}

pub type Result<T> = std::result::Result<T, Error>;
