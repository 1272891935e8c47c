//! Library crate for pingbench: loop pool, session state machine, shutdown
//! coordinator, acceptor and statistics for a ping-pong TCP throughput test.
//!
//! The client and server binaries are thin CLI wrappers around [`Client`]
//! and [`Server`]. The session state machine, handler memory, mailboxes and
//! statistics are usable without io_uring, which is what the unit tests rely
//! on.

pub mod acceptor;
pub mod client;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod handler_memory;
pub mod logging;
pub mod mailbox;
pub mod metrics;
pub mod pool;
pub mod reactor;
pub mod resolve;
pub mod ring_types;
pub mod server;
pub mod session;
pub mod stats;

pub use client::Client;
pub use error::{Error, Result};
pub use server::Server;
pub use stats::Stats;
