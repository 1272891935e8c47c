//! Run configuration and operational sizing.
//!
//! The structs are filled from the command line by the binaries. Hardcoded
//! sizing that is not user-facing lives here as constants.

use std::time::Duration;

use crate::constants::MAX_BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::handler_memory::HANDLER_SLOT_BYTES;

/// Submission queue entries per reactor ring.
pub const RING_ENTRIES: u32 = 4096;

/// Listen backlog for the server socket.
pub const LISTEN_BACKLOG: i32 = 1024;

/// Server mailbox size. Only the acceptor posts into it, one record per
/// accepted connection routed to another loop.
pub const SERVER_MAILBOX_SIZE: usize = 4096;

/// Smallest mailbox a client loop gets, whatever its session count.
pub const MIN_MAILBOX_SIZE: usize = 64;

const _: () = assert!(SERVER_MAILBOX_SIZE.is_power_of_two(), "disruptor size must be 2^n");
const _: () = assert!(MIN_MAILBOX_SIZE.is_power_of_two(), "disruptor size must be 2^n");
const _: () = assert!(HANDLER_SLOT_BYTES >= 64, "handler slot too small for an op record");

/// Mailbox size for a client loop seeded with `sessions` sessions.
///
/// The coordinator posts one stop per session, including into its own loop's
/// mailbox, so it must never find the ring full.
pub fn client_mailbox_size(sessions: usize) -> usize {
    (sessions + 1).next_power_of_two().max(MIN_MAILBOX_SIZE)
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    pub sessions: usize,
    pub block_size: usize,
    pub duration: Duration,
    pub handler_memory: bool,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.threads, self.block_size)?;
        if self.duration.as_secs() == 0 {
            return Err(Error::InvalidConfig("duration must be at least one second"));
        }
        if self.sessions.div_ceil(self.threads) > u32::MAX as usize {
            return Err(Error::InvalidConfig("too many sessions per thread"));
        }
        Ok(())
    }

    /// Sessions seeded on the busiest loop.
    pub fn sessions_per_loop(&self) -> usize {
        self.sessions.div_ceil(self.threads)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    pub block_size: usize,
    pub handler_memory: bool,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_common(self.threads, self.block_size)
    }
}

fn validate_common(threads: usize, block_size: usize) -> Result<()> {
    if threads == 0 {
        return Err(Error::InvalidConfig("thread count must be at least 1"));
    }
    if block_size == 0 {
        return Err(Error::InvalidConfig("block size must be at least 1 byte"));
    }
    if block_size > MAX_BLOCK_SIZE {
        return Err(Error::InvalidConfig("block size does not fit a single io_uring op"));
    }
    Ok(())
}
