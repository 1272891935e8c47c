//! One connection's ping-pong state and counters.
//!
//! A session never touches io_uring itself. The owning loop records each
//! submission with [`Session::begin`], feeds the completion result back
//! through `on_connect`/`on_write`/`on_read`, and submits whatever [`Step`]
//! comes back. That keeps the whole state machine testable without a ring.
//!
//! Initiator (client): `Created -> Connecting -> Writing <-> Reading -> Closed`.
//! Responder (server): `Accepted -> Reading <-> Writing -> Closed`.

use std::io;
use std::net::Shutdown;
use std::os::unix::io::{AsRawFd, RawFd};

use socket2::Socket;
use tracing::{debug, warn};

use crate::constants::PATTERN_PERIOD;
use crate::handler_memory::{HandlerBox, HandlerMemory};
use crate::metrics;
use crate::ring_types::Op;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Connecting,
    Accepted,
    Writing,
    Reading,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub count_written: u64,
    pub count_read: u64,
}

/// What the owning loop should submit next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Write the unsent tail of the block.
    Write,
    /// Read into the unfilled tail of the block.
    Read,
    /// Cancel the outstanding operation of this kind.
    Cancel(Op),
    /// Nothing to submit.
    Idle,
}

/// Record of the single outstanding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub op: Op,
    pub len: u32,
}

#[derive(Debug)]
pub struct Session {
    role: Role,
    state: State,
    socket: Option<Socket>,
    buf: Box<[u8]>,
    pos: usize,
    counters: Counters,
    error: bool,
    closing: bool,
    inflight: Option<HandlerBox<InFlight>>,
    memory: HandlerMemory<InFlight>,
}

impl Session {
    /// Client-side session, provisioned before any connection exists.
    pub fn initiator(block_size: usize, handler_memory: bool) -> Self {
        let buf: Box<[u8]> = (0..block_size).map(|i| (i % PATTERN_PERIOD) as u8).collect();
        Self::new(Role::Initiator, State::Created, None, buf, handler_memory)
    }

    /// Server-side session for an accepted connection.
    pub fn responder(socket: Socket, block_size: usize, handler_memory: bool) -> Self {
        let buf = vec![0u8; block_size].into_boxed_slice();
        Self::new(Role::Responder, State::Accepted, Some(socket), buf, handler_memory)
    }

    fn new(
        role: Role,
        state: State,
        socket: Option<Socket>,
        buf: Box<[u8]>,
        handler_memory: bool,
    ) -> Self {
        let memory = if handler_memory {
            HandlerMemory::new()
        } else {
            HandlerMemory::heap_only()
        };
        Self {
            role,
            state,
            socket,
            buf,
            pos: 0,
            counters: Counters::default(),
            error: false,
            closing: false,
            inflight: None,
            memory,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn bytes_written(&self) -> u64 {
        self.counters.bytes_written
    }

    pub fn bytes_read(&self) -> u64 {
        self.counters.bytes_read
    }

    pub fn count_written(&self) -> u64 {
        self.counters.count_written
    }

    pub fn count_read(&self) -> u64 {
        self.counters.count_read
    }

    pub fn error(&self) -> bool {
        self.error
    }

    pub fn closing(&self) -> bool {
        self.closing
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(|s| s.as_raw_fd())
    }

    pub fn in_flight(&self) -> Option<Op> {
        let handle = self.inflight.as_ref()?;
        self.memory.get(handle).map(|rec| rec.op)
    }

    /// No operation outstanding and the connection is gone.
    pub fn is_finished(&self) -> bool {
        self.inflight.is_none() && self.socket.is_none()
    }

    pub fn handler_memory(&self) -> &HandlerMemory<InFlight> {
        &self.memory
    }

    /// Unsent tail of the current block.
    pub fn write_buf(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Unfilled tail of the current block.
    pub fn read_buf(&mut self) -> &mut [u8] {
        &mut self.buf[self.pos..]
    }

    /// Hand a fresh socket to a `Created` initiator that is about to connect.
    pub fn attach(&mut self, socket: Socket) {
        debug_assert_eq!(self.state, State::Created);
        self.socket = Some(socket);
        self.state = State::Connecting;
    }

    /// Record `op` as this session's outstanding operation. Must be called
    /// exactly once per submission; the previous op must have completed.
    pub fn begin(&mut self, op: Op) {
        debug_assert!(
            self.inflight.is_none(),
            "{op:?} issued while another op is in flight"
        );
        let len = match op {
            Op::Read | Op::Write => (self.buf.len() - self.pos) as u32,
            _ => 0,
        };
        self.inflight = Some(self.memory.allocate(InFlight { op, len }));
    }

    fn complete(&mut self, op: Op, result: i32) {
        let record = self.inflight.take().and_then(|h| self.memory.release(h));
        debug_assert_eq!(record.map(|r| r.op), Some(op), "completion for an op never begun");
        if let Some(record) = record {
            debug_assert!(
                i64::from(result) <= i64::from(record.len),
                "{op:?} completed {result} bytes of {}",
                record.len
            );
        }
    }

    /// Responder entry point: first leg is a read.
    pub fn start(&mut self) -> Step {
        self.disable_nagle();
        self.state = State::Reading;
        self.pos = 0;
        Step::Read
    }

    pub fn on_connect(&mut self, result: i32) -> Step {
        self.complete(Op::Connect, result);
        if self.closing {
            self.close();
            return Step::Idle;
        }
        if result < 0 {
            // Connect failures are not transfer errors; the session just parks.
            metrics::inc_connect_failures();
            debug!(error = %io::Error::from_raw_os_error(-result), "connect failed");
            self.socket = None;
            return Step::Idle;
        }
        metrics::inc_connects();
        self.disable_nagle();
        self.state = State::Writing;
        self.pos = 0;
        Step::Write
    }

    pub fn on_write(&mut self, result: i32) -> Step {
        self.complete(Op::Write, result);
        if result <= 0 {
            return self.fail(Op::Write, result);
        }
        self.pos += result as usize;
        if self.pos < self.buf.len() {
            return self.advance(Step::Write);
        }
        self.pos = 0;
        self.counters.bytes_written += self.buf.len() as u64;
        self.counters.count_written += 1;
        metrics::inc_blocks_written();
        self.state = State::Reading;
        self.advance(Step::Read)
    }

    pub fn on_read(&mut self, result: i32) -> Step {
        self.complete(Op::Read, result);
        if result <= 0 {
            // Zero means the peer closed its side.
            return self.fail(Op::Read, result);
        }
        self.pos += result as usize;
        if self.pos < self.buf.len() {
            return self.advance(Step::Read);
        }
        self.pos = 0;
        self.counters.bytes_read += self.buf.len() as u64;
        self.counters.count_read += 1;
        metrics::inc_blocks_read();
        self.state = State::Writing;
        self.advance(Step::Write)
    }

    /// Close request. Runs on the session's own loop.
    ///
    /// Stopping a session that is already closing, closed, or whose connect
    /// failed changes nothing.
    pub fn stop(&mut self) -> Step {
        let connect_failed = self.socket.is_none() && self.state != State::Created;
        if self.closing || self.state == State::Closed || connect_failed {
            return Step::Idle;
        }
        self.closing = true;
        metrics::inc_stop_requests();
        match self.in_flight() {
            Some(op) => {
                if let Some(socket) = &self.socket {
                    // ENOTCONN for a socket still connecting is expected.
                    let _ = socket.shutdown(Shutdown::Both);
                }
                Step::Cancel(op)
            }
            None => {
                self.close();
                Step::Idle
            }
        }
    }

    fn advance(&mut self, next: Step) -> Step {
        if self.closing {
            self.close();
            return Step::Idle;
        }
        next
    }

    fn fail(&mut self, op: Op, result: i32) -> Step {
        if !self.closing {
            self.error = true;
            metrics::inc_transfer_errors();
            if result < 0 {
                debug!(?op, error = %io::Error::from_raw_os_error(-result), "transfer failed");
            } else {
                debug!(?op, "peer closed connection");
            }
        }
        self.close();
        Step::Idle
    }

    fn close(&mut self) {
        debug_assert!(self.inflight.is_none());
        self.state = State::Closed;
        self.socket = None;
    }

    fn disable_nagle(&self) {
        if let Some(socket) = &self.socket {
            if let Err(e) = socket.set_nodelay(true) {
                warn!(error = %e, "failed to disable Nagle");
            }
        }
    }
}
