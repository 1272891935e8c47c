use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::sync::Arc;

use disruptor::Polling;
use io_uring::{IoUring, opcode, squeue::Entry, types::Fd};
use slab::Slab;
use socket2::{Protocol, SockAddr, Socket, Type};
use tracing::{debug, error, trace, warn};

use crate::acceptor::Acceptor;
use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::mailbox::MailPoller;
use crate::metrics;
use crate::pool::PoolControl;
use crate::ring_types::{Mail, MailKind, Op, decode_user_data, encode_user_data};
use crate::session::{Role, Session, State, Step};

/// Push an SQE, flushing the submission queue if full.
fn push_sqe(ring: &mut IoUring, sqe: &Entry) -> Result<()> {
    loop {
        let result = unsafe { ring.submission().push(sqe) };
        match result {
            Ok(()) => return Ok(()),
            Err(_) => {
                // SQ full, flush pending submissions to kernel and retry
                ring.submit().map_err(Error::Ring)?;
            }
        }
    }
}

/// One event loop: an io_uring ring driven by a single thread, plus every
/// session assigned to it.
///
/// Buffers handed to the kernel (session blocks, the wake counter, the
/// connect address, the coordinator's timespec) are all boxed so they stay
/// put while the owning structs move around. `ring` is declared first so it
/// is torn down before any of them.
pub struct Reactor {
    ring: IoUring,
    id: usize,
    sessions: Slab<Session>,
    mailbox: MailPoller,
    control: Arc<PoolControl>,
    wake_buf: Box<u64>,
    /// Session operations submitted and not yet completed.
    in_flight: usize,
    block_size: usize,
    handler_memory: bool,
    endpoint: Option<Box<SockAddr>>,
    acceptor: Option<Acceptor>,
    coordinator: Option<Coordinator>,
    #[cfg(test)]
    fault: Option<Fault>,
}

/// Ways a loop can be made to die at startup in tests.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    Fail,
    Panic,
}

impl Reactor {
    pub fn new(id: usize, ring: IoUring, mailbox: MailPoller, control: Arc<PoolControl>) -> Self {
        Self {
            ring,
            id,
            sessions: Slab::new(),
            mailbox,
            control,
            wake_buf: Box::new(0),
            in_flight: 0,
            block_size: 0,
            handler_memory: false,
            endpoint: None,
            acceptor: None,
            coordinator: None,
            #[cfg(test)]
            fault: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Seed a session before the loop runs. Returns its key on this loop.
    pub fn insert(&mut self, session: Session) -> u32 {
        self.sessions.insert(session) as u32
    }

    /// Initiators seeded here connect to `addr` when the loop starts.
    pub fn connect_to(&mut self, addr: SocketAddr) {
        self.endpoint = Some(Box::new(SockAddr::from(addr)));
    }

    /// Parameters for responders adopted by this loop.
    pub fn serve(&mut self, block_size: usize, handler_memory: bool) {
        self.block_size = block_size;
        self.handler_memory = handler_memory;
    }

    pub fn install_acceptor(&mut self, acceptor: Acceptor) {
        self.acceptor = Some(acceptor);
    }

    pub fn install_coordinator(&mut self, coordinator: Coordinator) {
        self.coordinator = Some(coordinator);
    }

    #[cfg(test)]
    pub(crate) fn inject(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }

    /// Drive the loop until stop is requested and no session I/O is
    /// outstanding, then hand back the sessions still owned here.
    pub fn run(mut self) -> Result<Vec<Session>> {
        match self.event_loop() {
            Ok(()) => {
                debug!(loop_id = self.id, sessions = self.sessions.len(), "loop drained");
                Ok(self.sessions.drain().collect())
            }
            Err(e) => {
                error!(loop_id = self.id, error = %e, "loop failed");
                self.control.request_stop();
                Err(e)
            }
        }
    }

    fn event_loop(&mut self) -> Result<()> {
        self.submit_wake_read()?;
        #[cfg(test)]
        match self.fault {
            Some(Fault::Fail) => return Err(Error::Ring(io::Error::other("ring torn down"))),
            Some(Fault::Panic) => panic!("loop {} panicked", self.id),
            None => {}
        }
        if let Some(sqe) = self.acceptor.as_ref().map(Acceptor::entry) {
            push_sqe(&mut self.ring, &sqe)?;
        }
        if let Some(sqe) = self.coordinator.as_ref().map(Coordinator::timer_entry) {
            push_sqe(&mut self.ring, &sqe)?;
        }
        self.start_initiators()?;

        loop {
            if self.control.is_stopping() && self.in_flight == 0 {
                return Ok(());
            }

            match self.ring.submit_and_wait(1) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Ring(e)),
            }

            let cqes: Vec<(u64, i32)> = self
                .ring
                .completion()
                .map(|cqe| (cqe.user_data(), cqe.result()))
                .collect();

            for (user_data, result) in cqes {
                let (op, key) = decode_user_data(user_data);
                trace!(loop_id = self.id, ?op, key, result, "completion");

                match op {
                    Some(Op::Accept) => self.handle_accept(result)?,
                    Some(Op::Connect) => self.handle_session(key, result, Session::on_connect)?,
                    Some(Op::Read) => self.handle_session(key, result, Session::on_read)?,
                    Some(Op::Write) => self.handle_session(key, result, Session::on_write)?,
                    Some(Op::Wake) => self.handle_wake()?,
                    Some(Op::Timer) => self.handle_timer(),
                    Some(Op::Cancel) | None => {}
                }
            }
        }
    }

    fn start_initiators(&mut self) -> Result<()> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(());
        };
        let domain = endpoint.domain();
        let addr_ptr = endpoint.as_ptr() as *const libc::sockaddr;
        let addr_len = endpoint.len();

        let keys: Vec<usize> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.state() == State::Created)
            .map(|(key, _)| key)
            .collect();

        for key in keys {
            let socket = match Socket::new(domain, Type::STREAM, Some(Protocol::TCP)) {
                Ok(socket) => socket,
                Err(e) => {
                    warn!(loop_id = self.id, key, error = %e, "failed to create socket");
                    metrics::inc_connect_failures();
                    continue;
                }
            };
            let fd = socket.as_raw_fd();
            let session = &mut self.sessions[key];
            session.attach(socket);
            session.begin(Op::Connect);

            let sqe = opcode::Connect::new(Fd(fd), addr_ptr, addr_len)
                .build()
                .user_data(encode_user_data(Op::Connect, key as u32));
            self.in_flight += 1;
            push_sqe(&mut self.ring, &sqe)?;
        }
        Ok(())
    }

    fn handle_session(
        &mut self,
        key: u32,
        result: i32,
        complete: fn(&mut Session, i32) -> Step,
    ) -> Result<()> {
        self.in_flight -= 1;
        let Some(session) = self.sessions.get_mut(key as usize) else {
            warn!(loop_id = self.id, key, "completion for unknown session");
            return Ok(());
        };
        let step = complete(session, result);
        self.apply(key, step)
    }

    fn apply(&mut self, key: u32, step: Step) -> Result<()> {
        match step {
            Step::Write => self.submit_write(key),
            Step::Read => self.submit_read(key),
            Step::Cancel(op) => {
                let sqe = opcode::AsyncCancel::new(encode_user_data(op, key))
                    .build()
                    .user_data(encode_user_data(Op::Cancel, key));
                push_sqe(&mut self.ring, &sqe)
            }
            Step::Idle => {
                self.release_if_done(key);
                Ok(())
            }
        }
    }

    /// Responders are dropped as soon as nothing references them. Initiators
    /// stay until the pool is joined so their counters can be aggregated.
    fn release_if_done(&mut self, key: u32) {
        let key = key as usize;
        let done = self
            .sessions
            .get(key)
            .is_some_and(|s| s.role() == Role::Responder && s.is_finished());
        if done {
            let session = self.sessions.remove(key);
            metrics::dec_live_sessions();
            debug!(
                loop_id = self.id,
                key,
                count_read = session.count_read(),
                count_written = session.count_written(),
                "responder released"
            );
        }
    }

    fn submit_write(&mut self, key: u32) -> Result<()> {
        let session = &mut self.sessions[key as usize];
        let Some(fd) = session.fd() else {
            return Ok(());
        };
        session.begin(Op::Write);
        let buf = session.write_buf();

        let sqe = opcode::Write::new(Fd(fd), buf.as_ptr(), buf.len() as u32)
            .build()
            .user_data(encode_user_data(Op::Write, key));
        self.in_flight += 1;
        push_sqe(&mut self.ring, &sqe)
    }

    fn submit_read(&mut self, key: u32) -> Result<()> {
        let session = &mut self.sessions[key as usize];
        let Some(fd) = session.fd() else {
            return Ok(());
        };
        session.begin(Op::Read);
        let buf = session.read_buf();

        let sqe = opcode::Read::new(Fd(fd), buf.as_mut_ptr(), buf.len() as u32)
            .build()
            .user_data(encode_user_data(Op::Read, key));
        self.in_flight += 1;
        push_sqe(&mut self.ring, &sqe)
    }

    fn submit_wake_read(&mut self) -> Result<()> {
        let fd = self.control.waker(self.id).fd();
        let sqe = opcode::Read::new(Fd(fd), &mut *self.wake_buf as *mut u64 as *mut u8, 8)
            .build()
            .user_data(encode_user_data(Op::Wake, 0));
        push_sqe(&mut self.ring, &sqe)
    }

    fn handle_accept(&mut self, result: i32) -> Result<()> {
        let Some(acceptor) = self.acceptor.as_mut() else {
            return Ok(());
        };
        if result < 0 {
            // Existing sessions keep running; intake is over.
            error!(
                loop_id = self.id,
                error = %io::Error::from_raw_os_error(-result),
                "accept failed, no longer accepting"
            );
            return Ok(());
        }
        metrics::inc_accepts();

        let socket = unsafe { Socket::from_raw_fd(result) };
        let target = acceptor.next_loop();
        let next_accept = acceptor.entry();
        if target == self.id {
            self.adopt(socket)?;
        } else {
            acceptor.hand_off(target, socket);
        }
        push_sqe(&mut self.ring, &next_accept)
    }

    fn adopt(&mut self, socket: Socket) -> Result<()> {
        let session = Session::responder(socket, self.block_size, self.handler_memory);
        let key = self.sessions.insert(session) as u32;
        metrics::inc_adopted();
        metrics::inc_live_sessions();
        trace!(loop_id = self.id, key, "adopted connection");

        let step = self.sessions[key as usize].start();
        self.apply(key, step)
    }

    fn handle_wake(&mut self) -> Result<()> {
        let mut mails: Vec<Mail> = Vec::new();
        match self.mailbox.poll() {
            Ok(mut guard) => {
                for mail in &mut guard {
                    mails.push(*mail);
                }
            }
            Err(Polling::NoEvents) => {}
            Err(Polling::Shutdown) => {}
        }

        for mail in mails {
            match mail.kind {
                MailKind::Stop => self.stop_session(mail.key)?,
                MailKind::Adopt => {
                    // The acceptor gave up ownership of this fd when it posted.
                    let socket = unsafe { Socket::from_raw_fd(mail.fd) };
                    self.adopt(socket)?;
                }
                MailKind::Empty => {}
            }
        }

        self.submit_wake_read()
    }

    fn stop_session(&mut self, key: u32) -> Result<()> {
        let Some(session) = self.sessions.get_mut(key as usize) else {
            return Ok(());
        };
        let step = session.stop();
        self.apply(key, step)
    }

    fn handle_timer(&mut self) {
        if let Some(coordinator) = self.coordinator.as_mut() {
            coordinator.fire();
        }
    }
}
