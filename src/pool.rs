//! Fixed set of reactors, one worker thread each.
//!
//! Reactors are built up front so the owner can seed sessions, an acceptor or
//! a coordinator into them, then [`LoopPool::start`] moves each one onto its
//! own thread. Once running, the only way to reach a loop is its mailbox or
//! its waker.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use io_uring::IoUring;
use tracing::{debug, error, info};

use crate::config::RING_ENTRIES;
use crate::error::{Error, Result};
use crate::mailbox::{MailSender, Waker, build_mailbox};
use crate::reactor::Reactor;
use crate::session::Session;

/// State shared by every loop of a pool.
#[derive(Debug)]
pub struct PoolControl {
    stopping: AtomicBool,
    wakers: Vec<Waker>,
}

impl PoolControl {
    pub fn new(wakers: Vec<Waker>) -> Self {
        Self {
            stopping: AtomicBool::new(false),
            wakers,
        }
    }

    /// Loops return once this is set and they have no session I/O left.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        for waker in &self.wakers {
            waker.wake();
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn waker(&self, loop_id: usize) -> &Waker {
        &self.wakers[loop_id]
    }
}

pub struct LoopPool {
    reactors: Vec<Reactor>,
    senders: Vec<MailSender>,
    control: Arc<PoolControl>,
}

impl LoopPool {
    pub fn new(size: usize, mailbox_capacity: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig("loop pool needs at least one loop"));
        }
        let wakers = (0..size)
            .map(|_| Waker::new())
            .collect::<io::Result<Vec<_>>>()
            .map_err(Error::EventFd)?;
        let control = Arc::new(PoolControl::new(wakers.clone()));

        let mut reactors = Vec::with_capacity(size);
        let mut senders = Vec::with_capacity(size);
        for (id, waker) in wakers.into_iter().enumerate() {
            let ring = IoUring::new(RING_ENTRIES).map_err(Error::Ring)?;
            let (sender, poller) = build_mailbox(mailbox_capacity, waker);
            reactors.push(Reactor::new(id, ring, poller, Arc::clone(&control)));
            senders.push(sender);
        }

        Ok(Self {
            reactors,
            senders,
            control,
        })
    }

    pub fn len(&self) -> usize {
        self.reactors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
    }

    /// Reactor for work item `index` under round-robin assignment.
    pub fn assign(&mut self, index: usize) -> &mut Reactor {
        let n = self.reactors.len();
        &mut self.reactors[index % n]
    }

    /// One sender per loop, indexed by loop id.
    pub fn senders(&self) -> Vec<MailSender> {
        self.senders.clone()
    }

    pub fn control(&self) -> Arc<PoolControl> {
        Arc::clone(&self.control)
    }

    pub fn start(self) -> Result<RunningPool> {
        let mut workers = Vec::with_capacity(self.reactors.len());
        for reactor in self.reactors {
            let id = reactor.id();
            let guard = StopOnPanic(Arc::clone(&self.control));
            let spawned = thread::Builder::new()
                .name(format!("loop-{id}"))
                .spawn(move || {
                    let _guard = guard;
                    reactor.run()
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Loops already running would otherwise never be told to stop.
                    self.control.request_stop();
                    return Err(Error::Spawn(e));
                }
            }
        }
        info!(loops = workers.len(), "event loops started");

        Ok(RunningPool {
            workers,
            control: self.control,
        })
    }
}

pub struct RunningPool {
    workers: Vec<JoinHandle<Result<Vec<Session>>>>,
    control: Arc<PoolControl>,
}

impl RunningPool {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Ask every loop to return once its outstanding session I/O is done.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Block until every worker has exited and collect the sessions the
    /// loops still owned. Reports the first worker failure, if any, after all
    /// workers are joined.
    pub fn join(self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        let mut failure = None;
        for (id, worker) in self.workers.into_iter().enumerate() {
            match worker.join() {
                Ok(Ok(mut owned)) => {
                    debug!(loop_id = id, sessions = owned.len(), "worker exited cleanly");
                    sessions.append(&mut owned);
                }
                Ok(Err(e)) => {
                    error!(loop_id = id, error = %e, "worker returned error");
                    failure.get_or_insert(e);
                }
                Err(_) => {
                    error!(loop_id = id, "worker panicked");
                    failure.get_or_insert(Error::WorkerPanicked(id));
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(sessions),
        }
    }
}

struct StopOnPanic(Arc<PoolControl>);

impl Drop for StopOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::Fault;
    use std::sync::mpsc;
    use std::time::Duration;

    fn uring_available() -> bool {
        IoUring::new(8).is_ok()
    }

    /// Join on a helper thread so a loop that never exits fails the test
    /// instead of hanging it.
    fn join_within(running: RunningPool, limit: Duration) -> Result<Vec<Session>> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(running.join());
        });
        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(_) => panic!("pool did not join within {limit:?}"),
        }
    }

    #[test]
    fn failing_loop_stops_the_rest_of_the_pool() {
        if !uring_available() {
            return;
        }
        let mut pool = LoopPool::new(3, 64).unwrap();
        pool.assign(1).inject(Fault::Fail);
        let control = pool.control();

        let running = pool.start().unwrap();
        let result = join_within(running, Duration::from_secs(5));

        assert!(matches!(result, Err(Error::Ring(_))), "{result:?}");
        assert!(control.is_stopping());
    }

    #[test]
    fn panicking_loop_is_reported_after_every_worker_exits() {
        if !uring_available() {
            return;
        }
        let mut pool = LoopPool::new(2, 64).unwrap();
        pool.assign(0).inject(Fault::Panic);
        // Loop 1 sits idle in its ring wait until stop intent wakes it.
        pool.assign(1).insert(Session::initiator(32, false));
        let control = pool.control();

        let running = pool.start().unwrap();
        let result = join_within(running, Duration::from_secs(5));

        assert!(matches!(result, Err(Error::WorkerPanicked(0))), "{result:?}");
        assert!(control.is_stopping());
    }
}
