//! Cross-loop posting: a multi-producer disruptor ring per loop plus the
//! eventfd that wakes the loop's io_uring when something lands in it.

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use disruptor::{
    BusySpin, EventPoller, MultiProducer, MultiProducerBarrier, Producer, RingBufferFull,
    SingleConsumerBarrier, build_multi_producer,
};

use crate::metrics;
use crate::ring_types::Mail;

pub type MailProducer = MultiProducer<Mail, SingleConsumerBarrier>;
pub type MailPoller = EventPoller<Mail, MultiProducerBarrier>;

/// Shared handle on a loop's eventfd.
#[derive(Clone, Debug)]
pub struct Waker(Arc<OwnedFd>);

impl Waker {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self(Arc::new(unsafe { OwnedFd::from_raw_fd(fd) })))
    }

    pub fn fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    /// Bump the eventfd counter so the owning loop's pending read completes.
    pub fn wake(&self) {
        let val: u64 = 1;
        unsafe {
            libc::write(self.fd(), &val as *const u64 as *const libc::c_void, 8);
        }
    }
}

/// Producer half; any thread may hold a clone.
#[derive(Clone)]
pub struct MailSender {
    producer: MailProducer,
    waker: Waker,
}

impl MailSender {
    /// Publish without waking the target. Spins while the ring is full.
    pub fn send(&mut self, mail: Mail) {
        loop {
            match self.producer.try_publish(|slot| *slot = mail) {
                Ok(_) => return,
                Err(RingBufferFull) => {
                    metrics::inc_mailbox_full();
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Wake the target loop. Call after sending a batch.
    pub fn signal(&self) {
        self.waker.wake();
    }

    pub fn post(&mut self, mail: Mail) {
        self.send(mail);
        self.signal();
    }
}

/// Build a matched sender/poller pair for one loop's mailbox.
pub fn build_mailbox(capacity: usize, waker: Waker) -> (MailSender, MailPoller) {
    let builder = build_multi_producer(capacity, Mail::empty, BusySpin);
    let (poller, builder) = builder.event_poller();
    let producer = builder.build();

    (MailSender { producer, waker }, poller)
}
