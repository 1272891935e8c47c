//! Client run-duration timer and the shutdown it triggers.
//!
//! The timer is an io_uring timeout on loop 0. When it expires the
//! coordinator raises the pool's stop intent and posts one `Stop` per session
//! into the mailbox of the loop that owns it. It never touches a session
//! directly: sessions on other loops are only reachable through their mailbox.

use std::sync::Arc;
use std::time::Duration;

use io_uring::{opcode, squeue::Entry, types::Timespec};
use tracing::info;

use crate::mailbox::MailSender;
use crate::pool::PoolControl;
use crate::ring_types::{Mail, Op, encode_user_data};

/// Where a session lives: loop index plus slab key on that loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub home: usize,
    pub key: u32,
}

pub struct Coordinator {
    // Boxed: the kernel reads it until the timeout completes.
    timeout: Box<Timespec>,
    duration: Duration,
    targets: Vec<Target>,
    senders: Vec<MailSender>,
    control: Arc<PoolControl>,
    fired: bool,
}

impl Coordinator {
    pub fn new(
        duration: Duration,
        targets: Vec<Target>,
        senders: Vec<MailSender>,
        control: Arc<PoolControl>,
    ) -> Self {
        let timeout = Box::new(
            Timespec::new()
                .sec(duration.as_secs())
                .nsec(duration.subsec_nanos()),
        );
        Self {
            timeout,
            duration,
            targets,
            senders,
            control,
            fired: false,
        }
    }

    pub fn timer_entry(&self) -> Entry {
        opcode::Timeout::new(&*self.timeout as *const Timespec)
            .build()
            .user_data(encode_user_data(Op::Timer, 0))
    }

    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Raise stop intent and post a stop to every session's own loop.
    /// Only the first call does anything.
    pub fn fire(&mut self) {
        if self.fired {
            return;
        }
        self.fired = true;
        info!(
            duration_secs = self.duration.as_secs_f64(),
            sessions = self.targets.len(),
            "run duration elapsed, stopping sessions"
        );

        self.control.request_stop();
        for target in &self.targets {
            self.senders[target.home].send(Mail::stop(target.key));
        }
        for sender in &self.senders {
            sender.signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{MailPoller, Waker, build_mailbox};

    fn drain(poller: &mut MailPoller) -> Vec<Mail> {
        let mut out = Vec::new();
        if let Ok(mut guard) = poller.poll() {
            for mail in &mut guard {
                out.push(*mail);
            }
        }
        out
    }

    fn setup(loops: usize) -> (Arc<PoolControl>, Vec<MailSender>, Vec<MailPoller>) {
        let wakers: Vec<Waker> = (0..loops).map(|_| Waker::new().unwrap()).collect();
        let control = Arc::new(PoolControl::new(wakers.clone()));
        let (senders, pollers) = wakers
            .into_iter()
            .map(|w| build_mailbox(64, w))
            .unzip();
        (control, senders, pollers)
    }

    #[test]
    fn fire_posts_stop_to_each_session_home() {
        let (control, senders, mut pollers) = setup(2);
        let targets = vec![
            Target { home: 0, key: 0 },
            Target { home: 1, key: 0 },
            Target { home: 0, key: 1 },
        ];
        let mut coord = Coordinator::new(Duration::from_secs(1), targets, senders, control.clone());

        assert!(!control.is_stopping());
        coord.fire();
        assert!(coord.fired());
        assert!(control.is_stopping());

        assert_eq!(drain(&mut pollers[0]), vec![Mail::stop(0), Mail::stop(1)]);
        assert_eq!(drain(&mut pollers[1]), vec![Mail::stop(0)]);
    }

    #[test]
    fn second_fire_posts_nothing() {
        let (control, senders, mut pollers) = setup(1);
        let targets = vec![Target { home: 0, key: 5 }];
        let mut coord = Coordinator::new(Duration::from_secs(1), targets, senders, control);

        coord.fire();
        assert_eq!(drain(&mut pollers[0]).len(), 1);
        coord.fire();
        assert!(drain(&mut pollers[0]).is_empty());
    }
}
