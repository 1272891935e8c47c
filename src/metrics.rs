#[cfg(feature = "metrics")]
mod imp {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use tracing::info;

    // Connection intake (cumulative counts)
    static CONNECTS: AtomicU64 = AtomicU64::new(0);
    static CONNECT_FAILURES: AtomicU64 = AtomicU64::new(0);
    static ACCEPTS: AtomicU64 = AtomicU64::new(0);
    static ADOPTED: AtomicU64 = AtomicU64::new(0);
    // Transfer (cumulative)
    static BLOCKS_WRITTEN: AtomicU64 = AtomicU64::new(0);
    static BLOCKS_READ: AtomicU64 = AtomicU64::new(0);
    static TRANSFER_ERRORS: AtomicU64 = AtomicU64::new(0);
    // Shutdown / backpressure
    static STOP_REQUESTS: AtomicU64 = AtomicU64::new(0);
    static MAILBOX_FULL: AtomicU64 = AtomicU64::new(0);
    // Gauges
    static LIVE_SESSIONS: AtomicUsize = AtomicUsize::new(0);
    static MAX_LIVE_SESSIONS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone, Copy)]
    pub struct MetricsSnapshot {
        pub connects: u64,
        pub connect_failures: u64,
        pub accepts: u64,
        pub adopted: u64,
        pub blocks_written: u64,
        pub blocks_read: u64,
        pub transfer_errors: u64,
        pub stop_requests: u64,
        pub mailbox_full: u64,
        pub live_sessions: usize,
        pub max_live_sessions: usize,
    }

    pub fn inc_connects() {
        CONNECTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_connect_failures() {
        CONNECT_FAILURES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_accepts() {
        ACCEPTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_adopted() {
        ADOPTED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_blocks_written() {
        BLOCKS_WRITTEN.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_blocks_read() {
        BLOCKS_READ.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_transfer_errors() {
        TRANSFER_ERRORS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stop_requests() {
        STOP_REQUESTS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_mailbox_full() {
        MAILBOX_FULL.fetch_add(1, Ordering::Relaxed);
    }

    fn update_max(target: &AtomicUsize, value: usize) {
        let mut prev = target.load(Ordering::Relaxed);
        while value > prev {
            match target.compare_exchange_weak(prev, value, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(next) => prev = next,
            }
        }
    }

    pub fn inc_live_sessions() {
        let v = LIVE_SESSIONS.fetch_add(1, Ordering::Relaxed) + 1;
        update_max(&MAX_LIVE_SESSIONS, v);
    }

    pub fn dec_live_sessions() {
        LIVE_SESSIONS.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            connects: CONNECTS.load(Ordering::Relaxed),
            connect_failures: CONNECT_FAILURES.load(Ordering::Relaxed),
            accepts: ACCEPTS.load(Ordering::Relaxed),
            adopted: ADOPTED.load(Ordering::Relaxed),
            blocks_written: BLOCKS_WRITTEN.load(Ordering::Relaxed),
            blocks_read: BLOCKS_READ.load(Ordering::Relaxed),
            transfer_errors: TRANSFER_ERRORS.load(Ordering::Relaxed),
            stop_requests: STOP_REQUESTS.load(Ordering::Relaxed),
            mailbox_full: MAILBOX_FULL.load(Ordering::Relaxed),
            live_sessions: LIVE_SESSIONS.load(Ordering::Relaxed),
            max_live_sessions: MAX_LIVE_SESSIONS.load(Ordering::Relaxed),
        }
    }

    pub fn spawn_reporter() {
        const INTERVAL_SECS: u64 = 10;
        std::thread::spawn(|| {
            let mut last_snap = snapshot();
            loop {
                std::thread::sleep(Duration::from_secs(INTERVAL_SECS));
                let snap = snapshot();
                info!(
                    interval_secs = INTERVAL_SECS,
                    connects = snap.connects.saturating_sub(last_snap.connects),
                    connect_failures = snap
                        .connect_failures
                        .saturating_sub(last_snap.connect_failures),
                    accepts = snap.accepts.saturating_sub(last_snap.accepts),
                    adopted = snap.adopted.saturating_sub(last_snap.adopted),
                    blocks_written = snap.blocks_written.saturating_sub(last_snap.blocks_written),
                    blocks_read = snap.blocks_read.saturating_sub(last_snap.blocks_read),
                    transfer_errors = snap.transfer_errors.saturating_sub(last_snap.transfer_errors),
                    stop_requests = snap.stop_requests.saturating_sub(last_snap.stop_requests),
                    mailbox_full = snap.mailbox_full.saturating_sub(last_snap.mailbox_full),
                    live_sessions = snap.live_sessions,
                    max_live_sessions = snap.max_live_sessions,
                    "metrics delta"
                );
                last_snap = snap;
            }
        });
    }
}

#[cfg(not(feature = "metrics"))]
#[allow(dead_code)]
mod imp {
    #[derive(Clone, Copy)]
    pub struct MetricsSnapshot {
        pub connects: u64,
        pub connect_failures: u64,
        pub accepts: u64,
        pub adopted: u64,
        pub blocks_written: u64,
        pub blocks_read: u64,
        pub transfer_errors: u64,
        pub stop_requests: u64,
        pub mailbox_full: u64,
        pub live_sessions: usize,
        pub max_live_sessions: usize,
    }

    pub fn inc_connects() {}
    pub fn inc_connect_failures() {}
    pub fn inc_accepts() {}
    pub fn inc_adopted() {}
    pub fn inc_blocks_written() {}
    pub fn inc_blocks_read() {}
    pub fn inc_transfer_errors() {}
    pub fn inc_stop_requests() {}
    pub fn inc_mailbox_full() {}
    pub fn inc_live_sessions() {}
    pub fn dec_live_sessions() {}
    pub fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            connects: 0,
            connect_failures: 0,
            accepts: 0,
            adopted: 0,
            blocks_written: 0,
            blocks_read: 0,
            transfer_errors: 0,
            stop_requests: 0,
            mailbox_full: 0,
            live_sessions: 0,
            max_live_sessions: 0,
        }
    }
    pub fn spawn_reporter() {}
}

pub use imp::*;
