//! The measuring side: many initiator sessions spread over a loop pool,
//! stopped by the coordinator after the configured duration.

use std::net::SocketAddr;

use tracing::info;

use crate::config::{ClientConfig, client_mailbox_size};
use crate::coordinator::{Coordinator, Target};
use crate::error::{Error, Result};
use crate::pool::{LoopPool, RunningPool};
use crate::resolve::resolve;
use crate::session::Session;
use crate::stats::Stats;

pub struct Client {
    config: ClientConfig,
    endpoint: SocketAddr,
    pool: Option<LoopPool>,
    running: Option<RunningPool>,
}

impl Client {
    /// Resolve the target, build the loops and seed every session round-robin.
    /// Nothing touches the network until [`Client::start`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = resolve(&config.host, config.port)?;
        let mut pool = LoopPool::new(
            config.threads,
            client_mailbox_size(config.sessions_per_loop()),
        )?;

        let mut targets = Vec::with_capacity(config.sessions);
        for i in 0..config.sessions {
            let reactor = pool.assign(i);
            let home = reactor.id();
            let key = reactor.insert(Session::initiator(config.block_size, config.handler_memory));
            targets.push(Target { home, key });
        }
        for i in 0..pool.len() {
            pool.assign(i).connect_to(endpoint);
        }

        let coordinator = Coordinator::new(config.duration, targets, pool.senders(), pool.control());
        pool.assign(0).install_coordinator(coordinator);

        Ok(Self {
            config,
            endpoint,
            pool: Some(pool),
            running: None,
        })
    }

    /// Start the loops; each begins connecting its sessions and the run
    /// timer is armed on loop 0.
    pub fn start(&mut self) -> Result<()> {
        let pool = self
            .pool
            .take()
            .ok_or(Error::InvalidConfig("client already started"))?;
        info!(
            endpoint = %self.endpoint,
            threads = self.config.threads,
            sessions = self.config.sessions,
            block_size = self.config.block_size,
            duration_secs = self.config.duration.as_secs(),
            "starting client"
        );
        self.running = Some(pool.start()?);
        Ok(())
    }

    /// Join every loop, then aggregate the final session counters.
    pub fn wait(self) -> Result<Stats> {
        let running = self.running.ok_or(Error::NotStarted)?;
        let sessions = running.join()?;
        Ok(Stats::from_sessions(self.config.duration, &sessions))
    }
}
