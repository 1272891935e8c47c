//! The echo side: an acceptor on loop 0 feeding responder sessions to every
//! loop. Runs until the process is terminated.

use std::io;
use std::net::SocketAddr;

use tracing::info;

use crate::acceptor::{self, Acceptor};
use crate::config::{SERVER_MAILBOX_SIZE, ServerConfig};
use crate::error::{Error, Result};
use crate::pool::{LoopPool, RunningPool};
use crate::resolve::resolve;

pub struct Server {
    local_addr: SocketAddr,
    pool: Option<LoopPool>,
    running: Option<RunningPool>,
}

impl Server {
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let addr = resolve(&config.host, config.port)?;
        let listener = acceptor::listen(addr)?;
        let local_addr = listener
            .local_addr()
            .and_then(|a| {
                a.as_socket()
                    .ok_or_else(|| io::Error::other("listener has no inet address"))
            })
            .map_err(|source| Error::Bind { addr, source })?;

        let mut pool = LoopPool::new(config.threads, SERVER_MAILBOX_SIZE)?;
        for i in 0..pool.len() {
            pool.assign(i).serve(config.block_size, config.handler_memory);
        }
        let acceptor = Acceptor::new(listener, pool.senders());
        pool.assign(0).install_acceptor(acceptor);

        info!(
            addr = %local_addr,
            threads = config.threads,
            block_size = config.block_size,
            "server listening"
        );
        Ok(Self {
            local_addr,
            pool: Some(pool),
            running: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn start(&mut self) -> Result<()> {
        let pool = self
            .pool
            .take()
            .ok_or(Error::InvalidConfig("server already started"))?;
        self.running = Some(pool.start()?);
        Ok(())
    }

    /// Block on the loops. They only return if one of them fails.
    pub fn wait(self) -> Result<()> {
        let running = self.running.ok_or(Error::NotStarted)?;
        running.join().map(|_| ())
    }
}
