//! Host/port to a single concrete endpoint.

use std::net::{SocketAddr, ToSocketAddrs};

use tracing::debug;

use crate::error::{Error, Result};

/// Resolve `host:port` and keep the first address the system returns.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs().map_err(|source| Error::Resolve {
        host: host.to_string(),
        port,
        source,
    })?;
    let addr = addrs.next().ok_or_else(|| Error::NoAddress {
        host: host.to_string(),
        port,
    })?;
    debug!(%addr, host, port, "resolved endpoint");
    Ok(addr)
}
