#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pingbench::Server;
use pingbench::config::{ClientConfig, ServerConfig};
use pingbench::pool::RunningPool;
use pingbench::session::Session;

/// Kernels or sandboxes without io_uring cannot run the loop tests.
pub fn uring_available() -> bool {
    match io_uring::IoUring::new(8) {
        Ok(_) => true,
        Err(e) => {
            eprintln!("skipping: io_uring unavailable ({e})");
            false
        }
    }
}

pub fn client_config(port: u16, threads: usize, sessions: usize, block_size: usize) -> ClientConfig {
    ClientConfig {
        host: "127.0.0.1".into(),
        port,
        threads,
        sessions,
        block_size,
        duration: Duration::from_secs(1),
        handler_memory: false,
    }
}

/// Start a pingbench server on an ephemeral loopback port. It runs for the
/// rest of the test process.
pub fn spawn_server(threads: usize, block_size: usize) -> SocketAddr {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        threads,
        block_size,
        handler_memory: true,
    };
    let mut server = Server::bind(&config).expect("server bind");
    let addr = server.local_addr();
    server.start().expect("server start");
    // Dropping the handle detaches the loop threads; they serve until exit.
    drop(server);
    addr
}

/// Join the pool on a helper thread, failing the test if any loop is still
/// running after `limit`.
pub fn join_within(running: RunningPool, limit: Duration) -> pingbench::Result<Vec<Session>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(running.join());
    });
    rx.recv_timeout(limit)
        .unwrap_or_else(|_| panic!("pool did not join within {limit:?}"))
}

/// A port nothing is listening on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Blocking echo server that serves `connections` peers and drops every
/// connection once `lifetime` has passed.
pub fn spawn_dying_echo(
    connections: usize,
    block_size: usize,
    lifetime: Duration,
) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let deadline = Instant::now() + lifetime;

    let handle = thread::spawn(move || {
        let mut peers = Vec::with_capacity(connections);
        for _ in 0..connections {
            let (stream, _) = listener.accept().unwrap();
            peers.push(thread::spawn(move || echo_until(stream, block_size, deadline)));
        }
        for peer in peers {
            let _ = peer.join();
        }
    });
    (addr, handle)
}

fn echo_until(mut stream: TcpStream, block_size: usize, deadline: Instant) {
    stream.set_nodelay(true).unwrap();
    let mut buf = vec![0u8; block_size];
    while Instant::now() < deadline {
        if stream.read_exact(&mut buf).is_err() {
            return;
        }
        if stream.write_all(&buf).is_err() {
            return;
        }
    }
    // Dropping the stream is the "server died" moment.
}
