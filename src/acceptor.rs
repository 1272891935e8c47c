//! Server intake: the listening socket and round-robin routing of accepted
//! connections across loops.

use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, IntoRawFd};
use std::ptr;

use io_uring::{opcode, squeue::Entry, types::Fd};
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::LISTEN_BACKLOG;
use crate::error::{Error, Result};
use crate::mailbox::MailSender;
use crate::ring_types::{Mail, Op, encode_user_data};

/// Create, bind and listen on `addr`.
pub fn listen(addr: SocketAddr) -> Result<Socket> {
    let bind_err = |source| Error::Bind { addr, source };
    let socket =
        Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
    Ok(socket)
}

pub struct Acceptor {
    listener: Socket,
    next: usize,
    senders: Vec<MailSender>,
}

impl Acceptor {
    /// `senders[i]` must be the mailbox of loop `i`.
    pub fn new(listener: Socket, senders: Vec<MailSender>) -> Self {
        Self {
            listener,
            next: 0,
            senders,
        }
    }

    pub fn entry(&self) -> Entry {
        opcode::Accept::new(Fd(self.listener.as_raw_fd()), ptr::null_mut(), ptr::null_mut())
            .build()
            .user_data(encode_user_data(Op::Accept, 0))
    }

    /// Loop that gets the next accepted connection.
    pub fn next_loop(&mut self) -> usize {
        let target = self.next % self.senders.len();
        self.next = self.next.wrapping_add(1);
        target
    }

    /// Give `socket` to loop `target`, which adopts it when it drains its
    /// mailbox.
    pub fn hand_off(&mut self, target: usize, socket: Socket) {
        self.senders[target].post(Mail::adopt(socket.into_raw_fd()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{Waker, build_mailbox};
    use crate::ring_types::MailKind;

    #[test]
    fn routes_round_robin_over_all_loops() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let senders = (0..3)
            .map(|_| build_mailbox(64, Waker::new().unwrap()).0)
            .collect();
        let mut acceptor = Acceptor::new(listener, senders);
        let order: Vec<usize> = (0..7).map(|_| acceptor.next_loop()).collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn hand_off_posts_adopt_with_fd() {
        let listener = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let (sender, mut poller) = build_mailbox(64, Waker::new().unwrap());
        let mut acceptor = Acceptor::new(listener, vec![sender]);

        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
        let fd = socket.as_raw_fd();
        acceptor.hand_off(0, socket);

        let mut got = Vec::new();
        if let Ok(mut guard) = poller.poll() {
            for mail in &mut guard {
                got.push(*mail);
            }
        }
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind, MailKind::Adopt);
        assert_eq!(got[0].fd, fd);
        unsafe {
            libc::close(fd);
        }
    }

    #[test]
    fn binding_a_taken_port_fails() {
        let first = listen("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap().as_socket().unwrap();
        assert!(matches!(listen(addr), Err(Error::Bind { .. })));
    }
}
