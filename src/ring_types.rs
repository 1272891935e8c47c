use std::os::unix::io::RawFd;

/// Operation tag carried in the high half of an io_uring `user_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Op {
    Accept = 0,
    Connect = 1,
    Read = 2,
    Write = 3,
    Wake = 4,
    Timer = 5,
    Cancel = 6,
}

impl Op {
    fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Op::Accept,
            1 => Op::Connect,
            2 => Op::Read,
            3 => Op::Write,
            4 => Op::Wake,
            5 => Op::Timer,
            6 => Op::Cancel,
            _ => return None,
        })
    }
}

/// Encode operation type + session key into io_uring user_data.
pub fn encode_user_data(op: Op, key: u32) -> u64 {
    ((op as u64) << 32) | key as u64
}

pub fn decode_user_data(user_data: u64) -> (Option<Op>, u32) {
    (Op::from_u32((user_data >> 32) as u32), user_data as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Empty,
    /// Close the session with this key on the receiving loop.
    Stop,
    /// Take ownership of an accepted socket and serve it.
    Adopt,
}

/// Entry in a loop's mailbox ring. Pre-allocated per slot via factory;
/// posters fill these in the publish closure, the owning loop reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mail {
    pub kind: MailKind,
    pub key: u32,
    pub fd: RawFd,
}

impl Mail {
    /// Factory for disruptor - empty slots that get overwritten on publish.
    pub fn empty() -> Self {
        Self {
            kind: MailKind::Empty,
            key: 0,
            fd: -1,
        }
    }

    pub fn stop(key: u32) -> Self {
        Self {
            kind: MailKind::Stop,
            key,
            fd: -1,
        }
    }

    pub fn adopt(fd: RawFd) -> Self {
        Self {
            kind: MailKind::Adopt,
            key: 0,
            fd,
        }
    }
}
