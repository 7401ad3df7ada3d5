//! Wake-up pipes between the engine callback and the consumer thread.
//!
//! The write end never blocks: when the pipe is full the write is abandoned,
//! which coalesces the signal with the ones still unread. The read end is an
//! ordinary blocking descriptor that can also be handed to `poll`.
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd::{pipe, write};

use crate::BridgeError;

const WAKE_BYTE: &[u8] = b" ";

/// Largest payload a single [`Notifier::send`] accepts. Pipe writes up to this
/// size are atomic, so a payload never interleaves with another or arrives cut.
pub const MAX_ATOMIC_SEND: usize = nix::libc::PIPE_BUF;

/// Create a connected notifier/receiver pair.
pub fn channel() -> Result<(Notifier, NotifyReceiver), BridgeError> {
    let (read_end, write_end) = pipe().map_err(BridgeError::Notify)?;
    let flags = fcntl(&write_end, FcntlArg::F_GETFL).map_err(BridgeError::Notify)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(&write_end, FcntlArg::F_SETFL(flags)).map_err(BridgeError::Notify)?;
    Ok((
        Notifier { fd: write_end },
        NotifyReceiver {
            file: File::from(read_end),
        },
    ))
}

/// Non-blocking write end, owned by the real-time side.
#[derive(Debug)]
pub struct Notifier {
    fd: OwnedFd,
}

impl Notifier {
    /// Write a single wake-up byte. Returns `false` if the pipe was full.
    pub fn signal(&self) -> bool {
        self.send(WAKE_BYTE)
    }

    /// Write `bytes` with one non-blocking write. Returns `true` only if every
    /// byte went through. Payloads over [`MAX_ATOMIC_SEND`] are not written.
    pub fn send(&self, bytes: &[u8]) -> bool {
        if bytes.len() > MAX_ATOMIC_SEND {
            return false;
        }
        match write(&self.fd, bytes) {
            Ok(written) => written == bytes.len(),
            Err(_) => false,
        }
    }
}

/// Read end handed to the consumer.
#[derive(Debug)]
pub struct NotifyReceiver {
    file: File,
}

impl NotifyReceiver {
    /// Block until at least one byte is pending and consume what is there.
    ///
    /// Returns the number of bytes consumed; several signals may be coalesced
    /// into one call. `Ok(0)` means the real-time side has gone away.
    pub fn wait(&mut self) -> io::Result<usize> {
        let mut scratch = [0u8; 64];
        self.recv(&mut scratch)
    }

    /// Like [`wait`](Self::wait), but give up after `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<usize>> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        loop {
            let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::from(millis)) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }
        self.wait().map(Some)
    }

    /// Read raw bytes (MIDI payloads or wake-up bytes) into `buf`.
    pub fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.file.read(buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

impl Read for NotifyReceiver {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }
}

impl AsFd for NotifyReceiver {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for NotifyReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl From<NotifyReceiver> for OwnedFd {
    fn from(receiver: NotifyReceiver) -> Self {
        receiver.file.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_wakes_receiver() {
        let (notifier, mut receiver) = channel().unwrap();
        assert!(notifier.signal());
        assert_eq!(receiver.wait().unwrap(), 1);
    }

    #[test]
    fn full_pipe_coalesces_without_blocking() {
        let (notifier, mut receiver) = channel().unwrap();
        let mut sent = 0usize;
        while notifier.signal() {
            sent += 1;
            assert!(sent < 1 << 24, "pipe never filled");
        }
        assert!(sent > 0);
        assert!(!notifier.signal());

        let mut drained = 0usize;
        while drained < sent {
            drained += receiver.wait().unwrap();
        }
        assert_eq!(drained, sent);
        assert!(notifier.signal());
    }

    #[test]
    fn payload_bytes_arrive_verbatim() {
        let (notifier, mut receiver) = channel().unwrap();
        assert!(notifier.send(&[0x90, 60, 100]));
        assert!(notifier.send(&[0x80, 60, 0]));

        let mut buf = [0u8; 16];
        let mut got = Vec::new();
        while got.len() < 6 {
            let n = receiver.recv(&mut buf).unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, vec![0x90, 60, 100, 0x80, 60, 0]);
    }

    #[test]
    fn oversized_payload_is_refused_whole() {
        let (notifier, mut receiver) = channel().unwrap();
        assert!(!notifier.send(&vec![0xf0; MAX_ATOMIC_SEND + 1]));
        assert!(notifier.send(&[0x90, 64, 90]));

        let mut buf = [0u8; 16];
        assert_eq!(receiver.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0x90, 64, 90]);
    }

    #[test]
    fn wait_timeout_returns_none_when_idle() {
        let (notifier, mut receiver) = channel().unwrap();
        assert_eq!(
            receiver.wait_timeout(Duration::from_millis(10)).unwrap(),
            None
        );
        assert!(notifier.signal());
        assert_eq!(
            receiver.wait_timeout(Duration::from_millis(10)).unwrap(),
            Some(1)
        );
        drop(notifier);
        assert_eq!(
            receiver.wait_timeout(Duration::from_millis(10)).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn dropped_notifier_reads_as_end_of_stream() {
        let (notifier, mut receiver) = channel().unwrap();
        assert!(notifier.signal());
        drop(notifier);
        assert_eq!(receiver.wait().unwrap(), 1);
        assert_eq!(receiver.wait().unwrap(), 0);
    }
}
