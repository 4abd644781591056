//! Unix-domain datagram transport.
//!
//! Endpoints are addressed by filesystem path. `UdsTransport` does
//! blocking/non-blocking reads directly against a `UnixDatagram`, adding
//! `SCM_RIGHTS` ancillary data for the one optional descriptor a [`Frame`]
//! may carry.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, warn};
use nix::cmsg_space;
use nix::sys::socket::{
    ControlMessage, ControlMessageOwned, MsgFlags, UnixAddr, recvmsg, sendmsg,
};
use nix::sys::uio::IoSlice;

use crate::error::StoreError;
use crate::ipc::frame::{self, Frame};

/// Governs [`UdsTransport::send`]'s retry behavior on transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of send attempts before giving up.
    pub max_attempts: u32,
    /// Upper bound on total wall-clock time spent retrying.
    pub total_timeout: Duration,
    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            total_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_millis(50),
        }
    }
}

/// A bound Unix datagram endpoint used by a [`crate::ipc::port::Port`].
#[derive(Debug)]
pub struct UdsTransport {
    socket: UnixDatagram,
    path: PathBuf,
}

impl UdsTransport {
    /// Binds a fresh non-blocking datagram socket at `path`, removing any
    /// stale socket file left behind by a prior incarnation.
    pub fn bind(path: &Path) -> io::Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let socket = UnixDatagram::bind(path)?;
        socket.set_nonblocking(true)?;
        Ok(UdsTransport {
            socket,
            path: path.to_owned(),
        })
    }

    /// This endpoint's bound path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sends `frame` to `to_path`, retrying transient failures up to
    /// `policy`'s budget. A descriptor attached to the frame (if any) travels
    /// via `SCM_RIGHTS`.
    pub fn send(&self, to_path: &Path, frame: &Frame, policy: RetryPolicy) -> crate::error::Result<()> {
        let bytes = frame.to_bytes()?;
        let dest = UnixAddr::new(to_path).map_err(|e| StoreError::Io(io::Error::from(e)))?;
        let iov = [IoSlice::new(&bytes)];

        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = if frame.has_fd() {
                // take_fd() requires &mut; Frame::send callers are expected
                // to hand over ownership, so we borrow the raw fd instead of
                // consuming the frame here.
                Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "use send_with_fd to transmit a frame carrying a descriptor",
                ))
            } else {
                sendmsg(self.socket.as_raw_fd(), &iov, &[], MsgFlags::empty(), Some(&dest))
                    .map(|_| ())
                    .map_err(io::Error::from)
            };

            match result {
                Ok(()) => return Ok(()),
                Err(err) if StoreError::is_transient(&err) && attempt < policy.max_attempts => {
                    if started.elapsed() > policy.total_timeout {
                        warn!("send to {to_path:?} timed out after {attempt} attempts");
                        return Err(StoreError::Timeout);
                    }
                    debug!("transient send failure to {to_path:?} (attempt {attempt}): {err}");
                    std::thread::sleep(policy.retry_delay);
                }
                Err(err) => return Err(StoreError::from_errno(err)),
            }
        }
    }

    /// Sends `frame` along with an attached descriptor, consuming both.
    pub fn send_with_fd(
        &self,
        to_path: &Path,
        mut frame: Frame,
        policy: RetryPolicy,
    ) -> crate::error::Result<()> {
        let fd = frame.take_fd();
        let bytes = frame.to_bytes()?;
        let dest = UnixAddr::new(to_path).map_err(|e| StoreError::Io(io::Error::from(e)))?;
        let iov = [IoSlice::new(&bytes)];
        let raw_fd = fd.as_ref().map(|f| f.as_raw_fd());
        let cmsgs: Vec<ControlMessage<'_>> = raw_fd
            .as_ref()
            .map(|fd| vec![ControlMessage::ScmRights(std::slice::from_ref(fd))])
            .unwrap_or_default();

        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match sendmsg(self.socket.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), Some(&dest))
                .map(|_| ())
                .map_err(io::Error::from)
            {
                Ok(()) => return Ok(()),
                Err(err) if StoreError::is_transient(&err) && attempt < policy.max_attempts => {
                    if started.elapsed() > policy.total_timeout {
                        return Err(StoreError::Timeout);
                    }
                    std::thread::sleep(policy.retry_delay);
                }
                Err(err) => return Err(StoreError::from_errno(err)),
            }
        }
    }

    /// Receives one datagram, decoding it as a [`Frame`]. Returns `Ok(None)`
    /// on `EAGAIN`/`EWOULDBLOCK` (no datagram currently pending) so callers
    /// can poll this alongside other event sources.
    pub fn recv(&self) -> crate::error::Result<Option<Frame>> {
        let mut payload = vec![0u8; frame::MAX_SIZE + 4];
        let mut iov = [std::io::IoSliceMut::new(&mut payload)];
        let mut cmsg_buffer = cmsg_space!(std::os::fd::RawFd);

        match recvmsg::<UnixAddr>(
            self.socket.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buffer),
            MsgFlags::empty(),
        ) {
            Ok(msg) => {
                let len = msg.bytes;
                let mut fd = None;
                for cmsg in msg.cmsgs().map_err(|e| StoreError::Io(io::Error::from(e)))? {
                    if let ControlMessageOwned::ScmRights(fds) = cmsg {
                        if let Some(raw) = fds.into_iter().next() {
                            // SAFETY: the kernel handed us ownership of this
                            // descriptor via SCM_RIGHTS.
                            fd = Some(unsafe { OwnedFd::from_raw_fd_checked(raw) });
                        }
                    }
                }
                Frame::parse(&payload[..len], fd).map(Some)
            }
            Err(nix::errno::Errno::EAGAIN) => Ok(None),
            Err(e) => Err(StoreError::from_errno(io::Error::from(e))),
        }
    }
}

/// Thin helper so `recvmsg`'s raw fd can become an owned one without pulling
/// in an extra dependency; the raw value always originates from a kernel
/// `SCM_RIGHTS` payload handed to us via `recvmsg`, so it is always valid.
trait FromRawFdChecked {
    unsafe fn from_raw_fd_checked(fd: std::os::fd::RawFd) -> OwnedFd;
}

impl FromRawFdChecked for OwnedFd {
    unsafe fn from_raw_fd_checked(fd: std::os::fd::RawFd) -> OwnedFd {
        use std::os::fd::FromRawFd;
        unsafe { OwnedFd::from_raw_fd(fd) }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipc::messages::MessageType;

    #[test]
    fn bind_and_simple_send_recv() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.ipc");
        let b_path = dir.path().join("b.ipc");
        let a = UdsTransport::bind(&a_path).unwrap();
        let b = UdsTransport::bind(&b_path).unwrap();

        let mut frame = Frame::new();
        frame.set_type(MessageType::FindStrand);
        frame.put_pod(&99u32).unwrap();

        a.send(&b_path, &frame, RetryPolicy::default()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let received = b.recv().unwrap().expect("datagram pending");
        received.check_type(MessageType::FindStrand).unwrap();
        let _ = a_path; // keep a's path alive for Debug in case of failure
    }

    #[test]
    fn recv_with_nothing_pending_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solo.ipc");
        let t = UdsTransport::bind(&path).unwrap();
        assert!(t.recv().unwrap().is_none());
    }
}
