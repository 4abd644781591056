//! Typed message frame.
//!
//! A fixed-size datagram carrying a self-describing payload plus at most one
//! OS file descriptor through ancillary data.

use std::os::fd::OwnedFd;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::StoreError;
use crate::ipc::messages::MessageType;

/// Maximum datagram payload size, matching `Ipc::TypedMsgHdr::maxSize`.
pub const MAX_SIZE: usize = 4096;

/// A typed, self-describing IPC datagram.
///
/// `Frame` is used both to build an outgoing message (`put_*` calls, in
/// order) and to parse an incoming one (`get_*` calls, in the same order the
/// sender used). Mixing the two on one instance is a programmer error the
/// offset bookkeeping does not attempt to prevent.
#[derive(Debug)]
pub struct Frame {
    type_id: Option<MessageType>,
    buf: Vec<u8>,
    /// Read cursor; also the write cursor while building a frame.
    offset: usize,
    fd: Option<OwnedFd>,
}

impl Frame {
    /// Creates an empty frame ready for `put_*` calls.
    pub fn new() -> Self {
        Frame {
            type_id: None,
            buf: Vec::with_capacity(MAX_SIZE),
            offset: 0,
            fd: None,
        }
    }

    /// Parses a received datagram. The first four bytes are the type tag;
    /// everything after is payload consumed by `get_*` calls in the order
    /// the sender wrote it.
    pub fn parse(data: &[u8], fd: Option<OwnedFd>) -> crate::error::Result<Self> {
        if data.len() < 4 {
            return Err(StoreError::ProtocolViolation(
                "frame shorter than the type tag".into(),
            ));
        }
        let raw_type = u32::from_ne_bytes(data[0..4].try_into().unwrap());
        let type_id = MessageType::try_from(raw_type)
            .map_err(|_| StoreError::ProtocolViolation(format!("unknown message type {raw_type}")))?;
        Ok(Frame {
            type_id: Some(type_id),
            buf: data[4..].to_vec(),
            offset: 0,
            fd,
        })
    }

    /// Records this frame's kind. The first `set_type` on a fresh frame wins;
    /// a second call is a programmer error (mirrors `TypedMsgHdr::setType`,
    /// which may only be called once per message).
    pub fn set_type(&mut self, t: MessageType) {
        assert!(self.type_id.is_none(), "set_type called twice on one frame");
        self.type_id = Some(t);
    }

    /// Validates the frame carries the expected kind.
    pub fn check_type(&self, expected: MessageType) -> crate::error::Result<()> {
        match self.type_id {
            Some(t) if t as u32 == expected as u32 => Ok(()),
            Some(_) => Err(StoreError::ProtocolViolation(
                "frame type does not match expected type".into(),
            )),
            None => Err(StoreError::ProtocolViolation("frame has no type set".into())),
        }
    }

    /// The frame's recorded kind, if any.
    pub fn message_type(&self) -> Option<MessageType> {
        self.type_id
    }

    /// Appends a trivially-copyable value.
    pub fn put_pod<T: IntoBytes + Immutable>(&mut self, value: &T) -> crate::error::Result<()> {
        self.put_fixed(value.as_bytes())
    }

    /// Extracts a trivially-copyable value written in the same order by `put_pod`.
    pub fn get_pod<T: FromBytes + KnownLayout + Immutable + Clone>(
        &mut self,
    ) -> crate::error::Result<T> {
        let size = size_of::<T>();
        let bytes = self.get_fixed(size)?;
        T::read_from_bytes(bytes)
            .map_err(|_| StoreError::ProtocolViolation("POD decode failed".into()))
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn put_string(&mut self, s: &str) -> crate::error::Result<()> {
        let len = u32::try_from(s.len())
            .map_err(|_| StoreError::ProtocolViolation("string too long for frame".into()))?;
        self.put_pod(&len)?;
        self.put_fixed(s.as_bytes())
    }

    /// Extracts a length-prefixed UTF-8 string written by `put_string`.
    pub fn get_string(&mut self) -> crate::error::Result<String> {
        let len: u32 = self.get_pod()?;
        let bytes = self.get_fixed(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| StoreError::ProtocolViolation("string is not valid utf-8".into()))
    }

    /// Appends exactly `data.len()` raw bytes.
    pub fn put_fixed(&mut self, data: &[u8]) -> crate::error::Result<()> {
        if self.buf.len() + data.len() > MAX_SIZE {
            return Err(StoreError::ProtocolViolation(
                "frame payload would exceed maxSize".into(),
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Extracts exactly `len` raw bytes.
    pub fn get_fixed(&mut self, len: usize) -> crate::error::Result<&[u8]> {
        if self.offset + len > self.buf.len() {
            return Err(StoreError::ProtocolViolation(
                "frame truncated: not enough data left".into(),
            ));
        }
        let slice = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Whether there is unread payload left — lets optional trailing fields
    /// be probed without guessing a fixed layout.
    pub fn has_more_data(&self) -> bool {
        self.offset < self.buf.len()
    }

    /// Attaches a descriptor to travel via `SCM_RIGHTS`. At most one per frame.
    pub fn put_fd(&mut self, fd: OwnedFd) {
        self.fd = Some(fd);
    }

    /// Takes the descriptor carried by this frame, if any.
    pub fn take_fd(&mut self) -> Option<OwnedFd> {
        self.fd.take()
    }

    /// Whether a descriptor is attached.
    pub fn has_fd(&self) -> bool {
        self.fd.is_some()
    }

    /// Serializes the type tag + payload for sending. The descriptor (if
    /// any) travels separately via ancillary data — see [`crate::ipc::transport`].
    pub fn to_bytes(&self) -> crate::error::Result<Vec<u8>> {
        let type_id = self
            .type_id
            .ok_or_else(|| StoreError::ProtocolViolation("frame has no type set".into()))?;
        let mut out = Vec::with_capacity(4 + self.buf.len());
        out.extend_from_slice(&(type_id as u32).to_ne_bytes());
        out.extend_from_slice(&self.buf);
        Ok(out)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
