//! Shared listener passing.
//!
//! The Coordinator keeps a cache of already-opened listening sockets keyed
//! by `(addr, sock_type, proto)` and hands out a `dup()`'d descriptor to
//! whichever strand asks for it, via `SCM_RIGHTS`.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::StoreError;

/// The key a [`SharedListenRequest`] is matched on. Other request fields
/// (flags, the human-readable note) are deliberately excluded from the key —
///: "other fields are ignored for keying".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpenListenerParams {
    pub addr: String,
    pub sock_type: i32,
    pub protocol: i32,
}

/// A human-readable tag for a listening descriptor, modeled on the
/// original's `FdNotes` registry — used only for logging and for
/// `SharedListenRequest`'s non-keyed metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdNote(pub String);

/// A strand's request to receive a (possibly shared) listening socket.
#[derive(Debug)]
pub struct SharedListenRequest {
    pub params: OpenListenerParams,
    pub note: FdNote,
    /// Correlates the eventual response back to this request on the
    /// requesting strand, independent of the transport's own RequestId.
    /// Reconstructing this mapping after a crash is fragile by nature —
    /// a lost request simply times out on the caller's side.
    pub map_id: u64,
}

/// The Coordinator's answer: either a descriptor or an error.
#[derive(Debug)]
pub struct SharedListenResponse {
    pub map_id: u64,
    pub fd: Option<OwnedFd>,
    pub errno: i32,
}

/// Coordinator-owned cache of already-opened listening sockets.
///
/// Strands never mutate this directly; only the Coordinator's handler calls
/// [`ListenerCache::get_or_open`].
#[derive(Default)]
pub struct ListenerCache {
    listeners: HashMap<OpenListenerParams, OwnedFd>,
}

impl ListenerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a `dup()`'d descriptor for `params`, opening a fresh listener
    /// via `opener` on a cache miss.
    pub fn get_or_open(
        &mut self,
        params: &OpenListenerParams,
        opener: impl FnOnce(&OpenListenerParams) -> std::io::Result<OwnedFd>,
    ) -> crate::error::Result<OwnedFd> {
        if !self.listeners.contains_key(params) {
            let fd = opener(params).map_err(StoreError::from_errno)?;
            self.listeners.insert(params.clone(), fd);
        }
        let cached = self.listeners.get(params).expect("just inserted or present");
        dup_fd(cached)
    }

    /// Number of distinct listeners currently cached.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

fn dup_fd(fd: &OwnedFd) -> crate::error::Result<OwnedFd> {
    let raw = unsafe { libc::dup(fd.as_raw_fd()) };
    if raw < 0 {
        return Err(StoreError::from_errno(std::io::Error::last_os_error()));
    }
    // SAFETY: dup() just returned a freshly owned descriptor.
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

#[cfg(test)]
mod test {
    use super::*;

    fn params(addr: &str) -> OpenListenerParams {
        OpenListenerParams {
            addr: addr.into(),
            sock_type: libc::SOCK_STREAM,
            protocol: 0,
        }
    }

    fn open_dummy(_: &OpenListenerParams) -> std::io::Result<OwnedFd> {
        let file = tempfile::tempfile()?;
        Ok(OwnedFd::from(file))
    }

    #[test]
    fn cache_hit_reuses_listener() {
        let mut cache = ListenerCache::new();
        let p = params("127.0.0.1:3128");
        let _a = cache.get_or_open(&p, open_dummy).unwrap();
        let _b = cache.get_or_open(&p, |_| panic!("should not reopen on cache hit")).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_params_open_distinct_listeners() {
        let mut cache = ListenerCache::new();
        let _a = cache.get_or_open(&params("a"), open_dummy).unwrap();
        let _b = cache.get_or_open(&params("b"), open_dummy).unwrap();
        assert_eq!(cache.len(), 2);
    }
}
