//! Coordinator: the SMP registry and request router.
//!
//! The Coordinator owns the [`ListenerCache`] and the strand registry; every
//! other process talks to it only through `coordinator.ipc`.
//!
//! Rather than tracking each peer's source address from the kernel (plain
//! `AF_UNIX` datagrams expose this via `recvmsg`, but `UdsTransport::recv`
//! does not currently surface it — see `src/ipc/transport.rs`), every
//! request that needs a reply carries the requesting kid's id as its first
//! field, and the Coordinator derives the reply path from the `kid-<N>.ipc`
//! naming convention established in [`crate::ipc::strand`]. This keeps
//! addressing pure and testable without a connection table, at the cost of
//! relying on that naming convention.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::ipc::frame::Frame;
use crate::ipc::messages::MessageType;
use crate::ipc::port::Port;
use crate::ipc::shared_listen::{ListenerCache, OpenListenerParams};
use crate::ipc::strand::KidId;
use crate::ipc::strand_search::StrandSearchRegistry;
use crate::ipc::transport::RetryPolicy;

/// What the Coordinator remembers about one registered strand.
#[derive(Debug, Clone)]
pub struct StrandRecord {
    pub kid_id: KidId,
    pub pid: libc::pid_t,
    pub tag: Option<String>,
}

/// The single per-fleet coordination process.
pub struct Coordinator {
    port: Port,
    run_dir: PathBuf,
    strands: HashMap<u32, StrandRecord>,
    listeners: ListenerCache,
    searches: StrandSearchRegistry,
}

impl Coordinator {
    pub fn bind(run_dir: &Path) -> crate::error::Result<Self> {
        let socket_path = run_dir.join("coordinator.ipc");
        let port = Port::bind(&socket_path).map_err(crate::error::StoreError::from_errno)?;
        Ok(Coordinator {
            port,
            run_dir: run_dir.to_owned(),
            strands: HashMap::new(),
            listeners: ListenerCache::new(),
            searches: StrandSearchRegistry::new(),
        })
    }

    /// Drops any strand searches whose deadline has passed, answering each
    /// with "not found" (kid 0).
    pub fn sweep_expired_searches(&mut self) -> crate::error::Result<()> {
        for requester in self.searches.sweep_expired() {
            let mut reply = Frame::new();
            reply.set_type(MessageType::StrandReady);
            reply.put_pod(&0u32)?;
            self.port
                .transport()
                .send(&self.kid_path(requester), &reply, RetryPolicy::default())?;
        }
        Ok(())
    }

    pub fn port(&self) -> &Port {
        &self.port
    }

    /// Currently registered strands, for diagnostics and cache-manager
    /// fan-out.
    pub fn strands(&self) -> impl Iterator<Item = &StrandRecord> {
        self.strands.values()
    }

    fn kid_path(&self, kid_id: u32) -> PathBuf {
        self.run_dir.join(format!("kid-{kid_id}.ipc"))
    }

    /// Processes at most one pending frame, opening shared listeners through
    /// `opener` on a [`ListenerCache`] miss. Returns `true` if a frame was
    /// handled.
    pub fn poll_once(
        &mut self,
        opener: impl FnOnce(&OpenListenerParams) -> std::io::Result<std::os::fd::OwnedFd>,
    ) -> crate::error::Result<bool> {
        let frame = match self.port.transport().recv()? {
            Some(f) => f,
            None => return Ok(false),
        };
        self.dispatch(frame, opener)?;
        Ok(true)
    }

    fn dispatch(
        &mut self,
        mut frame: Frame,
        opener: impl FnOnce(&OpenListenerParams) -> std::io::Result<std::os::fd::OwnedFd>,
    ) -> crate::error::Result<()> {
        match frame.message_type() {
            Some(MessageType::RegisterStrand) => self.handle_register(&mut frame),
            Some(MessageType::SharedListenRequest) => self.handle_shared_listen(&mut frame, opener),
            Some(MessageType::FindStrand) => self.handle_find_strand(&mut frame),
            Some(other) => {
                warn!("coordinator ignoring unexpected frame type {other:?}");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn handle_register(&mut self, frame: &mut Frame) -> crate::error::Result<()> {
        let kid_id: u32 = frame.get_pod()?;
        let pid: libc::pid_t = frame.get_pod()?;
        let tag = frame.get_string()?;
        let tag = if tag.is_empty() { None } else { Some(tag) };
        // A re-registration that omits its tag keeps whatever tag the
        // strand previously registered under instead of clearing it.
        let tag = tag.or_else(|| self.strands.get(&kid_id).and_then(|s| s.tag.clone()));

        info!("kid{kid_id} registering (pid {pid})");
        self.strands.insert(
            kid_id,
            StrandRecord {
                kid_id: KidId(kid_id),
                pid,
                tag,
            },
        );

        let mut ack = Frame::new();
        ack.set_type(MessageType::StrandRegistered);
        self.port
            .transport()
            .send(&self.kid_path(kid_id), &ack, RetryPolicy::default())?;

        for (requester, found) in self.searches.resolve_against(&self.strands) {
            let mut reply = Frame::new();
            reply.set_type(MessageType::StrandReady);
            reply.put_pod(&found.0)?;
            self.port
                .transport()
                .send(&self.kid_path(requester), &reply, RetryPolicy::default())?;
        }
        Ok(())
    }

    /// Handles `FindStrand`. A strand that matches
    /// immediately is answered right away; otherwise the search is parked in
    /// [`StrandSearchRegistry`] until a matching registration arrives or the
    /// search's own timeout expires (see [`Self::sweep_expired_searches`]).
    fn handle_find_strand(&mut self, frame: &mut Frame) -> crate::error::Result<()> {
        let requester: u32 = frame.get_pod()?;
        let wanted_tag = frame.get_string()?;

        match self
            .strands
            .values()
            .find(|s| s.tag.as_deref() == Some(wanted_tag.as_str()))
        {
            Some(found) => {
                let mut reply = Frame::new();
                reply.set_type(MessageType::StrandReady);
                reply.put_pod(&found.kid_id.0)?;
                self.port
                    .transport()
                    .send(&self.kid_path(requester), &reply, RetryPolicy::default())
            }
            None => {
                self.searches.add(requester, wanted_tag);
                Ok(())
            }
        }
    }

    fn handle_shared_listen(
        &mut self,
        frame: &mut Frame,
        opener: impl FnOnce(&OpenListenerParams) -> std::io::Result<std::os::fd::OwnedFd>,
    ) -> crate::error::Result<()> {
        let requester: u32 = frame.get_pod()?;
        let map_id: u64 = frame.get_pod()?;
        let addr = frame.get_string()?;
        let sock_type: i32 = frame.get_pod()?;
        let protocol: i32 = frame.get_pod()?;
        let params = OpenListenerParams {
            addr,
            sock_type,
            protocol,
        };

        let mut reply = Frame::new();
        reply.set_type(MessageType::SharedListenResponse);
        reply.put_pod(&map_id)?;
        match self.listeners.get_or_open(&params, opener) {
            Ok(fd) => {
                reply.put_pod(&0i32)?;
                reply.put_fd(fd);
                self.port.transport().send_with_fd(
                    &self.kid_path(requester),
                    reply,
                    RetryPolicy::default(),
                )
            }
            Err(e) => {
                warn!("shared listen open failed for {requester}: {e}");
                reply.put_pod(&libc::EIO)?;
                self.port
                    .transport()
                    .send(&self.kid_path(requester), &reply, RetryPolicy::default())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipc::strand::Strand;
    use std::time::Duration;

    #[test]
    fn strand_registers_and_coordinator_tracks_it() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().to_path_buf();
        let mut coordinator = Coordinator::bind(&run_dir).unwrap();

        let strand_dir = run_dir.clone();
        let handle =
            std::thread::spawn(move || Strand::register(&strand_dir, KidId(7), Some("worker")));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            if coordinator.poll_once(|_| unreachable!("no listener requests in this test")).unwrap() {
                break;
            }
            if std::time::Instant::now() >= deadline {
                panic!("coordinator never observed the registration");
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let strand = handle.join().unwrap().unwrap();
        assert_eq!(strand.kid_id(), KidId(7));
        assert_eq!(coordinator.strands().count(), 1);
        assert_eq!(coordinator.strands().next().unwrap().tag.as_deref(), Some("worker"));
    }
}
