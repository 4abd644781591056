//! Startup rebuild of a UFS cache_dir: either replay `swap.state` (clean
//! path) or walk the L1/L2 tree and recover each object's key from its
//! on-disk meta header (dirty path).

use std::path::Path;

use log::warn;

use crate::cache_key::CacheKey;
use crate::store::ufs::layout::Layout;
use crate::store::ufs::swap_log::{LogOp, LogRecord, SwapLog};

/// One entry recovered during rebuild, ready to be installed into the
/// directory's file map and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuiltEntry {
    pub file_n: u32,
    pub key: CacheKey,
    pub size: u64,
    pub last_ref: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildCounts {
    pub added: u32,
    pub cancelled: u32,
    pub invalid: u32,
    pub scanned: u32,
}

/// Progress is reported at this record-count granularity during rebuild.
pub const PROGRESS_GRANULARITY: u32 = 4096;

/// Replays `swap.state`: each ADD installs a restored (unvalidated) entry;
/// a DEL cancels a pending ADD unless a strictly newer ADD for the same
/// `file_n` already won; unknown ops or `PRIVATE`-flagged keys count as
/// invalid.
pub fn rebuild_clean(
    swap_state_path: &Path,
    mut on_progress: impl FnMut(u32),
) -> std::io::Result<(Vec<RebuiltEntry>, RebuildCounts)> {
    use std::collections::HashMap;

    let records = SwapLog::read_all(swap_state_path)?;
    let mut installed: HashMap<u32, (LogRecord, bool)> = HashMap::new();
    let mut counts = RebuildCounts::default();

    for (index, (record, well_formed)) in records.into_iter().enumerate() {
        counts.scanned += 1;
        if index as u32 % PROGRESS_GRANULARITY == 0 {
            on_progress(counts.scanned);
        }
        if !well_formed {
            counts.invalid += 1;
            continue;
        }
        if record.flags.contains(crate::store::ufs::swap_log::EntryFlags::PRIVATE) {
            counts.invalid += 1;
            continue;
        }
        match record.op {
            LogOp::Add => {
                installed.insert(record.file_n, (record, true));
                counts.added += 1;
            }
            LogOp::Del => match installed.get(&record.file_n) {
                Some((existing, _)) if existing.last_mod > record.last_mod => {
                    // a newer ADD already won; ignore this stale DEL
                }
                _ => {
                    if installed.remove(&record.file_n).is_some() {
                        counts.cancelled += 1;
                        counts.added = counts.added.saturating_sub(1);
                    }
                }
            },
        }
    }

    let entries = installed
        .into_values()
        .filter(|(_, alive)| *alive)
        .map(|(record, _)| RebuiltEntry {
            file_n: record.file_n,
            key: CacheKey::new(record.key),
            size: record.size,
            last_ref: record.last_ref,
        })
        .collect();
    Ok((entries, counts))
}

/// Header written at the start of every UFS-resident file, used by the
/// dirty-scan path to recover an object's key without a swap.state.
#[derive(Debug, Clone, Copy)]
pub struct MetaHeader {
    pub key: CacheKey,
    pub size: u64,
    pub last_ref: u32,
}

pub const META_HEADER_SIZE: usize = 16 + 8 + 4;

impl MetaHeader {
    pub fn encode(&self) -> [u8; META_HEADER_SIZE] {
        let mut buf = [0u8; META_HEADER_SIZE];
        buf[0..16].copy_from_slice(self.key.as_bytes());
        buf[16..24].copy_from_slice(&self.size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.last_ref.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < META_HEADER_SIZE {
            return None;
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&buf[0..16]);
        let size = u64::from_le_bytes(buf[16..24].try_into().ok()?);
        let last_ref = u32::from_le_bytes(buf[24..28].try_into().ok()?);
        Some(MetaHeader {
            key: CacheKey::new(key),
            size,
            last_ref,
        })
    }
}

/// Walks the L1/L2 tree, reading each file's meta header to recover its key
/// (the swap.state is missing or stale — a dirty shutdown).
pub fn rebuild_dirty(
    root: &Path,
    layout: &Layout,
    mut on_progress: impl FnMut(u32),
) -> std::io::Result<(Vec<RebuiltEntry>, RebuildCounts)> {
    let mut entries = Vec::new();
    let mut counts = RebuildCounts::default();

    for dir in layout.dirs(root) {
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                counts.invalid += 1;
                continue;
            };
            let Some(file_n) = Layout::file_n_from_name(name) else {
                continue;
            };
            counts.scanned += 1;
            if counts.scanned % PROGRESS_GRANULARITY == 0 {
                on_progress(counts.scanned);
            }

            let bytes = match std::fs::read(entry.path()) {
                Ok(b) => b,
                Err(_) => {
                    counts.invalid += 1;
                    continue;
                }
            };
            match MetaHeader::decode(&bytes) {
                Some(header) => {
                    entries.push(RebuiltEntry {
                        file_n,
                        key: header.key,
                        size: header.size,
                        last_ref: header.last_ref,
                    });
                    counts.added += 1;
                }
                None => {
                    warn!("unreadable meta header at {}", entry.path().display());
                    counts.invalid += 1;
                }
            }
        }
    }
    Ok((entries, counts))
}
