//! UFS SwapDir: ties layout, the file-number bitmap, the swap
//! log and rebuild together into one cache_dir engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::info;

use crate::cache_key::CacheKey;
use crate::store::ufs::file_map::FileMap;
use crate::store::ufs::layout::Layout;
use crate::store::ufs::rebuild::{rebuild_clean, rebuild_dirty, RebuildCounts, RebuiltEntry};
use crate::store::ufs::swap_log::{EntryFlags, LogOp, LogRecord, SwapLog};

/// A resident object's directory-local bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct ResidentEntry {
    pub file_n: u32,
    pub size: u64,
    pub last_ref: u32,
}

pub struct UfsDir {
    root: PathBuf,
    layout: Layout,
    file_map: FileMap,
    swap_log: SwapLog,
    index: HashMap<CacheKey, ResidentEntry>,
    max_size: u64,
    low_size: u64,
    cur_size: u64,
    pub double_check: bool,
}

impl UfsDir {
    pub fn swap_state_path(root: &Path) -> PathBuf {
        root.join("swap.state")
    }

    /// Creates the L1/L2 directory tree if missing, opens the append log,
    /// and rebuilds the index — clean read if `swap.state` carries a
    /// `.last-clean` marker, a dirty tree scan otherwise.
    pub fn open(
        root: &Path,
        layout: Layout,
        max_size: u64,
        double_check: bool,
        mut on_progress: impl FnMut(u32),
    ) -> std::io::Result<Self> {
        for dir in layout.dirs(root) {
            std::fs::create_dir_all(&dir)?;
        }
        let swap_state = Self::swap_state_path(root);

        let (entries, counts): (Vec<RebuiltEntry>, RebuildCounts) = if SwapLog::is_clean(&swap_state) {
            rebuild_clean(&swap_state, &mut on_progress)?
        } else {
            rebuild_dirty(root, &layout, &mut on_progress)?
        };
        info!(
            "ufs rebuild at {}: {} added, {} cancelled, {} invalid, {} scanned",
            root.display(),
            counts.added,
            counts.cancelled,
            counts.invalid,
            counts.scanned
        );

        let mut file_map = FileMap::new();
        let mut index = HashMap::new();
        let mut cur_size = 0u64;
        for entry in entries {
            file_map.set(entry.file_n);
            cur_size += entry.size;
            index.insert(
                entry.key,
                ResidentEntry {
                    file_n: entry.file_n,
                    size: entry.size,
                    last_ref: entry.last_ref,
                },
            );
        }

        let swap_log = SwapLog::open_for_append(&swap_state)?;

        Ok(UfsDir {
            root: root.to_owned(),
            layout,
            file_map,
            swap_log,
            index,
            max_size,
            low_size: max_size * 9 / 10,
            cur_size,
            double_check,
        })
    }

    pub fn path_for(&self, file_n: u32) -> PathBuf {
        self.layout.path_for(&self.root, file_n)
    }

    pub fn current_size(&self) -> u64 {
        self.cur_size
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Allocates a fresh file number, writes an ADD record, and installs the
    /// entry. The caller is responsible for the actual file write via the
    /// async I/O layer.
    pub fn allocate(&mut self, key: CacheKey, size: u64, now: u32) -> std::io::Result<u32> {
        let file_n = self.file_map.allocate();
        self.swap_log.append(LogRecord {
            op: LogOp::Add,
            file_n,
            last_ref: now,
            last_mod: now,
            refcount: 0,
            flags: EntryFlags::empty(),
            size,
            key: *key.as_bytes(),
        })?;
        self.cur_size += size;
        self.index.insert(
            key,
            ResidentEntry {
                file_n,
                size,
                last_ref: now,
            },
        );
        Ok(file_n)
    }

    /// Removes an entry, writing a DEL record and clearing its bit.
    pub fn release(&mut self, key: &CacheKey, now: u32) -> std::io::Result<()> {
        if let Some(entry) = self.index.remove(key) {
            self.swap_log.append(LogRecord {
                op: LogOp::Del,
                file_n: entry.file_n,
                last_ref: now,
                last_mod: now,
                refcount: 0,
                flags: EntryFlags::empty(),
                size: entry.size,
                key: *key.as_bytes(),
            })?;
            self.file_map.reset(entry.file_n);
            self.cur_size = self.cur_size.saturating_sub(entry.size);
        }
        Ok(())
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<ResidentEntry> {
        self.index.get(key).copied()
    }

    /// Rewrites `swap.state` listing only currently-resident entries and
    /// drops the `.last-clean` marker (clean-log rotation).
    pub fn rotate_clean_log(&mut self, now: u32) -> std::io::Result<()> {
        let records: Vec<LogRecord> = self
            .index
            .iter()
            .map(|(key, entry)| LogRecord {
                op: LogOp::Add,
                file_n: entry.file_n,
                last_ref: entry.last_ref,
                last_mod: now,
                refcount: 0,
                flags: EntryFlags::empty(),
                size: entry.size,
                key: *key.as_bytes(),
            })
            .collect();
        let path = Self::swap_state_path(&self.root);
        SwapLog::write_clean(&path, &records, now)?;
        self.swap_log = SwapLog::open_for_append(&path)?;
        Ok(())
    }

    /// Scan/remove budgets scale linearly with `(cur_size - low_size) /
    /// (max_size - low_size)`, clamped to `[0, 1]` (
    /// "Maintenance").
    pub fn maintenance_budget(&self, base_scan: u32, base_remove: u32) -> (u32, u32) {
        let span = self.max_size.saturating_sub(self.low_size).max(1);
        let over = self.cur_size.saturating_sub(self.low_size);
        let factor = (over as f64 / span as f64).clamp(0.0, 1.0);
        (
            (base_scan as f64 * factor) as u32,
            (base_remove as f64 * factor) as u32,
        )
    }

    /// Releases up to `remove_budget` candidates chosen by `pick_victim`
    /// (the replacement policy lives above this engine; it supplies keys).
    pub fn evict_candidates(
        &mut self,
        remove_budget: u32,
        mut pick_victim: impl FnMut(&Self) -> Option<CacheKey>,
        now: u32,
    ) -> std::io::Result<u32> {
        let mut released = 0;
        while released < remove_budget {
            let Some(key) = pick_victim(self) else { break };
            self.release(&key, now)?;
            released += 1;
        }
        Ok(released)
    }

    /// Diagnostic mode: `stat`s every resident file and reports any whose
    /// on-disk size disagrees with the index.
    pub fn double_check_sizes(&self) -> std::io::Result<Vec<CacheKey>> {
        let mut mismatched = Vec::new();
        for (key, entry) in &self.index {
            let path = self.path_for(entry.file_n);
            match std::fs::metadata(&path) {
                Ok(meta) if meta.len() == entry.size => {}
                _ => mismatched.push(*key),
            }
        }
        Ok(mismatched)
    }
}
