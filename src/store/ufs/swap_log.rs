//! Append-only `swap.state` log: a flat binary log of fixed-size records,
//! replayed on startup to reconstruct which file numbers are resident
//! without re-stat'ing the whole tree.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRIVATE = 0x1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogOp {
    Add = 1,
    Del = 2,
}

impl LogOp {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(LogOp::Add),
            2 => Some(LogOp::Del),
            _ => None,
        }
    }
}

/// One fixed-size `swap.state` record: `{op, file_n, timestamps, size,
/// refcount, flags, key[16]}`.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RawRecord {
    op: u8,
    _pad: [u8; 3],
    file_n: u32,
    last_ref: u32,
    last_mod: u32,
    refcount: u32,
    flags: u32,
    size: u64,
    key: [u8; 16],
}

pub const RECORD_SIZE: usize = size_of::<RawRecord>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub op: LogOp,
    pub file_n: u32,
    pub last_ref: u32,
    pub last_mod: u32,
    pub refcount: u32,
    pub flags: EntryFlags,
    pub size: u64,
    pub key: [u8; 16],
}

impl LogRecord {
    fn to_raw(self) -> RawRecord {
        RawRecord {
            op: self.op as u8,
            _pad: [0; 3],
            file_n: self.file_n,
            last_ref: self.last_ref,
            last_mod: self.last_mod,
            refcount: self.refcount,
            flags: self.flags.bits(),
            size: self.size,
            key: self.key,
        }
    }

    fn from_raw(raw: &RawRecord) -> Option<Self> {
        Some(LogRecord {
            op: LogOp::from_u8(raw.op)?,
            file_n: raw.file_n,
            last_ref: raw.last_ref,
            last_mod: raw.last_mod,
            refcount: raw.refcount,
            flags: EntryFlags::from_bits_truncate(raw.flags),
            size: raw.size,
            key: raw.key,
        })
    }
}

/// An open, append-only `swap.state` file.
pub struct SwapLog {
    path: PathBuf,
    file: File,
}

impl SwapLog {
    pub fn open_for_append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(SwapLog {
            path: path.to_owned(),
            file,
        })
    }

    pub fn append(&mut self, record: LogRecord) -> io::Result<()> {
        self.file.write_all(record.to_raw().as_bytes())?;
        Ok(())
    }

    /// Replays every well-formed record in order; malformed trailing bytes
    /// (a partial record from a crash mid-write) are silently truncated.
    pub fn read_all(path: &Path) -> io::Result<Vec<(LogRecord, bool)>> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut out = Vec::new();
        for chunk in bytes.chunks_exact(RECORD_SIZE) {
            let raw = RawRecord::read_from_bytes(chunk).expect("chunk is exactly RECORD_SIZE");
            match LogRecord::from_raw(&raw) {
                Some(record) => out.push((record, true)),
                None => out.push((
                    LogRecord {
                        op: LogOp::Add,
                        file_n: raw.file_n,
                        last_ref: 0,
                        last_mod: 0,
                        refcount: 0,
                        flags: EntryFlags::empty(),
                        size: 0,
                        key: [0; 16],
                    },
                    false,
                )),
            }
        }
        Ok(out)
    }

    /// Rewrites the log from scratch listing only the currently-resident
    /// entries, then drops a sibling `.last-clean` marker — the
    /// clean-rotation path that lets the next startup skip a dirty scan.
    pub fn write_clean(path: &Path, resident: &[LogRecord], now: u32) -> io::Result<()> {
        let tmp_path = path.with_extension("state.tmp");
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        for record in resident {
            let mut record = *record;
            record.op = LogOp::Add;
            tmp.write_all(record.to_raw().as_bytes())?;
        }
        tmp.flush()?;
        std::fs::rename(&tmp_path, path)?;

        let marker_path = last_clean_marker_path(path);
        std::fs::write(marker_path, now.to_le_bytes())?;
        Ok(())
    }

    pub fn is_clean(path: &Path) -> bool {
        last_clean_marker_path(path).exists()
    }
}

fn last_clean_marker_path(swap_state_path: &Path) -> PathBuf {
    let mut name = swap_state_path.file_name().unwrap_or_default().to_os_string();
    name.push(".last-clean");
    swap_state_path.with_file_name(name)
}
