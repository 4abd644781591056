//! L1/L2 directory layout: maps a file number to its on-disk
//! path by bit-slicing, and back.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub l1: u32,
    pub l2: u32,
}

impl Layout {
    pub fn new(l1: u32, l2: u32) -> Self {
        assert!(l1 > 0 && l2 > 0, "L1/L2 must be nonzero");
        Layout { l1, l2 }
    }

    /// outer = `(n/L2/L2) mod L1`, inner = `(n/L2) mod L2`, basename = 8-hex `n`.
    pub fn path_for(&self, root: &Path, file_n: u32) -> PathBuf {
        let outer = (file_n / self.l2 / self.l2) % self.l1;
        let inner = (file_n / self.l2) % self.l2;
        root.join(format!("{outer:02X}"))
            .join(format!("{inner:02X}"))
            .join(format!("{file_n:08X}"))
    }

    pub fn dirs(&self, root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
        let root = root.to_owned();
        (0..self.l1).flat_map(move |outer| {
            let root = root.clone();
            (0..self.l2).map(move |inner| root.join(format!("{outer:02X}")).join(format!("{inner:02X}")))
        })
    }

    /// Parses a filename of the `path_for` shape back into a file number, for
    /// the dirty-scan rebuild path.
    pub fn file_n_from_name(name: &str) -> Option<u32> {
        if name.len() != 8 {
            return None;
        }
        u32::from_str_radix(name, 16).ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn path_roundtrips_through_filename() {
        let layout = Layout::new(16, 256);
        let path = layout.path_for(Path::new("/cache"), 0xABCDEF);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(Layout::file_n_from_name(name), Some(0xABCDEF));
    }

    #[test]
    fn dirs_enumerates_l1_times_l2_entries() {
        let layout = Layout::new(2, 3);
        assert_eq!(layout.dirs(Path::new("/cache")).count(), 6);
    }
}
