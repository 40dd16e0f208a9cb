//! Scratch files: flat on-disk byte arenas carved into regions.
//!
//! The search keeps its cold data (spill tails, old-generation slots) in
//! two scratch files sized from the memory-budget flags. Regions are
//! handed out by a bump allocator, accessed with positioned reads/writes,
//! and the whole file is deleted when the last region goes away.
//!
//! I/O errors on scratch regions are unrecoverable mid-search and fail
//! fast; these files live on local disk and are re-created per run.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sortbound_core::ConfigError;

/// An owned scratch file, removed from disk on drop.
pub struct ScratchFile {
    file: File,
    path: PathBuf,
}

impl ScratchFile {
    /// Creates (truncating any leftover from a previous run) a scratch
    /// file of the given size.
    pub fn create(path: &Path, len: u64) -> Result<Arc<Self>, ConfigError> {
        let open = || -> io::Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.set_len(len)?;
            Ok(file)
        };
        let file = open().map_err(|source| ConfigError::Scratch {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Arc::new(Self { file, path: path.to_path_buf() }))
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.write_all_at(buf, offset)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!("could not remove scratch file {:?}: {err}", self.path);
        }
    }
}

/// Bump allocator carving regions out of one scratch file.
pub struct ScratchAllocator {
    file: Arc<ScratchFile>,
    next: u64,
    len: u64,
}

impl ScratchAllocator {
    pub fn new(file: Arc<ScratchFile>, len: u64) -> Self {
        Self { file, next: 0, len }
    }

    /// Carves the next `len` bytes into a region.
    pub fn alloc(&mut self, len: u64) -> ScratchRegion {
        assert!(
            self.next + len <= self.len,
            "scratch file exhausted: requested {len} at {}, capacity {}",
            self.next,
            self.len
        );
        let region = ScratchRegion { file: Arc::clone(&self.file), base: self.next, len };
        self.next += len;
        region
    }
}

/// A fixed byte range inside a scratch file.
///
/// Positioned reads and writes are thread-safe; no internal locking is
/// needed because the offsets never move.
pub struct ScratchRegion {
    file: Arc<ScratchFile>,
    base: u64,
    len: u64,
}

impl ScratchRegion {
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) {
        debug_assert!(offset + buf.len() as u64 <= self.len);
        self.file
            .read_at(self.base + offset, buf)
            .unwrap_or_else(|err| panic!("scratch read failed at {offset}: {err}"));
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) {
        debug_assert!(offset + buf.len() as u64 <= self.len);
        self.file
            .write_at(self.base + offset, buf)
            .unwrap_or_else(|err| panic!("scratch write failed at {offset}: {err}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_disjoint_and_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.bin");
        let file = ScratchFile::create(&path, 1024).unwrap();
        let mut alloc = ScratchAllocator::new(file, 1024);

        let a = alloc.alloc(512);
        let b = alloc.alloc(512);
        a.write_at(0, b"hello");
        b.write_at(0, b"world");

        let mut buf = [0u8; 5];
        a.read_at(0, &mut buf);
        assert_eq!(&buf, b"hello");
        b.read_at(0, &mut buf);
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.bin");
        {
            let _file = ScratchFile::create(&path, 64).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
