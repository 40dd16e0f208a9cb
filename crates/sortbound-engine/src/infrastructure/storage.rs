//! Backward-search layer persistence.
//!
//! A layer file is a fixed-layout header followed by raw poset records,
//! with no framing and no checksum. The files are caches: anything unreadable or
//! inconsistent is simply recomputed, so every scan error degrades to
//! "no reusable layer".

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sortbound_core::{ConfigError, LinExt, RunParams, StorageError, MAX_END_C};

use crate::domain::poset::{AnnotatedPoset, PosetInfo, PosetRecord, Status, RECORD_BYTES};
use crate::infrastructure::map::PosetMap;

/// Encoded header size.
const META_BYTES: usize = 4 * 3 + 8 + MAX_END_C * 8 + 8 + 8;

/// Per-layer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMeta {
    pub n: u32,
    pub c: u32,
    pub c_total: u32,
    /// Every sortable poset with at least this many linear extensions is
    /// guaranteed present in the layer.
    pub complete_above: LinExt,
    pub max_lin_ext: [LinExt; MAX_END_C],
    pub num_yes: u64,
    pub num_unf: u64,
}

impl LayerMeta {
    /// Largest per-level extension bound, over levels `0..=c_total`.
    pub fn max_lin_ext(&self) -> LinExt {
        self.max_lin_ext[..=self.c_total as usize].iter().copied().max().unwrap_or(0)
    }

    pub fn record_count(&self) -> u64 {
        self.num_yes + self.num_unf
    }

    fn encode(&self) -> [u8; META_BYTES] {
        let mut buf = [0u8; META_BYTES];
        buf[0..4].copy_from_slice(&self.n.to_le_bytes());
        buf[4..8].copy_from_slice(&self.c.to_le_bytes());
        buf[8..12].copy_from_slice(&self.c_total.to_le_bytes());
        buf[12..20].copy_from_slice(&self.complete_above.to_le_bytes());
        for (i, value) in self.max_lin_ext.iter().enumerate() {
            let at = 20 + i * 8;
            buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
        let tail = 20 + MAX_END_C * 8;
        buf[tail..tail + 8].copy_from_slice(&self.num_yes.to_le_bytes());
        buf[tail + 8..tail + 16].copy_from_slice(&self.num_unf.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; META_BYTES]) -> Self {
        let u32_at = |at: usize| u32::from_le_bytes(buf[at..at + 4].try_into().unwrap());
        let u64_at = |at: usize| u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
        let mut max_lin_ext = [0 as LinExt; MAX_END_C];
        for (i, value) in max_lin_ext.iter_mut().enumerate() {
            *value = u64_at(20 + i * 8);
        }
        let tail = 20 + MAX_END_C * 8;
        Self {
            n: u32_at(0),
            c: u32_at(4),
            c_total: u32_at(8),
            complete_above: u64_at(12),
            max_lin_ext,
            num_yes: u64_at(tail),
            num_unf: u64_at(tail + 8),
        }
    }
}

/// One persisted layer on disk.
pub struct LayerEntry {
    pub meta: LayerMeta,
    pub path: PathBuf,
}

impl LayerEntry {
    /// Loads the layer's records into `map`, re-deriving annotations.
    pub fn read_into(&self, map: &PosetMap, only_yes: bool, n: usize) -> Result<(), StorageError> {
        if only_yes && self.meta.num_yes == 0 {
            return Ok(());
        }
        let io_err = |source| StorageError::Io { path: self.path.clone(), source };
        let file = File::open(&self.path).map_err(io_err)?;
        let expected = META_BYTES as u64 + self.meta.record_count() * RECORD_BYTES as u64;
        let found = file.metadata().map_err(io_err)?.len();
        if found != expected {
            return Err(StorageError::Truncated { path: self.path.clone(), expected, found });
        }
        let mut reader = BufReader::new(file);
        let mut skip = [0u8; META_BYTES];
        reader.read_exact(&mut skip).map_err(io_err)?;

        let mut bytes = [0u8; RECORD_BYTES];
        for _ in 0..self.meta.record_count() {
            reader.read_exact(&mut bytes).map_err(io_err)?;
            let mut record = PosetRecord::from_bytes(bytes);
            record.set_marked(false);
            if only_yes && record.status() != Status::Yes {
                continue;
            }
            let info = PosetInfo::from_record(&record, n);
            let hash = record.compute_hash(n);
            let poset = AnnotatedPoset::new(record, info, hash, 0);
            map.find_and_insert(&poset);
        }
        Ok(())
    }
}

/// Directory of persisted layers, with reuse scanning.
pub struct LayerStorage {
    base: PathBuf,
    entries: Vec<LayerEntry>,
}

impl LayerStorage {
    /// Opens (creating if needed) the storage directory. With `reuse`,
    /// existing files are scanned for usable headers; unreadable files
    /// are skipped.
    pub fn open(base: &Path, reuse: bool) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base).map_err(|source| ConfigError::Directory {
            path: base.to_path_buf(),
            source,
        })?;

        let mut entries = Vec::new();
        if reuse {
            let dir = std::fs::read_dir(base).map_err(|source| ConfigError::Directory {
                path: base.to_path_buf(),
                source,
            })?;
            for dirent in dir.flatten() {
                let path = dirent.path();
                if !path.is_file() {
                    continue;
                }
                match read_meta(&path) {
                    Ok(meta) => entries.push(LayerEntry { meta, path }),
                    Err(err) => {
                        tracing::warn!("skipping unreadable layer file {path:?}: {err}");
                    }
                }
            }
        }
        Ok(Self { base: base.to_path_buf(), entries })
    }

    /// The reusable entry for level `c` at exactly this completeness
    /// threshold, if one was persisted by a compatible run.
    pub fn entry(&self, params: RunParams, c: u32, complete_above: LinExt) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry.meta.n == params.n
                && entry.meta.c_total == params.c_total
                && entry.meta.c == c
                && entry.meta.complete_above == complete_above
        })
    }

    pub fn entry_at(&self, index: usize) -> &LayerEntry {
        &self.entries[index]
    }

    /// Persists a map as one layer file.
    pub fn store(&mut self, map: &PosetMap, meta: LayerMeta) -> Result<(), StorageError> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = self.base.join(format!("n{}c{}_{stamp}", meta.n, meta.c));
        let io_err = |source| StorageError::Io { path: path.clone(), source };

        let file = File::create(&path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&meta.encode()).map_err(io_err)?;
        let mut written = 0u64;
        for record in map.fill() {
            writer.write_all(record.as_bytes()).map_err(io_err)?;
            written += 1;
        }
        debug_assert_eq!(written, meta.record_count());
        writer.flush().map_err(io_err)?;

        self.entries.push(LayerEntry { meta, path });
        Ok(())
    }
}

fn read_meta(path: &Path) -> Result<LayerMeta, StorageError> {
    let io_err = |source| StorageError::Io { path: path.to_path_buf(), source };
    let mut file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    if len < META_BYTES as u64 {
        return Err(StorageError::ShortHeader { path: path.to_path_buf() });
    }
    let mut buf = [0u8; META_BYTES];
    file.read_exact(&mut buf).map_err(io_err)?;
    let meta = LayerMeta::decode(&buf);
    // an implausible header means the file is from a different build or
    // corrupt; either way it is not reusable
    if meta.n == 0
        || meta.n as usize > sortbound_core::MAX_N
        || meta.c_total as usize >= MAX_END_C
        || meta.c > meta.c_total
    {
        return Err(StorageError::ShortHeader { path: path.to_path_buf() });
    }
    let expected = META_BYTES as u64 + meta.record_count() * RECORD_BYTES as u64;
    if len != expected {
        return Err(StorageError::Truncated { path: path.to_path_buf(), expected, found: len });
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(n: u32, c: u32, c_total: u32, complete_above: LinExt) -> LayerMeta {
        LayerMeta {
            n,
            c,
            c_total,
            complete_above,
            max_lin_ext: [0; MAX_END_C],
            num_yes: 0,
            num_unf: 0,
        }
    }

    #[test]
    fn meta_encode_decode_roundtrip() {
        let mut m = meta(7, 3, 13, 42);
        m.max_lin_ext[5] = 1 << 30;
        m.num_yes = 17;
        m.num_unf = 4;
        let decoded = LayerMeta::decode(&m.encode());
        assert_eq!(decoded, m);
        assert_eq!(decoded.max_lin_ext(), 1 << 30);
    }

    #[test]
    fn store_scan_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let params = RunParams::new(4, 5, 1).unwrap();
        let map = PosetMap::new(16, 1, 4);

        // a sorted chain, the backward search's seed
        let mut rec = PosetRecord::new();
        rec.add_edge(0, 1);
        rec.add_edge(1, 2);
        rec.add_edge(2, 3);
        rec.set_unique_graph(true);
        rec.set_self_dual(false);
        rec.set_status(Status::Yes);
        let info = PosetInfo::from_record(&rec, 4);
        let poset = AnnotatedPoset::new(rec, info, rec.compute_hash(4), 1);
        map.find_and_insert(&poset);

        let mut m = meta(4, 5, 5, 1);
        m.num_yes = 1;
        let mut storage = LayerStorage::open(dir.path(), false).unwrap();
        storage.store(&map, m).unwrap();

        // rescan from disk
        let storage = LayerStorage::open(dir.path(), true).unwrap();
        let idx = storage.entry(params, 5, 1).expect("persisted layer found");
        let entry = storage.entry_at(idx);
        assert_eq!(entry.meta.num_yes, 1);

        let reloaded = PosetMap::new(16, 1, 4);
        entry.read_into(&reloaded, false, 4).unwrap();
        assert_eq!(reloaded.count(), 1);
        assert_eq!(reloaded.find(&poset), Some(Status::Yes));
    }

    #[test]
    fn mismatched_threshold_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let params = RunParams::new(4, 5, 1).unwrap();
        let map = PosetMap::new(16, 1, 4);
        let mut storage = LayerStorage::open(dir.path(), false).unwrap();
        storage.store(&map, meta(4, 2, 5, 8)).unwrap();

        let storage = LayerStorage::open(dir.path(), true).unwrap();
        assert!(storage.entry(params, 2, 8).is_some());
        assert!(storage.entry(params, 2, 4).is_none());
        assert!(storage.entry(params, 3, 8).is_none());
    }

    #[test]
    fn truncated_file_is_skipped_on_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("n4c2_1"), b"short").unwrap();
        let storage = LayerStorage::open(dir.path(), true).unwrap();
        let params = RunParams::new(4, 5, 1).unwrap();
        assert!(storage.entry(params, 2, 1).is_none());
    }
}
