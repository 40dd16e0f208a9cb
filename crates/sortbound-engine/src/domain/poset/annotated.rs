//! Annotated in-memory poset.
//!
//! The forward search shares one spill vector of these across all worker
//! threads. Two fields mutate while the vector is shared: the status/mark
//! flags (several workers may mark the same child in phase 2) and the
//! edge-list slot (written once by the owning worker). Both therefore live
//! in atomics; the graph bits and bookkeeping fields are immutable after
//! construction.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use sortbound_core::LinExt;

use super::info::PosetInfo;
use super::record::{PosetRecord, Status, RECORD_BYTES};
use crate::infrastructure::spill::SpillItem;

const STATUS_MASK: u8 = 0b0000_0011;
const MARK_BIT: u8 = 0b0001_0000;

/// Sentinel for "no edge-list slot assigned".
pub const NO_EDGE_INDEX: u64 = u64::MAX;

/// Bytes of one encoded annotated poset in the spill tail.
pub const ANNOTATED_BYTES: usize = RECORD_BYTES + 2 + 8 + 8 + 8;

/// A canonical poset plus everything the searches annotate it with.
pub struct AnnotatedPoset {
    record: PosetRecord,
    info: PosetInfo,
    hash: u64,
    lin_ext: LinExt,
    /// Status bits 0..2 and mark bit 4, same encoding as the record's
    /// flags byte. Authoritative over the snapshot inside `record`.
    dyn_flags: AtomicU8,
    edge_index: AtomicU64,
}

impl AnnotatedPoset {
    pub fn new(record: PosetRecord, info: PosetInfo, hash: u64, lin_ext: LinExt) -> Self {
        let flags = record.flags_byte() & (STATUS_MASK | MARK_BIT);
        Self {
            record,
            info,
            hash,
            lin_ext,
            dyn_flags: AtomicU8::new(flags),
            edge_index: AtomicU64::new(NO_EDGE_INDEX),
        }
    }

    /// Graph bits and immutable flags. Status/mark bits in here are the
    /// construction-time snapshot; use [`status`](Self::status) and
    /// [`marked`](Self::marked) for the live values.
    #[inline]
    pub fn record(&self) -> &PosetRecord {
        &self.record
    }

    /// A standalone record with the live status and mark folded in.
    pub fn snapshot(&self) -> PosetRecord {
        let mut rec = self.record;
        let dynamic = self.dyn_flags.load(Ordering::Relaxed);
        let kept = rec.flags_byte() & !(STATUS_MASK | MARK_BIT);
        rec.set_flags_byte(kept | (dynamic & (STATUS_MASK | MARK_BIT)));
        rec
    }

    #[inline]
    pub fn info(&self) -> PosetInfo {
        self.info
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    pub fn lin_ext(&self) -> LinExt {
        self.lin_ext
    }

    #[inline]
    pub fn status(&self) -> Status {
        Status::from_bits(self.dyn_flags.load(Ordering::Relaxed))
    }

    /// UNFINISHED → YES. The transition is monotone; a second call is a
    /// logic error.
    pub fn set_sortable(&self) {
        debug_assert_eq!(self.status(), Status::Unfinished);
        self.dyn_flags.fetch_or(Status::Yes as u8, Ordering::Relaxed);
    }

    /// UNFINISHED → NO.
    pub fn set_unsortable(&self) {
        debug_assert_eq!(self.status(), Status::Unfinished);
        self.dyn_flags.fetch_or(Status::No as u8, Ordering::Relaxed);
    }

    #[inline]
    pub fn marked(&self) -> bool {
        self.dyn_flags.load(Ordering::Relaxed) & MARK_BIT != 0
    }

    /// Safe to race: concurrent markers all write the same bit.
    #[inline]
    pub fn set_marked(&self, val: bool) {
        if val {
            self.dyn_flags.fetch_or(MARK_BIT, Ordering::Relaxed);
        } else {
            self.dyn_flags.fetch_and(!MARK_BIT, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn edge_index(&self) -> u64 {
        self.edge_index.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_edge_index(&self, idx: u64) {
        self.edge_index.store(idx, Ordering::Relaxed);
    }
}

impl Clone for AnnotatedPoset {
    fn clone(&self) -> Self {
        Self {
            record: self.record,
            info: self.info,
            hash: self.hash,
            lin_ext: self.lin_ext,
            dyn_flags: AtomicU8::new(self.dyn_flags.load(Ordering::Relaxed)),
            edge_index: AtomicU64::new(self.edge_index.load(Ordering::Relaxed)),
        }
    }
}

impl std::fmt::Debug for AnnotatedPoset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotatedPoset")
            .field("status", &self.status())
            .field("marked", &self.marked())
            .field("hash", &self.hash)
            .field("lin_ext", &self.lin_ext)
            .finish()
    }
}

impl SpillItem for AnnotatedPoset {
    const BYTES: usize = ANNOTATED_BYTES;

    fn encode(&self, buf: &mut [u8]) {
        let rec = self.snapshot();
        buf[..RECORD_BYTES].copy_from_slice(rec.as_bytes());
        buf[RECORD_BYTES] = self.info.singletons() as u8;
        buf[RECORD_BYTES + 1] = self.info.pairs() as u8;
        buf[RECORD_BYTES + 2..RECORD_BYTES + 10].copy_from_slice(&self.hash.to_le_bytes());
        buf[RECORD_BYTES + 10..RECORD_BYTES + 18].copy_from_slice(&self.lin_ext.to_le_bytes());
        buf[RECORD_BYTES + 18..RECORD_BYTES + 26]
            .copy_from_slice(&self.edge_index().to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        let mut bytes = [0u8; RECORD_BYTES];
        bytes.copy_from_slice(&buf[..RECORD_BYTES]);
        let record = PosetRecord::from_bytes(bytes);
        let info = PosetInfo::new(buf[RECORD_BYTES] as u32, buf[RECORD_BYTES + 1] as u32);
        let hash = u64::from_le_bytes(buf[RECORD_BYTES + 2..RECORD_BYTES + 10].try_into().unwrap());
        let lin_ext =
            LinExt::from_le_bytes(buf[RECORD_BYTES + 10..RECORD_BYTES + 18].try_into().unwrap());
        let edge_index =
            u64::from_le_bytes(buf[RECORD_BYTES + 18..RECORD_BYTES + 26].try_into().unwrap());
        let poset = Self::new(record, info, hash, lin_ext);
        poset.set_edge_index(edge_index);
        poset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_visible() {
        let poset =
            AnnotatedPoset::new(PosetRecord::new(), PosetInfo::new(3, 0), 0xdead_beef, 6);
        assert_eq!(poset.status(), Status::Unfinished);
        poset.set_sortable();
        assert_eq!(poset.status(), Status::Yes);
        assert_eq!(poset.snapshot().status(), Status::Yes);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut rec = PosetRecord::new();
        rec.add_edge(0, 3);
        rec.set_unique_graph(true);
        let poset = AnnotatedPoset::new(rec, PosetInfo::new(1, 1), 42, 99);
        poset.set_marked(true);
        poset.set_edge_index(7);

        let mut buf = vec![0u8; ANNOTATED_BYTES];
        poset.encode(&mut buf);
        let back = AnnotatedPoset::decode(&buf);

        assert!(back.record().same_graph(poset.record()));
        assert!(back.record().unique_graph());
        assert!(back.marked());
        assert_eq!(back.hash(), 42);
        assert_eq!(back.lin_ext(), 99);
        assert_eq!(back.edge_index(), 7);
        assert_eq!(back.info(), PosetInfo::new(1, 1));
    }
}
