//! Old-generation cache of settled posets.
//!
//! A fixed-size, single-probe map: one slot per hash position, a 16-bit
//! tag array in RAM and the record payloads in the fast scratch file. A
//! YES record always wins an occupied slot (sortable posets prune more
//! than unsortable ones). Besides resolved records, the forward search
//! also parks provisionally-pending parents here when their disjunction
//! drains to a single survivor, so a hit may legitimately come back
//! UNFINISHED; callers treat that as "still unknown".

use sortbound_core::{Counter, Stats, MULT1, MULT2};

use crate::domain::poset::{AnnotatedPoset, PosetRecord, Status, RECORD_BYTES};
use crate::infrastructure::scratch::ScratchRegion;

use super::records_match;

const EMPTY_TAG: u16 = u16::MAX;

pub struct OldGenMap {
    size: u64,
    tags: Vec<u16>,
    slots: ScratchRegion,
    empty: bool,
    n: usize,
    /// Per-status counts of insert attempts.
    pub profile_inserted: [u64; 3],
    /// Per-status counts of currently stored records.
    pub profile_stored: [u64; 3],
}

impl OldGenMap {
    /// `slots` must hold `size · RECORD_BYTES` bytes.
    pub fn new(size: u64, slots: ScratchRegion, n: usize) -> Self {
        assert!(size > 0);
        assert!(slots.len() >= size * RECORD_BYTES as u64);
        Self {
            size,
            tags: vec![EMPTY_TAG; size as usize],
            slots,
            empty: true,
            n,
            profile_inserted: [0; 3],
            profile_stored: [0; 3],
        }
    }

    #[inline]
    fn slot_of(&self, hash: u64) -> (u64, u16) {
        let index = hash.wrapping_mul(MULT1) % self.size;
        let tag = (hash.wrapping_mul(MULT2) % (EMPTY_TAG as u64)) as u16;
        (index, tag)
    }

    fn read_slot(&self, index: u64) -> PosetRecord {
        let mut bytes = [0u8; RECORD_BYTES];
        self.slots.read_at(index * RECORD_BYTES as u64, &mut bytes);
        PosetRecord::from_bytes(bytes)
    }

    /// Stores the poset's snapshot; YES overwrites, anything else only
    /// fills empty slots.
    pub fn insert(&mut self, poset: &AnnotatedPoset) {
        let status = poset.status();
        self.profile_inserted[status.index()] += 1;

        let (index, tag) = self.slot_of(poset.hash());
        if self.tags[index as usize] == EMPTY_TAG || status == Status::Yes {
            if self.tags[index as usize] != EMPTY_TAG {
                let old = self.read_slot(index);
                self.profile_stored[old.status().index()] -= 1;
            }
            self.tags[index as usize] = tag;
            self.slots
                .write_at(index * RECORD_BYTES as u64, poset.snapshot().as_bytes());
            self.profile_stored[status.index()] += 1;
        }
        self.empty = false;
    }

    /// Single-slot lookup through the equality cascade.
    pub fn find(&self, poset: &AnnotatedPoset) -> Option<Status> {
        if self.empty {
            return None;
        }
        let (index, tag) = self.slot_of(poset.hash());
        if self.tags[index as usize] != tag {
            return None;
        }
        let entry = self.read_slot(index);
        if records_match(poset.record(), poset.info(), &entry, self.n) {
            Some(entry.status())
        } else {
            None
        }
    }

    /// Entry capacity of this map.
    pub fn capacity(&self) -> u64 {
        self.size
    }
}

/// Statistics wrapper used by the forward search's lookup path.
pub fn oldgen_find(map: &OldGenMap, poset: &AnnotatedPoset) -> Option<Status> {
    Stats::inc(Counter::OldGenFind);
    let status = map.find(poset)?;
    match status {
        Status::No => Stats::inc(Counter::OldGenFindNo),
        Status::Yes => Stats::inc(Counter::OldGenFindYes),
        Status::Unfinished => Stats::inc(Counter::OldGenFindPending),
    }
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::poset::PosetInfo;
    use crate::infrastructure::scratch::{ScratchAllocator, ScratchFile};

    fn make_map(size: u64, n: usize) -> (OldGenMap, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let len = size * RECORD_BYTES as u64;
        let file = ScratchFile::create(&dir.path().join("oldgen.bin"), len).unwrap();
        let mut alloc = ScratchAllocator::new(file, len);
        (OldGenMap::new(size, alloc.alloc(len), n), dir)
    }

    fn poset(edges: &[(usize, usize)], status: Status, n: usize) -> AnnotatedPoset {
        let mut rec = PosetRecord::new();
        for &(a, b) in edges {
            rec.add_edge(a, b);
        }
        rec.set_unique_graph(true);
        rec.set_self_dual(false);
        rec.set_status(status);
        let info = PosetInfo::from_record(&rec, n);
        let hash = rec.compute_hash(n);
        AnnotatedPoset::new(rec, info, hash, 1)
    }

    #[test]
    fn insert_find_roundtrip() {
        let (mut map, _dir) = make_map(128, 4);
        let p = poset(&[(0, 1), (1, 2), (2, 3)], Status::No, 4);
        assert_eq!(map.find(&p), None);
        map.insert(&p);
        assert_eq!(map.find(&p), Some(Status::No));
        assert_eq!(map.profile_stored[Status::No.index()], 1);
    }

    #[test]
    fn yes_overwrites_occupied_slot() {
        let (mut map, _dir) = make_map(1, 4);
        let no = poset(&[(0, 1), (1, 2), (2, 3)], Status::No, 4);
        let yes = poset(&[(0, 1), (0, 2), (0, 3)], Status::Yes, 4);
        map.insert(&no);
        map.insert(&yes);
        // single slot: the YES record evicted the NO one
        assert_eq!(map.find(&yes), Some(Status::Yes));
        assert_eq!(map.find(&no), None);
        assert_eq!(map.profile_stored[Status::Yes.index()], 1);
        assert_eq!(map.profile_stored[Status::No.index()], 0);
    }

    #[test]
    fn non_yes_does_not_evict() {
        let (mut map, _dir) = make_map(1, 4);
        let first = poset(&[(0, 1), (1, 2), (2, 3)], Status::Yes, 4);
        let second = poset(&[(0, 1), (0, 2), (0, 3)], Status::No, 4);
        map.insert(&first);
        map.insert(&second);
        assert_eq!(map.find(&first), Some(Status::Yes));
    }
}
