//! Lock-striped poset maps.
//!
//! [`PosetMap`] owns its records (backward search layers, persisted-layer
//! lookups). [`LayerMap`] keeps only the hash tables and interns records
//! into the forward search's shared spill vector. Both dedupe through the
//! fingerprint prefilter plus the isomorphism equality cascade.

use parking_lot::Mutex;

use crate::domain::poset::{AnnotatedPoset, PosetInfo, PosetRecord, Status};
use crate::infrastructure::spill::SpillVector;

use super::table::{ShardTable, TableCtx};
use super::{hash_prefix, records_match, shard_index};

fn shard_count(initial_capacity: usize, threads: u32) -> usize {
    (initial_capacity / 4096).max(threads as usize).max(1).min(1 << 16)
}

fn shard_initial_capacity(initial_capacity: usize, num_shards: usize) -> usize {
    let per_shard = initial_capacity as f64 / num_shards as f64;
    let multiplier = if per_shard < (1u64 << 12) as f64 { 1.96 } else { 1.75 };
    ((per_shard * multiplier) as usize).max(993)
}

struct OwnedShard {
    table: ShardTable,
    store: Vec<PosetRecord>,
}

struct OwnedCtx<'a> {
    store: &'a mut Vec<PosetRecord>,
    candidate: &'a PosetRecord,
    candidate_info: PosetInfo,
    n: usize,
}

impl TableCtx for OwnedCtx<'_> {
    fn matches(&mut self, index: u64) -> bool {
        records_match(self.candidate, self.candidate_info, &self.store[index as usize], self.n)
    }

    fn rehash_key(&mut self, index: u64) -> u64 {
        let record = &self.store[index as usize];
        record.compute_hash(self.n)
    }

    fn append(&mut self) -> u64 {
        self.store.push(*self.candidate);
        self.store.len() as u64 - 1
    }
}

/// Sharded map owning its poset records.
pub struct PosetMap {
    shards: Box<[Mutex<OwnedShard>]>,
    n: usize,
}

impl PosetMap {
    pub fn new(initial_capacity: usize, threads: u32, n: usize) -> Self {
        let num_shards = shard_count(initial_capacity, threads);
        let per_shard = shard_initial_capacity(initial_capacity, num_shards);
        let shards = (0..num_shards)
            .map(|_| {
                Mutex::new(OwnedShard { table: ShardTable::new(per_shard), store: Vec::new() })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards, n }
    }

    /// Status of the stored representative, if any record isomorphic to
    /// the candidate is present.
    pub fn find(&self, candidate: &AnnotatedPoset) -> Option<Status> {
        let hash = candidate.hash();
        let shard = &self.shards[shard_index(hash, self.shards.len())];
        let guard = shard.lock();
        let OwnedShard { table, store } = &*guard;
        table
            .find(hash, hash_prefix(hash), |index| {
                records_match(candidate.record(), candidate.info(), &store[index as usize], self.n)
            })
            .map(|index| store[index as usize].status())
    }

    /// Interns the candidate's snapshot unless an isomorphic record is
    /// already present.
    pub fn find_and_insert(&self, candidate: &AnnotatedPoset) {
        let hash = candidate.hash();
        let shard = &self.shards[shard_index(hash, self.shards.len())];
        let mut guard = shard.lock();
        let OwnedShard { table, store } = &mut *guard;
        let snapshot = candidate.snapshot();
        let mut ctx = OwnedCtx {
            store,
            candidate: &snapshot,
            candidate_info: candidate.info(),
            n: self.n,
        };
        table.find_or_insert(hash, hash_prefix(hash), &mut ctx);
    }

    pub fn count(&self) -> u64 {
        self.shards.iter().map(|s| s.lock().store.len() as u64).sum()
    }

    /// Per-status record counts; with `only_marked`, unmarked records are
    /// skipped.
    pub fn count_by_status(&self, only_marked: bool) -> [u64; 3] {
        let mut result = [0u64; 3];
        for shard in self.shards.iter() {
            let guard = shard.lock();
            for record in &guard.store {
                if !only_marked || record.marked() {
                    result[record.status().index()] += 1;
                }
            }
        }
        result
    }

    /// Copies every stored record out, shard by shard.
    pub fn fill(&self) -> Vec<PosetRecord> {
        let mut records = Vec::with_capacity(self.count() as usize);
        for shard in self.shards.iter() {
            records.extend_from_slice(&shard.lock().store);
        }
        records
    }
}

struct LayerCtx<'a> {
    list: &'a SpillVector<AnnotatedPoset>,
    candidate: &'a AnnotatedPoset,
    n: usize,
}

impl TableCtx for LayerCtx<'_> {
    fn matches(&mut self, index: u64) -> bool {
        let entry = self.list.get(index as usize);
        records_match(self.candidate.record(), self.candidate.info(), entry.record(), self.n)
    }

    fn rehash_key(&mut self, index: u64) -> u64 {
        self.list.get(index as usize).hash()
    }

    fn append(&mut self) -> u64 {
        self.list.insert(self.candidate.clone()) as u64
    }
}

/// Sharded dedup index over the forward search's poset spill vector.
///
/// Cleared between steps via the tables' generation tags; the spill
/// vector itself is truncated separately by the layer state machine.
pub struct LayerMap {
    shards: Box<[Mutex<ShardTable>]>,
    n: usize,
}

impl LayerMap {
    pub fn new(initial_capacity: usize, threads: u32, n: usize) -> Self {
        let num_shards = shard_count(initial_capacity, threads);
        let per_shard = shard_initial_capacity(initial_capacity, num_shards);
        let shards = (0..num_shards)
            .map(|_| Mutex::new(ShardTable::new(per_shard)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards, n }
    }

    /// Finds the candidate in the layer or interns it into `list`.
    /// Returns the spill index of the representative.
    pub fn find_and_insert(
        &self,
        list: &SpillVector<AnnotatedPoset>,
        candidate: &AnnotatedPoset,
    ) -> u64 {
        let hash = candidate.hash();
        let shard = &self.shards[shard_index(hash, self.shards.len())];
        let mut table = shard.lock();
        let mut ctx = LayerCtx { list, candidate, n: self.n };
        table.find_or_insert(hash, hash_prefix(hash), &mut ctx)
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canon::ExpandedChild;
    use sortbound_core::RunParams;

    fn annotated(edges: &[(usize, usize)], n: usize, info: PosetInfo) -> AnnotatedPoset {
        let params = RunParams::new(n as u32, 7, 1).unwrap();
        let mut mat = crate::domain::graph::AdjacencyMatrix::new(n);
        for &(a, b) in edges {
            mat.set(a, b);
        }
        ExpandedChild::from_matrix(&mat, info, 1, params).into_annotated(params)
    }

    #[test]
    fn roundtrip_and_dedup() {
        let map = PosetMap::new(64, 2, 4);
        // chain 0 → 1 → 2 with singleton 3
        let a = annotated(&[(0, 1), (1, 2)], 4, PosetInfo::new(1, 0));
        assert_eq!(map.find(&a), None);
        map.find_and_insert(&a);
        assert_eq!(map.find(&a), Some(Status::Unfinished));
        map.find_and_insert(&a);
        assert_eq!(map.count(), 1, "re-insert must dedupe");

        // a relabeled chain resolves to the same representative
        let b = annotated(&[(0, 2), (2, 1)], 4, PosetInfo::new(1, 0));
        map.find_and_insert(&b);
        assert_eq!(map.count(), 1);
    }

    #[test]
    fn distinct_posets_coexist() {
        let map = PosetMap::new(64, 2, 4);
        let chain = annotated(&[(0, 1), (1, 2), (2, 3)], 4, PosetInfo::new(0, 0));
        let fork = annotated(&[(0, 1), (0, 2), (0, 3)], 4, PosetInfo::new(0, 0));
        map.find_and_insert(&chain);
        map.find_and_insert(&fork);
        assert_eq!(map.count(), 2);
        assert!(map.find(&chain).is_some());
        assert!(map.find(&fork).is_some());
    }
}
