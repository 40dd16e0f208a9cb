//! Open-addressing table with triangular probing and banded load factors.
//!
//! The table stores only [`PackedEntry`] values; the records themselves
//! live wherever the caller keeps them. All record access goes through a
//! [`TableCtx`], which also supplies the rehash key and the append
//! operation, so one probing implementation serves both the record-owning
//! shards and the spill-vector-backed layer maps.

use sortbound_core::{AvMax, Counter, Stats};

use super::entry::{PackedEntry, GEN_MAX};

/// Record access for probing: equality against the candidate, the full
/// hash of a stored record (rehash), and appending the candidate.
pub(crate) trait TableCtx {
    fn matches(&mut self, index: u64) -> bool;
    fn rehash_key(&mut self, index: u64) -> u64;
    fn append(&mut self) -> u64;
}

fn load_factor_for(capacity: usize) -> f32 {
    if capacity < 1 << 8 {
        0.45
    } else if capacity < 1 << 12 {
        0.52
    } else if capacity < 1 << 16 {
        0.60
    } else if capacity < 3 << 17 {
        0.68
    } else {
        0.75
    }
}

/// Growth schedule; the result is forced odd and non-divisible by 3 so
/// the triangular probe sequence visits every slot.
fn grown_capacity(capacity: usize) -> usize {
    let mut grown = if capacity < 1 << 5 {
        capacity * 5
    } else if capacity < 3 << 9 {
        capacity * 2
    } else if capacity < 3 << 12 {
        (capacity as f64 * 1.7) as usize
    } else if capacity < 3 << 15 {
        (capacity as f64 * 1.5) as usize
    } else {
        (capacity as f64 * 1.3) as usize
    };
    if grown % 2 == 0 {
        grown += 1;
    }
    if grown % 3 == 0 {
        grown += 2;
    }
    grown
}

pub(crate) struct ShardTable {
    entries: Vec<PackedEntry>,
    capacity: usize,
    num_elements: usize,
    load_factor: f32,
    gen: u32,
}

impl ShardTable {
    pub fn new(initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(3);
        Self {
            entries: vec![PackedEntry::empty(); capacity],
            capacity,
            num_elements: 0,
            load_factor: load_factor_for(capacity),
            gen: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.num_elements
    }

    /// O(1) clear via generation bump; zero-fills only on tag wrap.
    pub fn clear(&mut self) {
        self.gen += 1;
        if self.gen > GEN_MAX {
            self.gen = 0;
            self.entries.fill(PackedEntry::empty());
        }
        self.num_elements = 0;
    }

    /// Probe without insertion.
    pub fn find(
        &self,
        hash: u64,
        prefix: u16,
        mut matches: impl FnMut(u64) -> bool,
    ) -> Option<u64> {
        let mut index = (hash % self.capacity as u64) as usize;
        let mut i = 0usize;
        while self.entries[index].is_valid(self.gen) {
            let entry = self.entries[index];
            Stats::inc(Counter::PrefixTest);
            if entry.prefix() != prefix {
                Stats::inc(Counter::PrefixDiff);
            } else if matches(entry.index()) {
                Stats::add(AvMax::ProbeStepsPos, i as u64 + 1);
                return Some(entry.index());
            }
            i += 1;
            if i >= self.capacity {
                return None;
            }
            index += i;
            if index >= self.capacity {
                index -= self.capacity;
            }
        }
        Stats::add(AvMax::ProbeStepsNeg, i as u64);
        None
    }

    /// Probe, inserting through `ctx.append` on a miss. Returns the
    /// record index either way.
    pub fn find_or_insert(&mut self, hash: u64, prefix: u16, ctx: &mut impl TableCtx) -> u64 {
        'beginning: loop {
            if self.num_elements as f32 >= self.load_factor * self.capacity as f32 {
                self.rehash(ctx);
            }

            let mut index = (hash % self.capacity as u64) as usize;
            let mut i = 0usize;
            while self.entries[index].is_valid(self.gen) {
                let entry = self.entries[index];
                Stats::inc(Counter::PrefixTest);
                if entry.prefix() != prefix {
                    Stats::inc(Counter::PrefixDiff);
                } else if ctx.matches(entry.index()) {
                    Stats::add(AvMax::ProbeStepsPos, i as u64 + 1);
                    return entry.index();
                }
                i += 1;
                if i >= self.capacity || i >= 1 << 16 {
                    // no admissible slot within the probe bound
                    self.rehash(ctx);
                    tracing::debug!(
                        probes = i,
                        capacity = self.capacity,
                        "rehash forced by probe overflow"
                    );
                    continue 'beginning;
                }
                index += i;
                if index >= self.capacity {
                    index -= self.capacity;
                }
            }

            let record_index = ctx.append();
            self.entries[index] = PackedEntry::new(prefix, record_index, self.gen);
            self.num_elements += 1;
            return record_index;
        }
    }

    fn rehash(&mut self, ctx: &mut impl TableCtx) {
        self.capacity = grown_capacity(self.capacity);
        self.load_factor = load_factor_for(self.capacity);

        let mut rebuilt = vec![PackedEntry::empty(); self.capacity];
        for &entry in &self.entries {
            if !entry.is_valid(self.gen) {
                continue;
            }
            let hash = ctx.rehash_key(entry.index());
            let mut index = (hash % self.capacity as u64) as usize;
            let mut i = 0usize;
            while rebuilt[index].is_valid(self.gen) {
                i += 1;
                assert!(i < self.capacity, "rehash failed to place entry");
                index += i;
                if index >= self.capacity {
                    index -= self.capacity;
                }
            }
            rebuilt[index] = entry;
        }
        self.entries = rebuilt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test context over a plain vector of u64 "records" keyed by the
    /// value itself.
    struct VecCtx {
        store: Vec<u64>,
        candidate: u64,
    }

    impl TableCtx for VecCtx {
        fn matches(&mut self, index: u64) -> bool {
            self.store[index as usize] == self.candidate
        }
        fn rehash_key(&mut self, index: u64) -> u64 {
            self.store[index as usize].wrapping_mul(0x9E37_79B9)
        }
        fn append(&mut self) -> u64 {
            self.store.push(self.candidate);
            self.store.len() as u64 - 1
        }
    }

    #[test]
    fn inserts_dedupe_and_survive_rehash() {
        let mut table = ShardTable::new(3);
        let mut ctx = VecCtx { store: Vec::new(), candidate: 0 };
        // enough keys to force several growth steps
        for value in 0..500u64 {
            ctx.candidate = value;
            let idx = table.find_or_insert(value.wrapping_mul(0x9E37_79B9), 7, &mut ctx);
            assert_eq!(ctx.store[idx as usize], value);
        }
        assert_eq!(table.len(), 500);
        for value in 0..500u64 {
            ctx.candidate = value;
            let idx = table.find_or_insert(value.wrapping_mul(0x9E37_79B9), 7, &mut ctx);
            assert_eq!(ctx.store[idx as usize], value, "duplicate insert must dedupe");
        }
        assert_eq!(table.len(), 500);
        assert_eq!(ctx.store.len(), 500);
    }

    #[test]
    fn clear_empties_without_touching_entries() {
        let mut table = ShardTable::new(31);
        let mut ctx = VecCtx { store: Vec::new(), candidate: 42 };
        table.find_or_insert(42, 1, &mut ctx);
        assert_eq!(table.len(), 1);
        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(
            table.find(42, 1, |idx| ctx.store[idx as usize] == 42),
            None,
            "stale generation entries must not match"
        );
    }

    #[test]
    fn grown_capacity_avoids_probe_degeneracy() {
        let mut cap = 5;
        for _ in 0..20 {
            cap = grown_capacity(cap);
            assert_eq!(cap % 2, 1);
            assert_ne!(cap % 3, 0);
        }
    }
}
