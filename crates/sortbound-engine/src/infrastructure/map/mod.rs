//! Hash maps keyed by poset fingerprints with isomorphism-aware equality.

mod entry;
mod oldgen;
mod sharded;
mod table;

pub use entry::PackedEntry;
pub use oldgen::{oldgen_find, OldGenMap};
pub use sharded::{LayerMap, PosetMap};

use sortbound_core::{Counter, Stats, PRIME2, PRIME3};

use crate::domain::canon::iso;
use crate::domain::poset::{PosetInfo, PosetRecord};

/// Fingerprint bits stored next to an entry as a cheap prefilter.
#[inline]
pub(crate) fn hash_prefix(hash: u64) -> u16 {
    ((hash % PRIME3) & 0xFFFF) as u16
}

/// Shard selection; a different modulus than the in-table probe so shard
/// and slot choices stay uncorrelated.
#[inline]
pub(crate) fn shard_index(hash: u64, num_shards: usize) -> usize {
    ((hash % PRIME2) as usize) % num_shards
}

/// Equality cascade behind a matching fingerprint prefix.
///
/// Cheap structural disagreements are ruled out first; bit-equality is the
/// fast positive; only ambiguous (or self-dual) records fall through to
/// the full isomorphism test.
pub(crate) fn records_match(
    candidate: &PosetRecord,
    candidate_info: PosetInfo,
    entry: &PosetRecord,
    n: usize,
) -> bool {
    Stats::inc(Counter::EqualTest);

    if candidate.unique_graph() != entry.unique_graph()
        || candidate.self_dual() != entry.self_dual()
    {
        Stats::inc(Counter::FlagDiff);
        return false;
    }

    Stats::inc(Counter::GraphBitsTest);
    if candidate.same_graph(entry) {
        Stats::inc(Counter::GraphBitsEqual);
        return true;
    }

    // a unique canonical form that is not self-dual has exactly one bit
    // representation per isomorphism class
    if candidate.unique_graph() && !candidate.self_dual() {
        return false;
    }

    let reduced_n = candidate_info.reduced_n(n);
    if !entry.is_singletons_above(candidate_info.first_singleton(n), n) {
        Stats::inc(Counter::SingletonsDiff);
        return false;
    }
    if !entry.is_pairs(reduced_n, candidate_info.pairs(), n) {
        Stats::inc(Counter::PairsDiff);
        return false;
    }

    if candidate.self_dual() {
        iso::is_isomorphic(candidate, entry, reduced_n)
            || iso::is_rev_isomorphic(candidate, entry, reduced_n)
    } else {
        iso::is_isomorphic(candidate, entry, reduced_n)
    }
}
