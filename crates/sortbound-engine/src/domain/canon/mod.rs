//! Canonical reordering of poset graphs.
//!
//! The canonicalizer maps a DAG (plus its closure) to a canonical vertex
//! ordering via degree-seeded id refinement. Two id streams run in
//! parallel (one neighbouring forward, one reversed) and the
//! lexicographically distinguished stream wins, which also detects
//! self-dual graphs. Equal adjacent ids inside a layer are *ambiguity
//! candidates*: each is verified as an automorphism by reordering and
//! comparing; any failure flags the graph as ambiguous, and equality
//! then falls back to the full isomorphism test in [`iso`].
//!
//! The refinement is probabilistic in the sense that it may fail to
//! separate genuinely different orbits; correctness rests on the
//! ambiguity flag and the fallback, never on the refinement itself.

pub mod iso;

use sortbound_core::{LinExt, RunParams, Stats};
use sortbound_core::{AvMax, Counter, MULT1, PRIME1};

use crate::domain::graph::{AdjacencyMatrix, NeighborLists, VertexList};
use crate::domain::poset::{AnnotatedPoset, PosetInfo, PosetRecord};

use sortbound_core::MAX_N;

/// Singleton/pair bookkeeping for the child reached by comparing
/// `(k1, k2)` on a parent with layout `parent`.
///
/// A comparison consumes singletons (two fresh singletons become a pair)
/// and destroys pairs (a pair endpoint gaining a relation joins the
/// body).
pub fn child_info(parent: PosetInfo, k1: usize, k2: usize, params: RunParams) -> PosetInfo {
    let n = params.n_usize();
    debug_assert!(k1 != k2);
    let singletons = parent.singletons()
        - parent.is_singleton(k1, n) as u32
        - parent.is_singleton(k2, n) as u32;
    let pairs = if parent.is_singleton(k1, n) && parent.is_singleton(k2, n) {
        parent.pairs() + 1
    } else {
        parent.pairs() - parent.is_in_pair(k1, n) as u32 - parent.is_in_pair(k2, n) as u32
    };
    debug_assert!(k1 < parent.first_singleton(n) + 2 && k2 < parent.first_singleton(n) + 2);
    debug_assert!(pairs <= 2);
    let info = PosetInfo::new(singletons, pairs);
    debug_assert!(k1 < info.first_singleton(n) && k2 < info.first_singleton(n));
    info
}

/// A freshly expanded child poset: closure, canonical record and
/// annotations, before it is interned anywhere.
pub struct ExpandedChild {
    closure_lists: NeighborLists,
    record: PosetRecord,
    info: PosetInfo,
    lin_ext: LinExt,
}

impl ExpandedChild {
    /// Child of `parent` under the comparison outcome `k1 < k2`.
    pub fn from_parent(
        parent: &PosetRecord,
        parent_info: PosetInfo,
        lin_ext: LinExt,
        k1: usize,
        k2: usize,
        params: RunParams,
    ) -> Self {
        let info = child_info(parent_info, k1, k2, params);
        let n = params.n_usize();
        let mut mat = parent.to_matrix(n);
        mat.set(k1, k2);
        Self::build(mat, info, lin_ext, Some((k1, k2)), params)
    }

    /// Canonicalizes a matrix that carries the fresh edge `(k1, k2)` but
    /// is not yet re-reduced.
    pub fn from_matrix_with_edge(
        mat: &AdjacencyMatrix,
        info: PosetInfo,
        lin_ext: LinExt,
        k1: usize,
        k2: usize,
        params: RunParams,
    ) -> Self {
        Self::build(*mat, info, lin_ext, Some((k1, k2)), params)
    }

    /// Canonicalizes an already-reduced matrix.
    pub fn from_matrix(
        mat: &AdjacencyMatrix,
        info: PosetInfo,
        lin_ext: LinExt,
        params: RunParams,
    ) -> Self {
        Self::build(*mat, info, lin_ext, None, params)
    }

    fn build(
        mut mat: AdjacencyMatrix,
        info: PosetInfo,
        lin_ext: LinExt,
        reduce_at: Option<(usize, usize)>,
        params: RunParams,
    ) -> Self {
        let n = params.n_usize();
        let mut closure = mat;
        closure.transitive_closure();
        let mut closure_lists = NeighborLists::new(n);
        closure.write_neighbors(&mut closure_lists);

        if let Some((k1, k2)) = reduce_at {
            mat.trans_reduction(k1, k2, &closure_lists);
        }

        let mut record = PosetRecord::new();
        reorder_canonically(&mat, &closure, &closure_lists, info, &mut record, params);

        let reduced_n = info.reduced_n(n);
        if info.pairs() >= 1 {
            debug_assert!(record.is_edge(reduced_n, reduced_n + 1));
        }
        if info.pairs() >= 2 {
            debug_assert!(record.is_edge(reduced_n + 2, reduced_n + 3));
        }

        Self { closure_lists, record, info, lin_ext }
    }

    /// Sufficient sortability test from the comparability count: a poset
    /// with at most `c_left` unrelated pairs sorts by resolving each one.
    /// Only cheap to decide for small budgets.
    pub fn is_easily_sortable_unrelated_pairs(&self, c_left: u32, params: RunParams) -> bool {
        if c_left > 6 {
            return false;
        }
        let n = params.n_usize();
        let related = self.closure_lists.related_pairs();
        let unrelated = n * (n - 1) / 2 - related;
        unrelated as u32 <= c_left
    }

    #[inline]
    pub fn record(&self) -> &PosetRecord {
        &self.record
    }

    /// Finishes the record into an annotated poset with its fingerprint.
    pub fn into_annotated(self, params: RunParams) -> AnnotatedPoset {
        let hash = self.record.compute_hash(params.n_usize());
        AnnotatedPoset::new(self.record, self.info, hash, self.lin_ext)
    }
}

fn reorder_ids(ids: &mut [u64; MAX_N], permutation: &VertexList) {
    let copy = *ids;
    for i in 0..permutation.len() {
        ids[i] = copy[permutation[i]];
    }
}

/// Applies a candidate automorphism (a flip of two positions) and checks
/// whether the reordered closure is unchanged.
fn flip_confirms(
    closure: &AdjacencyMatrix,
    reference: &AdjacencyMatrix,
    permutation: &VertexList,
    position: usize,
) -> bool {
    let mut flipped = *permutation;
    flipped.as_mut_slice().swap(position, position - 1);
    let mut candidate = *closure;
    candidate.reorder(&mut flipped);
    candidate == *reference
}

/// Applies a candidate cycle rotation ending at `position` of length
/// `len` and checks the reordered closure against the reference.
fn cycle_confirms(
    closure: &AdjacencyMatrix,
    reference: &AdjacencyMatrix,
    permutation: &VertexList,
    position: usize,
    len: usize,
) -> bool {
    let mut rotated = *permutation;
    let temp = rotated[position];
    for j in 1..len {
        rotated[position - j + 1] = rotated[position - j];
    }
    rotated[position - len + 1] = temp;
    let mut candidate = *closure;
    candidate.reorder(&mut rotated);
    candidate == *reference
}

fn reorder_canonically(
    mat: &AdjacencyMatrix,
    closure: &AdjacencyMatrix,
    closure_lists: &NeighborLists,
    info: PosetInfo,
    record: &mut PosetRecord,
    params: RunParams,
) {
    Stats::inc(Counter::Canonicalize);

    let n = params.n_usize();
    let reduced_n = info.reduced_n(n);

    const MULTIPLIER: u64 = 23;

    let mut deg = [0u64; MAX_N];
    let mut deg_rev = [0u64; MAX_N];
    let mut ids = [0u64; MAX_N];
    let mut ids_rev = [0u64; MAX_N];

    record.set_self_dual(false);

    for v in 0..reduced_n {
        let out = closure_lists.out_degree(v) as u64;
        let inn = closure_lists.in_degree(v) as u64;
        ids[v] = ((1u64 << (2 * out + 5))
            .wrapping_add(((1u64 << (3 * inn)) % PRIME1).wrapping_mul(MULT1)))
            % PRIME1;
        ids_rev[v] = ((1u64 << (2 * inn + 5))
            .wrapping_add(((1u64 << (3 * out)) % PRIME1).wrapping_mul(MULT1)))
            % PRIME1;
        deg[v] = MULTIPLIER * out + inn;
        deg_rev[v] = MULTIPLIER * inn + out;
        ids[v] = ids[v].wrapping_add(deg[v]);
        ids_rev[v] = ids_rev[v].wrapping_add(deg_rev[v]);
    }

    let rounds = n / 3;
    let mut acc = [0u64; MAX_N];
    let mut acc_rev = [0u64; MAX_N];
    for _ in 0..rounds {
        for v in 0..reduced_n {
            acc[v] = ids[v].wrapping_mul(MULT1);
            acc_rev[v] = ids_rev[v].wrapping_mul(MULT1);
            for &u in closure_lists.out(v) {
                acc[v] = acc[v].wrapping_add(ids[u]);
                acc_rev[v] = acc_rev[v].wrapping_add(ids_rev[u]);
            }
            for &u in closure_lists.inn(v) {
                acc[v] = acc[v].wrapping_add(ids[u]);
                acc_rev[v] = acc_rev[v].wrapping_add(ids_rev[u]);
            }
        }
        for v in 0..reduced_n {
            ids[v] = acc[v]
                ^ (((acc[v] << 5) & deg[v].wrapping_add(0x0101_FFFF_0000_1111))
                    .wrapping_add(acc[v] >> 2));
            ids_rev[v] = acc_rev[v]
                ^ (((acc_rev[v] << 5) & deg_rev[v].wrapping_add(0x0101_FFFF_0000_1111))
                    .wrapping_add(acc_rev[v] >> 2));
        }
    }

    let mut closure_rev = *closure;
    closure_rev.reverse();

    // peeling the reversed closure yields source layers for the forward
    // stream; the closure itself yields sink layers for the reverse one
    let mut layers = closure_rev.peel_layers(reduced_n);
    let mut layers_rev = closure.peel_layers(reduced_n);

    let mut permutation = VertexList::new();
    let mut rev_permutation = VertexList::new();
    let mut flips = VertexList::new();
    let mut cycle_starts = VertexList::new();
    let mut cycle_lens = VertexList::new();
    let mut flips_rev = VertexList::new();
    let mut cycle_starts_rev = VertexList::new();
    let mut cycle_lens_rev = VertexList::new();

    layers.sort_layers_into_permutation(
        &ids, &mut permutation, &mut flips, &mut cycle_starts, &mut cycle_lens,
    );
    layers_rev.sort_layers_into_permutation(
        &ids_rev, &mut rev_permutation, &mut flips_rev, &mut cycle_starts_rev,
        &mut cycle_lens_rev,
    );

    debug_assert_eq!(permutation.len(), reduced_n);
    debug_assert_eq!(rev_permutation.len(), reduced_n);

    let mut num_iso = 0u64;
    let mut num_iso_rev = 0u64;
    let mut num_cycle_iso = 0u64;
    let mut num_cycle_iso_rev = 0u64;
    let mut ambiguous = false;

    let has_candidates = !flips.is_empty()
        || !flips_rev.is_empty()
        || !cycle_lens.is_empty()
        || !cycle_lens_rev.is_empty();

    if has_candidates {
        let mut reference = *closure;
        let mut aux = permutation;
        reference.reorder(&mut aux);
        let mut reference_rev = closure_rev;
        let mut aux_rev = rev_permutation;
        reference_rev.reorder(&mut aux_rev);

        'verify: {
            for i in 0..flips.len() {
                if flip_confirms(closure, &reference, &permutation, flips[i]) {
                    num_iso += 1;
                } else {
                    ambiguous = true;
                    break 'verify;
                }
            }
            for i in 0..flips_rev.len() {
                if flip_confirms(&closure_rev, &reference_rev, &rev_permutation, flips_rev[i]) {
                    num_iso_rev += 1;
                } else {
                    ambiguous = true;
                    break 'verify;
                }
            }
            for i in 0..cycle_starts.len() {
                if cycle_confirms(closure, &reference, &permutation, cycle_starts[i], cycle_lens[i])
                {
                    num_cycle_iso += 1;
                } else {
                    ambiguous = true;
                    break 'verify;
                }
            }
            for i in 0..cycle_starts_rev.len() {
                if cycle_confirms(
                    &closure_rev,
                    &reference_rev,
                    &rev_permutation,
                    cycle_starts_rev[i],
                    cycle_lens_rev[i],
                ) {
                    num_cycle_iso_rev += 1;
                } else {
                    ambiguous = true;
                    break 'verify;
                }
            }
        }
    }

    Stats::add(
        AvMax::AutosFound,
        num_iso.max(num_iso_rev).max(num_cycle_iso).max(num_cycle_iso_rev),
    );
    Stats::add(AvMax::CycleAutosFound, num_cycle_iso.max(num_cycle_iso_rev));

    if ambiguous {
        Stats::inc(Counter::Ambiguous);
        record.set_unique_graph(false);
    } else {
        Stats::inc(Counter::Unambiguous);
        record.set_unique_graph(true);
    }

    reorder_ids(&mut ids, &permutation);
    reorder_ids(&mut ids_rev, &rev_permutation);

    let mut reverse = false;
    if ids[..reduced_n] < ids_rev[..reduced_n] {
        reverse = true;
    } else if ids[..reduced_n] == ids_rev[..reduced_n] {
        if ambiguous {
            record.set_self_dual(true);
            record.set_unique_graph(false);
            Stats::inc(Counter::SelfDualCreated);
        } else {
            let mut forward = *closure;
            let mut aux = permutation;
            forward.reorder(&mut aux);
            let mut backward = closure_rev;
            let mut aux_rev = rev_permutation;
            backward.reorder(&mut aux_rev);
            if forward != backward {
                record.set_self_dual(true);
                record.set_unique_graph(false);
                Stats::inc(Counter::SelfDualCreated);
            }
        }
    }

    let first_in_pair = info.first_in_pair(n);
    if reverse {
        record.set_graph_permutation(mat, &rev_permutation, first_in_pair, info.pairs(), true);
    } else {
        record.set_graph_permutation(mat, &permutation, first_in_pair, info.pairs(), false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::poset::Status;

    fn params(n: u32) -> RunParams {
        RunParams::new(n, 7, 1).unwrap()
    }

    fn canon_of(mat: &AdjacencyMatrix, info: PosetInfo, params: RunParams) -> PosetRecord {
        *ExpandedChild::from_matrix(mat, info, 1, params).record()
    }

    #[test]
    fn canonical_form_is_idempotent() {
        let p = params(5);
        // diamond 0 < {1, 2} < 3 plus singleton 4
        let mut mat = AdjacencyMatrix::new(5);
        mat.set(0, 1);
        mat.set(0, 2);
        mat.set(1, 3);
        mat.set(2, 3);
        let info = PosetInfo::new(1, 0);
        let first = canon_of(&mat, info, p);
        let again = canon_of(&first.to_matrix(5), PosetInfo::from_record(&first, 5), p);
        assert!(first.same_graph(&again));
        assert_eq!(first.unique_graph(), again.unique_graph());
        assert_eq!(first.self_dual(), again.self_dual());
    }

    #[test]
    fn relabelings_share_canonical_bits_when_unique() {
        let p = params(4);
        // fence 0 < 2, 1 < 2, 1 < 3: two topological labelings
        let mut a = AdjacencyMatrix::new(4);
        a.set(0, 2);
        a.set(1, 2);
        a.set(1, 3);
        let mut b = AdjacencyMatrix::new(4);
        b.set(0, 3);
        b.set(1, 3);
        b.set(1, 2);
        let info = PosetInfo::new(0, 0);
        let ca = canon_of(&a, info, p);
        let cb = canon_of(&b, info, p);
        if ca.unique_graph() && cb.unique_graph() {
            assert!(ca.same_graph(&cb));
        }
        // hash agreement regardless of uniqueness
        assert_eq!(ca.compute_hash(4), cb.compute_hash(4));
    }

    #[test]
    fn chain_is_unique_and_not_self_dual_flagged() {
        let p = params(4);
        let mut mat = AdjacencyMatrix::new(4);
        mat.set(0, 1);
        mat.set(1, 2);
        mat.set(2, 3);
        let rec = canon_of(&mat, PosetInfo::new(0, 0), p);
        assert!(rec.unique_graph());
        assert_eq!(rec.status(), Status::Unfinished);
        // a chain reversed is the same unlabeled graph; the canonical form
        // must therefore be a chain again
        let mut edges = 0;
        for j in 0..4 {
            for k in 0..4 {
                edges += rec.is_edge(j, k) as usize;
            }
        }
        assert_eq!(edges, 3);
    }

    #[test]
    fn comparison_of_two_singletons_creates_pair() {
        let p = params(5);
        let parent = PosetRecord::new();
        let info = PosetInfo::from_record(&parent, 5);
        assert_eq!(info.singletons(), 5);
        let child = child_info(info, 0, 1, p);
        assert_eq!(child.pairs(), 1);
        assert_eq!(child.singletons(), 3);

        let expanded = ExpandedChild::from_parent(&parent, info, 60, 0, 1, p);
        let rec = expanded.record();
        // pair sits at the tail positions before the singletons
        assert!(rec.is_edge(0, 1));
        assert!(rec.is_pairs(0, 1, 5));
        assert!(rec.is_singletons_above(2, 5));
    }
}
