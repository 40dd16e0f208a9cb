//! Backward search: predecessor enumeration over sortable posets.
//!
//! Level `c` holds posets sortable in `C − c` further comparisons. A
//! step takes the level-`c+1` layer and produces level `c`: for each
//! child and each reduction edge, deleting the edge (and optionally
//! subsets of the transitive edges the deletion exposes) yields a
//! candidate predecessor; it is kept iff re-adding the *reverse* edge
//! gives a poset already known sortable one level deeper. Pair children
//! short-circuit: removing the pair edge is the only comparison that can
//! have produced them.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use sortbound_core::{AvMax, Counter, LinExt, RunParams, Stats, StorageError, MAX_END_C};

use crate::domain::canon::ExpandedChild;
use crate::domain::graph::{AdjacencyMatrix, VertexList};
use crate::domain::linext::LinExtCalculator;
use crate::domain::poset::{AnnotatedPoset, PosetInfo, PosetRecord, Status};
use crate::infrastructure::map::PosetMap;
use crate::infrastructure::storage::{LayerMeta, LayerStorage};

use super::BATCH_SIZE;

/// Seeds level `C` with the fully sorted chain.
pub fn create_initial_poset_bw(
    storage: &mut LayerStorage,
    params: RunParams,
) -> Result<(), StorageError> {
    let n = params.n_usize();
    let map = PosetMap::new(1, 1, n);

    let mut mat = AdjacencyMatrix::new(n);
    let mut permutation = VertexList::new();
    for i in 0..n - 1 {
        mat.set(i, i + 1);
        permutation.push(i);
    }
    permutation.push(n - 1);

    let info = PosetInfo::new(0, 0);
    let mut record = PosetRecord::new();
    record.set_graph_permutation(&mat, &permutation, info.first_in_pair(n), 0, false);
    record.set_unique_graph(true);
    record.set_self_dual(false);
    record.set_status(Status::Yes);

    let hash = record.compute_hash(n);
    map.find_and_insert(&AnnotatedPoset::new(record, info, hash, 1));

    let mut max_lin_ext = [0 as LinExt; MAX_END_C];
    for (i, slot) in max_lin_ext.iter_mut().enumerate().take(params.c_total as usize + 1) {
        *slot = if i < n - 1 { 0 } else { 1 };
    }
    storage.store(
        &map,
        LayerMeta {
            n: params.n,
            c: params.c_total,
            c_total: params.c_total,
            complete_above: 1,
            max_lin_ext,
            num_yes: 1,
            num_unf: 0,
        },
    )
}

/// Expands one child layer into its predecessor layer and persists it.
/// Returns the per-status counts of the new layer.
#[allow(clippy::too_many_arguments)]
pub fn do_backward_step(
    storage: &mut LayerStorage,
    parent_c: u32,
    limit_parents: LinExt,
    limit_children: LinExt,
    child_list: &[PosetRecord],
    child_map: &PosetMap,
    progress: &AtomicU32,
    params: RunParams,
) -> Result<[u64; 3], StorageError> {
    let parent_map = PosetMap::new(child_list.len().max(1), params.threads, params.n_usize());
    let cursor = AtomicUsize::new(0);

    let env = BwEnv {
        child_list,
        child_map,
        parent_map: &parent_map,
        cursor: &cursor,
        progress,
        parent_c,
        limit_parents,
        limit_children,
        params,
    };

    if child_map.count() as usize > BATCH_SIZE * 4 {
        std::thread::scope(|scope| {
            for _ in 0..params.threads {
                scope.spawn(|| bw_worker(&env));
            }
        });
    } else {
        bw_worker(&env);
    }

    let counts = parent_map.count_by_status(false);

    let mut max_lin_ext = [0 as LinExt; MAX_END_C];
    max_lin_ext.fill((1 as LinExt) << (params.c_total - parent_c));
    storage.store(
        &parent_map,
        LayerMeta {
            n: params.n,
            c: parent_c,
            c_total: params.c_total,
            complete_above: limit_parents,
            max_lin_ext,
            num_yes: counts[Status::Yes.index()],
            num_unf: counts[Status::Unfinished.index()],
        },
    )?;
    Ok(counts)
}

struct BwEnv<'a> {
    child_list: &'a [PosetRecord],
    child_map: &'a PosetMap,
    parent_map: &'a PosetMap,
    cursor: &'a AtomicUsize,
    progress: &'a AtomicU32,
    parent_c: u32,
    limit_parents: LinExt,
    limit_children: LinExt,
    params: RunParams,
}

fn bw_worker(env: &BwEnv) {
    let mut search = BackwardSearch::new(env);
    let mut batches = 0u32;
    loop {
        let begin = env.cursor.fetch_add(BATCH_SIZE, Ordering::Relaxed);
        let end = env.child_list.len().min(begin + BATCH_SIZE);
        if end <= begin {
            break;
        }

        let frac = begin as f32 / env.child_list.len().max(1) as f32;
        env.progress.store(frac.to_bits(), Ordering::Relaxed);

        for record in &env.child_list[begin..end] {
            search.process_record(record);
        }

        batches += 1;
        if batches % 100 == 0 {
            Stats::accumulate();
        }
    }
    Stats::accumulate();
}

/// Worker-local predecessor expansion.
struct BackwardSearch<'a> {
    parent_map: &'a PosetMap,
    child_map: &'a PosetMap,
    parent_c: u32,
    limit_children: LinExt,
    limit_parents: LinExt,
    /// Thresholds above 1 mean the layer is filtered by extension count,
    /// which requires counting at all.
    compute_lin_ext: bool,
    lin_ext_first_child: LinExt,
    calc: LinExtCalculator,
    params: RunParams,
    trans_edges: Vec<(usize, usize)>,
    pred_count: u64,
    pot_pred_count: u64,
}

impl<'a> BackwardSearch<'a> {
    fn new(env: &BwEnv<'a>) -> Self {
        Self {
            parent_map: env.parent_map,
            child_map: env.child_map,
            parent_c: env.parent_c,
            limit_children: env.limit_children,
            limit_parents: env.limit_parents,
            compute_lin_ext: env.limit_parents > 1,
            lin_ext_first_child: 0,
            calc: LinExtCalculator::new(env.params.n, env.params.c_total),
            params: env.params,
            trans_edges: Vec::new(),
            pred_count: 0,
            pot_pred_count: 0,
        }
    }

    /// Explores every predecessor of one child poset.
    fn process_record(&mut self, record: &PosetRecord) {
        let n = self.params.n_usize();
        let info = PosetInfo::from_record(record, n);

        if self.compute_lin_ext {
            self.lin_ext_first_child =
                self.calc.count(record, info, self.parent_c + 1, false, true, self.params);
            if self.lin_ext_first_child < self.limit_parents / 2 {
                // no predecessor can clear the parent threshold
                return;
            }
            debug_assert!(
                self.lin_ext_first_child
                    <= (1 as LinExt) << (self.params.c_total - self.parent_c - 1)
            );
        }

        self.pred_count = 0;
        self.pot_pred_count = 0;

        if info.pairs() > 0 {
            // the pair edge is the only comparison that can have produced
            // this child; both outcomes are the same poset
            let mut parent_mat = record.to_matrix(n);
            let k1 = info.first_singleton(n) - 2;
            let k2 = info.first_singleton(n) - 1;
            parent_mat.delete_edge(k1, k2);
            self.check_and_insert_parent(
                &parent_mat,
                info,
                k1,
                k2,
                self.lin_ext_first_child,
                record.status(),
            );
        } else {
            let reduced_n = info.reduced_n(n);
            for i in 0..reduced_n.saturating_sub(1) {
                for j in i + 1..reduced_n {
                    if record.is_edge(i, j) {
                        self.explore_comparison(record, info, i, j);
                    }
                }
            }
        }

        Stats::add(AvMax::PredCount, self.pred_count);
        Stats::add(AvMax::PotPredCount, self.pot_pred_count);
    }

    /// Undoes the comparison `(k1, k2)`: deletes the edge, restores the
    /// transitive edges the deletion exposes, and recurses over subsets
    /// of those (each is itself a candidate for the undone comparison).
    fn explore_comparison(&mut self, record: &PosetRecord, info: PosetInfo, k1: usize, k2: usize) {
        let n = self.params.n_usize();
        let mut adj = record.to_matrix(n);
        adj.delete_edge(k1, k2);

        let mut closure = adj;
        closure.transitive_closure();

        let mut parent = adj;
        self.trans_edges.clear();
        for i in 0..k1 {
            if adj.get(i, k1) && !closure.get(i, k2) {
                parent.set(i, k2);
                self.trans_edges.push((i, k2));
            }
        }
        for i in k2 + 1..n {
            if adj.get(k2, i) && !closure.get(k1, i) {
                parent.set(k1, i);
                self.trans_edges.push((k1, i));
            }
        }
        let te_last = self.trans_edges.len();

        let (status, lin_rev) = self.check_reverse_edge_sortable(&parent, info, k1, k2);
        if status != Status::No {
            let stored = if status == Status::Unfinished { status } else { record.status() };
            self.check_and_insert_parent(&parent, info, k1, k2, lin_rev, stored);
            self.explore_trans_edges(&parent, info, k1, k2, 0, te_last, record.status());
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn explore_trans_edges(
        &mut self,
        adj: &AdjacencyMatrix,
        info: PosetInfo,
        k1: usize,
        k2: usize,
        te_first: usize,
        te_last: usize,
        child_status: Status,
    ) {
        if te_first == te_last {
            return;
        }

        // even deleting every remaining transitive edge leaves too many
        // comparisons for this level
        if adj.edge_count() - (te_last - te_first) > self.parent_c as usize {
            Stats::inc(Counter::PredLimitEdgeCount);
            return;
        }

        let n = self.params.n_usize();
        let (j1, j2) = self.trans_edges[te_first];
        let te_first = te_first + 1;

        // keep the edge
        self.explore_trans_edges(adj, info, k1, k2, te_first, te_last, child_status);

        // delete it, restoring whatever turns transitive in turn
        let mut reduced = *adj;
        reduced.delete_edge(j1, j2);
        let mut closure = reduced;
        closure.transitive_closure();

        self.trans_edges.truncate(te_last);
        let mut te_last = te_last;
        for i in 0..j1 {
            if reduced.get(i, j1) && !closure.get(i, j2) {
                reduced.set(i, j2);
                self.trans_edges.push((i, j2));
                te_last += 1;
            }
        }
        for i in j2 + 1..n {
            if reduced.get(j2, i) && !closure.get(j1, i) {
                reduced.set(j1, i);
                self.trans_edges.push((j1, i));
                te_last += 1;
            }
        }

        let (status, lin_rev) =
            if te_last - te_first == 1 && reduced.edge_count() > self.parent_c as usize {
                (Status::Unfinished, 0)
            } else {
                self.check_reverse_edge_sortable(&reduced, info, k1, k2)
            };
        if status != Status::No {
            let stored = if status == Status::Unfinished { status } else { child_status };
            self.check_and_insert_parent(&reduced, info, k1, k2, lin_rev, stored);
            self.explore_trans_edges(&reduced, info, k1, k2, te_first, te_last, child_status);
        }
    }

    /// Is the poset obtained by adding the *reverse* edge `k2 → k1`
    /// sortable one level deeper? NO rules the predecessor out; YES and
    /// UNFINISHED both keep it (the latter records partial knowledge).
    fn check_reverse_edge_sortable(
        &mut self,
        adj: &AdjacencyMatrix,
        info: PosetInfo,
        k1: usize,
        k2: usize,
    ) -> (Status, LinExt) {
        self.pot_pred_count += 1;

        let mut mat = *adj;
        mat.set(k2, k1);

        if !self.compute_lin_ext && adj.edge_count() > self.parent_c as usize {
            return (Status::Unfinished, 0);
        }

        let expanded = ExpandedChild::from_matrix_with_edge(&mat, info, 0, k2, k1, self.params);
        let handle = expanded.into_annotated(self.params);
        let result = self.child_map.find(&handle);

        let mut lin_rev = 0;
        if self.compute_lin_ext {
            lin_rev = self.calc.count(
                handle.record(),
                handle.info(),
                self.parent_c + 1,
                false,
                true,
                self.params,
            );
            if lin_rev > (1 as LinExt) << (self.params.c_total - self.parent_c - 1) {
                debug_assert!(result.is_none());
                return (Status::No, lin_rev);
            }
        }

        if adj.edge_count() > self.parent_c as usize {
            return (Status::Unfinished, lin_rev);
        }

        match result {
            Some(status) => (status, lin_rev),
            None => {
                if self.compute_lin_ext && lin_rev < self.limit_children {
                    // below the child layer's completeness threshold its
                    // absence proves nothing
                    (Status::Unfinished, lin_rev)
                } else {
                    (Status::No, lin_rev)
                }
            }
        }
    }

    /// Canonicalizes a candidate predecessor (moving fresh singletons and
    /// pairs to the tail first) and interns it into the parent layer.
    fn check_and_insert_parent(
        &mut self,
        parent_mat: &AdjacencyMatrix,
        child_info: PosetInfo,
        k1: usize,
        k2: usize,
        lin_ext_second_child: LinExt,
        status: Status,
    ) {
        let n = self.params.n_usize();

        if parent_mat.edge_count() > self.parent_c as usize {
            return;
        }
        if self.compute_lin_ext
            && self.lin_ext_first_child + lin_ext_second_child < self.limit_parents
        {
            return;
        }

        let mut singletons = child_info.singletons();
        let mut pairs = child_info.pairs();
        let mut reordered = *parent_mat;

        if k1 >= child_info.first_in_pair(n) {
            // the undone comparison was the pair edge; its endpoints are
            // singletons again
            debug_assert_eq!(k1, child_info.first_singleton(n) - 2);
            debug_assert_eq!(k2, child_info.first_singleton(n) - 1);
            pairs -= 1;
            singletons += 2;
        } else {
            debug_assert_eq!(pairs, 0);
            let mut to_move = [0usize; 6];
            let mut moved = 0usize;
            if let Some((first, second)) = check_pair(parent_mat, k1) {
                to_move[moved] = first;
                to_move[moved + 1] = second;
                moved += 2;
                pairs += 1;
            }
            if let Some((first, second)) = check_pair(parent_mat, k2) {
                to_move[moved] = first;
                to_move[moved + 1] = second;
                moved += 2;
                pairs += 1;
            }
            if is_singleton(parent_mat, k1) {
                to_move[moved] = k1;
                moved += 1;
                singletons += 1;
            }
            if is_singleton(parent_mat, k2) {
                to_move[moved] = k2;
                moved += 1;
                singletons += 1;
            }
            if moved != 0 {
                let mut permutation = VertexList::new();
                let body = child_info.reduced_n(n);
                for i in 0..body {
                    if !to_move[..moved].contains(&i) {
                        permutation.push(i);
                    }
                }
                for &v in &to_move[..moved] {
                    permutation.push(v);
                }
                reordered.reorder(&mut permutation);
            }
        }

        let parent_info = PosetInfo::new(singletons, pairs);
        let expanded = ExpandedChild::from_matrix(
            &reordered,
            parent_info,
            self.lin_ext_first_child + lin_ext_second_child,
            self.params,
        );
        let handle = expanded.into_annotated(self.params);
        if status == Status::Yes {
            handle.set_sortable();
        }

        // a predecessor already present one level deeper was reached by a
        // cheaper route; skip it
        if self.child_map.find(&handle).is_none() {
            self.pred_count += 1;
            self.parent_map.find_and_insert(&handle);
        }
    }
}

/// No relation at all touches `v`.
fn is_singleton(mat: &AdjacencyMatrix, v: usize) -> bool {
    for i in 0..mat.size() {
        if i != v && (mat.get(i, v) || mat.get(v, i)) {
            return false;
        }
    }
    true
}

/// If `v` sits in an isolated two-vertex component, returns its pair
/// oriented along the edge.
fn check_pair(mat: &AdjacencyMatrix, v: usize) -> Option<(usize, usize)> {
    let mut other = None;
    for i in 0..mat.size() {
        if i != v && (mat.get(i, v) || mat.get(v, i)) {
            debug_assert!(!(mat.get(i, v) && mat.get(v, i)));
            other = Some(i);
            break;
        }
    }
    let other = other?;
    for i in other + 1..mat.size() {
        if i != v && (mat.get(i, v) || mat.get(v, i)) {
            return None;
        }
    }
    for i in 0..mat.size() {
        if i != v && i != other && (mat.get(i, other) || mat.get(other, i)) {
            return None;
        }
    }
    if mat.get(v, other) {
        Some((v, other))
    } else {
        debug_assert!(mat.get(other, v));
        Some((other, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_and_pair_detection() {
        let mut mat = AdjacencyMatrix::new(5);
        mat.set(0, 1);
        mat.set(2, 3);
        assert!(!is_singleton(&mat, 0));
        assert!(is_singleton(&mat, 4));
        assert_eq!(check_pair(&mat, 1), Some((0, 1)));
        assert_eq!(check_pair(&mat, 2), Some((2, 3)));
        assert_eq!(check_pair(&mat, 4), None);

        // 0 → 1 with an extra relation 0 → 2 is not a pair
        let mut linked = AdjacencyMatrix::new(4);
        linked.set(0, 1);
        linked.set(0, 2);
        assert_eq!(check_pair(&linked, 1), None);
        assert_eq!(check_pair(&linked, 0), None);
    }
}
