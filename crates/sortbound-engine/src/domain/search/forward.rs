//! Forward search: comparison decisions with AND/OR propagation.
//!
//! A parent poset is sortable iff some comparison makes *both* outcome
//! children sortable; unsortable iff every comparison leaves some child
//! unsortable. Each layer walks a four-phase machine:
//!
//! - phase 0 collects the layer's marked posets, sorted by extension
//!   count (cheap ones first), into the edge list;
//! - phase 1 enumerates feasible comparisons per parent, resolves what it
//!   can against the backward-search and old-generation maps, and emits
//!   the undecided children plus their OR-of-ANDs edge entries;
//! - phase 2 folds the children's final statuses back into the parents,
//!   compacting each surviving edge list in place;
//! - phase 3 repeats the fold until nothing is UNFINISHED, then spills
//!   the resolved parents into the old-generation cache.
//!
//! Child emission is capped (`child_poset_limit`, `child_edge_limit`); a
//! full batch parks the layer mid-slice and the driver returns later for
//! the rest.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use rayon::prelude::*;

use sortbound_core::{
    factorial, is_easily_sortable_lin_ext, AvMax, Counter, LinExt, RunParams, Stats, MULT1,
};

use crate::domain::canon::ExpandedChild;
use crate::domain::linext::LinExtCalculator;
use crate::domain::poset::{AnnotatedPoset, PosetInfo, PosetRecord, Status};
use crate::infrastructure::map::{oldgen_find, LayerMap, OldGenMap, PosetMap};
use crate::infrastructure::spill::SpillVector;

use super::{LayerState, BATCH_SIZE};

/// Seeds level 0 with the antichain.
pub fn create_initial_poset(
    poset_list: &SpillVector<AnnotatedPoset>,
    state: &mut LayerState,
    params: RunParams,
) {
    let mut record = PosetRecord::new();
    record.set_marked(true);
    let info = PosetInfo::from_record(&record, params.n_usize());
    let hash = record.compute_hash(params.n_usize());
    poset_list.insert(AnnotatedPoset::new(record, info, hash, factorial(params.n)));
    state.poset_list_begin = 0;
    state.poset_list_end = 1;
    state.phase = 0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparisonStatus {
    Sortable,
    Unsortable,
    Indeterminate,
}

#[derive(Debug, Clone, Copy)]
struct ComparisonTuple {
    k1: usize,
    k2: usize,
    lin1: LinExt,
    lin2: LinExt,
    /// Comparison of two singletons: both outcomes are isomorphic, so
    /// only one child needs exploring.
    singleton: bool,
}

/// Shared context of the phase-1 exploration workers.
struct ExploreEnv<'a> {
    poset_list: &'a SpillVector<AnnotatedPoset>,
    edge_list: &'a SpillVector<AtomicU64>,
    child_map: &'a LayerMap,
    child_map_bw: &'a PosetMap,
    child_map_old: &'a OldGenMap,
    cursor: &'a AtomicUsize,
    progress: &'a AtomicU32,
    parent_c: u32,
    limit: LinExt,
    child_complete_above: LinExt,
    child_poset_limit: usize,
    child_edge_limit: usize,
    el_begin: usize,
    poset_list_begin: usize,
    parents_begin: usize,
    parents_end: usize,
    params: RunParams,
}

/// Shared context of the phase-2/3 resolution workers.
struct ResolveEnv<'a> {
    poset_list: &'a SpillVector<AnnotatedPoset>,
    edge_list: &'a SpillVector<AtomicU64>,
    cursor: &'a AtomicUsize,
    has_unfinished: &'a AtomicBool,
    slice_begin: usize,
    slice_end: usize,
    el_begin: usize,
    phase: u8,
}

/// Advances one layer's state machine by one step.
#[allow(clippy::too_many_arguments)]
pub fn do_forward_step(
    poset_list: &mut SpillVector<AnnotatedPoset>,
    edge_list: &mut SpillVector<AtomicU64>,
    parent_state: &mut LayerState,
    child_state: &mut LayerState,
    parent_c: &mut u32,
    child_complete_above: LinExt,
    child_map: &LayerMap,
    child_map_bw: &PosetMap,
    child_map_old: &OldGenMap,
    parent_map_old: &mut OldGenMap,
    limit: LinExt,
    progress: &AtomicU32,
    temp: &mut Vec<u64>,
    child_poset_limit: usize,
    child_edge_limit: usize,
    params: RunParams,
) {
    if parent_state.phase >= 2 {
        if parent_state.phase == 2 {
            Stats::inc(Counter::Phase2);
        } else {
            debug_assert_eq!(parent_state.phase, 3);
            Stats::inc(Counter::Phase3);
        }

        poset_list.ensure_online_from(parent_state.poset_list_begin);
        edge_list.ensure_online_from(parent_state.parents_begin);

        tracing::debug!(c = *parent_c, phase = parent_state.phase, "resolving layer");
        let cursor = AtomicUsize::new(parent_state.parents_slice_begin);
        let has_unfinished = AtomicBool::new(false);
        let env = ResolveEnv {
            poset_list,
            edge_list,
            cursor: &cursor,
            has_unfinished: &has_unfinished,
            slice_begin: parent_state.parents_slice_begin,
            slice_end: parent_state.parents_slice_end,
            el_begin: parent_state.el_begin,
            phase: parent_state.phase,
        };

        let mut drained: Vec<u64> = Vec::new();
        if env.slice_end - env.slice_begin > BATCH_SIZE * 4 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..params.threads)
                    .map(|_| scope.spawn(|| resolve_worker(&env)))
                    .collect();
                for handle in handles {
                    drained.extend(handle.join().expect("resolve worker panicked"));
                }
            });
        } else {
            drained = resolve_worker(&env);
        }

        if parent_state.phase == 3 {
            debug_assert!(!has_unfinished.load(Ordering::Relaxed));
        }

        // park single-survivor parents in the old-gen cache while still
        // UNFINISHED; the cache serves them as indeterminate hits
        for &idx in &drained {
            parent_map_old.insert(poset_list.get(idx as usize));
        }

        if has_unfinished.load(Ordering::Relaxed) {
            parent_state.phase = 3;
            child_state.poset_list_begin = parent_state.poset_list_end;
            debug_assert_eq!(child_state.poset_list_end, poset_list.len());
            child_state.phase = 0;
            *parent_c += 1;
            return;
        }

        poset_list.resize(parent_state.poset_list_end);
        edge_list.resize(parent_state.el_begin);

        if parent_state.parents_slice_end == parent_state.parents_end {
            // the layer is fully resolved: move everything settled into
            // the old-gen cache, slot-ordered to keep the writes local
            temp.clear();
            for i in parent_state.parents_begin..parent_state.parents_end {
                let idx = edge_list.get(i).load(Ordering::Relaxed);
                let poset = poset_list.get(idx as usize);
                if poset.marked() && poset.status() != Status::Unfinished {
                    temp.push(idx);
                    poset.set_marked(false);
                }
            }
            let size = parent_map_old.capacity();
            let list: &SpillVector<AnnotatedPoset> = poset_list;
            temp.par_sort_unstable_by_key(|&idx| {
                list.get(idx as usize).hash().wrapping_mul(MULT1) % size
            });
            for &idx in temp.iter() {
                parent_map_old.insert(poset_list.get(idx as usize));
            }
            edge_list.resize(parent_state.parents_begin);
            if *parent_c > 0 {
                *parent_c -= 1;
            }
            return;
        }
        // more parent slices to explore
        parent_state.phase = 1;
    }

    if parent_state.phase == 0 {
        temp.clear();
        for i in parent_state.poset_list_begin..parent_state.poset_list_end {
            if poset_list.get(i).marked() {
                temp.push(i as u64);
            }
        }
        let list: &SpillVector<AnnotatedPoset> = poset_list;
        temp.par_sort_unstable_by_key(|&idx| list.get(idx as usize).lin_ext());

        edge_list.ensure_online_available(temp.len());
        parent_state.parents_begin = edge_list.len();
        edge_list.insert_all(temp.iter().map(|&v| AtomicU64::new(v)), temp.len());
        parent_state.parents_end = edge_list.len();
        parent_state.parents_slice_begin = parent_state.parents_begin;
        parent_state.parents_slice_end = parent_state.parents_begin;
        parent_state.phase = 1;
    }

    if parent_state.phase == 1 {
        Stats::inc(Counter::Phase1);

        let child_list_begin = poset_list.len();
        parent_state.el_begin = edge_list.len();
        parent_state.parents_slice_begin = parent_state.parents_slice_end;

        poset_list.ensure_online_from(parent_state.poset_list_begin);
        poset_list.ensure_online_available(child_poset_limit + 50_000);
        edge_list.ensure_online_from(parent_state.parents_slice_begin);
        edge_list.ensure_online_available(child_edge_limit + 100_000);

        tracing::debug!(c = *parent_c, "exploring layer");
        let cursor = AtomicUsize::new(parent_state.parents_slice_begin);
        let env = ExploreEnv {
            poset_list,
            edge_list,
            child_map,
            child_map_bw,
            child_map_old,
            cursor: &cursor,
            progress,
            parent_c: *parent_c,
            limit,
            child_complete_above,
            child_poset_limit,
            child_edge_limit,
            el_begin: parent_state.el_begin,
            poset_list_begin: parent_state.poset_list_begin,
            parents_begin: parent_state.parents_begin,
            parents_end: parent_state.parents_end,
            params,
        };

        if parent_state.parents_end - parent_state.parents_slice_begin > BATCH_SIZE * 4 {
            std::thread::scope(|scope| {
                for _ in 0..params.threads {
                    scope.spawn(|| explore_worker(&env));
                }
            });
        } else {
            explore_worker(&env);
        }
        parent_state.parents_slice_end =
            cursor.load(Ordering::Relaxed).min(parent_state.parents_end);

        child_map.clear();

        if parent_state.el_begin == edge_list.len() {
            // every parent in the slice resolved without pending children
            poset_list.resize(parent_state.poset_list_end);
            edge_list.resize(parent_state.parents_begin);
            if *parent_c > 0 {
                *parent_c -= 1;
            }
            return;
        }

        // mark one child of each surviving conjunction so the child layer
        // explores something from every open disjunct
        for i in parent_state.parents_slice_begin..parent_state.parents_slice_end {
            let parent = poset_list.get(edge_list.get(i).load(Ordering::Relaxed) as usize);
            if !parent.marked() || parent.status() != Status::Unfinished {
                continue;
            }
            let el_index = parent.edge_index() as usize;
            let el_size = edge_list.get(el_index).load(Ordering::Relaxed) as usize;
            for k in (0..el_size).step_by(2) {
                let first = edge_list.get(el_index + 1 + k).load(Ordering::Relaxed) as usize;
                let second = edge_list.get(el_index + 2 + k).load(Ordering::Relaxed) as usize;
                if !poset_list.get(second).marked() && !poset_list.get(first).marked() {
                    Stats::inc(Counter::MarkFirst);
                    poset_list.get(first).set_marked(true);
                }
            }
        }

        parent_state.phase = 2;
        child_state.poset_list_begin = child_list_begin;
        child_state.poset_list_end = poset_list.len();
        child_state.phase = 0;
        *parent_c += 1;
    }
}

fn resolve_worker(env: &ResolveEnv) -> Vec<u64> {
    let mut local_edges: Vec<u64> = Vec::new();
    let mut drained: Vec<u64> = Vec::new();

    loop {
        let begin = env.cursor.fetch_add(BATCH_SIZE, Ordering::Relaxed);
        let end = env.slice_end.min(begin + BATCH_SIZE);
        if end <= begin {
            break;
        }
        for index in begin..end {
            let parent_idx = env.edge_list.get(index).load(Ordering::Relaxed);
            let parent = env.poset_list.get(parent_idx as usize);
            if !parent.marked() || parent.status() != Status::Unfinished {
                continue;
            }
            resolve_parent(env, parent, parent_idx, &mut local_edges, &mut drained);
        }
    }

    Stats::accumulate();
    drained
}

/// Folds the childrens' statuses into one parent's disjunction.
fn resolve_parent(
    env: &ResolveEnv,
    parent: &AnnotatedPoset,
    parent_idx: u64,
    local_edges: &mut Vec<u64>,
    drained: &mut Vec<u64>,
) {
    let el_index = parent.edge_index() as usize;
    debug_assert!(el_index >= env.el_begin);
    let el_size = env.edge_list.get(el_index).load(Ordering::Relaxed) as usize;
    debug_assert_eq!(el_size % 2, 0);

    local_edges.clear();
    let mut unsortable = true;
    for i in (0..el_size).step_by(2) {
        let idx_first = env.edge_list.get(el_index + 1 + i).load(Ordering::Relaxed);
        let idx_second = env.edge_list.get(el_index + 2 + i).load(Ordering::Relaxed);
        debug_assert!(env.phase == 2 || idx_first == idx_second);
        let first = env.poset_list.get(idx_first as usize);
        let second = env.poset_list.get(idx_second as usize);
        let first_sortable = first.status() == Status::Yes;
        let second_sortable = second.status() == Status::Yes;
        if first_sortable && second_sortable {
            parent.set_sortable();
            return;
        } else if first.status() == Status::No || second.status() == Status::No {
            // comparison refuted
        } else if first_sortable {
            local_edges.push(idx_second);
            local_edges.push(idx_second);
            unsortable = false;
        } else if second_sortable {
            local_edges.push(idx_first);
            local_edges.push(idx_first);
            unsortable = false;
        } else {
            unreachable!("both children of a surviving entry unresolved");
        }
    }

    if unsortable {
        parent.set_unsortable();
        return;
    }

    // compact the surviving entries in place and mark their children
    let new_size = local_edges.len();
    debug_assert!(new_size <= el_size);
    env.edge_list.get(el_index).store(new_size as u64, Ordering::Relaxed);
    for (i, &idx) in local_edges.iter().enumerate() {
        env.edge_list.get(el_index + 1 + i).store(idx, Ordering::Relaxed);
        Stats::inc(Counter::MarkSecond);
        env.poset_list.get(idx as usize).set_marked(true);
    }
    env.has_unfinished.store(true, Ordering::Relaxed);
    Stats::add(AvMax::EdgeListPhase2, (new_size / 2) as u64);

    if new_size == 2 {
        // disjunction drained to a single pending child: park the parent
        // in the old-gen cache even though it is still UNFINISHED
        drained.push(parent_idx);
    }
}

fn explore_worker(env: &ExploreEnv) {
    let mut calc = LinExtCalculator::new(env.params.n, env.params.c_total);
    let mut comparisons: Vec<ComparisonTuple> = Vec::new();
    let mut local_edges: Vec<u64> = Vec::new();
    let p_max = (env.parents_end - env.parents_begin).max(1);

    while env.edge_list.len() - env.el_begin < env.child_edge_limit
        && env.poset_list.len() - env.poset_list_begin < env.child_poset_limit
    {
        let begin = env.cursor.fetch_add(BATCH_SIZE, Ordering::Relaxed);
        let end = env.parents_end.min(begin + BATCH_SIZE);
        if end <= begin {
            break;
        }

        let frac = (begin - env.parents_begin) as f32 / p_max as f32;
        env.progress.store(frac.to_bits(), Ordering::Relaxed);

        for index in begin..end {
            let entry_idx = env.edge_list.get(index).load(Ordering::Relaxed) as usize;
            let parent = env.poset_list.get(entry_idx);
            if !parent.marked() || parent.status() != Status::Unfinished {
                continue;
            }
            explore_parent(env, &mut calc, parent, &mut comparisons, &mut local_edges);
        }
    }

    Stats::accumulate();
}

fn explore_parent(
    env: &ExploreEnv,
    calc: &mut LinExtCalculator,
    parent: &AnnotatedPoset,
    comparisons: &mut Vec<ComparisonTuple>,
    local_edges: &mut Vec<u64>,
) {
    debug_assert_eq!(parent.status(), Status::Unfinished);

    comparisons.clear();
    local_edges.clear();

    let lin_ext =
        calc.count(parent.record(), parent.info(), env.parent_c, true, false, env.params);

    if lin_ext > env.limit * 2 {
        // information-theoretically impossible within the budget
        Stats::inc(Counter::ParentOverLimit);
        parent.set_unsortable();
        return;
    }

    enumerate_comparisons(env, calc, parent, comparisons);

    let mut unsortable = true;
    for i in 0..comparisons.len() {
        let comparison = comparisons[i];
        match explore_comparison(env, parent, comparison, local_edges) {
            ComparisonStatus::Sortable => {
                parent.set_sortable();
                return;
            }
            ComparisonStatus::Indeterminate => unsortable = false,
            ComparisonStatus::Unsortable => {}
        }
    }

    if unsortable {
        parent.set_unsortable();
        return;
    }

    let el_size = local_edges.len();
    let header = std::iter::once(AtomicU64::new(el_size as u64));
    let entries = local_edges.iter().map(|&v| AtomicU64::new(v));
    let index = env.edge_list.insert_all(header.chain(entries), el_size + 1);
    debug_assert!(index >= env.el_begin);
    parent.set_edge_index(index as u64);
    Stats::add(AvMax::EdgeListPhase1, (el_size / 2) as u64);
}

/// Feasible comparisons under the tail-layout invariants.
///
/// With two pairs only the six pair-vertex comparisons remain; with one
/// pair, the pair against singletons and body; with none, all body pairs
/// plus the leading singleton pair.
fn enumerate_comparisons(
    env: &ExploreEnv,
    calc: &LinExtCalculator,
    parent: &AnnotatedPoset,
    out: &mut Vec<ComparisonTuple>,
) {
    let n = env.params.n_usize();
    let info = parent.info();
    let num_singletons = info.singletons();
    let num_pairs = info.pairs();

    let mut add = |j: usize, k: usize, singleton: bool| {
        add_comparison_if_feasible(env, calc, j, k, singleton, out);
    };

    if num_pairs == 2 {
        let start = info.first_in_pair(n);
        debug_assert_eq!(info.first_singleton(n) - start, 4);
        add(start, start + 1, false);
        add(start, start + 2, false);
        add(start, start + 3, false);
        add(start + 1, start + 2, false);
        add(start + 1, start + 3, false);
        add(start + 2, start + 3, false);
        return;
    }
    debug_assert!(num_pairs <= 1);

    if num_singletons >= 2 {
        add(info.first_singleton(n), info.first_singleton(n) + 1, true);
    }
    if num_pairs == 1 {
        if num_singletons >= 1 {
            add(info.first_in_pair(n), info.first_singleton(n), false);
            add(info.first_in_pair(n) + 1, info.first_singleton(n), false);
        }
        for j in 0..info.first_in_pair(n) {
            add(j, info.first_in_pair(n), false);
            add(j, info.first_in_pair(n) + 1, false);
        }
    } else {
        let end_node = (n - num_singletons as usize + 1).min(n);
        for j in 0..end_node.saturating_sub(1) {
            for k in j + 1..end_node {
                add(j, k, false);
            }
        }
    }
}

fn add_comparison_if_feasible(
    env: &ExploreEnv,
    calc: &LinExtCalculator,
    j: usize,
    k: usize,
    singleton: bool,
    out: &mut Vec<ComparisonTuple>,
) {
    let p1 = calc.pair(j, k);
    let p2 = calc.pair(k, j);
    debug_assert!(env.parent_c == 0 || p1 <= 2 * env.limit);
    debug_assert!(env.parent_c == 0 || p2 <= 2 * env.limit);

    if p1 == 0 || p2 == 0 {
        // already related
        return;
    }
    if p1 > env.limit || p2 > env.limit {
        // one outcome cannot be sorted within the remaining budget
        return;
    }

    // canonical side assignment: the larger outcome first
    let (k1, k2, lin1, lin2) =
        if p1 >= p2 { (j, k, p1, p2) } else { (k, j, p2, p1) };
    if singleton {
        debug_assert!(lin1 == lin2 && k2 == k1 + 1);
    }
    out.push(ComparisonTuple { k1, k2, lin1, lin2, singleton });
}

fn explore_comparison(
    env: &ExploreEnv,
    parent: &AnnotatedPoset,
    comparison: ComparisonTuple,
    local_edges: &mut Vec<u64>,
) -> ComparisonStatus {
    let c_left = env.params.remaining_for_child(env.parent_c);
    let mut first_sortable = is_easily_sortable_lin_ext(c_left, comparison.lin1);
    let mut second_sortable = is_easily_sortable_lin_ext(c_left, comparison.lin2);
    if first_sortable && second_sortable {
        return ComparisonStatus::Sortable;
    }

    let mut first_child: Option<AnnotatedPoset> = None;
    if !first_sortable {
        let expanded = ExpandedChild::from_parent(
            parent.record(),
            parent.info(),
            comparison.lin1,
            comparison.k1,
            comparison.k2,
            env.params,
        );
        first_sortable = expanded.is_easily_sortable_unrelated_pairs(c_left, env.params);

        if comparison.singleton || is_easily_sortable_lin_ext(c_left, comparison.lin2) {
            // the sibling needs no exploration: either the outcomes are
            // isomorphic (singleton comparison) or it is easily sortable
            if first_sortable {
                return ComparisonStatus::Sortable;
            }
            let child = expanded.into_annotated(env.params);
            let status = check_child(env, &child, comparison.lin1);
            if status != ComparisonStatus::Indeterminate {
                return status;
            }
            create_child_entry_single(env, &child, local_edges);
            return ComparisonStatus::Indeterminate;
        }

        if first_sortable && second_sortable {
            return ComparisonStatus::Sortable;
        }

        if !first_sortable {
            let child = expanded.into_annotated(env.params);
            match check_child(env, &child, comparison.lin1) {
                ComparisonStatus::Unsortable => return ComparisonStatus::Unsortable,
                ComparisonStatus::Sortable => first_sortable = true,
                ComparisonStatus::Indeterminate => {}
            }
            first_child = Some(child);
        }

        if first_sortable && second_sortable {
            return ComparisonStatus::Sortable;
        }
    }

    let mut second_child: Option<AnnotatedPoset> = None;
    if !second_sortable {
        let expanded = ExpandedChild::from_parent(
            parent.record(),
            parent.info(),
            comparison.lin2,
            comparison.k2,
            comparison.k1,
            env.params,
        );
        second_sortable = expanded.is_easily_sortable_unrelated_pairs(c_left, env.params);

        if first_sortable && second_sortable {
            return ComparisonStatus::Sortable;
        }

        if !second_sortable {
            let child = expanded.into_annotated(env.params);
            match check_child(env, &child, comparison.lin2) {
                ComparisonStatus::Unsortable => return ComparisonStatus::Unsortable,
                ComparisonStatus::Sortable => second_sortable = true,
                ComparisonStatus::Indeterminate => {}
            }
            second_child = Some(child);
        }
    }

    match (first_sortable, second_sortable) {
        (false, false) => {
            let first = first_child.expect("unresolved first child was constructed");
            let second = second_child.expect("unresolved second child was constructed");
            create_child_entry_pair(env, &first, &second, local_edges);
        }
        (false, true) => {
            let first = first_child.expect("unresolved first child was constructed");
            create_child_entry_single(env, &first, local_edges);
        }
        (true, false) => {
            let second = second_child.expect("unresolved second child was constructed");
            create_child_entry_single(env, &second, local_edges);
        }
        (true, true) => return ComparisonStatus::Sortable,
    }
    ComparisonStatus::Indeterminate
}

/// Classifies a child against the backward frontier and the old-gen
/// cache. Above the completeness threshold the backward map is
/// authoritative: absence means unsortable.
fn check_child(
    env: &ExploreEnv,
    child: &AnnotatedPoset,
    lin_ext: LinExt,
) -> ComparisonStatus {
    if lin_ext >= env.child_complete_above {
        Stats::inc(Counter::BwMapFind);
        match env.child_map_bw.find(child) {
            None => return ComparisonStatus::Unsortable,
            Some(Status::No) => {
                Stats::inc(Counter::BwMapFindNo);
                return ComparisonStatus::Unsortable;
            }
            Some(Status::Yes) => {
                Stats::inc(Counter::BwMapFindYes);
                return ComparisonStatus::Sortable;
            }
            Some(Status::Unfinished) => {
                Stats::inc(Counter::BwMapFindUnf);
            }
        }
    }
    match oldgen_find(env.child_map_old, child) {
        Some(Status::No) => ComparisonStatus::Unsortable,
        Some(Status::Yes) => ComparisonStatus::Sortable,
        // a provisionally parked parent; not a settled answer
        Some(Status::Unfinished) | None => ComparisonStatus::Indeterminate,
    }
}

fn create_child_entry_single(
    env: &ExploreEnv,
    child: &AnnotatedPoset,
    local_edges: &mut Vec<u64>,
) {
    Stats::inc(Counter::CompOneChild);
    let id = env.child_map.find_and_insert(env.poset_list, child);
    local_edges.push(id);
    local_edges.push(id);
}

fn create_child_entry_pair(
    env: &ExploreEnv,
    first: &AnnotatedPoset,
    second: &AnnotatedPoset,
    local_edges: &mut Vec<u64>,
) {
    Stats::inc(Counter::CompTwoChildren);
    let id_first = env.child_map.find_and_insert(env.poset_list, first);
    let id_second = env.child_map.find_and_insert(env.poset_list, second);
    local_edges.push(id_first);
    local_edges.push(id_second);
}
