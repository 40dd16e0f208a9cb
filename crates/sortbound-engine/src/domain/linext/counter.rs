//! Downset dynamic programming over the poset lattice.
//!
//! `down(D)`, the number of linear extensions of the sub-poset induced by
//! downset `D`, is accumulated by enumerating downsets in order of their maximum
//! vertex; each downset locates its sub-downsets through per-vertex read
//! cursors that only ever move forward, so the whole sweep is linear in
//! (#downsets · n). A backward sweep then fills `up(D)` and the pairwise
//! table `t[i][j]` = extensions with `i` before `j`.
//!
//! Two value widths run the same algorithm: a `u32` narrow path (with an
//! optional overflow guard that aborts into the wide re-run) and the
//! exact [`LinExt`] wide path. The dispatch heuristics mirror the
//! remaining-budget bound `e(P) ≤ 2^{C−c}` on the posets the searches
//! actually feed in.

use sortbound_core::{falling_factorial, AvMax, BitRow, Counter, LinExt, RunParams, Stats, MAX_N};

use crate::domain::poset::{PosetInfo, PosetRecord};

/// Value type the DP runs on; arithmetic wraps because the narrow path
/// detects overflow by bound-checking, not per-operation.
trait CountValue: Copy + Default + PartialOrd {
    fn one() -> Self;
    fn wadd(self, other: Self) -> Self;
    fn wmul(self, other: Self) -> Self;
    fn to_lin_ext(self) -> LinExt;
}

impl CountValue for u32 {
    #[inline]
    fn one() -> Self {
        1
    }
    #[inline]
    fn wadd(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    #[inline]
    fn wmul(self, other: Self) -> Self {
        self.wrapping_mul(other)
    }
    #[inline]
    fn to_lin_ext(self) -> LinExt {
        self as LinExt
    }
}

impl CountValue for LinExt {
    #[inline]
    fn one() -> Self {
        1
    }
    #[inline]
    fn wadd(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    #[inline]
    fn wmul(self, other: Self) -> Self {
        self.wrapping_mul(other)
    }
    #[inline]
    fn to_lin_ext(self) -> LinExt {
        self
    }
}

#[derive(Clone, Copy, Default)]
struct DownsetItem<V> {
    set: BitRow,
    down: V,
    up: V,
}

/// Worker-local calculator: owns the downset buffers and the pairwise
/// tables, reused across posets.
pub struct LinExtCalculator {
    table: Box<[[LinExt; MAX_N]; MAX_N]>,
    table32: Box<[[u32; MAX_N]; MAX_N]>,
    items_wide: Vec<DownsetItem<LinExt>>,
    items_narrow: Vec<DownsetItem<u32>>,
    c_total: u32,
}

impl LinExtCalculator {
    pub fn new(n: u32, c_total: u32) -> Self {
        // empirical bound on the number of downsets the searches produce
        let capacity = (1.74f64).powi(n as i32 + 4).ceil() as usize;
        Self {
            table: Box::new([[0; MAX_N]; MAX_N]),
            table32: Box::new([[0; MAX_N]; MAX_N]),
            items_wide: vec![DownsetItem::default(); capacity],
            items_narrow: vec![DownsetItem::default(); capacity],
            c_total,
        }
    }

    /// Extensions with vertex `i` before vertex `j`, from the last
    /// table-filling call.
    #[inline]
    pub fn pair(&self, i: usize, j: usize) -> LinExt {
        self.table[i][j]
    }

    /// Counts `e(P)` for a canonical record, reducing singleton tails
    /// first, choosing value width by the remaining budget, and filling
    /// the pairwise table on request.
    pub fn count(
        &mut self,
        record: &PosetRecord,
        info: PosetInfo,
        c: u32,
        fill_table: bool,
        overflow_check: bool,
        params: RunParams,
    ) -> LinExt {
        let n = params.n_usize();

        if info.singletons() <= 1 {
            let budget = self.c_total - c;
            let e_p = if overflow_check && budget < 27 {
                Stats::inc(Counter::LinExtNarrow);
                match self.run_narrow(record, n, fill_table, true) {
                    Some(e_p) => {
                        if fill_table {
                            self.widen_table(e_p, n);
                        }
                        e_p
                    }
                    None => {
                        Stats::inc(Counter::LinExtWide);
                        Stats::inc(Counter::OverflowRecovered);
                        let e_p = self.run_wide(record, n, fill_table);
                        if fill_table {
                            self.fill_lower_triangle(e_p, n);
                        }
                        e_p
                    }
                }
            } else if !overflow_check && budget < 32 {
                Stats::inc(Counter::LinExtNarrow);
                let e_p = self
                    .run_narrow(record, n, fill_table, false)
                    .expect("unguarded narrow path cannot abort");
                if fill_table {
                    self.widen_table(e_p, n);
                }
                e_p
            } else {
                Stats::inc(Counter::LinExtWide);
                let e_p = self.run_wide(record, n, fill_table);
                if fill_table {
                    self.fill_lower_triangle(e_p, n);
                }
                e_p
            };
            return e_p;
        }

        // singleton reduction: keep one representative singleton, scale by
        // the falling factorial, then patch the table pattern
        let reduced_n = n - info.singletons() as usize + 1;
        Stats::inc(Counter::LinExtReduced);
        let mut e_p = self.run_wide(record, reduced_n, fill_table);
        if fill_table {
            self.fill_lower_triangle(e_p, reduced_n);
        }

        let fac = falling_factorial(n as u32, reduced_n as u32);
        e_p *= fac;
        if !fill_table {
            return e_p;
        }

        for i in 0..reduced_n {
            for j in 0..reduced_n {
                self.table[i][j] *= fac;
            }
        }

        let k = info.singletons() as usize;
        let last = reduced_n - 1;
        for i in 0..n {
            for j in 0..n {
                if i <= n - k && j <= n - k {
                    continue;
                } else if i < n - k && j > n - k {
                    self.table[i][j] = self.table[i][last];
                } else if i > n - k && j < n - k {
                    self.table[i][j] = self.table[last][j];
                } else if i != j {
                    self.table[i][j] = e_p / 2;
                } else {
                    self.table[i][j] = 0;
                }
            }
        }
        e_p
    }

    fn run_wide(&mut self, record: &PosetRecord, n: usize, fill_table: bool) -> LinExt {
        run_dp::<LinExt>(&mut self.items_wide, &mut self.table, record, n, fill_table, false)
            .expect("wide path cannot overflow")
    }

    fn run_narrow(
        &mut self,
        record: &PosetRecord,
        n: usize,
        fill_table: bool,
        guard: bool,
    ) -> Option<LinExt> {
        run_dp::<u32>(&mut self.items_narrow, &mut self.table32, record, n, fill_table, guard)
    }

    /// Copies the narrow upper triangle into the wide table and derives
    /// the lower one.
    fn widen_table(&mut self, e_p: LinExt, n: usize) {
        for i in 1..n {
            for j in 0..i {
                self.table[j][i] = self.table32[j][i] as LinExt;
                self.table[i][j] = e_p - self.table[j][i];
            }
        }
    }

    fn fill_lower_triangle(&mut self, e_p: LinExt, n: usize) {
        for i in 1..n {
            for j in 0..i {
                self.table[i][j] = e_p - self.table[j][i];
            }
        }
    }
}

/// One DP sweep. Returns `None` only when the guard detects imminent
/// overflow on the narrow path.
fn run_dp<V: CountValue>(
    items: &mut [DownsetItem<V>],
    table: &mut [[V; MAX_N]; MAX_N],
    record: &PosetRecord,
    n: usize,
    fill_table: bool,
    guard: bool,
) -> Option<LinExt> {
    let capacity = items.len();
    for row in table.iter_mut() {
        for cell in row.iter_mut() {
            *cell = V::default();
        }
    }

    let mut in_mask = [0 as BitRow; MAX_N];
    let mut out_mask = [0 as BitRow; MAX_N];
    for i in 0..n {
        for j in (0..n).rev() {
            in_mask[i] <<= 1;
            in_mask[i] |= record.is_edge(j, i) as BitRow;
        }
        for j in (0..n).rev() {
            out_mask[i] <<= 1;
            out_mask[i] |= record.is_edge(i, j) as BitRow;
        }
    }

    let full: BitRow = (1 << n) - 1;

    items[0] = DownsetItem { set: 0, down: V::one(), up: V::default() };
    let mut read_cursor = [0usize; MAX_N];
    let mut last_end = 1usize;
    let mut write_index = 1usize;
    let guard_limit = u32::MAX / MAX_N as u32;

    let mut end_mask: BitRow = 1;
    for end_node in 0..n {
        assert!(last_end < capacity / 2, "downset buffer too small ({last_end} of {capacity})");

        if guard {
            // the largest count so far sits on the last downset of the
            // previous round; past this bound the next sums may wrap
            if items[last_end - 1].down.to_lin_ext() > guard_limit as LinExt {
                return None;
            }
        }

        for j in 0..last_end {
            let parent_set = items[j].set;
            if parent_set | in_mask[end_node] != parent_set {
                continue;
            }
            let cur_set = parent_set | end_mask;
            items[write_index].set = cur_set;
            items[write_index].down = items[j].down;

            // add counts of every sub-downset reached by removing a
            // maximal vertex other than end_node
            let mut i = cur_set.trailing_zeros() as usize;
            let mut shift = cur_set >> (i + 1);
            while shift != 0 {
                let pre_set = cur_set & !(1 << i);
                if pre_set & out_mask[i] == 0 {
                    let mut read = read_cursor[i];
                    while items[read].set < pre_set {
                        read += 1;
                    }
                    let add = items[read].down;
                    items[write_index].down = items[write_index].down.wadd(add);
                    read_cursor[i] = read + 1;
                }
                let step = shift.trailing_zeros() as usize + 1;
                shift >>= step;
                i += step;
            }
            write_index += 1;
        }
        last_end = write_index;
        for cursor in read_cursor.iter_mut().take(end_node + 1) {
            *cursor = last_end - 1;
        }
        end_mask <<= 1;
    }

    let num_sets = last_end;
    let last_set = num_sets - 1;
    debug_assert_eq!(items[last_set].set, full);
    Stats::add(AvMax::DownSets, num_sets as u64);

    let e_p = items[last_set].down.to_lin_ext();
    if !fill_table {
        return Some(e_p);
    }

    for cursor in read_cursor.iter_mut().take(n) {
        *cursor = last_set;
    }
    items[last_set].up = V::one();

    for write in (0..last_set).rev() {
        let cur_set = items[write].set;
        items[write].up = V::default();

        let mut remaining = !cur_set & full;
        let mut i = 0usize;
        let mut first = true;
        while remaining != 0 {
            let step = remaining.trailing_zeros() as usize;
            remaining >>= step + 1;
            i = if first { step } else { i + step + 1 };
            first = false;

            let pre_set = cur_set | (1 << i);
            if cur_set | in_mask[i] != cur_set {
                continue;
            }
            // pre_set is a downset; find it below the cursor
            let mut read = read_cursor[i];
            while items[read].set > pre_set {
                read -= 1;
            }
            debug_assert_eq!(items[read].set, pre_set);
            let up_pre = items[read].up;
            items[write].up = items[write].up.wadd(up_pre);
            read_cursor[i] = read.saturating_sub(1);

            let product = items[write].down.wmul(up_pre);
            let mut k_bits = !(pre_set >> (i + 1));
            for k in i + 1..n {
                if k_bits & 1 != 0 {
                    table[i][k] = table[i][k].wadd(product);
                }
                k_bits >>= 1;
            }
        }
    }

    Some(e_p)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Brute-force count of topological orderings, with optional
    /// pairwise tracking.
    fn brute_force(record: &PosetRecord, n: usize) -> (LinExt, Vec<Vec<LinExt>>) {
        let mut total = 0;
        let mut pairwise = vec![vec![0; n]; n];
        let mut order = Vec::new();
        let mut used = vec![false; n];
        fn recurse(
            record: &PosetRecord,
            n: usize,
            order: &mut Vec<usize>,
            used: &mut [bool],
            total: &mut LinExt,
            pairwise: &mut [Vec<LinExt>],
        ) {
            if order.len() == n {
                *total += 1;
                for a in 0..n {
                    for b in 0..n {
                        let pa = order.iter().position(|&v| v == a).unwrap();
                        let pb = order.iter().position(|&v| v == b).unwrap();
                        if pa < pb {
                            pairwise[a][b] += 1;
                        }
                    }
                }
                return;
            }
            for v in 0..n {
                if used[v] {
                    continue;
                }
                // all predecessors placed?
                let ready = (0..n).all(|u| !record.is_edge(u, v) || used[u]);
                if ready {
                    used[v] = true;
                    order.push(v);
                    recurse(record, n, order, used, total, pairwise);
                    order.pop();
                    used[v] = false;
                }
            }
        }
        recurse(record, n, &mut order, &mut used, &mut total, &mut pairwise);
        (total, pairwise)
    }

    fn check_against_brute_force(record: &PosetRecord, n: usize) {
        let params = RunParams::new(n as u32, 7, 1).unwrap();
        let mut calc = LinExtCalculator::new(n as u32, 7);
        let info = PosetInfo::new(0, 0);
        let e_p = calc.count(record, info, 0, true, false, params);
        let (expected, pairwise) = brute_force(record, n);
        assert_eq!(e_p, expected, "e(P) mismatch");
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                assert_eq!(calc.pair(i, j), pairwise[i][j], "t[{i}][{j}]");
            }
        }
    }

    #[test]
    fn antichain_counts_factorials() {
        for n in 1..=6usize {
            let record = PosetRecord::new();
            let params = RunParams::new(n as u32, 3, 1).unwrap();
            let mut calc = LinExtCalculator::new(n as u32, 3);
            // bypass the singleton reduction to exercise the raw DP
            let e_p = calc.count(&record, PosetInfo::new(0, 0), 0, false, false, params);
            assert_eq!(e_p, sortbound_core::factorial(n as u32));
        }
    }

    #[test]
    fn chain_has_one_extension() {
        let mut record = PosetRecord::new();
        for i in 0..4 {
            record.add_edge(i, i + 1);
        }
        check_against_brute_force(&record, 5);
    }

    #[test]
    fn assorted_small_posets_match_brute_force() {
        // diamond
        let mut diamond = PosetRecord::new();
        diamond.add_edge(0, 1);
        diamond.add_edge(0, 2);
        diamond.add_edge(1, 3);
        diamond.add_edge(2, 3);
        check_against_brute_force(&diamond, 4);

        // fence on 5, labelled along a topological order
        let mut fence = PosetRecord::new();
        fence.add_edge(0, 3);
        fence.add_edge(1, 3);
        fence.add_edge(1, 4);
        fence.add_edge(2, 4);
        check_against_brute_force(&fence, 5);

        // two chains and an isolated vertex
        let mut chains = PosetRecord::new();
        chains.add_edge(0, 1);
        chains.add_edge(0, 2);
        chains.add_edge(3, 4);
        check_against_brute_force(&chains, 6);

        // V plus extra relation
        let mut v = PosetRecord::new();
        v.add_edge(0, 2);
        v.add_edge(1, 2);
        v.add_edge(1, 3);
        check_against_brute_force(&v, 4);
    }

    #[test]
    fn pairwise_table_sums_to_total() {
        let mut record = PosetRecord::new();
        record.add_edge(0, 2);
        record.add_edge(1, 3);
        let n = 5;
        let params = RunParams::new(n as u32, 7, 1).unwrap();
        let mut calc = LinExtCalculator::new(n as u32, 7);
        let e_p = calc.count(&record, PosetInfo::new(0, 0), 0, true, false, params);
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                assert_eq!(calc.pair(i, j) + calc.pair(j, i), e_p, "({i},{j})");
            }
        }
        // related pair is fully ordered
        assert_eq!(calc.pair(0, 2), e_p);
        assert_eq!(calc.pair(2, 0), 0);
    }

    #[test]
    fn singleton_reduction_agrees_with_direct_count() {
        // body 0 → 1 plus three singletons
        let mut record = PosetRecord::new();
        record.add_edge(0, 1);
        let n = 5;
        let params = RunParams::new(n as u32, 7, 1).unwrap();

        let mut direct = LinExtCalculator::new(n as u32, 7);
        let e_direct = direct.count(&record, PosetInfo::new(0, 0), 0, true, false, params);

        let mut reduced = LinExtCalculator::new(n as u32, 7);
        let e_reduced =
            reduced.count(&record, PosetInfo::from_record(&record, n), 0, true, false, params);

        assert_eq!(e_direct, e_reduced);
        // body entries must agree
        assert_eq!(direct.pair(0, 1), reduced.pair(0, 1));
        assert_eq!(direct.pair(1, 0), reduced.pair(1, 0));
        // singleton-singleton entries follow the half-pattern
        assert_eq!(reduced.pair(3, 4), e_reduced / 2);
        assert_eq!(reduced.pair(4, 3), e_reduced / 2);
    }

    #[test]
    fn narrow_and_wide_paths_agree() {
        let mut record = PosetRecord::new();
        record.add_edge(0, 3);
        record.add_edge(1, 3);
        record.add_edge(2, 4);
        let n = 6;
        let params = RunParams::new(n as u32, 10, 1).unwrap();

        // a small remaining budget selects the guarded narrow path
        let mut narrow = LinExtCalculator::new(n as u32, 10);
        let e_narrow = narrow.count(&record, PosetInfo::new(0, 0), 5, true, true, params);

        // a budget of 40 comparisons forces the wide path
        let wide_params = RunParams::new(n as u32, 40, 1).unwrap();
        let mut wide = LinExtCalculator::new(n as u32, 40);
        let e_wide = wide.count(&record, PosetInfo::new(0, 0), 0, true, false, wide_params);

        assert_eq!(e_narrow, e_wide);
        for i in 0..n {
            for j in 0..n {
                assert_eq!(narrow.pair(i, j), wide.pair(i, j), "({i},{j})");
            }
        }
    }
}
