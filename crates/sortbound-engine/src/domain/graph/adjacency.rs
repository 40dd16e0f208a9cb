//! Packed adjacency matrix with word-parallel transitive operations.

use sortbound_core::{BitRow, MAX_N};

use super::neighbors::NeighborLists;
use super::vertex::{LayerStructure, VertexList};

/// DAG adjacency on up to `MAX_N` vertices, one bit-row per source vertex.
///
/// Row `i`, bit `k` set means an edge `i → k`. Every matrix the engine
/// builds is acyclic; the operations below preserve that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjacencyMatrix {
    n: usize,
    rows: [BitRow; MAX_N],
}

impl AdjacencyMatrix {
    pub fn new(n: usize) -> Self {
        debug_assert!(n <= MAX_N);
        Self { n, rows: [0; MAX_N] }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, source: usize, target: usize) -> bool {
        (self.rows[source] & (1 << target)) != 0
    }

    #[inline]
    pub fn set(&mut self, source: usize, target: usize) {
        self.rows[source] |= 1 << target;
    }

    #[inline]
    pub fn set_to_or(&mut self, source: usize, target: usize, val: bool) {
        self.rows[source] |= (val as BitRow) << target;
    }

    #[inline]
    pub fn delete_edge(&mut self, source: usize, target: usize) {
        self.rows[source] &= !(1 << target);
    }

    #[inline]
    pub fn out_row(&self, source: usize) -> BitRow {
        self.rows[source]
    }

    pub fn edge_count(&self) -> usize {
        self.rows[..self.n].iter().map(|r| r.count_ones() as usize).sum()
    }

    /// Flips every edge: `i → k` becomes `k → i`.
    pub fn reverse(&mut self) {
        let mut new_rows = [0 as BitRow; MAX_N];
        for (i, row) in new_rows.iter_mut().enumerate().take(self.n) {
            for j in (0..self.n).rev() {
                *row <<= 1;
                *row |= (self.rows[j] >> i) & 1;
            }
        }
        self.rows = new_rows;
    }

    /// Relabels vertices so new vertex `i` is old `permutation[i]`.
    ///
    /// A partial permutation is extended with the identity.
    pub fn reorder(&mut self, permutation: &mut VertexList) {
        debug_assert!(permutation.len() <= self.n);
        if permutation.len() < self.n {
            permutation.extend_identity(self.n);
        }
        let mut new_rows = [0 as BitRow; MAX_N];
        for (i, row) in new_rows.iter_mut().enumerate().take(self.n) {
            for j in (0..self.n).rev() {
                *row <<= 1;
                *row |= (self.rows[permutation[i]] >> permutation[j]) & 1;
            }
        }
        self.rows = new_rows;
    }

    /// Warshall closure with bitwise row OR: after this, `get(i, k)` holds
    /// iff `k` is reachable from `i`.
    pub fn transitive_closure(&mut self) {
        for k in 0..self.n {
            for i in 0..self.n {
                let source_mask = (((self.rows[i] >> k) & 1) as i32).wrapping_neg() as BitRow;
                self.rows[i] |= source_mask & self.rows[k];
            }
        }
    }

    /// Transitive reduction localized at a freshly added edge
    /// `new_source → new_target`.
    ///
    /// Clears every edge the closure already predicts: predecessors of the
    /// source into the target, the source into successors of the target,
    /// and every predecessor-to-successor edge across the new edge.
    /// `closure` must be the neighbour lists of the transitive closure.
    pub fn trans_reduction(
        &mut self,
        new_source: usize,
        new_target: usize,
        closure: &NeighborLists,
    ) {
        for &succ in closure.out(new_target) {
            self.delete_edge(new_source, succ);
        }
        for &pred in closure.inn(new_source) {
            self.delete_edge(pred, new_target);
        }
        for &succ in closure.out(new_target) {
            for &pred in closure.inn(new_source) {
                self.delete_edge(pred, succ);
            }
        }
    }

    /// Peels the matrix into layers of vertices whose row is empty within
    /// the remaining set, restricted to the first `reduced_n` vertices.
    ///
    /// Applied to a reversed closure this yields source layers; applied to
    /// the closure itself, sink layers.
    pub fn peel_layers(&self, reduced_n: usize) -> LayerStructure {
        debug_assert!(reduced_n <= self.n);
        let mut result = LayerStructure::new();
        let mut available: BitRow = if reduced_n >= BitRow::BITS as usize {
            BitRow::MAX
        } else {
            (1 << reduced_n) - 1
        };
        while available != 0 {
            let mut layer_mask: BitRow = 0;
            let mut j_mask: BitRow = 1;
            for j in 0..reduced_n {
                let flag = (available & (self.rows[j] | j_mask)) == j_mask;
                result.layers[result.num_layers].push_if(j, flag);
                layer_mask |= if flag { j_mask } else { 0 };
                j_mask <<= 1;
            }
            available &= !layer_mask;
            result.num_layers += 1;
        }
        result
    }

    /// Expands the rows into explicit in/out neighbour lists.
    pub fn write_neighbors(&self, graph: &mut NeighborLists) {
        graph.reset(self.n);
        for j in 0..self.n {
            let mut out = self.rows[j];
            let mut k = 0usize;
            while out != 0 {
                if out & 1 != 0 {
                    graph.add_edge(j, k);
                }
                k += 1;
                out >>= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> AdjacencyMatrix {
        let mut m = AdjacencyMatrix::new(n);
        for i in 0..n - 1 {
            m.set(i, i + 1);
        }
        m
    }

    #[test]
    fn closure_of_chain_is_total_order() {
        let mut m = chain(4);
        m.transitive_closure();
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(m.get(i, j), i < j, "({i},{j})");
            }
        }
    }

    #[test]
    fn reduction_removes_predicted_edges() {
        // 0 → 1 already present; adding 1 → 2 makes 0 → 2 redundant.
        let mut m = AdjacencyMatrix::new(3);
        m.set(0, 1);
        m.set(0, 2);
        m.set(1, 2);

        let mut closure = m;
        closure.transitive_closure();
        let mut lists = NeighborLists::new(3);
        closure.write_neighbors(&mut lists);

        m.trans_reduction(1, 2, &lists);
        assert!(m.get(0, 1));
        assert!(m.get(1, 2));
        assert!(!m.get(0, 2));
    }

    #[test]
    fn reverse_is_involution() {
        let mut m = chain(5);
        m.set(0, 3);
        let original = m;
        m.reverse();
        assert!(m.get(1, 0));
        assert!(m.get(3, 0));
        m.reverse();
        assert_eq!(m, original);
    }

    #[test]
    fn reorder_applies_permutation() {
        let mut m = AdjacencyMatrix::new(3);
        m.set(0, 2);
        let mut perm = VertexList::new();
        for v in [2, 0, 1] {
            perm.push(v);
        }
        // new i = old perm[i]: new 1 = old 0, new 0 = old 2
        m.reorder(&mut perm);
        assert!(m.get(1, 0));
        assert_eq!(m.edge_count(), 1);
    }

    #[test]
    fn peel_layers_of_reversed_chain_gives_topological_layers() {
        let mut m = chain(3);
        m.transitive_closure();
        m.reverse();
        // reversed rows are in-edge sets, so peeling finds sources first
        let layers = m.peel_layers(3);
        assert_eq!(layers.num_layers, 3);
        assert_eq!(layers.layers[0].as_slice(), &[0]);
        assert_eq!(layers.layers[1].as_slice(), &[1]);
        assert_eq!(layers.layers[2].as_slice(), &[2]);
    }

    #[test]
    fn peel_layers_of_antichain_is_single_layer() {
        let m = AdjacencyMatrix::new(4);
        let layers = m.peel_layers(4);
        assert_eq!(layers.num_layers, 1);
        assert_eq!(layers.layers[0].as_slice(), &[0, 1, 2, 3]);
    }
}
