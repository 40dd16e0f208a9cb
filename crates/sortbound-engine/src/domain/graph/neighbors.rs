//! Explicit in/out neighbour lists, the iteration-friendly view of a
//! matrix used by id refinement and the reduction step.

use sortbound_core::MAX_N;

use super::vertex::VertexList;

#[derive(Debug, Clone)]
pub struct NeighborLists {
    n: usize,
    out_lists: [VertexList; MAX_N],
    in_lists: [VertexList; MAX_N],
}

impl NeighborLists {
    pub fn new(n: usize) -> Self {
        debug_assert!(n <= MAX_N);
        Self {
            n,
            out_lists: [VertexList::new(); MAX_N],
            in_lists: [VertexList::new(); MAX_N],
        }
    }

    pub fn reset(&mut self, n: usize) {
        self.n = n;
        for i in 0..n {
            self.out_lists[i].clear();
            self.in_lists[i].clear();
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn add_edge(&mut self, source: usize, target: usize) {
        self.out_lists[source].push(target);
        self.in_lists[target].push(source);
    }

    #[inline]
    pub fn out(&self, v: usize) -> &[usize] {
        self.out_lists[v].as_slice()
    }

    #[inline]
    pub fn inn(&self, v: usize) -> &[usize] {
        self.in_lists[v].as_slice()
    }

    #[inline]
    pub fn out_degree(&self, v: usize) -> usize {
        self.out_lists[v].len()
    }

    #[inline]
    pub fn in_degree(&self, v: usize) -> usize {
        self.in_lists[v].len()
    }

    /// Swaps the edge direction view.
    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.out_lists, &mut self.in_lists);
    }

    /// Total number of related (comparable) vertex pairs; meaningful when
    /// the lists were built from a transitive closure.
    pub fn related_pairs(&self) -> usize {
        (0..self.n).map(|v| self.out_degree(v)).sum()
    }
}
