//! Per-layer forward-search state.

/// Progress of one forward layer through the phase machine.
///
/// `poset_list_*` bound the layer's records in the poset spill vector;
/// `parents_*` bound the (sorted) parent index region in the edge-list
/// spill vector; the `slice` window is the portion of the parents the
/// current descent is working on (emission caps can force a layer to
/// advance in slices); `el_begin` marks where this layer's OR/AND edge
/// entries start.
#[derive(Debug, Clone, Copy)]
pub struct LayerState {
    pub poset_list_begin: usize,
    pub poset_list_end: usize,
    pub parents_begin: usize,
    pub parents_end: usize,
    pub parents_slice_begin: usize,
    pub parents_slice_end: usize,
    pub el_begin: usize,
    /// 0 = collect, 1 = explore, 2 = resolve, 3 = drain.
    pub phase: u8,
}

impl Default for LayerState {
    fn default() -> Self {
        Self {
            poset_list_begin: 0,
            poset_list_end: 0,
            parents_begin: 0,
            parents_end: 0,
            parents_slice_begin: 0,
            parents_slice_end: 0,
            el_begin: 0,
            phase: 1,
        }
    }
}
