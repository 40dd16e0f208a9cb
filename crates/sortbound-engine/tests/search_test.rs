//! End-to-end verdicts on known sorting bounds.
//!
//! The small cases are classical: S(3) = 3, S(4) = 5, S(5) = 7 (so five
//! elements are *not* sortable in six comparisons). Larger cases are
//! ignored by default; run them with `--ignored` on a release build.

use std::sync::Arc;

use sortbound_core::RunParams;
use sortbound_engine::infrastructure::runlog::RunLog;
use sortbound_engine::{Search, SearchConfig, Verdict};

fn run_search(n: u32, c: u32, forward: bool, backward: bool, full_layers: u32) -> Verdict {
    let dir = tempfile::tempdir().unwrap();
    let params = RunParams::new(n, c, 2).unwrap();
    let config = SearchConfig {
        forward,
        backward,
        reuse_bw: false,
        full_layers,
        bw_dir: dir.path().join("storageBw"),
        scratch_fast: dir.path().join("fast.bin"),
        scratch_medium: dir.path().join("slow.bin"),
        active_poset_mem: 64 << 20,
        old_gen_mem: 16 << 20,
        ..SearchConfig::default()
    };
    let mut search = Search::new(params, config, Arc::new(RunLog::disabled()));
    search.run().unwrap()
}

fn bidirectional(n: u32, c: u32) -> Verdict {
    run_search(n, c, true, true, 10)
}

#[test]
fn one_element_needs_no_comparisons() {
    assert_eq!(run_search(1, 0, true, false, 10), Verdict::Sortable);
}

#[test]
fn two_elements_one_comparison() {
    assert_eq!(bidirectional(2, 1), Verdict::Sortable);
}

#[test]
fn two_elements_zero_comparisons() {
    assert_eq!(bidirectional(2, 0), Verdict::NotSortable);
}

#[test]
fn three_elements_three_comparisons() {
    assert_eq!(bidirectional(3, 3), Verdict::Sortable);
}

#[test]
fn four_elements_five_comparisons() {
    assert_eq!(bidirectional(4, 5), Verdict::Sortable);
}

#[test]
fn five_elements_six_comparisons_insufficient() {
    assert_eq!(bidirectional(5, 6), Verdict::NotSortable);
}

#[test]
fn five_elements_seven_comparisons() {
    assert_eq!(bidirectional(5, 7), Verdict::Sortable);
}

#[test]
fn forward_only_agrees_on_small_cases() {
    assert_eq!(run_search(4, 5, true, false, 10), Verdict::Sortable);
    assert_eq!(run_search(5, 6, true, false, 10), Verdict::NotSortable);
    assert_eq!(run_search(5, 7, true, false, 10), Verdict::Sortable);
}

#[test]
fn backward_only_agrees_on_small_cases() {
    // exhaustive backward layers decide on their own
    assert_eq!(run_search(4, 5, false, true, 6), Verdict::Sortable);
    assert_eq!(run_search(5, 6, false, true, 7), Verdict::NotSortable);
    assert_eq!(run_search(5, 7, false, true, 8), Verdict::Sortable);
}

#[test]
#[ignore = "minutes-long; run on a release build"]
fn seven_elements_thirteen_comparisons() {
    // the information-theoretically tight case
    assert_eq!(bidirectional(7, 13), Verdict::Sortable);
}

#[test]
#[ignore = "hours-long; run on a release build"]
fn twelve_elements_thirty_comparisons_insufficient() {
    assert_eq!(bidirectional(12, 30), Verdict::NotSortable);
}
