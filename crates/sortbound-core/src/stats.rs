//! Run-wide statistics.
//!
//! Workers bump plain thread-local counters; [`Stats::accumulate`] folds
//! them into the global aggregator under a single mutex. The merge happens
//! at batch boundaries, so the hot paths never touch shared state.
//!
//! Two counter families exist: plain event counts ([`Counter`]) and
//! avg/max samples ([`AvMax`]) that track count, sum, max and the number
//! of samples at or above a per-counter "large" threshold.

use std::cell::RefCell;

use parking_lot::Mutex;

/// Plain event counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Counter {
    Phase1,
    Phase2,
    Phase3,
    MarkFirst,
    MarkSecond,
    BwMapFind,
    BwMapFindNo,
    BwMapFindYes,
    BwMapFindUnf,
    OldGenFind,
    OldGenFindNo,
    OldGenFindYes,
    OldGenFindPending,
    CompOneChild,
    CompTwoChildren,
    ParentOverLimit,
    PredLimitEdgeCount,
    PrefixTest,
    PrefixDiff,
    EqualTest,
    FlagDiff,
    SingletonsDiff,
    PairsDiff,
    GraphBitsTest,
    GraphBitsEqual,
    Vf2Test,
    Vf2Positive,
    RevIsoTest,
    SelfDualCreated,
    LinExtNarrow,
    LinExtWide,
    LinExtReduced,
    OverflowRecovered,
    Canonicalize,
    Ambiguous,
    Unambiguous,
}

impl Counter {
    pub const COUNT: usize = Counter::Unambiguous as usize + 1;

    fn name(self) -> &'static str {
        match self {
            Counter::Phase1 => "#Phase1",
            Counter::Phase2 => "#Phase2",
            Counter::Phase3 => "#Phase3",
            Counter::MarkFirst => "#MarkFirst",
            Counter::MarkSecond => "#MarkSecond",
            Counter::BwMapFind => "#BwMapFind",
            Counter::BwMapFindNo => "#BwMapFindNo",
            Counter::BwMapFindYes => "#BwMapFindYes",
            Counter::BwMapFindUnf => "#BwMapFindUnf",
            Counter::OldGenFind => "#OldGenFind",
            Counter::OldGenFindNo => "#OldGenFindNo",
            Counter::OldGenFindYes => "#OldGenFindYes",
            Counter::OldGenFindPending => "#OldGenFindPend",
            Counter::CompOneChild => "#CompOneChild",
            Counter::CompTwoChildren => "#CompTwoChildren",
            Counter::ParentOverLimit => "#ParentOverLimit",
            Counter::PredLimitEdgeCount => "#PredLimitEdges",
            Counter::PrefixTest => "#PrefixTest",
            Counter::PrefixDiff => "#PrefixDiff",
            Counter::EqualTest => "#EqualTest",
            Counter::FlagDiff => "#FlagDiff",
            Counter::SingletonsDiff => "#SingletonsDiff",
            Counter::PairsDiff => "#PairsDiff",
            Counter::GraphBitsTest => "#GraphBitsTest",
            Counter::GraphBitsEqual => "#GraphBitsEq",
            Counter::Vf2Test => "#Vf2Test",
            Counter::Vf2Positive => "#Vf2Positive",
            Counter::RevIsoTest => "#RevIsoTest",
            Counter::SelfDualCreated => "#SelfDualCr",
            Counter::LinExtNarrow => "#LinExtNarrow",
            Counter::LinExtWide => "#LinExtWide",
            Counter::LinExtReduced => "#LinExtReduced",
            Counter::OverflowRecovered => "#OverflowRecov",
            Counter::Canonicalize => "#Canonicalize",
            Counter::Ambiguous => "#Ambiguous",
            Counter::Unambiguous => "#Unambiguous",
        }
    }
}

/// Avg/max sample counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum AvMax {
    DownSets,
    ProbeStepsPos,
    ProbeStepsNeg,
    AutosFound,
    CycleAutosFound,
    EdgeListPhase1,
    EdgeListPhase2,
    PotPredCount,
    PredCount,
}

impl AvMax {
    pub const COUNT: usize = AvMax::PredCount as usize + 1;

    fn name(self) -> &'static str {
        match self {
            AvMax::DownSets => "#DownSets",
            AvMax::ProbeStepsPos => "ProbePos#Steps",
            AvMax::ProbeStepsNeg => "ProbeNeg#Steps",
            AvMax::AutosFound => "#AutosFound",
            AvMax::CycleAutosFound => "#CycleAutos",
            AvMax::EdgeListPhase1 => "ELSizePhase1",
            AvMax::EdgeListPhase2 => "ELSizePhase2",
            AvMax::PotPredCount => "PotPredCount",
            AvMax::PredCount => "PredCount",
        }
    }

    /// Samples at or above this value count as "large".
    fn large_threshold(self) -> u64 {
        match self {
            AvMax::DownSets => 1000,
            AvMax::ProbeStepsPos => 5,
            AvMax::ProbeStepsNeg => 3,
            AvMax::AutosFound => 1,
            AvMax::CycleAutosFound => 1,
            AvMax::EdgeListPhase1 => 10,
            AvMax::EdgeListPhase2 => 10,
            AvMax::PotPredCount => 100,
            AvMax::PredCount => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AvMaxItem {
    num: u64,
    sum: u64,
    max: u64,
    num_large: u64,
}

impl AvMaxItem {
    fn fold(&mut self, other: &AvMaxItem) {
        self.num += other.num;
        self.sum += other.sum;
        self.max = self.max.max(other.max);
        self.num_large += other.num_large;
    }
}

#[derive(Debug)]
struct LocalStats {
    counts: [u64; Counter::COUNT],
    avmax: [AvMaxItem; AvMax::COUNT],
}

impl LocalStats {
    const fn new() -> Self {
        Self {
            counts: [0; Counter::COUNT],
            avmax: [AvMaxItem { num: 0, sum: 0, max: 0, num_large: 0 }; AvMax::COUNT],
        }
    }
}

#[derive(Debug)]
struct GlobalStats {
    total: [u64; Counter::COUNT],
    recent: [u64; Counter::COUNT],
    avmax_total: [AvMaxItem; AvMax::COUNT],
    avmax_recent: [AvMaxItem; AvMax::COUNT],
}

impl GlobalStats {
    const fn new() -> Self {
        Self {
            total: [0; Counter::COUNT],
            recent: [0; Counter::COUNT],
            avmax_total: [AvMaxItem { num: 0, sum: 0, max: 0, num_large: 0 }; AvMax::COUNT],
            avmax_recent: [AvMaxItem { num: 0, sum: 0, max: 0, num_large: 0 }; AvMax::COUNT],
        }
    }
}

static GLOBAL: Mutex<GlobalStats> = Mutex::new(GlobalStats::new());

thread_local! {
    static LOCAL: RefCell<LocalStats> = const { RefCell::new(LocalStats::new()) };
}

/// Facade over the thread-local and global counter stores.
pub struct Stats;

impl Stats {
    /// Bumps a plain counter on the current thread.
    #[inline]
    pub fn inc(counter: Counter) {
        LOCAL.with(|l| l.borrow_mut().counts[counter as usize] += 1);
    }

    /// Records one avg/max sample on the current thread.
    #[inline]
    pub fn add(counter: AvMax, value: u64) {
        LOCAL.with(|l| {
            let mut l = l.borrow_mut();
            let item = &mut l.avmax[counter as usize];
            item.num += 1;
            item.sum += value;
            item.max = item.max.max(value);
            if value >= counter.large_threshold() {
                item.num_large += 1;
            }
        });
    }

    /// Folds this thread's counters into the global aggregator and resets
    /// the thread-local store. Call at batch boundaries.
    pub fn accumulate() {
        LOCAL.with(|l| {
            let mut l = l.borrow_mut();
            let mut g = GLOBAL.lock();
            for i in 0..Counter::COUNT {
                g.total[i] += l.counts[i];
                g.recent[i] += l.counts[i];
                l.counts[i] = 0;
            }
            for i in 0..AvMax::COUNT {
                let item = l.avmax[i];
                g.avmax_total[i].fold(&item);
                g.avmax_recent[i].fold(&item);
                l.avmax[i] = AvMaxItem::default();
            }
        });
    }

    /// Global value of one counter (merged portion only).
    pub fn get(counter: Counter) -> u64 {
        GLOBAL.lock().total[counter as usize]
    }

    /// Clears the "recent" window.
    pub fn reset_recent() {
        let mut g = GLOBAL.lock();
        g.recent = [0; Counter::COUNT];
        g.avmax_recent = [AvMaxItem::default(); AvMax::COUNT];
    }

    /// Zeroes every counter. Test isolation helper.
    pub fn reset_all() {
        LOCAL.with(|l| *l.borrow_mut() = LocalStats::new());
        *GLOBAL.lock() = GlobalStats::new();
    }

    /// Renders all non-zero counters as aligned report lines.
    pub fn detailed() -> Vec<String> {
        let g = GLOBAL.lock();
        let mut lines = Vec::new();
        for i in 0..Counter::COUNT {
            if g.total[i] == 0 {
                continue;
            }
            let name = COUNTER_ORDER[i].name();
            lines.push(format!(
                "{name:<20} total: {:<14} recent: {}",
                g.total[i], g.recent[i]
            ));
        }
        for i in 0..AvMax::COUNT {
            let item = &g.avmax_total[i];
            if item.num == 0 {
                continue;
            }
            let name = AVMAX_ORDER[i].name();
            lines.push(format!(
                "{name:<20} num: {:<12} avg: {:<10} max: {:<10} large: {}",
                item.num,
                item.sum / item.num,
                item.max,
                item.num_large
            ));
        }
        lines
    }
}

const COUNTER_ORDER: [Counter; Counter::COUNT] = [
    Counter::Phase1,
    Counter::Phase2,
    Counter::Phase3,
    Counter::MarkFirst,
    Counter::MarkSecond,
    Counter::BwMapFind,
    Counter::BwMapFindNo,
    Counter::BwMapFindYes,
    Counter::BwMapFindUnf,
    Counter::OldGenFind,
    Counter::OldGenFindNo,
    Counter::OldGenFindYes,
    Counter::OldGenFindPending,
    Counter::CompOneChild,
    Counter::CompTwoChildren,
    Counter::ParentOverLimit,
    Counter::PredLimitEdgeCount,
    Counter::PrefixTest,
    Counter::PrefixDiff,
    Counter::EqualTest,
    Counter::FlagDiff,
    Counter::SingletonsDiff,
    Counter::PairsDiff,
    Counter::GraphBitsTest,
    Counter::GraphBitsEqual,
    Counter::Vf2Test,
    Counter::Vf2Positive,
    Counter::RevIsoTest,
    Counter::SelfDualCreated,
    Counter::LinExtNarrow,
    Counter::LinExtWide,
    Counter::LinExtReduced,
    Counter::OverflowRecovered,
    Counter::Canonicalize,
    Counter::Ambiguous,
    Counter::Unambiguous,
];

const AVMAX_ORDER: [AvMax; AvMax::COUNT] = [
    AvMax::DownSets,
    AvMax::ProbeStepsPos,
    AvMax::ProbeStepsNeg,
    AvMax::AutosFound,
    AvMax::CycleAutosFound,
    AvMax::EdgeListPhase1,
    AvMax::EdgeListPhase2,
    AvMax::PotPredCount,
    AvMax::PredCount,
];

#[cfg(test)]
mod tests {
    use super::*;

    // Single test: the counter store is process-global, so separate
    // #[test] functions would race on it.
    #[test]
    fn counters_merge_on_accumulate() {
        Stats::reset_all();
        Stats::inc(Counter::Phase1);
        Stats::inc(Counter::Phase1);
        assert_eq!(Stats::get(Counter::Phase1), 0, "not merged yet");
        Stats::accumulate();
        assert_eq!(Stats::get(Counter::Phase1), 2);

        Stats::add(AvMax::DownSets, 10);
        Stats::add(AvMax::DownSets, 2000);
        Stats::accumulate();
        let lines = Stats::detailed();
        let line = lines.iter().find(|l| l.contains("#DownSets")).unwrap();
        assert!(line.contains("max: 2000"), "{line}");
        assert!(line.contains("large: 1"), "{line}");
    }
}
