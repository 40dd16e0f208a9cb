//! Bidirectional driver: schedule, interleave, verdict.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sortbound_core::{factorial, LinExt, RunParams, Stats, MAX_C};

use super::{backward, forward, EngineError, LayerState};
use crate::domain::poset::{AnnotatedPoset, Status, ANNOTATED_BYTES, RECORD_BYTES};
use crate::infrastructure::map::{LayerMap, OldGenMap, PosetMap};
use crate::infrastructure::runlog::RunLog;
use crate::infrastructure::scratch::{ScratchAllocator, ScratchFile};
use crate::infrastructure::spill::SpillVector;
use crate::infrastructure::storage::LayerStorage;

/// Outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Sortable,
    NotSortable,
    /// The backward bandwidth was too tight to decide; more than one
    /// poset survived at level 0.
    Inconclusive,
}

impl Verdict {
    /// The single result line printed at the end of a run.
    pub fn line(self, params: RunParams) -> String {
        match self {
            Verdict::Sortable => format!(
                "{} elements SORTABLE in {} comparisons",
                params.n, params.c_total
            ),
            Verdict::NotSortable => format!(
                "{} elements NOT SORTABLE in {} comparisons",
                params.n, params.c_total
            ),
            Verdict::Inconclusive => {
                "inconclusive (backward search bandwidth too tight)".to_string()
            }
        }
    }
}

/// Driver configuration beyond the run parameters.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub forward: bool,
    pub backward: bool,
    pub reuse_bw: bool,
    /// Efficiency bandwidth of the backward completeness schedule.
    pub eff_bandwidth: f64,
    /// Second bandwidth, active from `band2_threshold` on.
    pub eff_bandwidth2: f64,
    pub band2_threshold: u32,
    /// Number of exhaustive layers nearest the root.
    pub full_layers: u32,
    pub bw_dir: PathBuf,
    pub scratch_fast: PathBuf,
    pub scratch_medium: PathBuf,
    /// RAM budget for active posets, bytes.
    pub active_poset_mem: u64,
    /// Budget for the old-generation cache, bytes.
    pub old_gen_mem: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            forward: true,
            backward: true,
            reuse_bw: true,
            eff_bandwidth: 0.125,
            eff_bandwidth2: 0.125,
            band2_threshold: MAX_C as u32,
            full_layers: 10,
            bw_dir: PathBuf::from("./storageBw"),
            scratch_fast: PathBuf::from("./temp_fast.bin"),
            scratch_medium: PathBuf::from("./temp_slow.bin"),
            active_poset_mem: 256 << 20,
            old_gen_mem: 256 << 20,
        }
    }
}

/// The bidirectional search.
pub struct Search {
    params: RunParams,
    config: SearchConfig,
    log: Arc<RunLog>,
    progress: AtomicU32,
    last_report: Instant,
}

impl Search {
    pub fn new(params: RunParams, config: SearchConfig, log: Arc<RunLog>) -> Self {
        Self { params, config, log, progress: AtomicU32::new(0), last_report: Instant::now() }
    }

    /// Fraction of the current phase already processed.
    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Relaxed))
    }

    /// Runs the configured searches to a verdict.
    pub fn run(&mut self) -> Result<Verdict, EngineError> {
        let params = self.params;
        let c_total = params.c_total;

        // degenerate budgets never enter the machinery
        if params.n <= 1 {
            let verdict = Verdict::Sortable;
            self.log.write(false, &verdict.line(params));
            return Ok(verdict);
        }
        if c_total == 0 {
            let verdict = Verdict::NotSortable;
            self.log.write(false, &verdict.line(params));
            return Ok(verdict);
        }

        let algorithm = match (self.config.forward, self.config.backward) {
            (true, true) => "bidirectional",
            (true, false) => "forward",
            (false, true) => "backward",
            (false, false) => {
                // nothing to run; treat like the C-0 guard
                let verdict = Verdict::Inconclusive;
                self.log.write(false, &verdict.line(params));
                return Ok(verdict);
            }
        };
        self.log.write(
            false,
            &format!(
                "Starting {algorithm} search n = {}, C = {c_total}, threads = {}",
                params.n, params.threads
            ),
        );

        let mut bw_limit = vec![0 as LinExt; c_total as usize + 1];
        let mut poset_map_bw: Vec<PosetMap> = Vec::new();
        let mut verdict: Option<Verdict> = None;

        if self.config.backward {
            verdict = Some(self.run_backward(&mut bw_limit, &mut poset_map_bw)?);
        }

        if self.config.forward {
            verdict = Some(self.run_forward(&bw_limit, &poset_map_bw)?);
        }

        let verdict = verdict.expect("at least one direction ran");
        Stats::accumulate();
        for line in Stats::detailed() {
            self.log.write(false, &line);
        }
        self.log.write(false, &verdict.line(params));
        self.log.flush();
        Ok(verdict)
    }

    /// Backward search from the chain down to level 0. Fills the
    /// completeness schedule and, when the forward search will run, the
    /// per-level authoritative maps.
    fn run_backward(
        &mut self,
        bw_limit: &mut [LinExt],
        poset_map_bw: &mut Vec<PosetMap>,
    ) -> Result<Verdict, EngineError> {
        let params = self.params;
        let n = params.n_usize();
        let c_total = params.c_total;

        let mut storage = LayerStorage::open(&self.config.bw_dir, self.config.reuse_bw)?;
        let mut bw_results: Vec<Option<usize>> = vec![None; c_total as usize + 1];

        let c0_efficiency = factorial(params.n) as f64 / 2f64.powi(c_total as i32);
        let efficiency_limit = (c0_efficiency + self.config.eff_bandwidth).min(1.0);
        let efficiency_limit2 = (c0_efficiency + self.config.eff_bandwidth2).min(1.0);
        let mut full_layers = self.config.full_layers;
        if !self.config.forward {
            full_layers = c_total + 1;
        }
        full_layers = full_layers.min(c_total + 1);
        let ext_limit_base = (factorial(params.n) as f64 / efficiency_limit) as LinExt;
        let ext_limit_base2 = (factorial(params.n) as f64 / efficiency_limit2) as LinExt;
        for c in 0..=c_total {
            let base = if c >= self.config.band2_threshold {
                ext_limit_base2
            } else {
                ext_limit_base
            };
            bw_limit[c as usize] = base >> c;
            if c >= c_total + 1 - full_layers {
                bw_limit[c as usize] = 1;
            }
        }

        self.log.write(false, "BW search parameters:");
        self.log.write(false, &format!("  start efficiency (c=0): {c0_efficiency:.6}"));
        if self.config.forward {
            self.log.write(
                false,
                &format!("  efficiency bandwidth  : {}", self.config.eff_bandwidth),
            );
            self.log.write(false, &format!("  efficiency limit      : {efficiency_limit:.6}"));
            self.log.write(false, &format!("  full layers           : {full_layers}"));
            if self.config.band2_threshold < c_total {
                self.log.write(false, &format!("  efficiency limit 2    : {efficiency_limit2:.6}"));
                self.log
                    .write(false, &format!("  bandwidth 2 threshold : {}", self.config.band2_threshold));
            }
        }

        let mut backward_c = c_total as i64;
        while backward_c >= 0 {
            let c = backward_c as u32;
            let mut entry_idx = storage.entry(params, c, bw_limit[c as usize]);
            if entry_idx.is_none() {
                if c == c_total {
                    self.log.write(true, "Creating initial poset for bw search");
                    backward::create_initial_poset_bw(&mut storage, params)?;
                } else {
                    self.log.write(true, &format!("Backward step, parentC = {c}"));
                    let limit_parents = bw_limit[c as usize];
                    let limit_children = bw_limit[c as usize + 1];

                    let child_idx =
                        bw_results[c as usize + 1].expect("deeper layer computed first");
                    let (child_map, child_list) = {
                        let child_entry = storage.entry_at(child_idx);
                        let meta = &child_entry.meta;
                        let child_map = PosetMap::new(
                            meta.record_count().max(1) as usize,
                            params.threads,
                            n,
                        );
                        child_entry.read_into(&child_map, false, n)?;
                        let child_list = child_map.fill();

                        // deeper layers may still hold sortable posets big
                        // enough to act as reverse-edge witnesses
                        let max_ext = meta.max_lin_ext();
                        let min_ext =
                            if limit_parents > max_ext { limit_parents - max_ext } else { 1 };
                        for c2 in c + 2..=c_total {
                            let idx2 = bw_results[c2 as usize].expect("deeper layer computed");
                            let entry2 = storage.entry_at(idx2);
                            if entry2.meta.max_lin_ext() >= min_ext {
                                entry2.read_into(&child_map, true, n)?;
                            }
                        }
                        (child_map, child_list)
                    };

                    let counts = backward::do_backward_step(
                        &mut storage,
                        c,
                        limit_parents,
                        limit_children,
                        &child_list,
                        &child_map,
                        &self.progress,
                        params,
                    )?;
                    self.log.write(
                        true,
                        &format!(
                            "  level {c}: yes = {}, unfinished = {}",
                            counts[Status::Yes.index()],
                            counts[Status::Unfinished.index()]
                        ),
                    );
                    self.report_periodically();
                }
                entry_idx = storage.entry(params, c, bw_limit[c as usize]);
                debug_assert!(entry_idx.is_some());
            } else {
                let entry = storage.entry_at(entry_idx.expect("checked above"));
                self.log.write(
                    true,
                    &format!(
                        "Reusing bw layer c = {c} from {:?} (yes = {}, unfinished = {})",
                        entry.path.file_name().unwrap_or_default(),
                        entry.meta.num_yes,
                        entry.meta.num_unf
                    ),
                );
            }
            bw_results[c as usize] = entry_idx;
            backward_c -= 1;
        }

        let meta0 = &storage.entry_at(bw_results[0].expect("level 0 computed")).meta;
        let verdict = if meta0.num_yes + meta0.num_unf > 1 {
            Verdict::Inconclusive
        } else if meta0.num_yes == 1 {
            Verdict::Sortable
        } else {
            Verdict::NotSortable
        };

        if self.config.forward {
            self.log.write(true, "Preparing hash maps with bw search results");
            let deepest_loaded = (c_total + 1).saturating_sub(full_layers).max(1);
            for c in 0..=c_total {
                if c < 1 || c > deepest_loaded {
                    poset_map_bw.push(PosetMap::new(1, params.threads, n));
                    continue;
                }
                let meta = storage
                    .entry_at(bw_results[c as usize].expect("layer computed"))
                    .meta
                    .clone();
                let map =
                    PosetMap::new(meta.record_count().max(1) as usize, params.threads, n);
                for c2 in c..=c_total {
                    let entry2 =
                        storage.entry_at(bw_results[c2 as usize].expect("layer computed"));
                    if entry2.meta.max_lin_ext[c_total as usize] >= meta.complete_above {
                        entry2.read_into(&map, false, n)?;
                    }
                }
                poset_map_bw.push(map);
            }
        }

        Ok(verdict)
    }

    /// Forward search from the antichain, against the backward frontier.
    fn run_forward(
        &mut self,
        bw_limit: &[LinExt],
        poset_map_bw: &[PosetMap],
    ) -> Result<Verdict, EngineError> {
        let params = self.params;
        let n = params.n_usize();
        let c_total = params.c_total as usize;

        // memory budgeting: each live child costs its annotated record
        // plus an edge-list share
        let per_poset = (ANNOTATED_BYTES + 8 * 10) as u64;
        let child_poset_limit = ((self.config.active_poset_mem / per_poset) / 3).max(1024) as usize;
        let child_edge_limit = child_poset_limit * 9;

        // old-gen sizing: small maps at the extremes, larger mid-search
        // where the bulk of the posets lives
        let old_gen_entries = (self.config.old_gen_mem / 2).max(1024);
        let size_small = (old_gen_entries / 100 / c_total as u64).max(1024);
        let size_medium =
            size_small + (old_gen_entries / 100 * 49) / (c_total as u64 * 2 / 5 + 1);
        let size_big =
            size_medium + (old_gen_entries / 100 * 50) / (c_total as u64 * 2 / 5 / 4 + 1);
        let medium_begin = c_total * 2 / 5 + 3;
        let medium_end = c_total * 4 / 5;
        let mut old_gen_sizes = Vec::with_capacity(c_total + 1);
        for i in 0..=c_total {
            old_gen_sizes.push(if i < medium_begin || i >= medium_end {
                size_small
            } else if (i - medium_begin) % 4 == 3 {
                size_big
            } else {
                size_medium
            });
        }

        let poset_tail = (child_poset_limit * c_total) as u64 * ANNOTATED_BYTES as u64;
        let edge_tail = (child_edge_limit * c_total) as u64 * 8;
        let medium_file = ScratchFile::create(&self.config.scratch_medium, poset_tail + edge_tail)?;
        let mut medium_alloc = ScratchAllocator::new(medium_file, poset_tail + edge_tail);

        let fast_len: u64 = old_gen_sizes.iter().map(|&s| s * RECORD_BYTES as u64).sum();
        let fast_file = ScratchFile::create(&self.config.scratch_fast, fast_len)?;
        let mut fast_alloc = ScratchAllocator::new(fast_file, fast_len);

        let mut poset_list: SpillVector<AnnotatedPoset> = SpillVector::new(
            child_poset_limit * 3,
            child_poset_limit * c_total,
            medium_alloc.alloc(poset_tail),
        );
        let mut edge_list: SpillVector<std::sync::atomic::AtomicU64> = SpillVector::new(
            child_edge_limit * 3,
            child_edge_limit * c_total,
            medium_alloc.alloc(edge_tail),
        );

        let mut old_gen: Vec<OldGenMap> = old_gen_sizes
            .iter()
            .map(|&size| OldGenMap::new(size, fast_alloc.alloc(size * RECORD_BYTES as u64), n))
            .collect();

        let mut layer_states = vec![LayerState::default(); c_total + 2];
        let mut temp: Vec<u64> = Vec::with_capacity(child_poset_limit + 100_000);
        let child_map = LayerMap::new(child_poset_limit, params.threads, n);

        let empty_bw_maps: Vec<PosetMap>;
        let bw_maps: &[PosetMap] = if self.config.backward {
            poset_map_bw
        } else {
            empty_bw_maps = (0..=c_total).map(|_| PosetMap::new(1, params.threads, n)).collect();
            &empty_bw_maps
        };

        self.log.write(true, "Creating initial poset");
        forward::create_initial_poset(&poset_list, &mut layer_states[0], params);

        let mut forward_c: u32 = 0;
        let mut steps = 0u64;
        let verdict = loop {
            steps += 1;
            let fc = forward_c as usize;
            let limit: LinExt = (1 as LinExt) << (params.c_total - forward_c - 1);
            let complete_above = if self.config.backward {
                bw_limit[fc + 1]
            } else {
                LinExt::MAX
            };
            tracing::debug!(c = forward_c, steps, "forward step");

            let (parent_states, child_states) = layer_states.split_at_mut(fc + 1);
            let (parent_gens, child_gens) = old_gen.split_at_mut(fc + 1);
            forward::do_forward_step(
                &mut poset_list,
                &mut edge_list,
                &mut parent_states[fc],
                &mut child_states[0],
                &mut forward_c,
                complete_above,
                &child_map,
                &bw_maps[fc + 1],
                &child_gens[0],
                &mut parent_gens[fc],
                limit,
                &self.progress,
                &mut temp,
                child_poset_limit,
                child_edge_limit,
                params,
            );

            if forward_c == 0 {
                poset_list.ensure_online_from(0);
                match poset_list.get(0).status() {
                    Status::Yes => break Verdict::Sortable,
                    Status::No => break Verdict::NotSortable,
                    Status::Unfinished => {}
                }
            }
            self.report_periodically();
        };

        self.log.write(false, &format!("Forward steps: {steps}"));
        for line in old_gen_profile(&old_gen) {
            self.log.write(false, &line);
        }
        drop(old_gen);
        Ok(verdict)
    }

    /// Emits accumulated statistics at most once a minute.
    fn report_periodically(&mut self) {
        if self.last_report.elapsed() < Duration::from_secs(60) {
            return;
        }
        self.last_report = Instant::now();
        for line in Stats::detailed() {
            self.log.write(true, &line);
        }
        Stats::reset_recent();
    }
}

/// Per-level settled-poset profile of the old-generation caches.
fn old_gen_profile(maps: &[OldGenMap]) -> Vec<String> {
    let mut lines = Vec::with_capacity(maps.len() + 1);
    let mut total = 0u64;
    for (c, map) in maps.iter().enumerate() {
        let yes = map.profile_inserted[Status::Yes.index()];
        let no = map.profile_inserted[Status::No.index()];
        total += yes + no;
        lines.push(format!(
            "c = {c:>2}: capacity {:<12} settled {:<12} YES: {:<12} NO: {}",
            map.capacity(),
            yes + no,
            yes,
            no
        ));
    }
    lines.push(format!("Total settled posets: {total}"));
    lines
}
