//! sortbound: decides whether N elements are sortable in C comparisons.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use sortbound_core::{RunParams, MAX_C, MAX_N};
use sortbound_engine::infrastructure::runlog::RunLog;
use sortbound_engine::{Search, SearchConfig};

/// Exhaustive poset search for sorting lower bounds.
#[derive(Parser, Debug)]
#[command(name = "sortbound", version, about)]
struct Cli {
    /// Run the forward search only.
    #[arg(long = "forward-search", visible_alias = "fw")]
    forward_search: bool,

    /// Run the backward search only.
    #[arg(long = "backward-search", visible_alias = "bw")]
    backward_search: bool,

    /// Run the bidirectional search.
    #[arg(long = "bidir-search", visible_alias = "bd")]
    bidir_search: bool,

    /// Number of elements N.
    #[arg(short = 'N', long = "num-elements", default_value_t = 13)]
    num_elements: u32,

    /// Comparison budget C; defaults to the information-theoretic lower
    /// bound ceil(log2(N!)).
    #[arg(short = 'C', long = "num-comparisons")]
    num_comparisons: Option<u32>,

    /// Worker thread count.
    #[arg(short = 't', long = "threads")]
    threads: Option<u32>,

    /// Efficiency bandwidth of the backward completeness schedule.
    #[arg(long = "eff-bandwidth", default_value_t = 0.125)]
    eff_bandwidth: f64,

    /// Second efficiency bandwidth, active from --band2-threshold on.
    #[arg(long = "eff-bandwidth2")]
    eff_bandwidth2: Option<f64>,

    /// Level from which the second bandwidth applies.
    #[arg(long = "band2-threshold")]
    band2_threshold: Option<u32>,

    /// Number of exhaustive backward layers nearest the root.
    #[arg(long = "full-layers", default_value_t = 10)]
    full_layers: u32,

    /// Reuse backward layers persisted by previous runs.
    #[arg(long = "reuse-bw", default_value_t = true, action = clap::ArgAction::Set)]
    reuse_bw: bool,

    /// Directory for the run's log files.
    #[arg(long = "log-path", default_value = "./outputs")]
    log_path: PathBuf,

    /// Directory for persisted backward layers.
    #[arg(long = "bw-path", default_value = "./storageBw")]
    bw_path: PathBuf,

    /// Fast scratch file (SSD), forward search only.
    #[arg(long = "tempfile-fast", default_value = "./temp_fast.bin")]
    tempfile_fast: PathBuf,

    /// Slow scratch file (HDD is fine), forward search only.
    #[arg(long = "tempfile-slow", default_value = "./temp_slow.bin")]
    tempfile_slow: PathBuf,

    /// RAM for active posets, in GiB.
    #[arg(long = "active-poset-mem", default_value_t = 0.25)]
    active_poset_mem: f64,

    /// Memory for the old-generation cache, in GiB.
    #[arg(long = "old-poset-mem", default_value_t = 0.25)]
    old_poset_mem: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let modes = cli.forward_search as u8 + cli.backward_search as u8 + cli.bidir_search as u8;
    if modes > 1 {
        bail!("choose at most one of --forward-search, --backward-search, --bidir-search");
    }
    let (forward, backward) = if cli.backward_search {
        (false, true)
    } else if cli.bidir_search {
        (true, true)
    } else {
        // --forward-search and the no-flag default
        (true, false)
    };

    if cli.num_elements == 0 || cli.num_elements as usize > MAX_N {
        bail!("N must be between 1 and {MAX_N}");
    }
    let threads = cli
        .threads
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |p| p.get() as u32));
    let c_total = cli
        .num_comparisons
        .unwrap_or_else(|| sortbound_core::ITLB[cli.num_elements as usize]);
    let params = RunParams::new(cli.num_elements, c_total, threads)
        .with_context(|| format!("invalid configuration (N ≤ {MAX_N}, C ≤ {MAX_C})"))?;

    let log =
        Arc::new(RunLog::create(&cli.log_path, params.n).context("cannot create log files")?);

    let config = SearchConfig {
        forward,
        backward,
        reuse_bw: cli.reuse_bw,
        eff_bandwidth: cli.eff_bandwidth,
        eff_bandwidth2: cli.eff_bandwidth2.unwrap_or(cli.eff_bandwidth),
        band2_threshold: cli.band2_threshold.unwrap_or(MAX_C as u32),
        full_layers: cli.full_layers,
        bw_dir: cli.bw_path,
        scratch_fast: cli.tempfile_fast,
        scratch_medium: cli.tempfile_slow,
        active_poset_mem: gib_to_bytes(cli.active_poset_mem),
        old_gen_mem: gib_to_bytes(cli.old_poset_mem),
    };

    let mut search = Search::new(params, config, Arc::clone(&log));
    let verdict = search.run().context("search failed")?;

    info!("{}", verdict.line(params));
    println!("{}", verdict.line(params));
    Ok(())
}

fn gib_to_bytes(gib: f64) -> u64 {
    ((gib * 1024.0) as u64) << 20
}
