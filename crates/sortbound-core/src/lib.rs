//! Shared foundation for the sortbound workspace.
//!
//! This crate carries everything both the engine and the CLI need to agree
//! on: the compile-time capacity of a build, the per-run parameters, the
//! typed error surface, and the run-wide statistics counters.
//!
//! # Capacity model
//!
//! A build supports element counts up to [`MAX_N`]. The linear-extension
//! value type [`LinExt`] is sized for that capacity (`u64` holds every
//! `e(P) ≤ N!` for `N ≤ 20`). Builds for larger `N` swap the alias for a
//! wider integer; nothing else changes.

#![warn(clippy::all)]

pub mod error;
pub mod params;
pub mod stats;

pub use error::{ConfigError, StorageError};
pub use params::{
    factorial, falling_factorial, is_easily_sortable_lin_ext, BitRow, LinExt, RunParams, FJA,
    ITLB, MAX_C, MAX_END_C, MAX_N, MAX_THREADS, MULT1, MULT2, PRIME1, PRIME2, PRIME3,
};
pub use stats::{AvMax, Counter, Stats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
