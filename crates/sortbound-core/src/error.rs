//! Typed error surface.
//!
//! Configuration errors are fatal and reported once at startup. Storage
//! errors on layer files are *not* fatal to a run: the caller treats the
//! affected layer as absent and recomputes it.

use std::io;
use std::path::PathBuf;

/// Rejected run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// N outside the compiled capacity.
    #[error("number of elements must be in 1..={max}, got {got}")]
    ElementsOutOfRange { got: u32, max: u32 },

    /// C outside the compiled capacity.
    #[error("comparison budget must be at most {max}, got {got}")]
    ComparisonsOutOfRange { got: u32, max: u32 },

    /// Worker count outside 1..=MAX_THREADS.
    #[error("thread count must be in 1..={max}, got {got}")]
    ThreadsOutOfRange { got: u32, max: u32 },

    /// Output or storage directory cannot be created.
    #[error("cannot create directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Scratch file cannot be created or sized.
    #[error("cannot open scratch file {path}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure while reading or writing a persisted layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Header present but inconsistent with the file length.
    #[error("{path}: truncated layer file (expected {expected} bytes, found {found})")]
    Truncated {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    /// File too short to hold a header at all.
    #[error("{path}: missing layer header")]
    ShortHeader { path: PathBuf },
}
