//! The two search directions and the bidirectional driver.

mod backward;
mod driver;
mod forward;
mod state;

pub use driver::{Search, SearchConfig, Verdict};
pub(crate) use state::LayerState;

use sortbound_core::{ConfigError, StorageError};

/// Batch size handed out by the atomic work cursors.
pub(crate) const BATCH_SIZE: usize = 1024;

/// Fatal engine failures; everything else is handled inside the search.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
