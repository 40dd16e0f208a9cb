//! Exact linear-extension counting.

mod counter;

pub use counter::LinExtCalculator;
