//! The poset data model: byte-packed records, singleton/pair accounting
//! and the annotated in-memory overlay.

mod annotated;
mod info;
mod record;

pub use annotated::{AnnotatedPoset, ANNOTATED_BYTES};
pub use info::PosetInfo;
pub use record::{PosetRecord, Status, GRAPH_BITS, GRAPH_BYTES, RECORD_BYTES};
