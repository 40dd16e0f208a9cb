//! Sortbound engine: exhaustive poset search for sorting lower bounds.
//!
//! # Overview
//!
//! Given `N` elements and a comparison budget `C`, the engine decides
//! whether every permutation of `N` elements can be sorted with at most
//! `C` pairwise comparisons. It explores the space of partial orders
//! reachable from the antichain, deduplicated up to graph isomorphism,
//! with a forward search (comparison decisions, AND/OR propagation) meeting
//! a backward search (posets sortable within a shrinking budget).
//!
//! # Architecture
//!
//! The crate is split into two layers:
//!
//! - **Domain**: the mathematics: bit-packed DAGs, canonical forms,
//!   linear-extension counting, and the two search directions.
//! - **Infrastructure**: the machinery the search leans on: spill
//!   vectors, sharded hash maps, the old-generation cache, scratch files
//!   and layer persistence.
//!
//! The driver ([`domain::search::Search`]) wires both together and emits a
//! single verdict: SORTABLE, NOT SORTABLE, or inconclusive.

#![warn(clippy::all)]

pub mod domain;
pub mod infrastructure;

pub use domain::search::{EngineError, Search, SearchConfig, Verdict};
