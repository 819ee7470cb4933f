//! Shared utility types.
//!
//! This module hosts the infrastructure that is independent of the
//! intermediate representation: the [`graph`] container and algorithms, and
//! the [`BitSet`] used by the data-flow analyses.

pub mod graph;

mod bitset;

pub use bitset::BitSet;
