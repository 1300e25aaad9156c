//! proviso benchmarking suite
//!
//! Criterion benchmarks for requirement parsing and for resolution against
//! synthetic in-memory indexes.

pub mod common;

pub use common::*;
