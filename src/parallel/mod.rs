//! Thread-level parallelism within a fragment.

pub mod engine;

pub use engine::{ParallelEngine, ParallelEngineSpec};
