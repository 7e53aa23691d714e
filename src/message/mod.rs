//! Message strategies and the per-fragment message manager.

pub(crate) mod auto_sync;
pub mod manager;
pub mod strategy;

pub use manager::{MessageManager, RoundStats, Termination};
pub use strategy::MessageStrategy;
