//! Worker: drives the BSP loop of one fragment.

pub mod comm_spec;
#[allow(clippy::module_inception)]
pub mod worker;

pub use comm_spec::CommSpec;
pub use worker::{QueryReport, Worker, WorkerState};
