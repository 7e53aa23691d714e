//! Point-to-point communication, wire records and the collectives the BSP
//! loop is built on.

pub mod collective;
pub mod communicator;
pub mod exchange;
pub mod wire;

pub use collective::{all_gather, all_reduce, all_reduce_max, all_reduce_min, all_reduce_sum};
pub use communicator::{CommTag, Communicator, LocalComm, NoComm, RoundTags, Wait};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use exchange::exchange_payloads;
