#![cfg_attr(docsrs, feature(doc_cfg))]
//! # frag-bsp
//!
//! frag-bsp runs graph algorithms over a partitioned graph in the
//! Bulk-Synchronous-Parallel model. Every worker owns one *fragment*: its
//! inner vertices, the edges touching them, and ghost (outer) copies of the
//! remote endpoints. An algorithm is two supersteps, `peval` (run once) and
//! `inc_eval` (run every following round), that only touch local data.
//!
//! ## Features
//! - A worker state machine that drives rounds, barriers and the collective
//!   termination vote
//! - Sync buffers: per-vertex values with a merge operator, propagated between
//!   owners and ghost copies without any hand-written messaging
//! - Manual vertex- and fragment-addressed messages and all-reduce collectives
//! - Pluggable communication backends (single fragment, threads in one
//!   process, MPI)
//! - Edge-cut fragments built from edge lists with hash or explicit partitioning
//! - Bundled weakly-connected-components and shortest-path apps
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! frag-bsp = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "check-invariants"]
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use frag_bsp::prelude::*;
//!
//! # fn main() -> Result<(), BspError> {
//! let mut builder = FragmentBuilder::<()>::new(1, false);
//! builder.add_vertex(1, 0).add_vertex(2, 0).add_edge(1, 2, ());
//! let frag = Arc::new(builder.build(0)?);
//! let mut worker: Worker<WccAuto<EdgecutFragment>, NoComm> =
//!     Worker::new(Arc::new(WccAuto::default()), frag)?;
//! worker.init(NoComm, &ParallelEngineSpec::sequential())?;
//! worker.query(())?;
//! worker.output(&mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod bsp_error;
pub mod comm;
pub mod data;
pub mod debug_invariants;
pub mod fragment;
pub mod message;
pub mod parallel;
pub mod worker;

pub use bsp_error::BspError;
pub use debug_invariants::DebugInvariants;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::app::{
        App, CidKind, Context, SsspAuto, VertexDataContext, WccAuto, check_app_fragment_consistency,
    };
    pub use crate::bsp_error::BspError;
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, LocalComm, NoComm, RoundTags, Wait};
    pub use crate::data::{Aggregator, MaxAggregator, MinAggregator, SyncBuffer, VertexArray};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::fragment::loader::{LoadGraphSpec, load_fragment, load_fragments};
    pub use crate::fragment::{
        EdgecutFragment, Fid, Fragment, FragmentBuilder, Gid, HashPartitioner, LoadStrategy,
        MapPartitioner, Oid, Partitioner, Vertex, VertexRange,
    };
    pub use crate::message::{MessageManager, MessageStrategy, RoundStats, Termination};
    pub use crate::parallel::{ParallelEngine, ParallelEngineSpec};
    pub use crate::worker::{CommSpec, QueryReport, Worker, WorkerState};
}
