//! BspError: unified error type for frag-bsp public APIs
//!
//! Every fallible operation in the crate (worker lifecycle, fragment lookups,
//! wire decoding, round exchange) reports through this enum so that callers
//! can propagate with `?` and abort the query on the first failure.

use thiserror::Error;

use crate::fragment::vertex::{Fid, Gid};

/// Unified error type for frag-bsp operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BspError {
    /// The algorithm's declared requirements do not match the fragment.
    #[error("Application is not valid for the loaded fragment: {reason}")]
    InconsistentApp { reason: String },
    /// A worker method was called in the wrong lifecycle state.
    #[error("Worker is in state `{found}`, expected `{expected}`")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },
    /// A receive from `neighbor` failed or returned an unexpected payload.
    #[error("Communication error with fragment {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },
    /// A payload could not be decoded.
    #[error("Malformed wire payload: {0}")]
    WireError(String),
    /// A gid arrived that this fragment does not hold.
    #[error("Fragment {fid} holds no vertex with gid {gid}")]
    UnknownVertex { fid: Fid, gid: Gid },
    /// A local vertex index fell outside the buffer's range.
    #[error("Vertex index {index} out of range (len {len})")]
    VertexOutOfRange { index: usize, len: usize },
    /// An operation required an inner vertex.
    #[error("Vertex {0} is not an inner vertex of this fragment")]
    NotInnerVertex(usize),
    /// An operation required an outer vertex.
    #[error("Vertex {0} is not an outer vertex of this fragment")]
    NotOuterVertex(usize),
    /// A fragment id outside `0..fnum`.
    #[error("Fragment id {fid} out of range (fnum {fnum})")]
    InvalidFragmentId { fid: Fid, fnum: usize },
    /// Building fragments from an edge list failed.
    #[error("Graph load error: {0}")]
    GraphLoad(String),
    /// A structural invariant check failed.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
    /// A configuration value could not be honoured.
    #[error("Configuration error: {0}")]
    Config(String),
    /// An I/O sink or source failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BspError {
    fn from(e: std::io::Error) -> Self {
        BspError::Io(e.to_string())
    }
}
