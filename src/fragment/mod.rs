//! Graph fragments: one worker's partition of the graph.
//!
//! A fragment owns its *inner* vertices and keeps *outer* (ghost) copies of
//! remotely-owned vertices that share a cut edge with an inner vertex.
//! Local vertex indices are laid out as `[inner | outer]`.

pub mod builder;
pub mod csr;
pub mod edgecut;
pub mod loader;
pub mod partitioner;
pub mod vertex;

pub use builder::FragmentBuilder;
pub use edgecut::EdgecutFragment;
pub use partitioner::{HashPartitioner, MapPartitioner, Partitioner};
pub use vertex::{Fid, Gid, IdParser, Oid, Vertex, VertexRange};

use serde::{Deserialize, Serialize};

use crate::bsp_error::BspError;
use crate::message::strategy::MessageStrategy;

/// Which edge directions a fragment keeps for its inner vertices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadStrategy {
    OnlyOut,
    OnlyIn,
    BothOutIn,
}

impl LoadStrategy {
    /// A fragment loaded with `self` can serve an app declaring `required`.
    pub const fn satisfies(self, required: LoadStrategy) -> bool {
        match (self, required) {
            (LoadStrategy::BothOutIn, _) => true,
            (LoadStrategy::OnlyOut, LoadStrategy::OnlyOut) => true,
            (LoadStrategy::OnlyIn, LoadStrategy::OnlyIn) => true,
            _ => false,
        }
    }

    pub const fn keeps_out(self) -> bool {
        matches!(self, LoadStrategy::OnlyOut | LoadStrategy::BothOutIn)
    }

    pub const fn keeps_in(self) -> bool {
        matches!(self, LoadStrategy::OnlyIn | LoadStrategy::BothOutIn)
    }
}

/// One adjacency entry.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Nbr<E> {
    pub neighbor: Vertex,
    pub data: E,
}

/// Read-mostly view of a partition, shared between the worker and the app.
pub trait Fragment: Send + Sync + 'static {
    /// Per-edge payload.
    type EData: Copy + Send + Sync + 'static;

    fn fid(&self) -> Fid;
    fn fnum(&self) -> usize;
    fn directed(&self) -> bool;
    fn load_strategy(&self) -> LoadStrategy;

    /// Every local vertex, inner then outer.
    fn vertices(&self) -> VertexRange;
    fn inner_vertices(&self) -> VertexRange;
    fn outer_vertices(&self) -> VertexRange;

    #[inline]
    fn is_inner_vertex(&self, v: Vertex) -> bool {
        self.inner_vertices().contains(v)
    }

    #[inline]
    fn is_outer_vertex(&self, v: Vertex) -> bool {
        self.outer_vertices().contains(v)
    }

    /// User-facing id of a local vertex.
    fn get_id(&self, v: Vertex) -> Oid;
    /// Internal global id of a local vertex.
    fn get_gid(&self, v: Vertex) -> Gid;
    fn gid_to_vertex(&self, gid: Gid) -> Option<Vertex>;
    fn oid_to_vertex(&self, oid: Oid) -> Option<Vertex>;
    /// Fragment that owns `v` (own fid for inner vertices).
    fn owner_of(&self, v: Vertex) -> Fid;

    /// Outgoing adjacency of an inner vertex; empty for outer vertices.
    fn outgoing_adj(&self, v: Vertex) -> &[Nbr<Self::EData>];
    /// Incoming adjacency of an inner vertex; equals `outgoing_adj` when undirected.
    fn incoming_adj(&self, v: Vertex) -> &[Nbr<Self::EData>];
    /// Outgoing neighbors that are inner vertices.
    fn inner_outgoing_adj(&self, v: Vertex) -> &[Nbr<Self::EData>];
    /// Outgoing neighbors that are outer vertices.
    fn outer_outgoing_adj(&self, v: Vertex) -> &[Nbr<Self::EData>];
    /// Incoming neighbors that are inner vertices.
    fn inner_incoming_adj(&self, v: Vertex) -> &[Nbr<Self::EData>];
    /// Incoming neighbors that are outer vertices.
    fn outer_incoming_adj(&self, v: Vertex) -> &[Nbr<Self::EData>];

    /// Remote fragments an owner must refresh for inner vertex `v` under
    /// `strategy`. Empty for outer vertices.
    fn mirror_fragments(&self, v: Vertex, strategy: MessageStrategy) -> &[Fid];

    /// Build the lookup tables an app with this strategy needs.
    fn prepare_to_run_app(
        &self,
        strategy: MessageStrategy,
        need_split_edges: bool,
    ) -> Result<(), BspError>;
}
