//! Message strategies and their compatibility with fragment edge layouts.

use serde::{Deserialize, Serialize};

use crate::fragment::LoadStrategy;

/// How per-vertex updates travel between owners and ghost holders.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStrategy {
    /// Ghost copies report changes to the owner; the owner refreshes every
    /// fragment holding a ghost copy.
    SyncOnOuterVertex,
    /// Owners push to fragments reached through outgoing cut edges.
    AlongOutgoingEdgeToOuterVertex,
    /// Owners push to fragments reached through incoming cut edges.
    AlongIncomingEdgeToOuterVertex,
    /// Owners push to fragments reached through any cut edge.
    AlongEdgeToOuterVertex,
}

impl MessageStrategy {
    pub const ALL: [MessageStrategy; 4] = [
        MessageStrategy::SyncOnOuterVertex,
        MessageStrategy::AlongOutgoingEdgeToOuterVertex,
        MessageStrategy::AlongIncomingEdgeToOuterVertex,
        MessageStrategy::AlongEdgeToOuterVertex,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            MessageStrategy::SyncOnOuterVertex => 0,
            MessageStrategy::AlongOutgoingEdgeToOuterVertex => 1,
            MessageStrategy::AlongIncomingEdgeToOuterVertex => 2,
            MessageStrategy::AlongEdgeToOuterVertex => 3,
        }
    }

    /// Whether ghost copies send their changes back to the owner.
    #[inline]
    pub const fn ghost_reports_to_owner(self) -> bool {
        matches!(self, MessageStrategy::SyncOnOuterVertex)
    }

    /// Whether a fragment stored with `load` can route this strategy.
    ///
    /// An owner addresses along-edge updates by its own gid, so the receiving
    /// fragment must hold the sender as a ghost. That needs the edge stored
    /// on both sides of the cut, hence `BothOutIn` for every along-edge
    /// strategy.
    pub const fn supported_by(self, load: LoadStrategy) -> bool {
        match self {
            MessageStrategy::SyncOnOuterVertex => true,
            MessageStrategy::AlongOutgoingEdgeToOuterVertex
            | MessageStrategy::AlongIncomingEdgeToOuterVertex
            | MessageStrategy::AlongEdgeToOuterVertex => matches!(load, LoadStrategy::BothOutIn),
        }
    }

    /// Smallest edge layout this strategy can route along.
    pub const fn minimal_load_strategy(self) -> LoadStrategy {
        match self {
            MessageStrategy::SyncOnOuterVertex => LoadStrategy::OnlyOut,
            MessageStrategy::AlongOutgoingEdgeToOuterVertex
            | MessageStrategy::AlongIncomingEdgeToOuterVertex
            | MessageStrategy::AlongEdgeToOuterVertex => LoadStrategy::BothOutIn,
        }
    }
}
