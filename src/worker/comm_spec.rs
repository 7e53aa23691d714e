//! Process-group layout as seen by one worker.

use serde::{Deserialize, Serialize};

use crate::comm::communicator::Communicator;
use crate::fragment::vertex::Fid;

/// Where this worker sits in the process group. One fragment per worker,
/// so `fid == worker_id` and `fnum == worker_num`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommSpec {
    pub worker_id: usize,
    pub worker_num: usize,
    pub fid: Fid,
    pub fnum: usize,
}

impl CommSpec {
    pub fn from_comm<C: Communicator>(comm: &C) -> Self {
        CommSpec {
            worker_id: comm.rank(),
            worker_num: comm.size(),
            fid: comm.rank(),
            fnum: comm.size(),
        }
    }

    /// The single-worker layout.
    pub fn single() -> Self {
        CommSpec {
            worker_id: 0,
            worker_num: 1,
            fid: 0,
            fnum: 1,
        }
    }

    /// Worker 0 logs milestones for the whole group.
    pub fn is_coordinator(&self) -> bool {
        self.worker_id == 0
    }
}

impl Default for CommSpec {
    fn default() -> Self {
        Self::single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::communicator::LocalComm;

    #[test]
    fn derived_from_communicator() {
        let comms = LocalComm::group(3);
        let spec = CommSpec::from_comm(&comms[2]);
        assert_eq!((spec.fid, spec.fnum), (2, 3));
        assert!(!spec.is_coordinator());
        assert!(CommSpec::from_comm(&comms[0]).is_coordinator());
    }

    #[test]
    fn serde_roundtrip_through_json() {
        let spec = CommSpec::single();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(serde_json::from_str::<CommSpec>(&json).unwrap(), spec);
    }
}
