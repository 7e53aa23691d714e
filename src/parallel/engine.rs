//! Per-fragment thread pool for vertex loops.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::bsp_error::BspError;
use crate::fragment::vertex::{Vertex, VertexRange};

/// Thread-level parallelism inside one fragment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelEngineSpec {
    pub thread_num: usize,
    /// Pin worker threads to `cpu_list`. Recorded but not enforced.
    pub affinity: bool,
    pub cpu_list: Vec<usize>,
}

impl Default for ParallelEngineSpec {
    fn default() -> Self {
        ParallelEngineSpec {
            thread_num: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            affinity: false,
            cpu_list: Vec::new(),
        }
    }
}

impl ParallelEngineSpec {
    pub fn with_threads(thread_num: usize) -> Self {
        ParallelEngineSpec {
            thread_num,
            ..Default::default()
        }
    }

    /// Run vertex loops on the calling thread.
    pub fn sequential() -> Self {
        Self::with_threads(1)
    }
}

/// Thread pool sized from a [`ParallelEngineSpec`]; one thread means no pool.
#[derive(Clone)]
pub struct ParallelEngine {
    pool: Option<Arc<ThreadPool>>,
    thread_num: usize,
}

impl std::fmt::Debug for ParallelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelEngine")
            .field("thread_num", &self.thread_num)
            .finish()
    }
}

impl Default for ParallelEngine {
    fn default() -> Self {
        ParallelEngine {
            pool: None,
            thread_num: 1,
        }
    }
}

impl ParallelEngine {
    pub fn new(spec: &ParallelEngineSpec) -> Result<Self, BspError> {
        let thread_num = spec.thread_num.max(1);
        if spec.affinity {
            log::warn!(
                "thread affinity requested for cpus {:?}; running unpinned",
                spec.cpu_list
            );
        }
        if thread_num == 1 {
            return Ok(ParallelEngine::default());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(thread_num)
            .thread_name(|i| format!("bsp-engine-{i}"))
            .build()
            .map_err(|e| BspError::Config(format!("thread pool of {thread_num}: {e}")))?;
        Ok(ParallelEngine {
            pool: Some(Arc::new(pool)),
            thread_num,
        })
    }

    pub fn thread_num(&self) -> usize {
        self.thread_num
    }

    /// Whether both handles run on the same pool. Sequential engines share nothing.
    pub fn shares_pool_with(&self, other: &ParallelEngine) -> bool {
        match (&self.pool, &other.pool) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Run `op` inside the pool (or inline when sequential).
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Call `f` once per vertex of `range`.
    pub fn for_each_vertex<FN>(&self, range: VertexRange, f: FN)
    where
        FN: Fn(Vertex) + Send + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| {
                (range.begin()..range.end())
                    .into_par_iter()
                    .for_each(|i| f(Vertex::new(i)))
            }),
            None => range.iter().for_each(f),
        }
    }

    /// Map every vertex of `range` and collect the results in index order.
    pub fn map_vertices<T, FN>(&self, range: VertexRange, f: FN) -> Vec<T>
    where
        T: Send,
        FN: Fn(Vertex) -> T + Send + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| {
                (range.begin()..range.end())
                    .into_par_iter()
                    .map(|i| f(Vertex::new(i)))
                    .collect()
            }),
            None => range.iter().map(f).collect(),
        }
    }
}
