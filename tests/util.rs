#![allow(dead_code)]
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use frag_bsp::app::ContextArgs;
use frag_bsp::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Receives give up after this long, so a protocol bug fails instead of hanging.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Run `body` once per fragment, each on its own thread, over one `LocalComm` group.
pub fn run_group<F, R, B>(frags: Vec<F>, body: B) -> Vec<R>
where
    F: Send + 'static,
    R: Send + 'static,
    B: Fn(F, LocalComm) -> R + Send + Sync + 'static,
{
    let body = Arc::new(body);
    let comms = LocalComm::group_with_timeout(frags.len(), RECV_TIMEOUT);
    let handles: Vec<_> = frags
        .into_iter()
        .zip(comms)
        .map(|(frag, comm)| {
            let body = Arc::clone(&body);
            thread::spawn(move || body(frag, comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("fragment thread panicked"))
        .collect()
}

/// Run one query of the app built by `make_app` on every fragment.
/// Returns each fragment's report and output text, indexed by fid.
pub fn run_app<A, M>(frags: Vec<A::Fragment>, make_app: M, args: ContextArgs<A>) -> Vec<(QueryReport, String)>
where
    A: App,
    M: Fn() -> A + Send + Sync + 'static,
    ContextArgs<A>: Clone + Send + Sync + 'static,
{
    run_group(frags, move |frag, comm| {
        let mut worker = Worker::<A, LocalComm>::new(Arc::new(make_app()), Arc::new(frag)).unwrap();
        worker
            .init(comm, &ParallelEngineSpec::sequential())
            .unwrap();
        let report = worker.query(args.clone()).unwrap();
        let mut out = Vec::new();
        worker.output(&mut out).unwrap();
        (report, String::from_utf8(out).unwrap())
    })
}

/// Parse `<oid> <value>` lines.
pub fn parse_output(text: &str) -> BTreeMap<u64, String> {
    text.lines()
        .map(|line| {
            let (oid, value) = line.split_once(' ').expect("line has two columns");
            (oid.parse().expect("numeric oid"), value.to_string())
        })
        .collect()
}

/// Merge every fragment's output; panics if two fragments report one vertex.
pub fn merged_output(results: &[(QueryReport, String)]) -> BTreeMap<u64, String> {
    let mut all = BTreeMap::new();
    for (_, text) in results {
        for (oid, value) in parse_output(text) {
            assert!(all.insert(oid, value).is_none(), "vertex {oid} reported twice");
        }
    }
    all
}

/// A owns {1, 2}, B owns {3}. Edges (1,2) and (2,3); B also keeps a ghost of 1.
pub fn toy_fragments() -> Vec<EdgecutFragment> {
    let mut b = FragmentBuilder::<()>::new(2, false);
    b.add_vertex(1, 0)
        .add_vertex(2, 0)
        .add_vertex(3, 1)
        .add_edge(1, 2, ())
        .add_edge(2, 3, ())
        .add_ghost(1, 1);
    b.build_all().unwrap()
}

/// `m` random edges over oids `0..n` (self loops and duplicates allowed).
pub fn random_edges(n: u64, m: usize, seed: u64) -> Vec<(u64, u64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..m)
        .map(|_| (rng.gen_range(0..n), rng.gen_range(0..n)))
        .collect()
}

pub fn random_weighted_edges(n: u64, m: usize, seed: u64) -> Vec<(u64, u64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..m)
        .map(|_| {
            (
                rng.gen_range(0..n),
                rng.gen_range(0..n),
                rng.gen_range(1..20) as f64 / 4.0,
            )
        })
        .collect()
}

/// Fragments of an unweighted graph where every oid in `0..n` exists.
pub fn partition_unweighted(n: u64, edges: &[(u64, u64)], fnum: usize, directed: bool) -> Vec<EdgecutFragment> {
    let mut b = FragmentBuilder::<()>::new(fnum, directed).with_partitioner(HashPartitioner::new(fnum));
    for oid in 0..n {
        b.add_vertex(oid, (oid % fnum as u64) as usize);
    }
    for &(u, v) in edges {
        b.add_edge(u, v, ());
    }
    b.build_all().unwrap()
}

pub fn partition_weighted(
    n: u64,
    edges: &[(u64, u64, f64)],
    fnum: usize,
    directed: bool,
) -> Vec<EdgecutFragment<f64>> {
    let mut b = FragmentBuilder::<f64>::new(fnum, directed)
        .with_load_strategy(LoadStrategy::OnlyOut)
        .with_partitioner(HashPartitioner::new(fnum));
    for oid in 0..n {
        b.add_vertex(oid, (oid % fnum as u64) as usize);
    }
    for &(u, v, w) in edges {
        b.add_edge(u, v, w);
    }
    b.build_all().unwrap()
}

/// Smallest oid of each vertex's weakly connected component.
pub fn union_find_components(n: u64, edges: &[(u64, u64)]) -> BTreeMap<u64, u64> {
    fn find(parent: &mut [u64], x: u64) -> u64 {
        let mut root = x;
        while parent[root as usize] != root {
            root = parent[root as usize];
        }
        let mut cur = x;
        while parent[cur as usize] != root {
            let next = parent[cur as usize];
            parent[cur as usize] = root;
            cur = next;
        }
        root
    }
    let mut parent: Vec<u64> = (0..n).collect();
    for &(u, v) in edges {
        let (ru, rv) = (find(&mut parent, u), find(&mut parent, v));
        // the smaller root wins, so roots are component minima
        if ru < rv {
            parent[rv as usize] = ru;
        } else {
            parent[ru as usize] = rv;
        }
    }
    (0..n).map(|v| (v, find(&mut parent, v))).collect()
}

/// Shortest distances from `source`; unreachable vertices are absent.
pub fn dijkstra(n: u64, edges: &[(u64, u64, f64)], source: u64, directed: bool) -> HashMap<u64, f64> {
    let mut adj: Vec<Vec<(u64, f64)>> = vec![Vec::new(); n as usize];
    for &(u, v, w) in edges {
        adj[u as usize].push((v, w));
        if !directed {
            adj[v as usize].push((u, w));
        }
    }
    let mut dist = HashMap::new();
    // weights are multiples of 0.25, so scaled integers order exactly
    let mut heap = BinaryHeap::new();
    heap.push(Reverse((0u64, source)));
    while let Some(Reverse((d, u))) = heap.pop() {
        if dist.contains_key(&u) {
            continue;
        }
        dist.insert(u, d as f64 / 4.0);
        for &(v, w) in &adj[u as usize] {
            if !dist.contains_key(&v) {
                heap.push(Reverse((d + (w * 4.0) as u64, v)));
            }
        }
    }
    dist
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
