mod util;
use util::*;

use frag_bsp::prelude::*;

type Sssp = SsspAuto<EdgecutFragment<f64>>;

fn check_against_dijkstra(n: u64, edges: &[(u64, u64, f64)], source: u64, fnum: usize, directed: bool) {
    let expected = dijkstra(n, edges, source, directed);
    let frags = partition_weighted(n, edges, fnum, directed);
    let got = merged_output(&run_app(frags, move || Sssp::new(source), ()));

    assert_eq!(got.len(), n as usize);
    for (oid, text) in got {
        let dist: f64 = text.parse().unwrap();
        match expected.get(&oid) {
            Some(&want) => assert_eq!(dist, want, "vertex {oid}"),
            None => assert!(dist.is_infinite(), "vertex {oid} should be unreachable, got {dist}"),
        }
    }
}

#[test]
fn path_across_fragments() {
    // 0 - 1 - 2 - 3 with every hop crossing a fragment boundary
    let edges = [(0, 1, 1.0), (1, 2, 2.0), (2, 3, 0.5), (0, 3, 10.0)];
    let frags = partition_weighted(4, &edges, 2, false);
    let results = run_app(frags, || Sssp::new(0), ());
    assert_eq!(results[0].1, "0 0\n2 3\n");
    assert_eq!(results[1].1, "1 1\n3 3.5\n");
}

#[test]
fn unreachable_vertices_stay_infinite() {
    let edges = [(0, 1, 1.0), (2, 3, 1.0)];
    let got = merged_output(&run_app(partition_weighted(4, &edges, 2, false), || Sssp::new(0), ()));
    assert_eq!(got[&2], "inf");
    assert_eq!(got[&3], "inf");
    assert_eq!(got[&1], "1");
}

#[test]
fn undirected_random_graphs() {
    for (seed, fnum) in [(5u64, 2usize), (6, 3), (7, 4)] {
        let edges = random_weighted_edges(50, 120, seed);
        check_against_dijkstra(50, &edges, 0, fnum, false);
    }
}

#[test]
fn directed_random_graphs() {
    for (seed, fnum) in [(8u64, 2usize), (9, 3), (10, 5)] {
        let edges = random_weighted_edges(40, 100, seed);
        check_against_dijkstra(40, &edges, 3, fnum, true);
    }
}

#[test]
fn source_missing_from_graph() {
    let edges = [(0, 1, 1.0)];
    let got = merged_output(&run_app(partition_weighted(2, &edges, 2, false), || Sssp::new(99), ()));
    assert!(got.values().all(|d| d == "inf"));
}
