mod util;
use util::*;

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use frag_bsp::prelude::*;

type Wcc = WccAuto<EdgecutFragment>;

#[test]
fn two_fragment_toy_graph() {
    let results = run_app(toy_fragments(), Wcc::default, ());

    assert_eq!(results[0].1, "1 1\n2 1\n");
    assert_eq!(results[1].1, "3 1\n");
    for (report, _) in &results {
        assert!(report.rounds <= 2, "took {} rounds", report.rounds);
        assert_eq!(report.termination, Some(Termination::Quiescent));
    }
}

#[test]
fn matches_union_find_on_random_graphs() {
    for (seed, fnum) in [(1u64, 2usize), (2, 3), (3, 4), (4, 5)] {
        let n = 60;
        // sparse enough to leave several components
        let edges = random_edges(n, 40, seed);
        let expected = union_find_components(n, &edges);

        let frags = partition_unweighted(n, &edges, fnum, false);
        let got = merged_output(&run_app(frags, Wcc::default, ()));

        assert_eq!(got.len(), n as usize);
        for (oid, cid) in expected {
            assert_eq!(got[&oid], cid.to_string(), "seed {seed}, vertex {oid}");
        }
    }
}

#[test]
fn directed_edges_are_followed_both_ways() {
    // 5 -> 3 -> 1 and 4 -> 2, spread over three fragments
    let edges = [(5, 3), (3, 1), (4, 2)];
    let frags = partition_unweighted(6, &edges, 3, true);
    let got = merged_output(&run_app(frags, Wcc::default, ()));
    let want: BTreeMap<u64, String> = [(0, 0), (1, 1), (2, 2), (3, 1), (4, 2), (5, 1)]
        .into_iter()
        .map(|(v, c)| (v, c.to_string()))
        .collect();
    assert_eq!(got, want);
}

#[test]
fn gid_labels_partition_like_oid_labels() {
    let n = 40;
    let edges = random_edges(n, 30, 11);
    let expected = union_find_components(n, &edges);
    let frags = partition_unweighted(n, &edges, 3, false);
    let got = merged_output(&run_app(frags, || Wcc::new(CidKind::Gid), ()));

    // labels are opaque here: same component <=> same label
    for u in 0..n {
        for v in (u + 1)..n {
            assert_eq!(
                expected[&u] == expected[&v],
                got[&u] == got[&v],
                "vertices {u} and {v}"
            );
        }
    }
}

#[test]
fn loaded_graph_with_isolated_vertices() {
    let text = "# a path and a pair\n1 2\n2 3\n3 4\n\n10 11\n";
    let vertices = [1u64, 2, 3, 4, 7, 10, 11];
    let frags = load_fragments(
        Cursor::new(text),
        Some(&vertices),
        HashPartitioner::new(3),
        &LoadGraphSpec::default(),
    )
    .unwrap();
    let got = merged_output(&run_app(frags, WccAuto::<EdgecutFragment<f64>>::default, ()));
    let want: BTreeMap<u64, String> = [(1, 1), (2, 1), (3, 1), (4, 1), (7, 7), (10, 10), (11, 10)]
        .into_iter()
        .map(|(v, c)| (v, c.to_string()))
        .collect();
    assert_eq!(got, want);
}

#[test]
fn multi_threaded_engine_agrees() {
    let n = 50;
    let edges = random_edges(n, 45, 21);
    let expected = union_find_components(n, &edges);
    let frags = partition_unweighted(n, &edges, 2, false);

    let outputs = run_group(frags, |frag, comm| {
        let mut worker = Worker::<Wcc, LocalComm>::new(Arc::new(Wcc::default()), Arc::new(frag)).unwrap();
        worker.init(comm, &ParallelEngineSpec::with_threads(3)).unwrap();
        worker.query(()).unwrap();
        let mut out = Vec::new();
        worker.output(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    });
    for text in outputs {
        for (oid, cid) in parse_output(&text) {
            assert_eq!(cid, expected[&oid].to_string());
        }
    }
}
