use std::io::Cursor;

use frag_bsp::fragment::loader::{parse_edge_list, parse_vertex_list};
use frag_bsp::prelude::*;

const EDGES: &str = "\
# src dst weight
1 2 0.5
2 3
% matrix-market style comment
3 1 2.5

4 4 1
";

#[test]
fn edge_list_defaults_and_comments() {
    let edges = parse_edge_list(Cursor::new(EDGES), 1.0).unwrap();
    assert_eq!(edges, vec![(1, 2, 0.5), (2, 3, 1.0), (3, 1, 2.5), (4, 4, 1.0)]);
}

#[test]
fn malformed_lines_name_their_line_number() {
    let err = parse_edge_list(Cursor::new("1 2\n3 x\n"), 1.0).unwrap_err();
    match err {
        BspError::GraphLoad(msg) => assert!(msg.contains("line 2"), "{msg}"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        parse_edge_list(Cursor::new("7\n"), 1.0),
        Err(BspError::GraphLoad(_))
    ));
}

#[test]
fn vertex_list_ignores_extra_columns() {
    let got = parse_vertex_list(Cursor::new("5 label\n# skip\n6\n")).unwrap();
    assert_eq!(got, vec![5, 6]);
}

#[test]
fn undirected_load_covers_every_vertex_once() {
    let frags = load_fragments(
        Cursor::new(EDGES),
        Some(&[9]),
        HashPartitioner::new(2),
        &LoadGraphSpec::default(),
    )
    .unwrap();
    assert_eq!(frags.len(), 2);

    let mut inner: Vec<u64> = frags
        .iter()
        .flat_map(|f| f.inner_vertices().iter().map(move |v| f.get_id(v)))
        .collect();
    inner.sort_unstable();
    assert_eq!(inner, vec![1, 2, 3, 4, 9]);

    for f in &frags {
        assert!(f.validate_invariants().is_ok());
        for v in f.inner_vertices() {
            assert_eq!(f.owner_of(v), f.fid());
            assert_eq!(f.outgoing_adj(v), f.incoming_adj(v));
        }
        for v in f.outer_vertices() {
            assert_ne!(f.owner_of(v), f.fid());
        }
    }
}

#[test]
fn ghost_gids_resolve_on_the_owner() {
    let frags = load_fragments(
        Cursor::new(EDGES),
        None,
        HashPartitioner::new(3),
        &LoadGraphSpec::default(),
    )
    .unwrap();
    for f in &frags {
        for v in f.outer_vertices() {
            let owner = &frags[f.owner_of(v)];
            let there = owner.gid_to_vertex(f.get_gid(v)).unwrap();
            assert!(owner.is_inner_vertex(there));
            assert_eq!(owner.get_id(there), f.get_id(v));
        }
    }
}

#[test]
fn single_fragment_load_matches_full_load() {
    let spec = LoadGraphSpec {
        directed: true,
        load_strategy: LoadStrategy::OnlyOut,
        default_weight: 3.0,
    };
    let all = load_fragments(Cursor::new(EDGES), None, HashPartitioner::new(2), &spec).unwrap();
    let one = load_fragment(Cursor::new(EDGES), None, HashPartitioner::new(2), &spec, 1).unwrap();
    assert_eq!(one.vertices(), all[1].vertices());
    assert_eq!(one.load_strategy(), LoadStrategy::OnlyOut);
    for v in one.inner_vertices() {
        assert_eq!(one.get_id(v), all[1].get_id(v));
        assert_eq!(one.outgoing_adj(v), all[1].outgoing_adj(v));
    }
    // 2 -> 3 had no weight column; 2 lives on fragment 0
    let f0 = &all[0];
    let two = f0.oid_to_vertex(2).unwrap();
    let weights: Vec<(u64, f64)> = f0
        .outgoing_adj(two)
        .iter()
        .map(|n| (f0.get_id(n.neighbor), n.data))
        .collect();
    assert_eq!(weights, vec![(3, 3.0)]);
}

#[test]
fn spec_deserializes_with_serde() {
    let spec: LoadGraphSpec =
        serde_json::from_str(r#"{"directed":true,"load_strategy":"OnlyIn","default_weight":2.0}"#).unwrap();
    assert_eq!(spec.load_strategy, LoadStrategy::OnlyIn);
    assert!(spec.directed);
}
