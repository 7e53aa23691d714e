//! Plain-text graph loading.
//!
//! Edge files hold one edge per line, `src dst [weight]`, separated by
//! whitespace. Vertex files hold one oid per line (extra columns ignored).
//! Blank lines and lines starting with `#` or `%` are skipped.

use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::bsp_error::BspError;
use crate::fragment::builder::FragmentBuilder;
use crate::fragment::edgecut::EdgecutFragment;
use crate::fragment::partitioner::Partitioner;
use crate::fragment::vertex::{Fid, Oid};
use crate::fragment::LoadStrategy;

/// How an edge list becomes fragments.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadGraphSpec {
    pub directed: bool,
    pub load_strategy: LoadStrategy,
    /// Weight used when a line has only two columns.
    pub default_weight: f64,
}

impl Default for LoadGraphSpec {
    fn default() -> Self {
        LoadGraphSpec {
            directed: false,
            load_strategy: LoadStrategy::BothOutIn,
            default_weight: 1.0,
        }
    }
}

fn is_skipped(line: &str) -> bool {
    let t = line.trim_start();
    t.is_empty() || t.starts_with('#') || t.starts_with('%')
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, lineno: usize, what: &str) -> Result<T, BspError> {
    let raw = field.ok_or_else(|| BspError::GraphLoad(format!("line {lineno}: missing {what}")))?;
    raw.parse()
        .map_err(|_| BspError::GraphLoad(format!("line {lineno}: invalid {what} `{raw}`")))
}

/// Parse `src dst [weight]` lines.
pub fn parse_edge_list<R: BufRead>(reader: R, default_weight: f64) -> Result<Vec<(Oid, Oid, f64)>, BspError> {
    let mut edges = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if is_skipped(&line) {
            continue;
        }
        let lineno = i + 1;
        let mut cols = line.split_whitespace();
        let src = parse_field(cols.next(), lineno, "source vertex")?;
        let dst = parse_field(cols.next(), lineno, "destination vertex")?;
        let weight = match cols.next() {
            Some(w) => parse_field(Some(w), lineno, "edge weight")?,
            None => default_weight,
        };
        edges.push((src, dst, weight));
    }
    log::debug!("parsed {} edges", edges.len());
    Ok(edges)
}

/// Parse one oid per line.
pub fn parse_vertex_list<R: BufRead>(reader: R) -> Result<Vec<Oid>, BspError> {
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if is_skipped(&line) {
            continue;
        }
        out.push(parse_field(line.split_whitespace().next(), i + 1, "vertex id")?);
    }
    Ok(out)
}

fn builder_for<P, R>(
    edges: R,
    vertices: Option<&[Oid]>,
    partitioner: P,
    spec: &LoadGraphSpec,
) -> Result<FragmentBuilder<f64>, BspError>
where
    P: Partitioner + 'static,
    R: BufRead,
{
    let fnum = partitioner.fnum();
    let mut builder = FragmentBuilder::<f64>::new(fnum, spec.directed)
        .with_load_strategy(spec.load_strategy);
    for (src, dst, w) in parse_edge_list(edges, spec.default_weight)? {
        builder.add_edge(src, dst, w);
    }
    for &oid in vertices.unwrap_or_default() {
        let owner = partitioner
            .partition(oid)
            .ok_or_else(|| BspError::GraphLoad(format!("vertex {oid} has no owner")))?;
        builder.add_vertex(oid, owner);
    }
    Ok(builder.with_partitioner(partitioner))
}

/// Load every fragment of a graph in one process.
pub fn load_fragments<P, R>(
    edges: R,
    vertices: Option<&[Oid]>,
    partitioner: P,
    spec: &LoadGraphSpec,
) -> Result<Vec<EdgecutFragment<f64>>, BspError>
where
    P: Partitioner + 'static,
    R: BufRead,
{
    builder_for(edges, vertices, partitioner, spec)?.build_all()
}

/// Load only fragment `fid`; every process reads the full edge list.
pub fn load_fragment<P, R>(
    edges: R,
    vertices: Option<&[Oid]>,
    partitioner: P,
    spec: &LoadGraphSpec,
    fid: Fid,
) -> Result<EdgecutFragment<f64>, BspError>
where
    P: Partitioner + 'static,
    R: BufRead,
{
    builder_for(edges, vertices, partitioner, spec)?.build(fid)
}
