//! Undirected weighted graphs, Louvain community detection and modularity.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::{Error, Result};

/// Gains below this are treated as no improvement.
const MIN_GAIN: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedGraph {
    /// Neighbours of each node, self excluded.
    neighbors: Vec<Vec<(usize, f64)>>,
    /// Self-loop weight of each node.
    loops: Vec<f64>,
}

impl WeightedGraph {
    pub fn with_nodes(n: usize) -> Self {
        Self {
            neighbors: vec![Vec::new(); n],
            loops: vec![0.0; n],
        }
    }

    /// Undirected graph of a symmetric matrix; only the upper triangle is
    /// read and zero cells are not edges.
    pub fn from_symmetric(matrix: &Array2<f64>) -> Self {
        let n = matrix.nrows().min(matrix.ncols());
        let mut graph = Self::with_nodes(n);
        for i in 0..n {
            for j in i..n {
                let w = matrix[[i, j]];
                if w != 0.0 {
                    graph.add_edge(i, j, w);
                }
            }
        }
        graph
    }

    pub fn add_edge(&mut self, a: usize, b: usize, weight: f64) {
        if a == b {
            self.loops[a] += weight;
            return;
        }
        for (from, to) in [(a, b), (b, a)] {
            match self.neighbors[from].iter_mut().find(|(n, _)| *n == to) {
                Some((_, w)) => *w += weight,
                None => self.neighbors[from].push((to, weight)),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Weighted degree; a self-loop counts twice.
    pub fn degree(&self, node: usize) -> f64 {
        self.neighbors[node].iter().map(|(_, w)| w).sum::<f64>() + 2.0 * self.loops[node]
    }

    /// Sum of all edge weights.
    pub fn total_weight(&self) -> f64 {
        (0..self.len()).map(|i| self.degree(i)).sum::<f64>() / 2.0
    }

    /// Graph of communities: intra-community weight becomes a self-loop.
    fn induced(&self, communities: &[usize], count: usize) -> Self {
        let mut between: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut graph = Self::with_nodes(count);
        for (node, edges) in self.neighbors.iter().enumerate() {
            let c = communities[node];
            graph.loops[c] += self.loops[node];
            for (other, w) in edges {
                if *other < node {
                    continue;
                }
                let d = communities[*other];
                if c == d {
                    graph.loops[c] += w;
                } else {
                    *between.entry((c.min(d), c.max(d))).or_default() += w;
                }
            }
        }
        for ((a, b), w) in between {
            graph.add_edge(a, b, w);
        }
        graph
    }
}

/// Renumbers labels to `0..k` in order of first appearance.
fn renumber(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut map = BTreeMap::new();
    let renumbered = labels
        .iter()
        .map(|l| {
            let next = map.len();
            *map.entry(*l).or_insert(next)
        })
        .collect();
    (renumbered, map.len())
}

/// One pass of local moves: each node joins the neighbouring community
/// with the largest modularity gain until nothing moves.
fn one_level(graph: &WeightedGraph, total_degree: f64) -> Vec<usize> {
    let n = graph.len();
    let degrees: Vec<f64> = (0..n).map(|i| graph.degree(i)).collect();
    let mut community: Vec<usize> = (0..n).collect();
    let mut totals = degrees.clone();

    let mut moved = true;
    while moved {
        moved = false;
        for node in 0..n {
            let k = degrees[node];
            let own = community[node];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for (other, w) in &graph.neighbors[node] {
                *links.entry(community[*other]).or_default() += w;
            }

            totals[own] -= k;
            let gain = |c: usize, totals: &[f64]| {
                links.get(&c).copied().unwrap_or(0.0) - totals[c] * k / total_degree
            };

            let mut best = own;
            let mut best_gain = gain(own, &totals);
            for c in links.keys() {
                let g = gain(*c, &totals);
                if g > best_gain + MIN_GAIN {
                    best = *c;
                    best_gain = g;
                }
            }

            totals[best] += k;
            if best != own {
                community[node] = best;
                moved = true;
            }
        }
    }

    renumber(&community).0
}

/// Louvain partition of `graph`: one community label per node.
///
/// Nodes are visited in index order, so the result is deterministic.
///
/// # Errors
///
/// [`Error::EmptyGraph`] when the graph has no weight.
pub fn louvain(graph: &WeightedGraph) -> Result<Vec<usize>> {
    let total_degree = 2.0 * graph.total_weight();
    if total_degree <= 0.0 {
        return Err(Error::EmptyGraph);
    }

    let mut partition: Vec<usize> = (0..graph.len()).collect();
    let mut current = graph.clone();
    loop {
        let level = one_level(&current, total_degree);
        let count = level.iter().max().map_or(0, |m| m + 1);
        for p in partition.iter_mut() {
            *p = level[*p];
        }
        if count == current.len() {
            break;
        }
        current = current.induced(&level, count);
    }
    Ok(partition)
}

/// Newman modularity of `partition` on `graph`.
///
/// # Errors
///
/// [`Error::EmptyGraph`] when the graph has no weight.
pub fn modularity(graph: &WeightedGraph, partition: &[usize]) -> Result<f64> {
    let m = graph.total_weight();
    if m <= 0.0 {
        return Err(Error::EmptyGraph);
    }

    let mut internal: BTreeMap<usize, f64> = BTreeMap::new();
    let mut degree: BTreeMap<usize, f64> = BTreeMap::new();
    for node in 0..graph.len() {
        let c = partition[node];
        *degree.entry(c).or_default() += graph.degree(node);
        *internal.entry(c).or_default() += graph.loops[node];
        for (other, w) in &graph.neighbors[node] {
            if *other > node && partition[*other] == c {
                *internal.entry(c).or_default() += w;
            }
        }
    }

    Ok(degree
        .iter()
        .map(|(c, d)| internal.get(c).copied().unwrap_or(0.0) / m - (d / (2.0 * m)).powi(2))
        .sum())
}

/// Modularity of the Louvain partition of `matrix + matrixᵀ`.
pub fn od_modularity(matrix: &Array2<f64>) -> Result<f64> {
    let symmetric = matrix + &matrix.t();
    let graph = WeightedGraph::from_symmetric(&symmetric);
    let partition = louvain(&graph)?;
    modularity(&graph, &partition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> WeightedGraph {
        let mut g = WeightedGraph::with_nodes(6);
        for (a, b) in [(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)] {
            g.add_edge(a, b, 1.0);
        }
        g
    }

    #[test]
    fn test_louvain_splits_two_triangles() {
        let g = two_triangles();
        let p = louvain(&g).unwrap();
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(p[3], p[4]);
        assert_eq!(p[4], p[5]);
        assert_ne!(p[0], p[3]);

        let q = modularity(&g, &p).unwrap();
        assert!((q - 2.0 * (3.0 / 7.0 - 0.25)).abs() < 1e-9, "got {q}");
    }

    #[test]
    fn test_single_community_has_zero_modularity() {
        let g = two_triangles();
        let q = modularity(&g, &[0; 6]).unwrap();
        assert!(q.abs() < 1e-12);
    }

    #[test]
    fn test_empty_graph_errors() {
        let g = WeightedGraph::with_nodes(4);
        assert!(matches!(louvain(&g), Err(Error::EmptyGraph)));
        assert!(matches!(modularity(&g, &[0, 1, 2, 3]), Err(Error::EmptyGraph)));
        assert!(od_modularity(&Array2::zeros((3, 3))).is_err());
    }

    #[test]
    fn test_od_modularity_symmetrises() {
        let mut mm = Array2::<f64>::zeros((4, 4));
        mm[[0, 1]] = 5.0;
        mm[[3, 2]] = 5.0;
        // two disconnected pairs
        let q = od_modularity(&mm).unwrap();
        assert!((q - 0.5).abs() < 1e-9, "got {q}");
    }
}
