//! Undirected node graph of the drivable network.
//!
//! Ways are node-id sequences. Two nodes are neighbours when they appear
//! consecutively in any way, regardless of direction or `oneway`, so a
//! two-way street contributes a single edge.

use std::collections::{BTreeSet, HashMap};

/// Minimum number of distinct neighbours for a node to count as an
/// intersection.
pub const INTERSECTION_MIN_DEGREE: usize = 3;

/// The drivable network as node-id sequences plus an adjacency map.
#[derive(Debug, Clone, Default)]
pub struct RoadGraph {
    ways: Vec<Vec<i64>>,
    neighbours: HashMap<i64, BTreeSet<i64>>,
}

impl RoadGraph {
    /// Builds the graph. Repeated consecutive refs are collapsed and ways
    /// left with fewer than two nodes are dropped.
    #[must_use]
    pub fn new(ways: Vec<Vec<i64>>) -> Self {
        let mut kept = Vec::with_capacity(ways.len());
        let mut neighbours: HashMap<i64, BTreeSet<i64>> = HashMap::new();

        for mut way in ways {
            way.dedup();
            if way.len() < 2 {
                continue;
            }
            for pair in way.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                neighbours.entry(a).or_default().insert(b);
                neighbours.entry(b).or_default().insert(a);
            }
            kept.push(way);
        }

        Self {
            ways: kept,
            neighbours,
        }
    }

    /// Number of ways kept in the graph.
    #[must_use]
    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    /// Number of distinct nodes referenced by the kept ways.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.neighbours.len()
    }

    /// Number of distinct neighbours of `node`.
    #[must_use]
    pub fn degree(&self, node: i64) -> usize {
        self.neighbours.get(&node).map_or(0, BTreeSet::len)
    }

    /// Nodes with at least `min_degree` distinct neighbours.
    #[must_use]
    pub fn intersections(&self, min_degree: usize) -> BTreeSet<i64> {
        self.neighbours
            .iter()
            .filter(|(_, n)| n.len() >= min_degree)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Splits every way at the given nodes.
    ///
    /// Each returned edge starts and ends at a way endpoint or a split
    /// node, and consecutive edges of one way share their split node.
    #[must_use]
    pub fn split_edges(&self, split_at: &BTreeSet<i64>) -> Vec<Vec<i64>> {
        let mut edges = Vec::new();
        for way in &self.ways {
            let mut current = vec![way[0]];
            for &node in &way[1..] {
                current.push(node);
                if split_at.contains(&node) {
                    edges.push(std::mem::replace(&mut current, vec![node]));
                }
            }
            if current.len() >= 2 {
                edges.push(current);
            }
        }
        edges
    }
}
