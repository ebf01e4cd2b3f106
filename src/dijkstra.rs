// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::Graph;

#[derive(Debug, Clone, Copy)]
struct QueueItem {
    at: usize,
    cost: f64,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // NOTE: We revert the order of comparison,
        // as lower costs are considered better ("higher"),
        // and Rust's BinaryHeap is a max-heap.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.at.cmp(&self.at))
    }
}

/// Street network prepared for many one-to-many shortest path queries.
///
/// Nodes are re-indexed densely and edges are stored in a
/// [compressed sparse row](https://en.wikipedia.org/wiki/Sparse_matrix#Compressed_sparse_row_(CSR,_CRS_or_Yale_format))
/// layout, which is immutable and can be shared between threads.
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    index: HashMap<i64, usize>,
    offsets: Vec<usize>,
    targets: Vec<usize>,
    lengths: Vec<f64>,
    max_distance: f64,
}

impl ShortestPaths {
    /// Prepares the graph for queries. Paths longer than `max_distance`
    /// (in meters) are never explored.
    pub fn precompute(g: &Graph, max_distance: f64) -> Self {
        let index: HashMap<i64, usize> = g.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        let mut offsets = Vec::with_capacity(g.len() + 1);
        let mut targets = Vec::with_capacity(g.edge_count());
        let mut lengths = Vec::with_capacity(g.edge_count());

        offsets.push(0);
        for n in g.iter() {
            for e in g.get_edges(n.id) {
                if let Some(&to) = index.get(&e.to) {
                    targets.push(to);
                    lengths.push(e.length);
                }
            }
            offsets.push(targets.len());
        }

        log::debug!(
            "prepared {} nodes and {} edges for shortest path queries",
            index.len(),
            targets.len()
        );

        Self {
            index,
            offsets,
            targets,
            lengths,
            max_distance,
        }
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Computes the lengths (in meters) of the shortest paths from `origin` to every
    /// one of `targets`, using [Dijkstra's algorithm](https://en.wikipedia.org/wiki/Dijkstra%27s_algorithm).
    ///
    /// Unknown nodes and targets further than [max_distance](ShortestPaths::max_distance)
    /// get [f64::INFINITY].
    pub fn distances(&self, origin: i64, targets: &[i64]) -> Vec<f64> {
        let Some(&start) = self.index.get(&origin) else {
            return vec![f64::INFINITY; targets.len()];
        };

        let mut remaining: HashSet<usize> = targets
            .iter()
            .filter_map(|t| self.index.get(t).copied())
            .collect();

        let mut dist = vec![f64::INFINITY; self.offsets.len() - 1];
        let mut queue: BinaryHeap<QueueItem> = BinaryHeap::default();
        dist[start] = 0.0;
        queue.push(QueueItem { at: start, cost: 0.0 });

        while let Some(item) = queue.pop() {
            if item.cost > dist[item.at] {
                continue;
            }

            if remaining.remove(&item.at) && remaining.is_empty() {
                break;
            }

            for e in self.offsets[item.at]..self.offsets[item.at + 1] {
                let to = self.targets[e];
                let cost = item.cost + self.lengths[e];
                if cost <= self.max_distance && cost < dist[to] {
                    dist[to] = cost;
                    queue.push(QueueItem { at: to, cost });
                }
            }
        }

        targets
            .iter()
            .map(|t| {
                self.index
                    .get(t)
                    .map_or(f64::INFINITY, |&i| dist[i])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Edge, Node};

    fn two_way(g: &mut Graph, a: i64, b: i64, length: f64) {
        g.set_edge(a, Edge::new(b, length));
        g.set_edge(b, Edge::new(a, length));
    }

    //   1 ──100── 2 ──100── 3
    //   │                   │
    //  500                 100
    //   │                   │
    //   4 ───────500─────── 5 ──→ 6 (one-way, 50)
    //
    //   7 (isolated)
    fn sample_graph() -> Graph {
        let mut g = Graph::new();
        for id in 1..=7 {
            g.set_node(Node {
                id,
                lat: 0.0,
                lon: id as f64 * 0.001,
            });
        }
        two_way(&mut g, 1, 2, 100.0);
        two_way(&mut g, 2, 3, 100.0);
        two_way(&mut g, 1, 4, 500.0);
        two_way(&mut g, 3, 5, 100.0);
        two_way(&mut g, 4, 5, 500.0);
        g.set_edge(5, Edge::new(6, 50.0));
        g.set_edge(5, Edge::new(99, 1.0)); // edge to an unknown node
        g
    }

    #[test]
    fn shortest_distances() {
        let sp = ShortestPaths::precompute(&sample_graph(), 10_000.0);
        assert_eq!(
            sp.distances(1, &[1, 2, 3, 4, 5, 6]),
            vec![0.0, 100.0, 200.0, 500.0, 300.0, 350.0],
        );
        assert_eq!(sp.distances(4, &[5, 3]), vec![500.0, 600.0]);
    }

    #[test]
    fn one_way_and_unreachable() {
        let sp = ShortestPaths::precompute(&sample_graph(), 10_000.0);
        let d = sp.distances(6, &[5, 7, 99, 6]);
        assert!(d[0].is_infinite());
        assert!(d[1].is_infinite());
        assert!(d[2].is_infinite());
        assert_eq!(d[3], 0.0);

        assert!(sp.distances(99, &[1])[0].is_infinite());
    }

    #[test]
    fn bounded_by_max_distance() {
        let sp = ShortestPaths::precompute(&sample_graph(), 300.0);
        let d = sp.distances(1, &[3, 5, 6, 4]);
        assert_eq!(d[0], 200.0);
        assert_eq!(d[1], 300.0);
        assert!(d[2].is_infinite());
        assert!(d[3].is_infinite());
    }

    #[test]
    fn deterministic() {
        let sp = ShortestPaths::precompute(&sample_graph(), 10_000.0);
        let a = sp.distances(4, &[1, 2, 3, 5, 6]);
        let b = sp.distances(4, &[1, 2, 3, 5, 6]);
        assert_eq!(
            a.iter().map(|x| x.to_bits()).collect::<Vec<_>>(),
            b.iter().map(|x| x.to_bits()).collect::<Vec<_>>(),
        );
    }
}
