// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, BTreeSet, HashMap};

use geo_types::{Coord, LineString};

use crate::{Edge, Graph};

/// Collapsed chain of nodes, from one endpoint to another.
struct Chain {
    nodes: Vec<i64>,
    length: f64,
}

impl Graph {
    /// Removes all nodes outside of the largest
    /// [weakly connected component](https://en.wikipedia.org/wiki/Connectivity_(graph_theory)).
    ///
    /// On ties, the component containing the node with the lowest id is kept.
    pub fn retain_largest_component(&mut self) {
        let mut components = DisjointSet::default();
        for (&id, (_, edges)) in self.0.iter() {
            components.insert(id);
            for e in edges {
                if self.0.contains_key(&e.to) {
                    components.union(id, e.to);
                }
            }
        }

        let mut sizes: BTreeMap<i64, usize> = BTreeMap::default();
        let roots: Vec<(i64, i64)> = self
            .0
            .keys()
            .map(|&id| (id, components.find(id)))
            .collect();
        for &(_, root) in &roots {
            *sizes.entry(root).or_default() += 1;
        }

        // Roots are visited in the order of their lowest member id
        let mut largest: Option<(i64, usize)> = None;
        for &(_, root) in &roots {
            let size = sizes[&root];
            if largest.map_or(true, |(_, best)| size > best) {
                largest = Some((root, size));
            }
        }

        let Some((keep, size)) = largest else {
            return;
        };

        let removed = self.len() - size;
        if removed > 0 {
            log::debug!("removing {removed} nodes outside of the largest connected component");
        }

        for (id, root) in roots {
            if root != keep {
                self.delete_node(id);
            }
        }
        self.drop_dangling_edges();
    }

    /// Collapses chains of interstitial nodes into single edges, following the rules
    /// of [osmnx](https://github.com/gboeing/osmnx) `simplify_graph`.
    ///
    /// A node is an endpoint (and is kept) if it has a self-loop, if it has no incoming
    /// or no outgoing edges, or unless it has exactly two distinct neighbors and a total
    /// degree of 2 (one-way chain) or 4 (two-way chain). Every other node is interstitial
    /// and is removed; each walk between endpoints becomes a single [Edge] with the summed
    /// length and the chain's geometry.
    ///
    /// Cycles without any endpoint are left untouched.
    pub fn simplify(&mut self) {
        let endpoints = self.endpoints();
        let chains = self.chains(&endpoints);

        let mut interstitial = BTreeSet::default();
        for chain in &chains {
            interstitial.extend(chain.nodes[1..chain.nodes.len() - 1].iter().copied());
        }

        for chain in chains {
            let from = chain.nodes[0];
            let to = chain.nodes[chain.nodes.len() - 1];
            self.delete_edge(from, chain.nodes[1]);

            if from == to {
                continue;
            }

            let geometry = self.chain_geometry(&chain.nodes);
            self.add_edge(
                from,
                Edge {
                    to,
                    length: chain.length,
                    geometry,
                },
            );
        }

        log::debug!("simplification removed {} interstitial nodes", interstitial.len());
        for id in interstitial {
            self.delete_node(id);
        }
    }

    fn endpoints(&self) -> BTreeSet<i64> {
        let mut in_degree: HashMap<i64, usize> = HashMap::default();
        let mut neighbors: HashMap<i64, BTreeSet<i64>> = HashMap::default();
        let mut self_loops: BTreeSet<i64> = BTreeSet::default();

        for (from, e) in self.edges() {
            if !self.0.contains_key(&e.to) {
                continue;
            }
            if from == e.to {
                self_loops.insert(from);
            }
            *in_degree.entry(e.to).or_default() += 1;
            neighbors.entry(from).or_default().insert(e.to);
            neighbors.entry(e.to).or_default().insert(from);
        }

        self.0
            .iter()
            .filter(|&(id, (_, edges))| {
                let out = edges.iter().filter(|e| self.0.contains_key(&e.to)).count();
                let inc = in_degree.get(id).copied().unwrap_or(0);
                let distinct = neighbors.get(id).map_or(0, |n| n.len());
                let degree = out + inc;

                self_loops.contains(id)
                    || out == 0
                    || inc == 0
                    || distinct != 2
                    || !(degree == 2 || degree == 4)
            })
            .map(|(&id, _)| id)
            .collect()
    }

    fn chains(&self, endpoints: &BTreeSet<i64>) -> Vec<Chain> {
        let mut chains = Vec::default();
        for &start in endpoints {
            for first in self.get_edges(start) {
                if endpoints.contains(&first.to) || !self.0.contains_key(&first.to) {
                    continue;
                }
                if let Some(chain) = self.walk(start, first.to, endpoints) {
                    chains.push(chain);
                }
            }
        }
        chains
    }

    /// Follows interstitial nodes from `start` through `next` until reaching an endpoint.
    fn walk(&self, start: i64, next: i64, endpoints: &BTreeSet<i64>) -> Option<Chain> {
        let mut nodes = vec![start, next];
        let mut length = self.get_edge(start, next);
        let mut current = next;

        while !endpoints.contains(&current) {
            let candidates: Vec<&Edge> = self
                .get_edges(current)
                .iter()
                .filter(|e| self.0.contains_key(&e.to) && !nodes[1..].contains(&e.to))
                .collect();

            // Prefer continuing forward over returning to the start
            let step = candidates
                .iter()
                .find(|e| e.to != start)
                .or_else(|| candidates.first())?;

            length += step.length;
            nodes.push(step.to);
            current = step.to;

            if current == start {
                break;
            }
        }

        Some(Chain { nodes, length })
    }

    fn chain_geometry(&self, nodes: &[i64]) -> Option<LineString<f64>> {
        nodes
            .iter()
            .map(|&id| self.get_node(id).map(|n| Coord { x: n.lon, y: n.lat }))
            .collect::<Option<Vec<_>>>()
            .map(LineString::new)
    }

    fn drop_dangling_edges(&mut self) {
        let known: BTreeSet<i64> = self.0.keys().copied().collect();
        for (_, edges) in self.0.values_mut() {
            edges.retain(|e| known.contains(&e.to));
        }
    }
}

/// Union-find over node ids, with path compression.
#[derive(Debug, Default)]
struct DisjointSet {
    parent: HashMap<i64, i64>,
}

impl DisjointSet {
    fn insert(&mut self, id: i64) {
        self.parent.entry(id).or_insert(id);
    }

    fn find(&mut self, id: i64) -> i64 {
        let mut root = id;
        while let Some(&parent) = self.parent.get(&root) {
            if parent == root {
                break;
            }
            root = parent;
        }

        let mut current = id;
        while current != root {
            let next = self.parent.get(&current).copied().unwrap_or(root);
            self.parent.insert(current, root);
            current = next;
        }

        root
    }

    fn union(&mut self, a: i64, b: i64) {
        self.insert(a);
        self.insert(b);
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Lower id becomes the root, for determinism
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent.insert(child, root);
        }
    }
}
