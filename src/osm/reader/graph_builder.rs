// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashSet;

use crate::{earth_distance, Edge, Graph, Node};

use super::{model, Options};

/// Helper object used for storing state related to converting [OSM features](super::model::Feature)
/// into a [Graph].
pub(super) struct GraphBuilder<'a> {
    g: &'a mut Graph,
    options: &'a Options<'a>,
    unused_nodes: HashSet<i64>,
    remarks: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
    /// Create a new, empty graph builder.
    pub(super) fn new(g: &'a mut Graph, options: &'a Options<'a>) -> Self {
        Self {
            g,
            options,
            unused_nodes: HashSet::default(),
            remarks: Vec::default(),
        }
    }

    /// Add all features from the provided iterator, returning any encountered
    /// Overpass remarks.
    pub(super) fn add_features<I, E>(mut self, features: I) -> Result<Vec<String>, E>
    where
        I: IntoIterator<Item = Result<model::Feature, E>>,
    {
        for f in features {
            self.add_feature(f?);
        }
        self.cleanup();
        Ok(self.remarks)
    }

    fn cleanup(&mut self) {
        log::debug!("removing {} nodes not used by any way", self.unused_nodes.len());
        self.unused_nodes
            .iter()
            .for_each(|&id| self.g.delete_node(id));

        if self.options.simplify {
            self.g.retain_largest_component();
            self.g.simplify();
        }
    }

    fn add_feature(&mut self, f: model::Feature) {
        match f {
            model::Feature::Node(n) => self.add_node(n),
            model::Feature::Way(w) => self.add_way(w),
            model::Feature::Remark(r) => {
                log::warn!("OSM data remark: {r}");
                self.remarks.push(r);
            }
        }
    }

    fn add_node(&mut self, n: Node) {
        if self.is_in_bbox(&n) {
            self.g.set_node(n);
            self.unused_nodes.insert(n.id);
        }
    }

    fn is_in_bbox(&self, n: &Node) -> bool {
        self.options
            .bbox
            .map_or(true, |bbox| bbox.contains(n.point()))
    }

    fn add_way(&mut self, w: model::Way) {
        if !self.options.profile.is_routable(&w.tags) {
            return;
        }

        let (forward, backward) = self.options.profile.way_direction(&w.tags);

        // Ways may leave the bounding box; only connect consecutive known nodes.
        for run in w
            .nodes
            .split(|&id| self.g.get_node(id).is_none())
            .filter(|run| run.len() >= 2)
            .map(|run| run.to_vec())
            .collect::<Vec<_>>()
        {
            self.create_edges(&run, forward, backward);
            run.iter().for_each(|id| {
                self.unused_nodes.remove(id);
            });
        }
    }

    fn create_edges(&mut self, nodes: &[i64], forward: bool, backward: bool) {
        debug_assert!(nodes.len() >= 2);

        for pair in nodes.windows(2) {
            let (Some(left), Some(right)) = (self.g.get_node(pair[0]), self.g.get_node(pair[1]))
            else {
                continue;
            };

            if left.id == right.id {
                continue;
            }

            let length = 1000.0 * earth_distance(left.lat, left.lon, right.lat, right.lon);

            if forward {
                self.g.add_edge(left.id, Edge::new(right.id, length));
            }
            if backward {
                self.g.add_edge(right.id, Edge::new(left.id, length));
            }
        }
    }
}
