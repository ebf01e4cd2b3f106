// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::{earth_distance, BoundingBox, Graph, Node, Point};

/// How far (in degrees) outside the envelope of graph nodes a point
/// may lie and still be considered covered by the graph.
pub const COVERAGE_TOLERANCE: f64 = 0.01;

/// KDTree implements the [k-d tree data structure](https://en.wikipedia.org/wiki/K-d_tree),
/// which is used to snap large batches of points onto their nearest [Node].
///
/// This implementation assumes euclidean geometry when deciding which branches to prune,
/// even though distances are measured with [earth_distance]. This results in undefined
/// behavior when points are close to the ante meridian (180°/-180° longitude) or poles
/// (90°/-90° latitude), or when the data spans multiple continents.
#[derive(Debug, Clone)]
pub struct KDTree {
    pivot: Node,
    left: Option<Box<KDTree>>,
    right: Option<Box<KDTree>>,
}

impl KDTree {
    /// Finds the closest [Node] to the given position,
    /// returning it together with its distance in kilometers.
    pub fn find_nearest_node(&self, lat: f64, lon: f64) -> (Node, f64) {
        self.find_nearest_node_impl(lat, lon, false)
    }

    fn find_nearest_node_impl(&self, lat: f64, lon: f64, lon_divides: bool) -> (Node, f64) {
        let mut best = self.pivot;
        let mut best_dist = earth_distance(lat, lon, best.lat, best.lon);

        let first_left = if lon_divides {
            lon < best.lon
        } else {
            lat < best.lat
        };
        let (first, second) = if first_left {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(branch) = first {
            let (alt, alt_dist) = branch.find_nearest_node_impl(lat, lon, !lon_divides);
            if alt_dist < best_dist {
                best = alt;
                best_dist = alt_dist;
            }
        }

        if let Some(branch) = second {
            // A closer node is possible in the second branch if and only if
            // the splitting axis is closer than the current best candidate.
            let (axis_lat, axis_lon) = if lon_divides {
                (lat, self.pivot.lon)
            } else {
                (self.pivot.lat, lon)
            };

            if earth_distance(lat, lon, axis_lat, axis_lon) < best_dist {
                let (alt, alt_dist) = branch.find_nearest_node_impl(lat, lon, !lon_divides);
                if alt_dist < best_dist {
                    best = alt;
                    best_dist = alt_dist;
                }
            }
        }

        (best, best_dist)
    }

    /// Builds a k-d tree from an iterable of [Nodes](Node).
    pub fn from_iter<I: IntoIterator<Item = Node>>(nodes: I) -> Option<Self> {
        let mut nodes = nodes.into_iter().collect::<Vec<_>>();
        Self::build(nodes.as_mut_slice())
    }

    /// Builds a k-d tree from a mutable slice of [Nodes](Node). Nodes will be reordered
    /// in the slice to facilitate building the tree.
    pub fn build(nodes: &mut [Node]) -> Option<Self> {
        Self::build_impl(nodes, false)
    }

    fn build_impl(nodes: &mut [Node], lon_divides: bool) -> Option<Self> {
        match nodes.len() {
            0 => None,
            1 => Some(Self {
                pivot: nodes[0],
                left: None,
                right: None,
            }),
            _ => {
                if lon_divides {
                    nodes.sort_by(|a, b| a.lon.total_cmp(&b.lon).then(a.id.cmp(&b.id)));
                } else {
                    nodes.sort_by(|a, b| a.lat.total_cmp(&b.lat).then(a.id.cmp(&b.id)));
                }
                let median = nodes.len() / 2;
                let pivot = nodes[median];
                let (left, right_and_pivot) = nodes.split_at_mut(median);
                let right = &mut right_and_pivot[1..];
                Some(Self {
                    pivot,
                    left: Self::build_impl(left, !lon_divides).map(Box::new),
                    right: Self::build_impl(right, !lon_divides).map(Box::new),
                })
            }
        }
    }
}

/// Maps arbitrary positions onto the nearest node of a [Graph].
///
/// The search itself never gives up - every position has *some* nearest node.
/// A position is reported as unmapped (`None`) only if it lies outside the graph's
/// coverage (the envelope of all nodes, buffered by [COVERAGE_TOLERANCE]), or if an
/// explicit maximum snapping distance is exceeded.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: Option<KDTree>,
    coverage: Option<BoundingBox>,
    max_snap_distance: Option<f64>,
}

impl SpatialIndex {
    pub fn new(g: &Graph) -> Self {
        Self {
            tree: KDTree::from_iter(g.iter().copied()),
            coverage: g.bounding_box().map(|b| b.buffered(COVERAGE_TOLERANCE)),
            max_snap_distance: None,
        }
    }

    /// Rejects snaps further than `meters` away from the nearest node.
    pub fn with_max_snap_distance(mut self, meters: Option<f64>) -> Self {
        self.max_snap_distance = meters;
        self
    }

    /// Returns the id of the nearest node to `p`, or `None` if `p` can't be mapped.
    pub fn nearest_node(&self, p: Point) -> Option<i64> {
        let tree = self.tree.as_ref()?;
        if !self.coverage.is_some_and(|c| c.contains(p)) {
            return None;
        }

        let (node, km) = tree.find_nearest_node(p.lat, p.lon);
        match self.max_snap_distance {
            Some(limit) if km * 1000.0 > limit => None,
            _ => Some(node.id),
        }
    }

    /// Maps every point, returning a mapping parallel to the input.
    pub fn nearest_nodes<I: IntoIterator<Item = Point>>(&self, points: I) -> Vec<Option<i64>> {
        points.into_iter().map(|p| self.nearest_node(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, lat: f64, lon: f64) -> Node {
        Node { id, lat, lon }
    }

    fn sample_nodes() -> Vec<Node> {
        vec![
            node(1, 0.01, 0.01),
            node(2, 0.01, 0.05),
            node(3, 0.03, 0.09),
            node(4, 0.04, 0.03),
            node(5, 0.04, 0.07),
            node(6, 0.07, 0.03),
            node(7, 0.07, 0.01),
            node(8, 0.08, 0.05),
            node(9, 0.08, 0.09),
        ]
    }

    #[test]
    fn kd_tree() {
        let tree = KDTree::build(&mut sample_nodes())
            .expect("k-d tree from non-empty slice must not be empty");

        assert_eq!(tree.find_nearest_node(0.02, 0.02).0.id, 1);
        assert_eq!(tree.find_nearest_node(0.05, 0.03).0.id, 4);
        assert_eq!(tree.find_nearest_node(0.05, 0.08).0.id, 5);
        assert_eq!(tree.find_nearest_node(0.09, 0.06).0.id, 8);
        assert!(KDTree::build(&mut []).is_none());
    }

    #[test]
    fn kd_tree_agrees_with_brute_force() {
        let mut g = Graph::new();
        for (i, n) in (0..400).map(|i| {
            let row = (i / 20) as f64;
            let col = (i % 20) as f64;
            // Slightly irregular grid
            node(i + 1, -8.0 + row * 0.003 + col * 0.0001, -34.9 + col * 0.004 - row * 0.0002)
        })
        .enumerate()
        {
            assert_eq!(n.id, i as i64 + 1);
            g.set_node(n);
        }

        let tree = KDTree::from_iter(g.iter().copied()).unwrap();
        for step in 0..50 {
            let lat = -8.0 + step as f64 * 0.0011;
            let lon = -34.9 + step as f64 * 0.0015;
            let expected = g.find_nearest_node(lat, lon).unwrap();
            let (got, _) = tree.find_nearest_node(lat, lon);
            assert_eq!(
                earth_distance(lat, lon, got.lat, got.lon),
                earth_distance(lat, lon, expected.lat, expected.lon),
            );
        }
    }

    #[test]
    fn spatial_index_coverage() {
        let mut g = Graph::new();
        sample_nodes().into_iter().for_each(|n| g.set_node(n));
        let index = SpatialIndex::new(&g);

        assert_eq!(index.nearest_node(Point::new(0.02, 0.02)), Some(1));
        // Slightly outside the envelope, but within the tolerance
        assert_eq!(index.nearest_node(Point::new(0.005, 0.005)), Some(1));
        // Far outside the graph
        assert_eq!(index.nearest_node(Point::new(1.0, 1.0)), None);

        assert_eq!(
            index.nearest_nodes([Point::new(0.08, 0.09), Point::new(-5.0, 0.0)]),
            vec![Some(9), None],
        );
    }

    #[test]
    fn spatial_index_max_snap_distance() {
        let mut g = Graph::new();
        sample_nodes().into_iter().for_each(|n| g.set_node(n));
        let index = SpatialIndex::new(&g).with_max_snap_distance(Some(500.0));

        // ~0 m away
        assert_eq!(index.nearest_node(Point::new(0.01, 0.01)), Some(1));
        // ~1.1 km away from node 1 (and further from all others)
        assert_eq!(index.nearest_node(Point::new(0.0, 0.01)), None);
    }

    #[test]
    fn spatial_index_empty_graph() {
        let index = SpatialIndex::new(&Graph::new());
        assert_eq!(index.nearest_node(Point::new(0.0, 0.0)), None);
    }
}
