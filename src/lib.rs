// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Allocation of demand points to the nearest opportunities (facilities),
//! by straight-line geodesic distance or by distance over the
//! [OpenStreetMap](https://www.openstreetmap.org/) street network.
//!
//! The street network is downloaded on demand from the Overpass API
//! (or read from a local extract), cached on disk, and turned into a
//! standard weighted directed graph. Points are snapped onto the graph
//! with a k-d tree, and a bounded Dijkstra computes the demand × opportunity
//! distance matrix in parallel.
//!
//! # Example
//!
//! ```no_run
//! use demand_allocator::{
//!     allocate, Acquirer, BuildOptions, DemandPoint, GraphCache, NetworkMatrixBuilder,
//!     OpportunityPoint, Settings,
//! };
//!
//! let settings = Settings::default();
//! let acquirer = Acquirer::from_settings(&settings).expect("failed to create HTTP client");
//! let cache = GraphCache::new(&settings.cache_dir);
//! let options = BuildOptions {
//!     area_name: Some("Olinda".to_string()),
//!     ..BuildOptions::default()
//! };
//!
//! let demands = vec![DemandPoint::new("260960705000001", -34.8553, -8.0089)];
//! let clinics = vec![OpportunityPoint::new("USF Sapucaia", -34.8612, -8.0152)];
//!
//! let matrix = NetworkMatrixBuilder::new(&acquirer, options)
//!     .with_cache(&cache)
//!     .build(&demands, &clinics)
//!     .expect("failed to build the distance matrix");
//!
//! for record in allocate(&matrix, 1).records() {
//!     println!("{} -> {}: {:.3} km", record.demand_id, record.opportunity_id, record.distance_km);
//! }
//! ```

mod acquire;
mod allocate;
mod cache;
mod config;
mod dijkstra;
mod distance;
mod error;
mod graph;
mod kd;
mod matrix;
pub mod osm;
mod point;
pub mod provider;
mod simplify;

pub use acquire::{Acquirer, RetryBudget, RetryPolicy};
pub use allocate::{
    allocate, allocate_demands, allocate_direct, AllocationResult, Assignment, DemandAllocation,
};
pub use cache::{cache_key, CacheError, GraphCache};
pub use config::{BuildOptions, ConfigError, Method, Settings, DEFAULT_MAX_DISTANCE};
pub use dijkstra::ShortestPaths;
pub use distance::{earth_distance, geodesic_distance};
pub use error::{AcquisitionError, Error};
pub use graph::Graph;
pub use kd::{KDTree, SpatialIndex, COVERAGE_TOLERANCE};
pub use matrix::{geodesic_matrix, DistanceMatrix, Dropped, NetworkMatrixBuilder};
pub use point::{BoundingBox, DemandPoint, OpportunityPoint, Point};

/// Represents an element of the [Graph], usually an OpenStreetMap node.
///
/// Nodes with `id == 0` are disallowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

impl Node {
    pub fn point(&self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

/// Represents an outgoing (one-way) connection from a specific [Node].
///
/// `length` is expressed in meters, and must be finite and not negative.
///
/// Edges created by [Graph::simplify] carry the `geometry` of the collapsed
/// chain of nodes, starting at the source node and ending at `to`.
///
/// Due to implementation details, `to` might not exist in the [Graph].
/// Users must silently ignore such edges.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub to: i64,
    pub length: f64,
    pub geometry: Option<geo_types::LineString<f64>>,
}

impl Edge {
    pub fn new(to: i64, length: f64) -> Self {
        Self {
            to,
            length,
            geometry: None,
        }
    }
}
