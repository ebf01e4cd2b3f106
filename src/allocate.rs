// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use serde::{Serialize, Serializer};

use crate::{
    geodesic_distance, DemandPoint, DistanceMatrix, Dropped, Error, Method, NetworkMatrixBuilder,
    OpportunityPoint,
};

/// One of the nearest opportunities of a demand point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub demand_id: String,
    pub opportunity_id: String,
    pub distance_km: f64,

    /// 1-based position of the opportunity, 1 being the nearest.
    pub rank: usize,

    pub origin_lat: f64,
    pub origin_lon: f64,
    pub destination_lat: f64,
    pub destination_lon: f64,
}

impl Assignment {
    fn new(d: &DemandPoint, o: &OpportunityPoint, distance_km: f64, rank: usize) -> Self {
        Self {
            demand_id: d.id.clone(),
            opportunity_id: o.name.clone(),
            distance_km,
            rank,
            origin_lat: d.point.lat,
            origin_lon: d.point.lon,
            destination_lat: o.point.lat,
            destination_lon: o.point.lon,
        }
    }
}

/// Nearest opportunities of a single demand point, ordered by ascending distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandAllocation {
    pub demand_id: String,
    pub neighbors: Vec<Assignment>,
}

/// Nearest opportunities of every allocated demand point.
///
/// Serializes as a flat list of [Assignments](Assignment).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationResult {
    pub allocations: Vec<DemandAllocation>,

    /// Points removed because they couldn't be located,
    /// either outside the street network or with invalid coordinates.
    pub dropped: Dropped,
}

impl AllocationResult {
    /// Iterates over all assignments, demand by demand, nearest first.
    pub fn records(&self) -> impl Iterator<Item = &Assignment> {
        self.allocations.iter().flat_map(|a| a.neighbors.iter())
    }

    /// Returns the nearest opportunity of a demand point, if it has any.
    pub fn nearest(&self, demand_id: &str) -> Option<&Assignment> {
        self.allocations
            .iter()
            .find(|a| a.demand_id == demand_id)
            .and_then(|a| a.neighbors.first())
    }
}

impl Serialize for AllocationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records())
    }
}

/// Picks the `k` nearest opportunities of every row of a [DistanceMatrix].
///
/// Missing cells are skipped, so demand points with fewer than `k` reachable
/// opportunities get fewer assignments. Equal distances keep the input order
/// of opportunities.
pub fn allocate(matrix: &DistanceMatrix, k: usize) -> AllocationResult {
    let opportunities = matrix.opportunities();
    let allocations = matrix
        .demands()
        .iter()
        .enumerate()
        .map(|(r, d)| {
            let mut candidates: Vec<(usize, f64)> = matrix
                .row(r)
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, v)| !v.is_nan())
                .collect();
            candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

            DemandAllocation {
                demand_id: d.id.clone(),
                neighbors: candidates
                    .into_iter()
                    .take(k)
                    .enumerate()
                    .map(|(i, (c, km))| Assignment::new(d, &opportunities[c], km, i + 1))
                    .collect(),
            }
        })
        .collect();

    AllocationResult {
        allocations,
        dropped: matrix.dropped(),
    }
}

/// Picks the `k` nearest opportunities of every demand point by
/// [geodesic distance](geodesic_distance), without building a [DistanceMatrix].
///
/// Points with invalid coordinates are left out and counted in [AllocationResult::dropped].
pub fn allocate_direct(
    demands: &[DemandPoint],
    opportunities: &[OpportunityPoint],
    k: usize,
) -> AllocationResult {
    let valid: Vec<OpportunityPoint> = opportunities
        .iter()
        .filter(|o| o.point.is_valid())
        .cloned()
        .collect();

    let allocations: Vec<DemandAllocation> = demands
        .iter()
        .filter(|d| d.point.is_valid())
        .map(|d| DemandAllocation {
            demand_id: d.id.clone(),
            neighbors: nearest_geodesic(d, &valid, k),
        })
        .collect();

    let dropped = Dropped {
        demands: demands.len() - allocations.len(),
        opportunities: opportunities.len() - valid.len(),
    };
    if !dropped.is_empty() {
        log::warn!(
            "skipping {} demand points and {} opportunities with invalid coordinates",
            dropped.demands,
            dropped.opportunities
        );
    }

    AllocationResult {
        allocations,
        dropped,
    }
}

fn nearest_geodesic(
    d: &DemandPoint,
    opportunities: &[OpportunityPoint],
    k: usize,
) -> Vec<Assignment> {
    if k == 0 {
        return Vec::new();
    }

    if k == 1 {
        let mut best: Option<(&OpportunityPoint, f64)> = None;
        for o in opportunities {
            let km = geodesic_distance(d.point, o.point);
            if best.map_or(true, |(_, best_km)| km < best_km) {
                best = Some((o, km));
            }
        }
        return best
            .map(|(o, km)| vec![Assignment::new(d, o, km, 1)])
            .unwrap_or_default();
    }

    let mut candidates: Vec<(&OpportunityPoint, f64)> = opportunities
        .iter()
        .map(|o| (o, geodesic_distance(d.point, o.point)))
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, (o, km))| Assignment::new(d, o, km, i + 1))
        .collect()
}

/// Allocates demand points with the requested [Method]: directly by geodesic distance,
/// or through a street network [DistanceMatrix] computed by `builder`.
pub fn allocate_demands(
    method: Method,
    k: usize,
    demands: &[DemandPoint],
    opportunities: &[OpportunityPoint],
    builder: &NetworkMatrixBuilder<'_>,
) -> Result<AllocationResult, Error> {
    log::info!(
        "allocating {} demand points to {} opportunities ({method}, k = {k})",
        demands.len(),
        opportunities.len()
    );

    match method {
        Method::Geodesic => Ok(allocate_direct(demands, opportunities, k)),
        Method::Network => Ok(allocate(&builder.build(demands, opportunities)?, k)),
    }
}
