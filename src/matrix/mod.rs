// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::{geodesic_distance, DemandPoint, Error, OpportunityPoint};

mod builder;

pub use builder::NetworkMatrixBuilder;

/// Numbers of input points removed before computing distances, because they
/// could not be mapped onto the street network or had invalid coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Dropped {
    pub demands: usize,
    pub opportunities: usize,
}

impl Dropped {
    pub fn is_empty(&self) -> bool {
        self.demands == 0 && self.opportunities == 0
    }
}

/// Distances (in kilometers) between every retained demand point (rows)
/// and every retained opportunity (columns), both in input order.
///
/// Missing cells (e.g. opportunities unreachable within the search radius)
/// are stored as `NaN` and reported as `None` by the accessors.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    demands: Vec<DemandPoint>,
    opportunities: Vec<OpportunityPoint>,
    values: Vec<f64>,
    rows: HashMap<String, usize>,
    dropped: Dropped,
}

impl DistanceMatrix {
    pub(crate) fn new(
        demands: Vec<DemandPoint>,
        opportunities: Vec<OpportunityPoint>,
        values: Vec<f64>,
        dropped: Dropped,
    ) -> Self {
        debug_assert_eq!(values.len(), demands.len() * opportunities.len());
        let rows = demands
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        Self {
            demands,
            opportunities,
            values,
            rows,
            dropped,
        }
    }

    pub fn demands(&self) -> &[DemandPoint] {
        &self.demands
    }

    pub fn opportunities(&self) -> &[OpportunityPoint] {
        &self.opportunities
    }

    /// Returns the number of rows (demands) and columns (opportunities).
    pub fn shape(&self) -> (usize, usize) {
        (self.demands.len(), self.opportunities.len())
    }

    pub fn dropped(&self) -> Dropped {
        self.dropped
    }

    /// Raw row-major values, with `NaN` marking missing cells.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let cols = self.opportunities.len();
        &self.values[row * cols..(row + 1) * cols]
    }

    /// Returns the row index of a demand point.
    pub fn row_of(&self, demand_id: &str) -> Option<usize> {
        self.rows.get(demand_id).copied()
    }

    /// Returns the distance in a specific cell, or `None` if the cell is missing
    /// or out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.demands.len() || col >= self.opportunities.len() {
            return None;
        }
        let v = self.values[row * self.opportunities.len() + col];
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }

    /// Looks up the distance between a demand point and an opportunity.
    /// Duplicate opportunity names resolve to the first occurrence.
    pub fn distance(&self, demand_id: &str, opportunity_name: &str) -> Option<f64> {
        let row = self.row_of(demand_id)?;
        let col = self
            .opportunities
            .iter()
            .position(|o| o.name == opportunity_name)?;
        self.get(row, col)
    }
}

impl Serialize for DistanceMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let distances: Vec<Vec<Option<f64>>> = (0..self.demands.len())
            .map(|r| {
                self.row(r)
                    .iter()
                    .map(|&v| if v.is_nan() { None } else { Some(v) })
                    .collect()
            })
            .collect();

        let mut s = serializer.serialize_struct("DistanceMatrix", 4)?;
        s.serialize_field(
            "demands",
            &self.demands.iter().map(|d| &d.id).collect::<Vec<_>>(),
        )?;
        s.serialize_field(
            "opportunities",
            &self.opportunities.iter().map(|o| &o.name).collect::<Vec<_>>(),
        )?;
        s.serialize_field("distances", &distances)?;
        s.serialize_field("dropped", &self.dropped)?;
        s.end()
    }
}

/// Checks that both point sets are non-empty, that all coordinates are valid,
/// and that demand ids are unique.
pub(crate) fn validate(
    demands: &[DemandPoint],
    opportunities: &[OpportunityPoint],
) -> Result<(), Error> {
    if demands.is_empty() || opportunities.is_empty() {
        return Err(Error::InsufficientData {
            demands: demands.len(),
            opportunities: opportunities.len(),
        });
    }

    if let Some(d) = demands.iter().find(|d| !d.point.is_valid()) {
        return Err(Error::InvalidInput(format!(
            "demand point {:?} has invalid coordinates ({}, {})",
            d.id, d.point.lon, d.point.lat
        )));
    }

    if let Some(o) = opportunities.iter().find(|o| !o.point.is_valid()) {
        return Err(Error::InvalidInput(format!(
            "opportunity {:?} has invalid coordinates ({}, {})",
            o.name, o.point.lon, o.point.lat
        )));
    }

    let mut seen = HashSet::with_capacity(demands.len());
    if let Some(d) = demands.iter().find(|d| !seen.insert(d.id.as_str())) {
        return Err(Error::InvalidInput(format!(
            "duplicate demand point id {:?}",
            d.id
        )));
    }

    Ok(())
}

/// Replaces zero distances between points with different coordinates by their
/// geodesic distance. Such zeros come from both points snapping onto the same node.
///
/// Returns the number of replaced cells.
pub(crate) fn fill_zero_distances(
    values: &mut [f64],
    demands: &[DemandPoint],
    opportunities: &[OpportunityPoint],
) -> usize {
    let cols = opportunities.len();
    let flagged: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|&(i, &v)| v == 0.0 && demands[i / cols].point != opportunities[i % cols].point)
        .map(|(i, _)| i)
        .collect();

    for &i in &flagged {
        values[i] = geodesic_distance(demands[i / cols].point, opportunities[i % cols].point);
    }

    flagged.len()
}

/// Computes the full demand × opportunity matrix of [geodesic distances](geodesic_distance),
/// without any street network.
pub fn geodesic_matrix(
    demands: &[DemandPoint],
    opportunities: &[OpportunityPoint],
) -> Result<DistanceMatrix, Error> {
    validate(demands, opportunities)?;

    let values = demands
        .iter()
        .flat_map(|d| {
            opportunities
                .iter()
                .map(move |o| geodesic_distance(d.point, o.point))
        })
        .collect();

    Ok(DistanceMatrix::new(
        demands.to_vec(),
        opportunities.to_vec(),
        values,
        Dropped::default(),
    ))
}
