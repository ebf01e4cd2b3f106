// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use rayon::prelude::*;

use super::{fill_zero_distances, validate, DistanceMatrix, Dropped};
use crate::{
    cache_key, Acquirer, BoundingBox, BuildOptions, DemandPoint, Error, Graph, GraphCache,
    OpportunityPoint, RetryBudget, ShortestPaths, SpatialIndex,
};

/// Computes street network [DistanceMatrices](DistanceMatrix).
///
/// Every call to [build](NetworkMatrixBuilder::build) obtains a street network covering
/// all points (from the cache, if one is attached and the area is named, or from the
/// [Acquirer] otherwise), snaps the points onto it and runs the shortest path searches
/// on a worker pool which only lives for the duration of the call.
#[derive(Debug, Clone)]
pub struct NetworkMatrixBuilder<'a> {
    acquirer: &'a Acquirer,
    cache: Option<&'a GraphCache>,
    options: BuildOptions,
}

/// Graph node of every input point, `None` marking unmapped points.
struct Mapping {
    demands: Vec<Option<i64>>,
    opportunities: Vec<Option<i64>>,
}

impl Mapping {
    fn unmapped(&self) -> Dropped {
        Dropped {
            demands: self.demands.iter().filter(|n| n.is_none()).count(),
            opportunities: self.opportunities.iter().filter(|n| n.is_none()).count(),
        }
    }
}

impl<'a> NetworkMatrixBuilder<'a> {
    pub fn new(acquirer: &'a Acquirer, options: BuildOptions) -> Self {
        Self {
            acquirer,
            cache: None,
            options,
        }
    }

    pub fn with_cache(mut self, cache: &'a GraphCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Computes the distances (in kilometers) between all demand points and all opportunities.
    ///
    /// Points which can't be mapped onto the street network, even after expanding the
    /// downloaded area, are removed from the result and counted in [DistanceMatrix::dropped].
    /// Zero distances between points with different coordinates are replaced by their
    /// [geodesic distance](crate::geodesic_distance).
    pub fn build(
        &self,
        demands: &[DemandPoint],
        opportunities: &[OpportunityPoint],
    ) -> Result<DistanceMatrix, Error> {
        validate(demands, opportunities)?;

        let envelope = BoundingBox::enclosing(
            demands
                .iter()
                .map(|d| d.point)
                .chain(opportunities.iter().map(|o| o.point)),
        )
        .ok_or(Error::InsufficientData {
            demands: demands.len(),
            opportunities: opportunities.len(),
        })?;

        let key = self
            .options
            .area_name
            .as_deref()
            .map(|name| cache_key(name, &envelope));
        let mut budget = self.acquirer.policy().start();

        let g = self.obtain(&envelope, key.as_deref(), &mut budget)?;
        let (g, mapping) = self.map_points(
            g,
            &envelope,
            key.as_deref(),
            &mut budget,
            demands,
            opportunities,
        );

        let dropped = mapping.unmapped();
        if !dropped.is_empty() {
            log::warn!(
                "dropping {} demand points and {} opportunities outside the street network",
                dropped.demands,
                dropped.opportunities
            );
        }

        let (demands, origins): (Vec<DemandPoint>, Vec<i64>) = demands
            .iter()
            .zip(&mapping.demands)
            .filter_map(|(d, n)| n.map(|n| (d.clone(), n)))
            .unzip();
        let (opportunities, targets): (Vec<OpportunityPoint>, Vec<i64>) = opportunities
            .iter()
            .zip(&mapping.opportunities)
            .filter_map(|(o, n)| n.map(|n| (o.clone(), n)))
            .unzip();

        if demands.is_empty() || opportunities.is_empty() {
            return Err(Error::InsufficientData {
                demands: demands.len(),
                opportunities: opportunities.len(),
            });
        }

        let mut values = self.compute(&g, &origins, &targets)?;

        let replaced = fill_zero_distances(&mut values, &demands, &opportunities);
        if replaced > 0 {
            log::debug!("replaced {replaced} zero network distances by geodesic distances");
        }

        Ok(DistanceMatrix::new(demands, opportunities, values, dropped))
    }

    /// Loads the street network from the cache, or acquires (and caches) it.
    fn obtain(
        &self,
        envelope: &BoundingBox,
        key: Option<&str>,
        budget: &mut RetryBudget,
    ) -> Result<Graph, Error> {
        if let (Some(key), Some(cache)) = (key, self.cache) {
            if let Some(g) = cache.load(key) {
                return Ok(g);
            }
        }

        let g = self.acquirer.acquire(envelope, budget)?;
        self.store(key, &g);
        Ok(g)
    }

    fn store(&self, key: Option<&str>, g: &Graph) {
        if let (Some(key), Some(cache)) = (key, self.cache) {
            if let Err(e) = cache.save(key, g) {
                log::warn!("failed to cache the street network: {e}");
            }
        }
    }

    /// Snaps all points onto the graph, re-acquiring a wider area while some points
    /// remain unmapped and the retry budget allows it.
    fn map_points(
        &self,
        mut g: Graph,
        envelope: &BoundingBox,
        key: Option<&str>,
        budget: &mut RetryBudget,
        demands: &[DemandPoint],
        opportunities: &[OpportunityPoint],
    ) -> (Graph, Mapping) {
        loop {
            let index =
                SpatialIndex::new(&g).with_max_snap_distance(self.options.max_snap_distance);
            let mapping = Mapping {
                demands: index.nearest_nodes(demands.iter().map(|d| d.point)),
                opportunities: index.nearest_nodes(opportunities.iter().map(|o| o.point)),
            };

            let unmapped = mapping.unmapped();
            if unmapped.is_empty() || budget.exhausted() {
                return (g, mapping);
            }

            budget.grow();
            log::warn!(
                "{} demand points and {} opportunities are outside the street network, expanding the area to {}°",
                unmapped.demands,
                unmapped.opportunities,
                budget.buffer()
            );

            match self.acquirer.acquire(envelope, budget) {
                Ok(wider) => {
                    self.store(key, &wider);
                    g = wider;
                }
                Err(e) => {
                    log::warn!("keeping the previous street network: {e}");
                    return (g, mapping);
                }
            }
        }
    }

    /// Runs the shortest path searches, one row per origin, on a dedicated worker pool.
    /// Returns row-major distances in kilometers, with `NaN` for unreachable targets.
    fn compute(&self, g: &Graph, origins: &[i64], targets: &[i64]) -> Result<Vec<f64>, Error> {
        let sp = ShortestPaths::precompute(g, self.options.max_distance);
        let threads = worker_count(self.options.num_threads);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;

        log::info!(
            "computing {} × {} network distances on {} threads",
            origins.len(),
            targets.len(),
            threads
        );

        let mut values = vec![f64::NAN; origins.len() * targets.len()];
        pool.install(|| {
            values
                .par_chunks_mut(targets.len())
                .zip(origins.par_iter())
                .for_each(|(row, &origin)| {
                    for (cell, meters) in row.iter_mut().zip(sp.distances(origin, targets)) {
                        *cell = if meters.is_finite() {
                            meters / 1000.0
                        } else {
                            f64::NAN
                        };
                    }
                });
        });

        Ok(values)
    }
}

/// 0 means all available cores; larger requests are capped at the available cores.
fn worker_count(requested: usize) -> usize {
    let cores = num_cpus::get().max(1);
    if requested == 0 {
        cores
    } else {
        requested.min(cores)
    }
}
