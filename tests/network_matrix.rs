// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use demand_allocator::provider::{GraphProvider, ProviderError};
use demand_allocator::{
    allocate, allocate_demands, cache_key, earth_distance, geodesic_distance, AcquisitionError,
    Acquirer, BoundingBox, BuildOptions, DemandPoint, Edge, Error, Graph, GraphCache, Method,
    NetworkMatrixBuilder, Node, OpportunityPoint, RetryPolicy,
};

const LAT0: f64 = -8.06;
const LON0: f64 = -34.91;

/// Square grid of `n × n` nodes, `step` degrees apart, with two-way streets
/// between horizontal and vertical neighbours.
fn grid(n: i64, step: f64) -> Graph {
    let id = |r: i64, c: i64| r * n + c + 1;
    let mut g = Graph::new();
    for r in 0..n {
        for c in 0..n {
            g.set_node(Node {
                id: id(r, c),
                lat: LAT0 + r as f64 * step,
                lon: LON0 + c as f64 * step,
            });
        }
    }

    for r in 0..n {
        for c in 0..n {
            let a = g.get_node(id(r, c)).unwrap();
            for (nr, nc) in [(r + 1, c), (r, c + 1)] {
                if nr < n && nc < n {
                    let b = g.get_node(id(nr, nc)).unwrap();
                    let length = 1000.0 * earth_distance(a.lat, a.lon, b.lat, b.lon);
                    g.set_edge(a.id, Edge::new(b.id, length));
                    g.set_edge(b.id, Edge::new(a.id, length));
                }
            }
        }
    }
    g
}

fn at(r: i64, c: i64, step: f64) -> (f64, f64) {
    (LON0 + c as f64 * step, LAT0 + r as f64 * step)
}

fn demand(id: &str, (lon, lat): (f64, f64)) -> DemandPoint {
    DemandPoint::new(id, lon, lat)
}

fn opportunity(name: &str, (lon, lat): (f64, f64)) -> OpportunityPoint {
    OpportunityPoint::new(name, lon, lat)
}

/// Returns a fixed graph, optionally only on the first call, failing afterwards.
struct FakeProvider {
    graph: Option<Graph>,
    first_only: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeProvider {
    fn grid(n: i64, step: f64) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let p = Self {
            graph: Some(grid(n, step)),
            first_only: false,
            calls: calls.clone(),
        };
        (p, calls)
    }

    fn failing() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let p = Self {
            graph: None,
            first_only: false,
            calls: calls.clone(),
        };
        (p, calls)
    }
}

impl GraphProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn fetch(&self, bbox: &BoundingBox) -> Result<Graph, ProviderError> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.graph {
            Some(g) if previous == 0 || !self.first_only => Ok(g.clone()),
            _ => Err(ProviderError::Empty(*bbox)),
        }
    }
}

fn acquirer(p: FakeProvider) -> Acquirer {
    Acquirer::new(vec![Box::new(p)], RetryPolicy::default())
}

#[test]
fn distances_follow_the_grid() {
    let step = 0.001;
    let (p, calls) = FakeProvider::grid(5, step);
    let a = acquirer(p);

    let demands = vec![demand("a", at(0, 0, step)), demand("b", at(4, 4, step))];
    let opportunities = vec![
        opportunity("x", at(0, 3, step)),
        opportunity("y", at(2, 2, step)),
    ];

    let m = NetworkMatrixBuilder::new(&a, BuildOptions::default())
        .build(&demands, &opportunities)
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(m.shape(), (2, 2));
    assert!(m.dropped().is_empty());

    let g = grid(5, step);
    let edge = |a: i64, b: i64| g.get_edge(a, b) / 1000.0;
    let a_x = edge(1, 2) + edge(2, 3) + edge(3, 4);
    assert!((m.distance("a", "x").unwrap() - a_x).abs() < 1e-9);

    // Any monotone path between opposite corners of a 2 × 2 block has the same length,
    // up to the tiny latitude dependence of horizontal edges
    let a_y = m.distance("a", "y").unwrap();
    let b_y = m.distance("b", "y").unwrap();
    assert!((a_y - 4.0 * 0.11).abs() < 0.01, "got {a_y}");
    assert!((a_y - b_y).abs() < 1e-3, "{a_y} vs {b_y}");
}

#[test]
fn thread_count_does_not_change_results() {
    let step = 0.001;
    let demands: Vec<DemandPoint> = (0..8)
        .map(|i| demand(&format!("d{i}"), at(i % 8, (i * 3) % 8, step)))
        .collect();
    let opportunities: Vec<OpportunityPoint> = (0..5)
        .map(|i| opportunity(&format!("o{i}"), at((i * 5) % 8, i, step)))
        .collect();

    let run = |threads: usize| {
        let (p, _) = FakeProvider::grid(8, step);
        let a = acquirer(p);
        let options = BuildOptions {
            num_threads: threads,
            ..BuildOptions::default()
        };
        let m = NetworkMatrixBuilder::new(&a, options)
            .build(&demands, &opportunities)
            .unwrap();
        m.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>()
    };

    assert_eq!(run(1), run(4));
    assert_eq!(run(1), run(0));
}

#[test]
fn zero_distances_fall_back_to_geodesic() {
    let step = 0.001;
    let (p, _) = FakeProvider::grid(3, step);
    let a = acquirer(p);

    let (lon, lat) = at(0, 0, step);
    let clinic = opportunity("clinic", (lon + 0.0002, lat));
    let demands = vec![
        demand("on-node", (lon, lat)),
        demand("same-place", (lon + 0.0002, lat)),
    ];

    let m = NetworkMatrixBuilder::new(&a, BuildOptions::default())
        .build(&demands, &[clinic.clone()])
        .unwrap();

    let fallback = m.distance("on-node", "clinic").unwrap();
    assert_eq!(fallback, geodesic_distance(demands[0].point, clinic.point));
    assert!(fallback > 0.0);
    assert_eq!(m.distance("same-place", "clinic"), Some(0.0));
}

#[test]
fn far_apart_demands() {
    let step = 0.005;
    let (p, _) = FakeProvider::grid(11, step);
    let a = acquirer(p);

    let demands = vec![demand("home", at(0, 0, step)), demand("away", at(0, 9, step))];
    let opportunities = vec![opportunity("clinic", at(0, 0, step))];

    let m = NetworkMatrixBuilder::new(&a, BuildOptions::default())
        .build(&demands, &opportunities)
        .unwrap();

    assert_eq!(m.distance("home", "clinic"), Some(0.0));
    let away = m.distance("away", "clinic").unwrap();
    let straight = geodesic_distance(demands[1].point, opportunities[0].point);
    assert!(away > 4.5 && away < 5.5, "got {away}");
    assert!((away - straight).abs() / straight < 0.01);
}

#[test]
fn search_radius_limits_distances() {
    let step = 0.001;
    let (p, _) = FakeProvider::grid(10, step);
    let a = acquirer(p);
    let options = BuildOptions {
        max_distance: 500.0,
        ..BuildOptions::default()
    };

    let demands = vec![demand("a", at(0, 0, step))];
    let opportunities = vec![
        opportunity("near", at(0, 2, step)),
        opportunity("far", at(9, 9, step)),
    ];
    let m = NetworkMatrixBuilder::new(&a, options)
        .build(&demands, &opportunities)
        .unwrap();

    assert!(m.distance("a", "near").is_some());
    assert_eq!(m.distance("a", "far"), None);

    let r = allocate(&m, 2);
    assert_eq!(r.records().count(), 1);
    assert_eq!(r.nearest("a").unwrap().opportunity_id, "near");
}

#[test]
fn unmapped_points_are_dropped_after_retries() {
    let step = 0.001;
    let (p, calls) = FakeProvider::grid(5, step);
    let a = acquirer(p);

    let demands = vec![demand("a", at(0, 0, step)), demand("b", at(1, 1, step))];
    let opportunities = vec![
        opportunity("x", at(4, 4, step)),
        opportunity("elsewhere", (LON0 + 1.0, LAT0)),
    ];

    let m = NetworkMatrixBuilder::new(&a, BuildOptions::default())
        .build(&demands, &opportunities)
        .unwrap();

    // One initial download and two wider re-downloads
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(m.shape(), (2, 1));
    assert_eq!(m.dropped().opportunities, 1);
    assert_eq!(m.dropped().demands, 0);
    assert_eq!(m.distance("a", "elsewhere"), None);
}

#[test]
fn failed_reacquisition_keeps_previous_graph() {
    let step = 0.001;
    let (mut p, calls) = FakeProvider::grid(5, step);
    p.first_only = true;
    let a = acquirer(p);

    let demands = vec![demand("a", at(0, 0, step))];
    let opportunities = vec![
        opportunity("x", at(4, 4, step)),
        opportunity("elsewhere", (LON0, LAT0 - 2.0)),
    ];

    let m = NetworkMatrixBuilder::new(&a, BuildOptions::default())
        .build(&demands, &opportunities)
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(m.shape(), (1, 1));
    assert!(m.distance("a", "x").is_some());
}

#[test]
fn snap_distance_limit() {
    let step = 0.001;
    let (p, _) = FakeProvider::grid(5, step);
    let a = acquirer(p);
    let options = BuildOptions {
        max_snap_distance: Some(100.0),
        ..BuildOptions::default()
    };

    let (lon, lat) = at(0, 0, step);
    let demands = vec![demand("a", (lon, lat))];
    let opportunities = vec![
        opportunity("x", at(2, 2, step)),
        opportunity("off-grid", (lon, lat - 0.005)),
    ];

    let m = NetworkMatrixBuilder::new(&a, options)
        .build(&demands, &opportunities)
        .unwrap();
    assert_eq!(m.shape(), (1, 1));
    assert_eq!(m.dropped().opportunities, 1);
}

#[test]
fn all_opportunities_unmapped() {
    let step = 0.001;
    let (p, calls) = FakeProvider::grid(5, step);
    let a = acquirer(p);

    let demands = vec![demand("a", at(0, 0, step))];
    let opportunities = vec![opportunity("elsewhere", (LON0 + 1.0, LAT0 + 1.0))];

    let err = NetworkMatrixBuilder::new(&a, BuildOptions::default())
        .build(&demands, &opportunities)
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InsufficientData {
            demands: 1,
            opportunities: 0
        }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn network_unavailable() {
    let (p, calls) = FakeProvider::failing();
    let a = acquirer(p);

    let err = NetworkMatrixBuilder::new(&a, BuildOptions::default())
        .build(
            &[demand("a", (LON0, LAT0))],
            &[opportunity("x", (LON0 + 0.01, LAT0))],
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Acquisition(AcquisitionError::Exhausted { attempts: 3, .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn invalid_input_is_rejected_before_downloading() {
    let (p, calls) = FakeProvider::grid(3, 0.001);
    let a = acquirer(p);
    let builder = NetworkMatrixBuilder::new(&a, BuildOptions::default());
    let opportunities = vec![opportunity("x", (LON0, LAT0))];

    let duplicates = vec![demand("a", (LON0, LAT0)), demand("a", (LON0, LAT0 + 0.001))];
    assert!(matches!(
        builder.build(&duplicates, &opportunities),
        Err(Error::InvalidInput(_))
    ));

    assert!(matches!(
        builder.build(&[], &opportunities),
        Err(Error::InsufficientData { .. })
    ));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn cached_network_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GraphCache::new(dir.path());
    let step = 0.001;
    let options = BuildOptions {
        area_name: Some("Olinda".to_string()),
        ..BuildOptions::default()
    };

    let demands = vec![demand("a", at(0, 0, step)), demand("b", at(3, 1, step))];
    let opportunities = vec![opportunity("x", at(2, 4, step))];

    let (p, calls) = FakeProvider::grid(5, step);
    let a = acquirer(p);
    let builder = NetworkMatrixBuilder::new(&a, options.clone()).with_cache(&cache);
    let first = builder.build(&demands, &opportunities).unwrap();
    let second = builder.build(&demands, &opportunities).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.values(), second.values());

    let envelope = BoundingBox::enclosing(
        demands
            .iter()
            .map(|d| d.point)
            .chain(opportunities.iter().map(|o| o.point)),
    )
    .unwrap();
    assert!(cache.path(&cache_key("olinda", &envelope)).exists());

    // A cache hit doesn't need any provider
    let (p, calls) = FakeProvider::failing();
    let offline = acquirer(p);
    let third = NetworkMatrixBuilder::new(&offline, options)
        .with_cache(&cache)
        .build(&demands, &opportunities)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(first.values(), third.values());
}

#[test]
fn unnamed_areas_are_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let cache = GraphCache::new(dir.path().join("graphs"));
    let step = 0.001;

    let (p, calls) = FakeProvider::grid(3, step);
    let a = acquirer(p);
    let builder = NetworkMatrixBuilder::new(&a, BuildOptions::default()).with_cache(&cache);
    let demands = vec![demand("a", at(0, 0, step))];
    let opportunities = vec![opportunity("x", at(2, 2, step))];

    builder.build(&demands, &opportunities).unwrap();
    builder.build(&demands, &opportunities).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!dir.path().join("graphs").exists());
}

#[test]
fn method_dispatch() {
    let step = 0.001;
    let demands = vec![demand("a", at(0, 0, step)), demand("b", at(4, 4, step))];
    let opportunities = vec![
        opportunity("x", at(0, 1, step)),
        opportunity("y", at(4, 3, step)),
    ];

    let (p, calls) = FakeProvider::grid(5, step);
    let a = acquirer(p);
    let builder = NetworkMatrixBuilder::new(&a, BuildOptions::default());

    let geodesic =
        allocate_demands(Method::Geodesic, 1, &demands, &opportunities, &builder).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(geodesic.nearest("a").unwrap().opportunity_id, "x");
    assert_eq!(geodesic.nearest("b").unwrap().opportunity_id, "y");

    let network =
        allocate_demands(Method::Network, 2, &demands, &opportunities, &builder).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(network.records().count(), 4);
    assert_eq!(network.nearest("a").unwrap().opportunity_id, "x");
    assert_eq!(network.nearest("b").unwrap().opportunity_id, "y");
    assert!(network.records().all(|r| r.distance_km > 0.0));
}

#[test]
fn cache_write_failures_are_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("graphs");
    std::fs::write(&not_a_dir, b"occupied").unwrap();
    let cache = GraphCache::new(&not_a_dir);

    let step = 0.001;
    let (p, calls) = FakeProvider::grid(3, step);
    let a = acquirer(p);
    let options = BuildOptions {
        area_name: Some("Olinda".to_string()),
        ..BuildOptions::default()
    };

    let m = NetworkMatrixBuilder::new(&a, options)
        .with_cache(&cache)
        .build(
            &[demand("a", at(0, 0, step))],
            &[opportunity("x", at(0, 1, step))],
        )
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(m.distance("a", "x").unwrap() > 0.0);
    assert!(not_a_dir.is_file());
}
