// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// A position in the WGS84 reference frame, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Checks that both coordinates are finite and within the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// A location with a service need, identified by a caller-supplied id
/// which must be unique within one allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandPoint {
    pub id: String,
    #[serde(flatten)]
    pub point: Point,
}

impl DemandPoint {
    pub fn new(id: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self {
            id: id.into(),
            point: Point::new(lon, lat),
        }
    }
}

/// A facility able to serve demand. Names are not guaranteed to be unique;
/// lookups by name resolve to the first occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityPoint {
    pub name: String,
    #[serde(flatten)]
    pub point: Point,
}

impl OpportunityPoint {
    pub fn new(name: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self {
            name: name.into(),
            point: Point::new(lon, lat),
        }
    }
}

/// Axis-aligned envelope in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Returns the smallest box containing all given points,
    /// or `None` if the iterator is empty.
    pub fn enclosing<I: IntoIterator<Item = Point>>(points: I) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self {
                    min_lon: p.lon,
                    min_lat: p.lat,
                    max_lon: p.lon,
                    max_lat: p.lat,
                },
                Some(b) => Self {
                    min_lon: b.min_lon.min(p.lon),
                    min_lat: b.min_lat.min(p.lat),
                    max_lon: b.max_lon.max(p.lon),
                    max_lat: b.max_lat.max(p.lat),
                },
            })
        })
    }

    /// Expands the box by `degrees` on every side, clamped to valid WGS84 ranges.
    pub fn buffered(&self, degrees: f64) -> Self {
        Self {
            min_lon: (self.min_lon - degrees).max(-180.0),
            min_lat: (self.min_lat - degrees).max(-90.0),
            max_lon: (self.max_lon + degrees).min(180.0),
            max_lat: (self.max_lat + degrees).min(90.0),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.lon >= self.min_lon && p.lon <= self.max_lon && p.lat >= self.min_lat && p.lat <= self.max_lat
    }

    /// Returns the bounds in the `[min_lon, min_lat, max_lon, max_lat]` order.
    pub fn as_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}
