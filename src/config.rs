// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::provider::{DEFAULT_ENDPOINTS, DEFAULT_TIMEOUT_SECS};
use crate::RetryPolicy;

/// Default search radius of the shortest path engine, in meters.
pub const DEFAULT_MAX_DISTANCE: f64 = 50_000.0;

/// How distances between demand points and opportunities are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Method {
    /// Straight-line distance on the WGS84 ellipsoid.
    #[default]
    Geodesic,

    /// Shortest path over the drivable street network.
    Network,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "geodesic" => Ok(Self::Geodesic),
            "network" | "pandana_real_distance" => Ok(Self::Network),
            _ => Err(format!("invalid method {s:?}, use \"geodesic\" or \"network\"")),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geodesic => write!(f, "geodesic"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Per-request controls of [NetworkMatrixBuilder](crate::NetworkMatrixBuilder).
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Name of the area (e.g. a city), used for the cache key.
    /// Without a name, the street network is never cached.
    pub area_name: Option<String>,

    /// Search radius of the shortest path engine, in meters.
    /// Opportunities further away are reported as missing.
    pub max_distance: f64,

    /// Number of worker threads. 0 uses all available cores;
    /// larger values are capped at the number of available cores.
    pub num_threads: usize,

    /// Points further than this many meters from the nearest graph node are unmapped.
    pub max_snap_distance: Option<f64>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            area_name: None,
            max_distance: DEFAULT_MAX_DISTANCE,
            num_threads: 0,
            max_snap_distance: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Process-wide configuration, loadable from a JSON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overpass API endpoints, tried in order.
    pub endpoints: Vec<String>,

    /// HTTP and Overpass query timeout, in seconds.
    pub timeout_secs: u64,

    /// Local OSM extract to use instead of the Overpass API.
    pub osm_file: Option<PathBuf>,

    pub cache_dir: PathBuf,
    pub retry: RetryPolicy,
    pub max_distance: f64,
    pub num_threads: usize,
    pub max_snap_distance: Option<f64>,
    pub k: usize,
    pub method: Method,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            osm_file: None,
            cache_dir: PathBuf::from("cache"),
            retry: RetryPolicy::default(),
            max_distance: DEFAULT_MAX_DISTANCE,
            num_threads: 0,
            max_snap_distance: None,
            k: 1,
            method: Method::default(),
        }
    }
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let f = io::BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(f)?)
    }

    /// Creates [BuildOptions] for a request in the provided area.
    pub fn build_options(&self, area_name: Option<String>) -> BuildOptions {
        BuildOptions {
            area_name,
            max_distance: self.max_distance,
            num_threads: self.num_threads,
            max_snap_distance: self.max_snap_distance,
        }
    }
}
