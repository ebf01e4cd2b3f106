// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use demand_allocator::{
    allocate_demands, geodesic_matrix, Acquirer, DemandPoint, GraphCache, Method,
    NetworkMatrixBuilder, OpportunityPoint, Settings,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
#[error("{0}: {1}")]
struct InputError(PathBuf, #[source] csv::Error);

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// CSV file with demand points (columns: id, lon, lat)
    #[arg(long)]
    demands: PathBuf,

    /// CSV file with opportunities (columns: name, lon, lat)
    #[arg(long)]
    opportunities: PathBuf,

    /// Distance measure: geodesic or network
    #[arg(long)]
    method: Option<Method>,

    /// Number of nearest opportunities for every demand point
    #[arg(short)]
    k: Option<usize>,

    /// Name of the area, used to cache the street network
    #[arg(long)]
    area_name: Option<String>,

    /// Search radius over the street network, in meters
    #[arg(long)]
    max_distance: Option<f64>,

    /// Drop points further than this many meters from the street network
    #[arg(long)]
    max_snap_distance: Option<f64>,

    /// Number of worker threads (0 for all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Directory with cached street networks
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Local OSM extract (.osm, .osm.gz or .osm.bz2) to use instead of the Overpass API
    #[arg(long)]
    osm_file: Option<PathBuf>,

    /// JSON file with settings; flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the distance matrix instead of the allocation
    #[arg(long)]
    matrix: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings, Box<dyn Error>> {
        let mut s = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(method) = self.method {
            s.method = method;
        }
        if let Some(k) = self.k {
            s.k = k;
        }
        if let Some(max_distance) = self.max_distance {
            s.max_distance = max_distance;
        }
        if self.max_snap_distance.is_some() {
            s.max_snap_distance = self.max_snap_distance;
        }
        if let Some(threads) = self.threads {
            s.num_threads = threads;
        }
        if let Some(cache_dir) = &self.cache_dir {
            s.cache_dir = cache_dir.clone();
        }
        if self.osm_file.is_some() {
            s.osm_file = self.osm_file.clone();
        }

        Ok(s)
    }
}

#[derive(Deserialize)]
struct DemandRow {
    id: String,
    lon: f64,
    lat: f64,
}

#[derive(Deserialize)]
struct OpportunityRow {
    name: String,
    lon: f64,
    lat: f64,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();
    let settings = cli.settings()?;

    let demands: Vec<DemandPoint> = read_rows(&cli.demands)?
        .into_iter()
        .map(|r: DemandRow| DemandPoint::new(r.id, r.lon, r.lat))
        .collect();
    let opportunities: Vec<OpportunityPoint> = read_rows(&cli.opportunities)?
        .into_iter()
        .map(|r: OpportunityRow| OpportunityPoint::new(r.name, r.lon, r.lat))
        .collect();

    let acquirer = Acquirer::from_settings(&settings)?;
    let cache = GraphCache::new(&settings.cache_dir);
    let options = settings.build_options(cli.area_name.clone());
    let builder = NetworkMatrixBuilder::new(&acquirer, options).with_cache(&cache);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if cli.matrix {
        let m = match settings.method {
            Method::Geodesic => geodesic_matrix(&demands, &opportunities)?,
            Method::Network => builder.build(&demands, &opportunities)?,
        };
        serde_json::to_writer_pretty(&mut out, &m)?;
    } else {
        let result = allocate_demands(
            settings.method,
            settings.k,
            &demands,
            &opportunities,
            &builder,
        )?;
        serde_json::to_writer_pretty(&mut out, &result)?;
    }

    writeln!(out)?;
    Ok(())
}

fn read_rows<T, P>(path: P) -> Result<Vec<T>, InputError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .and_then(|mut r| r.deserialize().collect())
        .map_err(|e| InputError(path.to_path_buf(), e))
}
