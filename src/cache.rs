// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use geo_types::LineString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use wkt::{ToWkt, TryFromWkt};

use crate::{BoundingBox, Edge, Graph, Node};

/// Suffix of temporary files, unique across concurrent saves within the process.
static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Reasons why a cached graph could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid edge geometry: {0}")]
    Geometry(String),

    #[error("edge {0} -> {1} references an unknown node")]
    DanglingEdge(i64, i64),

    #[error("node id must not be zero")]
    ZeroNodeId,
}

/// Computes the cache key of a street network for a named area.
///
/// The key is the hex-encoded SHA-256 of the lowercase area name followed by
/// the envelope bounds, so that the same area requested with different points
/// does not reuse a network which might not cover them.
pub fn cache_key(area_name: &str, envelope: &BoundingBox) -> String {
    let mut hasher = Sha256::new();
    hasher.update(area_name.to_lowercase().as_bytes());
    hasher.update(envelope.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// On-disk store of street networks, one JSON file per key.
///
/// Files use the [node-link](https://networkx.org/documentation/stable/reference/readwrite/json_graph.html)
/// layout, with edge geometries stored as WKT.
#[derive(Debug, Clone)]
pub struct GraphCache {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeLink {
    directed: bool,
    nodes: Vec<CachedNode>,
    links: Vec<CachedLink>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedNode {
    id: i64,
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedLink {
    source: i64,
    target: i64,
    length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    geometry: Option<String>,
}

impl GraphCache {
    /// Creates a cache in the provided directory. The directory is created on the first save.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Loads a cached graph. Missing and unreadable entries are both reported as `None`.
    pub fn load(&self, key: &str) -> Option<Graph> {
        let path = self.path(key);
        if !path.exists() {
            log::info!("no cached street network at {}", path.display());
            return None;
        }

        match self.try_load(&path) {
            Ok(g) => {
                log::info!(
                    "loaded cached street network from {} ({} nodes)",
                    path.display(),
                    g.len()
                );
                Some(g)
            }
            Err(e) => {
                log::warn!("ignoring corrupted cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    fn try_load(&self, path: &Path) -> Result<Graph, CacheError> {
        let data: NodeLink = serde_json::from_reader(BufReader::new(File::open(path)?))?;

        let mut g = Graph::new();
        for n in data.nodes {
            if n.id == 0 {
                return Err(CacheError::ZeroNodeId);
            }
            g.set_node(Node {
                id: n.id,
                lat: n.y,
                lon: n.x,
            });
        }

        for l in data.links {
            if g.get_node(l.source).is_none() || g.get_node(l.target).is_none() {
                return Err(CacheError::DanglingEdge(l.source, l.target));
            }

            let geometry = l
                .geometry
                .map(|wkt| {
                    LineString::<f64>::try_from_wkt_str(&wkt)
                        .map_err(|e| CacheError::Geometry(e.to_string()))
                })
                .transpose()?;

            g.add_edge(
                l.source,
                Edge {
                    to: l.target,
                    length: l.length,
                    geometry,
                },
            );
        }

        Ok(g)
    }

    /// Stores a graph under the provided key, replacing any previous entry.
    ///
    /// The file is written to a temporary location first and then renamed,
    /// so concurrent readers never observe a partial entry.
    pub fn save(&self, key: &str, g: &Graph) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;

        let data = NodeLink {
            directed: true,
            nodes: g
                .iter()
                .map(|n| CachedNode {
                    id: n.id,
                    x: n.lon,
                    y: n.lat,
                })
                .collect(),
            links: g
                .edges()
                .filter(|(_, e)| g.get_node(e.to).is_some())
                .map(|(from, e)| CachedLink {
                    source: from,
                    target: e.to,
                    length: e.length,
                    geometry: e.geometry.as_ref().map(|l| l.wkt_string()),
                })
                .collect(),
        };

        let path = self.path(key);
        let tmp = self.dir.join(format!(
            "{key}.json.{}-{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let written = write_json(&tmp, &data)
            .and_then(|()| fs::rename(&tmp, &path).map_err(CacheError::from));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        log::info!("saved street network to {}", path.display());
        Ok(())
    }
}

fn write_json(path: &Path, data: &NodeLink) -> Result<(), CacheError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, data)?;
    writer.flush()?;
    Ok(())
}
