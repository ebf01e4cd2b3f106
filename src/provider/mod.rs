// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Sources of street network data.

use crate::{osm, BoundingBox, Graph};

mod file;
mod overpass;

pub use file::OsmFileProvider;
pub use overpass::{query, OverpassProvider, DEFAULT_ENDPOINTS, DEFAULT_TIMEOUT_SECS};

/// A failure of a single [GraphProvider]. Recoverable by trying another provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} responded with HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("osm: {0}")]
    Osm(#[from] osm::Error),

    /// The server reported a problem (e.g. a timeout) inside an otherwise successful response.
    #[error("server remark: {0}")]
    Remark(String),

    #[error("no drivable street network in {0}")]
    Empty(BoundingBox),
}

/// Something which can produce a drivable street network for an area.
///
/// Implementations must return the network already simplified, and must
/// not return an empty graph as a success.
pub trait GraphProvider: Send + Sync {
    /// Human-readable name used in diagnostics.
    fn name(&self) -> &str;

    fn fetch(&self, bbox: &BoundingBox) -> Result<Graph, ProviderError>;
}

/// Options used by all OSM-backed providers.
pub(crate) fn drive_options(bbox: BoundingBox, file_format: osm::FileFormat) -> osm::Options<'static> {
    osm::Options {
        profile: &osm::DRIVE_PROFILE,
        file_format,
        bbox: Some(bbox),
        simplify: true,
    }
}

/// Rejects remarks signalling an incomplete response and empty graphs.
pub(crate) fn check_result(
    g: Graph,
    remarks: Vec<String>,
    bbox: &BoundingBox,
) -> Result<Graph, ProviderError> {
    if let Some(r) = remarks.into_iter().find(|r| r.contains("runtime error")) {
        Err(ProviderError::Remark(r))
    } else if g.is_empty() {
        Err(ProviderError::Empty(*bbox))
    } else {
        Ok(g)
    }
}
