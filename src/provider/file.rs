// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use super::{check_result, drive_options, GraphProvider, ProviderError};
use crate::osm::{self, FileFormat};
use crate::{BoundingBox, Graph};

/// Reads the drive network from a local OSM XML extract (optionally gzip or bzip2
/// compressed), clipped to the requested bounding box.
#[derive(Debug, Clone)]
pub struct OsmFileProvider {
    path: PathBuf,
    name: String,
    file_format: FileFormat,
}

impl OsmFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            file_format: FileFormat::Unknown,
        }
    }

    pub fn with_file_format(mut self, file_format: FileFormat) -> Self {
        self.file_format = file_format;
        self
    }
}

impl GraphProvider for OsmFileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, bbox: &BoundingBox) -> Result<Graph, ProviderError> {
        let mut g = Graph::default();
        let options = drive_options(*bbox, self.file_format);
        let remarks = osm::add_features_from_file(&mut g, &options, &self.path)?;
        check_result(g, remarks, bbox)
    }
}
