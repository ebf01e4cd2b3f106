// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use graph_builder::GraphBuilder;

use crate::osm::Profile;
use crate::{BoundingBox, Graph};

mod graph_builder;
mod model;
mod xml;

/// Errors which can occur when reading OSM data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Format of the input OSM file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Unknown format - guess the format based on the content
    #[default]
    Unknown,

    /// Force uncompressed [OSM XML](https://wiki.openstreetmap.org/wiki/OSM_XML)
    Xml,

    /// Force [OSM XML](https://wiki.openstreetmap.org/wiki/OSM_XML)
    /// with [gzip](https://en.wikipedia.org/wiki/Gzip) compression
    XmlGz,

    /// Force [OSM XML](https://wiki.openstreetmap.org/wiki/OSM_XML)
    /// with [bzip2](https://en.wikipedia.org/wiki/Bzip2) compression
    XmlBz2,
}

impl FileFormat {
    /// Guesses the format from the leading bytes of a file.
    fn detect(prefix: &[u8]) -> Self {
        if prefix.starts_with(&[0x1F, 0x8B]) {
            Self::XmlGz
        } else if prefix.starts_with(b"BZh") {
            Self::XmlBz2
        } else {
            Self::Xml
        }
    }
}

/// Additional controls for interpreting OSM data as a routing [Graph].
#[derive(Debug, Clone, Copy)]
pub struct Options<'a> {
    /// How OSM features should be interpreted and converted into a [Graph].
    pub profile: &'a Profile<'a>,

    /// Format of the input data.
    pub file_format: FileFormat,

    /// Only load nodes within this bounding box.
    pub bbox: Option<BoundingBox>,

    /// Keep only the largest weakly connected component and collapse
    /// chains of interstitial nodes after loading (see [Graph::simplify]).
    pub simplify: bool,
}

/// Parse OSM features from a reader into a [Graph] as per the provided [Options].
///
/// The provided stream will be automatically wrapped in a buffered reader when needed.
/// Returns all [Overpass remarks](https://dev.overpass-api.de/output_formats.html)
/// found in the data; a non-empty list usually means the response is incomplete.
pub fn add_features_from_io<R: io::Read>(
    g: &mut Graph,
    options: &Options<'_>,
    reader: R,
) -> Result<Vec<String>, Error> {
    let mut b = io::BufReader::new(reader);

    let format = match options.file_format {
        FileFormat::Unknown => FileFormat::detect(b.fill_buf()?),
        f => f,
    };

    match format {
        FileFormat::XmlGz => {
            let d = io::BufReader::new(flate2::read::MultiGzDecoder::new(b));
            Ok(GraphBuilder::new(g, options).add_features(xml::Reader::from_io(d))?)
        }

        FileFormat::XmlBz2 => {
            let d = io::BufReader::new(bzip2::read::MultiBzDecoder::new(b));
            Ok(GraphBuilder::new(g, options).add_features(xml::Reader::from_io(d))?)
        }

        FileFormat::Xml | FileFormat::Unknown => {
            Ok(GraphBuilder::new(g, options).add_features(xml::Reader::from_io(b))?)
        }
    }
}

/// Parse OSM features from a file at the provided path into a [Graph] as per the provided [Options].
pub fn add_features_from_file<P: AsRef<Path>>(
    g: &mut Graph,
    options: &Options<'_>,
    path: P,
) -> Result<Vec<String>, Error> {
    let f = File::open(path)?;
    add_features_from_io(g, options, f)
}

/// Parse OSM features from a static buffer into a [Graph] as per the provided [Options].
pub fn add_features_from_buffer(
    g: &mut Graph,
    options: &Options<'_>,
    data: &[u8],
) -> Result<Vec<String>, Error> {
    let format = match options.file_format {
        FileFormat::Unknown => FileFormat::detect(data),
        f => f,
    };

    if format == FileFormat::Xml {
        // Fast path is available for in-memory XML data
        Ok(GraphBuilder::new(g, options).add_features(xml::Reader::from_buffer(data))?)
    } else {
        add_features_from_io(g, options, io::Cursor::new(data))
    }
}
