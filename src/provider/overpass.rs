// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::time::Duration;

use super::{check_result, drive_options, GraphProvider, ProviderError};
use crate::osm::{self, Profile, DRIVE_PROFILE};
use crate::{BoundingBox, Graph};

/// Public Overpass API instances, tried in order.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://overpass.kumi.systems/api/interpreter",
    "https://overpass-api.de/api/interpreter",
];

/// Timeout of both the server-side query and the HTTP client, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 2500;

/// Builds an [Overpass QL](https://wiki.openstreetmap.org/wiki/Overpass_API/Overpass_QL)
/// query for all ways matching the profile within the bounding box, together with their nodes.
pub fn query(profile: &Profile<'_>, bbox: &BoundingBox, timeout_secs: u64) -> String {
    format!(
        "[out:xml][timeout:{}];(way{}({},{},{},{});>;);out;",
        timeout_secs,
        profile.overpass_filter(),
        bbox.min_lat,
        bbox.min_lon,
        bbox.max_lat,
        bbox.max_lon,
    )
}

/// Downloads the drive network from a single Overpass API endpoint.
#[derive(Debug, Clone)]
pub struct OverpassProvider {
    endpoint: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl OverpassProvider {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            timeout_secs,
            client,
        })
    }
}

impl GraphProvider for OverpassProvider {
    fn name(&self) -> &str {
        &self.endpoint
    }

    fn fetch(&self, bbox: &BoundingBox) -> Result<Graph, ProviderError> {
        let q = query(&DRIVE_PROFILE, bbox, self.timeout_secs);
        log::debug!("POST {}: {}", self.endpoint, q);

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("data", q.as_str())])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let mut g = Graph::default();
        let options = drive_options(*bbox, osm::FileFormat::Xml);
        let remarks = osm::add_features_from_io(&mut g, &options, response)?;
        check_result(g, remarks, bbox)
    }
}
