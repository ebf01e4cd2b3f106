// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::Node;
use std::collections::HashMap;

/// Represents an [OSM way](https://wiki.openstreetmap.org/wiki/Way).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Way {
    pub nodes: Vec<i64>,
    pub tags: HashMap<String, String>,
}

/// Union over the [OSM elements](https://wiki.openstreetmap.org/wiki/Elements)
/// relevant for street networks.
///
/// [Overpass API](https://wiki.openstreetmap.org/wiki/Overpass_API) responses
/// may additionally carry a `<remark>` element with diagnostics, which usually
/// indicates the response is truncated.
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Node(Node),
    Way(Way),
    Remark(String),
}
