// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

/// Describes which OSM ways form a street network, and how to traverse them.
///
/// The same description is used twice: to build the Overpass query
/// ([Profile::overpass_filter]) and to re-check every way client-side
/// ([Profile::is_routable]), so that local extracts and Overpass responses
/// produce identical graphs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile<'a> {
    /// Human readable name of the network type.
    pub name: &'a str,

    /// Key which must be present on every routable way, e.g. "highway".
    pub way_key: &'a str,

    /// Ways with any of these key-value pairs are not routable.
    pub exclusions: &'a [Exclusion<'a>],

    /// Array of OSM [access tags](https://wiki.openstreetmap.org/wiki/Key:access#Land-based_transportation)
    /// (in order from least to most specific), used to find mode-specific one-way tags
    /// (see [Profile::way_direction]).
    pub access: &'a [&'a str],
}

/// Set of disallowed values under a specific key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exclusion<'a> {
    pub key: &'a str,
    pub values: &'a [&'a str],
}

impl Exclusion<'_> {
    fn matches(&self, tags: &HashMap<String, String>) -> bool {
        tags.get(self.key)
            .is_some_and(|v| self.values.contains(&v.as_str()))
    }
}

impl<'a> Profile<'a> {
    /// Checks if a way with the provided tags belongs to the network.
    pub fn is_routable(&self, tags: &HashMap<String, String>) -> bool {
        tags.contains_key(self.way_key) && !self.exclusions.iter().any(|e| e.matches(tags))
    }

    /// Checks if a way is traversable forward (first return value) and
    /// backwards (second return value) by investigating mode-specific and generic one-way tags.
    ///
    /// Some ways (highway=motorway, highway=motorway_link, junction=roundabout and
    /// junction=circular) default to being one-way, except if overridden by specific tags.
    pub fn way_direction(&self, tags: &HashMap<String, String>) -> (bool, bool) {
        let mut forward = true;
        let mut backward = !matches!(
            tags.get("highway").map(|s| s.as_str()),
            Some("motorway" | "motorway_link")
        ) && !matches!(
            tags.get("junction").map(|s| s.as_str()),
            Some("roundabout" | "circular")
        );

        match self.get_active_oneway_value(tags) {
            "yes" | "true" | "1" => {
                forward = true;
                backward = false;
            }

            "-1" | "reverse" => {
                forward = false;
                backward = true;
            }

            "no" | "false" | "0" => {
                forward = true;
                backward = true;
            }

            _ => {}
        }

        (forward, backward)
    }

    /// Returns the value of the most specific "oneway:MODE" tag (based on [Profile::access]),
    /// falling back to simply "oneway", and returning an empty string if no relevant tag was found.
    fn get_active_oneway_value<'t>(&self, tags: &'t HashMap<String, String>) -> &'t str {
        self.access
            .iter()
            .rev()
            .filter(|&&mode| mode != "access")
            .find_map(|&mode| tags.get(&format!("oneway:{mode}")))
            .or_else(|| tags.get("oneway"))
            .map(|v| v.as_str())
            .unwrap_or("")
    }

    /// Renders the profile as a chain of
    /// [Overpass QL tag filters](https://wiki.openstreetmap.org/wiki/Overpass_API/Overpass_QL#By_tag_(has-kv)),
    /// e.g. `["highway"]["area"!~"yes"]`.
    pub fn overpass_filter(&self) -> String {
        let mut filter = format!("[\"{}\"]", self.way_key);
        for e in self.exclusions {
            filter.push_str(&format!("[\"{}\"!~\"{}\"]", e.key, e.values.join("|")));
        }
        filter
    }
}

/// Drivable public street network, equivalent to the
/// [osmnx](https://github.com/gboeing/osmnx) "drive" network type.
pub const DRIVE_PROFILE: Profile = Profile {
    name: "drive",
    way_key: "highway",
    exclusions: &[
        Exclusion {
            key: "area",
            values: &["yes"],
        },
        Exclusion {
            key: "access",
            values: &["private"],
        },
        Exclusion {
            key: "highway",
            values: &[
                "abandoned",
                "bridleway",
                "bus_guideway",
                "construction",
                "corridor",
                "cycleway",
                "elevator",
                "escalator",
                "footway",
                "no",
                "path",
                "pedestrian",
                "planned",
                "platform",
                "proposed",
                "raceway",
                "razed",
                "service",
                "steps",
                "track",
            ],
        },
        Exclusion {
            key: "motor_vehicle",
            values: &["no"],
        },
        Exclusion {
            key: "motorcar",
            values: &["no"],
        },
        Exclusion {
            key: "service",
            values: &[
                "alley",
                "driveway",
                "emergency_access",
                "parking",
                "parking_aisle",
                "private",
            ],
        },
    ],
    access: &["access", "vehicle", "motor_vehicle", "motorcar"],
};
