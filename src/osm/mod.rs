// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Conversion of [OpenStreetMap](https://www.openstreetmap.org/) data into a routable [Graph](crate::Graph).

mod profile;
mod reader;

pub use profile::{Exclusion, Profile, DRIVE_PROFILE};
pub use reader::{
    add_features_from_buffer, add_features_from_file, add_features_from_io, Error, FileFormat,
    Options,
};
