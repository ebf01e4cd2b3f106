// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// No routable graph could be obtained from any provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcquisitionError {
    /// Every provider failed on every attempt, even with the largest buffer.
    #[error("network unavailable: no street network obtained after {attempts} attempts (last buffer {buffer}°)")]
    Exhausted { attempts: u32, buffer: f64 },

    /// The acquirer was created without any providers.
    #[error("network unavailable: no providers configured")]
    NoProviders,
}

/// Errors surfaced to callers of the allocation functions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// One of the point sets is empty, either as given,
    /// or after removing points which could not be mapped onto the street network.
    #[error("insufficient data: {demands} demand points and {opportunities} opportunities left")]
    InsufficientData { demands: usize, opportunities: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
