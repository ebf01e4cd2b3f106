// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use serde::Deserialize;

use crate::provider::{GraphProvider, OsmFileProvider, OverpassProvider};
use crate::{AcquisitionError, BoundingBox, Graph, Settings};

/// Controls how the area of interest grows when downloads fail,
/// or when the downloaded network does not cover all points.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Buffer (in degrees) added around the points on the first attempt.
    pub initial_buffer: f64,

    /// Multiplier applied to the buffer after every unsuccessful attempt.
    pub growth: f64,

    /// Upper bound on the buffer, in degrees.
    pub max_buffer: f64,

    /// Total number of download rounds allowed for a single request.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_buffer: 0.1,
            growth: 1.5,
            max_buffer: 1.0,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Creates a fresh [RetryBudget] for a single request.
    pub fn start(&self) -> RetryBudget {
        RetryBudget {
            attempt: 0,
            buffer: self.initial_buffer.min(self.max_buffer),
            policy: *self,
        }
    }
}

/// Retry state shared by all acquisitions within a single request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBudget {
    attempt: u32,
    buffer: f64,
    policy: RetryPolicy,
}

impl RetryBudget {
    /// Number of consumed download rounds.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Current buffer, in degrees.
    pub fn buffer(&self) -> f64 {
        self.buffer
    }

    pub fn remaining(&self) -> u32 {
        self.policy.max_attempts.saturating_sub(self.attempt)
    }

    pub fn exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Expands the buffer, never exceeding [RetryPolicy::max_buffer].
    pub fn grow(&mut self) {
        self.buffer = (self.buffer * self.policy.growth).min(self.policy.max_buffer);
    }

    fn consume(&mut self) {
        self.attempt += 1;
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Downloading,
    Retrying,
    Success(Graph),
    Failed,
}

/// Obtains a street network for an area from an ordered list of [GraphProviders](GraphProvider),
/// expanding the area after every round in which all providers failed.
pub struct Acquirer {
    providers: Vec<Box<dyn GraphProvider>>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .finish()
    }
}

impl Acquirer {
    pub fn new(providers: Vec<Box<dyn GraphProvider>>, policy: RetryPolicy) -> Self {
        Self { providers, policy }
    }

    /// Creates an acquirer using a local extract if [Settings::osm_file] is set,
    /// or all [Settings::endpoints] otherwise.
    pub fn from_settings(settings: &Settings) -> Result<Self, reqwest::Error> {
        let providers: Vec<Box<dyn GraphProvider>> = match &settings.osm_file {
            Some(path) => vec![Box::new(OsmFileProvider::new(path))],
            None => settings
                .endpoints
                .iter()
                .map(|e| {
                    OverpassProvider::new(e, settings.timeout_secs)
                        .map(|p| Box::new(p) as Box<dyn GraphProvider>)
                })
                .collect::<Result<_, _>>()?,
        };
        Ok(Self::new(providers, settings.retry))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Obtains the street network around `envelope`, buffered by the budget's current buffer.
    ///
    /// Every download round consumes one attempt from `budget`, regardless of its outcome.
    /// When every provider fails, the buffer grows and the next round starts, until the
    /// budget is exhausted.
    pub fn acquire(
        &self,
        envelope: &BoundingBox,
        budget: &mut RetryBudget,
    ) -> Result<Graph, AcquisitionError> {
        if self.providers.is_empty() {
            return Err(AcquisitionError::NoProviders);
        }

        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle if budget.exhausted() => State::Failed,
                State::Idle => State::Downloading,

                State::Downloading => {
                    let area = envelope.buffered(budget.buffer());
                    budget.consume();
                    log::info!(
                        "downloading street network for {} (attempt {}/{}, buffer {}°)",
                        area,
                        budget.attempt(),
                        self.policy.max_attempts,
                        budget.buffer(),
                    );

                    match self.download(&area) {
                        Some(g) => State::Success(g),
                        None => State::Retrying,
                    }
                }

                State::Retrying if budget.exhausted() => State::Failed,
                State::Retrying => {
                    budget.grow();
                    log::warn!(
                        "all providers failed, retrying with buffer {}°",
                        budget.buffer()
                    );
                    State::Downloading
                }

                State::Success(g) => return Ok(g),

                State::Failed => {
                    log::error!(
                        "no street network obtained after {} attempts",
                        budget.attempt()
                    );
                    return Err(AcquisitionError::Exhausted {
                        attempts: budget.attempt(),
                        buffer: budget.buffer(),
                    });
                }
            }
        }
    }

    /// Tries all providers in order, returning the first successfully fetched graph.
    fn download(&self, area: &BoundingBox) -> Option<Graph> {
        for p in &self.providers {
            match p.fetch(area) {
                Ok(g) => {
                    log::info!(
                        "{}: obtained {} nodes and {} edges",
                        p.name(),
                        g.len(),
                        g.edge_count()
                    );
                    return Some(g);
                }
                Err(e) => log::warn!("{}: {}", p.name(), e),
            }
        }
        None
    }
}
