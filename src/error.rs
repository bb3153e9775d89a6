//! Error types for the planner subsystems.

use std::io;

use thiserror::Error;

use crate::traits::BackendKind;

/// Why a single routing backend could not answer.
///
/// A backend failure is never fatal on its own; the cost provider treats it
/// as "this tier is unavailable" and moves on to the next one.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no route found")]
    NoRoute,

    #[error("backend not configured: {0}")]
    NotConfigured(&'static str),

    #[error("need at least 2 points, got {0}")]
    TooFewPoints(usize),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Malformed(err.to_string())
    }
}

/// Failure to produce a cost for a pair (or a tour) after trying every tier.
#[derive(Debug, Error)]
pub enum CostError {
    #[error("no routing backends configured")]
    NoBackends,

    #[error("all {attempts} backend tiers failed; last ({last_kind:?}): {last_error}")]
    AllTiersFailed {
        attempts: usize,
        last_kind: BackendKind,
        last_error: BackendError,
    },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RoadIndexError {
    #[error("road network I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("road network CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to match one commuter to a pickup point.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("route path has fewer than 2 distinct points")]
    DegeneratePath,

    #[error("commuter location is not finite")]
    InvalidLocation,
}

/// Cluster-level failure. Other clusters are unaffected.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("cost computation failed: {0}")]
    Cost(#[from] CostError),

    #[error("cluster {0} planning was cancelled")]
    Cancelled(usize),

    #[error("matrix worker pool could not be built: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum OsrmDataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    ProcessFailure(String),
}
