//! Core seams of the planner.
//!
//! Routing services are pluggable behind [`RoutingBackend`]; pedestrian
//! distances used for pickup matching come from a [`DistanceMatrixProvider`].
//! Concrete adapters live in `osrm`, `tomtom` and `haversine`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::polyline::Polyline;

/// Which kind of data source produced a travel cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Live/historic traffic-aware routing (remote, rate-limited).
    Traffic,
    /// Road-network routing without traffic.
    RoadNetwork,
    /// Great-circle estimate at an assumed average speed.
    Geometric,
}

impl BackendKind {
    /// Short tag used in cache fingerprints.
    pub fn tag(self) -> &'static str {
        match self {
            BackendKind::Traffic => "traffic",
            BackendKind::RoadNetwork => "road",
            BackendKind::Geometric => "geo",
        }
    }
}

/// Result of routing through an ordered list of points.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteLeg {
    pub distance_m: f64,
    pub duration_s: f64,
    /// Free-flow duration, reported by traffic-aware backends only.
    pub duration_no_traffic_s: Option<f64>,
    pub polyline: Option<Polyline>,
}

/// A routing service the cost provider can fall back through.
pub trait RoutingBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether results depend on the departure time. Time-dependent results
    /// are cached per departure minute; all others per coordinates only.
    fn is_time_dependent(&self) -> bool {
        false
    }

    /// Route through `points` (lat, lng) in order.
    fn route(
        &self,
        points: &[(f64, f64)],
        departure: Option<NaiveDateTime>,
    ) -> Result<RouteLeg, BackendError>;
}

/// Provides a distance matrix (metres) from each origin to each destination.
///
/// The matrix is indexed `[origin][destination]`; `None` marks an
/// unreachable pair.
pub trait DistanceMatrixProvider: Send + Sync {
    fn matrix_for(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<Vec<Vec<Option<f64>>>, BackendError>;
}
