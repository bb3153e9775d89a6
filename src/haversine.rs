//! Haversine estimator (last-resort tier when routing services are unavailable).
//!
//! Uses great-circle distance to estimate travel time.
//! Less accurate than road routing (ignores roads) but always available.

use chrono::NaiveDateTime;

use crate::error::BackendError;
use crate::polyline::Polyline;
use crate::traits::{BackendKind, DistanceMatrixProvider, RouteLeg, RoutingBackend};

/// Average driving speed assumption for time estimation.
pub const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two (lat, lng) points in metres.
pub fn haversine_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Haversine-based routing backend and walking-distance provider.
///
/// Estimates travel time using straight-line distance and an assumed speed.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Convert a distance in metres to travel time in seconds.
    pub fn meters_to_seconds(&self, meters: f64) -> f64 {
        meters / (self.speed_kmh / 3.6)
    }

    /// Infallible estimate between two points.
    pub fn estimate(&self, from: (f64, f64), to: (f64, f64)) -> RouteLeg {
        self.estimate_path(&[from, to])
    }

    fn estimate_path(&self, points: &[(f64, f64)]) -> RouteLeg {
        let distance_m: f64 = points.windows(2).map(|w| haversine_m(w[0], w[1])).sum();
        RouteLeg {
            distance_m,
            duration_s: self.meters_to_seconds(distance_m),
            duration_no_traffic_s: None,
            polyline: Some(Polyline::new(points.to_vec())),
        }
    }
}

impl RoutingBackend for HaversineMatrix {
    fn kind(&self) -> BackendKind {
        BackendKind::Geometric
    }

    fn route(
        &self,
        points: &[(f64, f64)],
        _departure: Option<NaiveDateTime>,
    ) -> Result<RouteLeg, BackendError> {
        if points.len() < 2 {
            return Err(BackendError::TooFewPoints(points.len()));
        }
        if points.iter().any(|(lat, lng)| !lat.is_finite() || !lng.is_finite()) {
            return Err(BackendError::Malformed("non-finite coordinate".to_string()));
        }
        Ok(self.estimate_path(points))
    }
}

impl DistanceMatrixProvider for HaversineMatrix {
    fn matrix_for(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<Vec<Vec<Option<f64>>>, BackendError> {
        Ok(origins
            .iter()
            .map(|from| {
                destinations
                    .iter()
                    .map(|to| Some(haversine_m(*from, *to)))
                    .collect()
            })
            .collect())
    }
}
