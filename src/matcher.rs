//! Assign commuters to the pickup point they should walk to.
//!
//! Candidates are the route's own stops plus known safe waiting points close
//! to the path. A one-sided filter drops candidates on the far side of the
//! road, so nobody has to cross oncoming traffic to board. Commuters then
//! walk to the nearest survivor. When no usable geometry or candidate
//! remains, the commuter is projected straight onto the path instead.

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::MatchError;
use crate::haversine::{HaversineMatrix, haversine_m};
use crate::model::{Commuter, PickupKind, PickupPoint, Route};
use crate::polyline::{PlanarPolyline, Polyline};
use crate::traits::DistanceMatrixProvider;

/// Side of the road passengers board from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurbSide {
    /// Right-hand traffic.
    #[default]
    Right,
    Left,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Safe waiting points farther than this from the path are ignored.
    pub safe_stop_max_offset_m: f64,
    /// Half-width of the window the local road direction is sampled over.
    pub tangent_sample_m: f64,
    /// Offset onto the traffic-facing side still accepted as on the line.
    pub side_tolerance_m: f64,
    pub curb_side: CurbSide,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            safe_stop_max_offset_m: 15.0,
            tangent_sample_m: 1.0,
            side_tolerance_m: 1.5,
            curb_side: CurbSide::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchSummary {
    pub validated: usize,
    pub on_route: usize,
    pub unmatched: usize,
    /// Whether the batch went through the projection fallback.
    pub used_fallback: bool,
}

/// Whether `point` lies on the boarding side of `path` (or within tolerance
/// of the line itself).
pub fn passes_side_filter(path: &PlanarPolyline, point: (f64, f64), options: &MatchOptions) -> bool {
    let offset = path.side_offset(point, options.tangent_sample_m);
    // positive offsets are left of the direction of travel
    let towards_curb = match options.curb_side {
        CurbSide::Right => -offset,
        CurbSide::Left => offset,
    };
    towards_curb >= -options.side_tolerance_m
}

pub fn filter_candidates(
    path: &PlanarPolyline,
    candidates: &[(f64, f64)],
    options: &MatchOptions,
) -> Vec<(f64, f64)> {
    candidates
        .iter()
        .copied()
        .filter(|candidate| passes_side_filter(path, *candidate, options))
        .collect()
}

pub struct RouteMatcher<'a> {
    walking: Option<&'a dyn DistanceMatrixProvider>,
    options: MatchOptions,
}

impl<'a> RouteMatcher<'a> {
    /// `walking` supplies pedestrian distances; great-circle distance is
    /// used when absent.
    pub fn new(walking: Option<&'a dyn DistanceMatrixProvider>, options: MatchOptions) -> Self {
        Self { walking, options }
    }

    /// Route stops (destination excluded) plus safe points near the path.
    pub fn candidates(
        &self,
        route: &Route,
        path: &PlanarPolyline,
        safe_stops: &[(f64, f64)],
    ) -> Vec<(f64, f64)> {
        let mut candidates: Vec<(f64, f64)> = Vec::new();
        let near_path = safe_stops
            .iter()
            .filter(|stop| path.distance_to(**stop) <= self.options.safe_stop_max_offset_m);
        for point in route.pickup_stops().iter().chain(near_path) {
            if !candidates.contains(point) {
                candidates.push(*point);
            }
        }
        candidates
    }

    /// Set each active commuter's pickup. Commuters that cannot be matched
    /// are left without one.
    pub fn match_commuters(
        &self,
        route: &Route,
        commuters: &mut [Commuter],
        safe_stops: &[(f64, f64)],
    ) -> MatchSummary {
        let path = route.path();
        let planar = path.planar();

        let survivors = match &planar {
            Some(planar) => {
                let candidates = self.candidates(route, planar, safe_stops);
                filter_candidates(planar, &candidates, &self.options)
            }
            None => Vec::new(),
        };

        if !survivors.is_empty() {
            if let Some(summary) = self.match_by_walking(commuters, &survivors) {
                return summary;
            }
        }

        let fallback_stops: Vec<(f64, f64)> = if planar.is_some() {
            survivors
        } else {
            safe_stops.to_vec()
        };
        info!(
            has_path = planar.is_some(),
            candidates = fallback_stops.len(),
            "matching commuters by projection fallback"
        );
        let mut summary = MatchSummary {
            used_fallback: true,
            ..MatchSummary::default()
        };
        for commuter in commuters.iter_mut().filter(|c| c.is_active()) {
            let result = fallback_pickup(commuter.location, &path, planar.as_ref(), &fallback_stops);
            record(commuter, result, &mut summary);
        }
        summary
    }

    /// Nearest survivor by walking distance. `None` when the distance
    /// matrix is unavailable.
    fn match_by_walking(&self, commuters: &mut [Commuter], survivors: &[(f64, f64)]) -> Option<MatchSummary> {
        let origins: Vec<(f64, f64)> = commuters
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.location)
            .collect();
        if origins.is_empty() {
            return Some(MatchSummary::default());
        }

        let haversine = HaversineMatrix::default();
        let walking: &dyn DistanceMatrixProvider = match self.walking {
            Some(walking) => walking,
            None => &haversine,
        };
        let distances = match walking.matrix_for(&origins, survivors) {
            Ok(rows) if rows.len() == origins.len() => rows,
            Ok(rows) => {
                warn!(
                    expected = origins.len(),
                    got = rows.len(),
                    "walking matrix has wrong shape"
                );
                return None;
            }
            Err(err) => {
                warn!(error = %err, "walking distances unavailable");
                return None;
            }
        };

        let mut summary = MatchSummary::default();
        let active = commuters.iter_mut().filter(|c| c.is_active());
        for (commuter, row) in active.zip(&distances) {
            let result = nearest_by_walking(commuter.location, row, survivors);
            record(commuter, result, &mut summary);
        }
        Some(summary)
    }
}

fn record(commuter: &mut Commuter, result: Result<PickupPoint, MatchError>, summary: &mut MatchSummary) {
    match result {
        Ok(pickup) => {
            match pickup.kind {
                PickupKind::ValidatedStop => summary.validated += 1,
                PickupKind::OnRoute => summary.on_route += 1,
            }
            commuter.pickup = Some(pickup);
        }
        Err(err) => {
            warn!(commuter = %commuter.id, error = %err, "commuter left unmatched");
            commuter.clear_pickup();
            summary.unmatched += 1;
        }
    }
}

fn check_location(location: (f64, f64)) -> Result<(), MatchError> {
    if location.0.is_finite() && location.1.is_finite() {
        Ok(())
    } else {
        Err(MatchError::InvalidLocation)
    }
}

fn nearest_by_walking(
    location: (f64, f64),
    row: &[Option<f64>],
    survivors: &[(f64, f64)],
) -> Result<PickupPoint, MatchError> {
    check_location(location)?;
    let walked = row
        .iter()
        .zip(survivors)
        .filter_map(|(distance, stop)| distance.filter(|d| d.is_finite()).map(|d| (d, *stop)))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, stop)| stop);
    // unreachable on foot: fall back to the closest survivor as the crow flies
    let stop = walked.or_else(|| nearest(location, survivors)).ok_or(MatchError::DegeneratePath)?;
    Ok(PickupPoint {
        location: stop,
        kind: PickupKind::ValidatedStop,
    })
}

fn fallback_pickup(
    location: (f64, f64),
    path: &Polyline,
    planar: Option<&PlanarPolyline>,
    safe_stops: &[(f64, f64)],
) -> Result<PickupPoint, MatchError> {
    check_location(location)?;
    if let Some(stop) = nearest(location, safe_stops) {
        return Ok(PickupPoint {
            location: stop,
            kind: PickupKind::ValidatedStop,
        });
    }
    let projected = match planar {
        Some(planar) => planar.project(location).point,
        None => nearest(location, path.points()).ok_or(MatchError::DegeneratePath)?,
    };
    Ok(PickupPoint {
        location: projected,
        kind: PickupKind::OnRoute,
    })
}

fn nearest(location: (f64, f64), points: &[(f64, f64)]) -> Option<(f64, f64)> {
    points
        .iter()
        .copied()
        .min_by(|a, b| haversine_m(location, *a).total_cmp(&haversine_m(location, *b)))
}
