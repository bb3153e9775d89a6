//! Per-cluster planning pipeline.
//!
//! exclusion → stop placement → cost matrix → tour → route enrichment →
//! pickup matching → stop membership from the matched pickups.
//!
//! Clusters are independent. [`Planner::plan_all`] runs them in parallel and
//! returns one result per cluster; a failing cluster never affects the
//! others.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{CostConfig, PlannerConfig};
use crate::error::PlannerError;
use crate::haversine::{HaversineMatrix, haversine_m};
use crate::matcher::{MatchSummary, RouteMatcher};
use crate::matrix::{BuildStats, DistanceMatrixBuilder};
use crate::model::{Cluster, CommuterId, PickupKind, PickupPoint, Route, Stop};
use crate::osrm::OsrmClient;
use crate::provider::CostProvider;
use crate::road::RoadIndex;
use crate::solver::solve_route;
use crate::stops::{StopPlanner, StopStats};
use crate::traits::{BackendKind, DistanceMatrixProvider};

/// Cooperative cancellation, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything produced for one cluster.
#[derive(Debug, Clone)]
pub struct ClusterPlan {
    pub cluster_id: usize,
    /// Stops with membership taken from the matched pickups.
    pub stops: Vec<Stop>,
    pub stop_stats: StopStats,
    pub route: Route,
    /// Pickup of every active commuter; `None` when unmatched.
    pub pickups: Vec<(CommuterId, Option<PickupPoint>)>,
    /// Commuters newly excluded for distance from the cluster centre.
    pub excluded: usize,
    pub matrix_stats: BuildStats,
    pub match_summary: MatchSummary,
}

/// Totals across all clusters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanSummary {
    pub clusters: usize,
    pub failed_clusters: usize,
    pub commuters: usize,
    pub matched: usize,
    pub excluded: usize,
    pub stops: usize,
    pub distance_m: f64,
    pub duration_s: f64,
    pub traffic_delay_s: f64,
}

impl PlanSummary {
    pub fn from_results(results: &[Result<ClusterPlan, PlannerError>]) -> Self {
        let mut summary = PlanSummary {
            clusters: results.len(),
            ..PlanSummary::default()
        };
        for result in results {
            let Ok(plan) = result else {
                summary.failed_clusters += 1;
                continue;
            };
            summary.commuters += plan.pickups.len();
            summary.matched += plan.pickups.iter().filter(|(_, p)| p.is_some()).count();
            summary.excluded += plan.excluded;
            summary.stops += plan.stops.len();
            summary.distance_m += plan.route.distance_m;
            summary.duration_s += plan.route.duration_s;
            summary.traffic_delay_s += plan.route.traffic_delay_s().unwrap_or(0.0).max(0.0);
        }
        summary
    }
}

/// Pedestrian router for pickup matching, when configured and reachable.
pub fn walking_router(config: &CostConfig) -> Option<OsrmClient> {
    if !config.use_walking_router {
        return None;
    }
    match OsrmClient::new(config.walking.clone()) {
        Ok(client) => Some(client),
        Err(err) => {
            warn!(error = %err, "walking router disabled");
            None
        }
    }
}

pub struct Planner<'a> {
    config: PlannerConfig,
    provider: &'a CostProvider,
    roads: Option<&'a RoadIndex>,
    walking: Option<&'a dyn DistanceMatrixProvider>,
    safe_stops: Vec<(f64, f64)>,
    departure: NaiveDateTime,
}

impl<'a> Planner<'a> {
    pub fn new(config: PlannerConfig, provider: &'a CostProvider) -> Self {
        let departure = config.departure();
        Self {
            config,
            provider,
            roads: None,
            walking: None,
            safe_stops: Vec::new(),
            departure,
        }
    }

    pub fn with_roads(mut self, roads: &'a RoadIndex) -> Self {
        self.roads = Some(roads);
        self
    }

    pub fn with_walking(mut self, walking: &'a dyn DistanceMatrixProvider) -> Self {
        self.walking = Some(walking);
        self
    }

    /// Known safe waiting points near routes.
    pub fn with_safe_stops(mut self, safe_stops: Vec<(f64, f64)>) -> Self {
        self.safe_stops = safe_stops;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn departure(&self) -> NaiveDateTime {
        self.departure
    }

    pub fn plan_all(
        &self,
        clusters: &mut [Cluster],
        cancel: Option<&CancelToken>,
    ) -> Vec<Result<ClusterPlan, PlannerError>> {
        clusters
            .par_iter_mut()
            .map(|cluster| {
                let result = self.plan_cluster(cluster, cancel);
                if let Err(err) = &result {
                    warn!(cluster = cluster.id, error = %err, "cluster planning failed");
                }
                result
            })
            .collect()
    }

    pub fn plan_cluster(
        &self,
        cluster: &mut Cluster,
        cancel: Option<&CancelToken>,
    ) -> Result<ClusterPlan, PlannerError> {
        let cluster_id = cluster.id;
        let checkpoint = || match cancel {
            Some(token) if token.is_cancelled() => Err(PlannerError::Cancelled(cluster_id)),
            _ => Ok(()),
        };
        checkpoint()?;

        let excluded = match self.config.max_distance_from_center_m {
            Some(max_m) => cluster.exclude_far_commuters(max_m),
            None => 0,
        };

        let active: Vec<_> = cluster.active_commuters().collect();
        let stop_plan = StopPlanner::new(self.roads, self.config.stops.clone()).plan(&active);
        let stop_stats = stop_plan.stats();
        checkpoint()?;

        let mut points = Vec::with_capacity(stop_plan.stops.len() + 1);
        points.push(self.config.destination);
        points.extend(stop_plan.stops.iter().map(|stop| stop.location));

        let builder = DistanceMatrixBuilder::new(self.provider, self.config.matrix.clone());
        let (matrix, matrix_stats) = builder.build(&points, Some(self.departure))?;
        checkpoint()?;

        let route = self.enrich(solve_route(&points, &matrix, &self.config.solve));
        checkpoint()?;

        let matcher = RouteMatcher::new(self.walking, self.config.matching.clone());
        let match_summary = matcher.match_commuters(&route, &mut cluster.commuters, &self.safe_stops);

        let stops = reassign_members(stop_plan.stops, cluster);
        let pickups = cluster
            .active_commuters()
            .map(|commuter| (commuter.id, commuter.pickup))
            .collect();

        info!(
            cluster = cluster_id,
            stops = stops.len(),
            excluded,
            distance_m = route.distance_m,
            duration_s = route.duration_s,
            provider = ?route.provider,
            validated = match_summary.validated,
            on_route = match_summary.on_route,
            unmatched = match_summary.unmatched,
            "planned cluster"
        );

        Ok(ClusterPlan {
            cluster_id,
            stops,
            stop_stats,
            route,
            pickups,
            excluded,
            matrix_stats,
            match_summary,
        })
    }

    /// Attach geometry, distance and duration to the solved stop sequence.
    fn enrich(&self, stops: Vec<(f64, f64)>) -> Route {
        let mut route = Route::from_stops(stops);
        if route.pickup_stops().is_empty() {
            return route;
        }

        match self.provider.route(&route.stops, Some(self.departure)) {
            Ok(cost) => {
                route.distance_m = cost.distance_m;
                route.duration_s = cost.duration_s;
                route.duration_no_traffic_s = cost.duration_no_traffic_s;
                route.polyline = cost.polyline;
                route.provider = Some(cost.provider);
            }
            Err(err) => {
                warn!(error = %err, "route enrichment failed, using straight-line stats");
                let estimator = HaversineMatrix::new(self.config.cost.fallback_speed_kmh);
                route.distance_m = route
                    .stops
                    .windows(2)
                    .map(|pair| haversine_m(pair[0], pair[1]))
                    .sum();
                route.duration_s = estimator.meters_to_seconds(route.distance_m);
                route.provider = Some(BackendKind::Geometric);
            }
        }
        route
    }
}

/// Move commuters to the stop they were matched to; anyone matched
/// elsewhere (a safe point, a raw projection) or unmatched keeps the stop
/// placement gave them.
fn reassign_members(mut stops: Vec<Stop>, cluster: &Cluster) -> Vec<Stop> {
    let planned: HashMap<CommuterId, usize> = stops
        .iter()
        .enumerate()
        .flat_map(|(i, stop)| stop.commuters.iter().map(move |id| (*id, i)))
        .collect();
    for stop in &mut stops {
        stop.commuters.clear();
    }

    for commuter in cluster.active_commuters() {
        let matched = commuter
            .pickup
            .filter(|pickup| pickup.kind == PickupKind::ValidatedStop)
            .and_then(|pickup| stops.iter().position(|stop| stop.location == pickup.location));
        if let Some(index) = matched.or_else(|| planned.get(&commuter.id).copied()) {
            stops[index].commuters.push(commuter.id);
        }
    }
    stops
}
