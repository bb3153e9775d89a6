//! End-to-end cluster planning tests
//!
//! Drive the full pipeline (stops → matrix → tour → matching) with mock
//! routing backends, including degenerate clusters and failing services.

mod fixtures;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDateTime;

use fixtures::*;
use shuttle_planner::error::{BackendError, PlannerError};
use shuttle_planner::haversine::HaversineMatrix;
use shuttle_planner::matrix::{DistanceMatrixBuilder, MatrixOptions, MatrixStrategy};
use shuttle_planner::model::{Cluster, Commuter, PickupKind};
use shuttle_planner::pipeline::{CancelToken, PlanSummary, Planner};
use shuttle_planner::solver::{SolveOptions, solve_route, solve_tour};
use shuttle_planner::stops::StopPlanner;
use shuttle_planner::traits::{BackendKind, RouteLeg, RoutingBackend};

// ============================================================================
// Mock Backends
// ============================================================================

/// Traffic-aware backend that is always down.
struct DownTraffic {
    calls: Arc<AtomicUsize>,
}

impl RoutingBackend for DownTraffic {
    fn kind(&self) -> BackendKind {
        BackendKind::Traffic
    }

    fn is_time_dependent(&self) -> bool {
        true
    }

    fn route(&self, _: &[(f64, f64)], _: Option<NaiveDateTime>) -> Result<RouteLeg, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Malformed("503 Service Unavailable".to_string()))
    }
}

/// Road backend that refuses anything south of the Bosphorus bridges.
struct EuropeanSideOnly;

impl RoutingBackend for EuropeanSideOnly {
    fn kind(&self) -> BackendKind {
        BackendKind::RoadNetwork
    }

    fn route(&self, points: &[(f64, f64)], departure: Option<NaiveDateTime>) -> Result<RouteLeg, BackendError> {
        if points.iter().any(|(lat, _)| *lat < 41.0) {
            return Err(BackendError::NoRoute);
        }
        HaversineMatrix::default().route(points, departure)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn stop_index(plan_stops: &[shuttle_planner::model::Stop], location: (f64, f64)) -> Option<usize> {
    plan_stops.iter().position(|stop| stop.location == location)
}

// ============================================================================
// Twelve Commuters
// ============================================================================

#[test]
fn test_twelve_commuters_stage_by_stage() {
    let config = test_config();
    let cluster = cluster(0, LEVENT_COMMUTERS, 1);
    let active: Vec<&Commuter> = cluster.active_commuters().collect();

    let plan = StopPlanner::new(None, config.stops.clone()).plan(&active);
    assert_eq!(plan.stops.len(), 6, "12 commuters at 2 per stop");
    assert_eq!(plan.loads.iter().sum::<usize>(), 12);
    assert!(plan.loads.iter().all(|load| *load >= 1));

    let mut points = vec![OFFICE];
    points.extend(plan.stops.iter().map(|stop| stop.location));

    let provider = geometric_provider();
    let options = MatrixOptions {
        strategy: Some(MatrixStrategy::Dense),
        ..MatrixOptions::default()
    };
    let (matrix, stats) = DistanceMatrixBuilder::new(&provider, options)
        .build(&points, Some(departure()))
        .unwrap();
    assert_eq!(matrix.len(), 7);
    assert!(matrix.is_symmetric());
    for i in 0..7 {
        assert_eq!(matrix.get(i, i), 0);
        for j in 0..7 {
            if i != j {
                assert!(matrix.get(i, j) > 0);
            }
        }
    }
    assert_eq!(stats.provider_calls, 21);

    let tour = solve_tour(&matrix, &SolveOptions::default()).unwrap();
    let closed = tour.closed();
    assert_eq!(tour.order.len(), 7);
    assert_eq!(closed.first(), Some(&0));
    assert_eq!(closed.last(), Some(&0));

    let route = solve_route(&points, &matrix, &SolveOptions::default());
    assert_eq!(route.first(), Some(&OFFICE));
    assert_eq!(route.last(), Some(&OFFICE));
    assert_eq!(route.len(), 8);
}

#[test]
fn test_twelve_commuters_end_to_end() {
    let provider = geometric_provider();
    let planner = Planner::new(test_config(), &provider);
    let mut cluster = cluster(0, LEVENT_COMMUTERS, 1);

    let plan = planner.plan_cluster(&mut cluster, None).unwrap();

    assert_eq!(plan.stops.len(), 6);
    assert_eq!(plan.route.stops.first(), Some(&OFFICE));
    assert_eq!(plan.route.stops.last(), Some(&OFFICE));
    assert_eq!(plan.route.pickup_stops().len(), 6);
    assert_eq!(plan.route.provider, Some(BackendKind::Geometric));
    assert!(plan.route.distance_m > 0.0);
    assert!(plan.route.polyline.is_some());

    // every commuter ends up at exactly one of the six stops
    assert_eq!(plan.pickups.len(), 12);
    assert_eq!(plan.match_summary.validated, 12);
    assert!(!plan.match_summary.used_fallback);
    for (id, pickup) in &plan.pickups {
        let pickup = pickup.unwrap_or_else(|| panic!("commuter {} unmatched", id));
        assert_eq!(pickup.kind, PickupKind::ValidatedStop);
        let index = stop_index(&plan.stops, pickup.location).expect("pickup is a planned stop");
        assert!(plan.stops[index].commuters.contains(id));
    }
    let members: usize = plan.stops.iter().map(|stop| stop.load()).sum();
    assert_eq!(members, 12);
}

#[test]
fn test_stops_snap_to_major_roads() {
    let roads = levent_roads();
    let provider = geometric_provider();
    let planner = Planner::new(test_config(), &provider).with_roads(&roads);
    let mut cluster = cluster(0, LEVENT_COMMUTERS, 1);

    let plan = planner.plan_cluster(&mut cluster, None).unwrap();

    assert_eq!(plan.stops.len(), 6);
    assert!(plan.stops.iter().any(|stop| stop.snapped));
    for stop in plan.stops.iter().filter(|stop| stop.snapped) {
        let on_avenue = (stop.location.0 - 41.0820).abs() < 1e-6;
        let on_link = (stop.location.1 - 29.0110).abs() < 1e-6;
        assert!(on_avenue || on_link, "snapped off-road: {:?}", stop.location);
    }
}

// ============================================================================
// Degenerate Clusters
// ============================================================================

#[test]
fn test_single_commuter_cluster() {
    let provider = geometric_provider();
    let planner = Planner::new(test_config(), &provider);
    let home = LEVENT_COMMUTERS[0].coords();
    let mut cluster = cluster(0, &LEVENT_COMMUTERS[..1], 1);

    let plan = planner.plan_cluster(&mut cluster, None).unwrap();

    assert_eq!(plan.stops.len(), 1);
    assert_eq!(plan.stops[0].location, home);
    assert_eq!(plan.route.stops, vec![OFFICE, home, OFFICE]);
    let pickup = plan.pickups[0].1.expect("single commuter is matched");
    assert_eq!(pickup.location, home);
    assert_eq!(pickup.kind, PickupKind::ValidatedStop);
}

#[test]
fn test_empty_cluster_yields_trivial_route() {
    let provider = geometric_provider();
    let planner = Planner::new(test_config(), &provider);
    let mut cluster = Cluster::new(4, OFFICE);

    let plan = planner.plan_cluster(&mut cluster, None).unwrap();

    assert!(plan.stops.is_empty());
    assert!(plan.pickups.is_empty());
    assert_eq!(plan.route.stops, vec![OFFICE, OFFICE]);
    assert_eq!(plan.matrix_stats.provider_calls, 0);
}

#[test]
fn test_far_commuter_is_excluded() {
    let provider = geometric_provider();
    let planner = Planner::new(test_config(), &provider);
    let mut cluster = cluster(0, LEVENT_COMMUTERS, 1);
    // Kadikoy is ~10 km from the Levent centre
    cluster.add_commuter(Commuter::new(99, KADIKOY_COMMUTERS[0].coords()));

    let plan = planner.plan_cluster(&mut cluster, None).unwrap();

    assert_eq!(plan.excluded, 1);
    assert_eq!(plan.pickups.len(), 12);
    let far = cluster.commuters.iter().find(|c| c.id.0 == 99).unwrap();
    assert!(far.excluded);
    assert!(far.exclusion_reason.is_some());
    assert!(far.pickup.is_none());
}

// ============================================================================
// Failing Backends
// ============================================================================

#[test]
fn test_traffic_outage_degrades_to_geometric() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = provider_with(vec![
        Box::new(DownTraffic { calls: calls.clone() }),
        Box::new(HaversineMatrix::default()),
    ]);
    let planner = Planner::new(test_config(), &provider);
    let mut cluster = cluster(0, LEVENT_COMMUTERS, 1);

    let plan = planner.plan_cluster(&mut cluster, None).unwrap();

    // traffic-aware primary tier selects the sparse strategy
    assert_eq!(plan.matrix_stats.strategy, MatrixStrategy::Sparse);
    assert!(plan.matrix_stats.provider_calls <= 7 * 5);
    // one attempt per queried pair plus the route enrichment
    assert_eq!(calls.load(Ordering::SeqCst), plan.matrix_stats.provider_calls + 1);

    assert_eq!(plan.route.provider, Some(BackendKind::Geometric));
    assert_eq!(plan.route.stops.first(), Some(&OFFICE));
    assert_eq!(plan.route.stops.last(), Some(&OFFICE));
    assert_eq!(plan.route.stops.len(), 8);
    assert_eq!(plan.match_summary.validated, 12);
}

#[test]
fn test_cluster_failure_is_isolated() {
    let provider = provider_with(vec![Box::new(EuropeanSideOnly)]);
    let planner = Planner::new(test_config(), &provider);
    let mut clusters = vec![
        cluster(0, LEVENT_COMMUTERS, 1),
        cluster(1, KADIKOY_COMMUTERS, 100),
    ];

    let results = planner.plan_all(&mut clusters, None);

    assert_eq!(results.len(), 2);
    let levent = results[0].as_ref().expect("European cluster plans");
    assert_eq!(levent.cluster_id, 0);
    assert_eq!(levent.route.provider, Some(BackendKind::RoadNetwork));
    assert!(matches!(results[1], Err(PlannerError::Cost(_))));

    let summary = PlanSummary::from_results(&results);
    assert_eq!(summary.clusters, 2);
    assert_eq!(summary.failed_clusters, 1);
    assert_eq!(summary.commuters, 12);
    assert_eq!(summary.matched, 12);
    assert_eq!(summary.stops, 6);
}

#[test]
fn test_parallel_clusters_all_succeed() {
    let provider = geometric_provider();
    let planner = Planner::new(test_config(), &provider);
    let mut clusters = vec![
        cluster(0, LEVENT_COMMUTERS, 1),
        cluster(1, KADIKOY_COMMUTERS, 100),
    ];

    let results = planner.plan_all(&mut clusters, None);
    let summary = PlanSummary::from_results(&results);

    assert_eq!(summary.failed_clusters, 0);
    assert_eq!(summary.commuters, 18);
    assert_eq!(summary.stops, 6 + 3);
    assert!(summary.distance_m > 0.0);
    // geometric routing reports no free-flow time
    assert_eq!(summary.traffic_delay_s, 0.0);
}

#[test]
fn test_cancelled_before_start() {
    let provider = geometric_provider();
    let planner = Planner::new(test_config(), &provider);
    let mut clusters = vec![cluster(0, LEVENT_COMMUTERS, 1)];
    let token = CancelToken::new();
    token.cancel();

    let results = planner.plan_all(&mut clusters, Some(&token));

    assert!(matches!(results[0], Err(PlannerError::Cancelled(0))));
    assert!(clusters[0].commuters.iter().all(|c| c.pickup.is_none()));
}
