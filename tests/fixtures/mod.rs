//! Test fixtures for shuttle-planner.
//!
//! Provides:
//! - Commuter home locations around Istanbul neighbourhoods, grouped the
//!   way the top-level clustering would hand them over
//! - A small major/minor road network in the CSV format the road index loads
//! - Builders for providers, clusters and configuration

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use shuttle_planner::cache::CostCache;
use shuttle_planner::config::PlannerConfig;
use shuttle_planner::haversine::HaversineMatrix;
use shuttle_planner::model::{Cluster, Commuter};
use shuttle_planner::provider::CostProvider;
use shuttle_planner::road::RoadIndex;
use shuttle_planner::traits::RoutingBackend;

#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

/// Office every shuttle drives to (Maslak).
pub const OFFICE: (f64, f64) = (41.1097, 29.0204);

// ============================================================================
// Levent / Etiler (12 commuters, ~1 km across)
// ============================================================================

pub const LEVENT_COMMUTERS: &[Location] = &[
    Location::new("Levent Metro", 41.0822, 29.0110),
    Location::new("Kanyon", 41.0785, 29.0108),
    Location::new("Sanayi Mahallesi", 41.0848, 29.0052),
    Location::new("4. Levent", 41.0862, 29.0078),
    Location::new("Gonenc Sokak", 41.0801, 29.0170),
    Location::new("Etiler Nispetiye", 41.0790, 29.0262),
    Location::new("Akatlar", 41.0841, 29.0225),
    Location::new("Konaklar", 41.0875, 29.0191),
    Location::new("Levazim", 41.0760, 29.0148),
    Location::new("Ortabahce", 41.0772, 29.0205),
    Location::new("Yapi Kredi Plaza", 41.0811, 29.0092),
    Location::new("Emlak Konut", 41.0858, 29.0143),
];

// ============================================================================
// Kadikoy / Moda (6 commuters, Asian side)
// ============================================================================

pub const KADIKOY_COMMUTERS: &[Location] = &[
    Location::new("Kadikoy Iskele", 40.9909, 29.0240),
    Location::new("Moda Caddesi", 40.9846, 29.0269),
    Location::new("Yeldegirmeni", 40.9946, 29.0298),
    Location::new("Bahariye", 40.9878, 29.0312),
    Location::new("Osmanaga", 40.9897, 29.0285),
    Location::new("Rasimpasa", 40.9962, 29.0267),
];

/// One primary avenue through Levent plus a residential side street.
pub const LEVENT_ROADS_CSV: &str = "\
way_id,highway,start_lat,start_lng,end_lat,end_lng
100,primary,41.0820,29.0000,41.0820,29.0150
101,primary,41.0820,29.0150,41.0820,29.0300
200,trunk_link,41.0760,29.0110,41.0880,29.0110
300,residential,41.0850,29.0000,41.0850,29.0300
";

pub fn departure() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 20)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

/// Commuters with consecutive ids starting at `first_id`.
pub fn commuters(locations: &[Location], first_id: u32) -> Vec<Commuter> {
    locations
        .iter()
        .enumerate()
        .map(|(i, location)| Commuter::new(first_id + i as u32, location.coords()))
        .collect()
}

/// A cluster centred on the mean of its commuters.
pub fn cluster(id: usize, locations: &[Location], first_id: u32) -> Cluster {
    let n = locations.len().max(1) as f64;
    let center = (
        locations.iter().map(|l| l.lat).sum::<f64>() / n,
        locations.iter().map(|l| l.lng).sum::<f64>() / n,
    );
    let mut cluster = Cluster::new(id, center);
    for commuter in commuters(locations, first_id) {
        cluster.add_commuter(commuter);
    }
    cluster
}

pub fn levent_roads() -> RoadIndex {
    RoadIndex::from_csv_reader(LEVENT_ROADS_CSV.as_bytes()).unwrap()
}

pub fn provider_with(backends: Vec<Box<dyn RoutingBackend>>) -> CostProvider {
    CostProvider::new(backends, Arc::new(CostCache::in_memory()))
}

/// Geometric tier only, in-memory cache.
pub fn geometric_provider() -> CostProvider {
    provider_with(vec![Box::new(HaversineMatrix::default())])
}

/// Defaults with a fixed departure, no cache file and no external services.
pub fn test_config() -> PlannerConfig {
    let mut config = PlannerConfig::default();
    config.destination = OFFICE;
    config.cost.cache_path = None;
    config.cost.use_road_network = false;
    config.cost.use_walking_router = false;
    config.cost.departure = Some(departure());
    config
}
