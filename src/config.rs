//! Planner configuration.
//!
//! Every struct has a `Default` matching the reference deployment and
//! deserializes with `#[serde(default)]`, so a JSON file only needs the
//! fields it overrides.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDateTime, NaiveTime, Timelike};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::haversine::DEFAULT_SPEED_KMH;
use crate::matcher::MatchOptions;
use crate::matrix::MatrixOptions;
use crate::osrm::OsrmConfig;
use crate::solver::SolveOptions;
use crate::stops::StopPlanOptions;
use crate::tomtom::TomTomConfig;

/// Environment variable holding the traffic-aware backend credential.
pub const TOMTOM_API_KEY_ENV: &str = "TOMTOM_API_KEY";

/// Hour of the default morning departure.
const DEFAULT_DEPARTURE_HOUR: u32 = 8;

/// Unit of every entry in a cost matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMetric {
    /// Seconds.
    #[default]
    Duration,
    /// Metres.
    Distance,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Enables the traffic-aware tier (still requires an API key).
    pub use_traffic: bool,
    pub use_road_network: bool,
    pub tomtom: TomTomConfig,
    pub osrm: OsrmConfig,
    /// Pedestrian profile used when matching commuters to stops.
    pub walking: OsrmConfig,
    pub use_walking_router: bool,
    pub fallback_speed_kmh: f64,
    /// `None` keeps the cache in memory only.
    pub cache_path: Option<PathBuf>,
    /// Departure time for traffic-aware routing; defaults to the next 08:00.
    pub departure: Option<NaiveDateTime>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            use_traffic: false,
            use_road_network: true,
            tomtom: TomTomConfig::default(),
            osrm: OsrmConfig::default(),
            walking: OsrmConfig::foot("http://localhost:5001"),
            use_walking_router: true,
            fallback_speed_kmh: DEFAULT_SPEED_KMH,
            cache_path: Some(PathBuf::from("data/api_cache.json")),
            departure: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Fixed destination every tour starts and ends at (lat, lng).
    pub destination: (f64, f64),
    /// Commuters farther than this from their cluster centre are excluded.
    pub max_distance_from_center_m: Option<f64>,
    pub stops: StopPlanOptions,
    pub cost: CostConfig,
    pub matrix: MatrixOptions,
    pub solve: SolveOptions,
    pub matching: MatchOptions,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            destination: (41.1097, 29.0204),
            max_distance_from_center_m: Some(2500.0),
            stops: StopPlanOptions::default(),
            cost: CostConfig::default(),
            matrix: MatrixOptions::default(),
            solve: SolveOptions::default(),
            matching: MatchOptions::default(),
        }
    }
}

impl PlannerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Overlay credentials from the environment.
    pub fn with_env(mut self) -> Self {
        if let Ok(key) = std::env::var(TOMTOM_API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.cost.tomtom.api_key = Some(key);
            }
        }
        self
    }

    /// Traffic-aware routing needs both the toggle and a credential.
    pub fn traffic_enabled(&self) -> bool {
        self.cost.use_traffic
            && self
                .cost
                .tomtom
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty())
    }

    /// Configured departure, or the next 08:00 local time.
    pub fn departure(&self) -> NaiveDateTime {
        self.cost
            .departure
            .unwrap_or_else(|| next_departure(Local::now().naive_local(), DEFAULT_DEPARTURE_HOUR))
    }
}

/// Today at `hour`:00 if that is still ahead of `now`, otherwise tomorrow.
pub fn next_departure(now: NaiveDateTime, hour: u32) -> NaiveDateTime {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date().and_time(at);
    if now.hour() < hour {
        today
    } else {
        today + Duration::days(1)
    }
}
