//! OSRM HTTP adapter: road-network routing and pedestrian distance tables.

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::error::BackendError;
use crate::polyline::Polyline;
use crate::traits::{BackendKind, DistanceMatrixProvider, RouteLeg, RoutingBackend};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

impl OsrmConfig {
    /// Same server settings with the pedestrian profile.
    pub fn foot(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            profile: "foot".to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OsrmConfig {
        &self.config
    }

    fn route_url(&self, points: &[(f64, f64)]) -> String {
        format!(
            "{}/route/v1/{}/{}?overview=full&geometries=geojson",
            self.config.base_url,
            self.config.profile,
            coordinate_list(points)
        )
    }

    fn table_url(&self, origins: &[(f64, f64)], destinations: &[(f64, f64)]) -> String {
        let mut points = origins.to_vec();
        points.extend_from_slice(destinations);
        let sources = (0..origins.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        let targets = (origins.len()..points.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}/table/v1/{}/{}?sources={}&destinations={}&annotations=distance",
            self.config.base_url,
            self.config.profile,
            coordinate_list(&points),
            sources,
            targets
        )
    }
}

/// OSRM expects `lng,lat` pairs separated by `;`.
fn coordinate_list(points: &[(f64, f64)]) -> String {
    points
        .iter()
        .map(|(lat, lng)| format!("{:.6},{:.6}", lng, lat))
        .collect::<Vec<_>>()
        .join(";")
}

impl RoutingBackend for OsrmClient {
    fn kind(&self) -> BackendKind {
        BackendKind::RoadNetwork
    }

    fn route(
        &self,
        points: &[(f64, f64)],
        _departure: Option<NaiveDateTime>,
    ) -> Result<RouteLeg, BackendError> {
        if points.len() < 2 {
            return Err(BackendError::TooFewPoints(points.len()));
        }

        let body = self
            .client
            .get(self.route_url(points))
            .send()
            .and_then(|resp| resp.error_for_status())?
            .text()?;

        parse_route(&body)
    }
}

impl DistanceMatrixProvider for OsrmClient {
    fn matrix_for(
        &self,
        origins: &[(f64, f64)],
        destinations: &[(f64, f64)],
    ) -> Result<Vec<Vec<Option<f64>>>, BackendError> {
        if origins.is_empty() || destinations.is_empty() {
            return Ok(vec![Vec::new(); origins.len()]);
        }

        let body = self
            .client
            .get(self.table_url(origins, destinations))
            .send()
            .and_then(|resp| resp.error_for_status())?
            .text()?;

        parse_table(&body, origins.len(), destinations.len())
    }
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: Option<OsrmGeometry>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

fn parse_route(body: &str) -> Result<RouteLeg, BackendError> {
    let response: OsrmRouteResponse = serde_json::from_str(body)?;
    if response.code != "Ok" {
        return Err(BackendError::Malformed(format!("OSRM code {}", response.code)));
    }
    let route = response.routes.into_iter().next().ok_or(BackendError::NoRoute)?;

    // GeoJSON is [lng, lat]
    let polyline = route.geometry.map(|geometry| {
        Polyline::new(
            geometry
                .coordinates
                .into_iter()
                .map(|[lng, lat]| (lat, lng))
                .collect(),
        )
    });

    Ok(RouteLeg {
        distance_m: route.distance,
        duration_s: route.duration,
        duration_no_traffic_s: None,
        polyline,
    })
}

fn parse_table(
    body: &str,
    origins: usize,
    destinations: usize,
) -> Result<Vec<Vec<Option<f64>>>, BackendError> {
    let response: OsrmTableResponse = serde_json::from_str(body)?;
    if response.code != "Ok" {
        return Err(BackendError::Malformed(format!("OSRM code {}", response.code)));
    }
    let distances = response
        .distances
        .ok_or_else(|| BackendError::Malformed("missing distances".to_string()))?;
    if distances.len() != origins || distances.iter().any(|row| row.len() != destinations) {
        return Err(BackendError::Malformed(format!(
            "expected {}x{} table",
            origins, destinations
        )));
    }
    Ok(distances)
}
