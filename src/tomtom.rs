//! TomTom routing adapter (traffic-aware tier).
//!
//! Calls the calculateRoute service with `traffic=true` and a departure
//! time, so durations reflect expected congestion at that minute.

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;

use crate::error::BackendError;
use crate::polyline::Polyline;
use crate::traits::{BackendKind, RouteLeg, RoutingBackend};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomTomConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub travel_mode: String,
    pub timeout_secs: u64,
}

impl Default for TomTomConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tomtom.com/routing/1/calculateRoute".to_string(),
            api_key: None,
            travel_mode: "car".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TomTomClient {
    config: TomTomConfig,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl TomTomClient {
    /// Fails with [`BackendError::NotConfigured`] when no API key is set.
    pub fn new(config: TomTomConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(BackendError::NotConfigured("TomTom API key"))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }
}

impl RoutingBackend for TomTomClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Traffic
    }

    fn is_time_dependent(&self) -> bool {
        true
    }

    fn route(
        &self,
        points: &[(f64, f64)],
        departure: Option<NaiveDateTime>,
    ) -> Result<RouteLeg, BackendError> {
        if points.len() < 2 {
            return Err(BackendError::TooFewPoints(points.len()));
        }
        let departure = departure.unwrap_or_else(|| Local::now().naive_local());
        let locations = points
            .iter()
            .map(|(lat, lng)| format!("{},{}", lat, lng))
            .collect::<Vec<_>>()
            .join(":");
        let url = format!("{}/{}/json", self.config.base_url, locations);
        let depart_at = departure.format("%Y-%m-%dT%H:%M:%S").to_string();

        let body = self
            .client
            .get(url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("traffic", "true"),
                ("departAt", depart_at.as_str()),
                ("travelMode", self.config.travel_mode.as_str()),
                ("routeType", "fastest"),
                ("computeTravelTimeFor", "all"),
            ])
            .send()
            .and_then(|resp| resp.error_for_status())?
            .text()?;

        parse_route(&body)
    }
}

#[derive(Debug, Deserialize)]
struct CalculateRouteResponse {
    #[serde(default)]
    routes: Vec<TomTomRoute>,
}

#[derive(Debug, Deserialize)]
struct TomTomRoute {
    summary: TomTomSummary,
    #[serde(default)]
    legs: Vec<TomTomLeg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TomTomSummary {
    length_in_meters: f64,
    travel_time_in_seconds: f64,
    no_traffic_travel_time_in_seconds: Option<f64>,
    historic_traffic_travel_time_in_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TomTomLeg {
    #[serde(default)]
    points: Vec<TomTomPoint>,
}

#[derive(Debug, Deserialize)]
struct TomTomPoint {
    latitude: f64,
    longitude: f64,
}

fn parse_route(body: &str) -> Result<RouteLeg, BackendError> {
    let response: CalculateRouteResponse = serde_json::from_str(body)?;
    let route = response.routes.into_iter().next().ok_or(BackendError::NoRoute)?;
    let summary = route.summary;

    let points: Vec<(f64, f64)> = route
        .legs
        .into_iter()
        .flat_map(|leg| leg.points)
        .map(|point| (point.latitude, point.longitude))
        .collect();

    Ok(RouteLeg {
        distance_m: summary.length_in_meters,
        duration_s: summary
            .historic_traffic_travel_time_in_seconds
            .unwrap_or(summary.travel_time_in_seconds),
        duration_no_traffic_s: Some(
            summary
                .no_traffic_travel_time_in_seconds
                .unwrap_or(summary.travel_time_in_seconds),
        ),
        polyline: (!points.is_empty()).then(|| Polyline::new(points)),
    })
}
