//! Tiered travel-cost provider.
//!
//! Backends are tried in priority order (traffic-aware, road network,
//! geometric). Every tier's [`CostCache`] entry is checked before any
//! backend is called, so a hit on a lower tier skips a dead higher one.
//! A backend failure only marks that tier unavailable for the request and
//! the next tier is tried.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::warn;

use crate::cache::{CostCache, CostEntry, Fingerprint, TimeBucket};
use crate::config::{CostConfig, CostMetric};
use crate::error::{BackendError, CostError};
use crate::haversine::HaversineMatrix;
use crate::osrm::OsrmClient;
use crate::polyline::Polyline;
use crate::tomtom::TomTomClient;
use crate::traits::{BackendKind, RouteLeg, RoutingBackend};

/// Cost of travelling through a sequence of points.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelCost {
    pub distance_m: f64,
    pub duration_s: f64,
    pub duration_no_traffic_s: Option<f64>,
    pub polyline: Option<Polyline>,
    pub provider: BackendKind,
    /// Whether the value was served from the cache.
    pub cached: bool,
}

impl TravelCost {
    fn from_leg(leg: RouteLeg, provider: BackendKind) -> Self {
        Self {
            distance_m: leg.distance_m,
            duration_s: leg.duration_s,
            duration_no_traffic_s: leg.duration_no_traffic_s,
            polyline: leg.polyline,
            provider,
            cached: false,
        }
    }

    fn from_entry(entry: CostEntry) -> Self {
        Self {
            distance_m: entry.distance_m,
            duration_s: entry.duration_s,
            duration_no_traffic_s: entry.duration_no_traffic_s,
            polyline: entry.polyline.map(Polyline::new),
            provider: entry.provider,
            cached: true,
        }
    }

    /// The scalar used in cost matrices.
    pub fn value(&self, metric: CostMetric) -> f64 {
        match metric {
            CostMetric::Duration => self.duration_s,
            CostMetric::Distance => self.distance_m,
        }
    }
}

pub struct CostProvider {
    backends: Vec<Box<dyn RoutingBackend>>,
    cache: Arc<CostCache>,
    estimator: HaversineMatrix,
}

impl CostProvider {
    /// Provider over `backends` in priority order.
    pub fn new(backends: Vec<Box<dyn RoutingBackend>>, cache: Arc<CostCache>) -> Self {
        Self {
            backends,
            cache,
            estimator: HaversineMatrix::default(),
        }
    }

    /// Speed model used by [`CostProvider::estimate`].
    pub fn with_estimator(mut self, estimator: HaversineMatrix) -> Self {
        self.estimator = estimator;
        self
    }

    /// Build the standard tier list from configuration.
    ///
    /// The traffic tier is only added when enabled and a credential is
    /// present; the geometric tier is always last.
    pub fn from_config(config: &CostConfig, cache: Arc<CostCache>) -> Self {
        let mut backends: Vec<Box<dyn RoutingBackend>> = Vec::new();

        if config.use_traffic {
            match TomTomClient::new(config.tomtom.clone()) {
                Ok(client) => backends.push(Box::new(client)),
                Err(err) => warn!(error = %err, "traffic-aware routing disabled"),
            }
        }
        if config.use_road_network {
            match OsrmClient::new(config.osrm.clone()) {
                Ok(client) => backends.push(Box::new(client)),
                Err(err) => warn!(error = %err, "road-network routing disabled"),
            }
        }
        let estimator = HaversineMatrix::new(config.fallback_speed_kmh);
        backends.push(Box::new(estimator.clone()));

        Self::new(backends, cache).with_estimator(estimator)
    }

    pub fn backend_kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|backend| backend.kind()).collect()
    }

    /// Kind of the highest-priority tier.
    pub fn primary_kind(&self) -> Option<BackendKind> {
        self.backends.first().map(|backend| backend.kind())
    }

    pub fn cache(&self) -> &CostCache {
        &self.cache
    }

    /// Travel cost from `from` to `to`.
    pub fn cost(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        departure: Option<NaiveDateTime>,
    ) -> Result<TravelCost, CostError> {
        self.route(&[from, to], departure)
    }

    /// Travel cost through `points` in order, first successful tier wins.
    pub fn route(
        &self,
        points: &[(f64, f64)],
        departure: Option<NaiveDateTime>,
    ) -> Result<TravelCost, CostError> {
        let attempts: Vec<_> = self
            .backends
            .iter()
            .map(|backend| {
                let (departure, bucket) = if backend.is_time_dependent() {
                    let at = departure.unwrap_or_else(|| Local::now().naive_local());
                    (Some(at), Some(TimeBucket::from_departure(at)))
                } else {
                    (departure, None)
                };
                let key = Fingerprint::new(backend.kind(), points, bucket.as_ref());
                (backend, departure, bucket, key)
            })
            .collect();

        // any cached tier answers before a live call is made
        for (_, _, _, key) in &attempts {
            if let Some(entry) = self.cache.get(key) {
                return Ok(TravelCost::from_entry(entry));
            }
        }

        let mut last_failure: Option<(BackendKind, BackendError)> = None;

        for (backend, departure, bucket, key) in attempts {
            let kind = backend.kind();
            match backend.route(points, departure) {
                Ok(leg) => {
                    let entry = CostEntry {
                        distance_m: leg.distance_m,
                        duration_s: leg.duration_s,
                        duration_no_traffic_s: leg.duration_no_traffic_s,
                        polyline: leg.polyline.as_ref().map(|p| p.points().to_vec()),
                        provider: kind,
                        time_bucket: bucket.map(|b| b.as_str().to_string()),
                    };
                    if let Err(err) = self.cache.insert(key, entry) {
                        warn!(error = %err, "failed to persist cost cache entry");
                    }
                    return Ok(TravelCost::from_leg(leg, kind));
                }
                Err(err) => {
                    warn!(
                        tier = ?kind,
                        from = ?points.first(),
                        to = ?points.last(),
                        error = %err,
                        "routing tier failed, falling through"
                    );
                    last_failure = Some((kind, err));
                }
            }
        }

        match last_failure {
            Some((last_kind, last_error)) => Err(CostError::AllTiersFailed {
                attempts: self.backends.len(),
                last_kind,
                last_error,
            }),
            None => Err(CostError::NoBackends),
        }
    }

    /// Geometric estimate; never fails and never touches the cache.
    pub fn estimate(&self, from: (f64, f64), to: (f64, f64)) -> TravelCost {
        TravelCost::from_leg(self.estimator.estimate(from, to), BackendKind::Geometric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing(BackendKind);

    impl RoutingBackend for Failing {
        fn kind(&self) -> BackendKind {
            self.0
        }

        fn route(&self, _: &[(f64, f64)], _: Option<NaiveDateTime>) -> Result<RouteLeg, BackendError> {
            Err(BackendError::NoRoute)
        }
    }

    struct CountingOutage {
        calls: Arc<AtomicUsize>,
    }

    impl RoutingBackend for CountingOutage {
        fn kind(&self) -> BackendKind {
            BackendKind::Traffic
        }

        fn is_time_dependent(&self) -> bool {
            true
        }

        fn route(&self, _: &[(f64, f64)], _: Option<NaiveDateTime>) -> Result<RouteLeg, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::NoRoute)
        }
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl RoutingBackend for Counting {
        fn kind(&self) -> BackendKind {
            BackendKind::RoadNetwork
        }

        fn route(&self, _: &[(f64, f64)], _: Option<NaiveDateTime>) -> Result<RouteLeg, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RouteLeg {
                distance_m: 1000.0,
                duration_s: 120.0,
                duration_no_traffic_s: None,
                polyline: None,
            })
        }
    }

    #[test]
    fn falls_through_to_next_tier() {
        let provider = CostProvider::new(
            vec![
                Box::new(Failing(BackendKind::Traffic)),
                Box::new(HaversineMatrix::default()),
            ],
            Arc::new(CostCache::in_memory()),
        );
        let cost = provider.cost((41.10, 29.02), (41.11, 29.03), None).unwrap();
        assert_eq!(cost.provider, BackendKind::Geometric);
        assert!(!cost.cached);
    }

    #[test]
    fn all_tiers_failing_is_an_error() {
        let provider = CostProvider::new(
            vec![
                Box::new(Failing(BackendKind::Traffic)),
                Box::new(Failing(BackendKind::RoadNetwork)),
            ],
            Arc::new(CostCache::in_memory()),
        );
        let err = provider.cost((41.10, 29.02), (41.11, 29.03), None).unwrap_err();
        assert!(matches!(
            err,
            CostError::AllTiersFailed { attempts: 2, last_kind: BackendKind::RoadNetwork, .. }
        ));
    }

    #[test]
    fn no_backends_is_an_error() {
        let provider = CostProvider::new(Vec::new(), Arc::new(CostCache::in_memory()));
        assert!(matches!(
            provider.cost((0.0, 0.0), (0.0, 1.0), None),
            Err(CostError::NoBackends)
        ));
    }

    #[test]
    fn cache_hit_skips_backend() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = CostProvider::new(
            vec![Box::new(Counting { calls: calls.clone() })],
            Arc::new(CostCache::in_memory()),
        );
        let first = provider.cost((41.10, 29.02), (41.11, 29.03), None).unwrap();
        let second = provider.cost((41.10, 29.02), (41.11, 29.03), None).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.duration_s, second.duration_s);
    }

    #[test]
    fn cached_lower_tier_skips_dead_higher_tier() {
        let outage_calls = Arc::new(AtomicUsize::new(0));
        let road_calls = Arc::new(AtomicUsize::new(0));
        let provider = CostProvider::new(
            vec![
                Box::new(CountingOutage { calls: outage_calls.clone() }),
                Box::new(Counting { calls: road_calls.clone() }),
            ],
            Arc::new(CostCache::in_memory()),
        );
        let departure = NaiveDateTime::parse_from_str("2024-03-04 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();

        let first = provider.cost((41.10, 29.02), (41.11, 29.03), Some(departure)).unwrap();
        let second = provider.cost((41.10, 29.02), (41.11, 29.03), Some(departure)).unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.provider, BackendKind::RoadNetwork);
        assert_eq!(outage_calls.load(Ordering::SeqCst), 1);
        assert_eq!(road_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn estimate_uses_configured_speed() {
        let provider = CostProvider::new(Vec::new(), Arc::new(CostCache::in_memory()))
            .with_estimator(HaversineMatrix::new(36.0));
        let cost = provider.estimate((0.0, 0.0), (0.0, 0.01));
        // 36 km/h is 10 m/s
        assert!((cost.duration_s - cost.distance_m / 10.0).abs() < 1e-9);
    }
}
