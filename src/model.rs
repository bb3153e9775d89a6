//! Planner data model: commuters, clusters, stops and routes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::haversine::haversine_m;
use crate::polyline::Polyline;
use crate::traits::BackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommuterId(pub u32);

impl fmt::Display for CommuterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a commuter's pickup point was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupKind {
    /// Raw projection onto the vehicle's route.
    OnRoute,
    /// A stop that passed the side-of-road check.
    ValidatedStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickupPoint {
    pub location: (f64, f64),
    pub kind: PickupKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commuter {
    pub id: CommuterId,
    pub location: (f64, f64),
    pub cluster_id: Option<usize>,
    pub excluded: bool,
    pub exclusion_reason: Option<String>,
    pub pickup: Option<PickupPoint>,
}

impl Commuter {
    pub fn new(id: u32, location: (f64, f64)) -> Self {
        Self {
            id: CommuterId(id),
            location,
            cluster_id: None,
            excluded: false,
            exclusion_reason: None,
            pickup: None,
        }
    }

    pub fn exclude(&mut self, reason: impl Into<String>) {
        self.excluded = true;
        self.exclusion_reason = Some(reason.into());
        self.pickup = None;
    }

    pub fn is_active(&self) -> bool {
        !self.excluded
    }

    pub fn set_pickup(&mut self, location: (f64, f64), kind: PickupKind) {
        self.pickup = Some(PickupPoint { location, kind });
    }

    pub fn clear_pickup(&mut self) {
        self.pickup = None;
    }

    pub fn distance_to(&self, point: (f64, f64)) -> f64 {
        haversine_m(self.location, point)
    }
}

/// A physical pickup point serving some of a cluster's commuters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub location: (f64, f64),
    pub commuters: Vec<CommuterId>,
    /// Whether the location was moved onto a major road.
    pub snapped: bool,
}

impl Stop {
    pub fn load(&self) -> usize {
        self.commuters.len()
    }
}

/// A solved tour, destination first and last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub stops: Vec<(f64, f64)>,
    /// Road-following geometry, when a backend supplied one.
    pub polyline: Option<Polyline>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub duration_no_traffic_s: Option<f64>,
    pub provider: Option<BackendKind>,
}

impl Route {
    pub fn from_stops(stops: Vec<(f64, f64)>) -> Self {
        Self {
            stops,
            polyline: None,
            distance_m: 0.0,
            duration_s: 0.0,
            duration_no_traffic_s: None,
            provider: None,
        }
    }

    pub fn destination(&self) -> Option<(f64, f64)> {
        self.stops.first().copied()
    }

    /// Stops the vehicle serves, without the destination at either end.
    pub fn pickup_stops(&self) -> &[(f64, f64)] {
        match self.stops.len() {
            0..=2 => &[],
            n => &self.stops[1..n - 1],
        }
    }

    /// The detailed polyline, or the stop sequence when there is none.
    pub fn path(&self) -> Polyline {
        match &self.polyline {
            Some(polyline) if polyline.len() >= 2 => polyline.clone(),
            _ => Polyline::new(self.stops.clone()),
        }
    }

    pub fn traffic_delay_s(&self) -> Option<f64> {
        self.duration_no_traffic_s
            .map(|free_flow| self.duration_s - free_flow)
    }

    pub fn average_speed_kmh(&self) -> f64 {
        if self.duration_s > 0.0 {
            self.distance_m / self.duration_s * 3.6
        } else {
            0.0
        }
    }
}

/// A geographic group of commuters sharing one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: usize,
    pub center: (f64, f64),
    pub commuters: Vec<Commuter>,
}

impl Cluster {
    pub fn new(id: usize, center: (f64, f64)) -> Self {
        Self {
            id,
            center,
            commuters: Vec::new(),
        }
    }

    pub fn add_commuter(&mut self, mut commuter: Commuter) {
        commuter.cluster_id = Some(self.id);
        self.commuters.push(commuter);
    }

    /// Build clusters from the clustering collaborator's output.
    ///
    /// Commuters without a label, or with a label that has no centroid,
    /// are dropped.
    pub fn group(
        commuters: Vec<Commuter>,
        labels: &HashMap<CommuterId, usize>,
        centroids: &[(f64, f64)],
    ) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = centroids
            .iter()
            .enumerate()
            .map(|(id, center)| Cluster::new(id, *center))
            .collect();
        for commuter in commuters {
            if let Some(cluster) = labels
                .get(&commuter.id)
                .and_then(|label| clusters.get_mut(*label))
            {
                cluster.add_commuter(commuter);
            }
        }
        clusters
    }

    /// Exclude commuters farther than `max_distance_m` from the centre.
    /// Returns how many were newly excluded.
    pub fn exclude_far_commuters(&mut self, max_distance_m: f64) -> usize {
        let center = self.center;
        let mut excluded = 0;
        for commuter in self.commuters.iter_mut().filter(|c| c.is_active()) {
            let distance = commuter.distance_to(center);
            if distance > max_distance_m {
                commuter.exclude(format!("too far from cluster centre ({:.0} m)", distance));
                excluded += 1;
            }
        }
        excluded
    }

    pub fn active_commuters(&self) -> impl Iterator<Item = &Commuter> {
        self.commuters.iter().filter(|c| c.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_commuters().count()
    }
}
