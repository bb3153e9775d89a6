//! Stop placement within one cluster.

use serde::Deserialize;
use tracing::debug;

use crate::geometry::LocalFrame;
use crate::kmeans::{self, KMeansOptions};
use crate::model::{Commuter, Stop};
use crate::road::RoadIndex;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StopPlanOptions {
    /// Ideal number of commuters sharing one stop.
    pub commuters_per_stop: usize,
    pub min_stops: usize,
    pub max_stops: usize,
    pub snap_to_roads: bool,
    pub snap_radius_m: f64,
    pub kmeans: KMeansOptions,
}

impl Default for StopPlanOptions {
    fn default() -> Self {
        Self {
            commuters_per_stop: 2,
            min_stops: 1,
            max_stops: 15,
            snap_to_roads: true,
            snap_radius_m: 500.0,
            kmeans: KMeansOptions::default(),
        }
    }
}

/// `clamp(n / per_stop, min, max)`, with zero commuters needing zero stops.
pub fn target_stop_count(n: usize, per_stop: usize, min_stops: usize, max_stops: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let ideal = n / per_stop.max(1);
    let max_stops = max_stops.max(1);
    ideal.clamp(min_stops.min(max_stops), max_stops)
}

/// Stops for one cluster plus which stop each commuter uses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StopPlan {
    pub stops: Vec<Stop>,
    /// `assignments[i]` is the stop index of the i-th planned commuter.
    pub assignments: Vec<usize>,
    pub loads: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopStats {
    pub stop_count: usize,
    pub total_commuters: usize,
    pub average_load: f64,
    pub min_load: usize,
    pub max_load: usize,
    /// `min_load / max_load`; 1.0 is perfectly balanced.
    pub balance_ratio: f64,
}

impl StopPlan {
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn stats(&self) -> StopStats {
        let total: usize = self.loads.iter().sum();
        let min_load = self.loads.iter().copied().min().unwrap_or(0);
        let max_load = self.loads.iter().copied().max().unwrap_or(0);
        StopStats {
            stop_count: self.stops.len(),
            total_commuters: total,
            average_load: if self.loads.is_empty() {
                0.0
            } else {
                total as f64 / self.loads.len() as f64
            },
            min_load,
            max_load,
            balance_ratio: if max_load > 0 {
                min_load as f64 / max_load as f64
            } else {
                0.0
            },
        }
    }
}

pub struct StopPlanner<'a> {
    roads: Option<&'a RoadIndex>,
    options: StopPlanOptions,
}

impl<'a> StopPlanner<'a> {
    /// `roads` may be absent; stops then stay at their raw centroids.
    pub fn new(roads: Option<&'a RoadIndex>, options: StopPlanOptions) -> Self {
        Self { roads, options }
    }

    pub fn options(&self) -> &StopPlanOptions {
        &self.options
    }

    /// Plan stops for `commuters`, which should all be active.
    pub fn plan(&self, commuters: &[&Commuter]) -> StopPlan {
        let n = commuters.len();
        let target = target_stop_count(
            n,
            self.options.commuters_per_stop,
            self.options.min_stops,
            self.options.max_stops,
        );

        match n {
            0 => StopPlan::default(),
            1 => singletons(commuters),
            _ if n <= target => {
                let mut plan = singletons(commuters);
                for stop in &mut plan.stops {
                    self.snap(stop);
                }
                plan
            }
            _ => self.partition(commuters, target),
        }
    }

    fn partition(&self, commuters: &[&Commuter], k: usize) -> StopPlan {
        let locations: Vec<(f64, f64)> = commuters.iter().map(|c| c.location).collect();
        let frame = LocalFrame::around(&locations);
        let xy: Vec<(f64, f64)> = locations.iter().map(|p| frame.to_xy(*p)).collect();

        let result = kmeans::kmeans(&xy, k, &self.options.kmeans);

        let mut stops: Vec<Stop> = result
            .centroids
            .iter()
            .map(|centroid| Stop {
                location: frame.to_lat_lng(*centroid),
                commuters: Vec::new(),
                snapped: false,
            })
            .collect();
        for (commuter, label) in commuters.iter().zip(&result.labels) {
            stops[*label].commuters.push(commuter.id);
        }

        let mut snapped = 0;
        for stop in &mut stops {
            if self.snap(stop) {
                snapped += 1;
            }
        }
        debug!(
            commuters = commuters.len(),
            stops = stops.len(),
            snapped,
            "placed stops"
        );

        let loads = stops.iter().map(Stop::load).collect();
        StopPlan {
            stops,
            assignments: result.labels,
            loads,
        }
    }

    fn snap(&self, stop: &mut Stop) -> bool {
        if !self.options.snap_to_roads {
            return false;
        }
        let Some(roads) = self.roads else {
            return false;
        };
        match roads.nearest_major_point(stop.location, self.options.snap_radius_m) {
            Some(snap) => {
                stop.location = snap.point;
                stop.snapped = true;
                true
            }
            None => false,
        }
    }
}

fn singletons(commuters: &[&Commuter]) -> StopPlan {
    let stops: Vec<Stop> = commuters
        .iter()
        .map(|c| Stop {
            location: c.location,
            commuters: vec![c.id],
            snapped: false,
        })
        .collect();
    StopPlan {
        assignments: (0..stops.len()).collect(),
        loads: vec![1; stops.len()],
        stops,
    }
}
