//! Polyline representation for route geometries.
//!
//! This module provides a type for working with polylines as decoded
//! coordinate sequences, plus a planar view used for projection,
//! arc-length interpolation and side-of-road tests.

use geo::{LineInterpolatePoint, LineLocatePoint, LineString, Point};
use serde::{Deserialize, Serialize};

use crate::geometry::{self, LocalFrame};

/// A polyline representing a route geometry as decoded coordinates.
///
/// Stores latitude/longitude points directly for internal processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    /// Creates a new Polyline from decoded coordinate points.
    ///
    /// Each point is a (latitude, longitude) tuple.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Returns a reference to the coordinate points.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Consumes the polyline and returns the owned coordinate points.
    pub fn into_points(self) -> Vec<(f64, f64)> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Planar view in a frame centred on this polyline.
    ///
    /// Returns `None` when the polyline has fewer than two points or zero
    /// length, since no direction can be derived from it.
    pub fn planar(&self) -> Option<PlanarPolyline> {
        self.planar_in(LocalFrame::around(&self.points))
    }

    pub fn planar_in(&self, frame: LocalFrame) -> Option<PlanarPolyline> {
        if self.points.len() < 2 {
            return None;
        }
        let xy: Vec<(f64, f64)> = self.points.iter().map(|p| frame.to_xy(*p)).collect();
        let length_m: f64 = xy.windows(2).map(|pair| geometry::distance(pair[0], pair[1])).sum();
        if length_m <= f64::EPSILON {
            return None;
        }
        Some(PlanarPolyline {
            frame,
            line: LineString::from(xy),
            length_m,
        })
    }
}

/// Where a point lands when projected onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Distance along the polyline from its first point, in metres.
    pub arc_m: f64,
    /// The projected point as (lat, lng).
    pub point: (f64, f64),
    /// Straight-line distance from the input point to the projection.
    pub offset_m: f64,
}

/// A polyline in a local metric frame.
#[derive(Debug, Clone)]
pub struct PlanarPolyline {
    frame: LocalFrame,
    line: LineString<f64>,
    length_m: f64,
}

impl PlanarPolyline {
    pub fn frame(&self) -> LocalFrame {
        self.frame
    }

    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    /// Project a (lat, lng) point onto the nearest position of the line.
    pub fn project(&self, point: (f64, f64)) -> Projection {
        let p = self.frame.to_xy(point);
        let fraction = self
            .line
            .line_locate_point(&Point::from(p))
            .unwrap_or(0.0);
        let foot = self.at_fraction(fraction);
        Projection {
            arc_m: fraction * self.length_m,
            point: self.frame.to_lat_lng(foot),
            offset_m: geometry::distance(p, foot),
        }
    }

    /// Distance from a (lat, lng) point to the line, in metres.
    pub fn distance_to(&self, point: (f64, f64)) -> f64 {
        self.project(point).offset_m
    }

    /// Planar point at `arc_m` along the line (clamped to its ends).
    pub fn interpolate(&self, arc_m: f64) -> (f64, f64) {
        self.at_fraction(arc_m.clamp(0.0, self.length_m) / self.length_m)
    }

    fn at_fraction(&self, fraction: f64) -> (f64, f64) {
        match self.line.line_interpolate_point(fraction) {
            Some(point) => point.x_y(),
            None => self.line.0[0].x_y(),
        }
    }

    /// Local direction of travel at `arc_m`, sampled `sample_m` either side.
    ///
    /// Returns the raw (unnormalised) difference vector and the sample start.
    pub fn tangent(&self, arc_m: f64, sample_m: f64) -> ((f64, f64), (f64, f64)) {
        let p1 = self.interpolate(arc_m - sample_m);
        let p2 = self.interpolate(arc_m + sample_m);
        ((p2.0 - p1.0, p2.1 - p1.1), p1)
    }

    /// Signed perpendicular offset of `point` from the line, in metres.
    ///
    /// Positive values lie to the left of the direction of travel. Points
    /// where the sampled tangent vanishes (e.g. a U-turn vertex) report 0.
    pub fn side_offset(&self, point: (f64, f64), sample_m: f64) -> f64 {
        let projection = self.project(point);
        let (v, p1) = self.tangent(projection.arc_m, sample_m);
        let norm = v.0.hypot(v.1);
        if norm <= 1e-9 {
            return 0.0;
        }
        let p = self.frame.to_xy(point);
        let w = (p.0 - p1.0, p.1 - p1.1);
        geometry::cross(v, w) / norm
    }
}
