//! Road-network segment index used to snap stops onto major roads.
//!
//! Segments are stored in an R-tree (via `rstar`) in a local metric frame
//! so nearest-point queries return true metre distances at city scale.

use std::io::Read;
use std::path::Path;

use geo::{Closest, ClosestPoint, Point};
use rstar::RTree;
use rstar::primitives::{GeomWithData, Line};
use serde::Deserialize;
use tracing::info;

use crate::error::RoadIndexError;
use crate::geometry::LocalFrame;
use crate::haversine::haversine_m;

/// OSM `highway` classification, reduced to what stop placement needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoadClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Residential,
    Service,
    Other,
}

impl RoadClass {
    /// Parse an OSM `highway` tag; `_link` ramps take their parent class.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().trim_end_matches("_link") {
            "motorway" => RoadClass::Motorway,
            "trunk" => RoadClass::Trunk,
            "primary" => RoadClass::Primary,
            "secondary" => RoadClass::Secondary,
            "tertiary" => RoadClass::Tertiary,
            "residential" | "living_street" | "unclassified" => RoadClass::Residential,
            "service" => RoadClass::Service,
            _ => RoadClass::Other,
        }
    }

    /// Roads a shuttle may stop on.
    pub fn is_major(self) -> bool {
        matches!(
            self,
            RoadClass::Motorway | RoadClass::Trunk | RoadClass::Primary | RoadClass::Secondary
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub way_id: u64,
    pub class: RoadClass,
    pub start: (f64, f64),
    pub end: (f64, f64),
}

/// Result of a snap query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    pub point: (f64, f64),
    pub distance_m: f64,
    /// Index of the matched segment in [`RoadIndex::segments`].
    pub segment: usize,
}

#[derive(Debug, Deserialize)]
struct SegmentRecord {
    way_id: u64,
    highway: String,
    start_lat: f64,
    start_lng: f64,
    end_lat: f64,
    end_lng: f64,
}

type SegmentEntry = GeomWithData<Line<[f64; 2]>, usize>;

pub struct RoadIndex {
    frame: LocalFrame,
    segments: Vec<RoadSegment>,
    major: RTree<SegmentEntry>,
}

impl RoadIndex {
    pub fn from_segments(segments: Vec<RoadSegment>) -> Self {
        let endpoints: Vec<(f64, f64)> = segments
            .iter()
            .flat_map(|segment| [segment.start, segment.end])
            .collect();
        let frame = LocalFrame::around(&endpoints);

        let entries: Vec<SegmentEntry> = segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.class.is_major())
            .map(|(i, segment)| {
                let (ax, ay) = frame.to_xy(segment.start);
                let (bx, by) = frame.to_xy(segment.end);
                GeomWithData::new(Line::new([ax, ay], [bx, by]), i)
            })
            .collect();

        Self {
            frame,
            segments,
            major: RTree::bulk_load(entries),
        }
    }

    /// Load segments from CSV with header
    /// `way_id,highway,start_lat,start_lng,end_lat,end_lng`.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, RoadIndexError> {
        let file = std::fs::File::open(path.as_ref())?;
        let index = Self::from_csv_reader(file)?;
        info!(
            path = %path.as_ref().display(),
            segments = index.len(),
            major = index.major_count(),
            "loaded road network"
        );
        Ok(index)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, RoadIndexError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut segments = Vec::new();
        for record in rdr.deserialize() {
            let record: SegmentRecord = record?;
            segments.push(RoadSegment {
                way_id: record.way_id,
                class: RoadClass::from_tag(&record.highway),
                start: (record.start_lat, record.start_lng),
                end: (record.end_lat, record.end_lng),
            });
        }
        Ok(Self::from_segments(segments))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn major_count(&self) -> usize {
        self.major.size()
    }

    pub fn segments(&self) -> &[RoadSegment] {
        &self.segments
    }

    /// Nearest point on any major road within `radius_m` of `point`.
    pub fn nearest_major_point(&self, point: (f64, f64), radius_m: f64) -> Option<SnapResult> {
        let query = self.frame.to_xy(point);
        let entry = self.major.nearest_neighbor(&[query.0, query.1])?;
        let [x, y] = entry.geom().nearest_point(&[query.0, query.1]);
        let snapped = self.frame.to_lat_lng((x, y));
        let distance_m = haversine_m(point, snapped);
        (distance_m <= radius_m).then_some(SnapResult {
            point: snapped,
            distance_m,
            segment: entry.data,
        })
    }
}

/// Nearest point to `point` on a single segment.
pub fn nearest_point_on_segment(point: (f64, f64), segment: &RoadSegment) -> (f64, f64) {
    let frame = LocalFrame::new(point);
    let line = geo::Line::new(frame.to_xy(segment.start), frame.to_xy(segment.end));
    match line.closest_point(&Point::from(frame.to_xy(point))) {
        Closest::Intersection(foot) | Closest::SinglePoint(foot) => frame.to_lat_lng(foot.x_y()),
        Closest::Indeterminate => segment.start,
    }
}
