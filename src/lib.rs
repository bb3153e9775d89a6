//! shuttle-planner
//!
//! Pickup stop placement and route assignment for clustered commuters:
//! stops are derived per cluster, costed through a tiered and cached set of
//! routing backends, ordered into a closed tour from a fixed destination,
//! and every commuter is matched to a stop on their side of the road.

pub mod cache;
pub mod config;
pub mod error;
pub mod geometry;
pub mod haversine;
pub mod kmeans;
pub mod matcher;
pub mod matrix;
pub mod model;
pub mod osrm;
pub mod osrm_data;
pub mod pipeline;
pub mod polyline;
pub mod provider;
pub mod road;
pub mod solver;
pub mod stops;
pub mod tomtom;
pub mod traits;
