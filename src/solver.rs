//! Closed-tour solver anchored at node 0.
//!
//! First solution by path-cheapest-arc, optionally refined with 2-opt.
//! Cluster tours are small (tens of stops), so the first solution is used
//! as-is unless local search is requested.

use serde::Deserialize;
use tracing::warn;

use crate::matrix::CostMatrix;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Maximum 2-opt improvement rounds; 0 keeps the first solution.
    pub local_search_iterations: usize,
}

/// Visiting order over matrix indices. Starts at 0; the return to 0 is
/// implicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tour {
    pub order: Vec<usize>,
}

impl Tour {
    /// Order with the return to the start appended.
    pub fn closed(&self) -> Vec<usize> {
        let mut closed = self.order.clone();
        if let Some(first) = self.order.first() {
            closed.push(*first);
        }
        closed
    }

    pub fn cost(&self, matrix: &CostMatrix) -> i64 {
        matrix.tour_cost(&self.order)
    }
}

pub fn solve_tour(matrix: &CostMatrix, options: &SolveOptions) -> Option<Tour> {
    if matrix.is_empty() || !matrix.is_square() {
        return None;
    }
    let mut order = cheapest_arc_path(matrix);
    local_search(&mut order, matrix, options);
    Some(Tour { order })
}

/// Map a solved tour back to coordinates, destination (`points[0]`) first
/// and last. Never fails: without a tour the input order is used.
pub fn solve_route(points: &[(f64, f64)], matrix: &CostMatrix, options: &SolveOptions) -> Vec<(f64, f64)> {
    let Some(&destination) = points.first() else {
        return Vec::new();
    };

    let tour = if matrix.len() == points.len() {
        solve_tour(matrix, options)
    } else {
        None
    };

    let mut route: Vec<(f64, f64)> = match tour {
        Some(tour) => tour.closed().into_iter().map(|i| points[i]).collect(),
        None => {
            warn!(
                points = points.len(),
                matrix = matrix.len(),
                "no tour found, using input order"
            );
            points.to_vec()
        }
    };

    if route.last() != Some(&destination) {
        route.push(destination);
    }
    route
}

fn cheapest_arc_path(matrix: &CostMatrix) -> Vec<usize> {
    let n = matrix.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut current = 0;
    visited[0] = true;
    order.push(0);

    while order.len() < n {
        let next = (0..n)
            .filter(|j| !visited[*j])
            .min_by_key(|j| (matrix.get(current, *j), *j));
        let Some(next) = next else {
            break;
        };
        visited[next] = true;
        order.push(next);
        current = next;
    }
    order
}

/// 2-opt: reverse a segment when it shortens the tour. Node 0 never moves.
fn two_opt_improve(order: &mut [usize], matrix: &CostMatrix) -> bool {
    let n = order.len();
    if n < 4 {
        return false;
    }

    let current_cost = matrix.tour_cost(order);
    for i in 0..n - 1 {
        for j in i + 2..n {
            order[i + 1..=j].reverse();
            if matrix.tour_cost(order) < current_cost {
                return true;
            }
            order[i + 1..=j].reverse();
        }
    }
    false
}

fn local_search(order: &mut [usize], matrix: &CostMatrix, options: &SolveOptions) {
    for _ in 0..options.local_search_iterations {
        if !two_opt_improve(order, matrix) {
            break;
        }
    }
}
