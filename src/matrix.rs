//! Pairwise travel-cost matrices over a cluster's points.
//!
//! Index 0 is always the destination. Dense matrices query the provider for
//! every unordered pair; sparse matrices only query each point's k nearest
//! neighbours (by great-circle distance) and estimate the rest, bounding
//! external calls to O(n·k).

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::info;

use crate::config::CostMetric;
use crate::error::{CostError, PlannerError};
use crate::haversine::haversine_m;
use crate::provider::CostProvider;
use crate::traits::BackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixStrategy {
    Dense,
    Sparse,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatrixOptions {
    /// Neighbours queried per point in the sparse strategy.
    pub k_nearest: usize,
    /// Concurrent provider calls.
    pub workers: usize,
    pub metric: CostMetric,
    /// Forces a strategy; otherwise sparse is used for traffic-aware providers.
    pub strategy: Option<MatrixStrategy>,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            k_nearest: 5,
            workers: 4,
            metric: CostMetric::Duration,
            strategy: None,
        }
    }
}

/// Square integer cost matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostMatrix {
    rows: Vec<Vec<i32>>,
}

impl CostMatrix {
    pub fn from_rows(rows: Vec<Vec<i32>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, from: usize, to: usize) -> i32 {
        self.rows[from][to]
    }

    pub fn row(&self, index: usize) -> &[i32] {
        &self.rows[index]
    }

    pub fn rows(&self) -> &[Vec<i32>] {
        &self.rows
    }

    pub fn is_square(&self) -> bool {
        let n = self.rows.len();
        self.rows.iter().all(|row| row.len() == n)
    }

    pub fn is_symmetric(&self) -> bool {
        if !self.is_square() {
            return false;
        }
        let n = self.rows.len();
        (0..n).all(|i| (i + 1..n).all(|j| self.rows[i][j] == self.rows[j][i]))
    }

    /// Cost of visiting `order` and returning to its first node.
    pub fn tour_cost(&self, order: &[usize]) -> i64 {
        if order.len() < 2 {
            return 0;
        }
        order
            .iter()
            .zip(order.iter().cycle().skip(1))
            .map(|(from, to)| i64::from(self.get(*from, *to)))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub strategy: MatrixStrategy,
    /// Pairs sent through the provider.
    pub provider_calls: usize,
    /// Unordered pairs in the matrix.
    pub possible_pairs: usize,
}

pub struct DistanceMatrixBuilder<'a> {
    provider: &'a CostProvider,
    options: MatrixOptions,
}

impl<'a> DistanceMatrixBuilder<'a> {
    pub fn new(provider: &'a CostProvider, options: MatrixOptions) -> Self {
        Self { provider, options }
    }

    pub fn strategy(&self) -> MatrixStrategy {
        self.options.strategy.unwrap_or(match self.provider.primary_kind() {
            Some(BackendKind::Traffic) => MatrixStrategy::Sparse,
            _ => MatrixStrategy::Dense,
        })
    }

    pub fn build(
        &self,
        points: &[(f64, f64)],
        departure: Option<NaiveDateTime>,
    ) -> Result<(CostMatrix, BuildStats), PlannerError> {
        let n = points.len();
        let strategy = self.strategy();
        let possible_pairs = n * n.saturating_sub(1) / 2;

        let queried: Vec<(usize, usize)> = match strategy {
            MatrixStrategy::Dense => (0..n).flat_map(|i| (i + 1..n).map(move |j| (i, j))).collect(),
            MatrixStrategy::Sparse => nearest_pairs(points, self.options.k_nearest),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .build()?;
        let metric = self.options.metric;
        let results: Vec<Result<(usize, usize, i32), CostError>> = pool.install(|| {
            queried
                .par_iter()
                .map(|&(i, j)| {
                    let cost = self.provider.cost(points[i], points[j], departure)?;
                    Ok((i, j, to_entry(cost.value(metric))))
                })
                .collect()
        });

        let mut rows = vec![vec![0i32; n]; n];
        let mut filled = vec![vec![false; n]; n];
        for result in results {
            let (i, j, value) = result?;
            rows[i][j] = value;
            rows[j][i] = value;
            filled[i][j] = true;
        }

        for i in 0..n {
            for j in i + 1..n {
                if filled[i][j] {
                    continue;
                }
                let value = to_entry(self.provider.estimate(points[i], points[j]).value(metric));
                rows[i][j] = value;
                rows[j][i] = value;
            }
        }

        let stats = BuildStats {
            strategy,
            provider_calls: queried.len(),
            possible_pairs,
        };
        info!(
            points = n,
            strategy = ?stats.strategy,
            provider_calls = stats.provider_calls,
            possible_pairs = stats.possible_pairs,
            "built cost matrix"
        );
        Ok((CostMatrix::from_rows(rows), stats))
    }
}

/// Unordered pairs linking every point to its `k` nearest neighbours.
pub fn nearest_pairs(points: &[(f64, f64)], k: usize) -> Vec<(usize, usize)> {
    let mut pairs = BTreeSet::new();
    for (i, point) in points.iter().enumerate() {
        let mut others: Vec<(usize, f64)> = points
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, other)| (j, haversine_m(*point, *other)))
            .collect();
        others.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        for (j, _) in others.into_iter().take(k) {
            pairs.insert((i.min(j), i.max(j)));
        }
    }
    pairs.into_iter().collect()
}

fn to_entry(value: f64) -> i32 {
    if !value.is_finite() {
        return i32::MAX;
    }
    value.round().clamp(1.0, f64::from(i32::MAX)) as i32
}
