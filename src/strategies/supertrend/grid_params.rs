//! Grid Search Parameters for SuperTrend
//!
//! Cartesian product of ATR periods and band multipliers.

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use super::config::SuperTrendConfig;

/// Grid search parameter combinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub periods: Vec<usize>,
    pub multipliers: Vec<f64>,
}

impl GridParams {
    /// Quick mode - a handful of combinations for smoke runs
    pub fn quick() -> Self {
        Self {
            periods: vec![10, 14, 20],
            multipliers: vec![3.0, 4.5, 6.0],
        }
    }

    /// Reference sweep: periods 7..=27, multipliers 4.5..=10.5 in 0.3 steps
    pub fn reference() -> Self {
        Self {
            periods: (7..=27).collect(),
            // built from integer tenths so 10.5 is hit exactly
            multipliers: (0..21).map(|i| f64::from(45 + 3 * i) / 10.0).collect(),
        }
    }

    /// Custom grid from vectors
    pub fn custom(periods: Vec<usize>, multipliers: Vec<f64>) -> Self {
        Self {
            periods,
            multipliers,
        }
    }

    /// Total number of combinations
    pub fn total_combinations(&self) -> usize {
        self.periods.len() * self.multipliers.len()
    }

    /// All (period, multiplier) pairs, period-major
    pub fn combinations(&self) -> Vec<SuperTrendConfig> {
        iproduct!(&self.periods, &self.multipliers)
            .map(|(&period, &multiplier)| SuperTrendConfig::new(period, multiplier))
            .collect()
    }
}

impl Default for GridParams {
    fn default() -> Self {
        Self::reference()
    }
}
