//! Budget ledger: resource accounting across a run
//!
//! The ledger keeps two tallies. The heuristic estimate (`ceil(chars / 4)`
//! per recorded text) is always kept. Once any authoritative usage has been
//! recorded, the authoritative input+output sum supersedes the estimate as
//! the amount counted against the cap. Both stay readable so a report can
//! compare them side by side.

use serde::{Deserialize, Serialize};

/// Authoritative usage reported by a collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_units: u64,
    pub output_units: u64,
    pub cached_units: u64,
    pub cost: f64,
    pub duration_ms: u64,
}

impl Usage {
    pub fn total_units(&self) -> u64 {
        self.input_units + self.output_units
    }
}

/// Serializable snapshot of every counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub cap_units: u64,
    pub used_units: u64,
    pub remaining_units: u64,
    pub percentage: f64,
    pub estimated_units: u64,
    pub actual_input_units: u64,
    pub actual_output_units: u64,
    pub cached_units: u64,
    pub cost: f64,
    pub elapsed_ms: u64,
    pub has_actual: bool,
}

/// Estimate-vs-actual reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateComparison {
    pub estimated_units: u64,
    pub actual_units: u64,
    /// actual - estimated
    pub difference: i64,
    /// estimated / actual, as a percentage
    pub accuracy_percent: f64,
}

/// Running account of consumed units against a cap
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    cap_units: u64,
    estimated_units: u64,
    actual_input_units: u64,
    actual_output_units: u64,
    cached_units: u64,
    cost: f64,
    elapsed_ms: u64,
    has_actual: bool,
}

impl BudgetLedger {
    pub fn new(cap_units: u64) -> Self {
        Self {
            cap_units,
            estimated_units: 0,
            actual_input_units: 0,
            actual_output_units: 0,
            cached_units: 0,
            cost: 0.0,
            elapsed_ms: 0,
            has_actual: false,
        }
    }

    /// Heuristic units for a text: one unit per four characters, rounded up
    pub fn estimate_units(text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }

    /// Add heuristic units for `text`; returns the units added
    pub fn add_estimated(&mut self, text: &str) -> u64 {
        let units = Self::estimate_units(text);
        self.estimated_units += units;
        units
    }

    /// Add authoritative usage
    pub fn add_actual(&mut self, usage: &Usage) {
        self.actual_input_units += usage.input_units;
        self.actual_output_units += usage.output_units;
        self.cached_units += usage.cached_units;
        if usage.cost.is_finite() && usage.cost > 0.0 {
            self.cost += usage.cost;
        }
        self.elapsed_ms += usage.duration_ms;
        self.has_actual = true;
    }

    /// Units counted against the cap
    pub fn used_units(&self) -> u64 {
        if self.has_actual {
            self.actual_input_units + self.actual_output_units
        } else {
            self.estimated_units
        }
    }

    pub fn cap_units(&self) -> u64 {
        self.cap_units
    }

    pub fn has_actual(&self) -> bool {
        self.has_actual
    }

    /// Share of the cap consumed, clamped to [0, 100]; a zero cap counts as full
    pub fn percentage_of_cap(&self) -> f64 {
        if self.cap_units == 0 {
            return 100.0;
        }
        let pct = self.used_units() as f64 / self.cap_units as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    }

    /// Units left before the cap, never negative
    pub fn remaining(&self) -> u64 {
        self.cap_units.saturating_sub(self.used_units())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// `[#####-----] 50.0%` style bar of the given inner width
    pub fn progress_bar(&self, width: usize) -> String {
        let pct = self.percentage_of_cap();
        let filled = ((pct / 100.0) * width as f64).round() as usize;
        let filled = filled.min(width);
        format!(
            "[{}{}] {:.1}%",
            "#".repeat(filled),
            "-".repeat(width - filled),
            pct
        )
    }

    pub fn summary(&self) -> BudgetSummary {
        BudgetSummary {
            cap_units: self.cap_units,
            used_units: self.used_units(),
            remaining_units: self.remaining(),
            percentage: self.percentage_of_cap(),
            estimated_units: self.estimated_units,
            actual_input_units: self.actual_input_units,
            actual_output_units: self.actual_output_units,
            cached_units: self.cached_units,
            cost: self.cost,
            elapsed_ms: self.elapsed_ms,
            has_actual: self.has_actual,
        }
    }

    /// Side-by-side estimate vs. actual, once authoritative usage exists
    pub fn comparison(&self) -> Option<EstimateComparison> {
        if !self.has_actual {
            return None;
        }
        let actual = self.actual_input_units + self.actual_output_units;
        let accuracy_percent = if actual == 0 {
            0.0
        } else {
            self.estimated_units as f64 / actual as f64 * 100.0
        };
        Some(EstimateComparison {
            estimated_units: self.estimated_units,
            actual_units: actual,
            difference: actual as i64 - self.estimated_units as i64,
            accuracy_percent,
        })
    }

    /// Clear every counter, keeping the cap
    pub fn reset(&mut self) {
        *self = Self::new(self.cap_units);
    }
}
