use serde::Serialize;

use super::error::PlanError;
use super::types::{DeferredCompConfig, Horizon};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub year: i32,
    pub growth: f64,
    pub contribution: f64,
    pub disbursement: f64,
    pub balance: f64,
}

/// Deferred-compensation balances for every year of the horizon, computed in
/// one forward pass at construction.
#[derive(Debug, Clone)]
pub struct DeferredCompLedger {
    first_year: i32,
    last_year: i32,
    disbursement_start: i32,
    disbursement_end: i32,
    entries: Vec<LedgerEntry>,
}

impl DeferredCompLedger {
    /// `contributions[i]` is the deferral for working year `first_year + i`.
    ///
    /// Growth applies from the second plan year on, matching every other
    /// account, and stops once the window closes. The disbursement denominator
    /// counts down to the configured window end even when the horizon
    /// truncates the window. A zero-year window pays a single lump sum.
    pub fn new(horizon: &Horizon, config: &DeferredCompConfig, contributions: &[f64]) -> Self {
        let window = i32::try_from(config.window_years()).unwrap_or(i32::MAX);
        let disbursement_start = horizon.last_working_year.saturating_add(1);
        let disbursement_end = horizon.last_working_year.saturating_add(window);

        let mut balance = config.initial_balance;
        let mut entries = Vec::with_capacity(horizon.len());
        for year in horizon.years() {
            let growth = if year > horizon.first_year && year <= disbursement_end {
                balance * config.annual_growth_fraction
            } else {
                0.0
            };
            balance += growth;

            let mut contribution = 0.0;
            let mut disbursement = 0.0;
            if year <= horizon.last_working_year {
                contribution = contributions
                    .get((year - horizon.first_year) as usize)
                    .copied()
                    .unwrap_or(0.0);
                balance += contribution;
            } else if year <= disbursement_end {
                let remaining = disbursement_end - year + 1;
                if remaining == 1 {
                    disbursement = balance;
                    balance = 0.0;
                } else {
                    disbursement = balance / remaining as f64;
                    balance -= disbursement;
                }
            }

            entries.push(LedgerEntry {
                year,
                growth,
                contribution,
                disbursement,
                balance,
            });
        }

        Self {
            first_year: horizon.first_year,
            last_year: horizon.last_planning_year,
            disbursement_start,
            disbursement_end,
            entries,
        }
    }

    pub fn entry(&self, year: i32) -> Result<&LedgerEntry, PlanError> {
        let out_of_range = PlanError::YearOutOfRange {
            year,
            first: self.first_year,
            last: self.last_year,
        };
        if year < self.first_year {
            return Err(out_of_range);
        }
        self.entries
            .get((year - self.first_year) as usize)
            .ok_or(out_of_range)
    }

    /// End-of-year balance.
    pub fn balance(&self, year: i32) -> Result<f64, PlanError> {
        Ok(self.entry(year)?.balance)
    }

    pub fn disbursement(&self, year: i32) -> Result<f64, PlanError> {
        Ok(self.entry(year)?.disbursement)
    }

    pub fn is_disbursing(&self, year: i32) -> bool {
        year >= self.disbursement_start && year <= self.disbursement_end
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }
}
