use serde::Serialize;

use super::error::PlanError;
use super::types::{EquityConfig, EquityGrant};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GrantKind {
    Previous,
    Annual,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantVesting {
    pub kind: GrantKind,
    pub grant_year: i32,
    /// Dollar value at grant; zero for previous grants, which are known by
    /// share count only.
    pub grant_value: f64,
    pub shares_granted: f64,
    pub shares_vesting: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingProjection {
    pub target_year: i32,
    pub vested_shares: f64,
    pub stock_price: f64,
    pub vested_value: f64,
    pub breakdown: Vec<GrantVesting>,
}

#[derive(Debug, Clone, Copy)]
struct ScheduledGrant {
    kind: GrantKind,
    year: i32,
    value: f64,
    shares: f64,
    period: u32,
}

impl ScheduledGrant {
    fn shares_vesting_in(self, year: i32) -> f64 {
        let first = self.year.saturating_add(1);
        let last = self.year.saturating_add(period_years(self.period));
        if year >= first && year <= last {
            self.shares / self.period as f64
        } else {
            0.0
        }
    }
}

fn period_years(period: u32) -> i32 {
    i32::try_from(period).unwrap_or(i32::MAX)
}

/// Projects vested equity value per year from known grants plus a stream of
/// synthesized annual grants. Immutable once built.
#[derive(Debug, Clone)]
pub struct EquityProjector {
    previous: Vec<ScheduledGrant>,
    base_year: i32,
    base_price: f64,
    price_growth: f64,
    initial_grant_value: f64,
    grant_increase: f64,
    last_grant_year: i32,
    default_period: u32,
}

impl EquityProjector {
    /// `first_year` anchors both the stock price and the annual grant stream;
    /// annual grants stop after `last_grant_year`.
    pub fn new(config: &EquityConfig, first_year: i32, last_grant_year: i32) -> Result<Self, PlanError> {
        if config.default_vesting_period_years == 0 {
            return Err(PlanError::InvalidVestingPeriod {
                grant_year: first_year,
            });
        }

        let previous = config
            .previous_grants
            .iter()
            .map(|grant| scheduled_previous(grant, config.default_vesting_period_years))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            previous,
            base_year: first_year,
            base_price: config.current_stock_price,
            price_growth: config.expected_share_price_growth_fraction,
            initial_grant_value: config.initial_annual_grant_value,
            grant_increase: config.annual_grant_increase_fraction,
            last_grant_year,
            default_period: config.default_vesting_period_years,
        })
    }

    /// Projected price; years before the base year discount backwards.
    pub fn price(&self, year: i32) -> f64 {
        self.base_price * (1.0 + self.price_growth).powi(year - self.base_year)
    }

    pub fn annual_grant_value(&self, grant_year: i32) -> f64 {
        self.initial_grant_value * (1.0 + self.grant_increase).powi(grant_year - self.base_year)
    }

    fn annual_grants(&self, target_year: i32) -> impl Iterator<Item = ScheduledGrant> + '_ {
        let horizon = target_year
            .saturating_add(period_years(self.default_period))
            .min(self.last_grant_year);
        (self.base_year..=horizon).filter_map(move |year| {
            let value = self.annual_grant_value(year);
            let price = self.price(year);
            if value > 0.0 && price > 0.0 {
                Some(ScheduledGrant {
                    kind: GrantKind::Annual,
                    year,
                    value,
                    shares: value / price,
                    period: self.default_period,
                })
            } else {
                None
            }
        })
    }

    pub fn project(&self, target_year: i32) -> VestingProjection {
        let stock_price = self.price(target_year);
        let breakdown: Vec<GrantVesting> = self
            .previous
            .iter()
            .copied()
            .chain(self.annual_grants(target_year))
            .filter_map(|grant| {
                let shares_vesting = grant.shares_vesting_in(target_year);
                (shares_vesting > 0.0).then(|| GrantVesting {
                    kind: grant.kind,
                    grant_year: grant.year,
                    grant_value: grant.value,
                    shares_granted: grant.shares,
                    shares_vesting,
                    value: shares_vesting * stock_price,
                })
            })
            .collect();

        let vested_shares: f64 = breakdown.iter().map(|row| row.shares_vesting).sum();
        VestingProjection {
            target_year,
            vested_shares,
            stock_price,
            vested_value: vested_shares * stock_price,
            breakdown,
        }
    }

    pub fn vesting_schedule(&self, from_year: i32, to_year: i32) -> Vec<VestingProjection> {
        (from_year..=to_year).map(|year| self.project(year)).collect()
    }
}

fn scheduled_previous(grant: &EquityGrant, default_period: u32) -> Result<ScheduledGrant, PlanError> {
    let period = grant.vesting_period_years.unwrap_or(default_period);
    if period == 0 {
        return Err(PlanError::InvalidVestingPeriod {
            grant_year: grant.year,
        });
    }
    Ok(ScheduledGrant {
        kind: GrantKind::Previous,
        year: grant.year,
        value: 0.0,
        shares: grant.grant_shares.max(0.0),
        period,
    })
}
