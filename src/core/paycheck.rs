use serde::Serialize;

use super::tax::{MedicareRates, SocialSecurityRates};

/// Annual figures for one working year, as seen by payroll.
#[derive(Debug, Clone, Copy)]
pub struct PaycheckInputs {
    pub base_salary: f64,
    pub bonus: f64,
    pub pay_periods: u32,
    /// The bonus is paid in the period after this one.
    pub pay_period_preceding_bonus: u32,
    /// Federal ordinary-income tax on salary and bonus only; gains and equity
    /// income are not withheld from paychecks.
    pub annual_federal_tax: f64,
    pub effective_state_rate: f64,
    pub employee_401k: f64,
    pub employee_hsa: f64,
    pub base_deferral: f64,
    pub bonus_deferral: f64,
    pub medical_dental_vision: f64,
    pub social_security: SocialSecurityRates,
    pub medicare: MedicareRates,
    pub supplemental_federal_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaycheckBreakdown {
    pub gross: f64,
    pub federal_tax: f64,
    pub state_tax: f64,
    pub social_security: f64,
    pub medicare: f64,
    #[serde(rename = "contribution401k")]
    pub contribution_401k: f64,
    pub hsa: f64,
    pub deferred_comp: f64,
    pub medical_dental_vision: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusBreakdown {
    pub pay_period: u32,
    pub gross: f64,
    pub federal_tax: f64,
    pub state_tax: f64,
    pub social_security: f64,
    pub medicare: f64,
    pub deferred_comp: f64,
    pub net: f64,
}

/// Crossing periods are 1-indexed; zero means the threshold is never crossed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaycheckTiming {
    pub pay_periods: u32,
    pub ss_limit_period: u32,
    pub surcharge_period: u32,
    pub take_home_initial: f64,
    pub take_home_after_ss_limit: f64,
    pub take_home_after_surcharge: f64,
    pub social_security_withheld: f64,
    pub regular: PaycheckBreakdown,
    pub bonus: BonusBreakdown,
}

impl PaycheckTiming {
    pub fn ss_limit_reached(&self) -> Option<u32> {
        (self.ss_limit_period > 0).then_some(self.ss_limit_period)
    }

    pub fn surcharge_reached(&self) -> Option<u32> {
        (self.surcharge_period > 0).then_some(self.surcharge_period)
    }
}

#[derive(Debug, Clone, Copy)]
struct Crossings {
    ss_limit: Option<u32>,
    surcharge: Option<u32>,
    social_security_withheld: f64,
}

fn bonus_period(inputs: &PaycheckInputs, periods: u32) -> u32 {
    (inputs.pay_period_preceding_bonus + 1).clamp(1, periods)
}

/// Walks each pay period accumulating FICA wages. The regular paycheck is
/// counted before a bonus paid in the same period.
fn simulate_periods(inputs: &PaycheckInputs, periods: u32) -> Crossings {
    let regular = inputs.base_salary.max(0.0) / periods as f64;
    let bonus = inputs.bonus.max(0.0);
    let bonus_at = bonus_period(inputs, periods);
    let wage_base = inputs.social_security.wage_base;
    let threshold = inputs.medicare.surcharge_threshold;

    let mut cumulative = 0.0;
    let mut ss_limit = None;
    let mut surcharge = None;
    let mut withheld = 0.0;
    for period in 1..=periods {
        let mut wages = regular;
        if period == bonus_at {
            wages += bonus;
        }
        let room = (wage_base - cumulative).max(0.0);
        withheld += wages.min(room) * inputs.social_security.rate;
        cumulative += wages;

        if ss_limit.is_none() && cumulative > wage_base {
            ss_limit = Some(period);
        }
        if surcharge.is_none() && cumulative > threshold {
            surcharge = Some(period);
        }
    }

    Crossings {
        ss_limit,
        surcharge,
        social_security_withheld: withheld,
    }
}

fn bonus_breakdown(inputs: &PaycheckInputs, periods: u32) -> BonusBreakdown {
    let bonus = inputs.bonus.max(0.0);
    if bonus <= 0.0 {
        return BonusBreakdown::default();
    }
    let pay_period = bonus_period(inputs, periods);
    let prior_wages = inputs.base_salary.max(0.0) / periods as f64 * pay_period as f64;
    let deferred_comp = inputs.bonus_deferral.clamp(0.0, bonus);
    let taxable = bonus - deferred_comp;

    let ss_room = (inputs.social_security.wage_base - prior_wages).max(0.0);
    let social_security = bonus.min(ss_room) * inputs.social_security.rate;
    let above_threshold =
        (prior_wages + bonus - inputs.medicare.surcharge_threshold).clamp(0.0, bonus);
    let medicare =
        bonus * inputs.medicare.rate + above_threshold * inputs.medicare.surcharge_rate;
    let federal_tax = taxable * inputs.supplemental_federal_rate;
    let state_tax = taxable * inputs.effective_state_rate;

    BonusBreakdown {
        pay_period,
        gross: bonus,
        federal_tax,
        state_tax,
        social_security,
        medicare,
        deferred_comp,
        net: bonus - federal_tax - state_tax - social_security - medicare - deferred_comp,
    }
}

fn regular_breakdown(inputs: &PaycheckInputs, periods: u32, bonus_federal: f64) -> PaycheckBreakdown {
    let n = periods as f64;
    let gross = inputs.base_salary.max(0.0) / n;
    let contribution_401k = inputs.employee_401k.max(0.0) / n;
    let hsa = inputs.employee_hsa.max(0.0) / n;
    let deferred_comp = inputs.base_deferral.max(0.0) / n;
    let medical_dental_vision = inputs.medical_dental_vision.max(0.0) / n;

    let federal_tax = (inputs.annual_federal_tax - bonus_federal).max(0.0) / n;
    let state_taxable = (gross - contribution_401k - hsa - deferred_comp - medical_dental_vision).max(0.0);
    let state_tax = state_taxable * inputs.effective_state_rate;
    let social_security = gross * inputs.social_security.rate;
    let medicare = inputs
        .medicare
        .base_contribution(gross - medical_dental_vision);

    PaycheckBreakdown {
        gross,
        federal_tax,
        state_tax,
        social_security,
        medicare,
        contribution_401k,
        hsa,
        deferred_comp,
        medical_dental_vision,
        net: gross
            - federal_tax
            - state_tax
            - social_security
            - medicare
            - contribution_401k
            - hsa
            - deferred_comp
            - medical_dental_vision,
    }
}

pub fn simulate_paychecks(inputs: &PaycheckInputs) -> PaycheckTiming {
    let periods = inputs.pay_periods.max(1);
    let crossings = simulate_periods(inputs, periods);
    let bonus = bonus_breakdown(inputs, periods);
    let regular = regular_breakdown(inputs, periods, bonus.federal_tax);

    let surcharge_per_period = regular.gross * inputs.medicare.surcharge_rate;
    let take_home_initial = regular.net;
    let take_home_after_ss_limit = take_home_initial + regular.social_security;
    // Surcharge reached while SS is still withheld.
    let surcharge_first = match (crossings.surcharge, crossings.ss_limit) {
        (Some(surcharge), Some(limit)) => surcharge < limit,
        (Some(_), None) => true,
        (None, _) => false,
    };
    let take_home_after_surcharge = if surcharge_first {
        take_home_initial - surcharge_per_period
    } else {
        take_home_after_ss_limit - surcharge_per_period
    };

    PaycheckTiming {
        pay_periods: periods,
        ss_limit_period: crossings.ss_limit.unwrap_or(0),
        surcharge_period: crossings.surcharge.unwrap_or(0),
        take_home_initial,
        take_home_after_ss_limit,
        take_home_after_surcharge,
        social_security_withheld: crossings.social_security_withheld,
        regular,
        bonus,
    }
}
