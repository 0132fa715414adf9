use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::error::PlanError;
use super::paycheck::PaycheckTiming;

const MEDICARE_ELIGIBILITY_AGE: i32 = 65;
const DEFAULT_WORKING_YEARS: i32 = 10;
const DEFAULT_RETIREMENT_YEARS: i32 = 30;

/// Longest span, first year through last planning year, a plan may cover.
pub const MAX_PLAN_YEARS: i32 = 150;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Working,
    Disbursement,
    PostDisbursement,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaySchedule {
    Weekly,
    #[default]
    BiWeekly,
    SemiMonthly,
    Monthly,
}

impl PaySchedule {
    pub fn periods_per_year(self) -> u32 {
        match self {
            PaySchedule::Weekly => 52,
            PaySchedule::BiWeekly => 26,
            PaySchedule::SemiMonthly => 24,
            PaySchedule::Monthly => 12,
        }
    }
}

/// Household plan inputs. Every section is optional in JSON; absent fields
/// fall back to the defaults below.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanConfig {
    pub first_year: i32,
    pub last_working_year: Option<i32>,
    pub last_planning_year: Option<i32>,
    pub birth_year: Option<i32>,
    pub federal_bracket_inflation: f64,
    pub espp_discount: f64,
    pub income: IncomeConfig,
    pub restricted_stock_units: EquityConfig,
    pub deferred_compensation_plan: DeferredCompConfig,
    pub investments: InvestmentConfig,
    pub deductions: DeductionConfig,
    pub local_tax: LocalTaxConfig,
    pub insurance: InsuranceConfig,
    pub expenses: ExpenseConfig,
    pub company_provided_life_insurance: LifeInsuranceConfig,
    pub paycheck: PaycheckConfig,
    pub withdrawal: WithdrawalConfig,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            first_year: 2026,
            last_working_year: None,
            last_planning_year: None,
            birth_year: None,
            federal_bracket_inflation: 0.03,
            espp_discount: 0.0,
            income: IncomeConfig::default(),
            restricted_stock_units: EquityConfig::default(),
            deferred_compensation_plan: DeferredCompConfig::default(),
            investments: InvestmentConfig::default(),
            deductions: DeductionConfig::default(),
            local_tax: LocalTaxConfig::default(),
            insurance: InsuranceConfig::default(),
            expenses: ExpenseConfig::default(),
            company_provided_life_insurance: LifeInsuranceConfig::default(),
            paycheck: PaycheckConfig::default(),
            withdrawal: WithdrawalConfig::default(),
        }
    }
}

impl PlanConfig {
    pub fn horizon(&self) -> Result<Horizon, PlanError> {
        let invalid = |reason: String| PlanError::InvalidHorizon { reason };
        let first_year = self.first_year;
        let last_working_year = match self.last_working_year {
            Some(year) => year,
            None => first_year.checked_add(DEFAULT_WORKING_YEARS).ok_or_else(|| {
                invalid(format!("no default last working year after {first_year}"))
            })?,
        };
        let last_planning_year = match self.last_planning_year {
            Some(year) => year,
            None => last_working_year
                .checked_add(DEFAULT_RETIREMENT_YEARS)
                .ok_or_else(|| {
                    invalid(format!("no default last planning year after {last_working_year}"))
                })?,
        };

        if last_working_year < first_year {
            return Err(invalid(format!(
                "last working year {last_working_year} precedes first year {first_year}"
            )));
        }
        if last_planning_year < last_working_year {
            return Err(invalid(format!(
                "last planning year {last_planning_year} precedes last working year {last_working_year}"
            )));
        }
        let span = i64::from(last_planning_year) - i64::from(first_year) + 1;
        if span > i64::from(MAX_PLAN_YEARS) {
            return Err(invalid(format!(
                "plan spans {span} years, at most {MAX_PLAN_YEARS} are supported"
            )));
        }

        let window = self.deferred_compensation_plan.window_years();
        let window = i32::try_from(window)
            .ok()
            .filter(|years| *years <= MAX_PLAN_YEARS)
            .ok_or_else(|| {
                invalid(format!(
                    "disbursement window of {window} years exceeds {MAX_PLAN_YEARS}"
                ))
            })?;
        Ok(Horizon {
            first_year,
            last_working_year,
            last_planning_year,
            last_disbursement_year: last_working_year
                .saturating_add(window)
                .min(last_planning_year),
        })
    }

    pub fn medicare_eligibility_year(&self) -> Option<i32> {
        self.birth_year
            .and_then(|year| year.checked_add(MEDICARE_ELIGIBILITY_AGE))
    }

    pub fn is_medicare_eligible(&self, year: i32) -> bool {
        self.medicare_eligibility_year()
            .is_some_and(|eligible| year >= eligible)
    }
}

/// Resolved year boundaries of a plan. The disbursement window is already
/// truncated to the planning horizon.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Horizon {
    pub first_year: i32,
    pub last_working_year: i32,
    pub last_planning_year: i32,
    pub last_disbursement_year: i32,
}

impl Horizon {
    pub fn years(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_planning_year
    }

    pub fn len(&self) -> usize {
        (self.last_planning_year - self.first_year + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.last_planning_year < self.first_year
    }

    pub fn contains(&self, year: i32) -> bool {
        self.years().contains(&year)
    }

    pub fn check(&self, year: i32) -> Result<(), PlanError> {
        if self.contains(year) {
            Ok(())
        } else {
            Err(PlanError::YearOutOfRange {
                year,
                first: self.first_year,
                last: self.last_planning_year,
            })
        }
    }

    pub fn phase(&self, year: i32) -> Result<Phase, PlanError> {
        self.check(year)?;
        Ok(if year <= self.last_working_year {
            Phase::Working
        } else if year <= self.last_disbursement_year {
            Phase::Disbursement
        } else {
            Phase::PostDisbursement
        })
    }

    pub fn working_years(&self) -> usize {
        (self.last_working_year - self.first_year + 1) as usize
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncomeConfig {
    pub base_salary: f64,
    pub bonus_fraction: f64,
    pub annual_base_increase_fraction: f64,
    pub other_income: f64,
    pub base_deferral_fraction: f64,
    pub bonus_deferral_fraction: f64,
    pub realized_short_term_capital_gains_percent: f64,
    pub realized_long_term_capital_gains_percent: f64,
    /// First-year ESPP benefit override.
    pub espp_income: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EquityConfig {
    pub previous_grants: Vec<EquityGrant>,
    pub current_stock_price: f64,
    pub initial_annual_grant_value: f64,
    pub annual_grant_increase_fraction: f64,
    pub expected_share_price_growth_fraction: f64,
    pub default_vesting_period_years: u32,
}

impl Default for EquityConfig {
    fn default() -> Self {
        Self {
            previous_grants: Vec::new(),
            current_stock_price: 0.0,
            initial_annual_grant_value: 0.0,
            annual_grant_increase_fraction: 0.0,
            expected_share_price_growth_fraction: 0.0,
            default_vesting_period_years: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityGrant {
    pub year: i32,
    #[serde(default)]
    pub grant_shares: f64,
    #[serde(default)]
    pub vesting_period_years: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeferredCompConfig {
    pub annual_growth_fraction: f64,
    #[serde(alias = "dispursementYears")]
    pub disbursement_years: u32,
    pub initial_balance: f64,
}

impl DeferredCompConfig {
    /// Years over which the balance is paid out. A zero-year window pays it
    /// as one lump sum in the first retirement year.
    pub fn window_years(&self) -> u32 {
        self.disbursement_years.max(1)
    }
}

impl Default for DeferredCompConfig {
    fn default() -> Self {
        Self {
            annual_growth_fraction: 0.05,
            disbursement_years: 10,
            initial_balance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InvestmentConfig {
    pub taxable_balance: f64,
    pub taxable_appreciation_rate: f64,
    pub tax_deferred_balance: f64,
    pub tax_deferred_appreciation_rate: f64,
    pub hsa_balance: f64,
    pub hsa_appreciation_rate: f64,
    #[serde(rename = "employer401kMatchPercent")]
    pub employer_401k_match_percent: f64,
    #[serde(rename = "employer401kMatchMaxSalaryPercent")]
    pub employer_401k_match_max_salary_percent: f64,
    pub hsa_employer_contribution: f64,
    pub hsa_annual_withdrawal: f64,
    pub hsa_withdrawal_inflation_rate: f64,
}

impl Default for InvestmentConfig {
    fn default() -> Self {
        Self {
            taxable_balance: 0.0,
            taxable_appreciation_rate: 0.06,
            tax_deferred_balance: 0.0,
            tax_deferred_appreciation_rate: 0.08,
            hsa_balance: 0.0,
            hsa_appreciation_rate: 0.07,
            employer_401k_match_percent: 0.0,
            employer_401k_match_max_salary_percent: 0.0,
            hsa_employer_contribution: 0.0,
            hsa_annual_withdrawal: 0.0,
            hsa_withdrawal_inflation_rate: 0.04,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeductionConfig {
    pub medical_dental_vision: f64,
    pub medical_inflation_rate: f64,
}

impl Default for DeductionConfig {
    fn default() -> Self {
        Self {
            medical_dental_vision: 0.0,
            medical_inflation_rate: 0.04,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalTaxConfig {
    pub real_estate: f64,
    pub inflation_rate: f64,
}

impl Default for LocalTaxConfig {
    fn default() -> Self {
        Self {
            real_estate: 0.0,
            inflation_rate: 0.03,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InsuranceConfig {
    pub full_insurance_premiums: f64,
    pub medicare_premiums: f64,
    pub premium_inflation_rate: f64,
}

impl Default for InsuranceConfig {
    fn default() -> Self {
        Self {
            full_insurance_premiums: 0.0,
            medicare_premiums: 0.0,
            premium_inflation_rate: 0.04,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExpenseConfig {
    pub annual_amount: f64,
    pub inflation_rate: f64,
    pub special_expenses: Vec<SpecialExpense>,
}

impl Default for ExpenseConfig {
    fn default() -> Self {
        Self {
            annual_amount: 0.0,
            inflation_rate: 0.03,
            special_expenses: Vec::new(),
        }
    }
}

impl ExpenseConfig {
    pub fn special_for(&self, year: i32) -> f64 {
        self.special_expenses
            .iter()
            .filter(|expense| expense.year == year)
            .map(|expense| expense.amount)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialExpense {
    pub year: i32,
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LifeInsuranceConfig {
    pub annual_premium: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaycheckConfig {
    pub pay_schedule: PaySchedule,
    pub pay_period_preceding_bonus: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WithdrawalConfig {
    pub max_iterations: u32,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self { max_iterations: 5 }
    }
}

/// One calendar year of the plan. Every field is populated for every phase;
/// figures that do not apply to a phase stay at zero.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year: i32,
    pub phase: Phase,

    pub base_salary: f64,
    pub bonus: f64,
    pub other_income: f64,
    pub espp_income: f64,
    pub equity_vested_value: f64,
    pub short_term_capital_gains: f64,
    pub long_term_capital_gains: f64,
    pub deferred_comp_disbursement: f64,
    pub tax_deferred_withdrawal: f64,
    pub gross_income: f64,
    pub earned_income_for_fica: f64,

    pub standard_deduction: f64,
    pub itemized_deduction: f64,
    pub max_401k: f64,
    pub max_hsa: f64,
    pub employee_hsa: f64,
    pub employer_hsa: f64,
    pub medical_dental_vision: f64,
    pub total_deductions: f64,

    pub base_deferral: f64,
    pub bonus_deferral: f64,
    pub total_deferral: f64,

    pub adjusted_gross_income: f64,

    pub ordinary_income_tax: f64,
    pub long_term_capital_gains_tax: f64,
    pub federal_tax: f64,
    pub marginal_bracket: f64,

    pub social_security_tax: f64,
    pub medicare_tax: f64,
    pub medicare_surcharge: f64,
    pub total_fica: f64,

    pub state_income_tax: f64,
    pub state_short_term_capital_gains_tax: f64,
    pub state_tax: f64,
    pub local_tax: f64,

    pub total_taxes: f64,
    pub effective_tax_rate: f64,
    pub take_home_pay: f64,

    pub paycheck: PaycheckTiming,

    pub employee_401k_contribution: f64,
    pub employer_401k_match: f64,
    pub total_401k_contribution: f64,
    pub hsa_contribution: f64,
    pub deferred_comp_contribution: f64,
    pub total_contributions: f64,

    pub annual_expenses: f64,
    pub special_expenses: f64,
    pub medical_premium: f64,
    pub medical_premium_expense: f64,
    pub total_expenses: f64,
    pub income_expense_difference: f64,
    pub hsa_withdrawal: f64,
    pub taxable_account_adjustment: f64,
    pub unfunded_shortfall: f64,

    pub appreciation_taxable: f64,
    pub appreciation_tax_deferred: f64,
    pub appreciation_hsa: f64,
    pub appreciation_deferred_comp: f64,
    pub total_appreciation: f64,

    pub balance_taxable: f64,
    pub balance_tax_deferred: f64,
    pub balance_hsa: f64,
    pub balance_deferred_comp: f64,
    pub total_assets: f64,
}

impl YearRecord {
    pub fn new(year: i32, phase: Phase) -> Self {
        Self {
            year,
            phase,
            base_salary: 0.0,
            bonus: 0.0,
            other_income: 0.0,
            espp_income: 0.0,
            equity_vested_value: 0.0,
            short_term_capital_gains: 0.0,
            long_term_capital_gains: 0.0,
            deferred_comp_disbursement: 0.0,
            tax_deferred_withdrawal: 0.0,
            gross_income: 0.0,
            earned_income_for_fica: 0.0,
            standard_deduction: 0.0,
            itemized_deduction: 0.0,
            max_401k: 0.0,
            max_hsa: 0.0,
            employee_hsa: 0.0,
            employer_hsa: 0.0,
            medical_dental_vision: 0.0,
            total_deductions: 0.0,
            base_deferral: 0.0,
            bonus_deferral: 0.0,
            total_deferral: 0.0,
            adjusted_gross_income: 0.0,
            ordinary_income_tax: 0.0,
            long_term_capital_gains_tax: 0.0,
            federal_tax: 0.0,
            marginal_bracket: 0.0,
            social_security_tax: 0.0,
            medicare_tax: 0.0,
            medicare_surcharge: 0.0,
            total_fica: 0.0,
            state_income_tax: 0.0,
            state_short_term_capital_gains_tax: 0.0,
            state_tax: 0.0,
            local_tax: 0.0,
            total_taxes: 0.0,
            effective_tax_rate: 0.0,
            take_home_pay: 0.0,
            paycheck: PaycheckTiming::default(),
            employee_401k_contribution: 0.0,
            employer_401k_match: 0.0,
            total_401k_contribution: 0.0,
            hsa_contribution: 0.0,
            deferred_comp_contribution: 0.0,
            total_contributions: 0.0,
            annual_expenses: 0.0,
            special_expenses: 0.0,
            medical_premium: 0.0,
            medical_premium_expense: 0.0,
            total_expenses: 0.0,
            income_expense_difference: 0.0,
            hsa_withdrawal: 0.0,
            taxable_account_adjustment: 0.0,
            unfunded_shortfall: 0.0,
            appreciation_taxable: 0.0,
            appreciation_tax_deferred: 0.0,
            appreciation_hsa: 0.0,
            appreciation_deferred_comp: 0.0,
            total_appreciation: 0.0,
            balance_taxable: 0.0,
            balance_tax_deferred: 0.0,
            balance_hsa: 0.0,
            balance_deferred_comp: 0.0,
            total_assets: 0.0,
        }
    }

    pub fn income_components_total(&self) -> f64 {
        self.base_salary
            + self.bonus
            + self.other_income
            + self.espp_income
            + self.equity_vested_value
            + self.short_term_capital_gains
            + self.long_term_capital_gains
            + self.deferred_comp_disbursement
            + self.tax_deferred_withdrawal
    }

    pub fn tax_components_total(&self) -> f64 {
        self.federal_tax + self.total_fica + self.state_tax
    }

    pub fn balance_components_total(&self) -> f64 {
        self.balance_taxable + self.balance_tax_deferred + self.balance_hsa + self.balance_deferred_comp
    }

    pub fn appreciation_components_total(&self) -> f64 {
        self.appreciation_taxable
            + self.appreciation_tax_deferred
            + self.appreciation_hsa
            + self.appreciation_deferred_comp
    }

    pub fn is_working(&self) -> bool {
        self.phase == Phase::Working
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeTotals {
    pub gross_income: f64,
    pub federal_tax: f64,
    pub fica: f64,
    pub state_tax: f64,
    pub local_tax: f64,
    pub total_taxes: f64,
    pub take_home_pay: f64,
    pub deferred_comp_disbursements: f64,
    pub tax_deferred_withdrawals: f64,
    pub unfunded_shortfall: f64,
}

impl LifetimeTotals {
    pub fn accumulate(&mut self, record: &YearRecord) {
        self.gross_income += record.gross_income;
        self.federal_tax += record.federal_tax;
        self.fica += record.total_fica;
        self.state_tax += record.state_tax;
        self.local_tax += record.local_tax;
        self.total_taxes += record.total_taxes;
        self.take_home_pay += record.take_home_pay;
        self.deferred_comp_disbursements += record.deferred_comp_disbursement;
        self.tax_deferred_withdrawals += record.tax_deferred_withdrawal;
        self.unfunded_shortfall += record.unfunded_shortfall;
    }

    /// `other - self`, field by field.
    pub fn difference(&self, other: &LifetimeTotals) -> LifetimeTotals {
        LifetimeTotals {
            gross_income: other.gross_income - self.gross_income,
            federal_tax: other.federal_tax - self.federal_tax,
            fica: other.fica - self.fica,
            state_tax: other.state_tax - self.state_tax,
            local_tax: other.local_tax - self.local_tax,
            total_taxes: other.total_taxes - self.total_taxes,
            take_home_pay: other.take_home_pay - self.take_home_pay,
            deferred_comp_disbursements: other.deferred_comp_disbursements
                - self.deferred_comp_disbursements,
            tax_deferred_withdrawals: other.tax_deferred_withdrawals
                - self.tax_deferred_withdrawals,
            unfunded_shortfall: other.unfunded_shortfall - self.unfunded_shortfall,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalBalances {
    pub taxable: f64,
    pub tax_deferred: f64,
    pub hsa: f64,
    pub deferred_comp: f64,
    pub total_assets: f64,
}

impl FinalBalances {
    pub fn from_record(record: &YearRecord) -> Self {
        Self {
            taxable: record.balance_taxable,
            tax_deferred: record.balance_tax_deferred,
            hsa: record.balance_hsa,
            deferred_comp: record.balance_deferred_comp,
            total_assets: record.total_assets,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub first_year: i32,
    pub last_working_year: i32,
    pub last_planning_year: i32,
    pub years: Vec<YearRecord>,
    pub totals: LifetimeTotals,
    pub final_balances: FinalBalances,
}

impl PlanResult {
    pub fn year(&self, year: i32) -> Result<&YearRecord, PlanError> {
        let out_of_range = || PlanError::YearOutOfRange {
            year,
            first: self.first_year,
            last: self.last_planning_year,
        };
        if year < self.first_year {
            return Err(out_of_range());
        }
        self.years
            .get((year - self.first_year) as usize)
            .ok_or_else(out_of_range)
    }

    pub fn working_years(&self) -> impl Iterator<Item = &YearRecord> {
        self.years.iter().filter(|record| record.is_working())
    }

    pub fn retirement_years(&self) -> impl Iterator<Item = &YearRecord> {
        self.years.iter().filter(|record| !record.is_working())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_documented_defaults() {
        let config: PlanConfig = serde_json::from_str("{}").expect("valid config");
        let horizon = config.horizon().expect("valid horizon");

        assert_eq!(horizon.first_year, 2026);
        assert_eq!(horizon.last_working_year, 2036);
        assert_eq!(horizon.last_planning_year, 2066);
        assert_eq!(horizon.last_disbursement_year, 2046);
        assert_eq!(config.deferred_compensation_plan.disbursement_years, 10);
        assert_eq!(config.restricted_stock_units.default_vesting_period_years, 4);
        assert_eq!(config.paycheck.pay_schedule.periods_per_year(), 26);
        assert_eq!(config.withdrawal.max_iterations, 5);
    }

    #[test]
    fn parses_camel_case_keys_and_legacy_disbursement_alias() {
        let json = r#"{
            "firstYear": 2026,
            "lastWorkingYear": 2030,
            "lastPlanningYear": 2040,
            "birthYear": 1970,
            "income": { "baseSalary": 200000, "bonusFraction": 0.2 },
            "deferredCompensationPlan": { "dispursementYears": 5 },
            "investments": { "employer401kMatchPercent": 0.5 },
            "paycheck": { "paySchedule": "semi-monthly", "payPeriodPrecedingBonus": 5 },
            "expenses": { "specialExpenses": [
                { "year": 2031, "amount": 1000 },
                { "year": 2031, "amount": 500 }
            ] }
        }"#;
        let config: PlanConfig = serde_json::from_str(json).expect("valid config");

        assert_eq!(config.deferred_compensation_plan.disbursement_years, 5);
        assert_eq!(config.income.base_salary, 200_000.0);
        assert_eq!(config.investments.employer_401k_match_percent, 0.5);
        assert_eq!(config.investments.taxable_appreciation_rate, 0.06);
        assert_eq!(config.paycheck.pay_schedule, PaySchedule::SemiMonthly);
        assert_eq!(config.expenses.special_for(2031), 1_500.0);
        assert_eq!(config.expenses.special_for(2032), 0.0);
        assert_eq!(config.medicare_eligibility_year(), Some(2035));
        assert!(!config.is_medicare_eligible(2034));
        assert!(config.is_medicare_eligible(2035));
    }

    #[test]
    fn horizon_assigns_phases_by_year_boundary() {
        let config = PlanConfig {
            first_year: 2026,
            last_working_year: Some(2030),
            last_planning_year: Some(2040),
            deferred_compensation_plan: DeferredCompConfig {
                disbursement_years: 5,
                ..DeferredCompConfig::default()
            },
            ..PlanConfig::default()
        };
        let horizon = config.horizon().expect("valid horizon");

        assert_eq!(horizon.len(), 15);
        assert_eq!(horizon.phase(2030), Ok(Phase::Working));
        assert_eq!(horizon.phase(2031), Ok(Phase::Disbursement));
        assert_eq!(horizon.phase(2035), Ok(Phase::Disbursement));
        assert_eq!(horizon.phase(2036), Ok(Phase::PostDisbursement));
        assert!(matches!(
            horizon.phase(2041),
            Err(PlanError::YearOutOfRange { year: 2041, .. })
        ));
    }

    #[test]
    fn disbursement_window_is_truncated_at_horizon() {
        let config = PlanConfig {
            last_working_year: Some(2030),
            last_planning_year: Some(2033),
            ..PlanConfig::default()
        };
        let horizon = config.horizon().expect("valid horizon");
        assert_eq!(horizon.last_disbursement_year, 2033);
        assert_eq!(horizon.phase(2033), Ok(Phase::Disbursement));
    }

    #[test]
    fn zero_disbursement_years_leave_a_single_payout_year() {
        let config = PlanConfig {
            first_year: 2026,
            last_working_year: Some(2030),
            last_planning_year: Some(2040),
            deferred_compensation_plan: DeferredCompConfig {
                disbursement_years: 0,
                ..DeferredCompConfig::default()
            },
            ..PlanConfig::default()
        };
        let horizon = config.horizon().expect("valid horizon");
        assert_eq!(config.deferred_compensation_plan.window_years(), 1);
        assert_eq!(horizon.last_disbursement_year, 2031);
        assert_eq!(horizon.phase(2031), Ok(Phase::Disbursement));
        assert_eq!(horizon.phase(2032), Ok(Phase::PostDisbursement));
    }

    #[test]
    fn horizon_membership_queries() {
        let horizon = Horizon {
            first_year: 2026,
            last_working_year: 2028,
            last_planning_year: 2032,
            last_disbursement_year: 2030,
        };
        assert!(!horizon.is_empty());
        assert_eq!(horizon.len(), 7);
        assert_eq!(horizon.working_years(), 3);
        assert!(horizon.contains(2026));
        assert!(horizon.contains(2032));
        assert!(!horizon.contains(2025));
        assert!(!horizon.contains(2033));
        assert_eq!(horizon.check(2030), Ok(()));
        assert_eq!(
            horizon.check(2033),
            Err(PlanError::YearOutOfRange {
                year: 2033,
                first: 2026,
                last: 2032
            })
        );
    }

    #[test]
    fn horizon_rejects_spans_beyond_the_supported_maximum() {
        let config = PlanConfig {
            last_working_year: Some(2030),
            last_planning_year: Some(1_000_000_000),
            ..PlanConfig::default()
        };
        let err = config.horizon().expect_err("must reject");
        assert!(matches!(err, PlanError::InvalidHorizon { .. }));
        assert!(err.to_string().contains("150"));

        let config = PlanConfig {
            last_working_year: Some(2030),
            last_planning_year: Some(2026 + MAX_PLAN_YEARS - 1),
            ..PlanConfig::default()
        };
        assert_eq!(
            config.horizon().expect("longest plan is accepted").len(),
            MAX_PLAN_YEARS as usize
        );
    }

    #[test]
    fn horizon_reports_overflowing_years_instead_of_panicking() {
        let config = PlanConfig {
            first_year: i32::MAX,
            ..PlanConfig::default()
        };
        assert!(matches!(
            config.horizon(),
            Err(PlanError::InvalidHorizon { .. })
        ));

        let config = PlanConfig {
            first_year: i32::MAX - 20,
            last_working_year: Some(i32::MAX - 5),
            ..PlanConfig::default()
        };
        assert!(matches!(
            config.horizon(),
            Err(PlanError::InvalidHorizon { .. })
        ));

        let config = PlanConfig {
            deferred_compensation_plan: DeferredCompConfig {
                disbursement_years: u32::MAX,
                ..DeferredCompConfig::default()
            },
            ..PlanConfig::default()
        };
        assert!(matches!(
            config.horizon(),
            Err(PlanError::InvalidHorizon { .. })
        ));

        let config = PlanConfig {
            birth_year: Some(i32::MAX),
            ..PlanConfig::default()
        };
        assert_eq!(config.medicare_eligibility_year(), None);
        assert!(!config.is_medicare_eligible(2030));
    }

    #[test]
    fn horizon_rejects_inverted_boundaries() {
        let config = PlanConfig {
            first_year: 2026,
            last_working_year: Some(2025),
            ..PlanConfig::default()
        };
        assert!(matches!(
            config.horizon(),
            Err(PlanError::InvalidHorizon { .. })
        ));

        let config = PlanConfig {
            last_working_year: Some(2030),
            last_planning_year: Some(2029),
            ..PlanConfig::default()
        };
        assert!(matches!(
            config.horizon(),
            Err(PlanError::InvalidHorizon { .. })
        ));
    }

    #[test]
    fn lifetime_difference_is_other_minus_self() {
        let base = LifetimeTotals {
            gross_income: 100.0,
            total_taxes: 30.0,
            ..LifetimeTotals::default()
        };
        let alt = LifetimeTotals {
            gross_income: 150.0,
            total_taxes: 20.0,
            ..LifetimeTotals::default()
        };
        let delta = base.difference(&alt);
        assert_eq!(delta.gross_income, 50.0);
        assert_eq!(delta.total_taxes, -10.0);
    }
}
