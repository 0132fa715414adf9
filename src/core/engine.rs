use log::{debug, info, warn};

use super::deferred_comp::{DeferredCompLedger, LedgerEntry};
use super::equity::EquityProjector;
use super::error::PlanError;
use super::paycheck::{PaycheckInputs, simulate_paychecks};
use super::solver::{WithdrawalRequest, WithdrawalTax, solve_withdrawal};
use super::tax::{DeductionInputs, FederalTax, StatutoryTables, TaxTables};
use super::types::{
    FinalBalances, Horizon, IncomeConfig, LifetimeTotals, Phase, PlanConfig, PlanResult,
    YearRecord,
};

/// Figures carried from one year to the next.
#[derive(Debug, Clone, Copy)]
struct RunningState {
    salary: f64,
    medical: f64,
    employer_hsa: f64,
    local_tax: f64,
    annual_expenses: f64,
    full_premium: f64,
    medicare_premium: f64,
    hsa_withdrawal: f64,
    taxable: f64,
    tax_deferred: f64,
    hsa: f64,
}

impl RunningState {
    fn new(config: &PlanConfig) -> Self {
        let investments = &config.investments;
        Self {
            salary: config.income.base_salary,
            medical: config.deductions.medical_dental_vision,
            employer_hsa: investments.hsa_employer_contribution,
            local_tax: config.local_tax.real_estate,
            annual_expenses: config.expenses.annual_amount,
            full_premium: config.insurance.full_insurance_premiums,
            medicare_premium: config.insurance.medicare_premiums,
            hsa_withdrawal: investments.hsa_annual_withdrawal,
            taxable: investments.taxable_balance,
            tax_deferred: investments.tax_deferred_balance,
            hsa: investments.hsa_balance,
        }
    }

    fn inflated(self, config: &PlanConfig) -> Self {
        let grow = |value: f64, rate: f64| value * (1.0 + rate);
        let premium_rate = config.insurance.premium_inflation_rate;
        Self {
            salary: grow(self.salary, config.income.annual_base_increase_fraction),
            medical: grow(self.medical, config.deductions.medical_inflation_rate),
            employer_hsa: grow(self.employer_hsa, config.federal_bracket_inflation),
            local_tax: grow(self.local_tax, config.local_tax.inflation_rate),
            annual_expenses: grow(self.annual_expenses, config.expenses.inflation_rate),
            full_premium: grow(self.full_premium, premium_rate),
            medicare_premium: grow(self.medicare_premium, premium_rate),
            hsa_withdrawal: grow(
                self.hsa_withdrawal,
                config.investments.hsa_withdrawal_inflation_rate,
            ),
            ..self
        }
    }

    fn draw_hsa(&mut self) -> f64 {
        let withdrawal = self.hsa_withdrawal.clamp(0.0, self.hsa.max(0.0));
        self.hsa -= withdrawal;
        withdrawal
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Appreciation {
    taxable: f64,
    tax_deferred: f64,
    hsa: f64,
}

#[derive(Debug, Clone, Copy)]
struct Deferrals {
    base: f64,
    bonus: f64,
}

impl Deferrals {
    fn for_salary(salary: f64, income: &IncomeConfig) -> Self {
        Self {
            base: salary * income.base_deferral_fraction,
            bonus: salary * income.bonus_fraction * income.bonus_deferral_fraction,
        }
    }

    fn total(self) -> f64 {
        self.base + self.bonus
    }
}

#[derive(Debug, Clone, Copy)]
struct RetirementIncome {
    disbursement: f64,
    short_term_gains: f64,
    long_term_gains: f64,
    employee_hsa: f64,
    deductions: f64,
}

#[derive(Debug, Clone, Copy)]
struct YearTaxes {
    agi: f64,
    ordinary: FederalTax,
    long_term_gains: f64,
    state_income: f64,
    state_short_term_gains: f64,
}

impl YearTaxes {
    fn total(&self) -> f64 {
        self.ordinary.tax + self.long_term_gains + self.state_income + self.state_short_term_gains
    }
}

struct PlanContext<'a, T: TaxTables + ?Sized> {
    config: &'a PlanConfig,
    tables: &'a T,
    horizon: Horizon,
    equity: EquityProjector,
    ledger: DeferredCompLedger,
}

/// Runs a plan against the built-in statutory tables, indexed to the plan's
/// bracket inflation and extended through its last planning year.
pub fn run_plan_with_statutory_tables(config: &PlanConfig) -> Result<PlanResult, PlanError> {
    let horizon = config.horizon()?;
    let tables = StatutoryTables::baseline(
        config.federal_bracket_inflation,
        horizon.last_planning_year,
    )?;
    run_plan(config, &tables)
}

pub fn run_plan<T: TaxTables + ?Sized>(
    config: &PlanConfig,
    tables: &T,
) -> Result<PlanResult, PlanError> {
    let horizon = config.horizon()?;
    let equity = EquityProjector::new(
        &config.restricted_stock_units,
        horizon.first_year,
        horizon.last_working_year,
    )?;
    let ledger = DeferredCompLedger::new(
        &horizon,
        &config.deferred_compensation_plan,
        &working_deferrals(config, &horizon),
    );
    let ctx = PlanContext {
        config,
        tables,
        horizon,
        equity,
        ledger,
    };

    info!(
        "running plan {}-{} (working through {}, disbursing through {})",
        horizon.first_year,
        horizon.last_planning_year,
        horizon.last_working_year,
        horizon.last_disbursement_year
    );

    let (years, _) = horizon.years().try_fold(
        (Vec::with_capacity(horizon.len()), RunningState::new(config)),
        |(mut years, state), year| {
            let state = roll_forward(&ctx, state, year);
            let (record, state) = match horizon.phase(year)? {
                Phase::Working => working_year(&ctx, state, year)?,
                phase => retirement_year(&ctx, state, year, phase)?,
            };
            debug!(
                "year={} phase={:?} gross={:.0} taxes={:.0} take_home={:.0} assets={:.0}",
                record.year,
                record.phase,
                record.gross_income,
                record.total_taxes,
                record.take_home_pay,
                record.total_assets
            );
            years.push(record);
            Ok::<_, PlanError>((years, state))
        },
    )?;

    let totals = years.iter().fold(LifetimeTotals::default(), |mut totals, record| {
        totals.accumulate(record);
        totals
    });
    let final_balances = years
        .last()
        .map(FinalBalances::from_record)
        .unwrap_or_default();

    info!(
        "plan complete: {} years, lifetime taxes {:.0}, final assets {:.0}",
        years.len(),
        totals.total_taxes,
        final_balances.total_assets
    );

    Ok(PlanResult {
        first_year: horizon.first_year,
        last_working_year: horizon.last_working_year,
        last_planning_year: horizon.last_planning_year,
        years,
        totals,
        final_balances,
    })
}

/// Deferral amounts per working year, on the same salary path the year loop
/// walks.
fn working_deferrals(config: &PlanConfig, horizon: &Horizon) -> Vec<f64> {
    let income = &config.income;
    let mut salary = income.base_salary;
    (0..horizon.working_years())
        .map(|index| {
            if index > 0 {
                salary *= 1.0 + income.annual_base_increase_fraction;
            }
            Deferrals::for_salary(salary, income).total()
        })
        .collect()
}

fn roll_forward<T: TaxTables + ?Sized>(
    ctx: &PlanContext<'_, T>,
    state: RunningState,
    year: i32,
) -> RunningState {
    let mut state = if year > ctx.horizon.first_year {
        state.inflated(ctx.config)
    } else {
        state
    };
    if ctx.config.medicare_eligibility_year() == Some(year) {
        state.hsa_withdrawal *= 2.0;
    }
    state
}

fn appreciate(state: &mut RunningState, config: &PlanConfig, first_year: bool) -> Appreciation {
    if first_year {
        return Appreciation::default();
    }
    let investments = &config.investments;
    let growth = Appreciation {
        taxable: state.taxable.max(0.0) * investments.taxable_appreciation_rate,
        tax_deferred: state.tax_deferred * investments.tax_deferred_appreciation_rate,
        hsa: state.hsa * investments.hsa_appreciation_rate,
    };
    state.taxable += growth.taxable;
    state.tax_deferred += growth.tax_deferred;
    state.hsa += growth.hsa;
    growth
}

/// Realized gains leave the taxable account as cash and come back through the
/// year's net cash flow.
fn realize_gains(record: &mut YearRecord, state: &mut RunningState, income: &IncomeConfig) {
    let base = state.taxable.max(0.0);
    record.short_term_capital_gains = base * income.realized_short_term_capital_gains_percent;
    record.long_term_capital_gains = base * income.realized_long_term_capital_gains_percent;
    state.taxable -= record.short_term_capital_gains + record.long_term_capital_gains;
}

fn federal_taxes<T: TaxTables + ?Sized>(
    tables: &T,
    year: i32,
    agi: f64,
    long_term_gains: f64,
) -> Result<(FederalTax, f64), PlanError> {
    let ordinary = tables.federal_tax((agi - long_term_gains).max(0.0), year)?;
    let gains = tables.long_term_gains_tax(agi, long_term_gains, year)?;
    Ok((ordinary, gains))
}

fn apply_expenses(record: &mut YearRecord, state: &RunningState, config: &PlanConfig) {
    record.annual_expenses = state.annual_expenses;
    record.special_expenses = config.expenses.special_for(record.year);
    record.total_expenses =
        record.annual_expenses + record.special_expenses + record.medical_premium_expense;
}

fn apply_cash_flow(record: &mut YearRecord, state: &mut RunningState, adjustment: f64) {
    record.taxable_account_adjustment = adjustment;
    record.unfunded_shortfall = (-adjustment).max(0.0);
    state.taxable += adjustment;
    if state.taxable < 0.0 {
        warn!(
            "year={} taxable balance is negative ({:.0}) after funding expenses",
            record.year, state.taxable
        );
    }
}

fn finish_record(
    record: &mut YearRecord,
    state: &RunningState,
    growth: Appreciation,
    ledger: &LedgerEntry,
) {
    record.total_taxes = record.tax_components_total();
    record.effective_tax_rate = if record.gross_income > 0.0 {
        record.total_taxes / record.gross_income
    } else {
        0.0
    };

    record.appreciation_taxable = growth.taxable;
    record.appreciation_tax_deferred = growth.tax_deferred;
    record.appreciation_hsa = growth.hsa;
    record.appreciation_deferred_comp = ledger.growth;
    record.total_appreciation = record.appreciation_components_total();

    record.balance_taxable = state.taxable;
    record.balance_tax_deferred = state.tax_deferred;
    record.balance_hsa = state.hsa;
    record.balance_deferred_comp = ledger.balance;
    record.total_assets = record.balance_components_total();
}

/// Share of the year's ordinary federal tax that falls on salary and bonus.
fn wage_federal_tax(record: &YearRecord) -> f64 {
    let ordinary_income = record.gross_income - record.long_term_capital_gains;
    if ordinary_income <= 0.0 {
        return 0.0;
    }
    let wages = record.base_salary + record.bonus;
    record.ordinary_income_tax * (wages / ordinary_income).clamp(0.0, 1.0)
}

fn working_year<T: TaxTables + ?Sized>(
    ctx: &PlanContext<'_, T>,
    mut state: RunningState,
    year: i32,
) -> Result<(YearRecord, RunningState), PlanError> {
    let config = ctx.config;
    let tables = ctx.tables;
    let income = &config.income;
    let is_first_year = year == ctx.horizon.first_year;
    let mut record = YearRecord::new(year, Phase::Working);

    let growth = appreciate(&mut state, config, is_first_year);
    let ledger = ctx.ledger.entry(year)?;

    record.base_salary = state.salary;
    record.bonus = state.salary * income.bonus_fraction;
    record.other_income = income.other_income;
    let deferrals = Deferrals::for_salary(state.salary, income);
    record.base_deferral = deferrals.base;
    record.bonus_deferral = deferrals.bonus;
    record.total_deferral = deferrals.total();
    record.espp_income = match income.espp_income {
        Some(espp) if is_first_year => espp,
        _ => tables.espp_taxable_benefit(config.espp_discount),
    };
    record.equity_vested_value = ctx.equity.project(year).vested_value;
    realize_gains(&mut record, &mut state, income);
    record.gross_income = record.income_components_total();
    record.earned_income_for_fica = record.gross_income
        - record.short_term_capital_gains
        - record.long_term_capital_gains;

    record.medical_dental_vision = state.medical;
    record.local_tax = state.local_tax;
    record.employer_hsa = state.employer_hsa;

    // Employee contributions are funded from cash wages left after deferrals.
    let limits = tables.contribution_limits(year)?;
    let cash_wages = (record.base_salary + record.bonus - record.total_deferral).max(0.0);
    let employee_401k = limits.max_401k.min(cash_wages);
    let employee_hsa = (limits.max_hsa - state.employer_hsa)
        .max(0.0)
        .min(cash_wages - employee_401k);

    // State tax first: it feeds the SALT side of the federal itemized deduction.
    let state_taxable = record.gross_income
        - record.total_deferral
        - employee_401k
        - employee_hsa
        - record.medical_dental_vision;
    record.state_income_tax = tables.state_income_tax(state_taxable, year)?;

    let deductions = tables.deductions(
        year,
        &DeductionInputs {
            employer_hsa: state.employer_hsa,
            state_income_tax: record.state_income_tax,
            local_tax: state.local_tax,
        },
    )?;
    record.standard_deduction = deductions.standard;
    record.itemized_deduction = deductions.itemized;
    record.max_401k = deductions.max_401k;
    record.max_hsa = deductions.max_hsa;
    record.employee_hsa = employee_hsa;
    record.employee_401k_contribution = employee_401k;
    record.total_deductions = deductions.standard.max(deductions.itemized)
        + employee_401k
        + employee_hsa
        + record.medical_dental_vision;
    record.adjusted_gross_income =
        (record.gross_income - record.total_deductions - record.total_deferral).max(0.0);

    let (ordinary, gains_tax) = federal_taxes(
        tables,
        year,
        record.adjusted_gross_income,
        record.long_term_capital_gains,
    )?;
    record.ordinary_income_tax = ordinary.tax;
    record.marginal_bracket = ordinary.marginal_rate;
    record.long_term_capital_gains_tax = gains_tax;
    record.federal_tax = ordinary.tax + gains_tax;

    let social_security = tables.social_security(year)?;
    let medicare = tables.medicare();
    let life_premium = config.company_provided_life_insurance.annual_premium;
    record.social_security_tax = social_security.contribution(record.earned_income_for_fica);
    record.medicare_tax = medicare.base_contribution(
        record.earned_income_for_fica - record.medical_dental_vision + life_premium,
    );
    record.medicare_surcharge = medicare.surcharge(record.earned_income_for_fica);
    record.total_fica = record.social_security_tax + record.medicare_tax + record.medicare_surcharge;

    record.state_short_term_capital_gains_tax =
        tables.state_short_term_gains_tax(record.short_term_capital_gains);
    record.state_tax = record.state_income_tax + record.state_short_term_capital_gains_tax;
    record.take_home_pay = record.gross_income - record.tax_components_total() - record.total_deferral;

    // Employer covers premiums while working.
    record.medical_premium = state.full_premium;
    record.medical_premium_expense = 0.0;
    apply_expenses(&mut record, &state, config);
    record.income_expense_difference = record.take_home_pay - record.total_expenses;

    let investments = &config.investments;
    let matchable = ((record.base_salary + record.bonus - record.total_deferral)
        * investments.employer_401k_match_max_salary_percent)
        .max(0.0);
    record.employer_401k_match =
        record.employee_401k_contribution.min(matchable) * investments.employer_401k_match_percent;
    record.total_401k_contribution =
        record.employee_401k_contribution + record.employer_401k_match;
    record.hsa_contribution = record.employee_hsa + record.employer_hsa;
    record.deferred_comp_contribution = ledger.contribution;
    record.total_contributions = record.total_401k_contribution
        + record.hsa_contribution
        + record.deferred_comp_contribution;

    state.tax_deferred += record.total_401k_contribution;
    state.hsa += record.hsa_contribution;
    record.hsa_withdrawal = state.draw_hsa();
    let adjustment = record.income_expense_difference
        - record.employee_401k_contribution
        - record.employee_hsa
        + record.hsa_withdrawal;
    apply_cash_flow(&mut record, &mut state, adjustment);

    let effective_state_rate = if record.gross_income > 0.0 {
        record.state_tax / record.gross_income
    } else {
        0.0
    };
    record.paycheck = simulate_paychecks(&PaycheckInputs {
        base_salary: record.base_salary,
        bonus: record.bonus,
        pay_periods: config.paycheck.pay_schedule.periods_per_year(),
        pay_period_preceding_bonus: config.paycheck.pay_period_preceding_bonus,
        annual_federal_tax: wage_federal_tax(&record),
        effective_state_rate,
        employee_401k: record.employee_401k_contribution,
        employee_hsa: record.employee_hsa,
        base_deferral: record.base_deferral,
        bonus_deferral: record.bonus_deferral,
        medical_dental_vision: record.medical_dental_vision,
        social_security,
        medicare,
        supplemental_federal_rate: tables.supplemental_federal_rate(),
    });

    finish_record(&mut record, &state, growth, ledger);
    Ok((record, state))
}

fn retirement_taxes<T: TaxTables + ?Sized>(
    tables: &T,
    year: i32,
    income: &RetirementIncome,
    withdrawal: f64,
) -> Result<YearTaxes, PlanError> {
    let gross = income.disbursement + income.short_term_gains + income.long_term_gains + withdrawal;
    let agi = (gross - income.deductions).max(0.0);
    let (ordinary, long_term_gains) = federal_taxes(tables, year, agi, income.long_term_gains)?;
    Ok(YearTaxes {
        agi,
        ordinary,
        long_term_gains,
        state_income: tables.state_income_tax(gross - income.employee_hsa, year)?,
        state_short_term_gains: tables.state_short_term_gains_tax(income.short_term_gains),
    })
}

fn retirement_year<T: TaxTables + ?Sized>(
    ctx: &PlanContext<'_, T>,
    mut state: RunningState,
    year: i32,
    phase: Phase,
) -> Result<(YearRecord, RunningState), PlanError> {
    let config = ctx.config;
    let tables = ctx.tables;
    let mut record = YearRecord::new(year, phase);

    let growth = appreciate(&mut state, config, false);
    let ledger = ctx.ledger.entry(year)?;
    let medicare_eligible = config.is_medicare_eligible(year);

    record.local_tax = state.local_tax;
    record.medical_premium = if medicare_eligible {
        state.medicare_premium
    } else {
        state.full_premium
    };
    record.medical_premium_expense = record.medical_premium;
    apply_expenses(&mut record, &state, config);

    // Households keep funding the HSA themselves until Medicare, out of cash
    // they actually hold.
    let limits = tables.contribution_limits(year)?;
    let available_cash = state.taxable.max(0.0) + ledger.disbursement;
    record.max_hsa = limits.max_hsa;
    record.employee_hsa = if medicare_eligible {
        0.0
    } else {
        limits.max_hsa.min(available_cash)
    };
    record.hsa_contribution = record.employee_hsa;
    record.total_contributions = record.hsa_contribution;
    state.hsa += record.hsa_contribution;
    record.hsa_withdrawal = state.draw_hsa();

    record.deferred_comp_disbursement = ledger.disbursement;
    realize_gains(&mut record, &mut state, &config.income);

    let deductions = tables.deductions(
        year,
        &DeductionInputs {
            local_tax: state.local_tax,
            ..DeductionInputs::default()
        },
    )?;
    record.standard_deduction = deductions.standard;
    record.total_deductions = deductions.standard + record.employee_hsa;

    let income = RetirementIncome {
        disbursement: record.deferred_comp_disbursement,
        short_term_gains: record.short_term_capital_gains,
        long_term_gains: record.long_term_capital_gains,
        employee_hsa: record.employee_hsa,
        deductions: record.total_deductions,
    };

    if phase == Phase::PostDisbursement {
        let request = WithdrawalRequest {
            balance: state.tax_deferred,
            years_remaining: (ctx.horizon.last_planning_year - year + 1) as u32,
            other_income: income.disbursement + income.short_term_gains + income.long_term_gains,
            cash_need: record.total_expenses + record.hsa_contribution - record.hsa_withdrawal,
            state_rate_addend: tables.state_marginal_rate(),
            max_iterations: config.withdrawal.max_iterations,
        };
        let solution = solve_withdrawal(request, |withdrawal| {
            retirement_taxes(tables, year, &income, withdrawal).map(|taxes| WithdrawalTax {
                total_tax: taxes.total(),
                marginal_rate: taxes.ordinary.marginal_rate,
            })
        })?;
        if !solution.converged() {
            warn!(
                "year={year} withdrawal solver {:?}: {} (residual shortfall {:.0})",
                solution.status, solution.message, solution.residual_shortfall
            );
        }
        record.tax_deferred_withdrawal = solution.withdrawal;
        state.tax_deferred -= solution.withdrawal;
    }

    let taxes = retirement_taxes(tables, year, &income, record.tax_deferred_withdrawal)?;
    record.gross_income = record.income_components_total();
    record.adjusted_gross_income = taxes.agi;
    record.ordinary_income_tax = taxes.ordinary.tax;
    record.marginal_bracket = taxes.ordinary.marginal_rate;
    record.long_term_capital_gains_tax = taxes.long_term_gains;
    record.federal_tax = taxes.ordinary.tax + taxes.long_term_gains;
    record.state_income_tax = taxes.state_income;
    record.state_short_term_capital_gains_tax = taxes.state_short_term_gains;
    record.state_tax = taxes.state_income + taxes.state_short_term_gains;
    record.take_home_pay = record.gross_income - record.tax_components_total();
    record.income_expense_difference = record.take_home_pay - record.total_expenses;

    let adjustment =
        record.income_expense_difference - record.hsa_contribution + record.hsa_withdrawal;
    apply_cash_flow(&mut record, &mut state, adjustment);

    finish_record(&mut record, &state, growth, ledger);
    Ok((record, state))
}
