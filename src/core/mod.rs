mod deferred_comp;
mod engine;
mod equity;
mod error;
mod paycheck;
mod solver;
mod tax;
mod types;

pub use deferred_comp::{DeferredCompLedger, LedgerEntry};
pub use engine::{run_plan, run_plan_with_statutory_tables};
pub use equity::{EquityProjector, GrantKind, GrantVesting, VestingProjection};
pub use error::PlanError;
pub use paycheck::{
    BonusBreakdown, PaycheckBreakdown, PaycheckInputs, PaycheckTiming, simulate_paychecks,
};
pub use solver::{
    SolveStatus, WithdrawalIteration, WithdrawalRequest, WithdrawalSolution, WithdrawalTax,
    baseline_withdrawal, solve_withdrawal,
};
pub use tax::{
    Bracket, ContributionLimits, DeductionInputs, Deductions, FederalTax, GainsBracket,
    MedicareRates, PayrollTable, ReferenceTables, SocialSecurityRates, StateTable,
    StatutoryTables, TaxTables, TaxYearTable,
};
pub use types::{
    DeductionConfig, DeferredCompConfig, EquityConfig, EquityGrant, ExpenseConfig, FinalBalances,
    Horizon, IncomeConfig, InsuranceConfig, InvestmentConfig, LifeInsuranceConfig,
    LifetimeTotals, LocalTaxConfig, MAX_PLAN_YEARS, PaySchedule, PaycheckConfig, Phase, PlanConfig, PlanResult,
    SpecialExpense, WithdrawalConfig, YearRecord,
};
