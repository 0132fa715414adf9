use serde::Serialize;

use super::error::PlanError;

const SHORTFALL_TOLERANCE: f64 = 1e-6;
/// Gross-up denominators below this are treated as this value so a marginal
/// rate near 100% cannot blow the estimate up.
const MIN_NET_FRACTION: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct WithdrawalRequest {
    /// Tax-deferred balance available this year, after appreciation.
    pub balance: f64,
    pub years_remaining: u32,
    /// Pre-tax income from every other source this year.
    pub other_income: f64,
    /// Cash the year must fund after tax.
    pub cash_need: f64,
    pub state_rate_addend: f64,
    pub max_iterations: u32,
}

/// Tax owed for the whole year at a candidate withdrawal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalTax {
    pub total_tax: f64,
    pub marginal_rate: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SolveStatus {
    BaselineSufficient,
    Converged,
    BalanceExhausted,
    IterationLimit,
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalIteration {
    pub iteration: u32,
    pub candidate: f64,
    pub total_tax: f64,
    pub shortfall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalSolution {
    pub withdrawal: f64,
    pub baseline: f64,
    pub total_tax: f64,
    pub residual_shortfall: f64,
    pub status: SolveStatus,
    pub iterations: Vec<WithdrawalIteration>,
    pub message: String,
}

impl WithdrawalSolution {
    pub fn converged(&self) -> bool {
        matches!(
            self.status,
            SolveStatus::BaselineSufficient | SolveStatus::Converged
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    withdrawal: f64,
    tax: WithdrawalTax,
    shortfall: f64,
}

fn shortfall_at(request: &WithdrawalRequest, withdrawal: f64, tax: WithdrawalTax) -> f64 {
    request.cash_need - (request.other_income + withdrawal - tax.total_tax)
}

pub fn baseline_withdrawal(balance: f64, years_remaining: u32) -> f64 {
    let balance = balance.max(0.0);
    if years_remaining == 0 {
        return balance;
    }
    (balance / years_remaining as f64).min(balance)
}

/// Finds the tax-deferred withdrawal that covers `cash_need` after tax.
///
/// The baseline annuity is always taken. Any remaining shortfall is grossed
/// up at the current marginal rate and refined by re-evaluating `tax_for` on
/// each candidate. A refinement that fails to reduce the shortfall stops the
/// search and the best candidate so far is returned.
pub fn solve_withdrawal<F>(
    request: WithdrawalRequest,
    mut tax_for: F,
) -> Result<WithdrawalSolution, PlanError>
where
    F: FnMut(f64) -> Result<WithdrawalTax, PlanError>,
{
    let balance = request.balance.max(0.0);
    let baseline = baseline_withdrawal(balance, request.years_remaining);
    let tax = tax_for(baseline)?;
    let mut best = Candidate {
        withdrawal: baseline,
        tax,
        shortfall: shortfall_at(&request, baseline, tax),
    };

    if best.shortfall <= SHORTFALL_TOLERANCE {
        return Ok(finish(
            baseline,
            best,
            SolveStatus::BaselineSufficient,
            Vec::new(),
            "Baseline withdrawal covers the year.",
        ));
    }

    let mut iterations = Vec::with_capacity(request.max_iterations as usize);
    let mut status = SolveStatus::IterationLimit;
    for iteration in 1..=request.max_iterations {
        if best.withdrawal >= balance {
            status = SolveStatus::BalanceExhausted;
            break;
        }

        let net_fraction =
            (1.0 - (best.tax.marginal_rate + request.state_rate_addend)).max(MIN_NET_FRACTION);
        let candidate = (best.withdrawal + best.shortfall / net_fraction).min(balance);
        let tax = tax_for(candidate)?;
        let shortfall = shortfall_at(&request, candidate, tax);
        iterations.push(WithdrawalIteration {
            iteration,
            candidate,
            total_tax: tax.total_tax,
            shortfall,
        });

        if shortfall >= best.shortfall - SHORTFALL_TOLERANCE {
            status = SolveStatus::Stalled;
            break;
        }

        best = Candidate {
            withdrawal: candidate,
            tax,
            shortfall,
        };
        if best.shortfall <= SHORTFALL_TOLERANCE {
            status = SolveStatus::Converged;
            break;
        }
        if best.withdrawal >= balance {
            status = SolveStatus::BalanceExhausted;
            break;
        }
    }

    let message = match status {
        SolveStatus::Converged => "Shortfall covered.",
        SolveStatus::BalanceExhausted => "Tax-deferred balance exhausted before covering the shortfall.",
        SolveStatus::Stalled => "Refinement stopped improving; returning best estimate.",
        SolveStatus::IterationLimit => {
            "Reached max iterations before the shortfall was covered; returning best estimate."
        }
        SolveStatus::BaselineSufficient => "Baseline withdrawal covers the year.",
    };
    Ok(finish(baseline, best, status, iterations, message))
}

fn finish(
    baseline: f64,
    best: Candidate,
    status: SolveStatus,
    iterations: Vec<WithdrawalIteration>,
    message: &str,
) -> WithdrawalSolution {
    WithdrawalSolution {
        withdrawal: best.withdrawal,
        baseline,
        total_tax: best.tax.total_tax,
        residual_shortfall: best.shortfall.max(0.0),
        status,
        iterations,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn request(balance: f64, years: u32, other: f64, need: f64) -> WithdrawalRequest {
        WithdrawalRequest {
            balance,
            years_remaining: years,
            other_income: other,
            cash_need: need,
            state_rate_addend: 0.0,
            max_iterations: 5,
        }
    }

    fn flat(rate: f64, other: f64) -> impl FnMut(f64) -> Result<WithdrawalTax, PlanError> {
        move |withdrawal| {
            Ok(WithdrawalTax {
                total_tax: (other + withdrawal) * rate,
                marginal_rate: rate,
            })
        }
    }

    /// Two-bracket schedule: 10% to 50k, 30% above.
    fn progressive(other: f64) -> impl FnMut(f64) -> Result<WithdrawalTax, PlanError> {
        move |withdrawal| {
            let income = other + withdrawal;
            let (total_tax, marginal_rate) = if income <= 50_000.0 {
                (income * 0.10, 0.10)
            } else {
                (5_000.0 + (income - 50_000.0) * 0.30, 0.30)
            };
            Ok(WithdrawalTax {
                total_tax,
                marginal_rate,
            })
        }
    }

    #[test]
    fn no_shortfall_takes_exactly_the_baseline() {
        let solution = solve_withdrawal(request(100_000.0, 10, 0.0, 0.0), flat(0.2, 0.0))
            .expect("tax available");
        assert_eq!(solution.withdrawal, 10_000.0);
        assert_eq!(solution.baseline, 10_000.0);
        assert_eq!(solution.status, SolveStatus::BaselineSufficient);
        assert!(solution.iterations.is_empty());
        assert_eq!(solution.residual_shortfall, 0.0);
    }

    #[test]
    fn flat_rate_converges_in_one_refinement() {
        // Baseline 10k nets 8k; need 20k, so 12k short, grossed up to 15k more.
        let solution = solve_withdrawal(request(500_000.0, 50, 0.0, 20_000.0), flat(0.2, 0.0))
            .expect("tax available");
        assert_eq!(solution.status, SolveStatus::Converged);
        assert_eq!(solution.iterations.len(), 1);
        assert_approx(solution.withdrawal, 25_000.0);
        assert_approx(solution.total_tax, 5_000.0);
        assert!(solution.converged());
    }

    #[test]
    fn progressive_rates_need_several_refinements() {
        let solution = solve_withdrawal(request(1_000_000.0, 40, 0.0, 60_000.0), progressive(0.0))
            .expect("tax available");
        assert_eq!(solution.status, SolveStatus::Converged);
        assert!(solution.iterations.len() >= 2);
        let net = solution.withdrawal - solution.total_tax;
        assert!(net >= 60_000.0 - 1e-3, "net {net}");
        // Exact answer: w - 5000 - 0.3 (w - 50000) = 60000.
        assert_approx_tol(solution.withdrawal, 500_000.0 / 7.0, 1.0);
    }

    #[test]
    fn shortfall_beyond_balance_caps_withdrawal() {
        let solution = solve_withdrawal(request(10_000.0, 5, 0.0, 1_000_000.0), flat(0.2, 0.0))
            .expect("tax available");
        assert_eq!(solution.status, SolveStatus::BalanceExhausted);
        assert_eq!(solution.withdrawal, 10_000.0);
        assert_approx(solution.residual_shortfall, 1_000_000.0 - 8_000.0);
    }

    #[test]
    fn empty_balance_withdraws_nothing() {
        let solution = solve_withdrawal(request(0.0, 5, 1_000.0, 50_000.0), flat(0.2, 1_000.0))
            .expect("tax available");
        assert_eq!(solution.withdrawal, 0.0);
        assert_eq!(solution.status, SolveStatus::BalanceExhausted);
        assert!(solution.residual_shortfall > 0.0);
    }

    #[test]
    fn other_income_reduces_the_need() {
        let solution = solve_withdrawal(request(100_000.0, 10, 50_000.0, 30_000.0), flat(0.2, 50_000.0))
            .expect("tax available");
        assert_eq!(solution.status, SolveStatus::BaselineSufficient);
        assert_eq!(solution.withdrawal, 10_000.0);
    }

    #[test]
    fn non_improving_tax_function_stalls_with_best_estimate() {
        // Tax claws back every extra dollar withdrawn above the baseline.
        let tax = |withdrawal: f64| -> Result<WithdrawalTax, PlanError> {
            Ok(WithdrawalTax {
                total_tax: (withdrawal - 10_000.0).max(0.0) * 1.5,
                marginal_rate: 0.1,
            })
        };
        let solution = solve_withdrawal(request(1_000_000.0, 100, 0.0, 50_000.0), tax)
            .expect("tax available");
        assert_eq!(solution.status, SolveStatus::Stalled);
        assert_eq!(solution.withdrawal, 10_000.0);
        assert_eq!(solution.iterations.len(), 1);
        assert!(!solution.converged());
    }

    #[test]
    fn iteration_limit_returns_best_estimate() {
        let mut config = request(1_000_000.0, 40, 0.0, 60_000.0);
        config.max_iterations = 1;
        // Underestimated marginal rate: each step improves but undershoots.
        let tax = |withdrawal: f64| -> Result<WithdrawalTax, PlanError> {
            Ok(WithdrawalTax {
                total_tax: withdrawal * 0.5,
                marginal_rate: 0.0,
            })
        };
        let solution = solve_withdrawal(config, tax).expect("tax available");
        assert_eq!(solution.status, SolveStatus::IterationLimit);
        assert!(solution.residual_shortfall > 0.0);
        assert!(solution.withdrawal > solution.baseline);
    }

    #[test]
    fn tax_errors_propagate() {
        let tax = |_: f64| -> Result<WithdrawalTax, PlanError> {
            Err(PlanError::MissingTaxYear { year: 2050 })
        };
        let err = solve_withdrawal(request(1_000.0, 1, 0.0, 0.0), tax).expect_err("must fail");
        assert_eq!(err, PlanError::MissingTaxYear { year: 2050 });
    }

    #[test]
    fn baseline_clamps_to_balance() {
        assert_eq!(baseline_withdrawal(1_000.0, 0), 1_000.0);
        assert_eq!(baseline_withdrawal(1_000.0, 4), 250.0);
        assert_eq!(baseline_withdrawal(-5.0, 4), 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_zero_need_is_exactly_baseline(balance in 0u32..5_000_000, years in 1u32..60) {
            let solution = solve_withdrawal(
                request(balance as f64, years, 0.0, 0.0),
                progressive(0.0),
            ).expect("tax available");
            prop_assert_eq!(solution.withdrawal, baseline_withdrawal(balance as f64, years));
            prop_assert_eq!(solution.status, SolveStatus::BaselineSufficient);
        }

        #[test]
        fn prop_withdrawal_never_exceeds_balance(
            balance in 0u32..500_000,
            years in 1u32..40,
            need in 0u32..1_000_000,
        ) {
            let solution = solve_withdrawal(
                request(balance as f64, years, 0.0, need as f64),
                progressive(0.0),
            ).expect("tax available");
            prop_assert!(solution.withdrawal <= balance as f64 + 1e-9);
            prop_assert!(solution.withdrawal >= solution.baseline - 1e-9);
            if need as f64 > balance as f64 {
                prop_assert!(solution.residual_shortfall > 0.0);
            }
        }
    }
}
