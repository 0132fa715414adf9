use axum::{
    Router,
    extract::{Json, Path},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    FinalBalances, LifetimeTotals, PlanConfig, PlanError, PlanResult, YearRecord,
    run_plan_with_statutory_tables,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComparePayload {
    #[serde(default)]
    baseline: PlanConfig,
    #[serde(default)]
    alternative: PlanConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TotalsResponse {
    first_year: i32,
    last_working_year: i32,
    last_planning_year: i32,
    totals: LifetimeTotals,
    final_balances: FinalBalances,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareResponse {
    baseline: TotalsResponse,
    alternative: TotalsResponse,
    /// Alternative minus baseline.
    difference: LifetimeTotals,
    final_assets_difference: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn from_plan_error(err: &PlanError) -> Self {
        Self {
            status: plan_error_status(err),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        error_response(self.status, &self.message)
    }
}

fn plan_error_status(err: &PlanError) -> StatusCode {
    match err {
        PlanError::YearOutOfRange { .. } => StatusCode::NOT_FOUND,
        PlanError::InvalidHorizon { .. }
        | PlanError::InvalidVestingPeriod { .. }
        | PlanError::MissingTaxYear { .. } => StatusCode::BAD_REQUEST,
        PlanError::InvalidTables { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), String> {
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{name} must be between 0 and 1"));
    }
    Ok(())
}

fn check_rate(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value <= -1.0 {
        return Err(format!("{name} must be > -1"));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{name} must be >= 0"));
    }
    Ok(())
}

fn validate_config(config: &PlanConfig) -> Result<(), String> {
    config.horizon().map_err(|err| err.to_string())?;

    let income = &config.income;
    check_non_negative("income.baseSalary", income.base_salary)?;
    check_non_negative("income.otherIncome", income.other_income)?;
    check_non_negative("income.bonusFraction", income.bonus_fraction)?;
    check_rate(
        "income.annualBaseIncreaseFraction",
        income.annual_base_increase_fraction,
    )?;
    check_fraction("income.baseDeferralFraction", income.base_deferral_fraction)?;
    check_fraction("income.bonusDeferralFraction", income.bonus_deferral_fraction)?;
    check_fraction(
        "income.realizedShortTermCapitalGainsPercent",
        income.realized_short_term_capital_gains_percent,
    )?;
    check_fraction(
        "income.realizedLongTermCapitalGainsPercent",
        income.realized_long_term_capital_gains_percent,
    )?;
    if income.realized_short_term_capital_gains_percent
        + income.realized_long_term_capital_gains_percent
        > 1.0
    {
        return Err(
            "income realized capital gains percents must not exceed 1 in total".to_string(),
        );
    }
    check_fraction("esppDiscount", config.espp_discount)?;
    check_rate("federalBracketInflation", config.federal_bracket_inflation)?;

    let equity = &config.restricted_stock_units;
    if equity.default_vesting_period_years == 0 {
        return Err("restrictedStockUnits.defaultVestingPeriodYears must be > 0".to_string());
    }
    check_non_negative("restrictedStockUnits.currentStockPrice", equity.current_stock_price)?;
    check_rate(
        "restrictedStockUnits.expectedSharePriceGrowthFraction",
        equity.expected_share_price_growth_fraction,
    )?;

    check_rate(
        "deferredCompensationPlan.annualGrowthFraction",
        config.deferred_compensation_plan.annual_growth_fraction,
    )?;
    check_non_negative(
        "deferredCompensationPlan.initialBalance",
        config.deferred_compensation_plan.initial_balance,
    )?;

    let investments = &config.investments;
    check_non_negative("investments.taxableBalance", investments.taxable_balance)?;
    check_non_negative("investments.taxDeferredBalance", investments.tax_deferred_balance)?;
    check_non_negative("investments.hsaBalance", investments.hsa_balance)?;
    check_rate(
        "investments.taxableAppreciationRate",
        investments.taxable_appreciation_rate,
    )?;
    check_rate(
        "investments.taxDeferredAppreciationRate",
        investments.tax_deferred_appreciation_rate,
    )?;
    check_rate("investments.hsaAppreciationRate", investments.hsa_appreciation_rate)?;
    check_fraction(
        "investments.employer401kMatchPercent",
        investments.employer_401k_match_percent,
    )?;
    check_fraction(
        "investments.employer401kMatchMaxSalaryPercent",
        investments.employer_401k_match_max_salary_percent,
    )?;

    check_non_negative("expenses.annualAmount", config.expenses.annual_amount)?;
    check_rate("expenses.inflationRate", config.expenses.inflation_rate)?;
    check_rate(
        "deductions.medicalInflationRate",
        config.deductions.medical_inflation_rate,
    )?;
    check_rate(
        "insurance.premiumInflationRate",
        config.insurance.premium_inflation_rate,
    )?;

    Ok(())
}

fn compute_plan(config: &PlanConfig) -> Result<PlanResult, ApiFailure> {
    validate_config(config).map_err(ApiFailure::bad_request)?;
    run_plan_with_statutory_tables(config).map_err(|err| ApiFailure::from_plan_error(&err))
}

async fn compute_plan_blocking(config: PlanConfig) -> Result<PlanResult, ApiFailure> {
    tokio::task::spawn_blocking(move || compute_plan(&config))
        .await
        .map_err(|err| ApiFailure {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("plan worker failed: {err}"),
        })?
}

fn year_from_plan(result: &PlanResult, year: i32) -> Result<&YearRecord, ApiFailure> {
    result
        .year(year)
        .map_err(|err| ApiFailure::from_plan_error(&err))
}

fn build_totals_response(result: &PlanResult) -> TotalsResponse {
    TotalsResponse {
        first_year: result.first_year,
        last_working_year: result.last_working_year,
        last_planning_year: result.last_planning_year,
        totals: result.totals,
        final_balances: result.final_balances,
    }
}

fn build_compare_response(baseline: &PlanResult, alternative: &PlanResult) -> CompareResponse {
    CompareResponse {
        baseline: build_totals_response(baseline),
        alternative: build_totals_response(alternative),
        difference: baseline.totals.difference(&alternative.totals),
        final_assets_difference: alternative.final_balances.total_assets
            - baseline.final_balances.total_assets,
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/plan", post(plan_handler))
        .route("/api/plan/years/:year", post(plan_year_handler))
        .route("/api/plan/totals", post(plan_totals_handler))
        .route("/api/compare", post(compare_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("planwise HTTP API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/api/plan");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn plan_handler(Json(config): Json<PlanConfig>) -> Response {
    match compute_plan_blocking(config).await {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(failure) => failure.into_response(),
    }
}

async fn plan_year_handler(Path(year): Path<i32>, Json(config): Json<PlanConfig>) -> Response {
    let result = match compute_plan_blocking(config).await {
        Ok(result) => result,
        Err(failure) => return failure.into_response(),
    };
    match year_from_plan(&result, year) {
        Ok(record) => json_response(StatusCode::OK, record),
        Err(failure) => failure.into_response(),
    }
}

async fn plan_totals_handler(Json(config): Json<PlanConfig>) -> Response {
    match compute_plan_blocking(config).await {
        Ok(result) => json_response(StatusCode::OK, build_totals_response(&result)),
        Err(failure) => failure.into_response(),
    }
}

async fn compare_handler(Json(payload): Json<ComparePayload>) -> Response {
    let ComparePayload {
        baseline,
        alternative,
    } = payload;
    match tokio::try_join!(
        compute_plan_blocking(baseline),
        compute_plan_blocking(alternative)
    ) {
        Ok((baseline, alternative)) => {
            json_response(StatusCode::OK, build_compare_response(&baseline, &alternative))
        }
        Err(failure) => failure.into_response(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    if status.is_server_error() {
        warn!("request failed with {status}: {msg}");
    }
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn plan_config_from_json(json: &str) -> Result<PlanConfig, String> {
    serde_json::from_str::<PlanConfig>(json).map_err(|e| format!("Invalid plan JSON payload: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Phase;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    const SCENARIO_JSON: &str = r#"{
        "firstYear": 2026,
        "lastWorkingYear": 2030,
        "lastPlanningYear": 2040,
        "birthYear": 1975,
        "income": {
            "baseSalary": 200000,
            "bonusFraction": 0.15,
            "annualBaseIncreaseFraction": 0.03,
            "baseDeferralFraction": 0.1
        },
        "deferredCompensationPlan": { "dispursementYears": 5 },
        "investments": {
            "taxableBalance": 250000,
            "taxDeferredBalance": 400000,
            "employer401kMatchPercent": 0.5,
            "employer401kMatchMaxSalaryPercent": 0.06
        },
        "expenses": { "annualAmount": 90000 },
        "paycheck": { "paySchedule": "semi-monthly", "payPeriodPrecedingBonus": 5 }
    }"#;

    fn scenario() -> PlanConfig {
        plan_config_from_json(SCENARIO_JSON).expect("valid scenario")
    }

    #[test]
    fn plan_config_from_json_parses_web_keys() {
        let config = scenario();
        assert_eq!(config.first_year, 2026);
        assert_eq!(config.last_working_year, Some(2030));
        assert_eq!(config.birth_year, Some(1975));
        assert_eq!(config.deferred_compensation_plan.disbursement_years, 5);
        assert_approx(config.investments.employer_401k_match_percent, 0.5);
        assert_eq!(config.paycheck.pay_schedule.periods_per_year(), 24);
        assert_eq!(config.paycheck.pay_period_preceding_bonus, 5);
    }

    #[test]
    fn plan_config_from_json_reports_type_errors() {
        let err = plan_config_from_json(r#"{ "firstYear": "soon" }"#).expect_err("must reject");
        assert!(err.starts_with("Invalid plan JSON payload"));
    }

    #[test]
    fn validate_config_accepts_defaults() {
        assert!(validate_config(&PlanConfig::default()).is_ok());
        assert!(validate_config(&scenario()).is_ok());
    }

    #[test]
    fn validate_config_rejects_inverted_horizon() {
        let mut config = scenario();
        config.last_planning_year = Some(2028);
        let err = validate_config(&config).expect_err("must reject");
        assert!(err.contains("2028"), "{err}");
    }

    #[test]
    fn validate_config_rejects_out_of_range_fractions() {
        let mut config = scenario();
        config.income.base_deferral_fraction = 1.5;
        let err = validate_config(&config).expect_err("must reject");
        assert!(err.contains("income.baseDeferralFraction"));

        let mut config = scenario();
        config.investments.taxable_appreciation_rate = -1.0;
        let err = validate_config(&config).expect_err("must reject");
        assert!(err.contains("investments.taxableAppreciationRate"));

        let mut config = scenario();
        config.income.realized_short_term_capital_gains_percent = 0.6;
        config.income.realized_long_term_capital_gains_percent = 0.6;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validate_config_rejects_zero_vesting_period() {
        let mut config = scenario();
        config.restricted_stock_units.default_vesting_period_years = 0;
        let err = validate_config(&config).expect_err("must reject");
        assert!(err.contains("defaultVestingPeriodYears"));
    }

    #[test]
    fn plan_errors_map_to_statuses() {
        assert_eq!(
            plan_error_status(&PlanError::YearOutOfRange {
                year: 2050,
                first: 2026,
                last: 2040
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            plan_error_status(&PlanError::MissingTaxYear { year: 2020 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            plan_error_status(&PlanError::InvalidTables {
                reason: "empty".to_string()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn compute_plan_runs_the_scenario() {
        let result = compute_plan(&scenario()).expect("plan runs");
        assert_eq!(result.years.len(), 15);
        assert_eq!(result.year(2026).expect("in range").paycheck.pay_periods, 24);
        assert_eq!(result.year(2033).expect("in range").phase, Phase::Disbursement);
    }

    #[test]
    fn compute_plan_rejects_years_without_tax_data() {
        let mut config = scenario();
        config.first_year = 2020;
        let failure = compute_plan(&config).expect_err("must fail");
        assert_eq!(failure.status, StatusCode::BAD_REQUEST);
        assert!(failure.message.contains("2020"));
    }

    #[test]
    fn oversized_horizons_are_rejected_before_running() {
        let config: PlanConfig =
            serde_json::from_str(r#"{"lastPlanningYear": 1000000000}"#).expect("valid json");
        let err = validate_config(&config).expect_err("must reject");
        assert!(err.contains("at most 150"), "{err}");
        let failure = compute_plan(&config).expect_err("must fail");
        assert_eq!(failure.status, StatusCode::BAD_REQUEST);

        let config: PlanConfig =
            serde_json::from_str(r#"{"firstYear": 2147483647}"#).expect("valid json");
        let failure = compute_plan(&config).expect_err("must fail");
        assert_eq!(failure.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn year_from_plan_is_not_found_outside_horizon() {
        let result = compute_plan(&scenario()).expect("plan runs");
        assert_eq!(year_from_plan(&result, 2035).expect("in range").year, 2035);
        let failure = year_from_plan(&result, 2041).expect_err("out of range");
        assert_eq!(failure.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn totals_response_serializes_camel_case() {
        let result = compute_plan(&scenario()).expect("plan runs");
        let value = serde_json::to_value(build_totals_response(&result)).expect("serializable");
        assert_eq!(value["lastPlanningYear"], 2040);
        assert!(value["totals"]["totalTaxes"].as_f64().expect("number") > 0.0);
        assert!(value["finalBalances"]["totalAssets"].is_number());
    }

    #[test]
    fn compare_response_reports_alternative_minus_baseline() {
        let baseline = compute_plan(&scenario()).expect("plan runs");
        let mut raised = scenario();
        raised.income.base_salary = 260_000.0;
        let alternative = compute_plan(&raised).expect("plan runs");

        let response = build_compare_response(&baseline, &alternative);
        assert_approx(
            response.difference.gross_income,
            alternative.totals.gross_income - baseline.totals.gross_income,
        );
        assert!(response.difference.gross_income > 0.0);
        assert!(response.difference.total_taxes > 0.0);
        assert_approx(
            response.final_assets_difference,
            alternative.final_balances.total_assets - baseline.final_balances.total_assets,
        );
    }

    #[tokio::test]
    async fn plan_year_handler_sets_status_and_cache_header() {
        let response = plan_year_handler(Path(2031), Json(scenario())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

        let response = plan_year_handler(Path(1999), Json(scenario())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn compare_handler_fails_when_either_plan_is_invalid() {
        let mut broken = scenario();
        broken.last_working_year = Some(2020);
        let response = compare_handler(Json(ComparePayload {
            baseline: scenario(),
            alternative: broken,
        }))
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = compare_handler(Json(ComparePayload {
            baseline: scenario(),
            alternative: scenario(),
        }))
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
