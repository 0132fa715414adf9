use serde::{Deserialize, Serialize};

use super::error::PlanError;

/// Furthest the reference tables are inflated past their first year.
pub const MAX_INFLATED_YEARS: i32 = 300;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FederalTax {
    pub tax: f64,
    pub marginal_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionLimits {
    pub max_401k: f64,
    pub max_hsa: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeductionInputs {
    pub employer_hsa: f64,
    pub state_income_tax: f64,
    pub local_tax: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deductions {
    pub standard: f64,
    pub itemized: f64,
    pub max_401k: f64,
    pub max_hsa: f64,
    pub employee_hsa: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialSecurityRates {
    pub wage_base: f64,
    pub rate: f64,
}

impl SocialSecurityRates {
    pub fn contribution(&self, wages: f64) -> f64 {
        wages.clamp(0.0, self.wage_base) * self.rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicareRates {
    pub rate: f64,
    pub surcharge_threshold: f64,
    pub surcharge_rate: f64,
}

impl MedicareRates {
    pub fn base_contribution(&self, medicare_base: f64) -> f64 {
        medicare_base.max(0.0) * self.rate
    }

    pub fn surcharge(&self, wages: f64) -> f64 {
        if wages > self.surcharge_threshold {
            (wages - self.surcharge_threshold) * self.surcharge_rate
        } else {
            0.0
        }
    }
}

/// Statutory lookups the plan engine depends on. Implementations must be pure:
/// the same inputs always give the same answer, and a year they cannot serve
/// is an error rather than a guess.
pub trait TaxTables {
    fn federal_tax(&self, taxable_income: f64, year: i32) -> Result<FederalTax, PlanError>;

    /// Tax on `ltcg` stacked on top of the ordinary part of `agi`.
    fn long_term_gains_tax(&self, agi: f64, ltcg: f64, year: i32) -> Result<f64, PlanError>;

    fn contribution_limits(&self, year: i32) -> Result<ContributionLimits, PlanError>;

    fn deductions(&self, year: i32, inputs: &DeductionInputs) -> Result<Deductions, PlanError>;

    fn state_income_tax(&self, taxable_income: f64, year: i32) -> Result<f64, PlanError>;

    fn state_short_term_gains_tax(&self, gains: f64) -> f64;

    fn state_marginal_rate(&self) -> f64;

    fn social_security(&self, year: i32) -> Result<SocialSecurityRates, PlanError>;

    fn medicare(&self) -> MedicareRates;

    fn supplemental_federal_rate(&self) -> f64;

    fn espp_taxable_benefit(&self, discount: f64) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bracket {
    /// Upper bound of the bracket; `None` for the top bracket.
    pub max_income: Option<f64>,
    pub rate: f64,
    pub base_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GainsBracket {
    pub max_income: Option<f64>,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxYearTable {
    pub year: i32,
    pub brackets: Vec<Bracket>,
    pub long_term_gains_brackets: Vec<GainsBracket>,
    pub standard_deduction: f64,
    #[serde(rename = "max401k")]
    pub max_401k: f64,
    pub max_hsa: f64,
    pub social_security_wage_base: f64,
}

impl TaxYearTable {
    fn inflated(&self, factor: f64) -> Self {
        Self {
            year: self.year + 1,
            brackets: self
                .brackets
                .iter()
                .map(|b| Bracket {
                    max_income: b.max_income.map(|max| max * factor),
                    rate: b.rate,
                    base_amount: b.base_amount * factor,
                })
                .collect(),
            long_term_gains_brackets: self
                .long_term_gains_brackets
                .iter()
                .map(|b| GainsBracket {
                    max_income: b.max_income.map(|max| max * factor),
                    rate: b.rate,
                })
                .collect(),
            standard_deduction: self.standard_deduction * factor,
            max_401k: self.max_401k * factor,
            max_hsa: self.max_hsa * factor,
            social_security_wage_base: self.social_security_wage_base * factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTable {
    pub rate: f64,
    pub standard_deduction: f64,
    pub short_term_capital_gains_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollTable {
    pub employee_rate: f64,
    pub paid_leave_rate: f64,
    pub medicare: MedicareRates,
}

/// Raw statutory reference data, as it would be read from a reference file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceTables {
    pub tax_years: Vec<TaxYearTable>,
    #[serde(rename = "maxESPPValue")]
    pub max_espp_value: f64,
    pub salt_cap: f64,
    pub supplemental_federal_rate: f64,
    pub state: StateTable,
    pub payroll: PayrollTable,
}

impl ReferenceTables {
    /// 2026 married-filing-jointly figures.
    pub fn baseline() -> Self {
        Self {
            tax_years: vec![TaxYearTable {
                year: 2026,
                brackets: vec![
                    Bracket { max_income: Some(24_800.0), rate: 0.10, base_amount: 0.0 },
                    Bracket { max_income: Some(100_800.0), rate: 0.12, base_amount: 2_480.0 },
                    Bracket { max_income: Some(211_400.0), rate: 0.22, base_amount: 11_600.0 },
                    Bracket { max_income: Some(403_550.0), rate: 0.24, base_amount: 35_932.0 },
                    Bracket { max_income: Some(512_450.0), rate: 0.32, base_amount: 82_048.0 },
                    Bracket { max_income: Some(768_700.0), rate: 0.35, base_amount: 116_896.0 },
                    Bracket { max_income: None, rate: 0.37, base_amount: 206_583.5 },
                ],
                long_term_gains_brackets: vec![
                    GainsBracket { max_income: Some(98_900.0), rate: 0.0 },
                    GainsBracket { max_income: Some(613_700.0), rate: 0.15 },
                    GainsBracket { max_income: None, rate: 0.20 },
                ],
                standard_deduction: 32_200.0,
                max_401k: 24_500.0,
                max_hsa: 8_750.0,
                social_security_wage_base: 184_500.0,
            }],
            max_espp_value: 25_000.0,
            salt_cap: 40_400.0,
            supplemental_federal_rate: 0.22,
            state: StateTable {
                rate: 0.05,
                standard_deduction: 8_800.0,
                short_term_capital_gains_rate: 0.085,
            },
            payroll: PayrollTable {
                employee_rate: 0.062,
                paid_leave_rate: 0.0046,
                medicare: MedicareRates {
                    rate: 0.0145,
                    surcharge_threshold: 250_000.0,
                    surcharge_rate: 0.009,
                },
            },
        }
    }
}

/// Inflation-indexed tables for a contiguous run of years. Explicit years are
/// used as given; later years inflate the last explicit one.
#[derive(Debug, Clone, PartialEq)]
pub struct StatutoryTables {
    first_year: i32,
    years: Vec<TaxYearTable>,
    inflation_rate: f64,
    max_espp_value: f64,
    salt_cap: f64,
    supplemental_federal_rate: f64,
    state: StateTable,
    payroll: PayrollTable,
}

impl StatutoryTables {
    pub fn new(
        reference: ReferenceTables,
        inflation_rate: f64,
        final_year: i32,
    ) -> Result<Self, PlanError> {
        let mut tax_years = reference.tax_years;
        tax_years.sort_by_key(|t| t.year);

        let Some(first) = tax_years.first() else {
            return Err(PlanError::InvalidTables {
                reason: "at least one tax year is required".to_string(),
            });
        };
        let first_year = first.year;

        for pair in tax_years.windows(2) {
            if pair[1].year != pair[0].year + 1 {
                return Err(PlanError::InvalidTables {
                    reason: format!(
                        "tax years must be sequential, gap between {} and {}",
                        pair[0].year, pair[1].year
                    ),
                });
            }
        }
        for table in &tax_years {
            if table.brackets.is_empty() || table.long_term_gains_brackets.is_empty() {
                return Err(PlanError::InvalidTables {
                    reason: format!("tax year {} has no brackets", table.year),
                });
            }
        }

        // Years past the cap stay uncovered and surface as `MissingTaxYear`.
        let final_year = final_year.min(first_year.saturating_add(MAX_INFLATED_YEARS));
        let factor = 1.0 + inflation_rate;
        while let Some(last) = tax_years.last() {
            if last.year >= final_year {
                break;
            }
            let next = last.inflated(factor);
            tax_years.push(next);
        }

        Ok(Self {
            first_year,
            years: tax_years,
            inflation_rate,
            max_espp_value: reference.max_espp_value,
            salt_cap: reference.salt_cap,
            supplemental_federal_rate: reference.supplemental_federal_rate,
            state: reference.state,
            payroll: reference.payroll,
        })
    }

    pub fn baseline(inflation_rate: f64, final_year: i32) -> Result<Self, PlanError> {
        Self::new(ReferenceTables::baseline(), inflation_rate, final_year)
    }

    pub fn last_year(&self) -> i32 {
        self.first_year + self.years.len() as i32 - 1
    }

    fn year_table(&self, year: i32) -> Result<&TaxYearTable, PlanError> {
        if year < self.first_year {
            return Err(PlanError::MissingTaxYear { year });
        }
        self.years
            .get((year - self.first_year) as usize)
            .ok_or(PlanError::MissingTaxYear { year })
    }

    fn state_standard_deduction(&self, year: i32) -> f64 {
        let years = (year - self.first_year).max(0);
        self.state.standard_deduction * (1.0 + self.inflation_rate).powi(years)
    }
}

impl TaxTables for StatutoryTables {
    fn federal_tax(&self, taxable_income: f64, year: i32) -> Result<FederalTax, PlanError> {
        let table = self.year_table(year)?;
        let income = taxable_income.max(0.0);

        let mut lower = 0.0;
        for bracket in &table.brackets {
            let within = bracket.max_income.is_none_or(|max| income <= max);
            if within {
                return Ok(FederalTax {
                    tax: bracket.base_amount + (income - lower) * bracket.rate,
                    marginal_rate: bracket.rate,
                });
            }
            lower = bracket.max_income.unwrap_or(lower);
        }

        Err(PlanError::InvalidTables {
            reason: format!("income {income:.2} exceeds every bracket for {year}"),
        })
    }

    fn long_term_gains_tax(&self, agi: f64, ltcg: f64, year: i32) -> Result<f64, PlanError> {
        let table = self.year_table(year)?;
        let gains = ltcg.max(0.0);
        if gains <= 0.0 {
            return Ok(0.0);
        }

        let ordinary = (agi - gains).max(0.0);
        let top = ordinary + gains;
        let mut lower = 0.0_f64;
        let mut tax = 0.0;
        for bracket in &table.long_term_gains_brackets {
            let upper = bracket.max_income.unwrap_or(f64::INFINITY);
            let overlap = top.min(upper) - ordinary.max(lower);
            if overlap > 0.0 {
                tax += overlap * bracket.rate;
            }
            if top <= upper {
                break;
            }
            lower = upper;
        }
        Ok(tax)
    }

    fn contribution_limits(&self, year: i32) -> Result<ContributionLimits, PlanError> {
        let table = self.year_table(year)?;
        Ok(ContributionLimits {
            max_401k: table.max_401k,
            max_hsa: table.max_hsa,
        })
    }

    fn deductions(&self, year: i32, inputs: &DeductionInputs) -> Result<Deductions, PlanError> {
        let table = self.year_table(year)?;
        let itemized = (inputs.state_income_tax.max(0.0) + inputs.local_tax.max(0.0)).min(self.salt_cap);
        let employee_hsa = (table.max_hsa - inputs.employer_hsa).max(0.0);
        Ok(Deductions {
            standard: table.standard_deduction,
            itemized,
            max_401k: table.max_401k,
            max_hsa: table.max_hsa,
            employee_hsa,
            total: table.standard_deduction.max(itemized) + table.max_401k + employee_hsa,
        })
    }

    fn state_income_tax(&self, taxable_income: f64, year: i32) -> Result<f64, PlanError> {
        // Same coverage as the federal tables.
        self.year_table(year)?;
        let taxable = (taxable_income - self.state_standard_deduction(year)).max(0.0);
        Ok(taxable * self.state.rate)
    }

    fn state_short_term_gains_tax(&self, gains: f64) -> f64 {
        gains.max(0.0) * self.state.short_term_capital_gains_rate
    }

    fn state_marginal_rate(&self) -> f64 {
        self.state.rate
    }

    fn social_security(&self, year: i32) -> Result<SocialSecurityRates, PlanError> {
        let table = self.year_table(year)?;
        Ok(SocialSecurityRates {
            wage_base: table.social_security_wage_base,
            rate: self.payroll.employee_rate + self.payroll.paid_leave_rate,
        })
    }

    fn medicare(&self) -> MedicareRates {
        self.payroll.medicare
    }

    fn supplemental_federal_rate(&self) -> f64 {
        self.supplemental_federal_rate
    }

    fn espp_taxable_benefit(&self, discount: f64) -> f64 {
        self.max_espp_value * discount.max(0.0)
    }
}
