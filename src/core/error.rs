use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Year {year} is outside the planning horizon {first}-{last}")]
    YearOutOfRange { year: i32, first: i32, last: i32 },

    #[error("Vesting period must be at least one year (grant year {grant_year})")]
    InvalidVestingPeriod { grant_year: i32 },

    #[error("Invalid planning horizon: {reason}")]
    InvalidHorizon { reason: String },

    #[error("No tax tables available for year {year}")]
    MissingTaxYear { year: i32 },

    #[error("Invalid tax tables: {reason}")]
    InvalidTables { reason: String },
}
