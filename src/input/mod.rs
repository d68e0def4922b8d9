//! # Serosurvey inputs
//!
//! Defines the raw column-oriented table accepted at the crate boundary, the
//! validated serosurvey and survey-design records built from it, and the
//! shared validation error taxonomy.
//!
//! # Examples
//!
//! ```
//! use serofoi::{Column, ColumnTable, Serosurvey};
//!
//! let table = ColumnTable::new()
//!     .with_column("age_min", Column::Integer(vec![1, 6]))
//!     .with_column("age_max", Column::Integer(vec![5, 10]))
//!     .with_column("n_sample", Column::Integer(vec![100, 120]))
//!     .with_column("n_seropositive", Column::Integer(vec![12, 40]));
//!
//! let survey = Serosurvey::from_columns(&table).expect("valid survey");
//! assert_eq!(survey.age_max(), 10);
//! ```
//!
//! ```
//! use serofoi::{Column, ColumnTable, ErrorKind, Serosurvey};
//!
//! let table = ColumnTable::new()
//!     .with_column("age_min", Column::Integer(vec![1, 5]))
//!     .with_column("age_max", Column::Integer(vec![5, 10]))
//!     .with_column("n_sample", Column::Integer(vec![100, 120]))
//!     .with_column("n_seropositive", Column::Integer(vec![12, 40]));
//!
//! let err = Serosurvey::from_columns(&table).expect_err("boundary collision");
//! assert_eq!(err.kind(), ErrorKind::Design);
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use crate::utils::u64_to_f64;

pub mod foi;

pub use foi::{
    FoiGrid, FoiIndexTable, FoiTable, FoiTableKind, IndexAxis, validate_foi_index,
    validate_seroreversion_rate,
};

/// Coarse classification of validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required columns missing or holding the wrong value type.
    Schema,
    /// Survey design with ambiguous cohort boundaries.
    Design,
    /// Malformed FoI or FoI-index tables.
    Shape,
    /// Out-of-range scalar values.
    Domain,
    /// Index tables that disagree with the survey they describe.
    Consistency,
}

/// Errors returned when validating serosurveys, designs, and FoI tables.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("required column `{column}` is missing")]
    MissingColumn { column: String },
    #[error("column `{column}` must hold {expected} values")]
    WrongColumnType {
        column: String,
        expected: &'static str,
    },
    #[error("column `{column}` has {len} rows; expected {expected}")]
    ColumnLengthMismatch {
        column: String,
        len: usize,
        expected: usize,
    },
    #[error("time-varying models require a single survey year on every row")]
    MissingSurveyYear,
    #[error("serosurvey rows disagree on the survey year ({first} vs {second})")]
    InconsistentSurveyYear { first: i32, second: i32 },

    #[error("age bins {first} and {second} share the boundary age {age}")]
    AmbiguousAgeBoundary { first: usize, second: usize, age: u32 },

    #[error("{table} table has no rows")]
    EmptyTable { table: &'static str },
    #[error("FoI table columns {found:?} do not match the expected {expected:?}")]
    UnexpectedFoiColumns {
        found: Vec<String>,
        expected: Vec<&'static str>,
    },
    #[error("FoI table does not cover a contiguous unit grid near {key}")]
    FoiGridGap { key: i64 },
    #[error("FoI index table has {keys} keys but {indices} indices")]
    FoiIndexShape { keys: usize, indices: usize },

    #[error("row {row}: sample size must be positive")]
    NonPositiveSampleSize { row: usize },
    #[error("row {row}: `{column}` must be non-negative")]
    NegativeValue { row: usize, column: &'static str },
    #[error("row {row}: {n_seropositive} seropositives exceed {n_sample} samples")]
    SeropositiveExceedsSample {
        row: usize,
        n_seropositive: u64,
        n_sample: u64,
    },
    #[error("row {row}: age_min ({age_min}) exceeds age_max ({age_max})")]
    InvertedAgeBin { row: usize, age_min: u32, age_max: u32 },
    #[error("maximum surveyed age must be at least 1")]
    ZeroMaximumAge,
    #[error("FoI value at position {position} must be finite and non-negative; found {value}")]
    InvalidFoi { position: usize, value: f64 },
    #[error("seroreversion rate must be finite and non-negative; found {rate}")]
    InvalidSeroreversionRate { rate: f64 },
    #[error("group size {group_size} must lie in [1, {max_age}]")]
    InvalidGroupSize { group_size: usize, max_age: u32 },

    #[error("FoI index has length {len}; expected the maximum age {expected}")]
    FoiIndexLength { len: usize, expected: usize },
    #[error("FoI index must start at 1; found {found}")]
    FoiIndexStart { found: usize },
    #[error("FoI index changes by {delta} at position {position}; steps must be 0 or 1")]
    FoiIndexStep { position: usize, delta: i64 },
}

impl ValidationError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingColumn { .. }
            | Self::WrongColumnType { .. }
            | Self::ColumnLengthMismatch { .. }
            | Self::MissingSurveyYear
            | Self::InconsistentSurveyYear { .. } => ErrorKind::Schema,
            Self::AmbiguousAgeBoundary { .. } => ErrorKind::Design,
            Self::EmptyTable { .. }
            | Self::UnexpectedFoiColumns { .. }
            | Self::FoiGridGap { .. }
            | Self::FoiIndexShape { .. } => ErrorKind::Shape,
            Self::NonPositiveSampleSize { .. }
            | Self::NegativeValue { .. }
            | Self::SeropositiveExceedsSample { .. }
            | Self::InvertedAgeBin { .. }
            | Self::ZeroMaximumAge
            | Self::InvalidFoi { .. }
            | Self::InvalidSeroreversionRate { .. }
            | Self::InvalidGroupSize { .. } => ErrorKind::Domain,
            Self::FoiIndexLength { .. }
            | Self::FoiIndexStart { .. }
            | Self::FoiIndexStep { .. } => ErrorKind::Consistency,
        }
    }
}

/// A single named column of a raw table.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Integer(Vec<i64>),
    Real(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Integer(values) => values.len(),
            Self::Real(values) => values.len(),
            Self::Text(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Integer view; reals are accepted when every value is integral.
    fn integers(&self, name: &str) -> Result<Vec<i64>, ValidationError> {
        let wrong_type = || ValidationError::WrongColumnType {
            column: name.to_owned(),
            expected: "integer",
        };
        match self {
            Self::Integer(values) => Ok(values.clone()),
            Self::Real(values) => values
                .iter()
                .map(|value| {
                    if value.is_finite() && value.fract() == 0.0 {
                        num_traits::ToPrimitive::to_i64(value).ok_or_else(wrong_type)
                    } else {
                        Err(wrong_type())
                    }
                })
                .collect(),
            Self::Text(_) => Err(wrong_type()),
        }
    }

    fn reals(&self, name: &str) -> Result<Vec<f64>, ValidationError> {
        match self {
            Self::Integer(values) => Ok(values
                .iter()
                .map(|value| num_traits::ToPrimitive::to_f64(value).unwrap_or(f64::NAN))
                .collect()),
            Self::Real(values) => Ok(values.clone()),
            Self::Text(_) => Err(ValidationError::WrongColumnType {
                column: name.to_owned(),
                expected: "numeric",
            }),
        }
    }
}

/// Column-oriented raw table, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable {
    columns: BTreeMap<String, Column>,
}

impl ColumnTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    fn required(&self, name: &str) -> Result<&Column, ValidationError> {
        self.column(name)
            .ok_or_else(|| ValidationError::MissingColumn {
                column: name.to_owned(),
            })
    }

    pub(crate) fn required_integers(
        &self,
        name: &str,
        expected_len: Option<usize>,
    ) -> Result<Vec<i64>, ValidationError> {
        let column = self.required(name)?;
        check_length(name, column.len(), expected_len)?;
        column.integers(name)
    }

    pub(crate) fn required_reals(
        &self,
        name: &str,
        expected_len: Option<usize>,
    ) -> Result<Vec<f64>, ValidationError> {
        let column = self.required(name)?;
        check_length(name, column.len(), expected_len)?;
        column.reals(name)
    }
}

fn check_length(name: &str, len: usize, expected: Option<usize>) -> Result<(), ValidationError> {
    match expected {
        Some(expected) if expected != len => Err(ValidationError::ColumnLengthMismatch {
            column: name.to_owned(),
            len,
            expected,
        }),
        _ => Ok(()),
    }
}

fn to_age(value: i64, row: usize, column: &'static str) -> Result<u32, ValidationError> {
    u32::try_from(value).map_err(|_| ValidationError::NegativeValue { row, column })
}

fn to_count(value: i64, row: usize, column: &'static str) -> Result<u64, ValidationError> {
    u64::try_from(value).map_err(|_| ValidationError::NegativeValue { row, column })
}

/// One age bin of a survey design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBin {
    pub age_min: u32,
    pub age_max: u32,
    pub n_sample: u64,
}

impl AgeBin {
    #[must_use]
    pub const fn new(age_min: u32, age_max: u32, n_sample: u64) -> Self {
        Self {
            age_min,
            age_max,
            n_sample,
        }
    }
}

/// Reject designs where one bin's upper age equals another bin's lower age.
///
/// Every pair of bins is compared; designs are small enough that the
/// quadratic scan is not a concern.
///
/// # Errors
///
/// Returns `ValidationError::AmbiguousAgeBoundary` on the first collision.
pub fn validate_survey_features(bins: &[AgeBin]) -> Result<(), ValidationError> {
    for (first, upper) in bins.iter().enumerate() {
        for (second, lower) in bins.iter().enumerate() {
            if first != second && upper.age_max == lower.age_min {
                return Err(ValidationError::AmbiguousAgeBoundary {
                    first,
                    second,
                    age: upper.age_max,
                });
            }
        }
    }
    Ok(())
}

fn validate_bin_ranges(bins: &[AgeBin]) -> Result<(), ValidationError> {
    for (row, bin) in bins.iter().enumerate() {
        if bin.n_sample == 0 {
            return Err(ValidationError::NonPositiveSampleSize { row });
        }
        if bin.age_min > bin.age_max {
            return Err(ValidationError::InvertedAgeBin {
                row,
                age_min: bin.age_min,
                age_max: bin.age_max,
            });
        }
    }
    if bins.iter().map(|bin| bin.age_max).max().unwrap_or(0) == 0 {
        return Err(ValidationError::ZeroMaximumAge);
    }
    Ok(())
}

/// Survey design ("survey features") used by the simulators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyDesign {
    bins: Vec<AgeBin>,
}

impl SurveyDesign {
    /// # Errors
    ///
    /// Returns `ValidationError` if the bins are empty, malformed, or share
    /// boundary ages.
    pub fn new(bins: Vec<AgeBin>) -> Result<Self, ValidationError> {
        if bins.is_empty() {
            return Err(ValidationError::EmptyTable {
                table: "survey design",
            });
        }
        validate_bin_ranges(&bins)?;
        validate_survey_features(&bins)?;
        Ok(Self { bins })
    }

    /// Build a design from `age_min`, `age_max`, and `n_sample` columns.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` on missing or mistyped columns, or any
    /// failure reported by [`SurveyDesign::new`].
    pub fn from_columns(table: &ColumnTable) -> Result<Self, ValidationError> {
        let age_min = table.required_integers("age_min", None)?;
        let len = Some(age_min.len());
        let age_max = table.required_integers("age_max", len)?;
        let n_sample = table.required_integers("n_sample", len)?;

        let bins = (0..age_min.len())
            .map(|row| {
                Ok(AgeBin {
                    age_min: to_age(age_min[row], row, "age_min")?,
                    age_max: to_age(age_max[row], row, "age_max")?,
                    n_sample: to_count(n_sample[row], row, "n_sample")?,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;
        Self::new(bins)
    }

    #[must_use]
    pub fn bins(&self) -> &[AgeBin] {
        &self.bins
    }

    #[must_use]
    pub fn age_max(&self) -> u32 {
        self.bins.iter().map(|bin| bin.age_max).max().unwrap_or(0)
    }
}

/// One age-group record of a serosurvey.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurveyRow {
    pub age_min: u32,
    pub age_max: u32,
    pub n_sample: u64,
    pub n_seropositive: u64,
    pub survey_year: Option<i32>,
}

impl SurveyRow {
    #[must_use]
    pub const fn new(age_min: u32, age_max: u32, n_sample: u64, n_seropositive: u64) -> Self {
        Self {
            age_min,
            age_max,
            n_sample,
            n_seropositive,
            survey_year: None,
        }
    }

    #[must_use]
    pub const fn with_survey_year(mut self, survey_year: i32) -> Self {
        self.survey_year = Some(survey_year);
        self
    }

    /// Age at which the row's seropositivity is evaluated when fitting.
    #[must_use]
    pub const fn age_group(&self) -> u32 {
        (self.age_min + self.age_max) / 2
    }

    #[must_use]
    pub fn seroprevalence(&self) -> f64 {
        u64_to_f64(self.n_seropositive) / u64_to_f64(self.n_sample)
    }

    const fn bin(&self) -> AgeBin {
        AgeBin::new(self.age_min, self.age_max, self.n_sample)
    }
}

/// Validated age-stratified serosurvey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serosurvey {
    rows: Vec<SurveyRow>,
}

impl Serosurvey {
    /// # Errors
    ///
    /// Returns `ValidationError` if any row is out of range or the age bins
    /// share boundary ages.
    pub fn new(rows: Vec<SurveyRow>) -> Result<Self, ValidationError> {
        let survey = Self { rows };
        survey.validate()?;
        Ok(survey)
    }

    /// Build a serosurvey from a raw table with `age_min`, `age_max`,
    /// `n_sample`, `n_seropositive`, and optionally `survey_year` columns.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` on schema problems or invalid values.
    pub fn from_columns(table: &ColumnTable) -> Result<Self, ValidationError> {
        let age_min = table.required_integers("age_min", None)?;
        let len = Some(age_min.len());
        let age_max = table.required_integers("age_max", len)?;
        let n_sample = table.required_integers("n_sample", len)?;
        let n_seropositive = table.required_integers("n_seropositive", len)?;
        let survey_year = match table.column("survey_year") {
            Some(_) => Some(table.required_integers("survey_year", len)?),
            None => None,
        };

        let rows = (0..age_min.len())
            .map(|row| {
                let year = match &survey_year {
                    Some(years) => Some(i32::try_from(years[row]).map_err(|_| {
                        ValidationError::WrongColumnType {
                            column: "survey_year".to_owned(),
                            expected: "32-bit integer",
                        }
                    })?),
                    None => None,
                };
                Ok(SurveyRow {
                    age_min: to_age(age_min[row], row, "age_min")?,
                    age_max: to_age(age_max[row], row, "age_max")?,
                    n_sample: to_count(n_sample[row], row, "n_sample")?,
                    n_seropositive: to_count(n_seropositive[row], row, "n_seropositive")?,
                    survey_year: year,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;
        Self::new(rows)
    }

    /// Validate row values and age-bin boundaries.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the survey is malformed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.rows.is_empty() {
            return Err(ValidationError::EmptyTable { table: "serosurvey" });
        }
        for (row, record) in self.rows.iter().enumerate() {
            if record.n_seropositive > record.n_sample {
                return Err(ValidationError::SeropositiveExceedsSample {
                    row,
                    n_seropositive: record.n_seropositive,
                    n_sample: record.n_sample,
                });
            }
        }
        let bins = self.rows.iter().map(SurveyRow::bin).collect::<Vec<_>>();
        validate_bin_ranges(&bins)?;
        validate_survey_features(&bins)
    }

    #[must_use]
    pub fn rows(&self) -> &[SurveyRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Oldest age covered by any row.
    #[must_use]
    pub fn age_max(&self) -> u32 {
        self.rows.iter().map(|row| row.age_max).max().unwrap_or(0)
    }

    /// The single survey year shared by all rows.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any row lacks a year or rows disagree.
    pub fn survey_year(&self) -> Result<i32, ValidationError> {
        let mut years = self.rows.iter().map(|row| row.survey_year);
        let first = years
            .next()
            .flatten()
            .ok_or(ValidationError::MissingSurveyYear)?;
        for year in years {
            let year = year.ok_or(ValidationError::MissingSurveyYear)?;
            if year != first {
                return Err(ValidationError::InconsistentSurveyYear {
                    first,
                    second: year,
                });
            }
        }
        Ok(first)
    }

    /// Survey design implied by this survey's bins and sample sizes.
    #[must_use]
    pub fn design(&self) -> SurveyDesign {
        SurveyDesign {
            bins: self.rows.iter().map(SurveyRow::bin).collect(),
        }
    }
}
