//! FoI tables and FoI-index tables.

use super::{ColumnTable, Serosurvey, ValidationError};

/// Key columns carried by an FoI table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoiTableKind {
    /// One value per age `1..=n`.
    Age,
    /// One value per consecutive calendar year.
    Year,
    /// One value per `(year, age)` pair on a full grid.
    YearAndAge,
}

impl FoiTableKind {
    /// Column names expected for this kind, in sorted order.
    #[must_use]
    pub fn expected_columns(self) -> Vec<&'static str> {
        match self {
            Self::Age => vec!["age", "foi"],
            Self::Year => vec!["foi", "year"],
            Self::YearAndAge => vec!["age", "foi", "year"],
        }
    }
}

/// Layout of the unit grid an FoI table covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoiGrid {
    Age,
    Year { first_year: i32 },
    YearAndAge { first_year: i32, max_age: usize },
}

/// Validated ground-truth FoI values on a contiguous unit grid.
///
/// Year-and-age tables are stored year-major: the value for year offset `y`
/// and age `a` lives at `y * max_age + (a - 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FoiTable {
    grid: FoiGrid,
    values: Vec<f64>,
}

impl FoiTable {
    /// FoI by age, with `values[k]` applying to age `k + 1`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the table is empty or holds invalid values.
    pub fn by_age(values: Vec<f64>) -> Result<Self, ValidationError> {
        Self::validated(FoiGrid::Age, values)
    }

    /// FoI by calendar year, with `values[k]` applying to `first_year + k`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the table is empty or holds invalid values.
    pub fn by_year(first_year: i32, values: Vec<f64>) -> Result<Self, ValidationError> {
        Self::validated(FoiGrid::Year { first_year }, values)
    }

    /// FoI by calendar year and age, year-major.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the values do not fill whole years of
    /// `max_age` entries or hold invalid values.
    pub fn by_year_and_age(
        first_year: i32,
        max_age: usize,
        values: Vec<f64>,
    ) -> Result<Self, ValidationError> {
        if max_age == 0 || !values.len().is_multiple_of(max_age) {
            return Err(ValidationError::FoiGridGap {
                key: i64::from(first_year),
            });
        }
        Self::validated(
            FoiGrid::YearAndAge {
                first_year,
                max_age,
            },
            values,
        )
    }

    fn validated(grid: FoiGrid, values: Vec<f64>) -> Result<Self, ValidationError> {
        if values.is_empty() {
            return Err(ValidationError::EmptyTable { table: "FoI" });
        }
        if let Some((position, value)) = values
            .iter()
            .copied()
            .enumerate()
            .find(|(_, value)| !(value.is_finite() && *value >= 0.0))
        {
            return Err(ValidationError::InvalidFoi { position, value });
        }
        Ok(Self { grid, values })
    }

    /// Build a table from raw columns: exactly one `foi` value column plus
    /// the key columns of `kind`. Rows may arrive in any order.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the columns do not match `kind`, keys do
    /// not cover a contiguous grid, or values are invalid.
    pub fn from_columns(table: &ColumnTable, kind: FoiTableKind) -> Result<Self, ValidationError> {
        let expected = kind.expected_columns();
        let found = table.column_names().collect::<Vec<_>>();
        if found != expected {
            return Err(ValidationError::UnexpectedFoiColumns {
                found: found.into_iter().map(str::to_owned).collect(),
                expected,
            });
        }

        let foi = table.required_reals("foi", None)?;
        let len = Some(foi.len());
        match kind {
            FoiTableKind::Age => {
                let ages = table.required_integers("age", len)?;
                let values = sorted_contiguous(&ages, &foi, Some(1))?;
                Self::by_age(values)
            }
            FoiTableKind::Year => {
                let years = table.required_integers("year", len)?;
                let first_year = first_year(&years)?;
                let values = sorted_contiguous(&years, &foi, None)?;
                Self::by_year(first_year, values)
            }
            FoiTableKind::YearAndAge => {
                let years = table.required_integers("year", len)?;
                let ages = table.required_integers("age", len)?;
                year_age_grid(&years, &ages, &foi)
            }
        }
    }

    #[must_use]
    pub const fn grid(&self) -> FoiGrid {
        self.grid
    }

    #[must_use]
    pub const fn kind(&self) -> FoiTableKind {
        match self.grid {
            FoiGrid::Age => FoiTableKind::Age,
            FoiGrid::Year { .. } => FoiTableKind::Year,
            FoiGrid::YearAndAge { .. } => FoiTableKind::YearAndAge,
        }
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of calendar years covered (ages for age tables).
    #[must_use]
    pub fn n_years(&self) -> usize {
        match self.grid {
            FoiGrid::Age | FoiGrid::Year { .. } => self.values.len(),
            FoiGrid::YearAndAge { max_age, .. } => self.values.len() / max_age,
        }
    }

    /// Oldest cohort age whose full history the table describes.
    #[must_use]
    pub fn max_age(&self) -> usize {
        match self.grid {
            FoiGrid::Age | FoiGrid::Year { .. } => self.values.len(),
            FoiGrid::YearAndAge { max_age, .. } => max_age.min(self.n_years()),
        }
    }

    /// Year the survey is taken: the year after the last tabulated year.
    #[must_use]
    pub fn survey_year(&self) -> Option<i32> {
        let years = i32::try_from(self.n_years()).ok()?;
        match self.grid {
            FoiGrid::Age => None,
            FoiGrid::Year { first_year } | FoiGrid::YearAndAge { first_year, .. } => {
                first_year.checked_add(years)
            }
        }
    }
}

fn first_year(years: &[i64]) -> Result<i32, ValidationError> {
    let min = years.iter().copied().min().unwrap_or(0);
    i32::try_from(min).map_err(|_| ValidationError::FoiGridGap { key: min })
}

/// Sort `(key, value)` pairs and require keys to step by exactly one,
/// optionally starting from `start`.
fn sorted_contiguous(
    keys: &[i64],
    values: &[f64],
    start: Option<i64>,
) -> Result<Vec<f64>, ValidationError> {
    let mut pairs = keys.iter().copied().zip(values.iter().copied()).collect::<Vec<_>>();
    pairs.sort_by_key(|(key, _)| *key);
    let origin = start.or_else(|| pairs.first().map(|(key, _)| *key)).unwrap_or(0);
    for (offset, (key, _)) in pairs.iter().enumerate() {
        let expected = origin + i64::try_from(offset).unwrap_or(i64::MAX);
        if *key != expected {
            return Err(ValidationError::FoiGridGap { key: expected });
        }
    }
    Ok(pairs.into_iter().map(|(_, value)| value).collect())
}

fn year_age_grid(years: &[i64], ages: &[i64], foi: &[f64]) -> Result<FoiTable, ValidationError> {
    let first = first_year(years)?;
    let max_age = ages.iter().copied().max().unwrap_or(0);
    let max_age_usize = usize::try_from(max_age).map_err(|_| ValidationError::FoiGridGap {
        key: max_age,
    })?;
    if max_age_usize == 0 {
        return Err(ValidationError::FoiGridGap { key: 0 });
    }

    let mut triples = years
        .iter()
        .copied()
        .zip(ages.iter().copied())
        .zip(foi.iter().copied())
        .collect::<Vec<_>>();
    triples.sort_by_key(|((year, age), _)| (*year, *age));

    for (offset, ((year, age), _)) in triples.iter().enumerate() {
        let expected_year = i64::from(first) + i64::try_from(offset / max_age_usize).unwrap_or(0);
        let expected_age = i64::try_from(offset % max_age_usize + 1).unwrap_or(0);
        if *year != expected_year || *age != expected_age {
            return Err(ValidationError::FoiGridGap { key: expected_year });
        }
    }

    FoiTable::by_year_and_age(
        first,
        max_age_usize,
        triples.into_iter().map(|(_, value)| value).collect(),
    )
}

/// Whether an FoI-index table is keyed by age or by calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAxis {
    Age,
    Year,
}

impl IndexAxis {
    #[must_use]
    pub const fn column_name(self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Year => "year",
        }
    }
}

/// Grouping of consecutive ages or years into blocks sharing one FoI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoiIndexTable {
    axis: IndexAxis,
    keys: Vec<i32>,
    indices: Vec<usize>,
}

impl FoiIndexTable {
    /// # Errors
    ///
    /// Returns `ValidationError` if `keys` and `indices` differ in length or
    /// are empty. Contiguity is checked against a survey by
    /// [`validate_foi_index`].
    pub fn new(axis: IndexAxis, keys: Vec<i32>, indices: Vec<usize>) -> Result<Self, ValidationError> {
        if keys.len() != indices.len() {
            return Err(ValidationError::FoiIndexShape {
                keys: keys.len(),
                indices: indices.len(),
            });
        }
        if indices.is_empty() {
            return Err(ValidationError::EmptyTable { table: "FoI index" });
        }
        Ok(Self {
            axis,
            keys,
            indices,
        })
    }

    /// Build an index table from an `age` or `year` column plus `foi_index`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if columns are missing, mistyped, or the
    /// table carries extra columns.
    pub fn from_columns(table: &ColumnTable, axis: IndexAxis) -> Result<Self, ValidationError> {
        let key_name = axis.column_name();
        let found = table.column_names().collect::<Vec<_>>();
        if table.ncols() != 2 || !found.contains(&key_name) || !found.contains(&"foi_index") {
            return Err(ValidationError::UnexpectedFoiColumns {
                found: found.into_iter().map(str::to_owned).collect(),
                expected: vec![key_name, "foi_index"],
            });
        }
        let raw_indices = table.required_integers("foi_index", None)?;
        let raw_keys = table.required_integers(key_name, Some(raw_indices.len()))?;

        let keys = raw_keys
            .iter()
            .map(|key| {
                i32::try_from(*key).map_err(|_| ValidationError::WrongColumnType {
                    column: key_name.to_owned(),
                    expected: "32-bit integer",
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let indices = raw_indices
            .iter()
            .enumerate()
            .map(|(row, index)| {
                usize::try_from(*index).map_err(|_| ValidationError::NegativeValue {
                    row,
                    column: "foi_index",
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(axis, keys, indices)
    }

    #[must_use]
    pub const fn axis(&self) -> IndexAxis {
        self.axis
    }

    #[must_use]
    pub fn keys(&self) -> &[i32] {
        &self.keys
    }

    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of distinct FoI blocks.
    #[must_use]
    pub fn n_blocks(&self) -> usize {
        self.indices.iter().copied().max().unwrap_or(0)
    }
}

/// Check that an index table has one entry per surveyed age, starts at 1,
/// and only ever stays flat or steps up by one.
///
/// # Errors
///
/// Returns a consistency `ValidationError` describing the first violation.
pub fn validate_foi_index(index: &FoiIndexTable, survey: &Serosurvey) -> Result<(), ValidationError> {
    let expected = usize::try_from(survey.age_max()).unwrap_or(usize::MAX);
    if index.len() != expected {
        return Err(ValidationError::FoiIndexLength {
            len: index.len(),
            expected,
        });
    }
    let first = index.indices[0];
    if first != 1 {
        return Err(ValidationError::FoiIndexStart { found: first });
    }
    for (position, pair) in index.indices.windows(2).enumerate() {
        let delta = signed(pair[1]) - signed(pair[0]);
        if !(0..=1).contains(&delta) {
            return Err(ValidationError::FoiIndexStep {
                position: position + 1,
                delta,
            });
        }
    }
    Ok(())
}

/// # Errors
///
/// Returns `ValidationError::InvalidSeroreversionRate` if the rate is
/// negative or not finite.
pub fn validate_seroreversion_rate(rate: f64) -> Result<(), ValidationError> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidSeroreversionRate { rate })
    }
}

fn signed(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
