//! Forward simulation of synthetic serosurveys.
//!
//! Two paths share one observation layer: [`simulate`] computes the age
//! profile with the piecewise-constant recursion, [`simulate_general`]
//! exponentiates a caller-supplied transition-rate generator. Either way each
//! design bin receives `n_seropositive ~ Binomial(n_sample, p̄)`, where `p̄`
//! is the mean seropositivity over the bin's ages.

pub mod general;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Binomial, Distribution};
use thiserror::Error;

use crate::input::{
    FoiGrid, FoiTable, FoiTableKind, Serosurvey, SurveyDesign, SurveyRow, ValidationError,
    validate_seroreversion_rate,
};
use crate::models::seropositivity::{
    profile_at, seropositivity_age_and_time, seropositivity_by_age, seropositivity_time_varying,
};
use crate::utils::{LinalgError, usize_to_f64};

pub use general::{GeneralModel, simulate_general};

/// Tolerance for reductions that land marginally outside `[0, 1]`.
const PROBABILITY_TOLERANCE: f64 = 1.0e-9;

/// Errors raised while simulating a serosurvey.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),
    #[error(transparent)]
    Linalg(#[from] LinalgError),
    #[error("{model:?} simulation needs a {expected:?} FoI table, found {found:?}")]
    TableMismatch {
        model: SimulationModel,
        expected: FoiTableKind,
        found: FoiTableKind,
    },
    #[error("FoI table covers ages up to {available} but the design reaches age {required}")]
    FoiTooShort { required: usize, available: usize },
    #[error("initial conditions must not be empty")]
    EmptyInitialConditions,
    #[error("transition matrix for year {year} is {rows}x{cols}, expected {dim}x{dim}")]
    TransitionShape {
        year: i32,
        rows: usize,
        cols: usize,
        dim: usize,
    },
    #[error("series `{name}` has {len} entries but {required} are required")]
    SeriesTooShort {
        name: &'static str,
        len: usize,
        required: usize,
    },
    #[error("seropositivity {value} at age {age} is outside [0, 1]")]
    InvalidSeropositivity { age: usize, value: f64 },
}

/// Piecewise-constant FoI layout used for simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulationModel {
    Age,
    Time,
    AgeAndTime,
}

impl SimulationModel {
    #[must_use]
    pub const fn table_kind(self) -> FoiTableKind {
        match self {
            Self::Age => FoiTableKind::Age,
            Self::Time => FoiTableKind::Year,
            Self::AgeAndTime => FoiTableKind::YearAndAge,
        }
    }
}

/// Simulate a serosurvey from a piecewise-constant FoI table.
///
/// Year-keyed tables date the survey to the year after their last row and
/// stamp it on every simulated row.
///
/// # Errors
///
/// Returns `SimulationError` if the table does not match `model`, does not
/// cover the design's ages, or the seroreversion rate is invalid.
pub fn simulate(
    model: SimulationModel,
    foi_table: &FoiTable,
    design: &SurveyDesign,
    seroreversion_rate: f64,
    seed: u64,
) -> Result<Serosurvey, SimulationError> {
    validate_seroreversion_rate(seroreversion_rate)?;
    if foi_table.kind() != model.table_kind() {
        return Err(SimulationError::TableMismatch {
            model,
            expected: model.table_kind(),
            found: foi_table.kind(),
        });
    }

    let profile = match model {
        SimulationModel::Age => seropositivity_by_age(foi_table.values(), seroreversion_rate),
        SimulationModel::Time => {
            seropositivity_time_varying(foi_table.values(), seroreversion_rate)
        }
        SimulationModel::AgeAndTime => {
            let stride = match foi_table.grid() {
                FoiGrid::YearAndAge { max_age, .. } => max_age,
                FoiGrid::Age | FoiGrid::Year { .. } => foi_table.max_age(),
            };
            seropositivity_age_and_time(foi_table.values(), stride, seroreversion_rate)
        }
    };
    let required = usize::try_from(design.age_max()).unwrap_or(usize::MAX);
    if profile.len() < required {
        return Err(SimulationError::FoiTooShort {
            required,
            available: profile.len(),
        });
    }

    log::debug!(
        "simulating {model:?} serosurvey: {} bins, age_max {required}",
        design.bins().len()
    );
    let mut rng = StdRng::seed_from_u64(seed);
    draw_observations(design, &profile, foi_table.survey_year(), &mut rng)
}

/// Draw binomial counts for every bin of `design` from an age profile over
/// ages `1..=profile.len()`.
pub(crate) fn draw_observations(
    design: &SurveyDesign,
    profile: &[f64],
    survey_year: Option<i32>,
    rng: &mut StdRng,
) -> Result<Serosurvey, SimulationError> {
    let rows = design
        .bins()
        .iter()
        .map(|bin| {
            let ages = bin.age_min..=bin.age_max;
            let n_ages = ages.clone().count();
            let mean = ages
                .map(|age| profile_at(profile, usize::try_from(age).unwrap_or(usize::MAX)))
                .sum::<f64>()
                / usize_to_f64(n_ages);
            let probability = checked_probability(mean, usize::try_from(bin.age_max).unwrap_or(0))?;
            let binomial = Binomial::new(bin.n_sample, probability).map_err(|_| {
                SimulationError::InvalidSeropositivity {
                    age: usize::try_from(bin.age_max).unwrap_or(0),
                    value: probability,
                }
            })?;
            let row = SurveyRow::new(
                bin.age_min,
                bin.age_max,
                bin.n_sample,
                binomial.sample(rng),
            );
            Ok(match survey_year {
                Some(year) => row.with_survey_year(year),
                None => row,
            })
        })
        .collect::<Result<Vec<_>, SimulationError>>()?;

    Ok(Serosurvey::new(rows)?)
}

/// Accept values in `[0, 1]` up to rounding, clamping the residue.
pub(crate) fn checked_probability(value: f64, age: usize) -> Result<f64, SimulationError> {
    if value.is_finite()
        && (-PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE).contains(&value)
    {
        Ok(value.clamp(0.0, 1.0))
    } else {
        Err(SimulationError::InvalidSeropositivity { age, value })
    }
}
