//! Forward simulation for arbitrary compartmental catalytic models.
//!
//! The caller supplies a piecewise-constant transition-rate generator per
//! calendar year. Each birth cohort is propagated from its birth year to the
//! survey year by multiplying the state with `exp(A_t)` one year at a time,
//! and a reduction maps the final state to a seropositive fraction.

use faer::Mat;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::input::{Serosurvey, SurveyDesign};
use crate::utils::{expm, mat_vec};

use super::{SimulationError, checked_probability, draw_observations};

/// Caller-supplied compartmental model.
///
/// `transition_matrix(year, birth_year, u, v)` returns the generator in
/// force during `year` for the cohort born in `birth_year`; it acts on
/// column state vectors (`dx/dt = A x`). `u[k]` and `v[k]` are exogenous
/// multipliers for calendar year `survey_year - max_age + 1 + k`.
#[derive(Debug, Clone)]
pub struct GeneralModel<A, R> {
    pub transition_matrix: A,
    pub reduce: R,
    pub initial_conditions: Vec<f64>,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
}

impl<A, R> GeneralModel<A, R>
where
    A: Fn(i32, i32, &[f64], &[f64]) -> Mat<f64> + Sync,
    R: Fn(&[f64]) -> f64 + Sync,
{
    #[must_use]
    pub fn new(transition_matrix: A, reduce: R, initial_conditions: Vec<f64>) -> Self {
        Self {
            transition_matrix,
            reduce,
            initial_conditions,
            u: Vec::new(),
            v: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_series(self, u: Vec<f64>, v: Vec<f64>) -> Self {
        Self { u, v, ..self }
    }

    /// Seropositive fraction of the cohort aged `age` at `survey_year`.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError` for malformed generators or reductions
    /// outside `[0, 1]`.
    pub fn seropositivity_at(&self, age: usize, survey_year: i32) -> Result<f64, SimulationError> {
        let dim = self.initial_conditions.len();
        if dim == 0 {
            return Err(SimulationError::EmptyInitialConditions);
        }
        let birth_year = survey_year - i32::try_from(age).unwrap_or(i32::MAX);
        let mut state = self.initial_conditions.clone();
        for year in birth_year + 1..=survey_year {
            let generator = (self.transition_matrix)(year, birth_year, &self.u, &self.v);
            if generator.nrows() != dim || generator.ncols() != dim {
                return Err(SimulationError::TransitionShape {
                    year,
                    rows: generator.nrows(),
                    cols: generator.ncols(),
                    dim,
                });
            }
            state = mat_vec(&expm(&generator)?, &state);
        }
        checked_probability((self.reduce)(&state), age)
    }

    /// Age profile over ages `1..=max_age`, one independent cohort per age.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError` if the series are too short or any cohort
    /// fails.
    pub fn age_profile(&self, max_age: usize, survey_year: i32) -> Result<Vec<f64>, SimulationError> {
        for (name, series) in [("u", &self.u), ("v", &self.v)] {
            if series.len() < max_age {
                return Err(SimulationError::SeriesTooShort {
                    name,
                    len: series.len(),
                    required: max_age,
                });
            }
        }
        (1..=max_age)
            .into_par_iter()
            .map(|age| self.seropositivity_at(age, survey_year))
            .collect()
    }
}

/// Simulate a serosurvey from a general compartmental model.
///
/// # Errors
///
/// Returns `SimulationError` for malformed models or invalid designs.
pub fn simulate_general<A, R>(
    model: &GeneralModel<A, R>,
    design: &SurveyDesign,
    survey_year: i32,
    seed: u64,
) -> Result<Serosurvey, SimulationError>
where
    A: Fn(i32, i32, &[f64], &[f64]) -> Mat<f64> + Sync,
    R: Fn(&[f64]) -> f64 + Sync,
{
    let max_age = usize::try_from(design.age_max()).unwrap_or(usize::MAX);
    log::debug!(
        "simulating {}-compartment model over {max_age} cohorts",
        model.initial_conditions.len()
    );
    let profile = model.age_profile(max_age, survey_year)?;
    let mut rng = StdRng::seed_from_u64(seed);
    draw_observations(design, &profile, Some(survey_year), &mut rng)
}
