//! Fit entry point and fitted-model summaries.

use thiserror::Error;

use crate::input::Serosurvey;
use crate::utils::u64_to_f64;

use super::diagnostics::{ConvergenceSummary, ElpdEstimate, summarize_convergence, waic};
use super::posterior::{
    Draws, ParameterSummary, PosteriorSummary, summarize_posterior, summarize_scalar,
};
use super::sampler::{Sampler, SamplerError};
use super::spec::{AssemblyError, FitOptions, ModelAssembler, ModelSpec};

/// Split-R-hat below which a fit is reported as converged.
pub const RHAT_THRESHOLD: f64 = 1.1;

/// Errors returned by [`fit`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error("sampler returned no draws")]
    EmptyPosterior,
}

/// Headline numbers of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model_name: String,
    pub elpd: Option<f64>,
    pub se: Option<f64>,
    pub max_rhat: Option<f64>,
    pub converged: bool,
}

/// Posterior FoI at one age or calendar year of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoiEstimate {
    /// Age or calendar year, depending on the model's index axis.
    pub key: i32,
    pub block: usize,
    pub summary: ParameterSummary,
}

/// Observed and posterior seroprevalence for one survey row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeroprevalenceEstimate {
    pub age_group: usize,
    pub observed: f64,
    pub summary: ParameterSummary,
}

/// A specification together with its posterior draws and diagnostics.
#[derive(Debug, Clone)]
pub struct FittedModel {
    spec: ModelSpec,
    draws: Draws,
    posterior: PosteriorSummary,
    convergence: Option<ConvergenceSummary>,
    elpd: Option<ElpdEstimate>,
}

/// Validate, assemble, and sample a serocatalytic model.
///
/// Validation and assembly complete before `sampler` is called; invalid
/// inputs never reach it.
///
/// # Errors
///
/// Returns `FitError` for invalid inputs or sampler failures.
pub fn fit(
    serosurvey: &Serosurvey,
    options: &FitOptions,
    sampler: &dyn Sampler,
) -> Result<FittedModel, FitError> {
    fit_with_assembler(&ModelAssembler::default(), serosurvey, options, sampler)
}

/// [`fit`] with an explicit assembler configuration.
///
/// # Errors
///
/// Returns `FitError` for invalid inputs or sampler failures.
pub fn fit_with_assembler(
    assembler: &ModelAssembler,
    serosurvey: &Serosurvey,
    options: &FitOptions,
    sampler: &dyn Sampler,
) -> Result<FittedModel, FitError> {
    let spec = assembler.assemble(serosurvey, options)?;
    let draws = sampler.sample(&spec)?;
    FittedModel::from_draws(spec, draws)
}

impl FittedModel {
    /// Summarize draws produced for `spec`.
    ///
    /// # Errors
    ///
    /// Returns `FitError` if `draws` is empty or does not match the
    /// parameter layout of `spec`.
    pub fn from_draws(spec: ModelSpec, draws: Draws) -> Result<Self, FitError> {
        if draws.is_empty() {
            return Err(FitError::EmptyPosterior);
        }
        let expected = spec.parameter_dimension();
        if draws.n_parameters() != expected || !draws.has_consistent_dimensions() {
            let found = draws
                .pooled()
                .map(<[f64]>::len)
                .find(|len| *len != expected)
                .unwrap_or_else(|| draws.n_parameters());
            return Err(SamplerError::DimensionMismatch { expected, found }.into());
        }

        let posterior = summarize_posterior(&draws);
        let convergence = match summarize_convergence(&draws) {
            Ok(summary) => Some(summary),
            Err(err) => {
                log::debug!("convergence diagnostics unavailable: {err}");
                None
            }
        };
        let log_likelihood = draws
            .pooled()
            .map(|draw| spec.pointwise_log_likelihood(&spec.split_draw(draw)))
            .collect::<Vec<_>>();
        let elpd = waic(&log_likelihood).ok();

        if let Some(rhat) = convergence.as_ref().and_then(|summary| summary.max_split_rhat)
            && rhat >= RHAT_THRESHOLD
        {
            log::warn!(
                "{} did not converge: max split R-hat {rhat:.3}",
                spec.model_name()
            );
        }

        Ok(Self {
            spec,
            draws,
            posterior,
            convergence,
            elpd,
        })
    }

    #[must_use]
    pub const fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    #[must_use]
    pub const fn draws(&self) -> &Draws {
        &self.draws
    }

    #[must_use]
    pub const fn posterior(&self) -> &PosteriorSummary {
        &self.posterior
    }

    #[must_use]
    pub const fn convergence(&self) -> Option<&ConvergenceSummary> {
        self.convergence.as_ref()
    }

    #[must_use]
    pub const fn elpd(&self) -> Option<&ElpdEstimate> {
        self.elpd.as_ref()
    }

    #[must_use]
    pub fn model_name(&self) -> String {
        self.spec.model_name()
    }

    #[must_use]
    pub fn summary(&self) -> ModelSummary {
        let max_rhat = self
            .convergence
            .as_ref()
            .and_then(|summary| summary.max_split_rhat);
        ModelSummary {
            model_name: self.model_name(),
            elpd: self.elpd.as_ref().map(|estimate| estimate.elpd),
            se: self.elpd.as_ref().map(|estimate| estimate.se),
            max_rhat,
            converged: max_rhat.is_some_and(|rhat| rhat < RHAT_THRESHOLD),
        }
    }

    /// Block-level FoI summaries expanded back onto the age or year grid.
    #[must_use]
    pub fn foi_estimates(&self) -> Vec<FoiEstimate> {
        let index = self.spec.foi_index();
        index
            .keys()
            .iter()
            .zip(index.indices().iter())
            .map(|(&key, &block)| FoiEstimate {
                key,
                block,
                summary: self.posterior.parameters[block - 1],
            })
            .collect()
    }

    #[must_use]
    pub fn sigma_rw(&self) -> Option<ParameterSummary> {
        self.posterior.get("sigma_rw")
    }

    #[must_use]
    pub fn seroreversion_rate(&self) -> Option<ParameterSummary> {
        self.posterior.get("seroreversion_rate")
    }

    /// Posterior seropositivity at each row's age group, next to the
    /// observed proportion.
    #[must_use]
    pub fn seroprevalence_estimates(&self) -> Vec<SeroprevalenceEstimate> {
        let per_draw = self
            .draws
            .pooled()
            .map(|draw| {
                let params = self.spec.split_draw(draw);
                self.spec
                    .seropositivity(&params.foi_vector, params.seroreversion_or_zero())
            })
            .collect::<Vec<_>>();

        (0..self.spec.n_observations())
            .map(|row| {
                let values = per_draw.iter().map(|draw| draw[row]).collect::<Vec<_>>();
                SeroprevalenceEstimate {
                    age_group: self.spec.ages()[row],
                    observed: u64_to_f64(self.spec.n_seropositive()[row])
                        / u64_to_f64(self.spec.n_sample()[row]),
                    summary: summarize_scalar(&values),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SurveyRow;
    use crate::models::posterior::PosteriorChain;
    use crate::models::types::ModelType;
    use approx::assert_relative_eq;

    struct FixedSampler {
        draws: Vec<Vec<f64>>,
    }

    impl Sampler for FixedSampler {
        fn sample(&self, spec: &ModelSpec) -> Result<Draws, SamplerError> {
            let half = self.draws.len() / 2;
            Ok(Draws::new(
                spec.parameter_names(),
                vec![
                    PosteriorChain {
                        draws: self.draws[..half].to_vec(),
                        acceptance_rate: 0.3,
                    },
                    PosteriorChain {
                        draws: self.draws[half..].to_vec(),
                        acceptance_rate: 0.3,
                    },
                ],
            ))
        }
    }

    fn survey() -> Serosurvey {
        Serosurvey::new(vec![
            SurveyRow::new(1, 4, 100, 10).with_survey_year(2020),
            SurveyRow::new(5, 9, 100, 25).with_survey_year(2020),
        ])
        .expect("valid survey")
    }

    fn jittered(center: f64, count: usize) -> Vec<Vec<f64>> {
        (0..count)
            .map(|draw| {
                let offset = if draw % 2 == 0 { 0.001 } else { -0.001 };
                vec![center + offset]
            })
            .collect()
    }

    #[test]
    fn constant_fit_summaries() {
        let sampler = FixedSampler {
            draws: jittered(0.05, 40),
        };
        let fitted = fit(&survey(), &FitOptions::new(ModelType::Constant), &sampler)
            .expect("fit succeeds");
        let summary = fitted.summary();
        assert_eq!(summary.model_name, "constant_no_seroreversion");
        assert!(summary.converged);
        assert!(summary.elpd.is_some_and(f64::is_finite));
        assert!(summary.se.is_some_and(|se| se >= 0.0));

        let foi = fitted.foi_estimates();
        assert_eq!(foi.len(), 9);
        assert!(foi.iter().all(|estimate| estimate.block == 1));
        assert_relative_eq!(foi[0].summary.mean, 0.05, epsilon = 1.0e-12);
        assert!(fitted.sigma_rw().is_none());

        let prevalence = fitted.seroprevalence_estimates();
        assert_eq!(prevalence.len(), 2);
        assert_relative_eq!(prevalence[0].observed, 0.1);
        assert_eq!(prevalence[1].age_group, 7);
        assert_relative_eq!(
            prevalence[1].summary.mean,
            1.0 - (-0.05f64 * 7.0).exp(),
            epsilon = 1.0e-4
        );
    }

    #[test]
    fn mismatched_draw_width_is_rejected() {
        let sampler = FixedSampler {
            draws: vec![vec![0.05, 0.1]; 10],
        };
        let err = fit(&survey(), &FitOptions::new(ModelType::Constant), &sampler)
            .expect_err("draw width mismatch");
        assert_eq!(
            err,
            FitError::Sampler(SamplerError::DimensionMismatch {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn empty_draws_are_rejected() {
        let sampler = FixedSampler { draws: Vec::new() };
        let err = fit(&survey(), &FitOptions::new(ModelType::Constant), &sampler)
            .expect_err("no draws");
        assert_eq!(err, FitError::EmptyPosterior);
    }
}
