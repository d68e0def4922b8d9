//! Assembly of the data and parameter bundle consumed by a sampler.
//!
//! A [`ModelSpec`] is built fresh for every fit from a validated serosurvey
//! and a [`FitOptions`] request. It carries the observation arrays, the
//! FoI-index grouping, and one resolved prior per parameter site, and can
//! evaluate the binomial log posterior itself so that any [`Sampler`]
//! implementation can consume it directly.
//!
//! [`Sampler`]: super::sampler::Sampler

use serde::Serialize;
use statrs::function::gamma::ln_gamma;
use thiserror::Error;

use crate::input::{
    FoiIndexTable, IndexAxis, Serosurvey, ValidationError, validate_foi_index,
};
use crate::utils::{u64_to_f64, usize_to_f64};

use super::foi_index::build_foi_index;
use super::priors::{Prior, PriorError, PriorFamily, PriorSite, log_normal_density};
use super::seropositivity::{
    cohort_seropositivity_time_varying, expand_foi_blocks, profile_at, seropositivity_by_age,
};
use super::types::ModelType;

/// Default hyperprior for the random-walk scale on the linear FoI scale.
pub const DEFAULT_LINEAR_SIGMA_PRIOR: Prior = Prior::Cauchy {
    location: 0.0,
    scale: 1.0,
};

/// Default hyperprior for the random-walk scale on the log FoI scale.
pub const DEFAULT_LOG_SIGMA_PRIOR: Prior = Prior::Normal { mean: 0.0, sd: 1.0 };

/// Default prior for the first FoI block on the linear scale.
pub const DEFAULT_FOI_PRIOR: Prior = Prior::Uniform { min: 0.0, max: 10.0 };

/// Default prior for the first log FoI block; centred near 0.05 per year.
pub const DEFAULT_LOG_FOI_PRIOR: Prior = Prior::Normal {
    mean: -3.0,
    sd: 1.0,
};

const EPS_PROBABILITY: f64 = 1.0e-12;
const MIN_INITIAL_RATE: f64 = 1.0e-3;
const LINEAR_SIGMA_INIT: f64 = 0.05;
const LOG_SIGMA_INIT: f64 = 0.5;
const SEROREVERSION_INIT: f64 = 0.05;

/// Errors returned while assembling a model specification.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssemblyError {
    #[error(transparent)]
    InvalidInput(#[from] ValidationError),
    #[error(transparent)]
    InvalidPrior(#[from] PriorError),
    #[error("log-scale random walks are not available for the {model_type} model")]
    LogScaleUnsupported { model_type: ModelType },
    #[error("FoI index keyed by {found:?} cannot drive the {model_type} model")]
    IndexAxisMismatch {
        model_type: ModelType,
        found: IndexAxis,
    },
}

/// Hyperprior configuration fixed when the assembler is constructed.
///
/// The random-walk scale always uses a Cauchy hyperprior on the linear
/// scale and a Normal hyperprior on the log scale; only their parameters
/// are configurable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblerConfig {
    pub linear_sigma_prior: Prior,
    pub log_sigma_prior: Prior,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            linear_sigma_prior: DEFAULT_LINEAR_SIGMA_PRIOR,
            log_sigma_prior: DEFAULT_LOG_SIGMA_PRIOR,
        }
    }
}

impl AssemblerConfig {
    /// # Errors
    ///
    /// Returns `PriorError` if either hyperprior has the wrong family or
    /// invalid parameters.
    pub fn validate(self) -> Result<(), PriorError> {
        self.linear_sigma_prior
            .check_site(PriorSite::FoiSigma, &[PriorFamily::Cauchy])?;
        self.log_sigma_prior
            .check_site(PriorSite::FoiSigma, &[PriorFamily::Normal])?;
        Ok(())
    }
}

/// Model family and prior choices for one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub model_type: ModelType,
    /// Prior for the first FoI block; on the log scale it applies to log FoI.
    /// `None` selects [`DEFAULT_FOI_PRIOR`] or [`DEFAULT_LOG_FOI_PRIOR`] by
    /// scale.
    pub foi_prior: Option<Prior>,
    /// Explicit FoI grouping; defaults to one block per age or year.
    pub foi_index: Option<FoiIndexTable>,
    pub is_log_foi: bool,
    pub is_seroreversion: bool,
    pub seroreversion_prior: Option<Prior>,
}

impl FitOptions {
    #[must_use]
    pub const fn new(model_type: ModelType) -> Self {
        Self {
            model_type,
            foi_prior: None,
            foi_index: None,
            is_log_foi: false,
            is_seroreversion: false,
            seroreversion_prior: None,
        }
    }

    #[must_use]
    pub const fn with_foi_prior(mut self, foi_prior: Prior) -> Self {
        self.foi_prior = Some(foi_prior);
        self
    }

    #[must_use]
    pub fn with_foi_index(self, foi_index: FoiIndexTable) -> Self {
        Self {
            foi_index: Some(foi_index),
            ..self
        }
    }

    #[must_use]
    pub const fn with_log_foi(mut self, is_log_foi: bool) -> Self {
        self.is_log_foi = is_log_foi;
        self
    }

    /// Enable seroreversion with the given rate prior.
    #[must_use]
    pub const fn with_seroreversion(mut self, prior: Prior) -> Self {
        self.is_seroreversion = true;
        self.seroreversion_prior = Some(prior);
        self
    }

    /// The explicit FoI prior, or the default for the working scale.
    #[must_use]
    pub const fn resolved_foi_prior(&self) -> Prior {
        match self.foi_prior {
            Some(prior) => prior,
            None if self.is_log_foi => DEFAULT_LOG_FOI_PRIOR,
            None => DEFAULT_FOI_PRIOR,
        }
    }
}

/// Parameter values on their natural scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    pub foi_vector: Vec<f64>,
    pub sigma_rw: Option<f64>,
    pub seroreversion_rate: Option<f64>,
}

impl ModelParameters {
    #[must_use]
    pub fn seroreversion_or_zero(&self) -> f64 {
        self.seroreversion_rate.unwrap_or(0.0)
    }

    /// Flatten into the order given by [`ModelSpec::parameter_names`].
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        self.foi_vector
            .iter()
            .copied()
            .chain(self.sigma_rw)
            .chain(self.seroreversion_rate)
            .collect()
    }
}

/// Named data block for an external sampler program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerData {
    pub n_observations: usize,
    pub age_max: usize,
    pub ages: Vec<usize>,
    pub n_seropositive: Vec<u64>,
    pub n_sample: Vec<u64>,
    pub foi_index: Vec<usize>,
    pub is_log_foi: u8,
    pub foi_prior_index: u8,
    pub foi_mean: f64,
    pub foi_sd: f64,
    pub foi_min: f64,
    pub foi_max: f64,
    pub foi_sigma_rw_prior_index: u8,
    pub foi_sigma_rw_loc: f64,
    pub foi_sigma_rw_sc: f64,
    pub seroreversion_prior_index: u8,
    pub seroreversion_mean: f64,
    pub seroreversion_sd: f64,
    pub seroreversion_min: f64,
    pub seroreversion_max: f64,
}

/// Immutable, fully resolved model specification.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    model_type: ModelType,
    is_log_foi: bool,
    age_max: usize,
    ages: Vec<usize>,
    n_sample: Vec<u64>,
    n_seropositive: Vec<u64>,
    foi_index: FoiIndexTable,
    foi_prior: Prior,
    sigma_prior: Option<Prior>,
    seroreversion_prior: Option<Prior>,
    log_binomial_coefficients: Vec<f64>,
}

/// Builds [`ModelSpec`]s under a fixed hyperprior configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelAssembler {
    config: AssemblerConfig,
}

impl ModelAssembler {
    /// # Errors
    ///
    /// Returns `AssemblyError` if the configuration is invalid.
    pub fn new(config: AssemblerConfig) -> Result<Self, AssemblyError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> AssemblerConfig {
        self.config
    }

    /// Validate inputs and assemble the specification for one fit.
    ///
    /// All checks run before any numeric work; nothing is sampled here.
    ///
    /// # Errors
    ///
    /// Returns `AssemblyError` for invalid surveys, priors, or FoI indices.
    pub fn assemble(
        &self,
        serosurvey: &Serosurvey,
        options: &FitOptions,
    ) -> Result<ModelSpec, AssemblyError> {
        serosurvey.validate()?;
        let model_type = options.model_type;
        if options.is_log_foi && !model_type.has_random_walk() {
            return Err(AssemblyError::LogScaleUnsupported { model_type });
        }

        let foi_prior = options
            .resolved_foi_prior()
            .check_site(PriorSite::Foi, &[PriorFamily::Normal, PriorFamily::Uniform])?;
        let seroreversion_prior = if options.is_seroreversion {
            let prior = options.seroreversion_prior.ok_or(PriorError::Missing {
                site: PriorSite::Seroreversion,
            })?;
            Some(prior.check_site(
                PriorSite::Seroreversion,
                &[PriorFamily::Normal, PriorFamily::Uniform],
            )?)
        } else {
            None
        };

        if model_type == ModelType::Constant && options.foi_index.is_some() {
            log::debug!("ignoring explicit FoI index for the constant model");
        }
        let foi_index = match (model_type, &options.foi_index) {
            (ModelType::Constant, _) | (_, None) => build_foi_index(serosurvey, 1, model_type)?,
            (_, Some(index)) => {
                if index.axis() != model_type.index_axis() {
                    return Err(AssemblyError::IndexAxisMismatch {
                        model_type,
                        found: index.axis(),
                    });
                }
                index.clone()
            }
        };
        validate_foi_index(&foi_index, serosurvey)?;

        let sigma_prior = (model_type.has_random_walk() && foi_index.n_blocks() > 1).then_some(
            if options.is_log_foi {
                self.config.log_sigma_prior
            } else {
                self.config.linear_sigma_prior
            },
        );

        let rows = serosurvey.rows();
        let ages = rows
            .iter()
            .map(|row| usize::try_from(row.age_group()).unwrap_or(usize::MAX))
            .collect::<Vec<_>>();
        let n_sample = rows.iter().map(|row| row.n_sample).collect::<Vec<_>>();
        let n_seropositive = rows.iter().map(|row| row.n_seropositive).collect::<Vec<_>>();
        let log_binomial_coefficients = n_sample
            .iter()
            .zip(n_seropositive.iter())
            .map(|(&n, &k)| log_binomial_coefficient(n, k))
            .collect();

        let spec = ModelSpec {
            model_type,
            is_log_foi: options.is_log_foi,
            age_max: usize::try_from(serosurvey.age_max()).unwrap_or(usize::MAX),
            ages,
            n_sample,
            n_seropositive,
            foi_index,
            foi_prior,
            sigma_prior,
            seroreversion_prior,
            log_binomial_coefficients,
        };
        log::debug!(
            "assembled {} spec: {} observations, {} FoI blocks, age_max {}",
            spec.model_name(),
            spec.n_observations(),
            spec.n_foi_blocks(),
            spec.age_max
        );
        Ok(spec)
    }
}

/// Assemble a specification with the default hyperprior configuration.
///
/// # Errors
///
/// Returns `AssemblyError` for invalid surveys, priors, or FoI indices.
pub fn assemble_model(
    serosurvey: &Serosurvey,
    options: &FitOptions,
) -> Result<ModelSpec, AssemblyError> {
    ModelAssembler::default().assemble(serosurvey, options)
}

fn log_binomial_coefficient(n: u64, k: u64) -> f64 {
    let n = u64_to_f64(n);
    let k = u64_to_f64(k);
    ln_gamma(n + 1.0) - ln_gamma(k + 1.0) - ln_gamma(n - k + 1.0)
}

impl ModelSpec {
    #[must_use]
    pub const fn model_type(&self) -> ModelType {
        self.model_type
    }

    #[must_use]
    pub const fn is_log_foi(&self) -> bool {
        self.is_log_foi
    }

    #[must_use]
    pub const fn has_seroreversion(&self) -> bool {
        self.seroreversion_prior.is_some()
    }

    #[must_use]
    pub const fn has_sigma(&self) -> bool {
        self.sigma_prior.is_some()
    }

    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.ages.len()
    }

    #[must_use]
    pub const fn age_max(&self) -> usize {
        self.age_max
    }

    #[must_use]
    pub fn ages(&self) -> &[usize] {
        &self.ages
    }

    #[must_use]
    pub fn n_sample(&self) -> &[u64] {
        &self.n_sample
    }

    #[must_use]
    pub fn n_seropositive(&self) -> &[u64] {
        &self.n_seropositive
    }

    #[must_use]
    pub const fn foi_index(&self) -> &FoiIndexTable {
        &self.foi_index
    }

    #[must_use]
    pub fn n_foi_blocks(&self) -> usize {
        self.foi_index.n_blocks()
    }

    #[must_use]
    pub const fn foi_prior(&self) -> Prior {
        self.foi_prior
    }

    #[must_use]
    pub const fn sigma_prior(&self) -> Option<Prior> {
        self.sigma_prior
    }

    #[must_use]
    pub const fn seroreversion_prior(&self) -> Option<Prior> {
        self.seroreversion_prior
    }

    /// Identifier such as `time_log_seroreversion` or `age_no_seroreversion`.
    #[must_use]
    pub fn model_name(&self) -> String {
        format!(
            "{}{}_{}",
            self.model_type,
            if self.is_log_foi { "_log" } else { "" },
            if self.has_seroreversion() {
                "seroreversion"
            } else {
                "no_seroreversion"
            }
        )
    }

    /// Names of the sampled parameters, in draw-vector order.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names = (1..=self.n_foi_blocks())
            .map(|block| format!("foi_vector[{block}]"))
            .collect::<Vec<_>>();
        if self.has_sigma() {
            names.push("sigma_rw".to_owned());
        }
        if self.has_seroreversion() {
            names.push("seroreversion_rate".to_owned());
        }
        names
    }

    #[must_use]
    pub fn parameter_dimension(&self) -> usize {
        self.n_foi_blocks() + usize::from(self.has_sigma()) + usize::from(self.has_seroreversion())
    }

    /// Named data block in the layout an external sampler program declares.
    #[must_use]
    pub fn sampler_data(&self) -> SamplerData {
        let [foi_mean, foi_sd, foi_min, foi_max] = self.foi_prior.data_parameters();
        let sigma = self.sigma_prior.unwrap_or(Prior::None);
        let [foi_sigma_rw_loc, foi_sigma_rw_sc, _, _] = sigma.data_parameters();
        let seroreversion = self.seroreversion_prior.unwrap_or(Prior::None);
        let [seroreversion_mean, seroreversion_sd, seroreversion_min, seroreversion_max] =
            seroreversion.data_parameters();

        SamplerData {
            n_observations: self.n_observations(),
            age_max: self.age_max,
            ages: self.ages.clone(),
            n_seropositive: self.n_seropositive.clone(),
            n_sample: self.n_sample.clone(),
            foi_index: self.foi_index.indices().to_vec(),
            is_log_foi: u8::from(self.is_log_foi),
            foi_prior_index: self.foi_prior.family().selector(),
            foi_mean,
            foi_sd,
            foi_min,
            foi_max,
            foi_sigma_rw_prior_index: sigma.family().selector(),
            foi_sigma_rw_loc,
            foi_sigma_rw_sc,
            seroreversion_prior_index: seroreversion.family().selector(),
            seroreversion_mean,
            seroreversion_sd,
            seroreversion_min,
            seroreversion_max,
        }
    }

    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.sampler_data())
    }

    /// Seropositivity at each observation's age group; empty when
    /// `foi_vector` does not hold one value per FoI block.
    #[must_use]
    pub fn seropositivity(&self, foi_vector: &[f64], seroreversion_rate: f64) -> Vec<f64> {
        if foi_vector.len() != self.n_foi_blocks() {
            return Vec::new();
        }
        let grid = expand_foi_blocks(foi_vector, self.foi_index.indices());
        match self.model_type {
            ModelType::Constant | ModelType::Age => {
                let profile = seropositivity_by_age(&grid, seroreversion_rate);
                self.ages
                    .iter()
                    .map(|&age| profile_at(&profile, age))
                    .collect()
            }
            ModelType::Time => self
                .ages
                .iter()
                .map(|&age| cohort_seropositivity_time_varying(&grid, age, seroreversion_rate))
                .collect(),
        }
    }

    /// Binomial log-likelihood contribution of every observation; every
    /// entry is `-inf` when the FoI vector has the wrong length.
    #[must_use]
    pub fn pointwise_log_likelihood(&self, params: &ModelParameters) -> Vec<f64> {
        if params.foi_vector.len() != self.n_foi_blocks() {
            return vec![f64::NEG_INFINITY; self.n_observations()];
        }
        let probabilities = self.seropositivity(&params.foi_vector, params.seroreversion_or_zero());
        probabilities
            .into_iter()
            .enumerate()
            .map(|(row, probability)| {
                let p = probability.clamp(EPS_PROBABILITY, 1.0 - EPS_PROBABILITY);
                let positives = u64_to_f64(self.n_seropositive[row]);
                let negatives = u64_to_f64(self.n_sample[row]) - positives;
                self.log_binomial_coefficients[row] + positives * p.ln() + negatives * (-p).ln_1p()
            })
            .collect()
    }

    #[must_use]
    pub fn log_likelihood(&self, params: &ModelParameters) -> f64 {
        self.pointwise_log_likelihood(params).iter().sum()
    }

    /// Joint log prior. On the log scale the FoI terms are densities of log
    /// FoI; otherwise of FoI itself.
    #[must_use]
    pub fn log_prior(&self, params: &ModelParameters) -> f64 {
        if params.foi_vector.len() != self.n_foi_blocks()
            || params.foi_vector.iter().any(|foi| !(foi.is_finite() && *foi >= 0.0))
        {
            return f64::NEG_INFINITY;
        }
        let working = if self.is_log_foi {
            params.foi_vector.iter().map(|foi| foi.ln()).collect::<Vec<_>>()
        } else {
            params.foi_vector.clone()
        };

        let mut log_prior = self.foi_prior.log_density(working[0]);
        if let Some(sigma_prior) = self.sigma_prior {
            let Some(sigma) = params.sigma_rw.filter(|sigma| *sigma > 0.0) else {
                return f64::NEG_INFINITY;
            };
            log_prior += sigma_prior.log_density(sigma);
            log_prior += working
                .windows(2)
                .map(|pair| log_normal_density(pair[1], pair[0], sigma))
                .sum::<f64>();
        }
        if let Some(seroreversion_prior) = self.seroreversion_prior {
            let Some(rate) = params.seroreversion_rate.filter(|rate| *rate >= 0.0) else {
                return f64::NEG_INFINITY;
            };
            log_prior += seroreversion_prior.log_density(rate);
        }
        log_prior
    }

    #[must_use]
    pub fn log_posterior(&self, params: &ModelParameters) -> f64 {
        let log_prior = self.log_prior(params);
        if !log_prior.is_finite() {
            return f64::NEG_INFINITY;
        }
        log_prior + self.log_likelihood(params)
    }

    /// Map an unconstrained vector to natural-scale parameters. Every
    /// sampled quantity is positive, so each coordinate is a log.
    #[must_use]
    pub fn constrain(&self, unconstrained: &[f64]) -> ModelParameters {
        let natural = unconstrained.iter().map(|z| z.exp()).collect::<Vec<_>>();
        self.split_draw(&natural)
    }

    /// Split a natural-scale draw vector into named parameter blocks.
    #[must_use]
    pub fn split_draw(&self, draw: &[f64]) -> ModelParameters {
        let n_blocks = self.n_foi_blocks().min(draw.len());
        let mut tail = draw[n_blocks..].iter().copied();
        ModelParameters {
            foi_vector: draw[..n_blocks].to_vec(),
            sigma_rw: self.has_sigma().then(|| tail.next().unwrap_or(f64::NAN)),
            seroreversion_rate: self
                .has_seroreversion()
                .then(|| tail.next().unwrap_or(f64::NAN)),
        }
    }

    #[must_use]
    pub fn unconstrain(&self, params: &ModelParameters) -> Vec<f64> {
        params.to_vec().into_iter().map(f64::ln).collect()
    }

    /// Log posterior density of the unconstrained vector, including the
    /// log-Jacobian of [`ModelSpec::constrain`].
    #[must_use]
    pub fn log_density_unconstrained(&self, unconstrained: &[f64]) -> f64 {
        if unconstrained.len() != self.parameter_dimension() {
            return f64::NEG_INFINITY;
        }
        let params = self.constrain(unconstrained);
        let n_blocks = self.n_foi_blocks();
        // log-scale FoI priors are already densities of the unconstrained coordinate
        let foi_jacobian = if self.is_log_foi {
            0.0
        } else {
            unconstrained[..n_blocks].iter().sum::<f64>()
        };
        let rate_jacobian = unconstrained[n_blocks..].iter().sum::<f64>();
        let density = self.log_posterior(&params) + foi_jacobian + rate_jacobian;
        if density.is_nan() {
            f64::NEG_INFINITY
        } else {
            density
        }
    }

    /// Starting point derived from the data: a catalytic moment estimate of
    /// a constant FoI, falling back to the prior centre when the estimate
    /// lies outside the prior support.
    #[must_use]
    pub fn initial_parameters(&self) -> ModelParameters {
        let total_sample = self.n_sample.iter().copied().map(u64_to_f64).sum::<f64>();
        let total_positive = self.n_seropositive.iter().copied().map(u64_to_f64).sum::<f64>();
        let mean_age = self
            .ages
            .iter()
            .zip(self.n_sample.iter())
            .map(|(&age, &n)| usize_to_f64(age) * u64_to_f64(n))
            .sum::<f64>()
            / total_sample.max(1.0);
        let prevalence = (total_positive / total_sample.max(1.0)).clamp(1.0e-3, 0.999);
        let estimate = (-(-prevalence).ln_1p() / mean_age.max(1.0)).clamp(1.0e-4, 1.0);

        let working_estimate = if self.is_log_foi {
            estimate.ln()
        } else {
            estimate
        };
        let working = if self.foi_prior.log_density(working_estimate).is_finite() {
            working_estimate
        } else {
            self.foi_prior.center().unwrap_or(working_estimate)
        };
        let foi = if self.is_log_foi {
            working.exp()
        } else {
            working.max(MIN_INITIAL_RATE)
        };

        ModelParameters {
            foi_vector: vec![foi; self.n_foi_blocks()],
            sigma_rw: self.has_sigma().then_some(if self.is_log_foi {
                LOG_SIGMA_INIT
            } else {
                LINEAR_SIGMA_INIT
            }),
            seroreversion_rate: self.seroreversion_prior.map(|prior| {
                if prior.log_density(SEROREVERSION_INIT).is_finite() {
                    SEROREVERSION_INIT
                } else {
                    prior
                        .center()
                        .unwrap_or(MIN_INITIAL_RATE)
                        .max(MIN_INITIAL_RATE)
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::SurveyRow;
    use approx::assert_relative_eq;

    fn survey() -> Serosurvey {
        Serosurvey::new(vec![
            SurveyRow::new(1, 9, 100, 10).with_survey_year(2020),
            SurveyRow::new(10, 19, 100, 25).with_survey_year(2020),
            SurveyRow::new(20, 29, 100, 40).with_survey_year(2020),
        ])
        .expect("valid survey")
    }

    #[test]
    fn constant_model_uses_a_single_block() {
        let spec = assemble_model(&survey(), &FitOptions::new(ModelType::Constant))
            .expect("assembly succeeds");
        assert_eq!(spec.n_foi_blocks(), 1);
        assert!(spec.foi_index().indices().iter().all(|&index| index == 1));
        assert!(!spec.has_sigma());
        assert_eq!(spec.ages(), &[5, 14, 24]);
        assert_eq!(spec.age_max(), 29);
        assert_eq!(spec.model_name(), "constant_no_seroreversion");
    }

    #[test]
    fn time_model_defaults_to_yearly_blocks() {
        let spec = assemble_model(&survey(), &FitOptions::new(ModelType::Time))
            .expect("assembly succeeds");
        assert_eq!(spec.n_foi_blocks(), 29);
        assert!(spec.has_sigma());
        assert_eq!(spec.sigma_prior(), Some(DEFAULT_LINEAR_SIGMA_PRIOR));
        assert_eq!(spec.parameter_dimension(), 30);
    }

    #[test]
    fn log_scale_uses_normal_hyperprior() {
        let options = FitOptions::new(ModelType::Time)
            .with_log_foi(true)
            .with_foi_prior(Prior::normal(-3.0, 1.0));
        let spec = assemble_model(&survey(), &options).expect("assembly succeeds");
        assert_eq!(spec.sigma_prior(), Some(DEFAULT_LOG_SIGMA_PRIOR));
        assert_eq!(spec.model_name(), "time_log_no_seroreversion");
    }

    #[test]
    fn log_scale_is_rejected_for_constant_model() {
        let options = FitOptions::new(ModelType::Constant).with_log_foi(true);
        assert_eq!(
            assemble_model(&survey(), &options),
            Err(AssemblyError::LogScaleUnsupported {
                model_type: ModelType::Constant
            })
        );
    }

    #[test]
    fn seroreversion_requires_prior() {
        let mut options = FitOptions::new(ModelType::Age);
        options.is_seroreversion = true;
        assert_eq!(
            assemble_model(&survey(), &options),
            Err(AssemblyError::InvalidPrior(PriorError::Missing {
                site: PriorSite::Seroreversion
            }))
        );
    }

    fn rejected_site(options: &FitOptions) -> PriorSite {
        match assemble_model(&survey(), options) {
            Err(AssemblyError::InvalidPrior(PriorError::Invalid { site, .. })) => site,
            other => panic!("expected an invalid prior, got {other:?}"),
        }
    }

    #[test]
    fn foi_prior_rejects_cauchy_and_none() {
        for prior in [Prior::cauchy(0.0, 1.0), Prior::None] {
            let options = FitOptions::new(ModelType::Age).with_foi_prior(prior);
            assert_eq!(rejected_site(&options), PriorSite::Foi);
        }
    }

    #[test]
    fn seroreversion_prior_rejects_cauchy_and_none() {
        for prior in [Prior::cauchy(0.0, 1.0), Prior::None] {
            let options = FitOptions::new(ModelType::Constant).with_seroreversion(prior);
            assert_eq!(rejected_site(&options), PriorSite::Seroreversion);
        }
    }

    #[test]
    fn log_scale_defaults_to_log_foi_prior() {
        let options = FitOptions::new(ModelType::Time).with_log_foi(true);
        let spec = assemble_model(&survey(), &options).expect("assembly succeeds");
        assert_eq!(spec.foi_prior(), DEFAULT_LOG_FOI_PRIOR);

        let init = spec.initial_parameters();
        assert!(init.foi_vector.iter().all(|foi| *foi > 0.0 && *foi < 1.0));
        let realistic = ModelParameters {
            foi_vector: vec![0.02; spec.n_foi_blocks()],
            ..init
        };
        assert!(spec.log_posterior(&realistic).is_finite());

        let linear = assemble_model(&survey(), &FitOptions::new(ModelType::Time))
            .expect("assembly succeeds");
        assert_eq!(linear.foi_prior(), DEFAULT_FOI_PRIOR);
    }

    #[test]
    fn explicit_foi_prior_overrides_scale_default() {
        let options = FitOptions::new(ModelType::Age)
            .with_foi_prior(Prior::normal(-2.0, 0.5))
            .with_log_foi(true);
        let spec = assemble_model(&survey(), &options).expect("assembly succeeds");
        assert_eq!(spec.foi_prior(), Prior::normal(-2.0, 0.5));
    }

    #[test]
    fn short_foi_vector_yields_no_likelihood() {
        let spec = assemble_model(&survey(), &FitOptions::new(ModelType::Age))
            .expect("assembly succeeds");
        let params = ModelParameters {
            foi_vector: vec![0.05; 3],
            sigma_rw: Some(0.1),
            seroreversion_rate: None,
        };
        assert!(spec.seropositivity(&params.foi_vector, 0.0).is_empty());
        let pointwise = spec.pointwise_log_likelihood(&params);
        assert_eq!(pointwise.len(), spec.n_observations());
        assert!(pointwise.iter().all(|value| value.is_infinite() && *value < 0.0));
        assert!(spec.log_posterior(&params).is_infinite());
    }

    #[test]
    fn explicit_index_is_validated() {
        let index = FoiIndexTable::new(IndexAxis::Age, (1..=10).collect(), vec![1; 10])
            .expect("well-formed table");
        let options = FitOptions::new(ModelType::Age).with_foi_index(index);
        let err = assemble_model(&survey(), &options).expect_err("length mismatch");
        assert!(matches!(
            err,
            AssemblyError::InvalidInput(ValidationError::FoiIndexLength { .. })
        ));
    }

    #[test]
    fn explicit_index_axis_must_match_model() {
        let index = FoiIndexTable::new(IndexAxis::Year, (1991..=2019).collect(), vec![1; 29])
            .expect("well-formed table");
        let options = FitOptions::new(ModelType::Age).with_foi_index(index);
        assert!(matches!(
            assemble_model(&survey(), &options),
            Err(AssemblyError::IndexAxisMismatch { .. })
        ));
    }

    #[test]
    fn assembler_config_enforces_hyperprior_families() {
        let config = AssemblerConfig {
            linear_sigma_prior: Prior::normal(0.0, 1.0),
            ..AssemblerConfig::default()
        };
        assert!(ModelAssembler::new(config).is_err());
        assert!(ModelAssembler::new(AssemblerConfig::default()).is_ok());
    }

    #[test]
    fn sampler_data_encodes_priors_and_flags() {
        let options = FitOptions::new(ModelType::Age)
            .with_foi_prior(Prior::normal(0.1, 0.05))
            .with_seroreversion(Prior::uniform(0.0, 1.0));
        let spec = assemble_model(&survey(), &options).expect("assembly succeeds");
        let data = spec.sampler_data();
        assert_eq!(data.n_observations, 3);
        assert_eq!(data.foi_index.len(), 29);
        assert_eq!(data.foi_prior_index, 2);
        assert_relative_eq!(data.foi_sd, 0.05);
        assert_eq!(data.foi_sigma_rw_prior_index, 3);
        assert_eq!(data.seroreversion_prior_index, 1);
        assert_relative_eq!(data.seroreversion_max, 1.0);
        assert_eq!(data.is_log_foi, 0);

        let json = spec.to_json().expect("serializes");
        assert!(json.contains("\"foi_index\""));
        assert!(json.contains("\"seroreversion_prior_index\":1"));
    }

    #[test]
    fn log_posterior_is_finite_at_initial_point() {
        for model in [ModelType::Constant, ModelType::Age, ModelType::Time] {
            let options = FitOptions::new(model).with_seroreversion(Prior::uniform(0.0, 2.0));
            let spec = assemble_model(&survey(), &options).expect("assembly succeeds");
            let init = spec.initial_parameters();
            assert!(spec.log_posterior(&init).is_finite());
            let z = spec.unconstrain(&init);
            assert_eq!(z.len(), spec.parameter_dimension());
            assert!(spec.log_density_unconstrained(&z).is_finite());
            let back = spec.constrain(&z);
            for (left, right) in back.to_vec().iter().zip(init.to_vec().iter()) {
                assert_relative_eq!(*left, *right, max_relative = 1.0e-12);
            }
        }
    }

    #[test]
    fn likelihood_prefers_the_generating_foi() {
        let spec = assemble_model(&survey(), &FitOptions::new(ModelType::Constant))
            .expect("assembly succeeds");
        let near = ModelParameters {
            foi_vector: vec![0.02],
            sigma_rw: None,
            seroreversion_rate: None,
        };
        let far = ModelParameters {
            foi_vector: vec![0.5],
            ..near.clone()
        };
        assert!(spec.log_likelihood(&near) > spec.log_likelihood(&far));
    }

    #[test]
    fn negative_parameters_have_zero_prior_mass() {
        let spec = assemble_model(&survey(), &FitOptions::new(ModelType::Constant))
            .expect("assembly succeeds");
        let params = ModelParameters {
            foi_vector: vec![-0.1],
            sigma_rw: None,
            seroreversion_rate: None,
        };
        assert!(spec.log_posterior(&params).is_infinite());
    }
}
