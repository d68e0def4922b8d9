//! Sampler boundary and the built-in random-walk Metropolis sampler.
//!
//! Fitting never depends on a particular inference engine: anything that
//! turns a [`ModelSpec`] into [`Draws`] can be passed to
//! [`fit`](super::fit::fit). [`MetropolisSampler`] is the in-process default.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use thiserror::Error;

use crate::inference::{InferenceError, McmcConfig, ProposalStats, ProposalTuning};

use super::posterior::{Draws, PosteriorChain};
use super::spec::ModelSpec;

const INITIAL_JITTER: f64 = 0.1;

/// Errors raised while drawing from the posterior.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplerError {
    #[error(transparent)]
    InvalidConfig(#[from] InferenceError),
    #[error("initial point has non-finite log posterior ({value})")]
    NonFiniteInitialPosterior { value: f64 },
    #[error("sampler exceeded its {limit:?} budget after {completed} iterations")]
    TimedOut { limit: Duration, completed: usize },
    #[error("draws have {found} values per draw but the model has {expected} parameters")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("sampler backend failed: {0}")]
    Backend(String),
}

/// Produces posterior draws for an assembled model.
///
/// Draws must be on the natural scale, in the order given by
/// [`ModelSpec::parameter_names`].
pub trait Sampler {
    /// # Errors
    ///
    /// Returns `SamplerError` if sampling cannot complete.
    fn sample(&self, spec: &ModelSpec) -> Result<Draws, SamplerError>;
}

/// Adaptive component-wise random-walk Metropolis on the log scale of every
/// parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetropolisSampler {
    config: McmcConfig,
    tuning: ProposalTuning,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl MetropolisSampler {
    /// # Errors
    ///
    /// Returns `SamplerError::InvalidConfig` if the schedule or tuning is
    /// invalid.
    pub fn new(config: McmcConfig, tuning: ProposalTuning) -> Result<Self, SamplerError> {
        config.validate()?;
        if !tuning.is_valid() {
            return Err(InferenceError::InvalidProposalTuning.into());
        }
        Ok(Self { config, tuning })
    }

    /// # Errors
    ///
    /// Returns `SamplerError::InvalidConfig` if the schedule is invalid.
    pub fn with_config(config: McmcConfig) -> Result<Self, SamplerError> {
        Self::new(config, ProposalTuning::default())
    }

    #[must_use]
    pub const fn config(&self) -> McmcConfig {
        self.config
    }

    #[must_use]
    pub const fn tuning(&self) -> ProposalTuning {
        self.tuning
    }

    fn run_chain(
        &self,
        spec: &ModelSpec,
        chain: usize,
        initial: &[f64],
        deadline: Option<Deadline>,
    ) -> Result<PosteriorChain, SamplerError> {
        let config = self.config;
        let tuning = self.tuning;
        let mut rng = StdRng::seed_from_u64(config.chain_seed(chain));

        let mut state = initial
            .iter()
            .map(|value| INITIAL_JITTER.mul_add(sample_standard_normal(&mut rng), *value))
            .collect::<Vec<_>>();
        let mut current = spec.log_density_unconstrained(&state);
        if !current.is_finite() {
            state = initial.to_vec();
            current = spec.log_density_unconstrained(&state);
        }

        let dim = state.len();
        let mut scales = vec![tuning.initial_draw_scale; dim];
        let mut window = vec![ProposalStats::default(); dim];
        let mut overall = ProposalStats::default();
        let mut draws = Vec::with_capacity(config.retained_draws());

        for iter in 0..config.iterations {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline.at
            {
                log::warn!("chain {chain} timed out after {iter} iterations");
                return Err(SamplerError::TimedOut {
                    limit: deadline.limit,
                    completed: iter,
                });
            }

            for coordinate in 0..dim {
                let previous = state[coordinate];
                state[coordinate] =
                    scales[coordinate].mul_add(sample_standard_normal(&mut rng), previous);
                let candidate = spec.log_density_unconstrained(&state);
                let accepted =
                    candidate.is_finite() && should_accept(candidate - current, &mut rng);
                if accepted {
                    current = candidate;
                } else {
                    state[coordinate] = previous;
                }
                window[coordinate].record(accepted);
                overall.record(accepted);
            }

            if config.adapt_during_burn_in
                && iter < config.burn_in
                && (iter + 1).is_multiple_of(tuning.adaptation_interval)
            {
                for (scale, stats) in scales.iter_mut().zip(window.iter_mut()) {
                    *scale = tuning.adapt(*scale, stats.acceptance_rate());
                    *stats = ProposalStats::default();
                }
            }

            if iter >= config.burn_in && (iter - config.burn_in).is_multiple_of(config.thin) {
                draws.push(spec.constrain(&state).to_vec());
            }
        }

        log::debug!(
            "chain {chain}: {} draws retained, acceptance rate {:.3}",
            draws.len(),
            overall.acceptance_rate()
        );
        Ok(PosteriorChain {
            draws,
            acceptance_rate: overall.acceptance_rate(),
        })
    }
}

impl Sampler for MetropolisSampler {
    fn sample(&self, spec: &ModelSpec) -> Result<Draws, SamplerError> {
        let deadline = self.config.max_duration.and_then(|limit| {
            Instant::now()
                .checked_add(limit)
                .map(|at| Deadline { at, limit })
        });

        let initial = spec.unconstrain(&spec.initial_parameters());
        let value = spec.log_density_unconstrained(&initial);
        if !value.is_finite() {
            return Err(SamplerError::NonFiniteInitialPosterior { value });
        }

        log::debug!(
            "sampling {} with {} chains of {} iterations",
            spec.model_name(),
            self.config.chains,
            self.config.iterations
        );
        let chains = (0..self.config.chains)
            .into_par_iter()
            .map(|chain| self.run_chain(spec, chain, &initial, deadline))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Draws::new(spec.parameter_names(), chains))
    }
}

fn should_accept(log_acceptance: f64, rng: &mut StdRng) -> bool {
    log_acceptance >= 0.0 || rng.random::<f64>().ln() < log_acceptance
}

fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    StandardNormal.sample(rng)
}
