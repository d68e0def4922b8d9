//! Reusable inference and MCMC utility types.

use std::time::Duration;

use thiserror::Error;

use crate::utils::usize_to_f64;

/// Errors for generic MCMC configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    #[error("iterations must be positive")]
    InvalidIterations,
    #[error("burn-in ({burn_in}) must be smaller than iterations ({iterations})")]
    InvalidBurnIn { burn_in: usize, iterations: usize },
    #[error("thinning interval must be positive")]
    InvalidThinning,
    #[error("at least one chain is required")]
    InvalidChainCount,
    #[error("seed stride must be positive")]
    InvalidSeedStride,
    #[error("timeout must be positive when set")]
    InvalidTimeout,
    #[error("proposal tuning settings are invalid")]
    InvalidProposalTuning,
}

/// Generic MCMC schedule.
#[derive(Debug, Clone, Copy)]
pub struct McmcConfig {
    pub iterations: usize,
    pub burn_in: usize,
    pub thin: usize,
    /// Number of independent chains.
    pub chains: usize,
    pub seed: u64,
    /// Chain `i` uses `seed + i * seed_stride` with wrapping addition.
    pub seed_stride: u64,
    pub adapt_during_burn_in: bool,
    /// Wall-clock budget for the whole sampler call.
    pub max_duration: Option<Duration>,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            iterations: 4_000,
            burn_in: 1_000,
            thin: 4,
            chains: 4,
            seed: 42,
            seed_stride: 10_000,
            adapt_during_burn_in: true,
            max_duration: None,
        }
    }
}

impl McmcConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub fn validate(self) -> Result<(), InferenceError> {
        if self.iterations == 0 {
            return Err(InferenceError::InvalidIterations);
        }
        if self.burn_in >= self.iterations {
            return Err(InferenceError::InvalidBurnIn {
                burn_in: self.burn_in,
                iterations: self.iterations,
            });
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidThinning);
        }
        if self.chains == 0 {
            return Err(InferenceError::InvalidChainCount);
        }
        if self.chains > 1 && self.seed_stride == 0 {
            return Err(InferenceError::InvalidSeedStride);
        }
        if self.max_duration.is_some_and(|duration| duration.is_zero()) {
            return Err(InferenceError::InvalidTimeout);
        }
        Ok(())
    }

    /// Number of retained draws per chain implied by this configuration.
    #[must_use]
    pub const fn retained_draws(self) -> usize {
        (self.iterations - self.burn_in).div_ceil(self.thin)
    }

    /// Seed of chain `chain`.
    #[must_use]
    pub fn chain_seed(self, chain: usize) -> u64 {
        let index_u64 = u64::try_from(chain).unwrap_or(u64::MAX);
        self.seed
            .wrapping_add(index_u64.saturating_mul(self.seed_stride))
    }
}

/// Random-walk proposal adaptation settings.
#[derive(Debug, Clone, Copy)]
pub struct ProposalTuning {
    /// Initial random-walk scale on the unconstrained scale.
    pub initial_draw_scale: f64,
    /// Minimum allowed proposal scale.
    pub min_draw_scale: f64,
    /// Adapt every `adaptation_interval` iterations during burn-in.
    pub adaptation_interval: usize,
    pub acceptance_target_low: f64,
    pub acceptance_target_high: f64,
    /// Multiplicative scale decrease when acceptance is below target.
    pub scale_decrease_factor: f64,
    /// Multiplicative scale increase when acceptance is above target.
    pub scale_increase_factor: f64,
}

impl Default for ProposalTuning {
    fn default() -> Self {
        Self {
            initial_draw_scale: 0.1,
            min_draw_scale: 1.0e-3,
            adaptation_interval: 50,
            acceptance_target_low: 0.2,
            acceptance_target_high: 0.35,
            scale_decrease_factor: 0.9,
            scale_increase_factor: 1.1,
        }
    }
}

impl ProposalTuning {
    /// Whether proposal tuning settings are numerically valid.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.initial_draw_scale > 0.0
            && self.min_draw_scale > 0.0
            && self.adaptation_interval > 0
            && self.acceptance_target_low >= 0.0
            && self.acceptance_target_high <= 1.0
            && self.acceptance_target_low < self.acceptance_target_high
            && self.scale_decrease_factor > 0.0
            && self.scale_increase_factor > 0.0
    }

    /// Rescale `scale` toward the acceptance window.
    #[must_use]
    pub fn adapt(self, scale: f64, acceptance: f64) -> f64 {
        let factor = if acceptance < self.acceptance_target_low {
            self.scale_decrease_factor
        } else if acceptance > self.acceptance_target_high {
            self.scale_increase_factor
        } else {
            1.0
        };
        (scale * factor).max(self.min_draw_scale)
    }
}

/// Proposal counters for a single Metropolis-Hastings block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalStats {
    pub proposed: usize,
    pub accepted: usize,
}

impl ProposalStats {
    /// Record one proposal and whether it was accepted.
    pub const fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Acceptance rate in `[0, 1]`, or `0` if no proposals were made.
    #[must_use]
    pub fn acceptance_rate(self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            usize_to_f64(self.accepted) / usize_to_f64(self.proposed)
        }
    }
}
