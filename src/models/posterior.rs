//! Posterior storage and summaries.

use crate::utils::{mean, quantile, sample_variance};

/// Retained draws of one chain, each a natural-scale parameter vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosteriorChain {
    pub draws: Vec<Vec<f64>>,
    /// Mean acceptance rate over all coordinate updates.
    pub acceptance_rate: f64,
}

impl PosteriorChain {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.draws.len()
    }

    /// Trace of one parameter.
    #[must_use]
    pub fn values(&self, parameter: usize) -> Vec<f64> {
        self.draws.iter().map(|draw| draw[parameter]).collect()
    }
}

/// Draws returned by a sampler, grouped by chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draws {
    pub parameter_names: Vec<String>,
    pub chains: Vec<PosteriorChain>,
}

impl Draws {
    #[must_use]
    pub fn new(parameter_names: Vec<String>, chains: Vec<PosteriorChain>) -> Self {
        Self {
            parameter_names,
            chains,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.iter().all(PosteriorChain::is_empty)
    }

    /// Total draws across chains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.iter().map(PosteriorChain::len).sum()
    }

    #[must_use]
    pub const fn n_chains(&self) -> usize {
        self.chains.len()
    }

    #[must_use]
    pub fn n_parameters(&self) -> usize {
        self.parameter_names.len()
    }

    #[must_use]
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|candidate| candidate == name)
    }

    /// All draws, chain after chain.
    pub fn pooled(&self) -> impl Iterator<Item = &[f64]> {
        self.chains
            .iter()
            .flat_map(|chain| chain.draws.iter().map(Vec::as_slice))
    }

    /// Pooled trace of one parameter.
    #[must_use]
    pub fn values(&self, parameter: usize) -> Vec<f64> {
        self.pooled().map(|draw| draw[parameter]).collect()
    }

    /// Whether every draw has one value per named parameter.
    #[must_use]
    pub fn has_consistent_dimensions(&self) -> bool {
        let n = self.n_parameters();
        self.pooled().all(|draw| draw.len() == n)
    }
}

/// Scalar posterior summary statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub q025: f64,
    pub q50: f64,
    pub q975: f64,
}

/// Per-parameter summaries in draw-vector order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PosteriorSummary {
    pub parameter_names: Vec<String>,
    pub parameters: Vec<ParameterSummary>,
    pub draw_count: usize,
}

impl PosteriorSummary {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ParameterSummary> {
        self.parameter_names
            .iter()
            .position(|candidate| candidate == name)
            .map(|index| self.parameters[index])
    }
}

/// Compute posterior summaries for every parameter from pooled draws.
#[must_use]
pub fn summarize_posterior(draws: &Draws) -> PosteriorSummary {
    let draw_count = draws.len();
    if draw_count == 0 {
        return PosteriorSummary {
            parameter_names: draws.parameter_names.clone(),
            draw_count,
            ..PosteriorSummary::default()
        };
    }

    let parameters = (0..draws.n_parameters())
        .map(|index| summarize_scalar(&draws.values(index)))
        .collect();

    PosteriorSummary {
        parameter_names: draws.parameter_names.clone(),
        parameters,
        draw_count,
    }
}

/// Mean, standard deviation and central 95% interval of `values`.
#[must_use]
pub fn summarize_scalar(values: &[f64]) -> ParameterSummary {
    if values.is_empty() {
        return ParameterSummary::default();
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    ParameterSummary {
        mean: mean(values),
        std_dev: sample_variance(values).sqrt(),
        q025: quantile(&sorted, 0.025),
        q50: quantile(&sorted, 0.5),
        q975: quantile(&sorted, 0.975),
    }
}
