//! MCMC convergence diagnostics and predictive accuracy.

use thiserror::Error;

use crate::utils::{log_sum_exp, mean, sample_variance, usize_to_f64};

use super::posterior::Draws;

/// Errors for diagnostic summaries.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("posterior has no draws")]
    EmptyPosterior,
    #[error("need at least {minimum} draws per chain, found {found}")]
    InsufficientChainDraws { minimum: usize, found: usize },
    #[error("posterior draws have inconsistent dimensions")]
    InconsistentPosteriorDimensions,
}

/// Split-R-hat and effective sample size per parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceSummary {
    pub chain_count: usize,
    pub draws_per_chain_used: usize,
    pub split_rhat: Vec<f64>,
    pub effective_sample_size: Vec<f64>,
    pub max_split_rhat: Option<f64>,
}

impl ConvergenceSummary {
    /// Whether every split-R-hat is below `threshold`.
    #[must_use]
    pub fn is_converged(&self, threshold: f64) -> bool {
        self.max_split_rhat.is_some_and(|rhat| rhat < threshold)
    }
}

/// Expected log pointwise predictive density estimated by WAIC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElpdEstimate {
    pub elpd: f64,
    pub se: f64,
    /// Effective number of parameters.
    pub p_waic: f64,
    pub pointwise: Vec<f64>,
}

/// Lag-`k` autocorrelation for a scalar chain; zero for constant chains
/// or lags beyond the chain.
#[must_use]
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if lag >= series.len() {
        return 0.0;
    }
    let centre = mean(series);
    let deviations = series.iter().map(|value| value - centre).collect::<Vec<_>>();
    let total = deviations.iter().map(|value| value * value).sum::<f64>();
    if total <= 0.0 {
        return 0.0;
    }
    deviations
        .iter()
        .zip(&deviations[lag..])
        .map(|(left, right)| left * right)
        .sum::<f64>()
        / total
}

/// Effective sample size of one chain from Geyer's initial positive
/// sequence: autocorrelations are summed in adjacent pairs until a pair
/// turns non-positive. Never exceeds the chain length.
#[must_use]
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 4 {
        return usize_to_f64(n);
    }

    let mut integrated_time = -1.0;
    for lag in (0..n - 1).step_by(2) {
        let pair = autocorrelation(series, lag) + autocorrelation(series, lag + 1);
        if pair <= 0.0 {
            break;
        }
        integrated_time += 2.0 * pair;
    }
    usize_to_f64(n) / integrated_time.max(1.0)
}

/// Split-R-hat and ESS for every parameter.
///
/// Chains are truncated to the same minimum even draw count and each is
/// split in half, so a single chain still yields a diagnostic. ESS is
/// summed over chains.
///
/// # Errors
///
/// Returns `DiagnosticsError` if chains are empty, too short, or have
/// mismatched dimensions.
pub fn summarize_convergence(draws: &Draws) -> Result<ConvergenceSummary, DiagnosticsError> {
    if draws.chains.is_empty() {
        return Err(DiagnosticsError::EmptyPosterior);
    }
    if !draws.has_consistent_dimensions() {
        return Err(DiagnosticsError::InconsistentPosteriorDimensions);
    }

    let min_draws = draws
        .chains
        .iter()
        .map(|chain| chain.len())
        .min()
        .unwrap_or(0);
    let draws_per_chain_used = min_draws - (min_draws % 2);
    if draws_per_chain_used < 4 {
        return Err(DiagnosticsError::InsufficientChainDraws {
            minimum: 4,
            found: draws_per_chain_used,
        });
    }

    let half = draws_per_chain_used / 2;
    let mut split_rhat = Vec::with_capacity(draws.n_parameters());
    let mut ess = Vec::with_capacity(draws.n_parameters());
    for parameter in 0..draws.n_parameters() {
        let traces = draws
            .chains
            .iter()
            .map(|chain| {
                chain
                    .draws
                    .iter()
                    .take(draws_per_chain_used)
                    .map(|draw| draw[parameter])
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let split_chains = traces
            .iter()
            .flat_map(|trace| [trace[..half].to_vec(), trace[half..].to_vec()])
            .collect::<Vec<_>>();
        split_rhat.push(split_rhat_scalar(&split_chains));
        ess.push(traces.iter().map(|trace| effective_sample_size(trace)).sum());
    }

    let max_split_rhat = split_rhat.iter().copied().max_by(f64::total_cmp);

    Ok(ConvergenceSummary {
        chain_count: draws.n_chains(),
        draws_per_chain_used,
        split_rhat,
        effective_sample_size: ess,
        max_split_rhat,
    })
}

/// Potential scale reduction over equal-length chains; constant chains
/// report `1`.
#[must_use]
pub fn split_rhat_scalar(chains: &[Vec<f64>]) -> f64 {
    let n = chains.first().map_or(0, Vec::len);
    if chains.len() < 2 || n < 2 || chains.iter().any(|chain| chain.len() != n) {
        return f64::NAN;
    }

    let n_f64 = usize_to_f64(n);
    let chain_means = chains.iter().map(|chain| mean(chain)).collect::<Vec<_>>();
    let within = mean(
        &chains
            .iter()
            .map(|chain| sample_variance(chain))
            .collect::<Vec<_>>(),
    );
    let between = n_f64 * sample_variance(&chain_means);
    if !(within.is_finite() && within > 0.0 && between.is_finite()) {
        return 1.0;
    }

    let pooled = ((n_f64 - 1.0) / n_f64).mul_add(within, between / n_f64);
    (pooled / within).sqrt().max(1.0)
}

/// WAIC estimate of elpd from a draws-by-observations log-likelihood matrix.
///
/// # Errors
///
/// Returns `DiagnosticsError` if the matrix is empty or ragged.
pub fn waic(log_likelihood: &[Vec<f64>]) -> Result<ElpdEstimate, DiagnosticsError> {
    let n_draws = log_likelihood.len();
    let n_obs = log_likelihood.first().map_or(0, Vec::len);
    if n_draws == 0 || n_obs == 0 {
        return Err(DiagnosticsError::EmptyPosterior);
    }
    if log_likelihood.iter().any(|row| row.len() != n_obs) {
        return Err(DiagnosticsError::InconsistentPosteriorDimensions);
    }

    let log_draws = usize_to_f64(n_draws).ln();
    let mut p_waic = 0.0;
    let pointwise = (0..n_obs)
        .map(|obs| {
            let column = log_likelihood.iter().map(|row| row[obs]).collect::<Vec<_>>();
            let lppd = log_sum_exp(&column) - log_draws;
            let penalty = sample_variance(&column);
            p_waic += penalty;
            lppd - penalty
        })
        .collect::<Vec<_>>();

    let elpd = pointwise.iter().sum::<f64>();
    let se = (usize_to_f64(n_obs) * sample_variance(&pointwise)).sqrt();

    Ok(ElpdEstimate {
        elpd,
        se,
        p_waic,
        pointwise,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::posterior::PosteriorChain;
    use approx::assert_relative_eq;

    fn chain(values: &[f64]) -> PosteriorChain {
        PosteriorChain {
            draws: values.iter().map(|value| vec![*value]).collect(),
            acceptance_rate: 0.3,
        }
    }

    #[test]
    fn autocorrelation_is_zero_for_invalid_lag() {
        let values = [1.0, 2.0, 3.0];
        assert!((autocorrelation(&values, 3) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ess_bounded_by_chain_length() {
        let values = [1.0, 1.5, 2.0, 2.5, 3.0];
        let ess = effective_sample_size(&values);
        assert!(ess <= 5.0);
        assert!(ess > 0.0);
    }

    #[test]
    fn ess_of_alternating_draws_is_capped_at_chain_length() {
        let values = (0..200)
            .map(|idx| {
                let sign = if idx % 2 == 0 { 1.0 } else { -1.0 };
                sign * f64::from(idx % 7)
            })
            .collect::<Vec<_>>();
        let ess = effective_sample_size(&values);
        assert_relative_eq!(ess, 200.0);
    }

    #[test]
    fn ess_shrinks_for_sticky_chains() {
        let sticky = (0..200).map(|idx| f64::from(idx / 20)).collect::<Vec<_>>();
        assert!(effective_sample_size(&sticky) < 20.0);
    }

    #[test]
    fn convergence_requires_enough_draws() {
        let draws = Draws::new(vec!["x".to_owned()], vec![chain(&[0.1, 0.2, 0.3])]);
        assert_eq!(
            summarize_convergence(&draws),
            Err(DiagnosticsError::InsufficientChainDraws {
                minimum: 4,
                found: 2
            })
        );
    }

    #[test]
    fn mixed_chains_have_rhat_near_one() {
        let a = [0.1, -0.2, 0.3, -0.1, 0.2, -0.3, 0.0, 0.1];
        let b = [-0.1, 0.2, -0.3, 0.1, -0.2, 0.3, 0.1, 0.0];
        let draws = Draws::new(vec!["x".to_owned()], vec![chain(&a), chain(&b)]);
        let summary = summarize_convergence(&draws).expect("summary should work");
        assert_eq!(summary.chain_count, 2);
        assert_eq!(summary.draws_per_chain_used, 8);
        assert!(summary.is_converged(1.1));
        assert!(summary.effective_sample_size[0] > 0.0);
    }

    #[test]
    fn separated_chains_are_flagged() {
        let a = [0.0, 0.01, 0.02, 0.0, 0.01, 0.02];
        let b = [5.0, 5.01, 5.02, 5.0, 5.01, 5.02];
        let draws = Draws::new(vec!["x".to_owned()], vec![chain(&a), chain(&b)]);
        let summary = summarize_convergence(&draws).expect("summary should work");
        assert!(!summary.is_converged(1.1));
    }

    #[test]
    fn waic_of_identical_draws_has_no_penalty() {
        let row = vec![-1.0, -2.0, -0.5];
        let matrix = vec![row.clone(), row.clone(), row];
        let estimate = waic(&matrix).expect("waic should work");
        assert_relative_eq!(estimate.p_waic, 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(estimate.elpd, -3.5, epsilon = 1.0e-12);
        let mean = -3.5 / 3.0;
        let variance = [-1.0f64, -2.0, -0.5]
            .iter()
            .map(|value| (value - mean) * (value - mean))
            .sum::<f64>()
            / 2.0;
        assert_relative_eq!(estimate.se, (3.0 * variance).sqrt(), epsilon = 1.0e-12);
    }

    #[test]
    fn waic_rejects_ragged_matrix() {
        let matrix = vec![vec![-1.0, -2.0], vec![-1.0]];
        assert_eq!(
            waic(&matrix),
            Err(DiagnosticsError::InconsistentPosteriorDimensions)
        );
    }
}
