//! Exact seropositivity for piecewise-constant serocatalytic models.
//!
//! Within each unit interval the FoI `λ` and seroreversion rate `μ` are
//! constant, so the two-state catalytic ODE has the closed-form step
//!
//! ```text
//! P_j = e_j + exp(-(λ_j + μ)) (P_{j-1} - e_j),    e_j = λ_j / (λ_j + μ)
//! ```
//!
//! starting from `P_0 = 0` at birth. The same recursion serves as the
//! likelihood link when fitting and as ground truth when simulating.

/// One unit-interval update of the seropositive fraction.
///
/// With `μ = 0` the step reduces to `1 - (1 - P) exp(-λ)`; with both rates
/// zero the fraction is unchanged.
#[must_use]
pub fn seropositivity_step(previous: f64, foi: f64, seroreversion_rate: f64) -> f64 {
    let total = foi + seroreversion_rate;
    let next = if seroreversion_rate == 0.0 {
        if foi == 0.0 {
            previous
        } else {
            1.0 - (1.0 - previous) * (-foi).exp()
        }
    } else {
        let equilibrium = foi / total;
        (-total).exp().mul_add(previous - equilibrium, equilibrium)
    };
    next.clamp(0.0, 1.0)
}

/// Seropositivity of a cohort after experiencing `step_fois` in order,
/// one value per elapsed unit interval since birth.
#[must_use]
pub fn cohort_seropositivity<I>(step_fois: I, seroreversion_rate: f64) -> f64
where
    I: IntoIterator<Item = f64>,
{
    step_fois.into_iter().fold(0.0, |probability, foi| {
        seropositivity_step(probability, foi, seroreversion_rate)
    })
}

/// Age profile under an age-varying FoI.
///
/// `fois[k]` is the FoI experienced between ages `k` and `k + 1`; the
/// result holds seropositivity at ages `1..=fois.len()`.
#[must_use]
pub fn seropositivity_by_age(fois: &[f64], seroreversion_rate: f64) -> Vec<f64> {
    fois.iter()
        .scan(0.0, |probability, &foi| {
            *probability = seropositivity_step(*probability, foi, seroreversion_rate);
            Some(*probability)
        })
        .collect()
}

/// Age profile under a time-varying FoI.
///
/// `fois` is chronological, one value per calendar year up to the year
/// before the survey. A cohort of age `a` has lived through the last `a`
/// years of the grid; the result holds seropositivity at ages
/// `1..=fois.len()`.
#[must_use]
pub fn seropositivity_time_varying(fois: &[f64], seroreversion_rate: f64) -> Vec<f64> {
    let n_years = fois.len();
    (1..=n_years)
        .map(|age| cohort_seropositivity(fois[n_years - age..].iter().copied(), seroreversion_rate))
        .collect()
}

/// Seropositivity at a single cohort age under a time-varying FoI.
#[must_use]
pub fn cohort_seropositivity_time_varying(fois: &[f64], age: usize, seroreversion_rate: f64) -> f64 {
    let start = fois.len().saturating_sub(age);
    cohort_seropositivity(fois[start..].iter().copied(), seroreversion_rate)
}

/// Age profile under an FoI that varies with both calendar year and age.
///
/// `fois` is year-major with `max_age` entries per year. A cohort of age `a`
/// was born `a` years before the survey; during its `j`-th year of life it
/// experiences the FoI tabulated for that calendar year at age `j`. The
/// result holds seropositivity at ages `1..=min(n_years, max_age)`.
#[must_use]
pub fn seropositivity_age_and_time(
    fois: &[f64],
    max_age: usize,
    seroreversion_rate: f64,
) -> Vec<f64> {
    if max_age == 0 {
        return Vec::new();
    }
    let n_years = fois.len() / max_age;
    (1..=n_years.min(max_age))
        .map(|age| {
            let birth_offset = n_years - age;
            let steps = (1..=age).map(|year_of_life| {
                let year = birth_offset + year_of_life - 1;
                fois[year * max_age + year_of_life - 1]
            });
            cohort_seropositivity(steps, seroreversion_rate)
        })
        .collect()
}

/// Expand block-level FoI values onto the unit grid described by a
/// 1-based FoI index. Blocks missing from `foi_vector` expand to `NaN`.
#[must_use]
pub fn expand_foi_blocks(foi_vector: &[f64], foi_index: &[usize]) -> Vec<f64> {
    foi_index
        .iter()
        .map(|&block| {
            block
                .checked_sub(1)
                .and_then(|position| foi_vector.get(position))
                .copied()
                .unwrap_or(f64::NAN)
        })
        .collect()
}

/// Seropositivity at `age` from a profile over ages `1..=profile.len()`;
/// newborns (age 0) are seronegative.
#[must_use]
pub fn profile_at(profile: &[f64], age: usize) -> f64 {
    if age == 0 {
        0.0
    } else {
        profile[age - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constant_foi_without_seroreversion_matches_closed_form() {
        let lambda = 0.07;
        let profile = seropositivity_by_age(&[lambda; 60], 0.0);
        for (k, probability) in profile.iter().enumerate() {
            let age = f64::from(u32::try_from(k + 1).unwrap_or(u32::MAX));
            assert_relative_eq!(*probability, 1.0 - (-lambda * age).exp(), epsilon = 1.0e-12);
        }
    }

    #[test]
    fn piecewise_foi_without_seroreversion_depends_on_cumulative_hazard() {
        let fois = [0.01, 0.2, 0.05, 0.0, 0.3];
        let profile = seropositivity_by_age(&fois, 0.0);
        let cumulative: f64 = fois.iter().sum();
        assert_relative_eq!(profile[4], 1.0 - (-cumulative).exp(), epsilon = 1.0e-12);
    }

    #[test]
    fn seroreversion_converges_to_equilibrium() {
        let (lambda, mu) = (0.05, 0.02);
        let profile = seropositivity_by_age(&[lambda; 1_000], mu);
        assert_relative_eq!(
            profile[999],
            lambda / (lambda + mu),
            epsilon = 1.0e-10
        );
    }

    #[test]
    fn zero_foi_and_zero_seroreversion_leave_state_unchanged() {
        assert_relative_eq!(seropositivity_step(0.37, 0.0, 0.0), 0.37);
        let profile = seropositivity_by_age(&[0.1, 0.0, 0.0], 0.0);
        assert_relative_eq!(profile[1], profile[0]);
        assert_relative_eq!(profile[2], profile[0]);
    }

    #[test]
    fn zero_foi_with_seroreversion_decays() {
        let next = seropositivity_step(0.5, 0.0, 0.1);
        assert_relative_eq!(next, 0.5 * (-0.1f64).exp(), epsilon = 1.0e-14);
    }

    #[test]
    fn time_varying_profile_uses_most_recent_years() {
        let fois = [0.5, 0.0, 0.0];
        let profile = seropositivity_time_varying(&fois, 0.0);
        assert_relative_eq!(profile[0], 0.0);
        assert_relative_eq!(profile[1], 0.0);
        assert_relative_eq!(profile[2], 1.0 - (-0.5f64).exp(), epsilon = 1.0e-14);
        assert_relative_eq!(
            cohort_seropositivity_time_varying(&fois, 3, 0.0),
            profile[2],
            epsilon = 1.0e-14
        );
    }

    #[test]
    fn age_and_time_profile_reduces_to_age_profile_when_years_agree() {
        let age_fois = [0.02, 0.04, 0.08];
        let grid = (0..3).flat_map(|_| age_fois).collect::<Vec<_>>();
        let by_both = seropositivity_age_and_time(&grid, 3, 0.01);
        let by_age = seropositivity_by_age(&age_fois, 0.01);
        for (left, right) in by_both.iter().zip(by_age.iter()) {
            assert_relative_eq!(*left, *right, epsilon = 1.0e-14);
        }
    }

    #[test]
    fn expand_blocks_follows_index() {
        let grid = expand_foi_blocks(&[0.1, 0.3], &[1, 1, 2, 2, 2]);
        assert_eq!(grid, vec![0.1, 0.1, 0.3, 0.3, 0.3]);
    }

    #[test]
    fn expand_blocks_marks_missing_blocks() {
        let grid = expand_foi_blocks(&[0.1], &[0, 1, 2]);
        assert!(grid[0].is_nan());
        assert_relative_eq!(grid[1], 0.1);
        assert!(grid[2].is_nan());
    }

    #[test]
    fn newborns_are_seronegative() {
        assert_relative_eq!(profile_at(&[0.4, 0.6], 0), 0.0);
        assert_relative_eq!(profile_at(&[0.4, 0.6], 2), 0.6);
    }
}
