//! Prior specifications and log-density helpers.

use std::fmt;

use thiserror::Error;

/// Prior distribution attached to one parameter site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prior {
    Normal { mean: f64, sd: f64 },
    Uniform { min: f64, max: f64 },
    Cauchy { location: f64, scale: f64 },
    None,
}

/// Distribution family of a [`Prior`], without parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorFamily {
    Normal,
    Uniform,
    Cauchy,
    None,
}

impl PriorFamily {
    /// Integer selector used in the sampler data block.
    #[must_use]
    pub const fn selector(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Uniform => 1,
            Self::Normal => 2,
            Self::Cauchy => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Uniform => "uniform",
            Self::Cauchy => "cauchy",
            Self::None => "none",
        }
    }
}

impl fmt::Display for PriorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter a prior is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorSite {
    /// First FoI block.
    Foi,
    /// Random-walk standard deviation between consecutive FoI blocks.
    FoiSigma,
    /// Seroreversion rate.
    Seroreversion,
}

impl fmt::Display for PriorSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Foi => "FoI",
            Self::FoiSigma => "FoI random-walk scale",
            Self::Seroreversion => "seroreversion rate",
        })
    }
}

/// Errors for missing or misconfigured priors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PriorError {
    #[error("a prior is required for the {site}")]
    Missing { site: PriorSite },
    #[error("{family} prior is not accepted for the {site}; expected one of {allowed:?}")]
    Invalid {
        site: PriorSite,
        family: PriorFamily,
        allowed: Vec<PriorFamily>,
    },
    #[error("{family} prior for the {site} has invalid parameters")]
    InvalidParameters { site: PriorSite, family: PriorFamily },
}

impl Prior {
    #[must_use]
    pub const fn normal(mean: f64, sd: f64) -> Self {
        Self::Normal { mean, sd }
    }

    #[must_use]
    pub const fn uniform(min: f64, max: f64) -> Self {
        Self::Uniform { min, max }
    }

    #[must_use]
    pub const fn cauchy(location: f64, scale: f64) -> Self {
        Self::Cauchy { location, scale }
    }

    #[must_use]
    pub const fn family(self) -> PriorFamily {
        match self {
            Self::Normal { .. } => PriorFamily::Normal,
            Self::Uniform { .. } => PriorFamily::Uniform,
            Self::Cauchy { .. } => PriorFamily::Cauchy,
            Self::None => PriorFamily::None,
        }
    }

    /// Whether the parameters describe a proper distribution.
    #[must_use]
    pub fn has_valid_parameters(self) -> bool {
        match self {
            Self::Normal { mean, sd } => mean.is_finite() && sd.is_finite() && sd > 0.0,
            Self::Uniform { min, max } => min.is_finite() && max.is_finite() && min < max,
            Self::Cauchy { location, scale } => {
                location.is_finite() && scale.is_finite() && scale > 0.0
            }
            Self::None => true,
        }
    }

    /// Accept this prior for `site` if its family is in `allowed` and its
    /// parameters are valid.
    ///
    /// # Errors
    ///
    /// Returns `PriorError::Invalid` for a disallowed family and
    /// `PriorError::InvalidParameters` for malformed parameters.
    pub fn check_site(self, site: PriorSite, allowed: &[PriorFamily]) -> Result<Self, PriorError> {
        let family = self.family();
        if !allowed.contains(&family) {
            return Err(PriorError::Invalid {
                site,
                family,
                allowed: allowed.to_vec(),
            });
        }
        if !self.has_valid_parameters() {
            return Err(PriorError::InvalidParameters { site, family });
        }
        Ok(self)
    }

    /// Log-density at `value`, up to truncation constants.
    #[must_use]
    pub fn log_density(self, value: f64) -> f64 {
        match self {
            Self::Normal { mean, sd } => log_normal_density(value, mean, sd),
            Self::Uniform { min, max } => log_uniform_density(value, min, max),
            Self::Cauchy { location, scale } => log_cauchy_density(value, location, scale),
            Self::None => 0.0,
        }
    }

    /// Representative point of the prior, used to seed samplers.
    #[must_use]
    pub fn center(self) -> Option<f64> {
        match self {
            Self::Normal { mean, .. } => Some(mean),
            Self::Uniform { min, max } => Some(0.5 * (min + max)),
            Self::Cauchy { location, .. } => Some(location),
            Self::None => None,
        }
    }

    /// `(mean, sd, min, max)` as laid out in the sampler data block; unused
    /// slots are zero.
    #[must_use]
    pub const fn data_parameters(self) -> [f64; 4] {
        match self {
            Self::Normal { mean, sd } => [mean, sd, 0.0, 0.0],
            Self::Uniform { min, max } => [0.0, 0.0, min, max],
            Self::Cauchy { location, scale } => [location, scale, 0.0, 0.0],
            Self::None => [0.0; 4],
        }
    }
}

/// Log-density for `Normal(mean, sd)`.
#[must_use]
pub fn log_normal_density(value: f64, mean: f64, sd: f64) -> f64 {
    if sd <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let z = (value - mean) / sd;
    -0.5 * z.mul_add(z, std::f64::consts::TAU.ln()) - sd.ln()
}

/// Log-density for `Uniform(low, high)`.
#[must_use]
pub fn log_uniform_density(value: f64, low: f64, high: f64) -> f64 {
    if low.partial_cmp(&high) != Some(std::cmp::Ordering::Less) {
        return f64::NAN;
    }
    if (low..=high).contains(&value) {
        -(high - low).ln()
    } else {
        f64::NEG_INFINITY
    }
}

/// Log-density for `Cauchy(location, scale)`.
#[must_use]
pub fn log_cauchy_density(value: f64, location: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let z = (value - location) / scale;
    -(std::f64::consts::PI.ln() + scale.ln() + (z * z).ln_1p())
}
