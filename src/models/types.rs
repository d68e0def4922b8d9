//! Core public types shared by the fitting workflow.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::input::IndexAxis;

/// Serocatalytic model family used for fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    /// A single FoI value over the whole age range.
    Constant,
    /// FoI varies with age.
    Age,
    /// FoI varies with calendar year.
    Time,
}

impl ModelType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Age => "age",
            Self::Time => "time",
        }
    }

    /// Axis along which FoI blocks are laid out.
    #[must_use]
    pub const fn index_axis(self) -> IndexAxis {
        match self {
            Self::Constant | Self::Age => IndexAxis::Age,
            Self::Time => IndexAxis::Year,
        }
    }

    /// Whether the model estimates a random walk across FoI blocks.
    #[must_use]
    pub const fn has_random_walk(self) -> bool {
        !matches!(self, Self::Constant)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown model type `{0}`; expected `constant`, `age`, or `time`")]
pub struct UnknownModelType(pub String);

impl FromStr for ModelType {
    type Err = UnknownModelType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "constant" => Ok(Self::Constant),
            "age" => Ok(Self::Age),
            "time" => Ok(Self::Time),
            other => Err(UnknownModelType(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_type_round_trips_through_strings() {
        for model in [ModelType::Constant, ModelType::Age, ModelType::Time] {
            assert_eq!(model.as_str().parse::<ModelType>(), Ok(model));
        }
        assert!("age-time".parse::<ModelType>().is_err());
    }

    #[test]
    fn only_time_models_index_by_year() {
        assert_eq!(ModelType::Time.index_axis(), IndexAxis::Year);
        assert_eq!(ModelType::Age.index_axis(), IndexAxis::Age);
        assert!(!ModelType::Constant.has_random_walk());
    }
}
