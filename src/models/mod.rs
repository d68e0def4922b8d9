//! # Models
//!
//! Serocatalytic model machinery: the seropositivity recursion, FoI-index
//! grouping, prior handling, specification assembly, the sampler boundary,
//! and posterior diagnostics for fitted models.

pub mod diagnostics;
pub mod fit;
pub mod foi_index;
pub mod posterior;
pub mod priors;
pub mod sampler;
pub mod seropositivity;
pub mod spec;
pub mod types;
