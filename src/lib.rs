#![forbid(unsafe_code)]

//! # `serofoi`
//!
//! Force-of-infection estimation from age-stratified serosurveys with
//! serocatalytic models.
//!
//! The crate validates survey and FoI inputs, computes exact seropositivity
//! for piecewise-constant FoI with optional seroreversion, groups ages or
//! years into estimable FoI blocks, and assembles the data and priors a
//! sampler needs. Sampling goes through the [`Sampler`] trait; a built-in
//! [`MetropolisSampler`] is provided. Synthetic serosurveys can be drawn
//! from piecewise FoI tables or from arbitrary compartmental models via a
//! matrix-exponential forward simulator.

pub mod inference;
pub mod input;
pub mod models;
pub mod simulation;
pub mod utils;

pub use inference::{InferenceError, McmcConfig, ProposalStats, ProposalTuning};
pub use input::{
    AgeBin, Column, ColumnTable, ErrorKind, FoiGrid, FoiIndexTable, FoiTable, FoiTableKind,
    IndexAxis, Serosurvey, SurveyDesign, SurveyRow, ValidationError, validate_foi_index,
    validate_seroreversion_rate, validate_survey_features,
};
pub use utils::{LinalgError, expm};

pub use models::diagnostics::{
    ConvergenceSummary, DiagnosticsError, ElpdEstimate, autocorrelation, effective_sample_size,
    summarize_convergence, waic,
};
pub use models::fit::{
    FitError, FittedModel, FoiEstimate, ModelSummary, RHAT_THRESHOLD, SeroprevalenceEstimate, fit,
    fit_with_assembler,
};
pub use models::foi_index::{block_indices, build_foi_index};
pub use models::posterior::{
    Draws, ParameterSummary, PosteriorChain, PosteriorSummary, summarize_posterior,
};
pub use models::priors::{Prior, PriorError, PriorFamily, PriorSite};
pub use models::sampler::{MetropolisSampler, Sampler, SamplerError};
pub use models::seropositivity::{
    cohort_seropositivity, seropositivity_age_and_time, seropositivity_by_age,
    seropositivity_step, seropositivity_time_varying,
};
pub use models::spec::{
    AssemblerConfig, AssemblyError, DEFAULT_FOI_PRIOR, DEFAULT_LOG_FOI_PRIOR, FitOptions,
    ModelAssembler, ModelParameters, ModelSpec, SamplerData, assemble_model,
};
pub use models::types::{ModelType, UnknownModelType};

pub use simulation::{
    GeneralModel, SimulationError, SimulationModel, simulate, simulate_general,
};
