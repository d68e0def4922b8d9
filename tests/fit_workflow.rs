use std::cell::Cell;

use approx::assert_relative_eq;
use serofoi::{
    AgeBin, AssemblyError, Draws, FitError, FitOptions, FoiTable, McmcConfig, MetropolisSampler,
    ModelSpec, ModelType, PosteriorChain, Prior, PriorError, PriorSite, Sampler, SamplerError,
    Serosurvey, SimulationModel, SurveyDesign, SurveyRow, assemble_model, build_foi_index, fit,
    simulate,
};

/// Returns every parameter at a fixed value and counts invocations.
struct CountingSampler {
    value: f64,
    calls: Cell<usize>,
}

impl CountingSampler {
    fn new(value: f64) -> Self {
        Self {
            value,
            calls: Cell::new(0),
        }
    }
}

impl Sampler for CountingSampler {
    fn sample(&self, spec: &ModelSpec) -> Result<Draws, SamplerError> {
        self.calls.set(self.calls.get() + 1);
        let dim = spec.parameter_dimension();
        let chain = |shift: f64| PosteriorChain {
            draws: (0..20)
                .map(|draw| {
                    let wiggle = if draw % 2 == 0 { shift } else { -shift };
                    vec![self.value + wiggle; dim]
                })
                .collect(),
            acceptance_rate: 0.3,
        };
        Ok(Draws::new(
            spec.parameter_names(),
            vec![chain(1.0e-3), chain(-1.0e-3)],
        ))
    }
}

fn survey_2020() -> Serosurvey {
    Serosurvey::new(vec![
        SurveyRow::new(1, 9, 150, 20).with_survey_year(2020),
        SurveyRow::new(10, 19, 150, 55).with_survey_year(2020),
        SurveyRow::new(20, 29, 150, 80).with_survey_year(2020),
        SurveyRow::new(30, 39, 150, 100).with_survey_year(2020),
    ])
    .expect("valid survey")
}

#[test]
fn seroreversion_without_prior_never_reaches_sampler() {
    let sampler = CountingSampler::new(0.05);
    let options = FitOptions {
        is_seroreversion: true,
        seroreversion_prior: None,
        ..FitOptions::new(ModelType::Age)
    };

    let err = fit(&survey_2020(), &options, &sampler).expect_err("missing prior");
    assert_eq!(
        err,
        FitError::Assembly(AssemblyError::InvalidPrior(PriorError::Missing {
            site: PriorSite::Seroreversion
        }))
    );
    assert_eq!(sampler.calls.get(), 0);
}

#[test]
fn invalid_index_never_reaches_sampler() {
    let sampler = CountingSampler::new(0.05);
    let other = Serosurvey::new(vec![SurveyRow::new(1, 20, 100, 30).with_survey_year(2020)])
        .expect("valid survey");
    let index = build_foi_index(&other, 5, ModelType::Time).expect("valid index");
    let options = FitOptions::new(ModelType::Time).with_foi_index(index);

    assert!(matches!(
        fit(&survey_2020(), &options, &sampler),
        Err(FitError::Assembly(AssemblyError::InvalidInput(_)))
    ));
    assert_eq!(sampler.calls.get(), 0);
}

#[test]
fn time_model_estimates_are_keyed_by_year() {
    let sampler = CountingSampler::new(0.04);
    let survey = survey_2020();
    let index = build_foi_index(&survey, 10, ModelType::Time).expect("valid index");
    let options = FitOptions::new(ModelType::Time)
        .with_foi_index(index)
        .with_seroreversion(Prior::uniform(0.0, 1.0));

    let fitted = fit(&survey, &options, &sampler).expect("fit succeeds");
    assert_eq!(sampler.calls.get(), 1);
    assert_eq!(fitted.model_name(), "time_seroreversion");
    assert_eq!(fitted.spec().n_foi_blocks(), 3);

    let estimates = fitted.foi_estimates();
    assert_eq!(estimates.len(), 39);
    assert_eq!(estimates.first().map(|estimate| estimate.key), Some(1981));
    assert_eq!(estimates.last().map(|estimate| estimate.key), Some(2019));
    assert_eq!(estimates.last().map(|estimate| estimate.block), Some(3));
    assert_relative_eq!(estimates[0].summary.mean, 0.04, epsilon = 1.0e-12);

    assert!(fitted.sigma_rw().is_some());
    assert!(fitted.seroreversion_rate().is_some());
    assert!(fitted.summary().converged);
}

#[test]
fn sampler_data_round_trips_through_json() {
    let options = FitOptions::new(ModelType::Age)
        .with_log_foi(true)
        .with_foi_prior(Prior::normal(-3.0, 1.0));
    let spec = assemble_model(&survey_2020(), &options).expect("assembly succeeds");
    let json = spec.to_json().expect("serializes");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(value["n_observations"], 4);
    assert_eq!(value["age_max"], 39);
    assert_eq!(value["is_log_foi"], 1);
    assert_eq!(value["foi_prior_index"], 2);
    assert_eq!(value["foi_sigma_rw_prior_index"], 2);
    assert_eq!(value["seroreversion_prior_index"], 0);
    assert_eq!(value["ages"][0], 5);
    assert_eq!(value["foi_index"].as_array().map(Vec::len), Some(39));
}

#[test]
fn metropolis_recovers_constant_foi() {
    let lambda = 0.03;
    let design = SurveyDesign::new(vec![
        AgeBin::new(1, 9, 1_000),
        AgeBin::new(10, 20, 1_000),
        AgeBin::new(21, 31, 1_000),
        AgeBin::new(32, 42, 1_000),
    ])
    .expect("valid design");
    let table = FoiTable::by_age(vec![lambda; 42]).expect("valid table");
    let survey = simulate(SimulationModel::Age, &table, &design, 0.0, 2_024).expect("simulates");

    let sampler = MetropolisSampler::with_config(McmcConfig {
        iterations: 1_500,
        burn_in: 500,
        thin: 2,
        chains: 2,
        seed: 17,
        ..McmcConfig::default()
    })
    .expect("valid config");
    let fitted = fit(&survey, &FitOptions::new(ModelType::Constant), &sampler)
        .expect("fit succeeds");

    let foi = fitted.posterior().parameters[0];
    assert!((foi.mean - lambda).abs() < 0.005, "posterior mean {}", foi.mean);
    assert!(foi.q025 < foi.q975);
    assert_eq!(fitted.draws().len(), 1_000);
    assert!(fitted.summary().elpd.is_some_and(f64::is_finite));
}

#[test]
fn metropolis_runs_log_scale_time_model() {
    let survey = Serosurvey::new(vec![
        SurveyRow::new(1, 4, 200, 20).with_survey_year(2015),
        SurveyRow::new(5, 9, 200, 60).with_survey_year(2015),
    ])
    .expect("valid survey");
    let index = build_foi_index(&survey, 3, ModelType::Time).expect("valid index");
    let options = FitOptions::new(ModelType::Time)
        .with_foi_index(index)
        .with_log_foi(true)
        .with_foi_prior(Prior::normal(-3.0, 1.5));
    let sampler = MetropolisSampler::with_config(McmcConfig {
        iterations: 300,
        burn_in: 100,
        thin: 2,
        chains: 2,
        ..McmcConfig::default()
    })
    .expect("valid config");

    let fitted = fit(&survey, &options, &sampler).expect("fit succeeds");
    assert_eq!(fitted.model_name(), "time_log_no_seroreversion");
    assert_eq!(fitted.draws().n_parameters(), 4);
    assert!(fitted
        .draws()
        .pooled()
        .all(|draw| draw.iter().all(|value| *value > 0.0)));
    let prevalence = fitted.seroprevalence_estimates();
    assert_eq!(prevalence.len(), 2);
    assert!(prevalence[0].summary.mean < prevalence[1].summary.mean);
}
