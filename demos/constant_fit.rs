use serofoi::{
    AgeBin, FitOptions, FoiTable, McmcConfig, MetropolisSampler, ModelType, SimulationModel,
    SurveyDesign, fit, simulate,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let design = SurveyDesign::new(vec![
        AgeBin::new(1, 9, 250),
        AgeBin::new(10, 19, 250),
        AgeBin::new(20, 29, 250),
        AgeBin::new(30, 39, 250),
        AgeBin::new(40, 49, 250),
    ])?;
    let table = FoiTable::by_age(vec![0.025; 49])?;
    let survey = simulate(SimulationModel::Age, &table, &design, 0.0, 2_026)?;

    let sampler = MetropolisSampler::with_config(McmcConfig {
        iterations: 2_000,
        burn_in: 500,
        ..McmcConfig::default()
    })?;
    let fitted = fit(&survey, &FitOptions::new(ModelType::Constant), &sampler)?;

    let summary = fitted.summary();
    println!("Model: {}", summary.model_name);
    if let (Some(elpd), Some(se)) = (summary.elpd, summary.se) {
        println!("elpd: {elpd:.2} (se {se:.2})");
    }
    println!(
        "max R-hat: {:?}, converged: {}",
        summary.max_rhat, summary.converged
    );

    let foi = fitted.posterior().parameters[0];
    println!(
        "FoI: mean={:.4}, 95% CrI=({:.4}, {:.4}), true=0.0250",
        foi.mean, foi.q025, foi.q975
    );

    for estimate in fitted.seroprevalence_estimates() {
        println!(
            "age {:>2}: observed={:.3}, fitted={:.3} ({:.3}, {:.3})",
            estimate.age_group,
            estimate.observed,
            estimate.summary.mean,
            estimate.summary.q025,
            estimate.summary.q975
        );
    }

    Ok(())
}
