use serofoi::{
    AgeBin, FitOptions, FoiTable, McmcConfig, MetropolisSampler, ModelType, Prior,
    SimulationModel, SurveyDesign, build_foi_index, fit, simulate,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Outbreak-like FoI: low background with a five-year epidemic period.
    let fois = (1980..2020)
        .map(|year| if (1995..2000).contains(&year) { 0.15 } else { 0.01 })
        .collect::<Vec<_>>();
    let table = FoiTable::by_year(1980, fois)?;
    let design = SurveyDesign::new(
        (0..8)
            .map(|bin| AgeBin::new(bin * 5 + 1, bin * 5 + 5, 300))
            .collect(),
    )?;
    let survey = simulate(SimulationModel::Time, &table, &design, 0.0, 7)?;
    println!("Simulated survey for {}", survey.survey_year()?);

    let index = build_foi_index(&survey, 5, ModelType::Time)?;
    let options = FitOptions::new(ModelType::Time)
        .with_foi_index(index)
        .with_log_foi(true)
        .with_foi_prior(Prior::normal(-3.0, 1.5));
    let sampler = MetropolisSampler::with_config(McmcConfig {
        iterations: 3_000,
        burn_in: 1_000,
        ..McmcConfig::default()
    })?;
    let fitted = fit(&survey, &options, &sampler)?;

    let summary = fitted.summary();
    println!(
        "{}: max R-hat={:?}, converged={}",
        summary.model_name, summary.max_rhat, summary.converged
    );
    for estimate in fitted.foi_estimates().iter().step_by(5) {
        println!(
            "{}: block {} FoI={:.3} ({:.3}, {:.3})",
            estimate.key,
            estimate.block,
            estimate.summary.mean,
            estimate.summary.q025,
            estimate.summary.q975
        );
    }

    Ok(())
}
