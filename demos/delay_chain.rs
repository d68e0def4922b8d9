use faer::Mat;
use serofoi::{AgeBin, GeneralModel, SurveyDesign, seropositivity_by_age, simulate_general};

const SURVEY_YEAR: i32 = 2023;
const MAX_AGE: usize = 40;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let lambda = 0.05;
    let onset_rate = 0.8;
    let waning_rate = 0.02;

    // Susceptible -> exposed -> seropositive, with waning back to susceptible.
    // `u` scales the FoI year by year; `v` is unused here.
    let first_year = SURVEY_YEAR - i32::try_from(MAX_AGE)? + 1;
    let model = GeneralModel::new(
        move |year: i32, _birth_year: i32, u: &[f64], _v: &[f64]| {
            let foi = lambda * u[usize::try_from(year - first_year).unwrap_or(0)];
            Mat::from_fn(3, 3, |row, col| match (row, col) {
                (0, 0) => -foi,
                (0, 2) => waning_rate,
                (1, 0) => foi,
                (1, 1) => -onset_rate,
                (2, 1) => onset_rate,
                (2, 2) => -waning_rate,
                _ => 0.0,
            })
        },
        |state: &[f64]| state[2],
        vec![1.0, 0.0, 0.0],
    )
    .with_series(vec![1.0; MAX_AGE], vec![0.0; MAX_AGE]);

    let profile = model.age_profile(MAX_AGE, SURVEY_YEAR)?;
    let without_delay = seropositivity_by_age(&[lambda; MAX_AGE], waning_rate);
    for age in [1, 5, 10, 20, 40] {
        println!(
            "age {age:>2}: with delay={:.4}, without delay={:.4}",
            profile[age - 1],
            without_delay[age - 1]
        );
    }

    let design = SurveyDesign::new(
        (0..4)
            .map(|bin| AgeBin::new(bin * 10 + 1, bin * 10 + 10, 500))
            .collect(),
    )?;
    let survey = simulate_general(&model, &design, SURVEY_YEAR, 99)?;
    for row in survey.rows() {
        println!(
            "[{:>2}, {:>2}]: {}/{} seropositive",
            row.age_min, row.age_max, row.n_seropositive, row.n_sample
        );
    }

    Ok(())
}
