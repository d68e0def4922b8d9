//! Grouping of ages or calendar years into FoI blocks.

use crate::input::{FoiIndexTable, Serosurvey, ValidationError};

use super::types::ModelType;

/// Block assignment for `len` consecutive grid positions.
///
/// Position `k` (0-based) belongs to block `k / group_size + 1`, except that
/// a trailing partial block is merged into the last full one. `group_size`
/// must lie in `[1, len]`.
#[must_use]
pub fn block_indices(len: usize, group_size: usize) -> Vec<usize> {
    let full_blocks = (len / group_size).max(1);
    (0..len)
        .map(|position| (position / group_size).min(full_blocks - 1) + 1)
        .collect()
}

/// Build the FoI-index table for `serosurvey` with blocks of `group_size`.
///
/// Age and constant models are keyed by ages `1..=max_age`; time models by
/// calendar years `survey_year - max_age ..= survey_year - 1`. Constant
/// models always use a single block.
///
/// # Errors
///
/// Returns `ValidationError` if `group_size` lies outside `[1, max_age]` or
/// a time model is requested without a survey year.
pub fn build_foi_index(
    serosurvey: &Serosurvey,
    group_size: usize,
    model_type: ModelType,
) -> Result<FoiIndexTable, ValidationError> {
    let max_age = serosurvey.age_max();
    let len = usize::try_from(max_age).unwrap_or(usize::MAX);
    if group_size == 0 || group_size > len {
        return Err(ValidationError::InvalidGroupSize {
            group_size,
            max_age,
        });
    }

    let indices = match model_type {
        ModelType::Constant => vec![1; len],
        ModelType::Age | ModelType::Time => block_indices(len, group_size),
    };
    let keys = match model_type {
        ModelType::Constant | ModelType::Age => (1..=max_age)
            .map(|age| i32::try_from(age).unwrap_or(i32::MAX))
            .collect(),
        ModelType::Time => {
            let survey_year = serosurvey.survey_year()?;
            let span = i32::try_from(max_age).unwrap_or(i32::MAX);
            (survey_year - span..survey_year).collect()
        }
    };

    FoiIndexTable::new(model_type.index_axis(), keys, indices)
}
