//! Turn raw model scores into a disease classification.

use serde::{Deserialize, Serialize};

use crate::disease::{DiseaseClass, DiseaseRecord, RecordLanguage};
use crate::types::PipelineError;

/// Model output: one score per class, in [`DiseaseClass::ALL`] order.
///
/// The model contract promises exactly [`DiseaseClass::COUNT`] entries, but
/// the resolver checks rather than trusting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    /// Wrap raw scores.
    #[must_use]
    pub const fn new(scores: Vec<f32>) -> Self {
        Self(scores)
    }

    /// The scores as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of scores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no scores at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the first occurrence of the maximum score.
    ///
    /// Scans in ascending index order and replaces the running best only
    /// on a strictly greater value, so ties go to the lowest index. NaN
    /// never wins. Returns `None` when no score is comparable.
    #[must_use]
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &score) in self.0.iter().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((i, score)),
            }
        }
        best.map(|(i, _)| i)
    }
}

impl From<Vec<f32>> for ScoreVector {
    fn from(scores: Vec<f32>) -> Self {
        Self(scores)
    }
}

/// Terminal output of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// The winning class.
    pub class: DiseaseClass,
    /// Position of the winning score.
    pub class_index: usize,
    /// All scores as produced by the model.
    pub scores: ScoreVector,
}

impl ClassificationResult {
    /// Display label of the winning class.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.class.label()
    }

    /// Static description and remedy for the winning class.
    #[must_use]
    pub const fn record(&self) -> &'static DiseaseRecord {
        self.class.record()
    }

    /// Description and remedy for the winning class in `language`.
    #[must_use]
    pub const fn record_in(&self, language: RecordLanguage) -> &'static DiseaseRecord {
        self.class.record_in(language)
    }

    /// Score of the winning class, `None` if `class_index` is out of range.
    #[must_use]
    pub fn winning_score(&self) -> Option<f32> {
        self.scores.as_slice().get(self.class_index).copied()
    }
}

/// Pick the winning class for `scores`.
///
/// # Errors
///
/// Returns [`PipelineError::NoScores`] if `scores` is empty or all NaN.
/// Returns [`PipelineError::UnknownClass`] if the winning index lies past
/// the end of the disease table.
pub fn resolve(scores: ScoreVector) -> Result<ClassificationResult, PipelineError> {
    let index = scores.argmax().ok_or(PipelineError::NoScores)?;
    let class = DiseaseClass::from_index(index).ok_or(PipelineError::UnknownClass {
        index,
        class_count: DiseaseClass::COUNT,
    })?;
    Ok(ClassificationResult {
        class,
        class_index: index,
        scores,
    })
}
