//! Schema-stable results for an image whose preprocessing failed.

use crate::pipeline::PipelineError;
use crate::types::{QualityAssessments, QualityMeasure, QualityMeasureResult};

/// Mark every configured measure, composites expanded, as not assessable.
///
/// Any previous entries are discarded so the key set is exactly the expanded
/// configured set.
pub fn apply_fallback(
    assessments: &mut QualityAssessments,
    configured: &[QualityMeasure],
    cause: &PipelineError,
) {
    assessments.clear();
    for measure in configured {
        for &reported in measure.expand() {
            assessments.insert(reported, QualityMeasureResult::failure_to_assess());
        }
    }
    tracing::info!(
        stage = %cause.stage(),
        error = %cause,
        measures = assessments.len(),
        "preprocessing failed, all measures set to failure"
    );
}
