use crate::types::{QualityAssessments, QualityMeasure, NOT_ASSESSABLE};

/// Single quality value for an assessment.
///
/// The unified quality score when present, otherwise the mean of every
/// assessable scalar, otherwise 0.
pub fn scalar_quality(assessments: &QualityAssessments) -> f64 {
    if let Some(unified) = assessments.get(&QualityMeasure::UnifiedQualityScore) {
        return unified.scalar;
    }

    let (sum, count) = assessments
        .values()
        .map(|r| r.scalar)
        .filter(|&s| s != NOT_ASSESSABLE)
        .fold((0.0, 0usize), |(sum, n), s| (sum + s, n + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
