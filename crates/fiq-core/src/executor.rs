//! Measure executor: runs the configured measures over a preprocessed session.

use crate::session::Session;
use crate::types::{QualityMeasure, QualityMeasureResult, NOT_ASSESSABLE};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("required artifact missing: {0}")]
    MissingArtifact(&'static str),
    #[error("{0}")]
    Computation(String),
}

/// One configured quality measure.
pub trait Measure: Send {
    /// The configured measure; composites report every id in its expansion.
    fn measure(&self) -> QualityMeasure;

    /// Compute results for the ids in `self.measure().expand()`.
    fn execute(&self, session: &Session)
        -> Result<Vec<(QualityMeasure, QualityMeasureResult)>, MeasureError>;
}

pub struct Executor {
    measures: Vec<Box<dyn Measure>>,
}

impl Executor {
    pub fn new(measures: Vec<Box<dyn Measure>>) -> Self {
        Self { measures }
    }

    /// Configured measures in execution order, composites unexpanded.
    pub fn configured_measures(&self) -> Vec<QualityMeasure> {
        self.measures.iter().map(|m| m.measure()).collect()
    }

    /// Run every measure and store its results in the session assessment.
    ///
    /// A failing measure marks only its own expanded ids as failed. Ids a
    /// measure did not report, and successes carrying the not-assessable
    /// value as scalar or raw score, are marked failed too.
    pub fn execute_all(&self, session: &mut Session) {
        for measure in &self.measures {
            let configured = measure.measure();
            let expected = configured.expand();

            let results = match measure.execute(session) {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(measure = %configured, error = %e, "measure failed");
                    Vec::new()
                }
            };

            let assessments = session.assessments_mut();
            for (id, result) in results {
                if !expected.contains(&id) {
                    tracing::warn!(measure = %configured, id = %id, "ignoring result outside measure");
                    continue;
                }
                let sentinel =
                    result.scalar == NOT_ASSESSABLE || result.raw_score == NOT_ASSESSABLE;
                let result = if result.is_success() && sentinel {
                    tracing::warn!(measure = %id, "success reported with not-assessable value");
                    QualityMeasureResult::failure_to_assess()
                } else {
                    result
                };
                assessments.insert(id, result);
            }
            for &id in expected {
                assessments
                    .entry(id)
                    .or_insert_with(QualityMeasureResult::failure_to_assess);
            }
        }
    }
}
