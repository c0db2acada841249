use anyhow::Error;

/// The result of scoring one trial value.
#[derive(Debug)]
pub enum EvaluationOutcome {
    /// The objective value at the trial point.
    Score(f64),
    /// The collaborator could not produce a score. Fatal to the search.
    Failure(Error),
}

impl From<anyhow::Result<f64>> for EvaluationOutcome {
    fn from(result: anyhow::Result<f64>) -> Self {
        match result {
            Ok(score) => Self::Score(score),
            Err(e) => Self::Failure(e),
        }
    }
}

/// A generic interface for objective functions driven by the minimizer.
/// Implementations must be Thread-Safe (Sync) so one evaluator can be shared
/// between independent runs.
pub trait Evaluator: Send + Sync {
    /// Scores a single trial value. Blocks for as long as the work takes.
    fn evaluate(&self, w: f64) -> EvaluationOutcome;

    /// Returns the name of the evaluator (e.g., "Gaussian J² objective").
    fn name(&self) -> &str;
}
