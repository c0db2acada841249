use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use log::{debug, info};
use thiserror::Error;

use crate::core::domain::ChargeState;
use crate::engine::evaluator::{EvaluationOutcome, Evaluator};
use crate::engine::extract::{ExtractError, ReportFields};

/// Produces the textual report of one sub-evaluation at a trial value.
///
/// Implementations own all side effects (input files, external programs,
/// retries). An `Err` is reported as a failed sub-evaluation.
pub trait ReportSource: Send + Sync {
    fn report(&self, state: ChargeState, w: f64) -> anyhow::Result<String>;
}

/// Why a trial could not be scored.
#[derive(Debug, Error)]
pub enum EvaluationFailure {
    #[error("{state} sub-evaluation failed: {reason:#}")]
    SubEvaluation {
        state: ChargeState,
        reason: anyhow::Error,
    },

    #[error("cannot read {state} report: {source}")]
    Extraction {
        state: ChargeState,
        #[source]
        source: ExtractError,
    },
}

/// Deviations from the ionization-potential and electron-affinity theorems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeTerms {
    /// `|level(N) + E(N-1) - E(N)|`
    pub j_a: f64,
    /// `|level(N+1) + E(N) - E(N+1)|`
    pub j_b: f64,
}

impl ExchangeTerms {
    pub fn new(
        level_reference: f64,
        energy_reference: f64,
        energy_minus1: f64,
        level_plus1: f64,
        energy_plus1: f64,
    ) -> Self {
        Self {
            j_a: (level_reference + energy_minus1 - energy_reference).abs(),
            j_b: (level_plus1 + energy_reference - energy_plus1).abs(),
        }
    }

    /// `J = J_a + J_b`
    pub fn j(&self) -> f64 {
        self.j_a + self.j_b
    }

    /// `J² = J_a² + J_b²`, the minimized score.
    pub fn score(&self) -> f64 {
        self.j_a * self.j_a + self.j_b * self.j_b
    }
}

/// Scores a trial `w` from the reference, N+1 and N-1 reports.
pub struct ObjectiveEvaluator<S> {
    source: S,
    trials: AtomicUsize,
}

impl<S: ReportSource> ObjectiveEvaluator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            trials: AtomicUsize::new(0),
        }
    }

    /// Number of trials started so far.
    pub fn trial_count(&self) -> usize {
        self.trials.load(Ordering::Relaxed)
    }

    fn fields(&self, state: ChargeState, w: f64) -> Result<ReportFields, EvaluationFailure> {
        debug!("Running {} sub-evaluation at w = {:.4}", state, w);
        let report = self
            .source
            .report(state, w)
            .map_err(|reason| EvaluationFailure::SubEvaluation { state, reason })?;

        let with_level = state != ChargeState::MinusOne;
        ReportFields::extract(&report, with_level)
            .map_err(|source| EvaluationFailure::Extraction { state, source })
    }

    /// Runs all three sub-evaluations and combines their fields.
    pub fn exchange_terms(&self, w: f64) -> Result<ExchangeTerms, EvaluationFailure> {
        let reference = self.fields(ChargeState::Reference, w)?;
        let plus1 = self.fields(ChargeState::PlusOne, w)?;
        let minus1 = self.fields(ChargeState::MinusOne, w)?;

        // Levels are always present for states extracted with `with_level`.
        let level = |fields: &ReportFields, state| {
            fields.level.ok_or(EvaluationFailure::Extraction {
                state,
                source: ExtractError::MissingVirtualMarker,
            })
        };

        Ok(ExchangeTerms::new(
            level(&reference, ChargeState::Reference)?,
            reference.energy,
            minus1.energy,
            level(&plus1, ChargeState::PlusOne)?,
            plus1.energy,
        ))
    }
}

impl<S: ReportSource> Evaluator for ObjectiveEvaluator<S> {
    fn name(&self) -> &str {
        "J² (IP/EA tuning)"
    }

    fn evaluate(&self, w: f64) -> EvaluationOutcome {
        let trial = self.trials.fetch_add(1, Ordering::Relaxed) + 1;
        let start = Instant::now();
        info!("Trial {}: w = {:.4}", trial, w);

        let score = self
            .exchange_terms(w)
            .map(|terms| {
                info!(
                    "Trial {}: J = {:.8}, J^2 = {:.8} ({:.1} s)",
                    trial,
                    terms.j(),
                    terms.score(),
                    start.elapsed().as_secs_f64()
                );
                terms.score()
            })
            .map_err(anyhow::Error::from);
        EvaluationOutcome::from(score)
    }
}
