#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use omega_tune::core::domain::ChargeState;
use omega_tune::engine::evaluator::{EvaluationOutcome, Evaluator};
use omega_tune::engine::objective::ReportSource;

/// Where the synthetic J² surface has its minimum.
pub const OPTIMAL_W: f64 = 0.25;

/// Quadratic stand-in for the expensive objective.
pub struct MockEvaluator {
    pub minimum: f64,
    calls: AtomicUsize,
}

impl MockEvaluator {
    pub fn new(minimum: f64) -> Self {
        Self { minimum, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Evaluator for MockEvaluator {
    fn evaluate(&self, w: f64) -> EvaluationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        EvaluationOutcome::Score((w - self.minimum).powi(2))
    }

    fn name(&self) -> &str {
        "Mock Evaluator"
    }
}

/// Builds a report in the layout of a Gaussian single-point job.
///
/// Energies are fixed; the occupied levels drift linearly with `w` so that
/// J² = 1.25 * (w - OPTIMAL_W)².
pub fn synthetic_report(state: ChargeState, w: f64) -> String {
    let shift = w - OPTIMAL_W;
    let (energy, level) = match state {
        ChargeState::Reference => (-75.0, -0.35 + shift),
        ChargeState::PlusOne => (-75.35, -0.35 - 0.5 * shift),
        ChargeState::MinusOne => (-74.65, -0.60),
    };

    format!(
        " Entering Link 1\n\
         SCF Done:  E(RwB97XD) =  {:.10}     A.U. after   12 cycles\n\
         **********************************************************************\n\
         Population analysis using the SCF Density.\n\
         Alpha  occ. eigenvalues --  -20.55000  -1.33000  -0.70000\n\
         Alpha  occ. eigenvalues --   -0.55000  {:.10}\n\
         Alpha virt. eigenvalues --    0.10000   0.20000\n\
         Normal termination of Gaussian 16.\n",
        energy, level
    )
}

/// In-memory report source backed by [`synthetic_report`].
pub struct SyntheticReports;

impl ReportSource for SyntheticReports {
    fn report(&self, state: ChargeState, w: f64) -> anyhow::Result<String> {
        Ok(synthetic_report(state, w))
    }
}
