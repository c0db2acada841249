use serde::{Deserialize, Serialize};

/// How a trial point was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// The caller's initial guess.
    Initial,
    /// Fixed-ratio reduction into the larger sub-interval.
    Golden,
    /// Vertex of the parabola through the three best points.
    Parabolic,
}

/// Indicates whether the search converged or hit the iteration limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// The bracket shrank below the tolerance width around the best point.
    Converged,
    /// The iteration budget ran out first. The best point is still reported.
    NotConverged,
}

/// Statistics for a single evaluated trial.
/// Used for telemetry and run reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialStats {
    /// 0 for the initial guess, then one per search iteration.
    pub iteration: usize,
    pub x: f64,
    pub score: f64,
    pub step: StepKind,
    /// Bracket after this trial was absorbed.
    pub bracket: (f64, f64),
    /// Seconds since the search started.
    pub elapsed_secs: f64,
}

/// Events emitted by solvers to an observer.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverEvent {
    /// A trial was evaluated and absorbed into the search state.
    Evaluated(TrialStats),

    /// The trial became the best point so far.
    NewBest { iteration: usize, x: f64, score: f64 },

    /// The evaluator failed; the search stops.
    Failed { x: f64, reason: String },

    /// Solver has finished its run.
    Finished { status: Status, x: f64 },
}

pub mod brent;
