//! Brent's derivative-free minimizer on a bracketed interval.
//!
//! # Algorithm
//!
//! The search keeps a bracket `[low, high]` and the three best points seen so
//! far (`x` best, `w` second, `v` third). Each iteration tries to jump to the
//! vertex of the parabola through them. If the vertex is outside the bracket,
//! or the step is not at least twice as small as the step before last, it
//! falls back to a golden-section step into the larger sub-interval. No
//! point closer than the tolerance width to `x` or to the bracket ends is
//! evaluated.
//!
//! The search stops when `|x - mid| <= 2*tol1 - (high - low)/2`, where
//! `tol1 = sqrt(eps)*|x| + absolute`.
//!
//! # Evaluations
//!
//! The initial guess is evaluated once before the first iteration; every
//! iteration then evaluates exactly one point. With `max_iterations == 0`
//! nothing is evaluated and the guess is returned as `NotConverged`.

use std::time::Instant;

use crossbeam_channel::Sender;
use log::{debug, info, warn};
use thiserror::Error;

use crate::core::domain::{SearchInterval, Tolerance};
use crate::engine::evaluator::{EvaluationOutcome, Evaluator};
use crate::solvers::{SolverEvent, Status, StepKind, TrialStats};

/// `(3 - sqrt(5)) / 2`
const GOLDEN: f64 = 0.381_966_011_250_105_1;

/// Errors that end a search without a result.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search arguments: {0}")]
    InvalidArguments(String),

    #[error("evaluation failed at x = {x}: {reason:#}")]
    EvaluationFailed { x: f64, reason: anyhow::Error },
}

/// The result of a search that ran to completion or to its budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub status: Status,

    /// Best estimate of the minimizer.
    pub x: f64,

    /// Objective at `x`. `None` only when nothing was evaluated.
    pub score: Option<f64>,

    pub iterations: usize,

    pub evaluations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f64,
    score: f64,
}

/// Mutable state of one search run.
#[derive(Debug, Clone)]
struct SearchState {
    low: f64,
    high: f64,
    /// Best point (`x`).
    best: Point,
    /// Second best point (`w`).
    second: Point,
    /// Third best point (`v`).
    third: Point,
    /// Most recent step (`d`).
    step: f64,
    /// Step before `step` (`e`).
    prev_step: f64,
}

impl SearchState {
    fn new(interval: &SearchInterval, first: Point) -> Self {
        Self {
            low: interval.low,
            high: interval.high,
            best: first,
            second: first,
            third: first,
            step: 0.0,
            prev_step: 0.0,
        }
    }

    fn midpoint(&self) -> f64 {
        0.5 * (self.low + self.high)
    }

    fn is_converged(&self, tolerance: &Tolerance) -> bool {
        let tol1 = tolerance.width_at(self.best.x);
        (self.best.x - self.midpoint()).abs() <= 2.0 * tol1 - 0.5 * (self.high - self.low)
    }

    /// Chooses the next trial point and records the step taken.
    fn propose(&mut self, tolerance: &Tolerance) -> (f64, StepKind) {
        let x = self.best.x;
        let fx = self.best.score;
        let mid = self.midpoint();
        let tol1 = tolerance.width_at(x);
        let tol2 = 2.0 * tol1;

        let (mut p, mut q, mut r) = (0.0, 0.0, 0.0);
        if self.prev_step.abs() > tol1 {
            let Point { x: w, score: fw } = self.second;
            let Point { x: v, score: fv } = self.third;
            r = (x - w) * (fx - fv);
            q = (x - v) * (fx - fw);
            p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            } else {
                q = -q;
            }
            r = self.prev_step;
            self.prev_step = self.step;
        }

        // Flat or degenerate fits (q == 0) always take the golden step.
        let kind = if q == 0.0
            || p.abs() >= (0.5 * q * r).abs()
            || p <= q * (self.low - x)
            || p >= q * (self.high - x)
        {
            self.prev_step = if x < mid { self.high - x } else { self.low - x };
            self.step = GOLDEN * self.prev_step;
            StepKind::Golden
        } else {
            self.step = p / q;
            let u = x + self.step;
            if u - self.low < tol2 || self.high - u < tol2 {
                self.step = if x < mid { tol1 } else { -tol1 };
            }
            StepKind::Parabolic
        };

        let u = if self.step.abs() >= tol1 {
            x + self.step
        } else if self.step > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        (u, kind)
    }

    /// Absorbs an evaluated point. Returns true if it became the best.
    fn update(&mut self, trial: Point) -> bool {
        let x = self.best.x;

        if trial.score <= self.best.score {
            if trial.x < x {
                self.high = x;
            } else {
                self.low = x;
            }
            self.third = self.second;
            self.second = self.best;
            self.best = trial;
            return true;
        }

        if trial.x < x {
            self.low = trial.x;
        } else {
            self.high = trial.x;
        }
        if trial.score <= self.second.score || self.second.x == x {
            self.third = self.second;
            self.second = trial;
        } else if trial.score <= self.third.score
            || self.third.x == x
            || self.third.x == self.second.x
        {
            self.third = trial;
        }
        false
    }
}

/// Finds the minimum of the objective on `interval` using Brent's method.
///
/// # Errors
///
/// Returns [`SearchError::InvalidArguments`] before any evaluation if the
/// interval is empty, non-finite, or does not contain its guess, or if the
/// absolute tolerance is negative. Returns [`SearchError::EvaluationFailed`]
/// as soon as the evaluator reports a failure.
pub fn minimize<E>(
    interval: SearchInterval,
    tolerance: Tolerance,
    max_iterations: usize,
    evaluator: &E,
) -> Result<Minimum, SearchError>
where
    E: Evaluator + ?Sized,
{
    search(interval, tolerance, max_iterations, evaluator, None)
}

/// Same as [`minimize`], reporting progress as [`SolverEvent`]s on `tx`.
///
/// Send errors (a dropped receiver) are ignored.
///
/// # Errors
///
/// See [`minimize`].
pub fn minimize_observed<E>(
    interval: SearchInterval,
    tolerance: Tolerance,
    max_iterations: usize,
    evaluator: &E,
    tx: &Sender<SolverEvent>,
) -> Result<Minimum, SearchError>
where
    E: Evaluator + ?Sized,
{
    search(interval, tolerance, max_iterations, evaluator, Some(tx))
}

fn search<E>(
    interval: SearchInterval,
    tolerance: Tolerance,
    max_iterations: usize,
    evaluator: &E,
    tx: Option<&Sender<SolverEvent>>,
) -> Result<Minimum, SearchError>
where
    E: Evaluator + ?Sized,
{
    let emit = |event: SolverEvent| {
        if let Some(tx) = tx {
            let _ = tx.send(event);
        }
    };

    if !interval.is_valid() {
        return Err(SearchError::InvalidArguments(format!(
            "need finite low < high with low <= guess <= high, got [{}, {}] guess {}",
            interval.low, interval.high, interval.guess
        )));
    }
    if !tolerance.is_valid() {
        return Err(SearchError::InvalidArguments(format!(
            "absolute tolerance must be finite and non-negative, got {}",
            tolerance.absolute()
        )));
    }

    if max_iterations == 0 {
        warn!("Iteration budget is 0; returning the initial guess unevaluated");
        emit(SolverEvent::Finished {
            status: Status::NotConverged,
            x: interval.guess,
        });
        return Ok(Minimum {
            status: Status::NotConverged,
            x: interval.guess,
            score: None,
            iterations: 0,
            evaluations: 0,
        });
    }

    let start = Instant::now();
    info!(
        "Brent search on [{}, {}] from {} with {} ({} iterations max)",
        interval.low,
        interval.high,
        interval.guess,
        evaluator.name(),
        max_iterations
    );

    let evaluate = |x: f64| match evaluator.evaluate(x) {
        EvaluationOutcome::Score(score) => Ok(Point { x, score }),
        EvaluationOutcome::Failure(reason) => {
            emit(SolverEvent::Failed {
                x,
                reason: format!("{reason:#}"),
            });
            Err(SearchError::EvaluationFailed { x, reason })
        }
    };

    let first = evaluate(interval.guess)?;
    let mut state = SearchState::new(&interval, first);
    let mut evaluations = 1;
    emit(SolverEvent::Evaluated(TrialStats {
        iteration: 0,
        x: first.x,
        score: first.score,
        step: StepKind::Initial,
        bracket: (state.low, state.high),
        elapsed_secs: start.elapsed().as_secs_f64(),
    }));
    emit(SolverEvent::NewBest {
        iteration: 0,
        x: first.x,
        score: first.score,
    });

    let mut iterations = 0;
    while !state.is_converged(&tolerance) {
        if iterations == max_iterations {
            break;
        }
        iterations += 1;

        let (u, step) = state.propose(&tolerance);
        let trial = evaluate(u)?;
        evaluations += 1;
        let improved = state.update(trial);

        debug!(
            "Iteration {}: {:?} step to {:.6}, score {:.8e}, bracket [{:.6}, {:.6}]",
            iterations, step, u, trial.score, state.low, state.high
        );
        emit(SolverEvent::Evaluated(TrialStats {
            iteration: iterations,
            x: u,
            score: trial.score,
            step,
            bracket: (state.low, state.high),
            elapsed_secs: start.elapsed().as_secs_f64(),
        }));
        if improved {
            emit(SolverEvent::NewBest {
                iteration: iterations,
                x: u,
                score: trial.score,
            });
        }
    }
    let status = if state.is_converged(&tolerance) {
        Status::Converged
    } else {
        Status::NotConverged
    };

    match status {
        Status::Converged => info!(
            "Converged to x = {:.6} (score {:.8e}) after {} iterations",
            state.best.x, state.best.score, iterations
        ),
        Status::NotConverged => warn!(
            "Did not converge in {} iterations; best x = {:.6}",
            max_iterations, state.best.x
        ),
    }
    emit(SolverEvent::Finished {
        status,
        x: state.best.x,
    });

    Ok(Minimum {
        status,
        x: state.best.x,
        score: Some(state.best.score),
        iterations,
        evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a closure and counts calls.
    struct Counted<F> {
        f: F,
        calls: AtomicUsize,
    }

    impl<F: Fn(f64) -> EvaluationOutcome + Send + Sync> Counted<F> {
        fn new(f: F) -> Self {
            Self { f, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl<F: Fn(f64) -> EvaluationOutcome + Send + Sync> Evaluator for Counted<F> {
        fn evaluate(&self, x: f64) -> EvaluationOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.f)(x)
        }

        fn name(&self) -> &str {
            "counted"
        }
    }

    fn assert_near_minimum(found: f64, expected: f64, tolerance: &Tolerance) {
        let bound = 2.0 * tolerance.width_at(found);
        assert!(
            (found - expected).abs() <= bound,
            "found {found}, expected {expected} within {bound}"
        );
    }

    #[test]
    fn minimizes_quadratic() {
        let f = Counted::new(|x: f64| EvaluationOutcome::Score((x - 0.3).powi(2) + 1.0));
        let tol = Tolerance::new(1e-5);

        let min = minimize(SearchInterval::new(0.0, 1.0, 0.5), tol, 100, &f).unwrap();

        assert_eq!(min.status, Status::Converged);
        assert_near_minimum(min.x, 0.3, &tol);
        assert_eq!(min.evaluations, f.calls());
        assert_eq!(min.evaluations, min.iterations + 1);
        assert!((min.score.unwrap() - 1.0).abs() < 1e-8);
    }

    #[test]
    fn minimizes_non_quadratic() {
        // x - ln(x) has its minimum at x = 1.
        let f = Counted::new(|x: f64| EvaluationOutcome::Score(x - x.ln()));
        let tol = Tolerance::new(1e-6);

        let min = minimize(SearchInterval::centered(0.5, 3.0), tol, 100, &f).unwrap();

        assert_eq!(min.status, Status::Converged);
        assert_near_minimum(min.x, 1.0, &tol);
    }

    #[test]
    fn minimizes_large_magnitude_minimum() {
        // Relative part of the tolerance dominates here.
        let f = Counted::new(|x: f64| {
            let dx = x - 1.0e6;
            EvaluationOutcome::Score(dx.powi(4) + dx.powi(2))
        });
        let tol = Tolerance::new(0.0);

        let min = minimize(SearchInterval::new(0.9e6, 1.2e6, 1.1e6), tol, 200, &f).unwrap();

        assert_eq!(min.status, Status::Converged);
        assert_near_minimum(min.x, 1.0e6, &tol);
    }

    #[test]
    fn invalid_interval_makes_no_calls() {
        let f = Counted::new(|x: f64| EvaluationOutcome::Score(x));
        let tol = Tolerance::new(1e-4);

        for interval in [
            SearchInterval::new(1.0, 1.0, 1.0),
            SearchInterval::new(2.0, 1.0, 1.5),
            SearchInterval::new(0.0, 1.0, 2.0),
            SearchInterval::new(0.0, f64::INFINITY, 1.0),
        ] {
            let err = minimize(interval, tol, 100, &f).unwrap_err();
            assert!(matches!(err, SearchError::InvalidArguments(_)));
        }
        assert_eq!(f.calls(), 0);
    }

    #[test]
    fn negative_tolerance_is_invalid() {
        let f = Counted::new(|x: f64| EvaluationOutcome::Score(x));
        let err = minimize(SearchInterval::centered(0.0, 1.0), Tolerance::new(-1e-3), 100, &f)
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidArguments(_)));
        assert_eq!(f.calls(), 0);
    }

    #[test]
    fn failure_on_first_call_stops_the_search() {
        let f = Counted::new(|_: f64| EvaluationOutcome::Failure(anyhow!("N state job failed")));

        let err = minimize(SearchInterval::new(0.05, 0.6, 0.2), Tolerance::new(1e-4), 100, &f)
            .unwrap_err();

        match err {
            SearchError::EvaluationFailed { x, reason } => {
                assert_eq!(x, 0.2);
                assert_eq!(reason.to_string(), "N state job failed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(f.calls(), 1);
    }

    #[test]
    fn failure_mid_search_is_fatal() {
        let f = Counted::new(|x: f64| {
            if x < 0.4 {
                EvaluationOutcome::Failure(anyhow!("no SCF convergence"))
            } else {
                EvaluationOutcome::Score((x - 0.3).powi(2))
            }
        });

        let err = minimize(SearchInterval::new(0.0, 1.0, 0.5), Tolerance::new(1e-4), 100, &f)
            .unwrap_err();

        assert!(matches!(err, SearchError::EvaluationFailed { x, .. } if x < 0.4));
        assert_eq!(f.calls(), 2);
    }

    #[test]
    fn zero_budget_returns_guess_without_evaluating() {
        let f = Counted::new(|x: f64| EvaluationOutcome::Score(x * x));

        let min = minimize(SearchInterval::new(-1.0, 2.0, 1.5), Tolerance::new(1e-4), 0, &f)
            .unwrap();

        assert_eq!(min.status, Status::NotConverged);
        assert_eq!(min.x, 1.5);
        assert_eq!(min.score, None);
        assert_eq!(min.evaluations, 0);
        assert_eq!(f.calls(), 0);
    }

    #[test]
    fn exhausted_budget_reports_best_point() {
        let f = Counted::new(|x: f64| EvaluationOutcome::Score((x - 0.3).powi(2)));

        let min = minimize(SearchInterval::new(0.0, 1.0, 0.9), Tolerance::new(1e-8), 3, &f)
            .unwrap();

        assert_eq!(min.status, Status::NotConverged);
        assert_eq!(min.iterations, 3);
        assert_eq!(f.calls(), 4);
        // Best of the evaluated points, never worse than the guess.
        assert!(min.score.unwrap() <= (0.9_f64 - 0.3).powi(2));
    }

    #[test]
    fn flat_objective_uses_golden_steps() {
        let f = Counted::new(|_: f64| EvaluationOutcome::Score(1.0));
        let (tx, rx) = unbounded();

        let interval = SearchInterval::centered(0.0, 1.0);
        let min = minimize_observed(interval, Tolerance::new(1e-4), 100, &f, &tx).unwrap();
        drop(tx);

        assert_eq!(min.status, Status::Converged);
        assert!(min.x.is_finite() && (0.0..=1.0).contains(&min.x));
        for event in rx {
            if let SolverEvent::Evaluated(stats) = event {
                assert_ne!(stats.step, StepKind::Parabolic);
            }
        }
    }

    #[test]
    fn parabolic_steps_are_taken_near_smooth_minimum() {
        let f = Counted::new(|x: f64| EvaluationOutcome::Score((x - 0.3).powi(2)));
        let (tx, rx) = unbounded();

        let interval = SearchInterval::new(0.0, 1.0, 0.5);
        minimize_observed(interval, Tolerance::new(1e-6), 100, &f, &tx).unwrap();
        drop(tx);

        let parabolic = rx
            .iter()
            .filter(|e| matches!(e, SolverEvent::Evaluated(s) if s.step == StepKind::Parabolic))
            .count();
        assert!(parabolic > 0);
    }

    #[test]
    fn events_trace_the_run() {
        let f = Counted::new(|x: f64| EvaluationOutcome::Score((x - 0.2).powi(2)));
        let (tx, rx) = unbounded();

        let interval = SearchInterval::centered(0.05, 0.6);
        let min = minimize_observed(interval, Tolerance::new(1e-4), 100, &f, &tx).unwrap();
        drop(tx);

        let events: Vec<SolverEvent> = rx.iter().collect();
        let evaluated: Vec<&TrialStats> = events
            .iter()
            .filter_map(|e| match e {
                SolverEvent::Evaluated(stats) => Some(stats),
                _ => None,
            })
            .collect();

        assert_eq!(evaluated.len(), min.evaluations);
        assert_eq!(evaluated[0].step, StepKind::Initial);
        for stats in &evaluated {
            assert!(stats.bracket.0 <= stats.bracket.1);
            assert!(stats.bracket.0 >= 0.05 && stats.bracket.1 <= 0.6);
        }
        assert_eq!(
            events.last(),
            Some(&SolverEvent::Finished {
                status: Status::Converged,
                x: min.x
            })
        );
    }

    #[test]
    fn repeated_runs_are_identical() {
        let f = Counted::new(|x: f64| EvaluationOutcome::Score((x - 0.42).abs().sqrt()));
        let interval = SearchInterval::centered(0.05, 0.6);
        let tol = Tolerance::new(1e-4);

        let first = minimize(interval, tol, 100, &f).unwrap();
        let second = minimize(interval, tol, 100, &f).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn trial_points_stay_inside_the_bracket() {
        let f = Counted::new(|x: f64| {
            assert!((0.05..=0.6).contains(&x), "evaluated outside bracket: {x}");
            EvaluationOutcome::Score(-x)
        });

        let min = minimize(SearchInterval::centered(0.05, 0.6), Tolerance::new(1e-4), 100, &f)
            .unwrap();

        assert_eq!(min.status, Status::Converged);
        assert!(min.x > 0.59);
    }
}
