use crossbeam_channel::unbounded;
use log::{error, info, warn};

use crate::analysis::history::RunSummary;
use crate::core::config::{ConfigError, TuningConfig};
use crate::core::domain::iop_keyword;
use crate::engine::evaluator::Evaluator;
use crate::solvers::brent::{minimize_observed, Minimum, SearchError};
use crate::solvers::Status;

/// Outcome of [`tune`]: the search result plus the record of every trial,
/// kept even when the search failed part way.
#[derive(Debug)]
pub struct TuningRun {
    pub result: Result<Minimum, SearchError>,
    pub summary: RunSummary,
}

/// Minimizes the evaluator's score over `w` using the configured bracket.
///
/// # Errors
///
/// Returns the [`ConfigError`] if the config is outside accepted limits;
/// nothing is evaluated in that case.
pub fn tune<E>(config: &TuningConfig, evaluator: &E) -> Result<TuningRun, ConfigError>
where
    E: Evaluator + ?Sized,
{
    config.validate()?;

    info!("Optimize w (omega) of a range-separated functional");
    info!(
        "Parameters: w_low = {:.4}, w_high = {:.4}, w_guess = {:.4}, w_tolerance = {:.4}",
        config.low,
        config.high,
        config.guess(),
        config.tolerance
    );

    let (tx, rx) = unbounded();
    let mut summary = RunSummary::new(evaluator.name());
    let result = minimize_observed(
        config.interval(),
        config.search_tolerance(),
        config.max_iterations,
        evaluator,
        &tx,
    );
    drop(tx);
    summary.ingest_all(rx.try_iter());

    match &result {
        Ok(min) if min.status == Status::Converged => {
            info!("Minimum value of J^2 encountered when w = {:.4}", min.x);
            info!("Use {} in the route section", iop_keyword(min.x));
        }
        Ok(min) => warn!("w did not converge, the last value is: {:.4}", min.x),
        Err(e) => error!("{e}"),
    }
    if let Some(secs) = summary.elapsed_secs() {
        info!("Total time elapsed: {:.0} s", secs);
    }

    Ok(TuningRun { result, summary })
}
