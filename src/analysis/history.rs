use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::domain::iop_keyword;
use crate::solvers::{SolverEvent, Status, TrialStats};

/// Serializable record of one tuning run, built from solver events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub evaluator: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// `None` while running or after a failed evaluation.
    pub status: Option<Status>,
    pub best_x: Option<f64>,
    pub best_score: Option<f64>,

    /// Route keyword for the converged `w`.
    pub keyword: Option<String>,

    /// Set when the run stopped on an evaluation failure.
    pub failure: Option<String>,

    pub trials: Vec<TrialStats>,
}

impl RunSummary {
    pub fn new(evaluator: &str) -> Self {
        Self {
            evaluator: evaluator.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: None,
            best_x: None,
            best_score: None,
            keyword: None,
            failure: None,
            trials: Vec::new(),
        }
    }

    pub fn ingest(&mut self, event: SolverEvent) {
        match event {
            SolverEvent::Evaluated(stats) => self.trials.push(stats),
            SolverEvent::NewBest { x, score, .. } => {
                self.best_x = Some(x);
                self.best_score = Some(score);
            }
            SolverEvent::Failed { x, reason } => {
                self.failure = Some(format!("w = {x:.4}: {reason}"));
                self.finished_at = Some(Utc::now());
            }
            SolverEvent::Finished { status, x } => {
                self.status = Some(status);
                self.best_x = Some(x);
                if status == Status::Converged {
                    self.keyword = Some(iop_keyword(x));
                }
                self.finished_at = Some(Utc::now());
            }
        }
    }

    /// Drains every event currently queued.
    pub fn ingest_all<I: IntoIterator<Item = SolverEvent>>(&mut self, events: I) {
        for event in events {
            self.ingest(event);
        }
    }

    pub fn is_converged(&self) -> bool {
        self.status == Some(Status::Converged)
    }

    /// Wall time in seconds between start and finish, if finished.
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize run summary")
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}
