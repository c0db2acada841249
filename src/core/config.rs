use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::domain::{SearchInterval, Tolerance};

// --- Limits ---
pub const MIN_W: f64 = 1e-4;
pub const MAX_W: f64 = 10.0;
pub const MIN_TOLERANCE: f64 = 1e-4;

/// Rejected tuning parameters.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("minimal acceptable w is 0.0001, but got {0}")]
    LowTooSmall(f64),

    #[error("maximum acceptable w is 10, but got {0}")]
    HighTooLarge(f64),

    #[error("higher limit of w ({high}) must be greater than lower limit ({low})")]
    EmptyInterval { low: f64, high: f64 },

    #[error("initial guess of w ({guess}) must lie in [{low}, {high}]")]
    GuessOutOfRange { guess: f64, low: f64, high: f64 },

    #[error("minimum acceptable tolerance of w is 0.0001, but got {0}")]
    ToleranceTooSmall(f64),
}

/// How to launch the external program that produces one report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessConfig {
    /// Executable path, used verbatim.
    pub program: PathBuf,

    /// Arguments passed verbatim to every invocation.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the child process.
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Attempts per sub-evaluation before it is reported as failed.
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl ProcessConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            max_attempts: default_attempts(),
        }
    }
}

/// Parameters of one tuning run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TuningConfig {
    pub low: f64,
    pub high: f64,
    /// Defaults to the midpoint of `[low, high]`.
    pub guess: Option<f64>,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub process: Option<ProcessConfig>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            low: 0.05,
            high: 0.6,
            guess: None,
            tolerance: 1e-4,
            max_iterations: 100,
            process: None,
        }
    }
}

impl TuningConfig {
    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the limits the tuner accepts for `w` and its tolerance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.low >= MIN_W) {
            return Err(ConfigError::LowTooSmall(self.low));
        }
        if !(self.high <= MAX_W) {
            return Err(ConfigError::HighTooLarge(self.high));
        }
        if self.high <= self.low {
            return Err(ConfigError::EmptyInterval {
                low: self.low,
                high: self.high,
            });
        }
        let guess = self.guess();
        if !(self.low..=self.high).contains(&guess) {
            return Err(ConfigError::GuessOutOfRange {
                guess,
                low: self.low,
                high: self.high,
            });
        }
        if !(self.tolerance >= MIN_TOLERANCE) {
            return Err(ConfigError::ToleranceTooSmall(self.tolerance));
        }
        Ok(())
    }

    pub fn guess(&self) -> f64 {
        self.guess.unwrap_or(0.5 * (self.low + self.high))
    }

    pub fn interval(&self) -> SearchInterval {
        SearchInterval::new(self.low, self.high, self.guess())
    }

    pub fn search_tolerance(&self) -> Tolerance {
        Tolerance::new(self.tolerance)
    }
}
