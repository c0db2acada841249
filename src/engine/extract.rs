//! Reads energies out of a quantum-chemistry text report.
//!
//! Two quantities are needed per report: the total SCF energy, printed on a
//! line like `SCF Done:  E(RwB97XD) =  -75.1234567  A.U. after 12 cycles`,
//! and the highest occupied orbital energy, which is the last eigenvalue on
//! the line just before the first `Alpha virt.` line.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const ENERGY_MARKER: &str = "SCF Done";
pub const VIRTUAL_MARKER: &str = "Alpha virt.";

/// Failure to read a required field from a report.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    #[error("no \"SCF Done\" line in report")]
    MissingEnergy,

    #[error("cannot read energy from line {line:?}")]
    MalformedEnergy { line: String },

    #[error("no \"Alpha virt.\" line in report")]
    MissingVirtualMarker,

    #[error("occupied eigenvalue block is truncated before \"Alpha virt.\"")]
    TruncatedOccupiedBlock,

    #[error("cannot read orbital energy from token {token:?}")]
    MalformedLevel { token: String },
}

fn energy_field() -> &'static Regex {
    static FIELD: OnceLock<Regex> = OnceLock::new();
    FIELD.get_or_init(|| {
        Regex::new(r"^\s*(-?(?:\d+\.?\d*|\.\d+)(?:[eEdD][-+]?\d+)?)")
            .expect("energy field pattern is valid")
    })
}

/// Parses a float, accepting Fortran `D` exponents.
fn parse_float(token: &str) -> Option<f64> {
    token.replace(['D', 'd'], "E").parse::<f64>().ok()
}

/// Returns the total energy from the last `SCF Done` line.
///
/// The value is the number right after the line's first `=`.
pub fn extract_energy(report: &str) -> Result<f64, ExtractError> {
    let line = report
        .lines()
        .rev()
        .find(|line| line.contains(ENERGY_MARKER))
        .ok_or(ExtractError::MissingEnergy)?;

    let malformed = || ExtractError::MalformedEnergy {
        line: line.trim().to_string(),
    };

    let (_, value) = line.split_once('=').ok_or_else(malformed)?;
    let caps = energy_field().captures(value).ok_or_else(malformed)?;
    parse_float(&caps[1]).ok_or_else(malformed)
}

/// Returns the highest occupied orbital energy.
///
/// The value is the last token of the line right before the first
/// `Alpha virt.` line. At least two lines must precede the marker: the
/// eigenvalue block always starts with a header, so a single line means the
/// report was cut short.
pub fn extract_level(report: &str) -> Result<f64, ExtractError> {
    let lines: Vec<&str> = report.lines().collect();
    let marker = lines
        .iter()
        .position(|line| line.contains(VIRTUAL_MARKER))
        .ok_or(ExtractError::MissingVirtualMarker)?;

    if marker < 2 {
        return Err(ExtractError::TruncatedOccupiedBlock);
    }

    let token = lines[marker - 1]
        .split_whitespace()
        .last()
        .ok_or(ExtractError::TruncatedOccupiedBlock)?;

    parse_float(token).ok_or_else(|| ExtractError::MalformedLevel {
        token: token.to_string(),
    })
}

/// Fields read from one report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportFields {
    pub energy: f64,
    pub level: Option<f64>,
}

impl ReportFields {
    /// Extracts the energy and, when `with_level` is set, the occupied level.
    pub fn extract(report: &str, with_level: bool) -> Result<Self, ExtractError> {
        let energy = extract_energy(report)?;
        let level = if with_level {
            Some(extract_level(report)?)
        } else {
            None
        };
        Ok(Self { energy, level })
    }
}
