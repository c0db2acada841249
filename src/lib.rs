pub mod analysis {
    pub mod history;
}
pub mod core {
    pub mod config;
    pub mod domain;
}
pub mod engine {
    pub mod evaluator;
    pub mod extract;
    pub mod objective;
    pub mod external {
        pub mod process;
    }
}
pub mod logging;
pub mod solvers;
pub mod tuning;

pub use crate::core::domain::{iop_keyword, ChargeState, SearchInterval, Tolerance};
pub use crate::engine::evaluator::{EvaluationOutcome, Evaluator};
pub use crate::solvers::brent::{minimize, Minimum, SearchError};
pub use crate::tuning::{tune, TuningRun};
