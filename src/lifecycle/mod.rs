//! Signal lifecycle: status derivation, target settlement, and scoring.
//!
//! - [`derive_status`] is the only place status is computed from time.
//! - [`LifecycleEvaluator`] applies it to signals and settles targets on close.
//! - [`LifecycleScheduler`] runs the evaluator periodically and persists results.

mod evaluator;
mod oracle;
mod scheduler;
mod status;

pub use evaluator::{ClosureOutcome, EvaluationReport, LifecycleEvaluator, Transition};
pub use oracle::{FixedOutcomes, PriceObserver, PricePoint, PriceSeriesOracle, TouchOracle};
pub use scheduler::{LifecycleScheduler, PendingWrite, TickOutcome, fetch_all_signals};
pub use status::derive_status;
