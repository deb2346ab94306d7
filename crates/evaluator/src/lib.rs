pub mod lifecycle;
pub mod parallel;

pub use lifecycle::{EvaluationResult, Evaluator, StepEvent};
pub use parallel::evaluate_parallel;
