pub mod evaluator;
pub mod functions;
