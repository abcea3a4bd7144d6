pub mod error;
pub mod eval;
pub mod metrics;
pub mod progress;
