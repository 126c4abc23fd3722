//! Invoice-inventory orchestration

pub mod adjustment;
pub mod orchestrator;

pub use adjustment::*;
pub use orchestrator::*;
