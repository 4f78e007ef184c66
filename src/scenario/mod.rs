//! Scenario runner
//!
//! Reads YAML scenarios and drives them step by step against a live API,
//! carrying one session's state from step to step.

mod config;
mod fixtures;
mod report;
mod runner;
pub mod template;

pub use config::*;
pub use fixtures::{Fixtures, RandomFixtures};
pub use report::{print_step, Counts, RunReport, RunState, StepOutcome, StepResult};
pub use runner::Sequencer;
