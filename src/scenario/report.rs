//! Run reports

use colored::Colorize;
use serde::Serialize;

use crate::validator::CheckFailure;

/// Lifecycle of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Running { step: usize },
    Completed,
    /// A transport failure ended the run early
    Aborted { reason: String },
}

/// Verdict for a single step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed { failures: Vec<CheckFailure> },
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn failed(failure: CheckFailure) -> Self {
        Self::Failed {
            failures: vec![failure],
        }
    }

    pub fn from_failures(failures: Vec<CheckFailure>) -> Self {
        if failures.is_empty() {
            Self::Passed
        } else {
            Self::Failed { failures }
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Result of one step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

/// Ordered per-step outcomes of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: String,
    #[serde(flatten)]
    pub state: RunState,
    pub steps: Vec<StepResult>,
}

/// Passed/failed/skipped tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunReport {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            state: RunState::Initializing,
            steps: Vec::new(),
        }
    }

    /// A run passes only if it completed and every step passed
    pub fn passed(&self) -> bool {
        self.state == RunState::Completed && self.steps.iter().all(|s| s.outcome.is_passed())
    }

    pub fn counts(&self) -> Counts {
        self.steps.iter().fold(Counts::default(), |mut c, s| {
            match s.outcome {
                StepOutcome::Passed => c.passed += 1,
                StepOutcome::Failed { .. } => c.failed += 1,
                StepOutcome::Skipped { .. } => c.skipped += 1,
            }
            c
        })
    }

    pub fn step(&self, id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn print_summary(&self) {
        let counts = self.counts();
        let tally = format!(
            "{} passed, {} failed, {} skipped",
            counts.passed, counts.failed, counts.skipped
        );

        if let RunState::Aborted { reason } = &self.state {
            println!("\n{} {}", "Run aborted:".red().bold(), reason);
        }

        if self.passed() {
            println!("\n{} {} ({})\n", "✓".green().bold(), "Scenario Passed".green().bold(), tally);
        } else {
            println!("\n{} {} ({})\n", "✗".red().bold(), "Scenario Failed".red().bold(), tally);
        }
    }
}

/// Print one step line (and its failures) as the run progresses
pub fn print_step(index: usize, result: &StepResult, verbose: bool) {
    let label = result.description.as_deref().unwrap_or(&result.id);
    match &result.outcome {
        StepOutcome::Passed => {
            if verbose {
                println!(
                    "  {} Step {}: {} {}",
                    "✓".green(),
                    index + 1,
                    label.dimmed(),
                    format!("({} ms)", result.duration_ms).dimmed()
                );
            } else {
                println!("  {} Step {}: {}", "✓".green(), index + 1, label.dimmed());
            }
        }
        StepOutcome::Failed { failures } => {
            println!("  {} Step {}: {}", "✗".red(), index + 1, label);
            for failure in failures {
                println!("      {}", failure.to_string().red());
            }
        }
        StepOutcome::Skipped { reason } => {
            println!(
                "  {} Step {}: {} {}",
                "-".yellow(),
                index + 1,
                label.dimmed(),
                format!("(skipped: {})", reason).yellow()
            );
        }
    }
}
