//! CLI command definitions
//!
//! Defines the clap commands for the challenger CLI and runs them.

use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{Config, Error, Result};
use crate::credential::SecondaryTokenStrategy;
use crate::http::ReqwestTransport;
use crate::scenario::{RunReport, Scenario, Sequencer, StepAction};
use crate::session::SessionContext;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios against the target API (the built-in suite if no files are given)
    Run {
        /// YAML scenario files
        files: Vec<PathBuf>,

        /// Base URL of the API under test
        #[arg(long)]
        base_url: Option<String>,

        /// Reuse an existing session token instead of bootstrapping a new one
        #[arg(long)]
        session: Option<String>,

        /// When to exchange credentials for a secondary token
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Print the run reports as JSON
        #[arg(long)]
        json: bool,

        /// Run the scenario files concurrently, one session each
        #[arg(long)]
        parallel: bool,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,

        /// Also write logs to a file (default: the platform log directory)
        #[arg(long, num_args = 0..=1, value_name = "PATH")]
        log_file: Option<Option<PathBuf>>,
    },

    /// List the steps of a scenario and their dependencies
    List {
        /// YAML scenario file (default: the built-in suite)
        file: Option<PathBuf>,
    },

    /// Load and check a scenario file without running it
    Validate {
        /// YAML scenario file
        file: PathBuf,
    },
}

/// `--strategy` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Exchange before every step that needs the token
    Always,
    /// Exchange once and reuse the token
    Cache,
}

impl From<StrategyArg> for SecondaryTokenStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Always => SecondaryTokenStrategy::AlwaysExchange,
            StrategyArg::Cache => SecondaryTokenStrategy::CacheAndReuse,
        }
    }
}

/// Options for `challenger run`, after logging has been set up
pub struct RunOptions {
    pub files: Vec<PathBuf>,
    pub base_url: Option<String>,
    pub session: Option<String>,
    pub strategy: Option<StrategyArg>,
    pub json: bool,
    pub parallel: bool,
    pub verbose: bool,
}

/// Run scenarios; returns whether every run passed
pub async fn run(config: Config, opts: RunOptions) -> Result<bool> {
    let mut config = config;
    if let Some(url) = opts.base_url {
        config.target.base_url = url;
    }
    if let Some(strategy) = opts.strategy {
        config.session.secondary_token = strategy.into();
    }

    let scenarios = if opts.files.is_empty() {
        vec![Scenario::builtin()?]
    } else {
        opts.files
            .iter()
            .map(|f| Scenario::from_file(f))
            .collect::<Result<Vec<_>>>()?
    };

    check_session_sharing(opts.session.as_deref(), opts.parallel, scenarios.len())?;

    let transport = ReqwestTransport::new(config.target.timeout_secs.map(Duration::from_secs))?;
    // Interleaved step lines from concurrent runs are unreadable; print summaries instead
    let print = !opts.json && !(opts.parallel && scenarios.len() > 1);
    let sequencer = Sequencer::new(Arc::new(transport), config).with_output(print, opts.verbose);
    let session = opts.session.as_deref();

    let reports: Vec<Result<RunReport>> = if opts.parallel {
        join_all(scenarios.iter().map(|s| run_one(&sequencer, s, session))).await
    } else {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in &scenarios {
            reports.push(run_one(&sequencer, scenario, session).await);
        }
        reports
    };

    let mut all_passed = true;
    let mut finished = Vec::with_capacity(reports.len());
    for (scenario, report) in scenarios.iter().zip(reports) {
        match report {
            Ok(report) => {
                all_passed &= report.passed();
                if !print && !opts.json {
                    report.print_summary();
                }
                finished.push(report);
            }
            Err(e) => {
                all_passed = false;
                tracing::error!(scenario = %scenario.name, error = %e, "run did not start");
                eprintln!("{} {}: {}", "Error:".red().bold(), scenario.name, e);
            }
        }
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&finished)?);
    }

    Ok(all_passed)
}

/// A remote session holds server-side state, so concurrent runs must not share one
fn check_session_sharing(session: Option<&str>, parallel: bool, runs: usize) -> Result<()> {
    if session.is_some() && parallel && runs > 1 {
        return Err(Error::Config(
            "--session cannot be combined with --parallel over several scenario files; \
             each concurrent run needs its own session"
                .to_string(),
        ));
    }
    Ok(())
}

async fn run_one(
    sequencer: &Sequencer,
    scenario: &Scenario,
    session: Option<&str>,
) -> Result<RunReport> {
    match session {
        Some(token) => {
            scenario.validate()?;
            let ctx = SessionContext::new(token)?;
            Ok(sequencer.run_with_session(scenario, ctx).await)
        }
        None => sequencer.run(scenario).await,
    }
}

/// Print step ids and their dependencies
pub fn list(file: Option<&Path>) -> Result<()> {
    let scenario = load(file)?;
    println!("{} ({} steps)", scenario.name.bold(), scenario.steps.len());
    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }
    println!();

    for (i, step) in scenario.steps.iter().enumerate() {
        let kind = match &step.action {
            StepAction::Request { request, .. } => format!("{} {}", request.method, request.path),
            StepAction::Exchange { expect_failure, .. } => {
                if *expect_failure {
                    "credential exchange (expect rejection)".to_string()
                } else {
                    "credential exchange".to_string()
                }
            }
            StepAction::ForEach { items, request, .. } => {
                format!("{} {} for each in {}", request.method, request.path, items)
            }
        };
        print!("{:>3}. {} {}", i + 1, step.id.cyan(), kind.dimmed());
        if !step.depends_on.is_empty() {
            print!("  {} {}", "after".yellow(), step.depends_on.join(", "));
        }
        println!();
    }
    Ok(())
}

/// Load and validate only
pub fn validate(file: &Path) -> Result<()> {
    let scenario = Scenario::from_file(file)?;
    println!(
        "{} {} ({} steps)",
        "✓".green().bold(),
        scenario.name,
        scenario.steps.len()
    );
    Ok(())
}

fn load(file: Option<&Path>) -> Result<Scenario> {
    match file {
        Some(path) => Scenario::from_file(path),
        None => Scenario::builtin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_strategy_mapping() {
        assert_eq!(
            SecondaryTokenStrategy::from(StrategyArg::Always),
            SecondaryTokenStrategy::AlwaysExchange
        );
        assert_eq!(
            SecondaryTokenStrategy::from(StrategyArg::Cache),
            SecondaryTokenStrategy::CacheAndReuse
        );
    }

    #[test]
    fn test_shared_session_rejected_for_parallel_runs() {
        let err = check_session_sharing(Some("sess-1"), true, 2).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("--session"));

        assert!(check_session_sharing(Some("sess-1"), true, 1).is_ok());
        assert!(check_session_sharing(Some("sess-1"), false, 3).is_ok());
        assert!(check_session_sharing(None, true, 3).is_ok());
    }

    #[tokio::test]
    async fn test_run_refuses_shared_session_for_parallel_files() {
        let scenario = "name: list\nsteps:\n  - { id: a, action: exchange }\n";
        let mut first = tempfile::NamedTempFile::new().unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        first.write_all(scenario.as_bytes()).unwrap();
        second.write_all(scenario.as_bytes()).unwrap();

        let opts = RunOptions {
            files: vec![first.path().to_path_buf(), second.path().to_path_buf()],
            // Nothing listens here; the check fires before any request
            base_url: Some("http://127.0.0.1:9/".to_string()),
            session: Some("sess-1".to_string()),
            strategy: None,
            json: true,
            parallel: true,
            verbose: false,
        };
        let err = run(Config::default(), opts).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builtin_lists() {
        assert!(list(None).is_ok());
    }

    #[test]
    fn test_validate_missing_file() {
        let err = validate(Path::new("/nonexistent/scenario.yml")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
