//! Scenario sequencer
//!
//! Runs steps strictly in declared order against one [`SessionContext`].
//! A step whose prerequisites did not pass is skipped without touching the
//! network. An assertion failure, or a request that cannot be put on the
//! wire, is recorded and the run moves on. A transport failure aborts the run.

use colored::Colorize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::common::{join_url, Config, Error, Result};
use crate::credential::{CredentialExchange, SecondaryTokenStrategy};
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::negotiation::AcceptPolicy;
use crate::session::{ContextUpdate, SessionContext};
use crate::validator::{
    self, lookup, parse_body, CheckFailure, ExpectedOutcome, FieldCheck, HeaderCheck,
    HeaderPredicate,
};

use super::config::{BodySpec, Expectation, Extraction, RequestSpec, Scenario, Step, StepAction};
use super::fixtures::{Fixtures, RandomFixtures};
use super::report::{print_step, RunReport, RunState, StepOutcome, StepResult};
use super::template::TemplateScope;

/// Executes scenarios against a transport
pub struct Sequencer {
    transport: Arc<dyn Transport>,
    config: Config,
    exchange: CredentialExchange,
    policy: AcceptPolicy,
    fixtures: Arc<dyn Fixtures>,
    print: bool,
    verbose: bool,
}

impl Sequencer {
    pub fn new(transport: Arc<dyn Transport>, config: Config) -> Self {
        let exchange = CredentialExchange::new(&config.target, &config.credentials);
        Self {
            transport,
            config,
            exchange,
            policy: AcceptPolicy::default(),
            fixtures: Arc::new(RandomFixtures),
            print: false,
            verbose: false,
        }
    }

    /// Replace the fixture generator
    pub fn with_fixtures(mut self, fixtures: Arc<dyn Fixtures>) -> Self {
        self.fixtures = fixtures;
        self
    }

    /// Replace the expected content-negotiation policy
    pub fn with_accept_policy(mut self, policy: AcceptPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Print step lines to stdout while running
    pub fn with_output(mut self, print: bool, verbose: bool) -> Self {
        self.print = print;
        self.verbose = verbose;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bootstrap a fresh session and run the scenario on it
    ///
    /// Fails only if no session could be obtained; everything after that is
    /// reported in the returned [`RunReport`].
    pub async fn run(&self, scenario: &Scenario) -> Result<RunReport> {
        scenario.validate()?;
        let ctx = SessionContext::bootstrap(self.transport.as_ref(), &self.config.target).await?;
        Ok(self.run_with_session(scenario, ctx).await)
    }

    /// Run the scenario on an already initialised session
    #[tracing::instrument(skip_all, fields(scenario = %scenario.name))]
    pub async fn run_with_session(&self, scenario: &Scenario, mut ctx: SessionContext) -> RunReport {
        let mut report = RunReport::new(scenario.name.clone());
        let mut passed: HashSet<&str> = HashSet::new();

        if self.print {
            println!("\n{} {}", "Running Scenario:".blue().bold(), scenario.name.white().bold());
            if let Some(desc) = &scenario.description {
                println!("  {}", desc.dimmed());
            }
            println!("\n{}", "Steps:".cyan());
        }

        for (i, step) in scenario.steps.iter().enumerate() {
            report.state = RunState::Running { step: i };
            let started = Instant::now();

            let unmet = step.depends_on.iter().find(|d| !passed.contains(d.as_str()));
            let mut abort = None;

            let outcome = match unmet {
                Some(dep) => StepOutcome::Skipped {
                    reason: Error::unmet_dependency(
                        &step.id,
                        format!("prerequisite step '{}' did not pass", dep),
                    )
                    .to_string(),
                },
                None => match self.run_step(step, &mut ctx).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_fatal() => {
                        tracing::error!(step = %step.id, error = %e, "aborting run");
                        let message = e.to_string();
                        abort = Some(message.clone());
                        StepOutcome::failed(CheckFailure::Step { message })
                    }
                    Err(e @ Error::UnmetDependency { .. }) => StepOutcome::Skipped {
                        reason: e.to_string(),
                    },
                    Err(e) => StepOutcome::failed(CheckFailure::Step {
                        message: e.to_string(),
                    }),
                },
            };

            match &outcome {
                StepOutcome::Passed => {
                    passed.insert(step.id.as_str());
                    tracing::info!(step = %step.id, "step passed");
                }
                StepOutcome::Failed { failures } => {
                    tracing::warn!(step = %step.id, failures = failures.len(), "step failed");
                }
                StepOutcome::Skipped { reason } => {
                    tracing::warn!(step = %step.id, reason = %reason, "step skipped");
                }
            }

            let result = StepResult {
                id: step.id.clone(),
                description: step.description.clone(),
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            if self.print {
                print_step(i, &result, self.verbose);
            }
            report.steps.push(result);

            if let Some(reason) = abort {
                for rest in &scenario.steps[i + 1..] {
                    report.steps.push(StepResult {
                        id: rest.id.clone(),
                        description: rest.description.clone(),
                        outcome: StepOutcome::Skipped {
                            reason: "run aborted".to_string(),
                        },
                        duration_ms: 0,
                    });
                }
                report.state = RunState::Aborted { reason };
                if self.print {
                    report.print_summary();
                }
                return report;
            }
        }

        report.state = RunState::Completed;
        if self.print {
            report.print_summary();
        }
        report
    }

    /// Run a single step, applying its extractions to `ctx` on success
    pub async fn run_step(&self, step: &Step, ctx: &mut SessionContext) -> Result<StepOutcome> {
        tracing::debug!(step = %step.id, "running step");
        match &step.action {
            StepAction::Request {
                request,
                expect,
                extract,
                repeat,
            } => {
                for iteration in 0..*repeat {
                    let (response, expected) =
                        self.exchange_once(&step.id, request, expect, ctx, None).await?;
                    let result = validator::validate(&response, &expected)?;

                    if !result.is_success() {
                        let failures = if *repeat > 1 {
                            result
                                .failures
                                .into_iter()
                                .map(|f| CheckFailure::Step {
                                    message: format!("repetition {}: {}", iteration + 1, f),
                                })
                                .collect()
                        } else {
                            result.failures
                        };
                        return Ok(StepOutcome::Failed { failures });
                    }

                    let update = extract_update(extract, &response)?;
                    ctx.apply(update);
                }
                Ok(StepOutcome::Passed)
            }

            StepAction::Exchange {
                credentials,
                expect_failure,
            } => {
                let exchange = match credentials {
                    Some(c) => self.exchange.with_credentials(c.clone()),
                    None => self.exchange.clone(),
                };
                match exchange.exchange(self.transport.as_ref(), ctx.session_token()).await {
                    Ok(token) if !expect_failure => {
                        ctx.apply(ContextUpdate::secondary_token(token.0));
                        Ok(StepOutcome::Passed)
                    }
                    Ok(_) => Ok(StepOutcome::failed(CheckFailure::Step {
                        message: format!(
                            "expected credential exchange at '{}' to be rejected, but it succeeded",
                            exchange.url()
                        ),
                    })),
                    Err(Error::CredentialExchange { status, .. }) if *expect_failure => {
                        tracing::debug!(status, "credential exchange rejected as expected");
                        Ok(StepOutcome::Passed)
                    }
                    Err(e) => Err(e),
                }
            }

            StepAction::ForEach {
                items,
                request,
                expect,
            } => {
                let list = ctx
                    .last_payload()
                    .and_then(|p| lookup(p, items))
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| {
                        Error::unmet_dependency(
                            &step.id,
                            format!("stored payload has no array at '{}'", items),
                        )
                    })?;

                let mut failures = Vec::new();
                for (index, item) in list.iter().enumerate() {
                    let (response, expected) = self
                        .exchange_once(&step.id, request, expect, ctx, Some(item))
                        .await?;
                    let result = validator::validate(&response, &expected)?;
                    failures.extend(result.failures.into_iter().map(|f| CheckFailure::Step {
                        message: format!("item {}: {}", index, f),
                    }));
                }
                Ok(StepOutcome::from_failures(failures))
            }
        }
    }

    /// Build, send, and resolve the expectation for one request
    async fn exchange_once(
        &self,
        step_id: &str,
        spec: &RequestSpec,
        expect: &Expectation,
        ctx: &mut SessionContext,
        item: Option<&Value>,
    ) -> Result<(HttpResponse, ExpectedOutcome)> {
        self.ensure_secondary_token(spec, expect, ctx).await?;

        let scope = TemplateScope::new(step_id, ctx, item, self.fixtures.as_ref());
        let request = self.build_request(spec, &scope, ctx)?;
        let accept = request.header("accept").map(str::to_string);
        let expected = self.resolve_expectation(expect, &scope, ctx, accept.as_deref())?;

        tracing::debug!(
            step = step_id,
            method = %request.method,
            url = %request.url,
            "sending request"
        );
        let response = self.transport.send(request).await?;
        Ok((response, expected))
    }

    async fn ensure_secondary_token(
        &self,
        spec: &RequestSpec,
        expect: &Expectation,
        ctx: &mut SessionContext,
    ) -> Result<()> {
        if !spec.needs_secondary_token() && !expect.needs_secondary_token() {
            return Ok(());
        }
        let strategy: SecondaryTokenStrategy = self.config.session.secondary_token;
        if strategy.needs_exchange(ctx.secondary_token()) {
            let token = self
                .exchange
                .exchange(self.transport.as_ref(), ctx.session_token())
                .await?;
            ctx.apply(ContextUpdate::secondary_token(token.0));
        }
        Ok(())
    }

    fn build_request(
        &self,
        spec: &RequestSpec,
        scope: &TemplateScope<'_>,
        ctx: &SessionContext,
    ) -> Result<HttpRequest> {
        let path = scope.render(&spec.path)?;
        let mut request = HttpRequest::new(&spec.method, join_url(&self.config.target.base_url, &path))
            .with_header(self.config.target.session_header.clone(), ctx.session_token());

        if let Some(accept) = &spec.accept {
            request.set_header("Accept", scope.render(accept)?);
        }
        if let Some(creds) = &spec.basic_auth {
            request.set_header("Authorization", creds.header_value());
        }

        let (body, content_type) = match &spec.body {
            None => (None, None),
            Some(BodySpec::Json(value)) => (
                Some(serde_json::to_string(&scope.render_value(value)?)?),
                Some("application/json".to_string()),
            ),
            Some(BodySpec::Raw { text, content_type }) => {
                (Some(scope.render(text)?), Some(content_type.clone()))
            }
            Some(BodySpec::Payload) => {
                let payload = scope.render_value(&Value::String("{{payload}}".to_string()))?;
                (
                    Some(serde_json::to_string(&payload)?),
                    Some("application/json".to_string()),
                )
            }
        };
        if let Some(ct) = content_type {
            request.set_header("Content-Type", ct);
        }

        // Explicit headers last so a scenario can override anything above
        for (name, value) in &spec.headers {
            request.set_header(name.clone(), scope.render(value)?);
        }

        request.body = body;
        request.wire_parts()?;
        Ok(request)
    }

    fn resolve_expectation(
        &self,
        expect: &Expectation,
        scope: &TemplateScope<'_>,
        ctx: &SessionContext,
        accept: Option<&str>,
    ) -> Result<ExpectedOutcome> {
        let mut outcome = expect.outcome();

        for predicate in &mut outcome.headers {
            if let HeaderCheck::Equals(value) = &mut predicate.check {
                *value = scope.render(value)?;
            }
        }
        if let Some(fields) = &mut outcome.body {
            for field in fields {
                if let FieldCheck::Equals(value) = &mut field.check {
                    *value = scope.render_value(value)?;
                }
            }
        }

        let session_header = &self.config.target.session_header;
        if self.config.session.echo_session_header
            && !outcome
                .headers
                .iter()
                .any(|h| h.name.eq_ignore_ascii_case(session_header))
        {
            outcome.headers.insert(
                0,
                HeaderPredicate::equals(session_header.clone(), ctx.session_token()),
            );
        }

        if expect.negotiate {
            outcome = validator::negotiated(outcome, &self.policy, accept);
        }
        Ok(outcome)
    }
}

/// Derive the context update declared by a step's extractions
fn extract_update(extractions: &[Extraction], response: &HttpResponse) -> Result<ContextUpdate> {
    let mut update = ContextUpdate::default();
    if extractions.is_empty() {
        return Ok(update);
    }

    let needs_body = extractions
        .iter()
        .any(|e| !matches!(e, Extraction::SecondaryToken { .. }));
    let body = if needs_body {
        Some(parse_body(response)?)
    } else {
        None
    };

    for extraction in extractions {
        match (extraction, &body) {
            (Extraction::ResourceId { field, into }, Some(body)) => {
                let id = match lookup(body, field) {
                    Some(Value::String(s)) if !s.is_empty() => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => {
                        return Err(Error::MalformedResponse(format!(
                            "response has no usable '{}' field for resource id '{}'",
                            field, into
                        )))
                    }
                };
                update.merge(ContextUpdate::resource_id(into.clone(), id));
            }
            (Extraction::SecondaryToken { header }, _) => {
                let token = response
                    .header(header)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        Error::MalformedResponse(format!("response has no '{}' header", header))
                    })?;
                update.merge(ContextUpdate::secondary_token(token));
            }
            (Extraction::Payload, Some(body)) => {
                update.merge(ContextUpdate::payload(body.clone()));
            }
            (_, None) => {}
        }
    }
    Ok(update)
}
