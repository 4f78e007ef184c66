//! Scenario file types
//!
//! Defines the data structures for deserializing YAML scenarios.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::common::{Error, Result};
use crate::credential::BasicCredentials;
use crate::validator::{ExpectedOutcome, FieldCheck, FieldPredicate, HeaderCheck, HeaderPredicate};

use super::template::references_secondary;

/// The suite covering the public API challenge server
const BUILTIN_SUITE: &str = include_str!("../../scenarios/api_challenges.yaml");

/// A complete scenario loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct Scenario {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Steps, executed strictly in this order
    pub steps: Vec<Step>,
}

/// One step of a scenario
#[derive(Deserialize, Debug, Clone)]
pub struct Step {
    /// Unique id, referenced by later steps' `depends_on`
    pub id: String,
    pub description: Option<String>,
    /// Earlier steps that must have passed before this one runs
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub action: StepAction,
}

/// What a step does
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// Send one request (optionally several times) and validate the response
    Request {
        request: RequestSpec,
        expect: Expectation,
        #[serde(default)]
        extract: Vec<Extraction>,
        /// Every repetition must pass
        #[serde(default = "default_repeat")]
        repeat: u32,
    },
    /// Run the credential exchange on its own
    Exchange {
        /// Overrides the configured basic credentials
        credentials: Option<BasicCredentials>,
        /// Pass only if the exchange is rejected
        #[serde(default)]
        expect_failure: bool,
    },
    /// Send one request per element of an array in the stored payload
    ForEach {
        /// Path to the array inside the stored payload
        items: String,
        request: RequestSpec,
        expect: Expectation,
    },
}

fn default_repeat() -> u32 {
    1
}

/// A request with templated fields
#[derive(Deserialize, Debug, Clone)]
pub struct RequestSpec {
    pub method: String,
    /// Path relative to the target base URL
    pub path: String,
    /// `Accept` header; an empty string sends an empty header
    pub accept: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub basic_auth: Option<BasicCredentials>,
    pub body: Option<BodySpec>,
}

impl RequestSpec {
    /// Whether building this request needs the secondary token
    pub fn needs_secondary_token(&self) -> bool {
        references_secondary(&self.path)
            || self.headers.values().any(|v| references_secondary(v))
            || self.accept.as_deref().is_some_and(references_secondary)
            || match &self.body {
                Some(BodySpec::Raw { text, .. }) => references_secondary(text),
                Some(BodySpec::Json(value)) => value_references_secondary(value),
                _ => false,
            }
    }
}

fn value_references_secondary(value: &Value) -> bool {
    match value {
        Value::String(s) => references_secondary(s),
        Value::Array(items) => items.iter().any(value_references_secondary),
        Value::Object(map) => map.values().any(value_references_secondary),
        _ => false,
    }
}

/// Request body
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BodySpec {
    /// Structured body serialized as JSON
    Json(Value),
    /// Raw text in an alternate format
    Raw { text: String, content_type: String },
    /// The payload stored by an earlier step, as JSON
    Payload,
}

/// Expected outcome as written in a scenario
#[derive(Deserialize, Debug, Clone)]
pub struct Expectation {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<HeaderPredicate>,
    pub body: Option<Vec<FieldPredicate>>,
    /// Derive the expected content type (or 406) from the request's `Accept`
    #[serde(default)]
    pub negotiate: bool,
}

impl Expectation {
    pub fn outcome(&self) -> ExpectedOutcome {
        ExpectedOutcome {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Whether resolving the expected values needs the secondary token
    pub fn needs_secondary_token(&self) -> bool {
        let in_headers = self.headers.iter().any(|h| match &h.check {
            HeaderCheck::Equals(v) => references_secondary(v),
            _ => false,
        });
        let in_body = self.body.iter().flatten().any(|f| match &f.check {
            FieldCheck::Equals(v) => value_references_secondary(v),
            _ => false,
        });
        in_headers || in_body
    }
}

/// Session state derived from a successful response
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Extraction {
    /// Record a body field as a named resource id
    ResourceId { field: String, into: String },
    /// Record a response header as the secondary token
    SecondaryToken { header: String },
    /// Store the whole parsed body
    Payload,
}

impl Scenario {
    /// Parse and validate a scenario from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load a scenario file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// The embedded API challenge suite
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_SUITE)
    }

    /// Check ids and the dependency chain
    ///
    /// Ids must be unique and every `depends_on` entry must name an earlier step.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();

        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Scenario '{}' has a step without an id",
                    self.name
                )));
            }

            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(Error::Config(format!(
                        "Step '{}' depends on '{}', which is not an earlier step",
                        step.id, dep
                    )));
                }
            }

            match &step.action {
                StepAction::Request { repeat: 0, .. } => {
                    return Err(Error::Config(format!(
                        "Step '{}' has repeat: 0; use at least 1",
                        step.id
                    )));
                }
                StepAction::ForEach { items, .. } if items.trim().is_empty() => {
                    return Err(Error::Config(format!(
                        "Step '{}' needs a non-empty 'items' path",
                        step.id
                    )));
                }
                _ => {}
            }

            if !seen.insert(step.id.as_str()) {
                return Err(Error::Config(format!("Duplicate step id '{}'", step.id)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"
name: sample
description: crud chain
steps:
  - id: create
    action: request
    request:
      method: POST
      path: todos
      body:
        json: { title: "{{fake.sentence}}", doneStatus: true }
    expect:
      status: 201
      body:
        - { path: id, type: number }
    extract:
      - resource_id: { field: id, into: first }
  - id: update
    depends_on: [create]
    action: request
    request:
      method: POST
      path: "todos/{{ids.first}}"
      headers: { X-HTTP-Method-Override: PATCH }
      body:
        raw: { text: "<title>x</title>", content_type: application/xml }
    expect: { status: 200, negotiate: true }
  - id: token
    action: exchange
    credentials: { username: admin, password: wrong }
    expect_failure: true
  - id: note
    action: request
    request:
      method: GET
      path: secret/note
      headers: { Authorization: "Bearer {{secondary_token}}" }
    expect: { status: 200 }
  - id: wipe
    action: for_each
    items: todos
    request: { method: DELETE, path: "todos/{{item.id}}" }
    expect: { status: 200 }
"#;

    #[test]
    fn test_parse_sample() {
        let scenario = Scenario::from_yaml(SAMPLE).unwrap();
        assert_eq!(scenario.steps.len(), 5);

        match &scenario.steps[0].action {
            StepAction::Request {
                request,
                extract,
                repeat,
                ..
            } => {
                assert_eq!(*repeat, 1);
                assert_eq!(
                    request.body,
                    Some(BodySpec::Json(json!({"title": "{{fake.sentence}}", "doneStatus": true})))
                );
                assert_eq!(
                    extract,
                    &vec![Extraction::ResourceId {
                        field: "id".into(),
                        into: "first".into()
                    }]
                );
                assert!(!request.needs_secondary_token());
            }
            other => panic!("unexpected action {:?}", other),
        }

        assert_eq!(scenario.steps[1].depends_on, vec!["create".to_string()]);
        match &scenario.steps[1].action {
            StepAction::Request { request, expect, .. } => {
                assert!(expect.negotiate);
                assert!(matches!(request.body, Some(BodySpec::Raw { .. })));
            }
            other => panic!("unexpected action {:?}", other),
        }

        assert!(matches!(
            scenario.steps[2].action,
            StepAction::Exchange {
                expect_failure: true,
                credentials: Some(_)
            }
        ));

        match &scenario.steps[3].action {
            StepAction::Request { request, .. } => assert!(request.needs_secondary_token()),
            other => panic!("unexpected action {:?}", other),
        }

        assert!(matches!(scenario.steps[4].action, StepAction::ForEach { .. }));
    }

    #[test]
    fn test_expected_values_can_need_secondary_token() {
        let yaml = r#"
name: echo
steps:
  - id: header
    action: request
    request: { method: GET, path: secret/note }
    expect:
      status: 200
      headers:
        - { name: x-auth-token, equals: "{{secondary_token}}" }
  - id: field
    action: request
    request: { method: GET, path: secret/note }
    expect:
      status: 200
      body:
        - { path: note, equals: "{{ secondary_token }}" }
  - id: plain
    action: request
    request: { method: GET, path: todos }
    expect:
      status: 200
      headers:
        - { name: x-auth-token, exists: true }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        let needs: Vec<bool> = scenario
            .steps
            .iter()
            .map(|s| match &s.action {
                StepAction::Request {
                    request, expect, ..
                } => !request.needs_secondary_token() && expect.needs_secondary_token(),
                _ => false,
            })
            .collect();
        assert_eq!(needs, vec![true, true, false]);
    }

    #[test]
    fn test_forward_dependency_rejected() {
        let yaml = r#"
name: bad
steps:
  - id: a
    depends_on: [b]
    action: exchange
  - id: b
    action: exchange
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("not an earlier step"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = r#"
name: bad
steps:
  - { id: a, action: exchange }
  - { id: a, action: exchange }
"#;
        assert!(matches!(Scenario::from_yaml(yaml), Err(Error::Config(_))));
    }

    #[test]
    fn test_builtin_suite_is_valid() {
        let suite = Scenario::builtin().unwrap();
        assert!(suite.steps.len() > 40);
        assert!(suite
            .steps
            .iter()
            .any(|s| matches!(s.action, StepAction::Exchange { .. })));
    }
}
