//! Response validation
//!
//! [`validate`] checks status, then headers, then body fields, and returns
//! every mismatch it finds. Mismatches are values; only an unparseable
//! body is an error.

pub mod body;
pub mod markup;
mod predicate;

pub use body::{lookup, lookup_in, parse_body, representation_of};
pub use predicate::*;

use serde::Serialize;
use serde_json::Value;

use crate::common::Result;
use crate::http::{transport::media_type_essence, HttpResponse};
use crate::negotiation::{AcceptPolicy, Negotiated, Representation, NOT_ACCEPTABLE};

/// Aggregate verdict for one response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub failures: Vec<CheckFailure>,
}

impl ValidationResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Validate a response against an expected outcome
pub fn validate(response: &HttpResponse, expected: &ExpectedOutcome) -> Result<ValidationResult> {
    let mut failures = Vec::new();

    let status_ok = response.status == expected.status;
    if !status_ok {
        failures.push(CheckFailure::Status {
            expected: expected.status,
            actual: response.status,
        });
    }

    for predicate in &expected.headers {
        if let Some(failure) = check_header(response, predicate) {
            failures.push(failure);
        }
    }

    // Bodies of a response with the wrong status are not worth parsing
    if let (Some(fields), true) = (&expected.body, status_ok) {
        if !fields.is_empty() {
            let representation = representation_of(response)?;
            let parsed = body::parse_as(representation, &response.body)?;
            failures.extend(
                fields
                    .iter()
                    .filter_map(|f| check_field(&parsed, f, representation)),
            );
        }
    }

    Ok(ValidationResult { failures })
}

fn check_header(response: &HttpResponse, predicate: &HeaderPredicate) -> Option<CheckFailure> {
    let Some(actual) = response.header(&predicate.name) else {
        return Some(CheckFailure::MissingHeader {
            name: predicate.name.clone(),
        });
    };

    let (matches, expected) = match &predicate.check {
        HeaderCheck::Exists => return None,
        HeaderCheck::Equals(v) => (actual == v, v),
        HeaderCheck::MediaType(m) => (media_type_essence(actual) == media_type_essence(m), m),
    };

    (!matches).then(|| CheckFailure::HeaderMismatch {
        name: predicate.name.clone(),
        expected: expected.clone(),
        actual: actual.to_string(),
    })
}

fn check_field(
    body: &Value,
    predicate: &FieldPredicate,
    representation: Representation,
) -> Option<CheckFailure> {
    let path = &predicate.path;
    let Some(actual) = lookup_in(body, path, representation) else {
        return Some(CheckFailure::MissingField { path: path.clone() });
    };

    match &predicate.check {
        FieldCheck::Present => None,
        FieldCheck::Type(expected) => {
            let actual = ValueType::of(actual);
            (actual != *expected).then(|| CheckFailure::FieldType {
                path: path.clone(),
                expected: *expected,
                actual,
            })
        }
        FieldCheck::Equals(expected) => (actual != expected).then(|| CheckFailure::FieldValue {
            path: path.clone(),
            expected: expected.clone(),
            actual: actual.clone(),
        }),
        FieldCheck::Length(expected) => {
            let len = match (actual, representation) {
                (Value::Array(items), _) => Some(items.len()),
                (Value::String(s), _) => Some(s.chars().count()),
                // A lone markup element is a list of one
                (Value::Object(_), Representation::Xml) => Some(1),
                (Value::Object(map), _) => Some(map.len()),
                _ => None,
            };
            (len != Some(*expected)).then(|| CheckFailure::FieldLength {
                path: path.clone(),
                expected: *expected,
                actual: len,
            })
        }
    }
}

/// Rewrite an outcome so it asserts the server honoured `accept`
///
/// A negotiable `Accept` adds a `content-type` media type check for the
/// chosen format; an unsatisfiable one replaces the status with 406.
pub fn negotiated(
    mut expected: ExpectedOutcome,
    policy: &AcceptPolicy,
    accept: Option<&str>,
) -> ExpectedOutcome {
    match policy.expected(accept) {
        Negotiated::Format(rep) => {
            expected
                .headers
                .retain(|h| !h.name.eq_ignore_ascii_case("content-type"));
            expected
                .headers
                .push(HeaderPredicate::media_type("content-type", rep.media_type()));
        }
        Negotiated::NotAcceptable => {
            expected.status = NOT_ACCEPTABLE;
            expected.body = None;
        }
    }
    expected
}
