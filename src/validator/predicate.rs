//! Expected-outcome descriptors
//!
//! Each check is a tagged variant evaluated uniformly by the validator.
//! The YAML form allows one check per entry:
//!
//! ```yaml
//! headers:
//!   - { name: content-type, media_type: application/xml }
//!   - { name: x-auth-token, exists: true }
//! body:
//!   - { path: id, type: number }
//!   - { path: doneStatus, equals: true }
//!   - { path: todos, length: 10 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Everything a response must satisfy
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpectedOutcome {
    /// Exact status code
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<HeaderPredicate>,
    /// Field predicates over the parsed body; absent means the body is not inspected
    #[serde(default)]
    pub body: Option<Vec<FieldPredicate>>,
}

impl ExpectedOutcome {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, predicate: HeaderPredicate) -> Self {
        self.headers.push(predicate);
        self
    }

    pub fn with_field(mut self, predicate: FieldPredicate) -> Self {
        self.body.get_or_insert_with(Vec::new).push(predicate);
        self
    }
}

/// A check on one response header
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "HeaderPredicateDef")]
pub struct HeaderPredicate {
    pub name: String,
    pub check: HeaderCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderCheck {
    /// Header present with exactly this value
    Equals(String),
    /// Header present with any value
    Exists,
    /// Header's media type essence equals this (parameters ignored)
    MediaType(String),
}

impl HeaderPredicate {
    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: HeaderCheck::Equals(value.into()),
        }
    }

    pub fn exists(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: HeaderCheck::Exists,
        }
    }

    pub fn media_type(name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check: HeaderCheck::MediaType(media_type.into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderPredicateDef {
    name: String,
    equals: Option<String>,
    exists: Option<bool>,
    media_type: Option<String>,
}

impl TryFrom<HeaderPredicateDef> for HeaderPredicate {
    type Error = String;

    fn try_from(def: HeaderPredicateDef) -> Result<Self, Self::Error> {
        let check = match (def.equals, def.exists, def.media_type) {
            (Some(v), None, None) => HeaderCheck::Equals(v),
            (None, Some(true), None) => HeaderCheck::Exists,
            (None, None, Some(m)) => HeaderCheck::MediaType(m),
            _ => {
                return Err(format!(
                    "header check for '{}' needs exactly one of 'equals', 'exists: true', 'media_type'",
                    def.name
                ))
            }
        };
        Ok(Self {
            name: def.name,
            check,
        })
    }
}

/// JSON value kinds a field may be required to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Number,
    String,
    Boolean,
    Object,
    Array,
    Null,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

/// A check on one field of the parsed body, addressed by a dotted path
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "FieldPredicateDef")]
pub struct FieldPredicate {
    pub path: String,
    pub check: FieldCheck,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldCheck {
    Present,
    Type(ValueType),
    Equals(Value),
    /// Array element count (or string length)
    Length(usize),
}

impl FieldPredicate {
    pub fn present(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            check: FieldCheck::Present,
        }
    }

    pub fn of_type(path: impl Into<String>, ty: ValueType) -> Self {
        Self {
            path: path.into(),
            check: FieldCheck::Type(ty),
        }
    }

    pub fn equals(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            check: FieldCheck::Equals(value),
        }
    }

    pub fn length(path: impl Into<String>, len: usize) -> Self {
        Self {
            path: path.into(),
            check: FieldCheck::Length(len),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldPredicateDef {
    path: String,
    present: Option<bool>,
    #[serde(rename = "type")]
    type_name: Option<ValueType>,
    equals: Option<Value>,
    length: Option<usize>,
}

impl TryFrom<FieldPredicateDef> for FieldPredicate {
    type Error = String;

    fn try_from(def: FieldPredicateDef) -> Result<Self, Self::Error> {
        let check = match (def.present, def.type_name, def.equals, def.length) {
            (Some(true), None, None, None) => FieldCheck::Present,
            (None, Some(t), None, None) => FieldCheck::Type(t),
            (None, None, Some(v), None) => FieldCheck::Equals(v),
            (None, None, None, Some(n)) => FieldCheck::Length(n),
            _ => {
                return Err(format!(
                    "field check for '{}' needs exactly one of 'present: true', 'type', 'equals', 'length'",
                    def.path
                ))
            }
        };
        Ok(Self {
            path: def.path,
            check,
        })
    }
}

/// One failed check, reported individually
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum CheckFailure {
    Status { expected: u16, actual: u16 },
    MissingHeader { name: String },
    HeaderMismatch { name: String, expected: String, actual: String },
    MissingField { path: String },
    FieldType { path: String, expected: ValueType, actual: ValueType },
    FieldValue { path: String, expected: Value, actual: Value },
    FieldLength { path: String, expected: usize, actual: Option<usize> },
    /// Step-level failure that is not a response check (extraction, exchange)
    Step { message: String },
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { expected, actual } => {
                write!(f, "expected status {}, got {}", expected, actual)
            }
            Self::MissingHeader { name } => write!(f, "header '{}' missing", name),
            Self::HeaderMismatch {
                name,
                expected,
                actual,
            } => write!(f, "header '{}': expected '{}', got '{}'", name, expected, actual),
            Self::MissingField { path } => write!(f, "field '{}' missing", path),
            Self::FieldType {
                path,
                expected,
                actual,
            } => write!(f, "field '{}': expected {}, got {}", path, expected, actual),
            Self::FieldValue {
                path,
                expected,
                actual,
            } => write!(f, "field '{}': expected {}, got {}", path, expected, actual),
            Self::FieldLength {
                path,
                expected,
                actual: Some(actual),
            } => write!(f, "field '{}': expected length {}, got {}", path, expected, actual),
            Self::FieldLength {
                path,
                expected,
                actual: None,
            } => write!(f, "field '{}': expected length {}, value has no length", path, expected),
            Self::Step { message } => f.write_str(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_from_yaml() {
        let yaml = r#"
status: 201
headers:
  - { name: content-type, media_type: application/json }
  - { name: x-challenger, exists: true }
body:
  - { path: id, type: number }
  - { path: doneStatus, equals: true }
  - { path: title, present: true }
  - { path: todos, length: 10 }
"#;
        let outcome: ExpectedOutcome = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(outcome.status, 201);
        assert_eq!(
            outcome.headers,
            vec![
                HeaderPredicate::media_type("content-type", "application/json"),
                HeaderPredicate::exists("x-challenger"),
            ]
        );
        let body = outcome.body.unwrap();
        assert_eq!(body[0], FieldPredicate::of_type("id", ValueType::Number));
        assert_eq!(body[1], FieldPredicate::equals("doneStatus", json!(true)));
        assert_eq!(body[2], FieldPredicate::present("title"));
        assert_eq!(body[3], FieldPredicate::length("todos", 10));
    }

    #[test]
    fn test_ambiguous_predicates_rejected() {
        let err = serde_yaml::from_str::<HeaderPredicate>("{ name: a, equals: b, exists: true }");
        assert!(err.is_err());
        let err = serde_yaml::from_str::<FieldPredicate>("{ path: id }");
        assert!(err.is_err());
    }

    #[test]
    fn test_failure_messages() {
        let f = CheckFailure::Status {
            expected: 201,
            actual: 400,
        };
        assert_eq!(f.to_string(), "expected status 201, got 400");
        let f = CheckFailure::MissingHeader {
            name: "x-challenger".into(),
        };
        assert_eq!(f.to_string(), "header 'x-challenger' missing");
    }
}
