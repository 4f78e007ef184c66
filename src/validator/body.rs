//! Body parsing and field lookup

use serde_json::Value;

use crate::common::{Error, Result};
use crate::http::HttpResponse;
use crate::negotiation::Representation;

use super::markup;

/// Parse a response body according to its declared content type
///
/// A missing content type is read as JSON, the structured default.
pub fn parse_body(response: &HttpResponse) -> Result<Value> {
    parse_as(representation_of(response)?, &response.body)
}

/// The representation a response body is declared in
pub fn representation_of(response: &HttpResponse) -> Result<Representation> {
    match response.content_type() {
        None => Ok(Representation::Json),
        Some(ct) => Representation::from_media_type(&ct)
            .ok_or_else(|| Error::body_parse(&ct, "unsupported representation")),
    }
}

/// Parse text in a known representation
pub fn parse_as(representation: Representation, text: &str) -> Result<Value> {
    match representation {
        Representation::Json => {
            serde_json::from_str(text).map_err(|e| Error::body_parse("json", e.to_string()))
        }
        Representation::Xml => markup::parse(text),
    }
}

/// Look up a dotted path; numeric segments index arrays
///
/// The empty path addresses the whole value.
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Look up a dotted path in a body of the given representation
///
/// Markup has no list syntax: a repeated element that occurs once folds to
/// a plain value. There a numeric segment that does not name a child
/// addresses such a value as a one-element list.
pub fn lookup_in<'v>(
    value: &'v Value,
    path: &str,
    representation: Representation,
) -> Option<&'v Value> {
    if representation != Representation::Xml || path.is_empty() {
        return lookup(value, path);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) if map.contains_key(segment) => map.get(segment),
        other => (segment.parse::<usize>().ok() == Some(0)).then_some(other),
    })
}

/// Render a value as a plain string (strings unquoted)
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
