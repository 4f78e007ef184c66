//! `{{ expr }}` substitution against the session context
//!
//! Supported expressions:
//!
//! | expression | value |
//! |---|---|
//! | `session_token` | the run's session token |
//! | `secondary_token` | the stored secondary token |
//! | `ids.<name>` | a captured resource id |
//! | `payload` / `payload.<path>` | the stored payload, or a field of it |
//! | `item` / `item.<path>` | the current `for_each` element |
//! | `fake.alpha(N)` `fake.words(N)` `fake.sentence` `fake.int(N)` | fixture data |

use serde_json::Value;

use crate::common::{Error, Result};
use crate::session::SessionContext;
use crate::validator::{body::value_to_string, lookup};

use super::fixtures::Fixtures;

/// Everything a template may read while one step is being built
pub struct TemplateScope<'a> {
    step: &'a str,
    ctx: &'a SessionContext,
    item: Option<&'a Value>,
    fixtures: &'a dyn Fixtures,
}

impl<'a> TemplateScope<'a> {
    pub fn new(
        step: &'a str,
        ctx: &'a SessionContext,
        item: Option<&'a Value>,
        fixtures: &'a dyn Fixtures,
    ) -> Self {
        Self {
            step,
            ctx,
            item,
            fixtures,
        }
    }

    /// Substitute every expression in `input`
    pub fn render(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| Error::Template(format!("unterminated '{{{{' in '{}'", input)))?;
            let value = self.eval(&after[..end])?;
            out.push_str(&value_to_string(&value));
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Substitute within a JSON tree
    ///
    /// A string leaf that is a single expression takes the expression's
    /// typed value, so `"{{ids.first}}"` becomes a number when the id is numeric.
    pub fn render_value(&self, input: &Value) -> Result<Value> {
        match input {
            Value::String(s) => match single_expression(s) {
                Some(expr) => self.eval(expr),
                None => Ok(Value::String(self.render(s)?)),
            },
            Value::Array(items) => items
                .iter()
                .map(|v| self.render_value(v))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(self.render(k)?, self.render_value(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn eval(&self, expr: &str) -> Result<Value> {
        let expr = expr.trim();
        let (head, tail) = match expr.split_once('.') {
            Some((h, t)) => (h, Some(t)),
            None => (expr, None),
        };

        match (head, tail) {
            ("session_token", None) => Ok(Value::String(self.ctx.session_token().to_string())),
            ("secondary_token", None) => self
                .ctx
                .secondary_token()
                .map(|t| Value::String(t.to_string()))
                .ok_or_else(|| Error::unmet_dependency(self.step, "no secondary token available")),
            ("ids", Some(name)) => self
                .ctx
                .resource_id(name)
                .map(typed_id)
                .ok_or_else(|| {
                    Error::unmet_dependency(
                        self.step,
                        format!("resource id '{}' was never captured", name),
                    )
                }),
            ("payload", path) => {
                let payload = self.ctx.last_payload().ok_or_else(|| {
                    Error::unmet_dependency(self.step, "no payload has been stored")
                })?;
                field(payload, path.unwrap_or(""), "payload", self.step)
            }
            ("item", path) => {
                let item = self
                    .item
                    .ok_or_else(|| Error::Template("'item' is only available in for_each steps".into()))?;
                field(item, path.unwrap_or(""), "item", self.step)
            }
            ("fake", Some(call)) => self.fake(call),
            _ => Err(Error::Template(format!("unknown expression '{}'", expr))),
        }
    }

    fn fake(&self, call: &str) -> Result<Value> {
        let (name, arg) = match call.split_once('(') {
            Some((name, rest)) => {
                let arg = rest
                    .strip_suffix(')')
                    .ok_or_else(|| Error::Template(format!("missing ')' in 'fake.{}'", call)))?;
                let n = arg
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| Error::Template(format!("invalid argument in 'fake.{}'", call)))?;
                (name.trim(), Some(n))
            }
            None => (call.trim(), None),
        };

        let f = self.fixtures;
        match (name, arg) {
            ("alpha", Some(n)) => Ok(Value::String(f.alpha(n as usize))),
            ("words", Some(n)) => Ok(Value::String(f.words(n as usize))),
            ("sentence", None) => Ok(Value::String(f.sentence())),
            ("int", Some(n)) => Ok(Value::from(f.int(n))),
            _ => Err(Error::Template(format!("unknown fixture 'fake.{}'", call))),
        }
    }
}

fn field(root: &Value, path: &str, what: &str, step: &str) -> Result<Value> {
    lookup(root, path).cloned().ok_or_else(|| {
        Error::unmet_dependency(step, format!("{} has no field '{}'", what, path))
    })
}

fn typed_id(id: &str) -> Value {
    id.parse::<i64>()
        .ok()
        .filter(|n| n.to_string() == id)
        .map(Value::from)
        .unwrap_or_else(|| Value::String(id.to_string()))
}

fn single_expression(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    (!inner.contains("{{") && !inner.contains("}}")).then_some(inner)
}

/// Whether a template string reads the secondary token
pub fn references_secondary(input: &str) -> bool {
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return false;
        };
        if after[..end].trim() == "secondary_token" {
            return true;
        }
        rest = &after[end + 2..];
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ContextUpdate;
    use serde_json::json;

    struct FixedFixtures;

    impl Fixtures for FixedFixtures {
        fn alpha(&self, len: usize) -> String {
            "a".repeat(len)
        }
        fn words(&self, count: usize) -> String {
            vec!["w"; count].join(" ")
        }
        fn sentence(&self) -> String {
            "short title".to_string()
        }
        fn int(&self, _max: u64) -> u64 {
            7
        }
    }

    fn context() -> SessionContext {
        let mut ctx = SessionContext::new("tok-1").unwrap();
        ctx.apply(ContextUpdate::resource_id("first", "42"));
        ctx.apply(ContextUpdate::payload(json!({"todos": [{"id": 3}]})));
        ctx
    }

    #[test]
    fn test_render_strings() {
        let ctx = context();
        let scope = TemplateScope::new("s", &ctx, None, &FixedFixtures);
        assert_eq!(scope.render("todos/{{ids.first}}").unwrap(), "todos/42");
        assert_eq!(scope.render("challenger/{{ session_token }}").unwrap(), "challenger/tok-1");
        assert_eq!(scope.render("{{fake.alpha(3)}}-{{fake.int(10)}}").unwrap(), "aaa-7");
        assert_eq!(scope.render("no templates").unwrap(), "no templates");
    }

    #[test]
    fn test_render_value_keeps_types() {
        let ctx = context();
        let scope = TemplateScope::new("s", &ctx, None, &FixedFixtures);
        let body = json!({
            "id": "{{ids.first}}",
            "title": "{{fake.sentence}}",
            "label": "todo {{ids.first}}",
            "first": "{{payload.todos.0}}",
            "doneStatus": true
        });
        assert_eq!(
            scope.render_value(&body).unwrap(),
            json!({
                "id": 42,
                "title": "short title",
                "label": "todo 42",
                "first": {"id": 3},
                "doneStatus": true
            })
        );
    }

    #[test]
    fn test_missing_state_is_unmet_dependency() {
        let ctx = SessionContext::new("tok-1").unwrap();
        let scope = TemplateScope::new("update", &ctx, None, &FixedFixtures);
        assert!(matches!(
            scope.render("todos/{{ids.first}}"),
            Err(Error::UnmetDependency { .. })
        ));
        assert!(matches!(
            scope.render("Bearer {{secondary_token}}"),
            Err(Error::UnmetDependency { .. })
        ));
        assert!(matches!(
            scope.render_value(&json!("{{payload}}")),
            Err(Error::UnmetDependency { .. })
        ));
    }

    #[test]
    fn test_malformed_expressions() {
        let ctx = context();
        let scope = TemplateScope::new("s", &ctx, None, &FixedFixtures);
        assert!(matches!(scope.render("{{ids.first"), Err(Error::Template(_))));
        assert!(matches!(scope.render("{{bogus}}"), Err(Error::Template(_))));
        assert!(matches!(scope.render("{{fake.alpha(x)}}"), Err(Error::Template(_))));
        assert!(matches!(scope.render("{{item.id}}"), Err(Error::Template(_))));
    }

    #[test]
    fn test_item_scope() {
        let ctx = context();
        let item = json!({"id": 5});
        let scope = TemplateScope::new("s", &ctx, Some(&item), &FixedFixtures);
        assert_eq!(scope.render("todos/{{item.id}}").unwrap(), "todos/5");
    }

    #[test]
    fn test_references_secondary() {
        assert!(references_secondary("Bearer {{secondary_token}}"));
        assert!(references_secondary("{{ secondary_token }}"));
        assert!(!references_secondary("{{session_token}}"));
        assert!(!references_secondary("secondary_token"));
    }
}
