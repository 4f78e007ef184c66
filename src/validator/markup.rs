//! Markup (XML) bodies as JSON values
//!
//! Field predicates are written against a JSON-shaped tree, so XML bodies
//! are folded into one:
//!
//! - each element becomes a key in its parent's object
//! - repeated sibling elements become an array
//! - leaf text becomes a scalar (`true`/`false`, integers and decimals are
//!   typed, everything else stays a string)
//! - attributes, comments and processing instructions are dropped
//!
//! `<todos><todo><id>1</id></todo><todo><id>2</id></todo></todos>` reads as
//! `{"todos": {"todo": [{"id": 1}, {"id": 2}]}}`.

use serde_json::{Map, Number, Value};

use crate::common::{Error, Result};

/// Parse a markup document (one or more top-level elements)
pub fn parse(input: &str) -> Result<Value> {
    let mut parser = Parser { src: input, pos: 0 };
    let mut root = Map::new();

    loop {
        parser.skip_misc()?;
        if parser.at_end() {
            break;
        }
        let (name, value) = parser.element()?;
        insert_child(&mut root, name, value);
    }

    if root.is_empty() {
        return Err(Error::body_parse("xml", "document has no elements"));
    }
    Ok(Value::Object(root))
}

fn insert_child(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name, value);
        }
    }
}

fn scalar(text: &str) -> Value {
    let text = text.trim();
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = text.parse::<i64>() {
        if n.to_string() == text {
            return Value::Number(n.into());
        }
    }
    if text.contains('.') {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn error(&self, message: &str) -> Error {
        Error::body_parse("xml", format!("{} at offset {}", message, self.pos))
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn skip_past(&mut self, terminator: &str) -> Result<()> {
        match self.rest().find(terminator) {
            Some(i) => {
                self.pos += i + terminator.len();
                Ok(())
            }
            None => Err(self.error(&format!("unterminated construct, expected '{}'", terminator))),
        }
    }

    /// Skip whitespace, the prolog, comments and doctype declarations
    fn skip_misc(&mut self) -> Result<()> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<!") {
                self.skip_past(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn name(&mut self) -> Result<String> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.error("expected element name"));
        }
        self.pos += end;
        Ok(rest[..end].to_string())
    }

    /// Parse one element starting at '<'
    fn element(&mut self) -> Result<(String, Value)> {
        if !self.rest().starts_with('<') {
            return Err(self.error("expected '<'"));
        }
        self.pos += 1;
        let name = self.name()?;

        // Attributes are skipped, honouring quoted values
        let mut quote: Option<char> = None;
        loop {
            let c = self
                .rest()
                .chars()
                .next()
                .ok_or_else(|| self.error("unterminated start tag"))?;
            self.pos += c.len_utf8();
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"') | (None, '\'') => quote = Some(c),
                (None, '/') => {
                    if !self.rest().starts_with('>') {
                        return Err(self.error("expected '>' after '/'"));
                    }
                    self.pos += 1;
                    return Ok((name, Value::String(String::new())));
                }
                (None, '>') => break,
                (None, _) => {}
            }
        }

        let mut children = Map::new();
        let mut text = String::new();
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(self.error(&format!("element '{}' is not closed", name)));
            }
            if rest.starts_with("</") {
                self.pos += 2;
                let closing = self.name()?;
                if closing != name {
                    return Err(self.error(&format!(
                        "mismatched closing tag '{}' for '{}'",
                        closing, name
                    )));
                }
                self.skip_whitespace();
                if !self.rest().starts_with('>') {
                    return Err(self.error("expected '>'"));
                }
                self.pos += 1;
                break;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let end = self
                    .rest()
                    .find("]]>")
                    .ok_or_else(|| self.error("unterminated CDATA section"))?;
                text.push_str(&self.rest()[..end]);
                self.pos += end + 3;
            } else if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with('<') {
                let (child, value) = self.element()?;
                insert_child(&mut children, child, value);
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                text.push_str(&unescape(&rest[..end]));
                self.pos += end;
            }
        }

        if children.is_empty() {
            Ok((name, scalar(&text)))
        } else {
            Ok((name, Value::Object(children)))
        }
    }
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let Some(end) = after.find(';') else {
            out.push_str(after);
            return out;
        };
        let entity = &after[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            e if e.starts_with("#x") || e.starts_with("#X") => {
                u32::from_str_radix(&e[2..], 16).ok().and_then(char::from_u32)
            }
            e if e.starts_with('#') => e[1..].parse::<u32>().ok().and_then(char::from_u32),
            _ => None,
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&after[..=end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
