//! In-memory stand-in for the todo API
//!
//! Implements just enough of the challenge server to drive the sequencer:
//! session bootstrap, todo CRUD with field validation, content negotiation,
//! the secret token exchange and the secret note.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use challenger::http::{HttpRequest, HttpResponse, Transport};
use challenger::validator::markup;
use challenger::{Error, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const SESSION: &str = "sess-0001";
pub const MAX_TODOS: usize = 20;

#[derive(Default)]
struct State {
    todos: BTreeMap<u64, Value>,
    next_id: u64,
    issued: Vec<String>,
}

pub struct FakeApi {
    state: Mutex<State>,
    requests: Mutex<Vec<HttpRequest>>,
    /// Requests whose path contains this fail at the transport level
    unreachable: Option<String>,
    /// Paths whose responses do not echo the session header
    no_echo: Option<String>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
            requests: Mutex::new(Vec::new()),
            unreachable: None,
            no_echo: None,
        }
    }

    /// Seed `count` todos
    pub fn with_todos(self, count: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for i in 0..count {
                let id = state.next_id;
                state.next_id += 1;
                state.todos.insert(
                    id,
                    json!({"id": id, "title": format!("seeded {}", i), "doneStatus": false, "description": ""}),
                );
            }
        }
        self
    }

    pub fn unreachable(mut self, path: &str) -> Self {
        self.unreachable = Some(path.to_string());
        self
    }

    pub fn without_echo(mut self, path: &str) -> Self {
        self.no_echo = Some(path.to_string());
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose URL ends with `suffix`
    pub fn requests_to(&self, suffix: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| path_of(&r.url) == suffix)
            .collect()
    }

    pub fn issued_tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().issued.clone()
    }

    pub fn todo_count(&self) -> usize {
        self.state.lock().unwrap().todos.len()
    }

    fn handle(&self, req: &HttpRequest) -> HttpResponse {
        let path = path_of(&req.url);
        let (route, query) = match path.split_once('?') {
            Some((r, q)) => (r.to_string(), Some(q.to_string())),
            None => (path.clone(), None),
        };
        let method = req
            .header("x-http-method-override")
            .map(str::to_uppercase)
            .unwrap_or_else(|| req.method.clone());

        if route == "challenger" && method == "POST" {
            return HttpResponse::new(201);
        }
        if req.header("x-challenger") != Some(SESSION) {
            return HttpResponse::new(401);
        }

        let segments: Vec<&str> = route.split('/').collect();
        match (method.as_str(), segments.as_slice()) {
            ("GET", ["todos"]) => match negotiate(req.header("accept")) {
                None => HttpResponse::new(406),
                Some(format) => {
                    let state = self.state.lock().unwrap();
                    let todos: Vec<Value> = state
                        .todos
                        .values()
                        .filter(|t| match query.as_deref() {
                            Some("doneStatus=true") => t["doneStatus"] == json!(true),
                            _ => true,
                        })
                        .cloned()
                        .collect();
                    render(200, format, "todos", &json!({ "todos": todos }))
                }
            },
            ("HEAD", ["todos"]) | ("OPTIONS", ["todos"]) => HttpResponse::new(200),
            ("POST", ["todos"]) => self.create(req),
            ("GET", ["todos", id]) => match self.find(id) {
                Some(todo) => render(200, Format::Json, "todos", &json!({ "todos": [todo] })),
                None => HttpResponse::new(404),
            },
            ("POST", ["todos", id]) => self.amend(id, req),
            ("DELETE", ["todos", id]) => {
                let removed = id
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| self.state.lock().unwrap().todos.remove(&id));
                match removed {
                    Some(_) => HttpResponse::new(200),
                    None => HttpResponse::new(404),
                }
            }
            ("POST", ["secret", "token"]) => self.issue_token(req),
            ("GET", ["secret", "note"]) | ("POST", ["secret", "note"]) => self.note(req),
            ("GET", ["heartbeat"]) => HttpResponse::new(204),
            ("DELETE", ["heartbeat"]) => HttpResponse::new(405),
            ("PATCH", ["heartbeat"]) => HttpResponse::new(500),
            ("TRACE", ["heartbeat"]) => HttpResponse::new(501),
            _ => HttpResponse::new(404),
        }
    }

    fn find(&self, id: &str) -> Option<Value> {
        let id = id.parse::<u64>().ok()?;
        self.state.lock().unwrap().todos.get(&id).cloned()
    }

    fn create(&self, req: &HttpRequest) -> HttpResponse {
        let format = match negotiate(req.header("accept")) {
            Some(f) => f,
            None => return HttpResponse::new(406),
        };
        let fields = match read_todo(req) {
            Ok(fields) => fields,
            Err(status) => return HttpResponse::new(status),
        };

        let mut state = self.state.lock().unwrap();
        if state.todos.len() >= MAX_TODOS {
            return HttpResponse::new(400);
        }
        let id = state.next_id;
        state.next_id += 1;
        let todo = json!({
            "id": id,
            "title": fields.get("title").cloned().unwrap_or(json!("")),
            "doneStatus": fields.get("doneStatus").cloned().unwrap_or(json!(false)),
            "description": fields.get("description").cloned().unwrap_or(json!("")),
        });
        state.todos.insert(id, todo.clone());
        render(201, format, "todo", &todo)
    }

    fn amend(&self, id: &str, req: &HttpRequest) -> HttpResponse {
        let fields = match read_todo(req) {
            Ok(fields) => fields,
            Err(status) => return HttpResponse::new(status),
        };
        let mut state = self.state.lock().unwrap();
        let Some(todo) = id.parse::<u64>().ok().and_then(|id| state.todos.get_mut(&id)) else {
            return HttpResponse::new(404);
        };
        for (k, v) in fields {
            todo[k.as_str()] = v;
        }
        render(200, Format::Json, "todo", todo)
    }

    fn issue_token(&self, req: &HttpRequest) -> HttpResponse {
        let expected = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("admin:password")
        );
        if req.header("authorization") != Some(expected.as_str()) {
            return HttpResponse::new(401);
        }
        let mut state = self.state.lock().unwrap();
        let token = format!("secret-{}", state.issued.len() + 1);
        state.issued.push(token.clone());
        HttpResponse::new(201).with_header("x-auth-token", token)
    }

    fn note(&self, req: &HttpRequest) -> HttpResponse {
        let token = req.header("x-auth-token").map(str::to_string).or_else(|| {
            req.header("authorization")
                .and_then(|a| a.strip_prefix("Bearer "))
                .map(str::to_string)
        });
        match token {
            None => HttpResponse::new(401),
            Some(t) if self.state.lock().unwrap().issued.contains(&t) => {
                render(200, Format::Json, "note", &json!({"note": ""}))
            }
            Some(_) => HttpResponse::new(403),
        }
    }
}

#[async_trait]
impl Transport for FakeApi {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let path = path_of(&request.url);

        if let Some(down) = &self.unreachable {
            if path.contains(down.as_str()) {
                return Err(Error::Transport(format!("connection refused: {}", request.url)));
            }
        }

        let mut response = self.handle(&request);
        let echo = self
            .no_echo
            .as_deref()
            .map_or(true, |p| !path.contains(p));
        if echo {
            response = response.with_header("x-challenger", SESSION);
        }
        Ok(response)
    }
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Xml,
}

fn path_of(url: &str) -> String {
    url.trim_start_matches("http://fake.test/").to_string()
}

fn negotiate(accept: Option<&str>) -> Option<Format> {
    let accept = accept.unwrap_or("").trim();
    if accept.is_empty() {
        return Some(Format::Json);
    }
    accept.split(',').find_map(|entry| {
        match entry.split(';').next().unwrap_or("").trim() {
            "application/xml" => Some(Format::Xml),
            "application/json" | "*/*" | "application/*" => Some(Format::Json),
            _ => None,
        }
    })
}

/// Parse and validate a todo body; `Err` carries the status to answer with
fn read_todo(req: &HttpRequest) -> std::result::Result<Map<String, Value>, u16> {
    let body = req.body.as_deref().unwrap_or("");
    if body.len() > 5000 {
        return Err(413);
    }

    let content_type = req.header("content-type").unwrap_or("application/json");
    let parsed = match content_type {
        "application/json" => serde_json::from_str::<Value>(body).map_err(|_| 400u16)?,
        "application/xml" => {
            let doc = markup::parse(body).map_err(|_| 400u16)?;
            doc.get("todo").cloned().unwrap_or(doc)
        }
        _ => return Err(415),
    };
    let Value::Object(fields) = parsed else {
        return Err(400);
    };

    for (key, value) in &fields {
        match (key.as_str(), value) {
            ("title", Value::String(s)) if !s.is_empty() && s.chars().count() <= 50 => {}
            ("description", Value::String(s)) if s.chars().count() <= 200 => {}
            ("doneStatus", Value::Bool(_)) => {}
            _ => return Err(400),
        }
    }
    Ok(fields)
}

fn render(status: u16, format: Format, root: &str, value: &Value) -> HttpResponse {
    match format {
        Format::Json => HttpResponse::new(status)
            .with_header("content-type", "application/json")
            .with_body(value.to_string()),
        Format::Xml => {
            let inner = match value {
                Value::Object(map) if map.len() == 1 && map.contains_key(root) => &map[root],
                other => other,
            };
            let mut out = String::new();
            to_xml(root, inner, &mut out);
            HttpResponse::new(status)
                .with_header("content-type", "application/xml")
                .with_body(out)
        }
    }
}

fn to_xml(name: &str, value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push_str(&format!("<{}>", name));
            for item in items {
                to_xml("todo", item, out);
            }
            out.push_str(&format!("</{}>", name));
        }
        Value::Object(map) => {
            out.push_str(&format!("<{}>", name));
            for (k, v) in map {
                to_xml(k, v, out);
            }
            out.push_str(&format!("</{}>", name));
        }
        Value::String(s) => out.push_str(&format!("<{0}>{1}</{0}>", name, s)),
        other => out.push_str(&format!("<{0}>{1}</{0}>", name, other)),
    }
}
