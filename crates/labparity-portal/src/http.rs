use crate::{Portal, PortalError};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use labparity_sched::LiveEvent;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const MAX_BODY_BYTES: usize = 1 << 20;
const MAX_HEADER_LINES: usize = 100;
const STREAM_KEEPALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind: SocketAddr,
}

#[derive(Debug, Error)]
pub enum HttpServeError {
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    /// Lower-cased header names.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, target: &str) -> Self {
        Self {
            method: method.to_string(),
            target: target.to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = body.to_string().into_bytes();
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(err: &PortalError) -> Self {
        Self {
            status: err.status(),
            body: json!({ "error": err.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Index,
    Healthz,
    Labs,
    Compare,
    Students(Option<String>),
    Leaderboard(Option<String>),
    Events(u64),
    EventStream(u64),
    AutomationStatus,
    AutomationToggle,
    Interval,
    Baseline,
    DeleteSubmission,
    ListTeams(Option<String>),
    CreateTeam,
    UpdateTeam(u64),
    DeleteTeam(u64),
}

impl Route {
    fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::AutomationStatus
                | Self::AutomationToggle
                | Self::Interval
                | Self::Baseline
                | Self::DeleteSubmission
                | Self::ListTeams(_)
                | Self::CreateTeam
                | Self::UpdateTeam(_)
                | Self::DeleteTeam(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
enum RouteError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
}

impl RouteError {
    fn into_response(self) -> HttpResponse {
        let status = match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed(_) => 405,
        };
        HttpResponse {
            status,
            body: json!({ "error": self.to_string() }),
        }
    }
}

/// Bind and serve forever, one thread per connection.
pub fn serve_portal(config: HttpServerConfig, portal: Arc<Portal>) -> Result<(), HttpServeError> {
    let listener = TcpListener::bind(config.bind).map_err(HttpServeError::Bind)?;
    serve_listener(listener, portal, None)
}

/// Serve on an already-bound listener. `max_requests` stops accepting
/// after that many connections.
pub fn serve_listener(
    listener: TcpListener,
    portal: Arc<Portal>,
    max_requests: Option<usize>,
) -> Result<(), HttpServeError> {
    let mut served = 0usize;

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let portal = Arc::clone(&portal);
                let spawned = thread::Builder::new()
                    .name("labparity-http".to_string())
                    .spawn(move || serve_connection(stream, &portal));
                if let Err(err) = spawned {
                    warn!(error = %err, "failed to spawn connection thread");
                }
                served += 1;
                if let Some(limit) = max_requests
                    && served >= limit
                {
                    break;
                }
            }
            Err(err) => return Err(HttpServeError::Accept(err)),
        }
    }

    Ok(())
}

fn serve_connection(mut stream: TcpStream, portal: &Portal) {
    let response = match read_request(&mut stream) {
        Ok(request) => {
            if let Ok(Route::EventStream(since)) = parse_route(&request.method, &request.target) {
                if let Err(err) = stream_events(stream, portal, since) {
                    debug!(error = %err, "event stream closed");
                }
                return;
            }
            handle_request(portal, &request)
        }
        Err(err) => err.into_response(),
    };
    if let Err(err) = write_json_response(&mut stream, &response) {
        debug!(error = %err, "failed to write response");
    }
}

/// Route and execute one request.
pub fn handle_request(portal: &Portal, request: &HttpRequest) -> HttpResponse {
    let route = match parse_route(&request.method, &request.target) {
        Ok(route) => route,
        Err(err) => return err.into_response(),
    };
    if route.is_admin()
        && let Err(err) = portal.authorize(request.header("authorization"))
    {
        return HttpResponse::error(&err);
    }
    debug!(method = %request.method, path = %request.target, "request");
    match execute_route(portal, route, &request.body) {
        Ok(body) => HttpResponse::ok(body),
        Err(err) => {
            if err.status() >= 500 {
                warn!(error = %err, "request failed");
            }
            HttpResponse::error(&err)
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, RouteError> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| RouteError::BadRequest(format!("failed to read request: {e}")))?;
    if line.trim().is_empty() {
        return Err(RouteError::BadRequest("empty request".to_string()));
    }
    let (method, target) = parse_request_line(&line)?;

    let mut headers = BTreeMap::new();
    for _ in 0..MAX_HEADER_LINES {
        let mut header = String::new();
        reader
            .read_line(&mut header)
            .map_err(|e| RouteError::BadRequest(format!("failed to read header: {e}")))?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length = match headers.get("content-length") {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| RouteError::BadRequest(format!("invalid content-length: {raw}")))?,
        None => 0,
    };
    if length > MAX_BODY_BYTES {
        return Err(RouteError::BadRequest(format!(
            "body too large ({length} bytes)"
        )));
    }
    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .map_err(|e| RouteError::BadRequest(format!("failed to read body: {e}")))?;

    Ok(HttpRequest {
        method,
        target,
        headers,
        body,
    })
}

fn parse_request_line(line: &str) -> Result<(String, String), RouteError> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing target".to_string()))?;
    Ok((method.to_ascii_uppercase(), target.to_string()))
}

fn parse_route(method: &str, target: &str) -> Result<Route, RouteError> {
    let (path, query) = split_target(target);
    let params = parse_query_params(query);
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    let lab = params.get("lab").cloned().filter(|v| !v.trim().is_empty());

    let route = match (method, path) {
        ("GET", "/") => Route::Index,
        ("GET", "/healthz") => Route::Healthz,
        ("GET", "/api/labs") => Route::Labs,
        ("POST", "/api/compare") => Route::Compare,
        ("GET", "/api/students") => Route::Students(lab),
        ("GET", "/api/leaderboard") => Route::Leaderboard(lab),
        ("GET", "/api/events") => Route::Events(parse_since(&params)?),
        ("GET", "/api/events/stream") => Route::EventStream(parse_since(&params)?),
        ("GET", "/admin/automation") => Route::AutomationStatus,
        ("POST", "/admin/automation/toggle") => Route::AutomationToggle,
        ("POST", "/admin/interval") => Route::Interval,
        ("POST", "/admin/baseline") => Route::Baseline,
        ("POST", "/admin/submissions/delete") => Route::DeleteSubmission,
        ("GET", "/admin/teams") => Route::ListTeams(lab),
        ("POST", "/admin/teams") => Route::CreateTeam,
        ("POST", team_path) if team_path.starts_with("/admin/teams/") => {
            parse_team_action(team_path)?
        }
        (_, known) if is_known_path(known) => {
            return Err(RouteError::MethodNotAllowed(format!("{method} {known}")));
        }
        _ => return Err(RouteError::NotFound(format!("unknown route: {path}"))),
    };
    Ok(route)
}

fn parse_since(params: &BTreeMap<String, String>) -> Result<u64, RouteError> {
    match params.get("since") {
        Some(raw) if !raw.is_empty() => raw.parse::<u64>().map_err(|_| {
            RouteError::BadRequest(format!("invalid since: {raw} (expected integer)"))
        }),
        _ => Ok(0),
    }
}

/// Server-sent events: the backlog after `since`, then every new event
/// until the client goes away.
fn stream_events(mut stream: TcpStream, portal: &Portal, since: u64) -> io::Result<()> {
    let (backlog, feed) = portal.subscribe_events(since);
    stream.write_all(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
    )?;
    for event in &backlog {
        write_sse_event(&mut stream, event)?;
    }
    stream.flush()?;
    loop {
        match feed.recv_timeout(STREAM_KEEPALIVE) {
            Ok(event) => write_sse_event(&mut stream, &event)?,
            Err(RecvTimeoutError::Timeout) => stream.write_all(b": keepalive\n\n")?,
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
        stream.flush()?;
    }
}

fn write_sse_event(out: &mut impl Write, event: &LiveEvent) -> io::Result<()> {
    let data = serde_json::to_string(event).map_err(io::Error::other)?;
    write!(
        out,
        "id: {}\nevent: {}\ndata: {data}\n\n",
        event.seq,
        event.body.kind.as_str()
    )
}

fn parse_team_action(path: &str) -> Result<Route, RouteError> {
    let rest = path.trim_start_matches("/admin/teams/");
    let Some((raw_id, action)) = rest.split_once('/') else {
        return Err(RouteError::NotFound(format!("unknown route: {path}")));
    };
    let id = raw_id
        .parse::<u64>()
        .map_err(|_| RouteError::BadRequest(format!("invalid team id: {raw_id}")))?;
    match action {
        "update" => Ok(Route::UpdateTeam(id)),
        "delete" => Ok(Route::DeleteTeam(id)),
        _ => Err(RouteError::NotFound(format!("unknown route: {path}"))),
    }
}

fn is_known_path(path: &str) -> bool {
    matches!(
        path,
        "/" | "/healthz"
            | "/api/labs"
            | "/api/compare"
            | "/api/students"
            | "/api/leaderboard"
            | "/api/events"
            | "/api/events/stream"
            | "/admin/automation"
            | "/admin/automation/toggle"
            | "/admin/interval"
            | "/admin/baseline"
            | "/admin/submissions/delete"
            | "/admin/teams"
    ) || path.starts_with("/admin/teams/")
}

fn split_target(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

fn parse_query_params(query: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        let key = percent_decode(k);
        if key.is_empty() {
            continue;
        }
        out.insert(key, percent_decode(v));
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let (Some(h), Some(l)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    out.push(h * 16 + l);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            ch => {
                out.push(ch);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, PortalError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| PortalError::BadRequest(format!("invalid JSON body: {e}")))
}

fn execute_route(portal: &Portal, route: Route, body: &[u8]) -> Result<Value, PortalError> {
    match route {
        Route::Index => Ok(portal.index()),
        Route::Healthz => Ok(portal.healthz()),
        Route::Labs => Ok(portal.labs()),
        Route::Compare => portal.compare(parse_body(body)?),
        Route::Students(lab) => portal.students(lab.as_deref()),
        Route::Leaderboard(lab) => portal.leaderboard(lab.as_deref()),
        Route::Events(since) | Route::EventStream(since) => Ok(portal.events(since)),
        Route::AutomationStatus => Ok(portal.automation_status()),
        Route::AutomationToggle => Ok(portal.toggle_automation()),
        Route::Interval => {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Err(PortalError::BadRequest(
                    "interval body requires min and max".to_string(),
                ));
            }
            portal.set_interval(parse_body(body)?)
        }
        Route::Baseline => portal.set_baseline(parse_body(body)?),
        Route::DeleteSubmission => portal.delete_submission(parse_body(body)?),
        Route::ListTeams(lab) => Ok(portal.list_teams(lab.as_deref())),
        Route::CreateTeam => portal.create_team(parse_body(body)?),
        Route::UpdateTeam(id) => portal.update_team(id, parse_body(body)?),
        Route::DeleteTeam(id) => portal.delete_team(id),
    }
}

fn write_json_response(stream: &mut TcpStream, response: &HttpResponse) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(&response.body)?;
    let status_text = reason_phrase(response.status);
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nConnection: close\r\n\r\n",
        response.status,
        status_text,
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&body)?;
    stream.flush()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
