use labparity_compare::{FetchError, JsonSource};
use labparity_portal::http::{HttpRequest, handle_request};
use labparity_portal::{Portal, serve_listener};
use labparity_sched::{
    Broadcaster, FillDriver, FillError, FillRequest, LabCatalog, LiveMessage, LogSink, Scheduler,
    SchedulerConfig,
};
use labparity_store::Database;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TOKEN: &str = "s3cret";

struct SameRows;

impl JsonSource for SameRows {
    fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        if url.contains("down.example") {
            return Err(FetchError::Transport("connection refused".to_string()));
        }
        Ok(json!({"rows": [{"id": 1, "mood": "ok"}]}))
    }
}

struct NoopDriver;

impl FillDriver for NoopDriver {
    fn run_fill_session(
        &self,
        _request: &FillRequest,
        _log: &mut dyn FnMut(&str),
    ) -> Result<(), FillError> {
        Ok(())
    }
}

fn portal(admin_token: Option<&str>) -> Portal {
    portal_with_events(admin_token).0
}

fn portal_with_events(admin_token: Option<&str>) -> (Portal, Arc<Broadcaster>) {
    let db = Arc::new(Database::in_memory());
    db.set_baseline_url("http://baseline.example")
        .expect("baseline");
    let events = Arc::new(Broadcaster::default());
    let scheduler = Scheduler::new(
        SchedulerConfig {
            endpoints: vec!["/api/moods/all".to_string()],
            ..SchedulerConfig::default()
        },
        LabCatalog::default(),
        db,
        Arc::new(SameRows),
        Arc::new(NoopDriver),
        events.clone(),
    );
    (
        Portal::new(scheduler, events.clone(), admin_token.map(str::to_string)),
        events,
    )
}

fn admin(method: &str, target: &str) -> HttpRequest {
    HttpRequest::new(method, target).with_header("Authorization", &format!("Bearer {TOKEN}"))
}

fn wait_for_idle(portal: &Portal) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while portal.scheduler().is_fill_active() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn health_and_catalog() {
    let portal = portal(None);
    let health = handle_request(&portal, &HttpRequest::new("GET", "/healthz"));
    assert_eq!(health.status, 200);
    assert_eq!(health.body, json!({"status": "ok"}));

    let labs = handle_request(&portal, &HttpRequest::new("GET", "/api/labs"));
    assert_eq!(labs.body["labs"].as_array().map(Vec::len), Some(7));
    assert_eq!(labs.body["labs"][0]["compare_enabled"], true);

    let index = handle_request(&portal, &HttpRequest::new("GET", "/"));
    assert_eq!(index.body["service"], "labparity.portal.v1");
}

#[test]
fn compare_returns_verdict_and_updates_listings() {
    let portal = portal(None);
    let response = handle_request(
        &portal,
        &HttpRequest::new("POST", "/api/compare").with_json(&json!({
            "lab": "lab1",
            "name": "Ada",
            "url": "http://ada.example/",
        })),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["status"], "match");
    assert_eq!(response.body["compare_enabled"], true);
    assert_eq!(response.body["baseline_url"], "http://baseline.example");
    assert_eq!(response.body["results"][0]["status"], "match");
    wait_for_idle(&portal);

    let students = handle_request(&portal, &HttpRequest::new("GET", "/api/students?lab=lab1"));
    assert_eq!(students.body["students"][0]["name"], "Ada");

    let board = handle_request(&portal, &HttpRequest::new("GET", "/api/leaderboard"));
    assert_eq!(board.body["leaderboard"][0]["sync"], true);

    let events = handle_request(&portal, &HttpRequest::new("GET", "/api/events?since=0"));
    assert_eq!(events.body["events"][0]["kind"], "fill_start");
    let next = events.body["next"].as_u64().expect("next seq");
    let later = handle_request(
        &portal,
        &HttpRequest::new("GET", &format!("/api/events?since={next}")),
    );
    assert_eq!(later.body["events"], json!([]));
}

#[test]
fn failed_target_fetch_is_a_200_mismatch() {
    let portal = portal(None);
    let response = handle_request(
        &portal,
        &HttpRequest::new("POST", "/api/compare").with_json(&json!({
            "name": "Dan",
            "url": "http://down.example",
        })),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["status"], "mismatch");
    assert_eq!(response.body["results"][0]["status"], "error");
    assert_eq!(response.body["results"][0]["baseline_error"], Value::Null);
    wait_for_idle(&portal);
}

#[test]
fn compare_validation_is_400() {
    let portal = portal(None);
    let cases = [
        (json!({"lab": "lab42", "name": "a", "url": "http://x.example"}), "Unknown lab."),
        (json!({"name": "", "url": "http://x.example"}), "Name is required."),
        (json!({"name": "a"}), "App URL is required."),
        (json!({"name": "a", "url": "example.com"}), "App URL must include http or https."),
    ];
    for (body, message) in cases {
        let response = handle_request(
            &portal,
            &HttpRequest::new("POST", "/api/compare").with_json(&body),
        );
        assert_eq!(response.status, 400, "{body}");
        assert_eq!(response.body["error"], message);
    }

    let garbage = HttpRequest {
        body: b"{not json".to_vec(),
        ..HttpRequest::new("POST", "/api/compare")
    };
    assert_eq!(handle_request(&portal, &garbage).status, 400);
}

#[test]
fn unknown_lab_listing_is_400() {
    let portal = portal(None);
    let response = handle_request(&portal, &HttpRequest::new("GET", "/api/students?lab=nope"));
    assert_eq!(response.status, 400);
    assert_eq!(response.body["error"], "Unknown lab.");
}

#[test]
fn admin_routes_require_a_configured_token() {
    let disabled = portal(None);
    assert_eq!(
        handle_request(&disabled, &admin("GET", "/admin/automation")).status,
        403
    );

    let portal = portal(Some(TOKEN));
    assert_eq!(
        handle_request(&portal, &HttpRequest::new("GET", "/admin/automation")).status,
        401
    );
    let wrong = HttpRequest::new("GET", "/admin/automation")
        .with_header("Authorization", "Bearer nope");
    assert_eq!(handle_request(&portal, &wrong).status, 401);
    assert_eq!(
        handle_request(&portal, &admin("GET", "/admin/automation")).status,
        200
    );
}

#[test]
fn admin_automation_controls() {
    let portal = portal(Some(TOKEN));
    let toggled = handle_request(&portal, &admin("POST", "/admin/automation/toggle"));
    assert_eq!(toggled.body["automation"]["enabled"], true);

    let bad = handle_request(
        &portal,
        &admin("POST", "/admin/interval").with_json(&json!({"min": 9, "max": 3})),
    );
    assert_eq!(bad.status, 400);
    let empty = handle_request(&portal, &admin("POST", "/admin/interval"));
    assert_eq!(empty.status, 400);

    let good = handle_request(
        &portal,
        &admin("POST", "/admin/interval").with_json(&json!({"min": 2, "max": 4})),
    );
    assert_eq!(good.body, json!({"interval_min": 2, "interval_max": 4}));

    let status = handle_request(&portal, &admin("GET", "/admin/automation"));
    assert_eq!(status.body["automation"]["interval_max"], 4);
}

#[test]
fn admin_baseline_and_submission_delete() {
    let portal = portal(Some(TOKEN));
    let invalid = handle_request(
        &portal,
        &admin("POST", "/admin/baseline").with_json(&json!({"baseline_url": "nope"})),
    );
    assert_eq!(invalid.status, 400);

    let updated = handle_request(
        &portal,
        &admin("POST", "/admin/baseline")
            .with_json(&json!({"baseline_url": "https://ref.example"})),
    );
    assert_eq!(updated.status, 200);
    assert_eq!(
        portal.scheduler().resolve_baseline_url(None),
        "https://ref.example"
    );

    let registered = handle_request(
        &portal,
        &HttpRequest::new("POST", "/api/compare").with_json(&json!({
            "lab": "lab2",
            "name": "Ada",
            "url": "http://ada.example",
        })),
    );
    assert_eq!(registered.body["status"], "registered");

    let deleted = handle_request(
        &portal,
        &admin("POST", "/admin/submissions/delete")
            .with_json(&json!({"lab": "lab2", "url": "http://ada.example"})),
    );
    assert_eq!(deleted.body["deleted"], true);
    let students = handle_request(&portal, &HttpRequest::new("GET", "/api/students?lab=lab2"));
    assert_eq!(students.body["students"], json!([]));
}

#[test]
fn admin_team_crud() {
    let portal = portal(Some(TOKEN));
    let created = handle_request(
        &portal,
        &admin("POST", "/admin/teams")
            .with_json(&json!({"lab": "LAB3", "name": "Blue", "members": "ada, bob"})),
    );
    assert_eq!(created.status, 200);
    let id = created.body["team"]["id"].as_u64().expect("team id");
    assert_eq!(created.body["team"]["lab"], "lab3");

    let missing = handle_request(
        &portal,
        &admin("POST", "/admin/teams").with_json(&json!({"lab": "lab3", "name": "Red"})),
    );
    assert_eq!(missing.status, 400);

    let updated = handle_request(
        &portal,
        &admin("POST", &format!("/admin/teams/{id}/update"))
            .with_json(&json!({"lab": "unknown", "name": "Green", "members": "cy"})),
    );
    assert_eq!(updated.body["team"]["name"], "Green");
    assert_eq!(updated.body["team"]["lab"], "lab1");

    let listed = handle_request(&portal, &admin("GET", "/admin/teams?lab=lab1"));
    assert_eq!(listed.body["teams"][0]["name"], "Green");

    assert_eq!(
        handle_request(&portal, &admin("POST", &format!("/admin/teams/{id}/delete"))).status,
        200
    );
    assert_eq!(
        handle_request(&portal, &admin("POST", &format!("/admin/teams/{id}/delete"))).status,
        404
    );
}

#[test]
fn serves_requests_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let portal = Arc::new(portal(None));
    let server = thread::spawn(move || serve_listener(listener, portal, Some(1)));

    let body = json!({"name": "a", "url": "ftp://x.example"}).to_string();
    let mut stream = TcpStream::connect(addr).expect("connect");
    write!(
        stream,
        "POST /api/compare HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .expect("write request");
    let mut raw = String::new();
    stream.read_to_string(&mut raw).expect("read response");

    assert!(raw.starts_with("HTTP/1.1 400 Bad Request"), "{raw}");
    let json_start = raw.find("\r\n\r\n").expect("header end") + 4;
    let parsed: Value = serde_json::from_str(&raw[json_start..]).expect("json body");
    assert_eq!(parsed["error"], "App URL must include http or https.");

    server
        .join()
        .expect("server thread")
        .expect("server result");
}

#[test]
fn event_poll_cursor_points_at_the_last_returned_event() {
    let (portal, events) = portal_with_events(None);
    events.emit(LiveMessage::log("one"));
    events.emit(LiveMessage::log("two"));

    let first = handle_request(&portal, &HttpRequest::new("GET", "/api/events?since=0"));
    assert_eq!(first.body["next"], 2);
    assert_eq!(first.body["events"][1]["message"], "two");

    events.emit(LiveMessage::log("three"));
    let second = handle_request(&portal, &HttpRequest::new("GET", "/api/events?since=2"));
    assert_eq!(second.body["events"][0]["seq"], 3);
    assert_eq!(second.body["next"], 3);
}

fn next_sse_data(reader: &mut impl BufRead) -> Value {
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).expect("read stream line");
        assert!(read > 0, "stream closed early");
        if let Some(data) = line.trim_end().strip_prefix("data: ") {
            return serde_json::from_str(data).expect("event json");
        }
    }
}

#[test]
fn event_stream_sends_backlog_then_live_events() {
    let (portal, events) = portal_with_events(None);
    events.emit(LiveMessage::log("before"));

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = thread::spawn(move || serve_listener(listener, Arc::new(portal), Some(1)));

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    write!(stream, "GET /api/events/stream?since=0 HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .expect("write request");
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

    let mut status = String::new();
    reader.read_line(&mut status).expect("status line");
    assert!(status.starts_with("HTTP/1.1 200 OK"), "{status}");

    let backlog = next_sse_data(&mut reader);
    assert_eq!(backlog["seq"], 1);
    assert_eq!(backlog["message"], "before");

    events.emit(LiveMessage::log("after"));
    let live = next_sse_data(&mut reader);
    assert_eq!(live["seq"], 2);
    assert_eq!(live["kind"], "fill_log");

    server
        .join()
        .expect("server thread")
        .expect("server result");
    drop(reader);
    drop(stream);

    let deadline = Instant::now() + Duration::from_secs(5);
    while events.subscriber_count() > 0 && Instant::now() < deadline {
        events.emit(LiveMessage::log("nobody listening"));
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(events.subscriber_count(), 0);
}
